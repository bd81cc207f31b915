//! # State overlay configuration
//!
//! | Flag | Default | Description |
//! |------|---------|-------------|
//! | `--stylus.block-cache-size` | `32` | Programs remembered as recently used within a block |
//! | `--state.deterministic` | `false` | Run the overlay in deterministic mode |
//! | `--state.recording` | `false` | Record every program used, for witness generation (implies deterministic) |

use clap::Args;

const DEFAULT_BLOCK_CACHE_SIZE: u16 = 32;
const DEFAULT_DETERMINISTIC: bool = false;
const DEFAULT_RECORDING: bool = false;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct StateArgs {
    #[arg(long = "stylus.block-cache-size", default_value_t = DEFAULT_BLOCK_CACHE_SIZE)]
    pub block_cache_size: u16,
    #[arg(long = "state.deterministic", default_value_t = DEFAULT_DETERMINISTIC)]
    pub deterministic: bool,
    #[arg(long = "state.recording", default_value_t = DEFAULT_RECORDING)]
    pub recording: bool,
}

impl StateArgs {
    pub fn new_deterministic() -> Self {
        Self {
            deterministic: true,
            ..Default::default()
        }
    }

    pub fn new_recording() -> Self {
        Self {
            deterministic: true,
            recording: true,
            ..Default::default()
        }
    }
}

impl Default for StateArgs {
    fn default() -> Self {
        Self {
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
            deterministic: DEFAULT_DETERMINISTIC,
            recording: DEFAULT_RECORDING,
        }
    }
}
