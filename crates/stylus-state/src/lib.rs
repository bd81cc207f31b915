pub mod args;
pub mod error;
pub mod primitives;
pub mod state;

mod metrics;

pub use args::StateArgs;
pub use error::{ActivationError, DatabaseError, StateError};
pub use state::{StateChangeset, StateDatabase, StateOverlay};
