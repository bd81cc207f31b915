//! Stylus program discriminant.
//!
//! Stylus programs live in the same code slot as EVM contracts. They are told
//! apart by a 3-byte prefix chosen to collide with the EOF validation rules, so
//! no valid EVM deployment can ever start with it:
//!
//! | Offset | Value                 |
//! |--------|-----------------------|
//! | 0      | `0xEF` (EOF magic)    |
//! | 1      | `0xF0`                |
//! | 2      | `0x00` (version)      |
//! | 3      | dictionary selector   |
//! | 4..    | compressed payload    |

/// EOF magic byte.
const STYLUS_EOF_MAGIC: u8 = 0xEF;
/// Suffix distinguishing Stylus from EOF containers.
const STYLUS_EOF_MAGIC_SUFFIX: u8 = 0xF0;
/// Discriminant version.
const STYLUS_EOF_VERSION: u8 = 0x00;

/// The shared prefix marking a code blob as a Stylus program.
pub const STYLUS_DISCRIMINANT: [u8; 3] =
    [STYLUS_EOF_MAGIC, STYLUS_EOF_MAGIC_SUFFIX, STYLUS_EOF_VERSION];

/// Length of a full Stylus prefix (discriminant plus dictionary byte).
pub const STYLUS_PREFIX_LEN: usize = STYLUS_DISCRIMINANT.len() + 1;

/// Payload compressed without a dictionary.
pub const EMPTY_DICTIONARY: u8 = 0x00;
/// Payload compressed with the built-in Stylus program dictionary.
pub const STYLUS_PROGRAM_DICTIONARY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StylusPrefixError {
    #[error("specified bytecode is not a Stylus program")]
    NotStylusProgram,
}

/// Returns true if `code` carries the Stylus discriminant.
///
/// At least one byte past the dictionary selector is required, so anything
/// shorter than 5 bytes is never a Stylus program.
pub fn is_stylus_program(code: &[u8]) -> bool {
    code.len() > STYLUS_PREFIX_LEN && code[..STYLUS_DISCRIMINANT.len()] == STYLUS_DISCRIMINANT
}

/// Strips the Stylus prefix, returning the payload and the dictionary selector.
pub fn strip_stylus_prefix(code: &[u8]) -> Result<(&[u8], u8), StylusPrefixError> {
    if !is_stylus_program(code) {
        return Err(StylusPrefixError::NotStylusProgram);
    }
    Ok((&code[STYLUS_PREFIX_LEN..], code[STYLUS_DISCRIMINANT.len()]))
}

/// Builds a fresh Stylus prefix for the given dictionary.
///
/// The returned buffer is owned by the caller, who appends the payload to it.
pub fn new_stylus_prefix(dictionary: u8) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(STYLUS_PREFIX_LEN);
    prefix.extend_from_slice(&STYLUS_DISCRIMINANT);
    prefix.push(dictionary);
    prefix
}
