pub mod discriminant;
pub mod wasm;

pub use discriminant::{
    is_stylus_program, new_stylus_prefix, strip_stylus_prefix, StylusPrefixError,
    STYLUS_DISCRIMINANT,
};
pub use wasm::{ActivatedWasm, CacheWasm, EvictWasm, UserWasms, WasmCacheOp, WasmTarget};
