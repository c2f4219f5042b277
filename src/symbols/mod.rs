//! Type and allocation-site registry.
//!
//! The VM writes a symbols file next to every trace. It names the types
//! and allocation sites that events refer to by id, and carries the heap
//! word size the address codec needs.

mod loader;
mod model;

pub use loader::{load_symbols, parse_symbols_json, parse_symbols_toml};
pub use model::{ArrayInfo, CauseInfo, PointerCapacity, SiteInfo, Symbols, TypeInfo};
