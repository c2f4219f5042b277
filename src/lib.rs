//! Heap Trace Studio
//!
//! Heap graph reconstruction from the allocation traces of an
//! instrumented JVM.
//!
//! The crate decodes the VM's bit-packed event stream in parallel, one
//! decoder per producing thread, and replays the decoded records in order
//! against a canonical heap model. Consumers read the model through
//! [`heap::HeapQuery`] or get called back at every GC boundary through
//! [`heap::HeapListener`].
//!
//! ## Getting Started
//!
//! ```ignore
//! let symbols = Arc::new(load_symbols("symbols.json")?);
//! let outcome = TraceParser::new(symbols, ParserConfig::default()).parse_file("trace.bin")?;
//! println!("{} live objects", outcome.heap.object_count());
//! ```
//!
//! This exposes the internal modules for testing.

pub mod commands;
pub mod heap;
pub mod output;
pub mod parser;
pub mod reconstruct;
pub mod snapshot;
pub mod staging;
pub mod symbols;
pub mod utils;
