//! Canonical heap model and the interfaces consumers use to read it.
//!
//! This module handles:
//! - Objects, spaces, labs and roots
//! - GC metadata
//! - Query and listener traits

mod gc;
mod listener;
mod model;
mod object;
mod query;
mod roots;
mod space;

pub use gc::{GcCause, GcEventType, GcInfo, GcType};
pub use listener::{HeapListener, ParsingInfo};
pub use model::{HeapModel, ThreadInfo};
pub use object::{HeapObject, ObjectIndex};
pub use query::HeapQuery;
pub use roots::{RootInfo, RootKind, RootPtr};
pub use space::{Lab, LabKind, LabState, Space, SpaceKind, SpaceMode};
