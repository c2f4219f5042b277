//! Callbacks fired around GC boundaries.

use super::gc::GcInfo;
use super::model::HeapModel;

/// Progress of the parse at the time of a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsingInfo {
    /// Total trace length in bytes, when known
    pub trace_length: Option<u64>,

    /// Bytes consumed so far
    pub position: u64,

    /// Byte range of interest
    pub window: Option<(u64, u64)>,
}

impl ParsingInfo {
    /// Whether `position` falls in the byte window (always true without one)
    pub fn in_window(&self, position: u64) -> bool {
        match self.window {
            Some((from, to)) => position >= from && position <= to,
            None => true,
        }
    }
}

/// Observer of heap phase changes
///
/// Callbacks get the heap read-only; they run on the master thread while
/// the model is consistent.
///
/// A GC produces exactly one `phase_changing` and one `phase_changed`, both
/// at its end. Nothing fires when a GC starts, since the model does not change
/// until the end is applied; `from` carries the start info instead.
#[allow(clippy::too_many_arguments)]
pub trait HeapListener {
    /// Fired before the end-of-GC bookkeeping runs
    fn phase_changing(
        &mut self,
        _sender: &HeapModel,
        _from: &GcInfo,
        _to: &GcInfo,
        _failed: bool,
        _position: u64,
        _info: &ParsingInfo,
        _in_window: bool,
    ) {
    }

    /// Fired once the heap reflects the end of the GC
    fn phase_changed(
        &mut self,
        _sender: &HeapModel,
        _from: &GcInfo,
        _to: &GcInfo,
        _failed: bool,
        _position: u64,
        _info: &ParsingInfo,
        _in_window: bool,
    ) {
    }

    /// Fired once after the last chunk
    fn close(&mut self, _sender: &HeapModel, _info: &ParsingInfo) {}
}
