//! Per-thread pointer accumulation.
//!
//! A move with more than twelve pointers is split by the VM into the move
//! event and extension events that follow on the same thread. The
//! accumulation collects them until the next non-extension event.

use crate::parser::{EventType, PointerSet};
use crate::symbols::PointerCapacity;
use crate::utils::error::{DecodeErrorKind, ReconciliationViolation};

/// The object whose pointers are being collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulation {
    pub event: EventType,
    pub from: Option<u64>,
    pub to: u64,
    pub capacity: PointerCapacity,
    pub buffer: Vec<Option<u64>>,
}

/// Either nothing in progress or one complete accumulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PointerAccumulation {
    #[default]
    Idle,
    Accumulating(Accumulation),
}

/// Result of finishing an accumulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finished {
    /// Nothing was in progress
    Nothing,
    /// All pointers are known
    Complete(PointerSet),
    /// Pointers are missing; park them in the pending table
    Partial(Accumulation),
}

impl PointerAccumulation {
    pub fn is_idle(&self) -> bool {
        matches!(self, PointerAccumulation::Idle)
    }

    /// Whether pointers for `to` are currently being collected
    pub fn is_collecting(&self, to: u64) -> bool {
        matches!(self, PointerAccumulation::Accumulating(current) if current.to == to)
    }

    /// Begin collecting pointers for `to`
    pub fn start(
        &mut self,
        event: EventType,
        from: Option<u64>,
        to: u64,
        capacity: PointerCapacity,
        pointers: Vec<Option<u64>>,
    ) -> Result<(), ReconciliationViolation> {
        if let PointerAccumulation::Accumulating(current) = self {
            return Err(ReconciliationViolation::DoubleStart {
                addr: to,
                current: current.to,
            });
        }

        check_capacity(to, capacity, pointers.len())?;

        *self = PointerAccumulation::Accumulating(Accumulation {
            event,
            from,
            to,
            capacity,
            buffer: pointers,
        });
        Ok(())
    }

    /// Add the pointers of an extension event
    ///
    /// The capacity check runs before anything is written.
    pub fn append(&mut self, to: u64, pointers: Vec<Option<u64>>) -> Result<(), DecodeErrorKind> {
        match self {
            PointerAccumulation::Idle => Err(DecodeErrorKind::UnexpectedExtension { addr: to }),
            PointerAccumulation::Accumulating(current) => {
                if current.to != to {
                    return Err(DecodeErrorKind::InterleavedExtension {
                        addr: to,
                        current: current.to,
                    });
                }
                check_capacity(to, current.capacity, current.buffer.len() + pointers.len())?;
                current.buffer.extend(pointers);
                Ok(())
            }
        }
    }

    /// Close the accumulation and go back to idle
    pub fn finish(&mut self) -> Finished {
        match std::mem::take(self) {
            PointerAccumulation::Idle => Finished::Nothing,
            PointerAccumulation::Accumulating(acc) => {
                let complete = match acc.capacity {
                    PointerCapacity::Exact(n) => acc.buffer.len() == n,
                    PointerCapacity::Open => true,
                    PointerCapacity::Deferred => false,
                };

                if complete {
                    Finished::Complete(PointerSet {
                        event: acc.event,
                        from: acc.from,
                        to: acc.to,
                        pointers: acc.buffer,
                    })
                } else {
                    Finished::Partial(acc)
                }
            }
        }
    }
}

/// **Private** - internal helper
fn check_capacity(
    addr: u64,
    capacity: PointerCapacity,
    count: usize,
) -> Result<(), ReconciliationViolation> {
    match capacity {
        PointerCapacity::Exact(capacity) if count > capacity => {
            Err(ReconciliationViolation::Overflow {
                addr,
                capacity,
                count,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_append_finish() {
        let mut acc = PointerAccumulation::default();
        acc.start(EventType::GcMoveSlowPtr, Some(0x10), 0x20, PointerCapacity::Exact(3), vec![Some(1), None])
            .unwrap();
        acc.append(0x20, vec![Some(3)]).unwrap();

        match acc.finish() {
            Finished::Complete(set) => {
                assert_eq!(set.to, 0x20);
                assert_eq!(set.pointers, vec![Some(1), None, Some(3)]);
            }
            other => panic!("expected a complete set, got {:?}", other),
        }
        assert!(acc.is_idle());
    }

    #[test]
    fn test_is_collecting_matches_target_only() {
        let mut acc = PointerAccumulation::default();
        assert!(!acc.is_collecting(0x20));

        acc.start(EventType::GcKeepAlivePtr, None, 0x20, PointerCapacity::Exact(14), vec![None])
            .unwrap();
        assert!(acc.is_collecting(0x20));
        assert!(!acc.is_collecting(0x28));
    }

    #[test]
    fn test_extension_without_start() {
        let mut acc = PointerAccumulation::default();
        assert_eq!(
            acc.append(0x20, vec![None]),
            Err(DecodeErrorKind::UnexpectedExtension { addr: 0x20 })
        );
    }

    #[test]
    fn test_interleaved_extension() {
        let mut acc = PointerAccumulation::default();
        acc.start(EventType::GcMoveFastPtr, None, 0x20, PointerCapacity::Exact(4), vec![None])
            .unwrap();
        assert_eq!(
            acc.append(0x28, vec![None]),
            Err(DecodeErrorKind::InterleavedExtension {
                addr: 0x28,
                current: 0x20
            })
        );
    }

    #[test]
    fn test_overflow_leaves_buffer_untouched() {
        let mut acc = PointerAccumulation::default();
        acc.start(EventType::GcMoveFastPtr, None, 0x20, PointerCapacity::Exact(2), vec![Some(1)])
            .unwrap();
        assert!(acc.append(0x20, vec![Some(2), Some(3)]).is_err());

        match acc {
            PointerAccumulation::Accumulating(ref current) => assert_eq!(current.buffer.len(), 1),
            PointerAccumulation::Idle => panic!("accumulation was dropped"),
        }
    }

    #[test]
    fn test_double_start() {
        let mut acc = PointerAccumulation::default();
        acc.start(EventType::GcMoveFastPtr, None, 0x20, PointerCapacity::Open, vec![])
            .unwrap();
        let err = acc
            .start(EventType::GcMoveFastPtr, None, 0x40, PointerCapacity::Open, vec![])
            .unwrap_err();
        assert_eq!(err, ReconciliationViolation::DoubleStart { addr: 0x40, current: 0x20 });
    }

    #[test]
    fn test_partial_and_open_capacity() {
        let mut acc = PointerAccumulation::default();
        acc.start(EventType::GcMoveFastPtr, None, 0x20, PointerCapacity::Exact(3), vec![None])
            .unwrap();
        assert!(matches!(acc.finish(), Finished::Partial(_)));

        acc.start(EventType::GcKeepAlivePtr, None, 0x30, PointerCapacity::Open, vec![None])
            .unwrap();
        assert!(matches!(acc.finish(), Finished::Complete(_)));
    }
}
