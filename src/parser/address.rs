//! Relative address decoding.
//!
//! The VM writes most object addresses as `(addr - base) >> log2(alignment)`
//! where `base` is announced by every GC start and end event. Decoding
//! reverses that: mask to the field width, scale, add the base.

use crate::utils::config::{NARROW_ADDR_BITS, RELATIVE_ADDR_BITS};
use log::warn;

/// A decoded absolute address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub address: u64,

    /// The raw offset had bits above the field width
    pub masked: bool,
}

/// Translates relative offsets into absolute addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    base: u64,
    alignment: u64,
}

impl AddressCodec {
    /// Create a codec with no base yet
    ///
    /// **Public** - `alignment` is the heap word size in bytes
    pub fn new(alignment: u32) -> Self {
        Self {
            base: 0,
            alignment: alignment.max(1) as u64,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Set the base announced by a GC start or end event
    pub fn set_base(&mut self, base: u64) {
        self.base = base;
    }

    /// Decode a full-width relative offset
    pub fn absolute(&self, relative: i32) -> DecodedAddress {
        self.absolute_bits(relative as u32 as u64, RELATIVE_ADDR_BITS)
    }

    /// Decode a narrow (22 bit) relative offset
    pub fn absolute_narrow(&self, relative: i32) -> DecodedAddress {
        self.absolute_bits(relative as u32 as u64, NARROW_ADDR_BITS)
    }

    /// Decode an offset whose field is `bits` wide
    ///
    /// **Public** - masking that changes the value is logged and flagged,
    /// never silently dropped
    pub fn absolute_bits(&self, raw: u64, bits: u32) -> DecodedAddress {
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let offset = raw & mask;
        let masked = offset != raw;

        if masked {
            warn!(
                "Relative address 0x{:x} exceeds {} bits, truncated to 0x{:x}",
                raw, bits, offset
            );
        }

        DecodedAddress {
            address: self.base.wrapping_add(offset.wrapping_mul(self.alignment)),
            masked,
        }
    }

    /// Encode an absolute address relative to the current base
    ///
    /// Returns None when the address is below the base, misaligned or
    /// out of range for a full-width field.
    pub fn relative(&self, address: u64) -> Option<i32> {
        let delta = address.checked_sub(self.base)?;
        if delta % self.alignment != 0 {
            return None;
        }
        let scaled = delta / self.alignment;
        if scaled > u32::MAX as u64 {
            return None;
        }
        Some(scaled as u32 as i32)
    }
}
