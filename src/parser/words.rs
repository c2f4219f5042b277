//! Word-level reading of chunk payloads.
//!
//! Payloads are little-endian 32-bit words. Double words are written low
//! word first. Strings are packed four bytes per word, most significant
//! byte first, and end at the first NUL.

use crate::utils::error::DecodeErrorKind;

/// Cursor over one chunk payload
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: u64,
}

impl<'a> WordCursor<'a> {
    /// Create a cursor; `base_offset` is the payload's position in the trace
    pub fn new(data: &'a [u8], base_offset: u64) -> Self {
        Self {
            data,
            pos: 0,
            base_offset,
        }
    }

    /// Absolute trace offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True once fewer than one full word is left
    pub fn is_empty(&self) -> bool {
        self.remaining() < 4
    }

    /// Read the next 32-bit word
    pub fn next_word(&mut self) -> Result<i32, DecodeErrorKind> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or(DecodeErrorKind::Truncated)?;
        self.pos += 4;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit value stored as two words, low word first
    pub fn next_double_word(&mut self) -> Result<i64, DecodeErrorKind> {
        let low = self.next_word()? as u32 as u64;
        let high = self.next_word()? as u32 as u64;
        Ok(((high << 32) | low) as i64)
    }

    /// Read a packed string of `len` bytes
    pub fn read_string(&mut self, len: usize) -> Result<String, DecodeErrorKind> {
        let words = len.div_ceil(4);
        let mut bytes = Vec::with_capacity(words * 4);

        for _ in 0..words {
            let word = self.next_word()? as u32;
            bytes.extend_from_slice(&word.to_be_bytes());
        }

        bytes.truncate(len);
        if let Some(end) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(end);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a NUL terminated string of at most `max_words` words
    ///
    /// Consumes words up to and including the one holding the NUL.
    pub fn read_terminated(&mut self, max_words: usize) -> Result<String, DecodeErrorKind> {
        let mut bytes = Vec::new();

        'words: for _ in 0..max_words {
            let word = self.next_word()? as u32;
            for byte in word.to_be_bytes() {
                if byte == 0 {
                    break 'words;
                }
                bytes.push(byte);
            }
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Extract header bytes `from..=to`, byte 0 being the most significant
pub fn recover_value(word: i32, from: u32, to: u32) -> i32 {
    debug_assert!(from <= to && to <= 3);
    let width = 8 * (to - from + 1);
    let shifted = (word as u32 as u64) >> (8 * (3 - to));
    (shifted & ((1u64 << width) - 1)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_next_word_and_double_word() {
        let data = words(&[0xDEAD_BEEF, 0x8765_4321, 0x0000_0001]);
        let mut cursor = WordCursor::new(&data, 100);

        assert_eq!(cursor.next_word().unwrap() as u32, 0xDEAD_BEEF);
        assert_eq!(cursor.offset(), 104);
        assert_eq!(cursor.next_double_word().unwrap(), 0x0000_0001_8765_4321);
        assert!(cursor.is_empty());
        assert_eq!(cursor.next_word(), Err(DecodeErrorKind::Truncated));
    }

    #[test]
    fn test_recover_value() {
        let word = 0x12_34_56_78u32 as i32;
        assert_eq!(recover_value(word, 0, 0), 0x12);
        assert_eq!(recover_value(word, 1, 2), 0x3456);
        assert_eq!(recover_value(word, 1, 3), 0x34_5678);
        assert_eq!(recover_value(word, 3, 3), 0x78);
        assert_eq!(recover_value(-1, 0, 3), -1);
    }

    #[test]
    fn test_read_string_packed_high_byte_first() {
        let data = words(&[
            u32::from_be_bytes(*b"main"),
            u32::from_be_bytes([b'-', b'1', 0, 0]),
        ]);
        let mut cursor = WordCursor::new(&data, 0);

        assert_eq!(cursor.read_string(6).unwrap(), "main-1");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_read_string_stops_at_nul() {
        let data = words(&[u32::from_be_bytes([b'g', b'c', 0, b'x'])]);
        let mut cursor = WordCursor::new(&data, 0);

        assert_eq!(cursor.read_string(4).unwrap(), "gc");
    }

    #[test]
    fn test_read_terminated_leaves_following_words() {
        let data = words(&[
            u32::from_be_bytes(*b"work"),
            u32::from_be_bytes([b'e', b'r', 0, 0]),
            0xCAFE,
        ]);
        let mut cursor = WordCursor::new(&data, 0);

        assert_eq!(cursor.read_terminated(12).unwrap(), "worker");
        assert_eq!(cursor.next_word().unwrap(), 0xCAFE);
    }
}
