//! Byte cursor over a code buffer.

use crate::DecodeError;

/// A read position within one instruction's byte buffer.
///
/// The cursor is `Copy`: each decode owns its own, so two decodes of the same
/// buffer never observe each other's position. The position only moves
/// forward.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    address: u64,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `bytes`, which live at `address`.
    pub fn new(bytes: &'a [u8], address: u64) -> Self {
        Self {
            bytes,
            pos: 0,
            address,
        }
    }

    /// Address of the first byte of the buffer.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.bytes[..self.pos]
    }

    /// Returns the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Returns the byte `n` positions ahead without consuming anything.
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    /// Consumes one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.read_bytes::<1>()?;
        Ok(byte)
    }

    /// Consumes `N` bytes.
    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| DecodeError::truncated(self.address, end, self.bytes.len()))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    /// Skips `n` bytes that are known to be present.
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(DecodeError::truncated(self.address, end, self.bytes.len()));
        }
        self.pos = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut cursor = ByteCursor::new(&bytes, 0x400000);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_bytes::<2>().unwrap(), [0x02, 0x03]);
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.consumed(), &[0x01, 0x02, 0x03]);
        assert_eq!(cursor.peek(), Some(0x04));
        assert_eq!(cursor.peek_at(1), Some(0x05));
        assert_eq!(cursor.peek_at(2), None);
    }

    #[test]
    fn test_truncation_does_not_advance() {
        let bytes = [0xAA, 0xBB];
        let mut cursor = ByteCursor::new(&bytes, 0x10);
        cursor.read_u8().unwrap();
        let err = cursor.read_bytes::<4>().unwrap_err();
        assert_eq!(err, DecodeError::truncated(0x10, 5, 2));
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_copies_are_independent() {
        let bytes = [0x90, 0x90];
        let mut a = ByteCursor::new(&bytes, 0);
        let b = a;
        a.read_u8().unwrap();
        assert_eq!(a.position(), 1);
        assert_eq!(b.position(), 0);
    }
}
