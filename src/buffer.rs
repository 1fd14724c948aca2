use crate::error::Error;
use std::io::Write;

const INITIAL_SIZE: usize = 65536;

/// Growable scratch region with a write cursor and a high-water count.
///
/// Object headers are assembled here so their size fields can be patched
/// with in-memory seeks before anything reaches the file. `count` tracks
/// the highest byte ever written and is the flushable length.
pub struct Buffer {
    storage: Vec<u8>,
    cursor: usize,
    count: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            storage: Vec::new(),
            cursor: 0,
            count: 0,
        }
    }

    /// Appends at the cursor, growing storage by powers of two to fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.cursor + bytes.len();
        self.grow_to(end)?;
        self.storage[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        if self.count < end {
            self.count = end;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.write(&value.to_le_bytes())
    }

    pub fn seek(&mut self, position: u64) {
        self.cursor = position as usize;
    }

    pub fn seek_end(&mut self) {
        self.cursor = self.count;
    }

    pub fn tell(&self) -> u64 {
        self.cursor as u64
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends zero bytes until `count` is a multiple of 8.
    pub fn align_to_8(&mut self) -> Result<(), Error> {
        self.seek_end();
        while self.count % 8 != 0 {
            self.write_u8(0)?;
        }
        Ok(())
    }

    /// Overwrites an earlier placeholder, leaving the cursor at the end.
    pub fn patch_u16(&mut self, at: u64, value: u16) -> Result<(), Error> {
        self.seek(at);
        self.write_u16(value)?;
        self.seek_end();
        Ok(())
    }

    pub fn patch_u32(&mut self, at: u64, value: u32) -> Result<(), Error> {
        self.seek(at);
        self.write_u32(value)?;
        self.seek_end();
        Ok(())
    }

    /// Writes the first `count` bytes to `out`, then zeroes and resets.
    /// The reset happens even when the write fails; the caller treats the
    /// file as unusable in that case.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> std::io::Result<usize> {
        let len = self.count;
        let result = out.write_all(&self.storage[..len]);
        for byte in &mut self.storage[..len] {
            *byte = 0;
        }
        self.cursor = 0;
        self.count = 0;
        result.map(|()| len)
    }

    fn grow_to(&mut self, needed: usize) -> Result<(), Error> {
        if needed <= self.storage.len() {
            return Ok(());
        }
        let mut size = self.storage.len().max(INITIAL_SIZE);
        while size < needed {
            size *= 2;
        }
        self.storage.try_reserve_exact(size - self.storage.len())?;
        self.storage.resize(size, 0);
        Ok(())
    }
}
