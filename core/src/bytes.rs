use crate::error::NeedMore;

/// Cursor over a byte stream being disassembled.
pub struct Bytes<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Bytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// The not-yet-consumed part of the stream.
    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Consumes `len` bytes, or reports how many are missing.
    pub fn read(&mut self, len: usize) -> Result<&'a [u8], NeedMore> {
        if self.offset + len > self.data.len() {
            return Err(NeedMore(self.offset + len - self.data.len()));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }
}
