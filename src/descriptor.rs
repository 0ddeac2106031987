use crate::error::ParseError;

/// A growable little-endian byte buffer used to assemble one archive record
/// before it is handed to the sink in a single append.
#[derive(Debug)]
pub struct ArchiveDescriptor {
    buffer: Vec<u8>,
}

impl ArchiveDescriptor {
    pub fn new(capacity: u64) -> ArchiveDescriptor {
        ArchiveDescriptor {
            buffer: Vec::with_capacity(capacity as usize),
        }
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buffer.push(val);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i32(&mut self, val: i32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_bytes(&mut self, val: &[u8]) {
        self.buffer.extend_from_slice(val);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over an in-memory slice of archive records. Every read is bounds
/// checked and failures report the absolute offset of the missing bytes.
pub struct ArchiveDescriptorReader<'a> {
    stream: &'a [u8],
    index: usize,
    base_offset: u64,
}

impl<'a> ArchiveDescriptorReader<'a> {
    /// `base_offset` is the absolute archive offset of `stream[0]`, used only
    /// to report error positions.
    pub fn new(stream: &'a [u8], base_offset: u64) -> ArchiveDescriptorReader<'a> {
        ArchiveDescriptorReader {
            stream,
            index: 0,
            base_offset,
        }
    }

    pub fn position(&self) -> u64 {
        self.base_offset + self.index as u64
    }

    pub fn remaining(&self) -> usize {
        self.stream.len() - self.index
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let upper_bound = self
            .index
            .checked_add(len)
            .filter(|upper| *upper <= self.stream.len())
            .ok_or_else(|| ParseError::truncated(self.position()))?;
        let slice = &self.stream[self.index..upper_bound];
        self.index = upper_bound;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let read = self.take(2)?;
        Ok(u16::from_le_bytes([read[0], read[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let read = self.take(4)?;
        Ok(u32::from_le_bytes([read[0], read[1], read[2], read[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ParseError> {
        let read = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(read);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_i32(&mut self) -> Result<i32, ParseError> {
        let read = self.take(4)?;
        Ok(i32::from_le_bytes([read[0], read[1], read[2], read[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ParseError> {
        Ok(self.take(len)?.to_owned())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.take(len).map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_and_read_back() {
        let mut desc = ArchiveDescriptor::new(32);
        desc.write_u32(0x04034b50);
        desc.write_u16(20);
        desc.write_u64(0x1_0000_0000);
        desc.write_i32(-1468763280);
        desc.write_bytes(b"file1.txt");

        let bytes = desc.finish();
        let mut reader = ArchiveDescriptorReader::new(&bytes, 0);
        assert_eq!(reader.read_u32().unwrap(), 0x04034b50);
        assert_eq!(reader.read_u16().unwrap(), 20);
        assert_eq!(reader.read_u64().unwrap(), 0x1_0000_0000);
        assert_eq!(reader.read_i32().unwrap(), -1468763280);
        assert_eq!(reader.read_bytes(9).unwrap(), b"file1.txt");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_reads_report_the_absolute_offset() {
        let bytes = [0x50u8, 0x4b];
        let mut reader = ArchiveDescriptorReader::new(&bytes, 1000);

        let err = reader.read_u32().unwrap_err();
        match err {
            ParseError::Read { offset, .. } => assert_eq!(offset, 1000),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
