//! Sequential big-endian cursor over an in-memory byte buffer.
//!
//! Every multi-byte integer in the PalmDB/PalmDOC/MOBI/EXTH headers is
//! big-endian. Reads either return exactly the requested bytes or fail;
//! the offset never moves past the end of the buffer.

use crate::error::{Error, Result};

pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::Parse(format!(
                "seek to {pos} past end of input ({} bytes)",
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(self.pos + n)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(Error::Parse(format!(
                "unexpected end of input at offset {} (wanted {n} bytes of {})",
                self.pos,
                self.data.len()
            ))),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads_advance() {
        let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xAB];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(cur.read_u16_be().unwrap(), 1);
        assert_eq!(cur.read_u32_be().unwrap(), 2);
        assert_eq!(cur.read_u8().unwrap(), 0xAB);
        assert_eq!(cur.tell(), 7);
    }

    #[test]
    fn short_read_fails_without_advancing() {
        let mut cur = ByteCursor::new(&[0x01, 0x02]);
        cur.read_u8().unwrap();
        assert!(cur.read_u32_be().is_err());
        assert_eq!(cur.tell(), 1);
    }

    #[test]
    fn seek_and_skip_stay_in_bounds() {
        let mut cur = ByteCursor::new(&[0; 8]);
        cur.seek(8).unwrap(); // one past last byte is legal, reads fail
        assert!(cur.read_u8().is_err());
        cur.seek(4).unwrap();
        cur.skip(2).unwrap();
        assert_eq!(cur.tell(), 6);
        assert!(cur.skip(3).is_err());
    }
}
