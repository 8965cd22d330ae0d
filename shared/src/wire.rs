use thiserror::Error;

/// Errors that can occur while decoding wire data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Ran out of payload bytes mid-field
    #[error("Unexpected end of payload at offset {offset}: needed {needed} more byte(s)")]
    UnexpectedEnd { offset: usize, needed: usize },

    /// A variable-length integer kept its continuation bit set past 5 bytes
    #[error("Variable-length integer does not fit in a u32")]
    VarintOverflow,

    /// A length-prefixed string was not valid UTF-8
    #[error("String payload of {len} byte(s) is not valid UTF-8")]
    InvalidUtf8 { len: usize },
}

/// Growable buffer that outbound packets and frames are assembled into.
///
/// Integers wider than a byte use a 7-bit variable-length encoding so that
/// the small ids this protocol traffics in usually cost a single byte.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Reset the buffer for reuse without releasing its allocation
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u32 as a little-endian base-128 varint, 7 bits per byte,
    /// high bit as the continuation flag
    pub fn write_varint(&mut self, value: u32) {
        let mut remaining = value;
        loop {
            let mut byte = (remaining & 0x7F) as u8;
            remaining >>= 7;
            if remaining != 0 {
                byte |= 0x80;
            }
            self.buffer.push(byte);
            if remaining == 0 {
                return;
            }
        }
    }

    /// Write an i32 zigzag-mapped onto a varint, so small negative values
    /// stay small on the wire
    pub fn write_signed_varint(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varint(zigzag);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a varint length prefix followed by the bytes themselves
    pub fn write_sized_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    /// Strings are length-prefixed UTF-8, never NUL-terminated
    pub fn write_string(&mut self, value: &str) {
        self.write_sized_bytes(value.as_bytes());
    }
}

/// Cursor over a received payload. Every read is bounds-checked; malformed
/// input surfaces as a `WireError`, never a panic.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_varint(&mut self) -> Result<u32, WireError> {
        let mut value: u32 = 0;
        for shift in 0..5 {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7F);
            // the fifth byte may only carry the u32's top 4 bits
            if shift == 4 && bits > 0x0F {
                return Err(WireError::VarintOverflow);
            }
            value |= bits << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow)
    }

    pub fn read_signed_varint(&mut self) -> Result<i32, WireError> {
        let zigzag = self.read_varint()?;
        Ok(((zigzag >> 1) as i32) ^ -((zigzag & 1) as i32))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < count {
            return Err(WireError::UnexpectedEnd {
                offset: self.cursor,
                needed: count - self.remaining(),
            });
        }
        let slice = &self.buffer[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }

    pub fn read_sized_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()? as usize;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self) -> Result<&'a str, WireError> {
        let bytes = self.read_sized_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8 { len: bytes.len() })
    }

    /// Consume and return everything left in the payload
    pub fn take_remaining(&mut self) -> &'a [u8] {
        let slice = &self.buffer[self.cursor..];
        self.cursor = self.buffer.len();
        slice
    }
}
