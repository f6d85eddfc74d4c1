use std::collections::HashSet;
use std::str;

use crate::types::{DnsBufferError, DnsReadBuffer, DnsWriteBuffer};

/// Longest label allowed on the wire.
pub const MAX_LABEL_LEN: usize = 63;
/// Longest encoded name, length octets and terminator included.
pub const MAX_NAME_LEN: usize = 255;

const POINTER_MASK: u8 = 0b1100_0000;

impl<'a> DnsReadBuffer<'a> {
    /// Creates a new `DnsReadBuffer` to read from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Returns the current read index.
    pub fn get_index(&self) -> usize {
        self.index
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    /// Reads a single byte (`u8`) from the buffer.
    ///
    /// # Errors
    /// Returns `DnsBufferError::Truncated` if reading beyond available data.
    pub fn read_u8(&mut self) -> Result<u8, DnsBufferError> {
        let offset = self.index;
        self.data
            .get(offset)
            .copied()
            .ok_or(DnsBufferError::Truncated { offset })
            .map(|b| {
                self.index += 1;
                b
            })
    }

    /// Reads a 16-bit unsigned integer (`u16`) in big-endian order from the buffer.
    pub fn read_u16(&mut self) -> Result<u16, DnsBufferError> {
        self.read_n_bytes(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a 32-bit unsigned integer (`u32`) in big-endian order from the buffer.
    pub fn read_u32(&mut self) -> Result<u32, DnsBufferError> {
        self.read_n_bytes(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads `n` bytes from the buffer as a slice.
    ///
    /// Advances the read index by `n` on success and leaves it untouched
    /// on failure.
    pub fn read_n_bytes(&mut self, n: usize) -> Result<&'a [u8], DnsBufferError> {
        let offset = self.index;
        self.data
            .get(offset..offset + n)
            .ok_or(DnsBufferError::Truncated { offset })
            .map(|b| {
                self.index += n;
                b
            })
    }

    /// Reads a DNS domain name at the cursor, following compression pointers.
    ///
    /// The cursor ends up just past the name as it appears at the cursor:
    /// past the terminating zero, or past the first pointer's two bytes.
    pub fn read_str(&mut self) -> Result<String, DnsBufferError> {
        let (name, next) = Self::read_name_at(self.data, self.index)?;
        self.index = next;
        Ok(name)
    }

    /// Decodes the name starting at `start`.
    ///
    /// Returns `(decoded_name, index_after_name)`. Every pointer target is
    /// remembered, so a name that leads back to a target it already
    /// followed fails with `PointerCycle` instead of looping.
    pub fn read_name_at(data: &[u8], start: usize) -> Result<(String, usize), DnsBufferError> {
        let mut labels: Vec<&str> = Vec::new();
        let mut visited = HashSet::new();
        let mut resume = None;
        let mut encoded = 1;
        let mut idx = start;

        loop {
            let len = *data.get(idx).ok_or(DnsBufferError::MalformedName { offset: idx })?;

            match len & POINTER_MASK {
                POINTER_MASK => {
                    let low = *data
                        .get(idx + 1)
                        .ok_or(DnsBufferError::MalformedName { offset: idx })?;
                    let target = (((len & !POINTER_MASK) as usize) << 8) | low as usize;

                    if target >= data.len() {
                        return Err(DnsBufferError::MalformedName { offset: idx });
                    }
                    if !visited.insert(target) {
                        return Err(DnsBufferError::PointerCycle { offset: idx });
                    }

                    resume.get_or_insert(idx + 2);
                    idx = target;
                }
                0 if len == 0 => {
                    idx += 1;
                    break;
                }
                0 => {
                    let begin = idx + 1;
                    let end = begin + len as usize;
                    let raw = data
                        .get(begin..end)
                        .ok_or(DnsBufferError::MalformedName { offset: idx })?;

                    encoded += raw.len() + 1;
                    if encoded > MAX_NAME_LEN {
                        return Err(DnsBufferError::NameTooLong);
                    }

                    let label = str::from_utf8(raw)
                        .map_err(|_| DnsBufferError::MalformedName { offset: idx })?;
                    labels.push(label);
                    idx = end;
                }
                // 0b01 and 0b10 prefixes are reserved
                _ => return Err(DnsBufferError::MalformedName { offset: idx }),
            }
        }

        let name = if labels.is_empty() {
            ".".to_string()
        } else {
            labels.join(".")
        };

        Ok((name, resume.unwrap_or(idx)))
    }
}

impl DnsWriteBuffer {
    /// Creates a new empty `DnsWriteBuffer`.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Writes a single byte to the buffer.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Writes a 16-bit unsigned integer in big-endian order to the buffer.
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a 32-bit unsigned integer in big-endian order to the buffer.
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes raw bytes to the buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Consumes the builder and hands out the finished message.
    pub fn finish(self) -> Box<[u8]> {
        self.data.into_boxed_slice()
    }

    /// Writes a DNS domain name to the buffer, without compression.
    ///
    /// Splits the name by `.` and writes each label preceded by its length,
    /// followed by a zero-length byte to terminate the name. A single
    /// trailing dot is accepted; `""` and `"."` encode the root.
    ///
    /// Nothing is written if the name is rejected.
    ///
    /// # Errors
    /// `LabelTooLong` for a label over 63 bytes, `MalformedName` for an
    /// empty label, `NameTooLong` past 255 encoded bytes.
    pub fn write_str(&mut self, name: &str) -> Result<(), DnsBufferError> {
        let encoded = encode_name(name)?;
        self.write_bytes(&encoded);
        Ok(())
    }
}

/// Label-encodes `name` into a fresh vector.
pub fn encode_name(name: &str) -> Result<Vec<u8>, DnsBufferError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    let mut out = Vec::with_capacity(trimmed.len() + 2);

    if !trimmed.is_empty() {
        let mut offset = 0;
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(DnsBufferError::MalformedName { offset });
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsBufferError::LabelTooLong(label.to_string()));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
            offset += label.len() + 1;
        }
    }
    out.push(0);

    if out.len() > MAX_NAME_LEN {
        return Err(DnsBufferError::NameTooLong);
    }
    Ok(out)
}
