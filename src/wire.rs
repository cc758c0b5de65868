//! A fixed-capacity byte buffer with a cursor, used for both packet parsing
//! and response serialization. Name compression state lives here so the
//! codec can stay oblivious to offsets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AuthNsError;
use crate::{MAX_NAME_JUMPS, MAX_PACKET_BYTES};

/// Compression pointers can only reference the first 16KiB of a message.
const MAX_POINTER_TARGET: usize = 0x4000;
const MAX_LABEL_BYTES: usize = 63;
const MAX_NAME_BYTES: usize = 255;

pub struct WireBuffer {
    data: Vec<u8>,
    pos: usize,
    /// Logical length: bytes loaded for parsing, or high-water mark while writing.
    len: usize,
    /// suffix -> first offset, only present when writing with compression
    compress: Option<HashMap<String, u16>>,
}

impl Default for WireBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WireBuffer {
    pub fn new() -> Self {
        WireBuffer {
            data: vec![0u8; MAX_PACKET_BYTES],
            pos: 0,
            len: 0,
            compress: None,
        }
    }

    /// Back to a blank slate, ready for the next request.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.len = 0;
        self.compress = None;
    }

    /// Load raw packet bytes for parsing. Fails when the input exceeds the
    /// 65,535 byte ceiling.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), AuthNsError> {
        if bytes.len() > MAX_PACKET_BYTES {
            return Err(AuthNsError::OutOfBounds);
        }
        self.reset();
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    /// Turn on the suffix map. Responses get this; canonical forms for
    /// signing and TSIG verification do not.
    pub fn enable_compression(&mut self) {
        self.compress = Some(HashMap::new());
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The serialized (or loaded) bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), AuthNsError> {
        if pos > MAX_PACKET_BYTES {
            return Err(AuthNsError::OutOfBounds);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn step(&mut self, n: usize) -> Result<(), AuthNsError> {
        self.seek(self.pos + n)
    }

    fn check_read(&self, pos: usize, n: usize) -> Result<(), AuthNsError> {
        if pos + n > self.len {
            return Err(AuthNsError::EndOfBuffer);
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, AuthNsError> {
        self.check_read(self.pos, 1)?;
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16, AuthNsError> {
        self.check_read(self.pos, 2)?;
        let val = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    pub fn read_u32(&mut self) -> Result<u32, AuthNsError> {
        self.check_read(self.pos, 4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(raw))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, AuthNsError> {
        self.check_read(self.pos, n)?;
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    /// Random-access read without touching the cursor.
    pub fn get_range(&self, start: usize, n: usize) -> Result<&[u8], AuthNsError> {
        if start + n > self.len {
            return Err(AuthNsError::OutOfBounds);
        }
        Ok(&self.data[start..start + n])
    }

    fn get_u8_at(&self, pos: usize) -> Result<u8, AuthNsError> {
        self.check_read(pos, 1)?;
        Ok(self.data[pos])
    }

    fn check_write(&self, pos: usize, n: usize) -> Result<(), AuthNsError> {
        if pos + n > MAX_PACKET_BYTES {
            return Err(AuthNsError::EndOfBuffer);
        }
        Ok(())
    }

    pub fn write_u8(&mut self, val: u8) -> Result<(), AuthNsError> {
        self.check_write(self.pos, 1)?;
        self.data[self.pos] = val;
        self.pos += 1;
        self.len = self.len.max(self.pos);
        Ok(())
    }

    pub fn write_u16(&mut self, val: u16) -> Result<(), AuthNsError> {
        self.write_bytes(&val.to_be_bytes())
    }

    pub fn write_u32(&mut self, val: u32) -> Result<(), AuthNsError> {
        self.write_bytes(&val.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), AuthNsError> {
        self.check_write(self.pos, bytes.len())?;
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.len = self.len.max(self.pos);
        Ok(())
    }

    /// Overwrite two bytes in place, used to backpatch RDLENGTH fields.
    pub fn set_u16(&mut self, pos: usize, val: u16) -> Result<(), AuthNsError> {
        if pos + 2 > self.len {
            return Err(AuthNsError::OutOfBounds);
        }
        self.data[pos..pos + 2].copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    /// Decode a name at the cursor. Follows compression pointers through the
    /// original buffer, advancing the cursor only past the first pointer
    /// encountered. Lowercases labels; the root decodes to ".".
    pub fn read_name(&mut self) -> Result<String, AuthNsError> {
        let mut name = String::new();
        let mut ptr = self.pos;
        let mut jumps = 0usize;
        let mut jumped = false;

        loop {
            let len = self.get_u8_at(ptr)? as usize;
            if len & 0xC0 == 0xC0 {
                if jumps >= MAX_NAME_JUMPS {
                    return Err(AuthNsError::TooManyJumps);
                }
                let low = self.get_u8_at(ptr + 1)? as usize;
                let target = ((len & 0x3F) << 8) | low;
                if !jumped {
                    self.pos = ptr + 2;
                    jumped = true;
                }
                ptr = target;
                jumps += 1;
                continue;
            }
            if len == 0 {
                if !jumped {
                    self.pos = ptr + 1;
                }
                break;
            }
            if len > MAX_LABEL_BYTES {
                return Err(AuthNsError::LabelTooLong);
            }
            self.check_read(ptr + 1, len)?;
            if name.len() + len + 1 > MAX_NAME_BYTES {
                return Err(AuthNsError::NameTooLong);
            }
            for byte in &self.data[ptr + 1..ptr + 1 + len] {
                name.push(byte.to_ascii_lowercase() as char);
            }
            name.push('.');
            ptr += len + 1;
        }

        if name.is_empty() {
            name.push('.');
        }
        Ok(name)
    }

    /// Encode a name at the cursor. With compression enabled, known suffixes
    /// become pointers and new suffixes below 0x4000 are remembered.
    pub fn write_name(&mut self, name: &str) -> Result<(), AuthNsError> {
        let trimmed = name.trim_end_matches('.');
        if trimmed.is_empty() {
            return self.write_u8(0);
        }
        let labels: Vec<&str> = trimmed.split('.').collect();
        for (idx, label) in labels.iter().enumerate() {
            if self.compress.is_some() {
                let suffix = {
                    let mut s = labels[idx..].join(".").to_ascii_lowercase();
                    s.push('.');
                    s
                };
                if let Some(map) = &self.compress {
                    if let Some(&offset) = map.get(&suffix) {
                        return self.write_u16(0xC000 | offset);
                    }
                }
                if self.pos < MAX_POINTER_TARGET {
                    if let Some(map) = &mut self.compress {
                        map.insert(suffix, self.pos as u16);
                    }
                }
            }
            if label.len() > MAX_LABEL_BYTES {
                return Err(AuthNsError::LabelTooLong);
            }
            self.write_u8(label.len() as u8)?;
            self.write_bytes(label.to_ascii_lowercase().as_bytes())?;
        }
        self.write_u8(0)
    }

    /// Encode a name as plain labels, never a pointer and never recorded in
    /// the suffix map. SRV targets, RRSIG signer names, NSEC next names and
    /// every canonical signing form go through here.
    pub fn write_name_plain(&mut self, name: &str) -> Result<(), AuthNsError> {
        let trimmed = name.trim_end_matches('.');
        if trimmed.is_empty() {
            return self.write_u8(0);
        }
        for label in trimmed.split('.') {
            if label.len() > MAX_LABEL_BYTES {
                return Err(AuthNsError::LabelTooLong);
            }
            self.write_u8(label.len() as u8)?;
            self.write_bytes(label.to_ascii_lowercase().as_bytes())?;
        }
        self.write_u8(0)
    }
}

impl std::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireBuffer")
            .field("pos", &self.pos)
            .field("len", &self.len)
            .field("compressing", &self.compress.is_some())
            .finish()
    }
}

/// A pool of WireBuffers so the hot path never allocates 64KiB per packet.
/// Buffers hand back to the pool on drop, which covers every exit path of a
/// request including errors.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<Vec<WireBuffer>>>,
}

impl BufferPool {
    pub fn new(prealloc: usize) -> Self {
        let mut buffers = Vec::with_capacity(prealloc);
        for _ in 0..prealloc {
            buffers.push(WireBuffer::new());
        }
        BufferPool {
            inner: Arc::new(Mutex::new(buffers)),
        }
    }

    pub fn acquire(&self) -> PooledBuffer {
        let buf = {
            let mut pool = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            pool.pop()
        };
        let mut buf = buf.unwrap_or_default();
        buf.reset();
        PooledBuffer {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }
}

pub struct PooledBuffer {
    buf: Option<WireBuffer>,
    pool: Arc<Mutex<Vec<WireBuffer>>>,
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut pool = match self.pool.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            pool.push(buf);
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = WireBuffer;

    fn deref(&self) -> &WireBuffer {
        self.buf.as_ref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut WireBuffer {
        self.buf.as_mut().expect("buffer present until drop")
    }
}
