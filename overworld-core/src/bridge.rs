//! Ownership of byte buffers inside the engine's private memory.
//!
//! The engine has no garbage collector, so every address it hands out must be
//! returned through `deleteBytes` exactly once. [`ForeignBuffer`] ties that
//! release to `Drop`: a buffer is freed when its last owner goes out of scope,
//! including on early returns and `?` paths, and can never be freed while a
//! local reference still exists.

use crate::engine::{Address, Engine, EngineError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Chunk size used when scanning engine memory for a NUL terminator.
const SCAN_CHUNK: usize = 256;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{len} bytes do not fit in a {size} byte buffer")]
    Overflow { len: usize, size: u32 },
    #[error("no NUL terminator after {address:#x} before the end of engine memory")]
    Unterminated { address: Address },
    #[error("engine returned text that is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("JSON interchange error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A byte range inside engine memory, released on drop.
pub struct ForeignBuffer<E: Engine> {
    engine: Rc<E>,
    address: Address,
    size: Option<u32>,
}

impl<E: Engine> ForeignBuffer<E> {
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Allocated size, or `None` for buffers the engine allocated itself.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        self.size
    }

    /// Copy `bytes` to the start of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Overflow`] if `bytes` is longer than the buffer,
    /// or an engine error if the range is outside engine memory.
    pub fn write(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        if let Some(size) = self.size
            && bytes.len() > size as usize
        {
            return Err(BridgeError::Overflow {
                len: bytes.len(),
                size,
            });
        }
        self.engine.write_memory(self.address, bytes)?;
        Ok(())
    }

    /// Read from the start of the buffer up to, not including, the first NUL.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unterminated`] if engine memory ends first.
    pub fn read_c_string(&self) -> Result<Vec<u8>, BridgeError> {
        let memory = self.engine.memory_size();
        let mut cursor = self.address as usize;
        let mut out = Vec::new();
        while cursor < memory {
            let len = SCAN_CHUNK.min(memory - cursor);
            let chunk = self.engine.read_memory(cursor as Address, len)?;
            if let Some(nul) = chunk.iter().position(|b| *b == 0) {
                out.extend_from_slice(&chunk[..nul]);
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
            cursor += len;
        }
        Err(BridgeError::Unterminated {
            address: self.address,
        })
    }

    /// Read the buffer as NUL-terminated UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is unterminated or not UTF-8.
    pub fn read_text(&self) -> Result<String, BridgeError> {
        Ok(String::from_utf8(self.read_c_string()?)?)
    }

    /// Read the buffer as NUL-terminated JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be read or parsed as `T`.
    pub fn read_structured<T: DeserializeOwned>(&self) -> Result<T, BridgeError> {
        Ok(serde_json::from_str(&self.read_text()?)?)
    }
}

impl<E: Engine> Drop for ForeignBuffer<E> {
    fn drop(&mut self) {
        log::trace!("releasing engine buffer at {:#x}", self.address);
        self.engine.delete_bytes(self.address);
    }
}

impl<E: Engine> fmt::Debug for ForeignBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignBuffer")
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .finish()
    }
}

/// Allocation and marshaling entry point for one engine instance.
pub struct MemoryBridge<E: Engine> {
    engine: Rc<E>,
}

impl<E: Engine> Clone for MemoryBridge<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Rc::clone(&self.engine),
        }
    }
}

impl<E: Engine> MemoryBridge<E> {
    pub fn new(engine: E) -> Self {
        Self::from_shared(Rc::new(engine))
    }

    pub const fn from_shared(engine: Rc<E>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Reserve at least `size` bytes of engine memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate.
    pub fn allocate(&self, size: u32) -> Result<ForeignBuffer<E>, BridgeError> {
        let address = self.engine.allocate_bytes(size)?;
        if address == 0 {
            return Err(EngineError::AllocationFailed { size }.into());
        }
        Ok(ForeignBuffer {
            engine: Rc::clone(&self.engine),
            address,
            size: Some(size),
        })
    }

    /// Take ownership of a buffer the engine allocated on our behalf.
    ///
    /// # Errors
    ///
    /// A null address means the engine failed to allocate its result.
    pub fn adopt(&self, address: Address) -> Result<ForeignBuffer<E>, BridgeError> {
        if address == 0 {
            return Err(EngineError::AllocationFailed { size: 0 }.into());
        }
        Ok(ForeignBuffer {
            engine: Rc::clone(&self.engine),
            address,
            size: None,
        })
    }

    /// Allocate a buffer holding exactly `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the copy fails.
    pub fn allocate_raw(&self, bytes: &[u8]) -> Result<ForeignBuffer<E>, BridgeError> {
        let size = u32::try_from(bytes.len()).map_err(|_| BridgeError::Overflow {
            len: bytes.len(),
            size: u32::MAX,
        })?;
        let buffer = self.allocate(size)?;
        buffer.write(bytes)?;
        Ok(buffer)
    }

    /// Allocate `text` as UTF-8 followed by a NUL terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the copy fails.
    pub fn allocate_text(&self, text: &str) -> Result<ForeignBuffer<E>, BridgeError> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.allocate_raw(&bytes)
    }

    /// Serialize `value` to JSON and allocate it as text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, allocation or the copy fails.
    pub fn allocate_structured<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<ForeignBuffer<E>, BridgeError> {
        let json = serde_json::to_string(value)?;
        self.allocate_text(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;
    use serde_json::json;

    #[test]
    fn buffers_are_released_exactly_once_on_drop() {
        let bridge = MemoryBridge::new(FakeEngine::new());
        let first = bridge.allocate(32).unwrap();
        let second = bridge.allocate_text("hello").unwrap();
        assert_eq!(bridge.engine().live_allocations(), 2);

        drop(first);
        assert_eq!(bridge.engine().live_allocations(), 1);
        drop(second);
        assert_eq!(bridge.engine().live_allocations(), 0);
        assert_eq!(bridge.engine().double_frees(), 0);
    }

    #[test]
    fn buffers_are_released_on_error_paths() {
        fn fails_midway(bridge: &MemoryBridge<FakeEngine>) -> Result<(), BridgeError> {
            let _held = bridge.allocate(8)?;
            bridge.engine().fail_allocations(true);
            let _never = bridge.allocate(8)?;
            Ok(())
        }

        let bridge = MemoryBridge::new(FakeEngine::new());
        let err = fails_midway(&bridge).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Engine(EngineError::AllocationFailed { size: 8 })
        ));
        assert_eq!(bridge.engine().live_allocations(), 0);
    }

    #[test]
    fn write_rejects_oversized_payloads() {
        let bridge = MemoryBridge::new(FakeEngine::new());
        let buffer = bridge.allocate(4).unwrap();
        assert!(buffer.write(&[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            buffer.write(&[1, 2, 3, 4, 5]),
            Err(BridgeError::Overflow { len: 5, size: 4 })
        ));
    }

    #[test]
    fn text_round_trips_through_c_strings() {
        let bridge = MemoryBridge::new(FakeEngine::new());
        let long = "x".repeat(SCAN_CHUNK * 2 + 7);
        let buffer = bridge.allocate_text(&long).unwrap();
        assert_eq!(buffer.size(), Some(u32::try_from(long.len() + 1).unwrap()));
        assert_eq!(buffer.read_text().unwrap(), long);

        let embedded = bridge.allocate_raw(b"abc\0def\0").unwrap();
        assert_eq!(embedded.read_c_string().unwrap(), b"abc");
    }

    #[test]
    fn structured_values_are_json_encoded() {
        let bridge = MemoryBridge::new(FakeEngine::new());
        let buffer = bridge.allocate_structured(&json!({ "minLevel": 3 })).unwrap();
        assert_eq!(buffer.read_text().unwrap(), r#"{"minLevel":3}"#);
        let value: serde_json::Value = buffer.read_structured().unwrap();
        assert_eq!(value["minLevel"], 3);
    }

    #[test]
    fn unterminated_strings_are_reported() {
        let bridge = MemoryBridge::new(FakeEngine::with_memory(64));
        let buffer = bridge.allocate(8).unwrap();
        bridge.engine().fill(buffer.address(), 64 - buffer.address() as usize, b'z');
        assert!(matches!(
            buffer.read_c_string(),
            Err(BridgeError::Unterminated { .. })
        ));
    }

    #[test]
    fn adopting_null_is_an_allocation_failure() {
        let bridge = MemoryBridge::new(FakeEngine::new());
        assert!(matches!(
            bridge.adopt(0),
            Err(BridgeError::Engine(EngineError::AllocationFailed { size: 0 }))
        ));
    }
}
