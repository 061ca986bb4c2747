//! Call contract of the deterministic engine.
//!
//! The engine is a separately compiled module with its own linear memory and
//! no knowledge of caller lifetimes. Everything it consumes or produces lives
//! at an [`Address`] inside that memory; ownership of those addresses is
//! managed by [`crate::bridge`], never by callers of this trait directly.

use thiserror::Error;

/// Byte offset into the engine's linear memory.
pub type Address = u32;

/// Errors surfaced by an engine call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine could not allocate {size} bytes")]
    AllocationFailed { size: u32 },
    #[error("engine call `{entry}` trapped: {message}")]
    Trap { entry: &'static str, message: String },
    #[error("access of {len} bytes at {address:#x} is outside engine memory ({memory} bytes)")]
    OutOfBounds {
        address: Address,
        len: usize,
        memory: usize,
    },
    #[error("engine entry point `{0}` is missing")]
    MissingExport(&'static str),
}

/// Entry points exported by the engine plus access to its memory.
///
/// Calls are synchronous and never re-entrant; implementations are used from a
/// single flow of control and need not be `Send`.
pub trait Engine {
    /// `allocateBytes(size) -> address`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine traps or reports a null address.
    fn allocate_bytes(&self, size: u32) -> Result<Address, EngineError>;

    /// `deleteBytes(address)`. Release failures cannot be reported anywhere
    /// useful, so implementations log and swallow them.
    fn delete_bytes(&self, address: Address);

    /// Current size of the engine memory in bytes.
    fn memory_size(&self) -> usize;

    /// Copy `bytes` into engine memory at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range falls outside engine memory.
    fn write_memory(&self, address: Address, bytes: &[u8]) -> Result<(), EngineError>;

    /// Copy `len` bytes out of engine memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range falls outside engine memory.
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>, EngineError>;

    /// `xoroshiro(stateAddress) -> handle`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine traps.
    fn xoroshiro(&self, state: Address) -> Result<Address, EngineError>;

    /// `xoroshiroUpdate(handle, observedStateAddress) -> advanceCount`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine traps.
    fn xoroshiro_update(&self, handle: Address, observed: Address) -> Result<u64, EngineError>;

    /// `generateSlots(settings, filters, slotTable, state) -> resultAddress`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine traps.
    fn generate_slots(
        &self,
        settings: Address,
        filters: Address,
        slot_table: Address,
        state: Address,
    ) -> Result<Address, EngineError>;

    /// `generateGimmicks(settings, filters, gimmickSpec, state) -> resultAddress`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine traps.
    fn generate_gimmicks(
        &self,
        settings: Address,
        filters: Address,
        gimmick_spec: Address,
        state: Address,
    ) -> Result<Address, EngineError>;
}

/// Bounds check shared by memory-backed engine implementations.
///
/// # Errors
///
/// Returns [`EngineError::OutOfBounds`] when `address + len` exceeds `memory`.
pub fn check_range(address: Address, len: usize, memory: usize) -> Result<usize, EngineError> {
    let start = usize::try_from(address).unwrap_or(usize::MAX);
    match start.checked_add(len) {
        Some(end) if end <= memory => Ok(start),
        _ => Err(EngineError::OutOfBounds {
            address,
            len,
            memory,
        }),
    }
}
