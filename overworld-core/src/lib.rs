//! Overworld RNG Session Core
//!
//! Platform-agnostic client logic for following a running game's RNG:
//! owning buffers in the deterministic engine's memory, the shadow RNG
//! tracker, the session poller, filter encoding and generation requests.
//! The browser host and the engine binding live in `overworld-web`.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod filters;
pub mod generate;
pub mod model;
pub mod session;
pub mod shadow;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use bridge::{BridgeError, ForeignBuffer, MemoryBridge};
pub use config::{ConfigError, SessionConfig};
pub use engine::{Address, Engine, EngineError};
pub use filters::{
    FilterError, FilterKind, FilterOption, FilterSelection, Iv, IvRange, OptionTable,
    decode_bit_array, decode_bitfield, encode_bit_array, encode_bitfield,
};
pub use generate::{Baseline, GenerateError, ResultSet, generate, generate_from_baseline};
pub use model::{
    Charms, EncounterSlot, EncounterSlotTable, EncounterSummary, EncounterTemplate, EncounterType,
    Filters, GimmickSpec, Mark, ModelError, OverworldSpec, PlayerPosition, RngState, Settings,
    Spawner, SpawnerSummary, Weather,
};
pub use session::{
    ConnectionState, ContextField, Pause, RemoteEndpoint, RemoteError, Session, SessionContext,
    SessionControl, SessionError, TickReport,
};
pub use shadow::{ShadowHandle, ShadowTracker, ShadowUpdate};
