//! Local model of the remote RNG, kept in step by observed-state matching.

use crate::bridge::{BridgeError, ForeignBuffer, MemoryBridge};
use crate::engine::Engine;
use crate::model::RngState;

/// Largest step distance the engine searches before giving up.
pub const ENGINE_SEARCH_LIMIT: u64 = 1_000_000;

/// Default distance at which the shadow is considered desynchronized.
pub const DEFAULT_DESYNC_CEILING: u64 = ENGINE_SEARCH_LIMIT;

/// Engine-side RNG instance seeded from an observed state.
#[derive(Debug)]
pub struct ShadowHandle<E: Engine> {
    buffer: ForeignBuffer<E>,
    seed: RngState,
}

impl<E: Engine> ShadowHandle<E> {
    /// State the instance was created from.
    #[must_use]
    pub const fn seed(&self) -> RngState {
        self.seed
    }
}

/// Outcome of feeding one observed state to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowUpdate {
    /// There was no shadow yet; one was created from the observed state.
    Initialized,
    /// The shadow caught up by this many steps.
    Advanced(u64),
    /// The distance reached the ceiling; the shadow was reseeded.
    Resynced,
}

impl ShadowUpdate {
    /// Steps to add to the running advance tally.
    #[must_use]
    pub const fn advances(self) -> u64 {
        match self {
            Self::Advanced(n) => n,
            Self::Initialized | Self::Resynced => 0,
        }
    }
}

pub struct ShadowTracker<E: Engine> {
    bridge: MemoryBridge<E>,
    handle: Option<ShadowHandle<E>>,
    ceiling: u64,
}

impl<E: Engine> ShadowTracker<E> {
    pub fn new(bridge: MemoryBridge<E>) -> Self {
        Self::with_ceiling(bridge, DEFAULT_DESYNC_CEILING)
    }

    /// `ceiling` is clamped to `1..=ENGINE_SEARCH_LIMIT`; the engine cannot
    /// report distances beyond its own search bound.
    pub fn with_ceiling(bridge: MemoryBridge<E>, ceiling: u64) -> Self {
        Self {
            bridge,
            handle: None,
            ceiling: ceiling.clamp(1, ENGINE_SEARCH_LIMIT),
        }
    }

    #[must_use]
    pub const fn ceiling(&self) -> u64 {
        self.ceiling
    }

    #[must_use]
    pub const fn handle(&self) -> Option<&ShadowHandle<E>> {
        self.handle.as_ref()
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    /// Replace the shadow with a fresh instance seeded from `observed`.
    ///
    /// The previous handle is released before the new one is created. On
    /// failure the tracker is left without a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate the state or instance.
    pub fn initialize(&mut self, observed: RngState) -> Result<(), BridgeError> {
        self.handle = None;
        let state = self.bridge.allocate_raw(&observed.to_le_bytes())?;
        let address = self.bridge.engine().xoroshiro(state.address())?;
        let buffer = self.bridge.adopt(address)?;
        log::debug!("shadow rng seeded at {:#x} from {observed:x?}", buffer.address());
        self.handle = Some(ShadowHandle {
            buffer,
            seed: observed,
        });
        Ok(())
    }

    /// Advance the shadow until it matches `observed`.
    ///
    /// # Errors
    ///
    /// Returns an error if an engine call fails; the shadow is then in an
    /// unknown position and the next call should be treated as unreliable.
    pub fn update(&mut self, observed: RngState) -> Result<ShadowUpdate, BridgeError> {
        let Some(shadow) = self.handle.as_ref().map(|h| h.buffer.address()) else {
            self.initialize(observed)?;
            return Ok(ShadowUpdate::Initialized);
        };
        let state = self.bridge.allocate_raw(&observed.to_le_bytes())?;
        let advances = self
            .bridge
            .engine()
            .xoroshiro_update(shadow, state.address())?;
        drop(state);

        if advances >= self.ceiling {
            log::info!(
                "shadow rng desynchronized ({advances} >= {}), reseeding",
                self.ceiling
            );
            self.initialize(observed)?;
            return Ok(ShadowUpdate::Resynced);
        }
        Ok(ShadowUpdate::Advanced(advances))
    }
}
