//! In-memory stand-in for the engine used by unit tests.

use crate::engine::{Address, Engine, EngineError, check_range};
use crate::model::{
    EncounterSlotTable, GimmickSpec, OverworldSpec, RngState, STAT_COUNT, Settings,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Matches the engine's own bounded search in `xoroshiroUpdate`.
pub const SEARCH_LIMIT: u64 = 1_000_000;

const DEFAULT_MEMORY: usize = 1 << 20;
const RESULTS_PER_REQUEST: u32 = 4;

pub fn step(state: RngState) -> RngState {
    let [s0, mut s1] = state.0;
    s1 ^= s0;
    RngState([s0.rotate_left(24) ^ s1 ^ (s1 << 16), s1.rotate_left(37)])
}

pub fn advance(mut state: RngState, steps: u64) -> RngState {
    for _ in 0..steps {
        state = step(state);
    }
    state
}

pub struct FakeEngine {
    memory: RefCell<Vec<u8>>,
    next_free: Cell<usize>,
    live: RefCell<BTreeMap<Address, u32>>,
    double_frees: Cell<usize>,
    /// Allocations still allowed before every further one fails.
    allocation_budget: Cell<Option<usize>>,
    calls: RefCell<Vec<&'static str>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_memory(DEFAULT_MEMORY)
    }

    pub fn with_memory(size: usize) -> Self {
        Self {
            memory: RefCell::new(vec![0; size]),
            next_free: Cell::new(8),
            live: RefCell::new(BTreeMap::new()),
            double_frees: Cell::new(0),
            allocation_budget: Cell::new(None),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn double_frees(&self) -> usize {
        self.double_frees.get()
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.allocation_budget.set(fail.then_some(0));
    }

    /// Let `n` more allocations through, then fail the rest.
    pub fn fail_allocations_after(&self, n: usize) {
        self.allocation_budget.set(Some(n));
    }

    pub fn calls(&self, entry: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == entry).count()
    }

    pub fn fill(&self, address: Address, len: usize, byte: u8) {
        let start = address as usize;
        self.memory.borrow_mut()[start..start + len].fill(byte);
    }

    fn record(&self, entry: &'static str) {
        self.calls.borrow_mut().push(entry);
    }

    fn read_state(&self, address: Address) -> Result<RngState, EngineError> {
        let bytes = self.read_memory(address, RngState::BYTE_LEN)?;
        RngState::from_le_bytes(&bytes).map_err(|err| EngineError::Trap {
            entry: "read_state",
            message: err.to_string(),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        entry: &'static str,
        address: Address,
    ) -> Result<T, EngineError> {
        let memory = self.memory.borrow();
        let start = address as usize;
        let end = memory[start..]
            .iter()
            .position(|b| *b == 0)
            .map(|nul| start + nul)
            .ok_or(EngineError::Trap {
                entry,
                message: "unterminated".to_string(),
            })?;
        serde_json::from_slice(&memory[start..end]).map_err(|err| EngineError::Trap {
            entry,
            message: err.to_string(),
        })
    }

    fn emit(&self, specs: &[OverworldSpec]) -> Result<Address, EngineError> {
        let mut text = serde_json::to_vec(specs).map_err(|err| EngineError::Trap {
            entry: "emit",
            message: err.to_string(),
        })?;
        text.push(0);
        let size = u32::try_from(text.len()).unwrap_or(u32::MAX);
        let address = self.allocate_bytes(size)?;
        self.write_memory(address, &text)?;
        Ok(address)
    }

    fn roll(
        settings: &Settings,
        state: RngState,
        species: u16,
        level: u8,
    ) -> Vec<OverworldSpec> {
        let mut rng = advance(state, u64::from(settings.min_advance));
        (0..settings.total_advances.min(RESULTS_PER_REQUEST))
            .map(|i| {
                let word = rng.0[0].wrapping_add(rng.0[1]);
                rng = step(rng);
                let mut ivs = [0i8; STAT_COUNT];
                for (slot, iv) in ivs.iter_mut().enumerate() {
                    *iv = ((word >> (slot * 5)) & 31) as i8;
                }
                OverworldSpec {
                    advance: settings.min_advance + i,
                    species,
                    form: 0,
                    level,
                    shininess: 0,
                    nature: (word % 25) as i8,
                    gender: 1,
                    ability: 1,
                    held_item: 0,
                    guaranteed_ivs: 0,
                    ivs,
                    mark: None,
                    brilliant_level: 0,
                    fixed_seed: (word >> 32) as u32,
                    scale: 0,
                    ec: word as u32,
                    pid: (word >> 16) as u32,
                    rotation: 0.0,
                    distance: 0.0,
                    slot: 0,
                }
            })
            .collect()
    }
}

impl Engine for FakeEngine {
    fn allocate_bytes(&self, size: u32) -> Result<Address, EngineError> {
        match self.allocation_budget.get() {
            Some(0) => return Err(EngineError::AllocationFailed { size }),
            Some(n) => self.allocation_budget.set(Some(n - 1)),
            None => {}
        }
        let start = self.next_free.get();
        let end = start + size as usize;
        if end > self.memory.borrow().len() {
            return Err(EngineError::AllocationFailed { size });
        }
        self.next_free.set((end + 7) & !7);
        let address = Address::try_from(start).unwrap_or(0);
        self.live.borrow_mut().insert(address, size);
        Ok(address)
    }

    fn delete_bytes(&self, address: Address) {
        if self.live.borrow_mut().remove(&address).is_none() {
            self.double_frees.set(self.double_frees.get() + 1);
        }
    }

    fn memory_size(&self) -> usize {
        self.memory.borrow().len()
    }

    fn write_memory(&self, address: Address, bytes: &[u8]) -> Result<(), EngineError> {
        let mut memory = self.memory.borrow_mut();
        let start = check_range(address, bytes.len(), memory.len())?;
        memory[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>, EngineError> {
        let memory = self.memory.borrow();
        let start = check_range(address, len, memory.len())?;
        Ok(memory[start..start + len].to_vec())
    }

    fn xoroshiro(&self, state: Address) -> Result<Address, EngineError> {
        self.record("xoroshiro");
        let seed = self.read_state(state)?;
        let handle = self.allocate_bytes(16)?;
        self.write_memory(handle, &seed.to_le_bytes())?;
        Ok(handle)
    }

    fn xoroshiro_update(&self, handle: Address, observed: Address) -> Result<u64, EngineError> {
        self.record("xoroshiroUpdate");
        let target = self.read_state(observed)?;
        let mut current = self.read_state(handle)?;
        let mut advances = 0;
        while current != target && advances < SEARCH_LIMIT {
            current = step(current);
            advances += 1;
        }
        self.write_memory(handle, &current.to_le_bytes())?;
        Ok(advances)
    }

    fn generate_slots(
        &self,
        settings: Address,
        _filters: Address,
        slot_table: Address,
        state: Address,
    ) -> Result<Address, EngineError> {
        self.record("generateSlots");
        let settings: Settings = self.read_json("generateSlots", settings)?;
        let table: EncounterSlotTable = self.read_json("generateSlots", slot_table)?;
        let species = table.occupied().next().map_or(0, |(_, slot)| slot.species);
        let specs = Self::roll(&settings, self.read_state(state)?, species, table.min_level);
        self.emit(&specs)
    }

    fn generate_gimmicks(
        &self,
        settings: Address,
        _filters: Address,
        gimmick_spec: Address,
        state: Address,
    ) -> Result<Address, EngineError> {
        self.record("generateGimmicks");
        let settings: Settings = self.read_json("generateGimmicks", settings)?;
        let spec: GimmickSpec = self.read_json("generateGimmicks", gimmick_spec)?;
        let specs = Self::roll(&settings, self.read_state(state)?, spec.species, spec.level);
        self.emit(&specs)
    }
}
