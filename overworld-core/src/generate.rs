//! Builds engine generation requests from the current session context.

use crate::bridge::{BridgeError, MemoryBridge};
use crate::engine::Engine;
use crate::model::{EncounterTemplate, Filters, OverworldSpec, RngState, Settings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation failed: {0}")]
    Bridge(#[from] BridgeError),
}

/// RNG state the displayed advance counter is anchored to.
///
/// Set at connect time and again whenever the shadow is reseeded, together
/// with the advance count displayed at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub state: RngState,
    pub advance: u64,
}

/// Run one generation request against the engine.
///
/// The call shape follows `settings.encounter_type`. A missing template, or a
/// template of the other mode, yields an empty result without touching the
/// engine. Every buffer allocated here is released before returning.
///
/// # Errors
///
/// Returns an error if an allocation fails, the engine traps, or its result is
/// not a JSON list of [`OverworldSpec`].
pub fn generate<E: Engine>(
    bridge: &MemoryBridge<E>,
    settings: &Settings,
    filters: &Filters,
    template: Option<&EncounterTemplate>,
    state: RngState,
) -> Result<Vec<OverworldSpec>, GenerateError> {
    let Some(template) = template.filter(|t| t.encounter_type() == settings.encounter_type) else {
        log::debug!(
            "no {:?} template for generation, skipping",
            settings.encounter_type
        );
        return Ok(Vec::new());
    };

    let run = || -> Result<Vec<OverworldSpec>, BridgeError> {
        let settings_buf = bridge.allocate_structured(settings)?;
        let filters_buf = bridge.allocate_structured(filters)?;
        let state_buf = bridge.allocate_raw(&state.to_le_bytes())?;
        let engine = bridge.engine();
        let result = match template {
            EncounterTemplate::Gimmick(spec) => {
                let spec_buf = bridge.allocate_structured(spec)?;
                engine.generate_gimmicks(
                    settings_buf.address(),
                    filters_buf.address(),
                    spec_buf.address(),
                    state_buf.address(),
                )?
            }
            EncounterTemplate::Symbol(table) => {
                let table_buf = bridge.allocate_structured(table)?;
                engine.generate_slots(
                    settings_buf.address(),
                    filters_buf.address(),
                    table_buf.address(),
                    state_buf.address(),
                )?
            }
        };
        bridge.adopt(result)?.read_structured()
    };

    run().map_err(|err| {
        log::error!("generation failed: {err}");
        GenerateError::from(err)
    })
}

/// Generate from a session baseline, rebasing the advance window.
///
/// The engine counts advances from the state it is given, while the user sees
/// advances counted since connect. `settings.min_advance` is shifted down by
/// the baseline advance before the call and every result is shifted back up,
/// so the window the user asked for and the advances reported agree. Any part
/// of the window before the baseline is unreachable and dropped.
///
/// # Errors
///
/// Same as [`generate`].
pub fn generate_from_baseline<E: Engine>(
    bridge: &MemoryBridge<E>,
    settings: &Settings,
    filters: &Filters,
    template: Option<&EncounterTemplate>,
    baseline: Baseline,
) -> Result<Vec<OverworldSpec>, GenerateError> {
    let offset = u32::try_from(baseline.advance).unwrap_or(u32::MAX);
    let mut rebased = settings.clone();
    rebased.min_advance = settings.min_advance.saturating_sub(offset);
    let unreachable = offset.saturating_sub(settings.min_advance);
    rebased.total_advances = settings.total_advances.saturating_sub(unreachable);

    let mut results = generate(bridge, &rebased, filters, template, baseline.state)?;
    for spec in &mut results {
        spec.advance = spec.advance.saturating_add(offset);
    }
    Ok(results)
}

/// The most recent generation output. Each new result set replaces the last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    results: Vec<OverworldSpec>,
}

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new result list, returning the one it replaced.
    pub fn replace(&mut self, results: Vec<OverworldSpec>) -> Vec<OverworldSpec> {
        std::mem::replace(&mut self.results, results)
    }

    #[must_use]
    pub fn results(&self) -> &[OverworldSpec] {
        &self.results
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
