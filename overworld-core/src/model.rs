//! Values exchanged with the remote process and the deterministic engine.
//!
//! Every type here serializes to the exact JSON shape the engine parses
//! (camelCase keys, enums as integers), so the same structs are used for the
//! HTTP endpoint, the engine interchange format and the JavaScript boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of IV slots (HP, Atk, Def, SpA, SpD, Spe).
pub const STAT_COUNT: usize = 6;

/// Slots per encounter table, as stored in the encounter archives.
pub const SLOTS_PER_TABLE: usize = 10;

/// Nature value a [`GimmickSpec`] uses for "rolled at random".
pub const RANDOM_NATURE: u8 = 25;

/// Errors raised when a raw wire value cannot be mapped onto a model type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("rng state must be 16 bytes (got {0})")]
    RngStateLength(usize),
    #[error("unknown weather index {0}")]
    UnknownWeather(u8),
    #[error("unknown encounter type {0}")]
    UnknownEncounterType(u8),
    #[error("unknown mark index {0}")]
    UnknownMark(i32),
}

/// 128-bit generator state, two little-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RngState(pub [u64; 2]);

impl RngState {
    pub const BYTE_LEN: usize = 16;

    #[must_use]
    pub const fn new(s0: u64, s1: u64) -> Self {
        Self([s0, s1])
    }

    /// Parse the 16-byte wire form (word 0 first, little-endian words).
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly 16 bytes long.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let raw: [u8; Self::BYTE_LEN] = bytes
            .try_into()
            .map_err(|_| ModelError::RngStateLength(bytes.len()))?;
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&raw[..8]);
        hi.copy_from_slice(&raw[8..]);
        Ok(Self([u64::from_le_bytes(lo), u64::from_le_bytes(hi)]))
    }

    #[must_use]
    pub fn to_le_bytes(self) -> [u8; Self::BYTE_LEN] {
        let mut out = [0u8; Self::BYTE_LEN];
        out[..8].copy_from_slice(&self.0[0].to_le_bytes());
        out[8..].copy_from_slice(&self.0[1].to_le_bytes());
        out
    }
}

/// Weather indices in encounter-archive order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Weather {
    #[default]
    Sunny,
    Cloudy,
    Rain,
    Storm,
    Sunshine,
    Snow,
    Snowstorm,
    Sandstorm,
    Mist,
}

impl Weather {
    pub const ALL: [Self; 9] = [
        Self::Sunny,
        Self::Cloudy,
        Self::Rain,
        Self::Storm,
        Self::Sunshine,
        Self::Snow,
        Self::Snowstorm,
        Self::Sandstorm,
        Self::Mist,
    ];

    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sunny => "Normal Weather",
            Self::Cloudy => "Overcast",
            Self::Rain => "Raining",
            Self::Storm => "Thunderstorm",
            Self::Sunshine => "Intense Sun",
            Self::Snow => "Snowing",
            Self::Snowstorm => "Snowstorm",
            Self::Sandstorm => "Sandstorm",
            Self::Mist => "Heavy Fog",
        }
    }
}

impl From<Weather> for u8 {
    fn from(value: Weather) -> Self {
        value.index()
    }
}

impl TryFrom<u8> for Weather {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(ModelError::UnknownWeather(value))
    }
}

/// Which engine entry point a generation request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EncounterType {
    /// Fixed single-outcome spawns.
    #[default]
    Gimmick,
    /// Weighted slot-table spawns.
    Symbol,
}

impl From<EncounterType> for u8 {
    fn from(value: EncounterType) -> Self {
        match value {
            EncounterType::Gimmick => 0,
            EncounterType::Symbol => 1,
        }
    }
}

impl TryFrom<u8> for EncounterType {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Gimmick),
            1 => Ok(Self::Symbol),
            other => Err(ModelError::UnknownEncounterType(other)),
        }
    }
}

/// Session configuration read by the generation request builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub min_advance: u32,
    #[serde(default = "Settings::default_total_advances")]
    pub total_advances: u32,
    #[serde(default)]
    pub npc_count: u32,
    #[serde(default)]
    pub fly_calibration: u32,
    #[serde(default)]
    pub rain_calibration: u32,
    #[serde(default)]
    pub maximum_distance: u32,
    #[serde(default)]
    pub do_rotation_rand: bool,
    #[serde(default)]
    pub tidsid: u32,
    #[serde(default)]
    pub has_shiny_charm: bool,
    #[serde(default)]
    pub has_mark_charm: bool,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub encounter_type: EncounterType,
}

impl Settings {
    const fn default_total_advances() -> u32 {
        10_000
    }

    /// Copy the trainer-dependent flags fetched from the remote process.
    pub fn apply_charms(&mut self, charms: Charms) {
        self.has_shiny_charm = charms.has_shiny_charm;
        self.has_mark_charm = charms.has_mark_charm;
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_advance: 0,
            total_advances: Self::default_total_advances(),
            npc_count: 0,
            fly_calibration: 0,
            rain_calibration: 0,
            maximum_distance: 0,
            do_rotation_rand: false,
            tidsid: 0,
            has_shiny_charm: false,
            has_mark_charm: false,
            weather: Weather::Sunny,
            encounter_type: EncounterType::Gimmick,
        }
    }
}

/// Wire form of the acceptance criteria, compiled by [`crate::filters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub iv_min: [u8; STAT_COUNT],
    pub iv_max: [u8; STAT_COUNT],
    pub abilities: u32,
    pub shininess: u32,
    pub slots: u32,
    pub natures: u32,
    pub marks: [u32; 2],
    pub genders: u32,
    pub scales: u32,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            iv_min: [0; STAT_COUNT],
            iv_max: [31; STAT_COUNT],
            abilities: 0,
            shininess: 0,
            slots: 0,
            natures: 0,
            marks: [0, 0],
            genders: 0,
            scales: 0,
        }
    }
}

/// Fixed single-outcome spawn descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GimmickSpec {
    pub species: u16,
    pub form: u8,
    pub level: u8,
    pub shininess: u8,
    pub gender: u8,
    pub nature: u8,
    pub ability: u8,
    pub item: u16,
    pub ivs: [i8; STAT_COUNT],
}

impl GimmickSpec {
    #[must_use]
    pub const fn is_shiny_locked(&self) -> bool {
        self.shininess != 0
    }

    #[must_use]
    pub const fn fixed_nature(&self) -> Option<u8> {
        if self.nature == RANDOM_NATURE {
            None
        } else {
            Some(self.nature)
        }
    }

    /// Number of guaranteed perfect IVs encoded in the IV descriptor.
    ///
    /// `ivs[0]` of -2, -3 and -4 stand for one, two and three flawless IVs.
    #[must_use]
    pub const fn guaranteed_ivs(&self) -> Option<u8> {
        match self.ivs[0] {
            iv @ -4..=-2 => Some(!iv as u8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncounterSlot {
    pub species: u16,
    pub form: u8,
    pub weight: u8,
}

/// Level range plus the weighted species list of one spawner/weather pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSlotTable {
    pub min_level: u8,
    pub max_level: u8,
    pub slots: [EncounterSlot; SLOTS_PER_TABLE],
}

impl EncounterSlotTable {
    /// Slots that can actually be rolled.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &EncounterSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.weight > 0)
    }
}

/// The encounter definition a generation request is run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterTemplate {
    Gimmick(GimmickSpec),
    Symbol(EncounterSlotTable),
}

impl EncounterTemplate {
    #[must_use]
    pub const fn encounter_type(&self) -> EncounterType {
        match self {
            Self::Gimmick(_) => EncounterType::Gimmick,
            Self::Symbol(_) => EncounterType::Symbol,
        }
    }
}

/// Display form of a template: only the traits that are actually fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EncounterSummary {
    #[serde(rename_all = "camelCase")]
    Gimmick {
        species: u16,
        form: u8,
        level: u8,
        shiny_locked: bool,
        nature: Option<u8>,
        gender: Option<u8>,
        ability: Option<u8>,
        item: Option<u16>,
        guaranteed_ivs: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    Symbol {
        min_level: u8,
        max_level: u8,
        slots: Vec<EncounterSlot>,
    },
}

impl From<&EncounterTemplate> for EncounterSummary {
    fn from(template: &EncounterTemplate) -> Self {
        match template {
            EncounterTemplate::Gimmick(spec) => Self::Gimmick {
                species: spec.species,
                form: spec.form,
                level: spec.level,
                shiny_locked: spec.is_shiny_locked(),
                nature: spec.fixed_nature(),
                gender: (spec.gender != 0).then_some(spec.gender),
                ability: (spec.ability != 0).then_some(spec.ability),
                item: (spec.item != 0).then_some(spec.item),
                guaranteed_ivs: spec.guaranteed_ivs(),
            },
            EncounterTemplate::Symbol(table) => Self::Symbol {
                min_level: table.min_level,
                max_level: table.max_level,
                slots: table.occupied().map(|(_, slot)| *slot).collect(),
            },
        }
    }
}

/// What one loaded spawner offers right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerSummary {
    pub index: usize,
    /// Horizontal distance to the player, once a position is known.
    pub distance: Option<f32>,
    pub spawn_radius: f32,
    pub encounter: Option<EncounterSummary>,
}

/// Encounter marks in engine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    Lunchtime,
    SleepyTime,
    Dusk,
    Dawn,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Blizzard,
    Dry,
    Sandstorm,
    Misty,
    Destiny,
    Fishing,
    Curry,
    Uncommon,
    Rare,
    Rowdy,
    AbsentMinded,
    Jittery,
    Excited,
    Charismatic,
    Calmness,
    Intense,
    ZonedOut,
    Joyful,
    Angry,
    Smiley,
    Teary,
    Upbeat,
    Peeved,
    Intellectual,
    Ferocious,
    Crafty,
    Scowling,
    Kindly,
    Flustered,
    PumpedUp,
    ZeroEnergy,
    Prideful,
    Unsure,
    Humble,
    Thorny,
    Vigor,
    Slump,
}

impl Mark {
    pub const ALL: [Self; 45] = [
        Self::Lunchtime,
        Self::SleepyTime,
        Self::Dusk,
        Self::Dawn,
        Self::Cloudy,
        Self::Rainy,
        Self::Stormy,
        Self::Snowy,
        Self::Blizzard,
        Self::Dry,
        Self::Sandstorm,
        Self::Misty,
        Self::Destiny,
        Self::Fishing,
        Self::Curry,
        Self::Uncommon,
        Self::Rare,
        Self::Rowdy,
        Self::AbsentMinded,
        Self::Jittery,
        Self::Excited,
        Self::Charismatic,
        Self::Calmness,
        Self::Intense,
        Self::ZonedOut,
        Self::Joyful,
        Self::Angry,
        Self::Smiley,
        Self::Teary,
        Self::Upbeat,
        Self::Peeved,
        Self::Intellectual,
        Self::Ferocious,
        Self::Crafty,
        Self::Scowling,
        Self::Kindly,
        Self::Flustered,
        Self::PumpedUp,
        Self::ZeroEnergy,
        Self::Prideful,
        Self::Unsure,
        Self::Humble,
        Self::Thorny,
        Self::Vigor,
        Self::Slump,
    ];

    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Decode the engine's mark code, where -1 means "no mark".
    ///
    /// # Errors
    ///
    /// Returns an error for codes outside -1..=44.
    pub fn from_code(code: i32) -> Result<Option<Self>, ModelError> {
        if code == -1 {
            return Ok(None);
        }
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .map(Some)
            .ok_or(ModelError::UnknownMark(code))
    }

    #[must_use]
    pub fn code(mark: Option<Self>) -> i32 {
        mark.map_or(-1, |m| i32::from(m.index()))
    }
}

mod mark_code {
    use super::Mark;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mark: &Option<Mark>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(Mark::code(*mark))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Mark>, D::Error> {
        let code = i32::deserialize(deserializer)?;
        Mark::from_code(code).map_err(serde::de::Error::custom)
    }
}

/// One predicted encounter, as produced by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverworldSpec {
    pub advance: u32,
    pub species: u16,
    pub form: u8,
    pub level: u8,
    pub shininess: u8,
    pub nature: i8,
    pub gender: u8,
    pub ability: u8,
    pub held_item: u16,
    #[serde(default)]
    pub guaranteed_ivs: u8,
    pub ivs: [i8; STAT_COUNT],
    #[serde(with = "mark_code")]
    pub mark: Option<Mark>,
    #[serde(default)]
    pub brilliant_level: u8,
    #[serde(default)]
    pub fixed_seed: u32,
    pub scale: u8,
    pub ec: u32,
    pub pid: u32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub distance: f32,
    #[serde(default)]
    pub slot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charms {
    pub has_shiny_charm: bool,
    pub has_mark_charm: bool,
}

/// Static world object that spawns encounters around itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spawner {
    pub position: [f32; 3],
    pub spawn_radius: f32,
    pub despawn_radius: f32,
    #[serde(default)]
    pub gimmick_specs: Vec<GimmickSpec>,
    #[serde(default)]
    pub encounter_slot_tables: Vec<EncounterSlotTable>,
}

impl Spawner {
    /// Pick the template for the active mode under the given weather.
    #[must_use]
    pub fn template(&self, encounter_type: EncounterType, weather: Weather) -> Option<EncounterTemplate> {
        let idx = usize::from(weather.index());
        match encounter_type {
            EncounterType::Gimmick => self
                .gimmick_specs
                .get(idx)
                .cloned()
                .map(EncounterTemplate::Gimmick),
            EncounterType::Symbol => self
                .encounter_slot_tables
                .get(idx)
                .cloned()
                .map(EncounterTemplate::Symbol),
        }
    }

    /// Horizontal distance from the player, ignoring height.
    #[must_use]
    pub fn planar_distance(&self, player: &PlayerPosition) -> f32 {
        let dx = self.position[0] - player.x;
        let dz = self.position[2] - player.z;
        dx.hypot(dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gimmick(nature: u8, iv0: i8) -> GimmickSpec {
        GimmickSpec {
            species: 25,
            form: 0,
            level: 40,
            shininess: 0,
            gender: 0,
            nature,
            ability: 0,
            item: 0,
            ivs: [iv0, -1, -1, -1, -1, -1],
        }
    }

    #[test]
    fn rng_state_wire_form_is_little_endian_words() {
        let state = RngState::new(0x0102_0304_0506_0708, 0x1112_1314_1516_1718);
        let bytes = state.to_le_bytes();
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[8], 0x18);
        assert_eq!(RngState::from_le_bytes(&bytes).unwrap(), state);
        assert_eq!(
            RngState::from_le_bytes(&bytes[..15]),
            Err(ModelError::RngStateLength(15))
        );
    }

    #[test]
    fn settings_serialize_in_engine_shape() {
        let settings = Settings {
            encounter_type: EncounterType::Symbol,
            weather: Weather::Snowstorm,
            ..Settings::default()
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["encounterType"], json!(1));
        assert_eq!(value["weather"], json!(6));
        assert_eq!(value["totalAdvances"], json!(10_000));
        assert!(value.get("doRotationRand").is_some());
    }

    #[test]
    fn unknown_enum_indices_are_rejected() {
        assert_eq!(Weather::try_from(9), Err(ModelError::UnknownWeather(9)));
        assert!(serde_json::from_value::<Settings>(json!({ "encounterType": 3 })).is_err());
    }

    #[test]
    fn gimmick_descriptor_helpers() {
        assert_eq!(gimmick(RANDOM_NATURE, -1).fixed_nature(), None);
        assert_eq!(gimmick(3, -1).fixed_nature(), Some(3));
        assert_eq!(gimmick(3, -4).guaranteed_ivs(), Some(3));
        assert_eq!(gimmick(3, -2).guaranteed_ivs(), Some(1));
        assert_eq!(gimmick(3, -1).guaranteed_ivs(), None);
        assert_eq!(gimmick(3, 31).guaranteed_ivs(), None);
        assert!(!gimmick(3, -1).is_shiny_locked());
    }

    #[test]
    fn summaries_keep_only_fixed_traits() {
        let mut spec = gimmick(RANDOM_NATURE, -3);
        spec.shininess = 2;
        spec.item = 1110;
        let summary = EncounterSummary::from(&EncounterTemplate::Gimmick(spec));
        assert_eq!(
            summary,
            EncounterSummary::Gimmick {
                species: 25,
                form: 0,
                level: 40,
                shiny_locked: true,
                nature: None,
                gender: None,
                ability: None,
                item: Some(1110),
                guaranteed_ivs: Some(2),
            }
        );
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["kind"], json!("gimmick"));
        assert_eq!(value["shinyLocked"], json!(true));
        assert_eq!(value["guaranteedIvs"], json!(2));

        let mut slots = [EncounterSlot::default(); SLOTS_PER_TABLE];
        slots[3] = EncounterSlot {
            species: 131,
            form: 1,
            weight: 60,
        };
        let table = EncounterSlotTable {
            min_level: 20,
            max_level: 24,
            slots,
        };
        let value = serde_json::to_value(EncounterSummary::from(&EncounterTemplate::Symbol(table))).unwrap();
        assert_eq!(value["kind"], json!("symbol"));
        assert_eq!(value["minLevel"], json!(20));
        assert_eq!(value["slots"], json!([{ "species": 131, "form": 1, "weight": 60 }]));
    }

    #[test]
    fn overworld_spec_decodes_engine_json() {
        let raw = json!({
            "species": 133, "form": 0, "level": 12, "shininess": 1, "nature": 3,
            "gender": 2, "ability": 1, "heldItem": 0, "guaranteedIvs": 0,
            "ivs": [31, 0, 15, 31, 31, 2], "mark": 16, "brilliantLevel": 0,
            "fixedSeed": 77, "pid": 1, "ec": 2, "scale": 0, "rotation": 0.0,
            "distance": 0.0, "slot": 3, "advance": 1234
        });
        let spec: OverworldSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.mark, Some(Mark::Rare));
        assert_eq!(spec.advance, 1234);

        let unmarked = json!({
            "species": 1, "form": 0, "level": 1, "shininess": 0, "nature": 0,
            "gender": 1, "ability": 1, "heldItem": 0, "ivs": [0, 0, 0, 0, 0, 0],
            "mark": -1, "scale": 0, "ec": 0, "pid": 0, "advance": 0
        });
        let spec: OverworldSpec = serde_json::from_value(unmarked).unwrap();
        assert_eq!(spec.mark, None);
        assert_eq!(serde_json::to_value(&spec).unwrap()["mark"], json!(-1));
    }

    #[test]
    fn spawner_selects_template_by_mode_and_weather() {
        let table = EncounterSlotTable {
            min_level: 3,
            max_level: 6,
            slots: [EncounterSlot::default(); SLOTS_PER_TABLE],
        };
        let spawner = Spawner {
            position: [3.0, 0.0, 4.0],
            spawn_radius: 100.0,
            despawn_radius: 200.0,
            gimmick_specs: vec![gimmick(3, -1), gimmick(4, -1)],
            encounter_slot_tables: vec![table.clone()],
        };
        assert_eq!(
            spawner.template(EncounterType::Gimmick, Weather::Cloudy),
            Some(EncounterTemplate::Gimmick(gimmick(4, -1)))
        );
        assert_eq!(
            spawner.template(EncounterType::Symbol, Weather::Sunny),
            Some(EncounterTemplate::Symbol(table))
        );
        assert_eq!(spawner.template(EncounterType::Symbol, Weather::Rain), None);
        assert!((spawner.planar_distance(&PlayerPosition::default()) - 5.0).abs() < f32::EPSILON);
    }
}
