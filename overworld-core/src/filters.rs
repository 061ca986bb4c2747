//! Compiles UI selections into the bitfield encodings the engine filters on.
//!
//! Encodings are always recomputed from the complete selection set; nothing
//! here clears or sets a single bit of an existing encoding. That keeps the
//! compiled [`Filters`] an exact function of what the user has selected.

use crate::model::{Filters, Mark, STAT_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Highest legal IV.
pub const IV_MAX: u8 = 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("option {index} is not a valid {table} option")]
    UnknownOption { table: &'static str, index: u8 },
    #[error("IV {0} is outside 0..=31")]
    IvOutOfRange(u8),
    #[error("stat slot {0} is outside 0..6")]
    StatOutOfRange(usize),
}

/// One selectable option; `index` is its bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub index: u8,
    pub name: &'static str,
}

const fn opt(index: u8, name: &'static str) -> FilterOption {
    FilterOption { index, name }
}

/// Fixed option table of one enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionTable {
    pub name: &'static str,
    pub options: &'static [FilterOption],
}

impl OptionTable {
    #[must_use]
    pub fn contains(&self, index: u8) -> bool {
        self.options.iter().any(|o| o.index == index)
    }

    #[must_use]
    pub fn option(&self, index: u8) -> Option<&FilterOption> {
        self.options.iter().find(|o| o.index == index)
    }

    fn validate(&self, index: u8) -> Result<u8, FilterError> {
        if self.contains(index) {
            Ok(index)
        } else {
            Err(FilterError::UnknownOption {
                table: self.name,
                index,
            })
        }
    }
}

pub const NATURES: OptionTable = OptionTable {
    name: "nature",
    options: &[
        opt(0, "Hardy"),
        opt(1, "Lonely"),
        opt(2, "Brave"),
        opt(3, "Adamant"),
        opt(4, "Naughty"),
        opt(5, "Bold"),
        opt(6, "Docile"),
        opt(7, "Relaxed"),
        opt(8, "Impish"),
        opt(9, "Lax"),
        opt(10, "Timid"),
        opt(11, "Hasty"),
        opt(12, "Serious"),
        opt(13, "Jolly"),
        opt(14, "Naive"),
        opt(15, "Modest"),
        opt(16, "Mild"),
        opt(17, "Quiet"),
        opt(18, "Bashful"),
        opt(19, "Rash"),
        opt(20, "Calm"),
        opt(21, "Gentle"),
        opt(22, "Sassy"),
        opt(23, "Careful"),
        opt(24, "Quirky"),
    ],
};

pub const ABILITIES: OptionTable = OptionTable {
    name: "ability",
    options: &[opt(1, "Ability 1"), opt(2, "Ability 2")],
};

pub const SHININESS: OptionTable = OptionTable {
    name: "shininess",
    options: &[opt(0, "None"), opt(1, "Star"), opt(2, "Square")],
};

pub const SLOTS: OptionTable = OptionTable {
    name: "slot",
    options: &[
        opt(0, "Slot 0"),
        opt(1, "Slot 1"),
        opt(2, "Slot 2"),
        opt(3, "Slot 3"),
        opt(4, "Slot 4"),
        opt(5, "Slot 5"),
        opt(6, "Slot 6"),
        opt(7, "Slot 7"),
        opt(8, "Slot 8"),
        opt(9, "Slot 9"),
    ],
};

pub const GENDERS: OptionTable = OptionTable {
    name: "gender",
    options: &[opt(1, "Male"), opt(2, "Female"), opt(3, "Genderless")],
};

pub const SCALES: OptionTable = OptionTable {
    name: "scale",
    options: &[opt(0, "1-254"), opt(1, "255"), opt(2, "0")],
};

pub const MARKS: OptionTable = OptionTable {
    name: "mark",
    options: &[
        opt(Mark::Lunchtime as u8, "Lunchtime"),
        opt(Mark::SleepyTime as u8, "Sleepy-Time"),
        opt(Mark::Dusk as u8, "Dusk"),
        opt(Mark::Dawn as u8, "Dawn"),
        opt(Mark::Cloudy as u8, "Cloudy"),
        opt(Mark::Rainy as u8, "Rainy"),
        opt(Mark::Stormy as u8, "Stormy"),
        opt(Mark::Snowy as u8, "Snowy"),
        opt(Mark::Blizzard as u8, "Blizzard"),
        opt(Mark::Dry as u8, "Dry"),
        opt(Mark::Sandstorm as u8, "Sandstorm"),
        opt(Mark::Misty as u8, "Misty"),
        opt(Mark::Destiny as u8, "Destiny"),
        opt(Mark::Fishing as u8, "Fishing"),
        opt(Mark::Curry as u8, "Curry"),
        opt(Mark::Uncommon as u8, "Uncommon"),
        opt(Mark::Rare as u8, "Rare"),
        opt(Mark::Rowdy as u8, "Rowdy"),
        opt(Mark::AbsentMinded as u8, "Absent-Minded"),
        opt(Mark::Jittery as u8, "Jittery"),
        opt(Mark::Excited as u8, "Excited"),
        opt(Mark::Charismatic as u8, "Charismatic"),
        opt(Mark::Calmness as u8, "Calmness"),
        opt(Mark::Intense as u8, "Intense"),
        opt(Mark::ZonedOut as u8, "Zoned-Out"),
        opt(Mark::Joyful as u8, "Joyful"),
        opt(Mark::Angry as u8, "Angry"),
        opt(Mark::Smiley as u8, "Smiley"),
        opt(Mark::Teary as u8, "Teary"),
        opt(Mark::Upbeat as u8, "Upbeat"),
        opt(Mark::Peeved as u8, "Peeved"),
        opt(Mark::Intellectual as u8, "Intellectual"),
        opt(Mark::Ferocious as u8, "Ferocious"),
        opt(Mark::Crafty as u8, "Crafty"),
        opt(Mark::Scowling as u8, "Scowling"),
        opt(Mark::Kindly as u8, "Kindly"),
        opt(Mark::Flustered as u8, "Flustered"),
        opt(Mark::PumpedUp as u8, "Pumped-Up"),
        opt(Mark::ZeroEnergy as u8, "Zero-Energy"),
        opt(Mark::Prideful as u8, "Prideful"),
        opt(Mark::Unsure as u8, "Unsure"),
        opt(Mark::Humble as u8, "Humble"),
        opt(Mark::Thorny as u8, "Thorny"),
        opt(Mark::Vigor as u8, "Vigor"),
        opt(Mark::Slump as u8, "Slump"),
    ],
};

/// Pack a selection into one 32-bit word: bit `i` set for each index `i`.
///
/// # Errors
///
/// Returns an error if any index is not in `table`, or does not fit the word.
pub fn encode_bitfield(table: &OptionTable, selected: &[u8]) -> Result<u32, FilterError> {
    selected.iter().try_fold(0_u32, |word, &index| {
        let index = table.validate(index)?;
        let bit = 1_u32
            .checked_shl(u32::from(index))
            .ok_or(FilterError::UnknownOption {
                table: table.name,
                index,
            })?;
        Ok(word | bit)
    })
}

/// Pack a selection into two words: index `i` sets bit `i & 31` of word `i >> 5`.
///
/// # Errors
///
/// Returns an error if any index is not in `table` or beyond 64 bits.
pub fn encode_bit_array(table: &OptionTable, selected: &[u8]) -> Result<[u32; 2], FilterError> {
    selected.iter().try_fold([0_u32; 2], |mut words, &index| {
        let index = table.validate(index)?;
        let word = words
            .get_mut(usize::from(index >> 5))
            .ok_or(FilterError::UnknownOption {
                table: table.name,
                index,
            })?;
        *word |= 1_u32 << (index & 31);
        Ok(words)
    })
}

/// Options of `table` whose bit is set in `word`.
#[must_use]
pub fn decode_bitfield(table: &OptionTable, word: u32) -> Vec<u8> {
    table
        .options
        .iter()
        .map(|o| o.index)
        .filter(|&i| i < 32 && word & (1_u32 << i) != 0)
        .collect()
}

/// Options of `table` whose bit is set in the two-word array.
#[must_use]
pub fn decode_bit_array(table: &OptionTable, words: [u32; 2]) -> Vec<u8> {
    table
        .options
        .iter()
        .map(|o| o.index)
        .filter(|&i| {
            words
                .get(usize::from(i >> 5))
                .is_some_and(|w| w & (1_u32 << (i & 31)) != 0)
        })
        .collect()
}

/// A single validated IV value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Iv(u8);

impl Iv {
    /// # Errors
    ///
    /// Returns an error for values above 31.
    pub const fn new(value: u8) -> Result<Self, FilterError> {
        if value > IV_MAX {
            Err(FilterError::IvOutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Inclusive per-stat IV bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvRange {
    pub min: [u8; STAT_COUNT],
    pub max: [u8; STAT_COUNT],
}

impl Default for IvRange {
    fn default() -> Self {
        Self {
            min: [0; STAT_COUNT],
            max: [IV_MAX; STAT_COUNT],
        }
    }
}

impl IvRange {
    /// Build a range, clamping every bound into `0..=31`.
    #[must_use]
    pub fn new(min: [u8; STAT_COUNT], max: [u8; STAT_COUNT]) -> Self {
        Self {
            min: min.map(|v| v.min(IV_MAX)),
            max: max.map(|v| v.min(IV_MAX)),
        }
    }

    /// Set both bounds of one stat slot.
    ///
    /// # Errors
    ///
    /// Returns an error if `stat` is not in `0..6`.
    pub fn set(&mut self, stat: usize, min: u8, max: u8) -> Result<(), FilterError> {
        if stat >= STAT_COUNT {
            return Err(FilterError::StatOutOfRange(stat));
        }
        self.min[stat] = min.min(IV_MAX);
        self.max[stat] = max.min(IV_MAX);
        Ok(())
    }

    /// True iff every IV lies within its slot's bounds.
    #[must_use]
    pub fn accepts(&self, ivs: &[Iv; STAT_COUNT]) -> bool {
        ivs.iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(iv, (&lo, &hi))| lo <= iv.0 && iv.0 <= hi)
    }
}

/// Enumerations a user can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Abilities,
    Shininess,
    Slots,
    Natures,
    Marks,
    Genders,
    Scales,
}

impl FilterKind {
    pub const ALL: [Self; 7] = [
        Self::Abilities,
        Self::Shininess,
        Self::Slots,
        Self::Natures,
        Self::Marks,
        Self::Genders,
        Self::Scales,
    ];

    #[must_use]
    pub const fn table(self) -> &'static OptionTable {
        match self {
            Self::Abilities => &ABILITIES,
            Self::Shininess => &SHININESS,
            Self::Slots => &SLOTS,
            Self::Natures => &NATURES,
            Self::Marks => &MARKS,
            Self::Genders => &GENDERS,
            Self::Scales => &SCALES,
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "abilities" | "ability" => Some(Self::Abilities),
            "shininess" | "shiny" => Some(Self::Shininess),
            "slots" | "slot" => Some(Self::Slots),
            "natures" | "nature" => Some(Self::Natures),
            "marks" | "mark" => Some(Self::Marks),
            "genders" | "gender" => Some(Self::Genders),
            "scales" | "scale" => Some(Self::Scales),
            _ => None,
        }
    }
}

/// The user's current selections, from which [`Filters`] is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSelection {
    ivs: IvRange,
    selected: [BTreeSet<u8>; 7],
    compiled: Filters,
}

impl FilterSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn filters(&self) -> &Filters {
        &self.compiled
    }

    #[must_use]
    pub const fn ivs(&self) -> &IvRange {
        &self.ivs
    }

    #[must_use]
    pub fn selected(&self, kind: FilterKind) -> Vec<u8> {
        self.slot(kind).iter().copied().collect()
    }

    /// Replace the whole selection of one enumeration.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the selection untouched, if any index is
    /// not an option of `kind`.
    pub fn set(&mut self, kind: FilterKind, indices: &[u8]) -> Result<(), FilterError> {
        let table = kind.table();
        let next: BTreeSet<u8> = indices
            .iter()
            .map(|&i| table.validate(i))
            .collect::<Result<_, _>>()?;
        let previous = std::mem::replace(self.slot_mut(kind), next);
        self.recompile().inspect_err(|_| {
            *self.slot_mut(kind) = previous;
        })
    }

    /// # Errors
    ///
    /// Returns an error if `index` is not an option of `kind`.
    pub fn select(&mut self, kind: FilterKind, index: u8) -> Result<(), FilterError> {
        let mut indices = self.selected(kind);
        indices.push(index);
        self.set(kind, &indices)
    }

    /// Deselect one option; the encoding is rebuilt from what remains.
    ///
    /// # Errors
    ///
    /// Only fails if the stored selection itself became invalid.
    pub fn deselect(&mut self, kind: FilterKind, index: u8) -> Result<(), FilterError> {
        let indices: Vec<u8> = self
            .slot(kind)
            .iter()
            .copied()
            .filter(|&i| i != index)
            .collect();
        self.set(kind, &indices)
    }

    /// # Errors
    ///
    /// Returns an error if `stat` is not in `0..6`.
    pub fn set_iv_range(&mut self, stat: usize, min: u8, max: u8) -> Result<(), FilterError> {
        self.ivs.set(stat, min, max)?;
        self.recompile()
    }

    /// Drop every selection and reset the IV bounds.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn recompile(&mut self) -> Result<(), FilterError> {
        let list = |kind: FilterKind| self.selected(kind);
        let compiled = Filters {
            iv_min: self.ivs.min,
            iv_max: self.ivs.max,
            abilities: encode_bitfield(&ABILITIES, &list(FilterKind::Abilities))?,
            shininess: encode_bitfield(&SHININESS, &list(FilterKind::Shininess))?,
            slots: encode_bitfield(&SLOTS, &list(FilterKind::Slots))?,
            natures: encode_bitfield(&NATURES, &list(FilterKind::Natures))?,
            marks: encode_bit_array(&MARKS, &list(FilterKind::Marks))?,
            genders: encode_bitfield(&GENDERS, &list(FilterKind::Genders))?,
            scales: encode_bitfield(&SCALES, &list(FilterKind::Scales))?,
        };
        self.compiled = compiled;
        Ok(())
    }

    const fn position(kind: FilterKind) -> usize {
        match kind {
            FilterKind::Abilities => 0,
            FilterKind::Shininess => 1,
            FilterKind::Slots => 2,
            FilterKind::Natures => 3,
            FilterKind::Marks => 4,
            FilterKind::Genders => 5,
            FilterKind::Scales => 6,
        }
    }

    const fn slot(&self, kind: FilterKind) -> &BTreeSet<u8> {
        &self.selected[Self::position(kind)]
    }

    const fn slot_mut(&mut self, kind: FilterKind) -> &mut BTreeSet<u8> {
        &mut self.selected[Self::position(kind)]
    }
}
