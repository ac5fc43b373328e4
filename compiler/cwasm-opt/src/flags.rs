use crate::error::{FlagResult, FlagsFileError, UnknownFlagError, UnknownPresetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which optimizer passes and peephole rules run.
///
/// Flags are a plain value owned by whoever drives the compilation. Files use RON with one field
/// per flag; fields left out keep their default preset value and unknown fields are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationFlags {
    pub peephole_local_tee: bool,
    pub peephole_add_0: bool,
    pub peephole_i32_constants_ops: bool,
    pub peephole_constants_add_mul: bool,
    pub peephole_combine_adds: bool,
    pub peephole_load_offset: bool,
    pub peephole_unused_blocks: bool,
    pub peephole_constant_if: bool,
    pub peephole_2nd_pass: bool,
    pub generation_switch_br_table: bool,
    pub partial_redundancy_elimination: bool,
    pub dead_code_elimination: bool,
    pub copy_propagation: bool,
    pub live_range_splitting: bool,
    pub reallocate_locals: bool,
    pub unused_locals: bool,
    pub inlining: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self {
            partial_redundancy_elimination: false,
            ..Self::all(true)
        }
    }
}

impl OptimizationFlags {
    pub const NAMES: [&'static str; 17] = [
        "peephole_local_tee",
        "peephole_add_0",
        "peephole_i32_constants_ops",
        "peephole_constants_add_mul",
        "peephole_combine_adds",
        "peephole_load_offset",
        "peephole_unused_blocks",
        "peephole_constant_if",
        "peephole_2nd_pass",
        "generation_switch_br_table",
        "partial_redundancy_elimination",
        "dead_code_elimination",
        "copy_propagation",
        "live_range_splitting",
        "reallocate_locals",
        "unused_locals",
        "inlining",
    ];

    /// Every flag set to `value`.
    pub fn all(value: bool) -> Self {
        Self {
            peephole_local_tee: value,
            peephole_add_0: value,
            peephole_i32_constants_ops: value,
            peephole_constants_add_mul: value,
            peephole_combine_adds: value,
            peephole_load_offset: value,
            peephole_unused_blocks: value,
            peephole_constant_if: value,
            peephole_2nd_pass: value,
            generation_switch_br_table: value,
            partial_redundancy_elimination: value,
            dead_code_elimination: value,
            copy_propagation: value,
            live_range_splitting: value,
            reallocate_locals: value,
            unused_locals: value,
            inlining: value,
        }
    }

    pub fn none() -> Self {
        Self::all(false)
    }

    /// A named preset: `none` turns everything off, `default` everything except partial
    /// redundancy elimination.
    pub fn preset(name: &str) -> FlagResult<Self> {
        match name {
            "none" => Ok(Self::none()),
            "default" => Ok(Self::default()),
            _ => Err(UnknownPresetError {
                name: name.to_owned(),
            }
            .into()),
        }
    }

    /// Parse flags from RON, starting from the default preset.
    pub fn from_ron(source: &str) -> FlagResult<Self> {
        ron::from_str(source).map_err(|e| {
            FlagsFileError {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn slot(&mut self, name: &str) -> Option<&mut bool> {
        let slot = match name {
            "peephole_local_tee" => &mut self.peephole_local_tee,
            "peephole_add_0" => &mut self.peephole_add_0,
            "peephole_i32_constants_ops" => &mut self.peephole_i32_constants_ops,
            "peephole_constants_add_mul" => &mut self.peephole_constants_add_mul,
            "peephole_combine_adds" => &mut self.peephole_combine_adds,
            "peephole_load_offset" => &mut self.peephole_load_offset,
            "peephole_unused_blocks" => &mut self.peephole_unused_blocks,
            "peephole_constant_if" => &mut self.peephole_constant_if,
            "peephole_2nd_pass" => &mut self.peephole_2nd_pass,
            "generation_switch_br_table" => &mut self.generation_switch_br_table,
            "partial_redundancy_elimination" => &mut self.partial_redundancy_elimination,
            "dead_code_elimination" => &mut self.dead_code_elimination,
            "copy_propagation" => &mut self.copy_propagation,
            "live_range_splitting" => &mut self.live_range_splitting,
            "reallocate_locals" => &mut self.reallocate_locals,
            "unused_locals" => &mut self.unused_locals,
            "inlining" => &mut self.inlining,
            _ => return None,
        };
        Some(slot)
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        let mut copy = *self;
        copy.slot(name).map(|slot| *slot)
    }

    pub fn set(&mut self, name: &str, value: bool) -> FlagResult<()> {
        match self.slot(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(UnknownFlagError {
                name: name.to_owned(),
            }
            .into()),
        }
    }

    /// Apply a partial mapping. Nothing changes if any name is unknown.
    pub fn merge<'a>(&mut self, flags: impl IntoIterator<Item = (&'a str, bool)>) -> FlagResult<()> {
        let mut merged = *self;
        for (name, value) in flags {
            merged.set(name, value)?;
        }
        *self = merged;
        Ok(())
    }

    /// The full mapping from flag name to value.
    pub fn to_map(&self) -> BTreeMap<&'static str, bool> {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get(name).map(|value| (*name, value)))
            .collect()
    }

    /// Whether any peephole rule is enabled.
    pub fn any_peephole(&self) -> bool {
        self.peephole_local_tee
            || self.peephole_add_0
            || self.peephole_i32_constants_ops
            || self.peephole_constants_add_mul
            || self.peephole_combine_adds
            || self.peephole_load_offset
            || self.peephole_unused_blocks
            || self.peephole_constant_if
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlagError;
    use cwasm_macros::{assert_err, assert_matches, assert_ok};

    #[test]
    fn test_presets() {
        let none = assert_ok!(OptimizationFlags::preset("none"));
        assert!(none.to_map().values().all(|v| !v));
        let default = assert_ok!(OptimizationFlags::preset("default"));
        let off = default
            .to_map()
            .into_iter()
            .filter(|(_, v)| !v)
            .map(|(k, _)| k)
            .collect::<Vec<_>>();
        assert_eq!(off, vec!["partial_redundancy_elimination"]);
        let err = assert_err!(OptimizationFlags::preset("fast"));
        assert_matches!(err, FlagError::UnknownPreset(_));
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let mut flags = OptimizationFlags::none();
        let err = assert_err!(flags.merge([("inlining", true), ("loop_unrolling", true)]));
        assert_matches!(err, FlagError::UnknownFlag(_));
        assert_eq!(flags, OptimizationFlags::none());
        assert_ok!(flags.merge([("inlining", true)]));
        assert_eq!(flags.get("inlining"), Some(true));
        assert_eq!(flags.to_map().len(), OptimizationFlags::NAMES.len());
    }

    #[test]
    fn test_flags_from_ron() {
        let flags = assert_ok!(OptimizationFlags::from_ron("(inlining: false)"));
        assert!(!flags.inlining);
        assert!(flags.copy_propagation);
        let err = assert_err!(OptimizationFlags::from_ron("(vectorize: true)"));
        assert_matches!(err, FlagError::FlagsFile(_));
    }
}
