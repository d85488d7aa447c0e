//! Per-canal mutable machine state.
//!
//! Grounded on `domain/cnc_state.py`'s `CNCState`: the axis/offset maps,
//! the diameter-vs-radius normalization rules (confirmed there that `R`
//! is never axis-normalized, only `I`/`J`/`K` are), and the
//! absolute-vs-relative target resolution logic are carried over field
//! for field.

use std::collections::HashMap;

use crate::machine::MachineConfig;

/// One axis unit convention: plain radial distance, or lathe diameter
/// (where the programmed value is twice the true radial distance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisUnit {
    Radius,
    Diameter,
}

/// Extension bag for vendor/modal flags that don't warrant a dedicated
/// struct field. Closed variant set, per the design note preferring typed
/// option fields over an open string bag.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    ToolData(HashMap<i64, ToolCompensation>),
}

impl ExtraValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExtraValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtraValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ExtraValue::Float(f) => Some(*f),
            ExtraValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ExtraValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Staged compensation data for one tool number: `{qValue, rValue}` from
/// the request's `toolValues` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCompensation {
    pub q_value: i64,
    pub r_value: f64,
}

/// One canal's machine state, mutated monotonically while walking its
/// command node list.
#[derive(Debug, Clone)]
pub struct CanalState {
    pub axes: HashMap<char, f64>,
    pub offsets: HashMap<char, f64>,
    pub axis_units: HashMap<char, AxisUnit>,
    pub axis_multipliers: HashMap<char, f64>,
    pub axis_override_feeds: HashMap<char, f64>,
    pub modal_groups: HashMap<String, String>,
    pub feed_rate: f64,
    pub spindle_speed: f64,
    pub tool_radius: f64,
    pub tool_quadrant: i64,
    /// Macro/`#n`/`Rn` variables, keyed by the numeric tail without sigil.
    pub parameters: HashMap<String, f64>,
    pub extra: HashMap<String, ExtraValue>,
    pub machine_config: &'static MachineConfig,
}

impl CanalState {
    pub fn new(machine_config: &'static MachineConfig) -> Self {
        let mut axes = HashMap::new();
        for &letter in &['X', 'Y', 'Z'] {
            axes.insert(letter, 0.0);
        }
        let mut modal_groups = HashMap::new();
        modal_groups.insert("distance".to_string(), "G90".to_string());
        modal_groups.insert("plane".to_string(), machine_config.default_plane.to_string());
        modal_groups.insert("feed_mode".to_string(), machine_config.default_feed_mode.to_string());

        Self {
            axes,
            offsets: HashMap::new(),
            axis_units: HashMap::new(),
            axis_multipliers: HashMap::new(),
            axis_override_feeds: HashMap::new(),
            modal_groups,
            feed_rate: 0.0,
            spindle_speed: 0.0,
            tool_radius: 0.0,
            tool_quadrant: 0,
            parameters: HashMap::new(),
            extra: HashMap::new(),
            machine_config,
        }
    }

    pub fn axis(&self, letter: char) -> f64 {
        *self.axes.get(&letter).unwrap_or(&0.0)
    }

    pub fn is_relative(&self) -> bool {
        self.modal_groups.get("distance").map(String::as_str) == Some("G91")
    }

    /// Divide `raw` by 2 when `letter`'s axis unit is diameter; otherwise
    /// passes through unchanged. `R` is deliberately never routed through
    /// this — only `I`/`J`/`K` and the linear axes are axis-normalized.
    pub fn normalize_axis_value(&self, letter: char, raw: f64) -> f64 {
        match self.axis_units.get(&letter) {
            Some(AxisUnit::Diameter) => raw / 2.0,
            _ => raw,
        }
    }

    /// Resolve one axis's incoming parameter value to an absolute
    /// coordinate, honoring the current distance mode and diameter
    /// normalization.
    pub fn resolve_target(&self, letter: char, raw: f64) -> f64 {
        let normalized = self.normalize_axis_value(letter, raw);
        if self.is_relative() {
            self.axis(letter) + normalized
        } else {
            normalized
        }
    }

    pub fn compute_distance(&self, target: &HashMap<char, f64>, letters: &[char]) -> f64 {
        letters
            .iter()
            .map(|l| {
                let d = target.get(l).copied().unwrap_or_else(|| self.axis(*l)) - self.axis(*l);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}
