//! Named machine configurations.
//!
//! Grounded on `domain/machines.py` in the original implementation, which
//! keeps a small static registry of named controls (`FANUC_STAR`,
//! `FANUC_GENERIC`, `SIEMENS_840D`) consulted both to seed a fresh canal
//! state and to answer the `list_machines` request (spec §6).

/// Which vendor's modal conventions a canal follows.
///
/// Distinguishes the two variable sigils (`#n` vs `Rn`) and a handful of
/// modal-group defaults (feed mode codes, default plane).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFamily {
    Fanuc,
    Siemens,
}

/// An immutable, compile-time-known machine descriptor.
///
/// Shared by reference once constructed; the registry below hands out
/// `'static` references, matching the "global mutable state becomes an
/// immutable resource" design note.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    pub name: &'static str,
    pub control_family: ControlFamily,
    /// Sigil letter for macro variables: `#` for Fanuc, `R` for Siemens.
    pub variable_prefix: char,
    pub tool_range: (i64, i64),
    pub default_plane: &'static str,
    pub default_feed_mode: &'static str,
}

pub const FANUC_STAR: MachineConfig = MachineConfig {
    name: "SB12RG_F",
    control_family: ControlFamily::Fanuc,
    variable_prefix: '#',
    tool_range: (1, 99),
    default_plane: "X_Y",
    default_feed_mode: "per_min",
};

pub const FANUC_GENERIC: MachineConfig = MachineConfig {
    name: "FANUC_T",
    control_family: ControlFamily::Fanuc,
    variable_prefix: '#',
    tool_range: (1, 9999),
    default_plane: "X_Y",
    default_feed_mode: "per_min",
};

pub const SIEMENS_840D: MachineConfig = MachineConfig {
    name: "ISO_MILL",
    control_family: ControlFamily::Siemens,
    variable_prefix: 'R',
    tool_range: (1, 32),
    default_plane: "X_Y",
    default_feed_mode: "per_min",
};

const REGISTRY: &[(&str, &MachineConfig)] = &[
    ("SB12RG_F", &FANUC_STAR),
    ("SB12RG_B", &FANUC_STAR),
    ("SR20JII_F", &FANUC_STAR),
    ("SR20JII_B", &FANUC_STAR),
    ("FANUC_T", &FANUC_GENERIC),
    ("ISO_MILL", &SIEMENS_840D),
];

/// Look up a machine by name, as used by `list_machines` and engine construction.
pub fn known(name: &str) -> Option<&'static MachineConfig> {
    REGISTRY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, cfg)| *cfg)
}

/// All machine names the registry recognises, in a stable order.
pub fn available_machines() -> Vec<&'static str> {
    REGISTRY.iter().map(|(n, _)| *n).collect()
}
