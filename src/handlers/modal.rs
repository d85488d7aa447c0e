//! Modal & group handlers: plane, speed mode, feed mode, polar, coordinate
//! systems, units.
//!
//! Grounded on `domain/handlers/fanuc_turn_cnc/gcode_group16_plane.py`
//! (plane conflicts) and `gcode_group21_polar_co.py` (polar remap and
//! G2/G3 swap); the coordinate-system and units handling follows the
//! group table in spec §4.5 directly since no single original file
//! covers all of it.

use crate::error::{CodeError, ErrorLocation, Result};
use crate::node::CommandNode;
use crate::state::{ExtraValue, CanalState};

use super::{Handler, HandlerContext, HandlerOutput};

pub struct ModalHandler;

fn loc(node: &CommandNode) -> ErrorLocation {
    ErrorLocation::new(node.line_nr, 0)
}

impl ModalHandler {
    fn handle_plane(&self, node: &CommandNode, state: &mut CanalState) -> Result<()> {
        let present: Vec<&str> = ["G17", "G18", "G19"]
            .into_iter()
            .filter(|c| node.has_g_code(c))
            .collect();
        if present.len() > 1 {
            return Err(CodeError::ConflictingPlaneCodes {
                value: present.join(","),
                loc: loc(node),
            }
            .into());
        }
        if let Some(code) = present.first() {
            let plane = match *code {
                "G17" => "X_Y",
                "G18" => "X_Z",
                _ => "Y_Z",
            };
            state.modal_groups.insert("plane".to_string(), plane.to_string());
        }
        Ok(())
    }

    fn handle_speed_mode(&self, node: &CommandNode, state: &mut CanalState) -> Result<()> {
        let g96 = node.has_g_code("G96");
        let g97 = node.has_g_code("G97");
        if g96 && g97 {
            return Err(CodeError::ConflictingSpeedMode {
                value: "G96,G97".to_string(),
                loc: loc(node),
            }
            .into());
        }
        if g96 {
            state.modal_groups.insert("speed_mode".to_string(), "G96".to_string());
        } else if g97 {
            state.modal_groups.insert("speed_mode".to_string(), "G97".to_string());
        }
        Ok(())
    }

    fn handle_feed_mode(&self, node: &CommandNode, state: &mut CanalState) -> Result<()> {
        use crate::machine::ControlFamily;
        match state.machine_config.control_family {
            ControlFamily::Fanuc => {
                let g98 = node.has_g_code("G98");
                let g99 = node.has_g_code("G99");
                if g98 && g99 {
                    return Err(CodeError::ConflictingFeedMode {
                        value: "G98,G99".to_string(),
                        loc: loc(node),
                    }
                    .into());
                }
                if g98 {
                    state.modal_groups.insert("feed_mode".to_string(), "per_min".to_string());
                } else if g99 {
                    state.modal_groups.insert("feed_mode".to_string(), "per_rev".to_string());
                }
            }
            ControlFamily::Siemens => {
                let g94 = node.has_g_code("G94");
                let g95 = node.has_g_code("G95");
                if g94 && g95 {
                    return Err(CodeError::ConflictingFeedMode {
                        value: "G94,G95".to_string(),
                        loc: loc(node),
                    }
                    .into());
                }
                if g94 {
                    state.modal_groups.insert("feed_mode".to_string(), "per_min".to_string());
                } else if g95 {
                    state.modal_groups.insert("feed_mode".to_string(), "per_rev".to_string());
                }
            }
        }
        Ok(())
    }

    fn handle_polar(&self, node: &mut CommandNode, state: &mut CanalState) -> Result<()> {
        let g112 = node.has_g_code("G112");
        let g113 = node.has_g_code("G113");
        if g112 && g113 {
            return Err(CodeError::ConflictingPolarCodes {
                value: "G112,G113".to_string(),
                loc: loc(node),
            }
            .into());
        }
        if g112 {
            let prev_plane = state
                .modal_groups
                .get("plane")
                .cloned()
                .unwrap_or_else(|| "X_Y".to_string());
            state.extra.insert("polar_prev_plane".to_string(), ExtraValue::Str(prev_plane));
            state.extra.insert("polar_mode".to_string(), ExtraValue::Bool(true));
            state.modal_groups.insert("plane".to_string(), "X_Y".to_string());
        } else if g113 {
            if let Some(prev) = state.extra.remove("polar_prev_plane").and_then(|v| v.as_str().map(str::to_string)) {
                state.modal_groups.insert("plane".to_string(), prev);
            }
            state.extra.insert("polar_mode".to_string(), ExtraValue::Bool(false));
        }

        let polar_active = state.extra.get("polar_mode").and_then(ExtraValue::as_bool).unwrap_or(false);
        if polar_active {
            let polar_axis = "X";
            if let Some(c) = node.parameters.remove(&'C') {
                node.parameters.insert('Y', c);
            }
            if let Some(h) = node.parameters.remove(&'H') {
                node.parameters.insert(if polar_axis == "X" { 'X' } else { 'Z' }, h);
            }
            if polar_axis == "X" {
                let had_g2 = node.g_codes.remove("G2") || node.g_codes.remove("G02");
                let had_g3 = node.g_codes.remove("G3") || node.g_codes.remove("G03");
                if had_g2 {
                    node.g_codes.insert("G3".to_string());
                } else if had_g3 {
                    node.g_codes.insert("G2".to_string());
                }
            }
        }
        Ok(())
    }

    fn handle_coord(&self, node: &mut CommandNode, state: &mut CanalState) {
        if node.has_g_code("G50") {
            for (&letter, value) in node.parameters.clone().iter() {
                if let Ok(v) = value.parse::<f64>() {
                    let mult = state.axis_multipliers.get(&letter).copied().unwrap_or(1.0);
                    *state.offsets.entry(letter).or_insert(0.0) += state.axis(letter);
                    state.axes.insert(letter, v * mult);
                }
            }
        }
        if node.has_g_code("G28") {
            let remap = [('U', 'X'), ('V', 'Y'), ('W', 'Z'), ('H', 'C')];
            for (from, to) in remap {
                if let Some(value) = node.parameters.remove(&from) {
                    if let Ok(v) = value.parse::<f64>() {
                        let mult = state.axis_multipliers.get(&to).copied().unwrap_or(1.0);
                        let offset = state.offsets.get(&to).copied().unwrap_or(0.0);
                        state.axes.insert(to, v - offset * mult);
                    }
                }
            }
            node.g_codes.insert("G00".to_string());
        }
        if node.has_g_code("G92") {
            for (&letter, value) in node.parameters.clone().iter() {
                if let Ok(v) = value.parse::<f64>() {
                    state.axes.insert(letter, v);
                }
            }
        }
        for (idx, code) in ["G54", "G55", "G56", "G57", "G58", "G59"].into_iter().enumerate() {
            if node.has_g_code(code) {
                state.modal_groups.insert("work_offset".to_string(), (idx + 1).to_string());
            }
        }
        if node.has_g_code("G53") {
            state.modal_groups.insert("work_offset".to_string(), "0".to_string());
        }
    }

    fn handle_units(&self, node: &CommandNode, state: &mut CanalState) {
        if node.has_g_code("G20") {
            state.modal_groups.insert("units".to_string(), "inch".to_string());
        } else if node.has_g_code("G21") {
            state.modal_groups.insert("units".to_string(), "mm".to_string());
        }
    }
}

impl Handler for ModalHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        _ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        self.handle_plane(node, state)?;
        self.handle_speed_mode(node, state)?;
        self.handle_feed_mode(node, state)?;
        self.handle_polar(node, state)?;
        self.handle_coord(node, state);
        self.handle_units(node, state);
        Ok(HandlerOutput::Delegate)
    }
}
