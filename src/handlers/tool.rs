//! Tool selection, cutter compensation, and tool-length handling.
//!
//! Grounded on `domain/handlers/tool_handler.py` (tool range validation,
//! compensation preload into `pending_tool_radius`/`pending_tool_quadrant`)
//! and the general shape of `siemens_mill_cnc/cutter_comp_handler.py`. The
//! `-102/-104/-107` cutter-comp codes are not present in that file, so
//! those branches are grounded only in the general error-raising idiom
//! from `domain/exceptions.py`, not a literal source match.

use crate::error::{CodeError, ErrorLocation, Result};
use crate::machine::ControlFamily;
use crate::node::CommandNode;
use crate::state::{CanalState, ExtraValue};

use super::{Handler, HandlerContext, HandlerOutput};

fn loc(node: &CommandNode) -> ErrorLocation {
    ErrorLocation::new(node.line_nr, 0)
}

pub struct ToolHandler;

impl ToolHandler {
    fn handle_tool_select(&self, node: &mut CommandNode, state: &mut CanalState) -> Result<()> {
        let Some(raw) = node.param('T').map(str::to_string) else {
            return Ok(());
        };

        if let Ok(number) = raw.parse::<i64>() {
            let (min, max) = state.machine_config.tool_range;
            let is_fanuc_txxyy = state.machine_config.control_family == ControlFamily::Fanuc && number > 99;
            if !is_fanuc_txxyy && (number < min || number > max) {
                return Err(CodeError::ToolOutOfRange {
                    value: raw,
                    min,
                    max,
                    loc: loc(node),
                }
                .into());
            }
            state.extra.insert("current_tool_number".to_string(), ExtraValue::Int(number));

            if let Some(ExtraValue::ToolData(table)) = state.extra.get("tool_compensation_data") {
                if let Some(comp) = table.get(&number).copied() {
                    state.extra.insert("pending_tool_radius".to_string(), ExtraValue::Float(comp.r_value));
                    state
                        .extra
                        .insert("pending_tool_quadrant".to_string(), ExtraValue::Int(comp.q_value));
                }
            }
        } else {
            state.extra.insert("current_tool_name".to_string(), ExtraValue::Str(raw));
        }
        Ok(())
    }

    fn handle_cutter_comp(&self, node: &mut CommandNode, state: &mut CanalState) -> Result<()> {
        let g40 = node.has_g_code("G40");
        let g41 = node.has_g_code("G41");
        let g42 = node.has_g_code("G42");

        if g40 {
            state.extra.insert("cutter_comp".to_string(), ExtraValue::Str("OFF".to_string()));
            state.tool_radius = 0.0;
            state.tool_quadrant = 0;
        }

        if g41 || g42 {
            let requested = if g41 { "G41" } else { "G42" };
            if let Some(ExtraValue::Str(active)) = state.extra.get("cutter_comp") {
                if active != "OFF" && active != requested {
                    return Err(CodeError::CutterCompDirectionConflict {
                        value: format!("{active},{requested}"),
                        loc: loc(node),
                    }
                    .into());
                }
            }

            let quadrant = match state.extra.get("pending_tool_quadrant").and_then(ExtraValue::as_int) {
                Some(q) if (1..=9).contains(&q) => q,
                Some(q) => {
                    return Err(CodeError::InvalidCutterCompQuadrant {
                        value: q.to_string(),
                        loc: loc(node),
                    }
                    .into())
                }
                None => 0,
            };
            let radius = match state.extra.get("pending_tool_radius").and_then(ExtraValue::as_float) {
                Some(r) if r > 0.0 => r,
                Some(r) => {
                    return Err(CodeError::InvalidCutterCompRadius {
                        value: r.to_string(),
                        loc: loc(node),
                    }
                    .into())
                }
                None => 0.0,
            };

            state.tool_radius = radius;
            state.tool_quadrant = quadrant;
            state.extra.insert("cutter_comp".to_string(), ExtraValue::Str(requested.to_string()));
        }

        node.parameters.remove(&'D');
        Ok(())
    }

    fn handle_tool_length(&self, node: &mut CommandNode, state: &mut CanalState) {
        let g43 = node.has_g_code("G43");
        let g44 = node.has_g_code("G44");
        let g49 = node.has_g_code("G49");
        if !(g43 || g44 || g49) {
            return;
        }
        let h = node.param_f64('H').unwrap_or(0.0);
        let delta = if g43 {
            h
        } else if g44 {
            -h
        } else {
            0.0
        };
        *state.offsets.entry('Z').or_insert(0.0) += delta;
        node.parameters.remove(&'H');
    }
}

impl Handler for ToolHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        _ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        self.handle_tool_select(node, state)?;
        self.handle_cutter_comp(node, state)?;
        self.handle_tool_length(node, state);
        Ok(HandlerOutput::Delegate)
    }
}
