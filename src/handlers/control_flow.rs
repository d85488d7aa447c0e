//! GOTO / IF / WHILE-DO-END control-flow resolution.
//!
//! Grounded on `domain/handlers/control_flow.py`'s `ControlFlowHandler`:
//! the label/DO/END map lookups, the decrement-on-`END` loop counter
//! semantics, and the "no counter, but the DO was a WHILE — re-evaluate"
//! fallback all mirror that file.

use regex::Regex;

use crate::error::Result;
use crate::node::CommandNode;
use crate::state::CanalState;

use super::variable::{evaluate, evaluate_condition};
use super::{Handler, HandlerContext, HandlerOutput};

lazy_static::lazy_static! {
    static ref GOTO_RE: Regex = Regex::new(r"GOTO\s*(\d+)").unwrap();
    static ref IF_RE: Regex =
        Regex::new(r"IF\s*(.+?)\s*(GT|LT|GE|LE|EQ)\s*(.+?)\s*GOTO\s*(\d+)").unwrap();
    static ref WHILE_RE: Regex =
        Regex::new(r"WHILE\s*(.+?)\s*(GT|LT|GE|LE|EQ)\s*(.+?)\s*DO\s*(\d+)").unwrap();
    static ref DO_RE: Regex = Regex::new(r"^DO\s*(\d+)").unwrap();
    static ref END_RE: Regex = Regex::new(r"^END\s*(\d+)").unwrap();
    /// An `L` iteration count glued anywhere into a `DO` block's raw text
    /// (e.g. `DO1 L3 N10`) — the whole block is classified as a single
    /// `loop_command` by the lexer, so this is parsed from the text
    /// directly rather than from `node.parameters`.
    static ref L_VALUE_RE: Regex = Regex::new(r"L\s*=?\s*(\d+)").unwrap();
}

pub struct ControlFlowHandler;

impl ControlFlowHandler {
    fn find_preceding_do(&self, ctx: &HandlerContext, label: &str) -> Option<usize> {
        ctx.maps
            .do_map
            .get(label)
            .and_then(|dos| dos.iter().filter(|&&idx| idx <= ctx.cursor).max().copied())
    }

    fn resolve_goto(&self, ctx: &HandlerContext, label: &str) -> Option<usize> {
        if let Some(&idx) = ctx.maps.label_map.get(label) {
            return Some(idx);
        }
        ctx.maps.do_map.get(label).and_then(|v| v.first().copied())
    }
}

impl Handler for ControlFlowHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        let text = match &node.loop_command {
            Some(t) => t.clone(),
            None => return Ok(HandlerOutput::Delegate),
        };

        if let Some(caps) = WHILE_RE.captures(&text) {
            let lhs = evaluate(&caps[1], state).unwrap_or(0.0);
            let rhs = evaluate(&caps[3], state).unwrap_or(0.0);
            let op = &caps[2];
            let label = &caps[4];
            if !evaluate_condition(lhs, op, rhs) {
                if let Some(ends) = ctx.maps.end_map.get(label) {
                    if let Some(&end_idx) = ends.iter().find(|&&idx| idx > ctx.cursor) {
                        return Ok(HandlerOutput::Redirected { next: Some(end_idx + 1) });
                    }
                }
            }
            return Ok(HandlerOutput::Delegate);
        }

        if let Some(caps) = IF_RE.captures(&text) {
            let lhs = evaluate(&caps[1], state).unwrap_or(0.0);
            let rhs = evaluate(&caps[3], state).unwrap_or(0.0);
            let op = &caps[2];
            let label = &caps[4];
            if evaluate_condition(lhs, op, rhs) {
                return Ok(HandlerOutput::Redirected { next: self.resolve_goto(ctx, label) });
            }
            return Ok(HandlerOutput::Delegate);
        }

        if let Some(caps) = GOTO_RE.captures(&text) {
            let label = &caps[1];
            return Ok(HandlerOutput::Redirected { next: self.resolve_goto(ctx, label) });
        }

        if let Some(caps) = DO_RE.captures(&text) {
            let label = caps[1].to_string();
            let l_value = L_VALUE_RE
                .captures(&text)
                .and_then(|c| c[1].parse::<i64>().ok())
                .or_else(|| node.param_f64('L').map(|v| v as i64));
            if let Some(l) = l_value {
                ctx.loop_counters.insert(label, l);
            }
            return Ok(HandlerOutput::Delegate);
        }

        if let Some(caps) = END_RE.captures(&text) {
            let label = caps[1].to_string();
            let do_idx = self.find_preceding_do(ctx, &label);

            if let Some(counter) = ctx.loop_counters.get_mut(&label) {
                *counter -= 1;
                if *counter > 0 {
                    let next = do_idx.map(|i| i + 1);
                    return Ok(HandlerOutput::Redirected { next });
                }
                ctx.loop_counters.remove(&label);
                return Ok(HandlerOutput::Delegate);
            }

            if let Some(idx) = do_idx {
                if let Some(do_node) = ctx.nodes.get(idx) {
                    if let Some(do_text) = &do_node.loop_command {
                        if do_text.contains("WHILE") {
                            if let Some(caps) = WHILE_RE.captures(do_text) {
                                let lhs = evaluate(&caps[1], state).unwrap_or(0.0);
                                let rhs = evaluate(&caps[3], state).unwrap_or(0.0);
                                if evaluate_condition(lhs, &caps[2], rhs) {
                                    return Ok(HandlerOutput::Redirected { next: Some(idx + 1) });
                                }
                            }
                        }
                    }
                }
            }
            return Ok(HandlerOutput::Delegate);
        }

        Ok(HandlerOutput::Delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::FANUC_GENERIC;
    use std::collections::HashMap;

    fn ctx_with<'a>(
        maps: &'a super::super::ControlFlowMaps,
        options: &'a super::super::EngineOptions,
        nodes: &'a [CommandNode],
        cursor: usize,
        counters: &'a mut HashMap<String, i64>,
    ) -> HandlerContext<'a> {
        HandlerContext { options, maps, nodes, cursor, loop_counters: counters }
    }

    #[test]
    fn goto_redirects_to_label() {
        let mut maps = super::super::ControlFlowMaps::default();
        maps.label_map.insert("10".to_string(), 5);
        let options = super::super::EngineOptions::default();
        let nodes = vec![];
        let mut counters = HashMap::new();
        let mut ctx = ctx_with(&maps, &options, &nodes, 0, &mut counters);

        let mut node = CommandNode::new(1);
        node.loop_command = Some("GOTO10".to_string());
        let mut state = CanalState::new(&FANUC_GENERIC);

        match ControlFlowHandler.handle(&mut node, &mut state, &mut ctx).unwrap() {
            HandlerOutput::Redirected { next } => assert_eq!(next, Some(5)),
            _ => panic!("expected redirect"),
        }
    }

    #[test]
    fn do_with_l_param_sets_loop_counter() {
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let nodes = vec![];
        let mut counters = HashMap::new();
        let mut ctx = ctx_with(&maps, &options, &nodes, 0, &mut counters);

        let mut node = CommandNode::new(1);
        node.loop_command = Some("DO1".to_string());
        node.parameters.insert('L', "3".to_string());
        let mut state = CanalState::new(&FANUC_GENERIC);

        ControlFlowHandler.handle(&mut node, &mut state, &mut ctx).unwrap();
        assert_eq!(ctx.loop_counters.get("1"), Some(&3));
    }
}
