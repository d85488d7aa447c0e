//! Per-canal runtime: links nodes, builds control-flow maps, and walks
//! the chain to completion.
//!
//! Grounded on spec §4.10's five-step canal runtime description; no
//! single original file matches the Rust shape directly, since the
//! original keeps its per-canal loop inline in `application/nc_execution.py`.

use crate::error::{NcError, Result};
use crate::handlers::{self, ControlFlowMaps, EngineOptions, HandlerContext, HandlerKind, HandlerOutput};
use crate::node::CommandNode;
use crate::point::Point;
use crate::state::CanalState;

/// One produced tool-path entry alongside the node index that produced it.
#[derive(Debug, Clone)]
pub struct ToolPathEntry {
    pub points: Vec<Point>,
    pub duration: f64,
    pub node_index: usize,
}

/// The outcome of walking a single canal to completion (or to a fatal error).
pub struct CanalRun {
    pub tool_path: Vec<ToolPathEntry>,
    pub errors: Vec<NcError>,
}

fn build_maps(nodes: &[CommandNode]) -> ControlFlowMaps {
    let do_prefix = regex::Regex::new(r"^DO\s*(\d+)").unwrap();
    let do_anywhere = regex::Regex::new(r"DO\s*(\d+)").unwrap();
    let end_prefix = regex::Regex::new(r"^END\s*(\d+)").unwrap();

    let mut maps = ControlFlowMaps::default();
    for (idx, node) in nodes.iter().enumerate() {
        if let Some(n) = node.param('N') {
            maps.label_map.insert(n.to_string(), idx);
        }
        let Some(text) = &node.loop_command else { continue };
        if let Some(caps) = do_prefix.captures(text) {
            maps.do_map.entry(caps[1].to_string()).or_default().push(idx);
        } else if text.starts_with("WHILE") {
            // A `WHILE<cond>DO<label>` node is itself the loop entry point
            // that a matching `END<label>` must find, even though the
            // lexer classifies the whole line as one `loop_command` rather
            // than a separate `DO` node.
            if let Some(caps) = do_anywhere.captures(text) {
                maps.do_map.entry(caps[1].to_string()).or_default().push(idx);
            }
        }
        if let Some(caps) = end_prefix.captures(text) {
            maps.end_map.entry(caps[1].to_string()).or_default().push(idx);
        }
    }
    maps
}

/// Link `nodes` into a doubly-linked sequence via plain index cursors,
/// then walk them through `chain`, collecting tool-path entries and
/// structural errors without aborting the whole canal on one bad node.
pub fn run_canal(
    mut nodes: Vec<CommandNode>,
    chain: &[HandlerKind],
    state: &mut CanalState,
    options: &EngineOptions,
) -> CanalRun {
    for i in 0..nodes.len() {
        nodes[i].prev = if i == 0 { None } else { Some(i - 1) };
        nodes[i].next = if i + 1 < nodes.len() { Some(i + 1) } else { None };
    }

    let maps = build_maps(&nodes);
    let mut loop_counters = std::collections::HashMap::new();
    let mut tool_path = Vec::new();
    let mut errors = Vec::new();

    let mut cursor = if nodes.is_empty() { None } else { Some(0) };
    let mut steps = 0usize;

    while let Some(idx) = cursor {
        if steps >= options.max_steps {
            break;
        }
        steps += 1;

        let default_next = nodes[idx].next;
        let mut node = nodes[idx].clone();

        let result = {
            let mut ctx = HandlerContext {
                options,
                maps: &maps,
                nodes: &nodes,
                cursor: idx,
                loop_counters: &mut loop_counters,
            };
            handlers::run_chain(chain, &mut node, state, &mut ctx)
        };

        nodes[idx] = node;

        let next = match result {
            Ok(HandlerOutput::Delegate) => default_next,
            Ok(HandlerOutput::Motion { points, duration }) => {
                tool_path.push(ToolPathEntry { points, duration, node_index: idx });
                default_next
            }
            Ok(HandlerOutput::Redirected { next }) => next,
            Err(e) => {
                errors.push(e);
                default_next
            }
        };

        if next == Some(idx) {
            break;
        }
        cursor = next;
    }

    CanalRun { tool_path, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse_line;
    use crate::machine::FANUC_GENERIC;
    use crate::state::CanalState;

    #[test]
    fn linear_move_produces_one_tool_path_entry() {
        let node = parse_line("G1 X10 Y5 F60", 1).unwrap();
        let chain = handlers::default_chain();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let options = EngineOptions::default();
        let run = run_canal(vec![node], &chain, &mut state, &options);
        assert_eq!(run.tool_path.len(), 1);
        assert!(run.errors.is_empty());
        assert_eq!(state.axis('X'), 10.0);
    }

    #[test]
    fn counted_do_end_loop_repeats_the_body() {
        let lines = ["DO1", "G1 X1 F60", "END1"];
        let mut nodes = Vec::new();
        for (i, l) in lines.iter().enumerate() {
            let mut n = parse_line(l, i as u32 + 1).unwrap();
            if i == 0 {
                n.parameters.insert('L', "3".to_string());
            }
            nodes.push(n);
        }
        let chain = handlers::default_chain();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let options = EngineOptions::default();
        let run = run_canal(nodes, &chain, &mut state, &options);
        assert!(run.tool_path.len() >= 3);
        assert_eq!(state.axis('X'), 1.0);
    }
}
