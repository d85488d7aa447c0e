//! Fixed-cycle dispatch: G73/G81-G89 drilling cycles, G80 cancel, and
//! vendor named-cycle calls including `MCALL` modal re-invocation and the
//! `HOLES1`/`HOLES2`/`CYCLE801` position-pattern arrays.
//!
//! Grounded on the generic drilling-cycle sequence in spec §4.8 and its
//! MCALL/pattern-array paragraph (no single original file covers every
//! vendor cycle; structurally complex cycles — contour milling, thread
//! milling, pocket-with-islands — are deliberately left to emit an empty
//! point list rather than raise, per the same section's instruction).

use crate::node::CommandNode;
use crate::point::Point;
use crate::state::{CanalState, ExtraValue};

use crate::error::Result;

use super::{Handler, HandlerContext, HandlerOutput};

const DRILL_CODES: &[&str] = &[
    "G73", "G81", "G82", "G83", "G84", "G85", "G86", "G87", "G88", "G89",
];

/// Extract `(NAME, numeric_args)` from a `NAME(arg, arg, ...)` call. Any
/// comma-separated token that isn't a bare number (e.g. a nested cycle
/// name inside `MCALL(CYCLE81, 2, 0, -10)`) is dropped rather than
/// aborting the parse.
fn parse_call(text: &str) -> Option<(String, Vec<f64>)> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close <= open {
        return None;
    }
    let name = text[..open].trim().to_ascii_uppercase();
    let args = text[open + 1..close]
        .split(',')
        .filter_map(|tok| tok.trim().parse::<f64>().ok())
        .collect();
    Some((name, args))
}

/// Best-effort retract-plane/depth pair recovered from a named cycle's
/// trailing numeric arguments (Siemens `CYCLE81`-style `RFP`/`DP`
/// positions: the last two numeric args before any trailing options).
fn infer_depth(args: &[f64]) -> (Option<f64>, Option<f64>) {
    match args.len() {
        0 => (None, None),
        1 => (None, Some(args[0])),
        n => (Some(args[n - 2]), Some(args[n - 1])),
    }
}

/// `HOLES1`: a linear row of holes starting at `(x, y)`, spaced `spacing`
/// apart along `angle_deg`, `count` holes total.
fn holes1_positions(args: &[f64]) -> Vec<(f64, f64)> {
    if args.len() < 5 {
        return Vec::new();
    }
    let (x, y, angle_deg, spacing, count) = (args[0], args[1], args[2], args[3], args[4]);
    let n = count.max(0.0).round() as usize;
    let rad = angle_deg.to_radians();
    (0..n)
        .map(|i| {
            let d = spacing * i as f64;
            (x + d * rad.cos(), y + d * rad.sin())
        })
        .collect()
}

/// `HOLES2`: a circular bolt-pattern centered at `(x, y)`, `count` holes
/// starting at `start_angle_deg` and stepping by `angle_step_deg`.
fn holes2_positions(args: &[f64]) -> Vec<(f64, f64)> {
    if args.len() < 6 {
        return Vec::new();
    }
    let (cx, cy, radius, start_angle, step, count) = (args[0], args[1], args[2], args[3], args[4], args[5]);
    let n = count.max(0.0).round() as usize;
    (0..n)
        .map(|i| {
            let a = (start_angle + step * i as f64).to_radians();
            (cx + radius * a.cos(), cy + radius * a.sin())
        })
        .collect()
}

/// `CYCLE801`: a rectangular grid of `count_x * count_y` holes starting
/// at `(x, y)` with the given row/column spacing.
fn cycle801_positions(args: &[f64]) -> Vec<(f64, f64)> {
    if args.len() < 6 {
        return Vec::new();
    }
    let (x, y, spacing_x, spacing_y, count_x, count_y) = (args[0], args[1], args[2], args[3], args[4], args[5]);
    let nx = count_x.max(0.0).round() as usize;
    let ny = count_y.max(0.0).round() as usize;
    let mut out = Vec::with_capacity(nx * ny);
    for row in 0..ny {
        for col in 0..nx {
            out.push((x + spacing_x * col as f64, y + spacing_y * row as f64));
        }
    }
    out
}

pub struct CycleHandler;

impl CycleHandler {
    /// Rapid to `(x, y)`, rapid to the R-plane, feed to `z_depth`, retract.
    /// `r_plane`/`z_depth` default to the current Z when not supplied, the
    /// same fallback `run_drill_cycle` uses when a named cycle's call
    /// doesn't carry enough numeric arguments to recover them.
    fn drill_at(
        &self,
        x: f64,
        y: f64,
        r_plane: Option<f64>,
        z_depth: Option<f64>,
        state: &mut CanalState,
    ) -> (Vec<Point>, f64) {
        let start_z = state.axis('Z');
        let relative = state.is_relative();
        let r_plane = match r_plane {
            Some(r) if relative => start_z + r,
            Some(r) => r,
            None => start_z,
        };
        let z_depth = z_depth.unwrap_or(start_z);
        let feed_mm_per_sec = if state.feed_rate > 0.0 { state.feed_rate / 60.0 } else { 1.0 };

        let mut points = vec![Point::xyz(state.axis('X'), state.axis('Y'), start_z)];
        points.push(Point::xyz(x, y, start_z));
        points.push(Point::xyz(x, y, r_plane));
        points.push(Point::xyz(x, y, z_depth));

        let retract_to_initial = state.modal_groups.get("retract").map(String::as_str) == Some("G98");
        let retract_z = if retract_to_initial { start_z } else { r_plane };
        points.push(Point::xyz(x, y, retract_z));

        let feed_duration = (z_depth - r_plane).abs() / feed_mm_per_sec;

        state.axes.insert('X', x);
        state.axes.insert('Y', y);
        state.axes.insert('Z', retract_z);

        (points, feed_duration)
    }

    fn run_drill_cycle(&self, node: &CommandNode, state: &mut CanalState) -> (Vec<Point>, f64) {
        let x = node.param_f64('X').map(|v| state.resolve_target('X', v)).unwrap_or_else(|| state.axis('X'));
        let y = node.param_f64('Y').map(|v| state.resolve_target('Y', v)).unwrap_or_else(|| state.axis('Y'));
        let z_depth = node.param_f64('Z').map(|v| state.resolve_target('Z', v));
        self.drill_at(x, y, node.param_f64('R'), z_depth, state)
    }

    /// Run the stored MCALL cycle at `(x, y)` using its inferred R-plane
    /// and depth.
    fn run_mcall_at(&self, x: f64, y: f64, state: &mut CanalState) -> (Vec<Point>, f64) {
        let r = state.extra.get("mcall_r_plane").and_then(ExtraValue::as_float);
        let z = state.extra.get("mcall_z_depth").and_then(ExtraValue::as_float);
        self.drill_at(x, y, r, z, state)
    }

    fn clear_mcall(&self, state: &mut CanalState) {
        state.extra.remove("mcall_cycle");
        state.extra.remove("mcall_r_plane");
        state.extra.remove("mcall_z_depth");
    }

    /// Run a pattern array's stored cycle at every computed position,
    /// concatenating the points and summing the durations into one
    /// tool-path entry for the block that declared the pattern.
    fn run_pattern(&self, positions: Vec<(f64, f64)>, state: &mut CanalState) -> (Vec<Point>, f64) {
        let mut points = Vec::new();
        let mut duration = 0.0;
        for (x, y) in positions {
            let (pts, dur) = self.run_mcall_at(x, y, state);
            points.extend(pts);
            duration += dur;
        }
        (points, duration)
    }
}

impl Handler for CycleHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        _ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        if node.has_g_code("G98") {
            state.modal_groups.insert("retract".to_string(), "G98".to_string());
        } else if node.has_g_code("G99") {
            state.modal_groups.insert("retract".to_string(), "G99".to_string());
        }

        if node.has_g_code("G80") {
            state.extra.remove("active_cycle");
            state.extra.remove("active_named_cycle");
            self.clear_mcall(state);
            return Ok(HandlerOutput::Delegate);
        }

        let drill_code = DRILL_CODES.iter().find(|c| node.has_g_code(c));
        if let Some(code) = drill_code {
            state.extra.insert("active_cycle".to_string(), ExtraValue::Str(code.to_string()));
            let has_xy = node.param_f64('X').is_some() || node.param_f64('Y').is_some();
            if has_xy {
                let (points, duration) = self.run_drill_cycle(node, state);
                return Ok(HandlerOutput::Motion { points, duration });
            }
            return Ok(HandlerOutput::Delegate);
        }

        let has_xy = node.param_f64('X').is_some() || node.param_f64('Y').is_some();
        let bare_block = node.g_codes.is_empty() && node.variable_command.is_none() && has_xy;

        if bare_block {
            if state.extra.contains_key("active_cycle") {
                let (points, duration) = self.run_drill_cycle(node, state);
                return Ok(HandlerOutput::Motion { points, duration });
            }
            if state.extra.contains_key("mcall_cycle") {
                let x = node.param_f64('X').map(|v| state.resolve_target('X', v)).unwrap_or_else(|| state.axis('X'));
                let y = node.param_f64('Y').map(|v| state.resolve_target('Y', v)).unwrap_or_else(|| state.axis('Y'));
                let (points, duration) = self.run_mcall_at(x, y, state);
                return Ok(HandlerOutput::Motion { points, duration });
            }
        }

        if let Some(text) = node.variable_command.clone() {
            if text.trim() == "MCALL()" {
                self.clear_mcall(state);
                return Ok(HandlerOutput::Motion { points: vec![], duration: 0.0 });
            }

            if let Some((name, args)) = parse_call(&text) {
                if name == "MCALL" {
                    let (r_plane, z_depth) = infer_depth(&args);
                    state.extra.insert("mcall_cycle".to_string(), ExtraValue::Str(text.clone()));
                    match r_plane {
                        Some(r) => state.extra.insert("mcall_r_plane".to_string(), ExtraValue::Float(r)),
                        None => state.extra.remove("mcall_r_plane"),
                    };
                    match z_depth {
                        Some(z) => state.extra.insert("mcall_z_depth".to_string(), ExtraValue::Float(z)),
                        None => state.extra.remove("mcall_z_depth"),
                    };
                    return Ok(HandlerOutput::Motion { points: vec![], duration: 0.0 });
                }

                let positions = match name.as_str() {
                    "HOLES1" => Some(holes1_positions(&args)),
                    "HOLES2" => Some(holes2_positions(&args)),
                    "CYCLE801" => Some(cycle801_positions(&args)),
                    _ => None,
                };
                if let Some(positions) = positions {
                    let (points, duration) = self.run_pattern(positions, state);
                    return Ok(HandlerOutput::Motion { points, duration });
                }

                // Structurally complex cycles (contour/thread milling,
                // pocket-with-islands, vendor libraries we don't model)
                // return an outline-free empty point list rather than
                // raising, per spec §4.8.
                state.extra.insert("active_named_cycle".to_string(), ExtraValue::Str(text));
                return Ok(HandlerOutput::Motion { points: vec![], duration: 0.0 });
            }
        }

        Ok(HandlerOutput::Delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse_line;
    use crate::machine::FANUC_GENERIC;

    fn ctx<'a>(
        maps: &'a super::super::ControlFlowMaps,
        options: &'a super::super::EngineOptions,
        counters: &'a mut std::collections::HashMap<String, i64>,
    ) -> HandlerContext<'a> {
        HandlerContext { options, maps, nodes: &[], cursor: 0, loop_counters: counters }
    }

    #[test]
    fn drill_cycle_emits_retract_sequence() {
        let mut node = CommandNode::new(1);
        node.g_codes.insert("G81".to_string());
        node.parameters.insert('X', "5".to_string());
        node.parameters.insert('Y', "0".to_string());
        node.parameters.insert('R', "2".to_string());
        node.parameters.insert('Z', "-10".to_string());
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.len() >= 4),
            _ => panic!("expected motion output"),
        }
        assert_eq!(state.axis('X'), 5.0);
    }

    #[test]
    fn unimplemented_named_cycle_returns_empty_points() {
        let mut node = parse_line("POCKET1(10, 20, -5)", 1).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.is_empty()),
            _ => panic!("expected motion output"),
        }
    }

    #[test]
    fn mcall_modal_recall_drills_at_each_bare_xy_block() {
        let mut mcall_node = parse_line("MCALL(CYCLE81, 2, 0, -10)", 1).unwrap();
        let mut recall_node = parse_line("X5 Y0", 2).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut mcall_node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.is_empty()),
            _ => panic!("expected (empty) motion output for the MCALL registration itself"),
        }

        match CycleHandler.handle(&mut recall_node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.len() >= 4),
            _ => panic!("expected modal recall to drill at the new position"),
        }
        assert_eq!(state.axis('X'), 5.0);
        assert_eq!(state.axis('Y'), 0.0);
    }

    #[test]
    fn mcall_cancel_clears_modal_state() {
        let mut mcall_node = parse_line("MCALL(CYCLE81, 2, 0, -10)", 1).unwrap();
        let mut cancel_node = parse_line("MCALL()", 2).unwrap();
        let mut recall_node = parse_line("X5 Y0", 3).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        CycleHandler.handle(&mut mcall_node, &mut state, &mut c).unwrap();
        CycleHandler.handle(&mut cancel_node, &mut state, &mut c).unwrap();
        match CycleHandler.handle(&mut recall_node, &mut state, &mut c).unwrap() {
            HandlerOutput::Delegate => {}
            _ => panic!("expected the bare X/Y block to fall through once MCALL is cancelled"),
        }
    }

    #[test]
    fn holes1_linear_pattern_visits_every_hole() {
        let mut node = parse_line("HOLES1(0, 0, 0, 10, 3)", 1).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.len() >= 3 * 4),
            _ => panic!("expected a concatenated pattern motion"),
        }
        assert_eq!(state.axis('X'), 20.0);
        assert_eq!(state.axis('Y'), 0.0);
    }

    #[test]
    fn holes2_circular_pattern_visits_every_hole() {
        let mut node = parse_line("HOLES2(0, 0, 10, 0, 90, 4)", 1).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.len() >= 4 * 4),
            _ => panic!("expected a concatenated pattern motion"),
        }
        assert!((state.axis('X') - 0.0).abs() < 1e-9);
        assert!((state.axis('Y') - (-10.0)).abs() < 1e-9);
    }

    #[test]
    fn cycle801_grid_pattern_visits_every_hole() {
        let mut node = parse_line("CYCLE801(0, 0, 10, 20, 2, 2)", 1).unwrap();
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.feed_rate = 60.0;
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = std::collections::HashMap::new();
        let mut c = ctx(&maps, &options, &mut counters);

        match CycleHandler.handle(&mut node, &mut state, &mut c).unwrap() {
            HandlerOutput::Motion { points, .. } => assert!(points.len() >= 2 * 2 * 4),
            _ => panic!("expected a concatenated pattern motion"),
        }
        assert_eq!(state.axis('X'), 10.0);
        assert_eq!(state.axis('Y'), 20.0);
    }
}
