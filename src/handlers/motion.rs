//! Linear and circular motion interpolation.
//!
//! Grounded on `domain/handlers/motion.py`: the center-candidate
//! derivation (chord midpoint offset by `h = sqrt(max(0, r*r - d2/4))`
//! along the unit perpendicular to the chord), the sweep-sign/minor-arc
//! selection rule, and the feed-mode-aware duration conversion are all
//! carried over from there. Point emission style (explicit start vertex,
//! `TAU`-normalized angle stepping) follows `src/visualizer/toolpath_rendering.rs`.

use std::f64::consts::TAU;

use crate::error::{CodeError, ErrorLocation, Result};
use crate::node::CommandNode;
use crate::point::Point;
use crate::state::CanalState;

use super::{Handler, HandlerContext, HandlerOutput};

fn loc(node: &CommandNode) -> ErrorLocation {
    ErrorLocation::new(node.line_nr, 0)
}

enum Motion {
    Rapid,
    Linear,
    ArcCw,
    ArcCcw,
}

fn classify(node: &CommandNode) -> Option<Motion> {
    if node.has_any_g_code(&["G0", "G00"]) {
        Some(Motion::Rapid)
    } else if node.has_any_g_code(&["G1", "G01"]) {
        Some(Motion::Linear)
    } else if node.has_any_g_code(&["G2", "G02"]) {
        Some(Motion::ArcCw)
    } else if node.has_any_g_code(&["G3", "G03"]) {
        Some(Motion::ArcCcw)
    } else {
        None
    }
}

/// Resolve the absolute target for every linear/rotary axis this block
/// touches, honoring distance mode, diameter normalization, and the
/// U/V/W-as-deltas-onto-X/Y/Z convention.
fn resolve_targets(node: &CommandNode, state: &CanalState) -> std::collections::HashMap<char, f64> {
    let mut target = std::collections::HashMap::new();
    for letter in ['X', 'Y', 'Z', 'A', 'B', 'C'] {
        if let Some(raw) = node.param_f64(letter) {
            target.insert(letter, state.resolve_target(letter, raw));
        } else {
            target.insert(letter, state.axis(letter));
        }
    }
    for (delta_letter, axis_letter) in [('U', 'X'), ('V', 'Y'), ('W', 'Z')] {
        if let Some(raw) = node.param_f64(delta_letter) {
            let normalized = state.normalize_axis_value(axis_letter, raw);
            let base = target.get(&axis_letter).copied().unwrap_or_else(|| state.axis(axis_letter));
            target.insert(axis_letter, base + normalized);
        }
    }
    target
}

fn feed_mm_per_sec(state: &CanalState) -> f64 {
    match state.modal_groups.get("feed_mode").map(String::as_str) {
        Some("per_rev") => state.feed_rate * state.spindle_speed / 60.0,
        _ => state.feed_rate / 60.0,
    }
}

fn start_point(state: &CanalState) -> Point {
    Point::new(
        state.axis('X'),
        state.axis('Y'),
        state.axis('Z'),
        state.axis('A'),
        state.axis('B'),
        state.axis('C'),
    )
}

fn linear_points(
    start: Point,
    target: &std::collections::HashMap<char, f64>,
    distance: f64,
    max_segment: f64,
) -> Vec<Point> {
    let end = Point::new(
        target.get(&'X').copied().unwrap_or(start.x),
        target.get(&'Y').copied().unwrap_or(start.y),
        target.get(&'Z').copied().unwrap_or(start.z),
        target.get(&'A').copied().unwrap_or(start.a),
        target.get(&'B').copied().unwrap_or(start.b),
        target.get(&'C').copied().unwrap_or(start.c),
    );
    if distance == 0.0 {
        return vec![end];
    }
    let n = ((distance / max_segment).ceil() as usize).max(1);
    let mut points = Vec::with_capacity(n + 1);
    points.push(start);
    for k in 1..=n {
        let t = k as f64 / n as f64;
        points.push(Point::new(
            start.x + (end.x - start.x) * t,
            start.y + (end.y - start.y) * t,
            start.z + (end.z - start.z) * t,
            end.a,
            end.b,
            end.c,
        ));
    }
    points
}

struct ArcGeometry {
    center: (f64, f64),
    sweep: f64,
}

fn candidate_centers(start: (f64, f64), end: (f64, f64), r: f64) -> Option<[(f64, f64); 2]> {
    let mid = ((start.0 + end.0) / 2.0, (start.1 + end.1) / 2.0);
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let d2 = dx * dx + dy * dy;
    if d2 == 0.0 {
        return None;
    }
    let h = (r * r - d2 / 4.0).max(0.0).sqrt();
    let perp = (-dy / d2.sqrt(), dx / d2.sqrt());
    Some([
        (mid.0 + perp.0 * h, mid.1 + perp.1 * h),
        (mid.0 - perp.0 * h, mid.1 - perp.1 * h),
    ])
}

fn signed_angle(center: (f64, f64), p: (f64, f64)) -> f64 {
    (p.1 - center.1).atan2(p.0 - center.0)
}

/// Normalize a raw sweep into `(-pi, pi]`, considering `{raw, raw-2pi,
/// raw+2pi}` and preferring the candidate whose sign matches `want_positive`;
/// falls back to the minimum-magnitude candidate overall (minor arc).
fn normalize_sweep(raw: f64, want_positive: bool) -> f64 {
    let candidates = [raw, raw - TAU, raw + TAU];
    let matching: Vec<f64> = candidates
        .into_iter()
        .filter(|c| if want_positive { *c > 0.0 } else { *c < 0.0 })
        .collect();
    let pool = if matching.is_empty() { candidates.to_vec() } else { matching };
    *pool
        .iter()
        .min_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap())
        .unwrap()
}

fn resolve_arc_geometry(
    node: &CommandNode,
    state: &CanalState,
    start: (f64, f64),
    end: (f64, f64),
    cw: bool,
) -> Result<ArcGeometry> {
    let i = node.param_f64('I').map(|v| state.normalize_axis_value('X', v));
    let j = node.param_f64('J').map(|v| state.normalize_axis_value('Y', v));

    let center = if i.is_some() || j.is_some() {
        (start.0 + i.unwrap_or(0.0), start.1 + j.unwrap_or(0.0))
    } else if let Some(r) = node.param_f64('R').filter(|r| *r != 0.0) {
        let candidates = candidate_centers(start, end, r).ok_or_else(|| {
            CodeError::InvalidArc { reason: "start and end coincide".to_string(), loc: loc(node) }
        })?;
        let mut best: Option<(f64, f64, f64, bool)> = None;
        for c in candidates {
            let raw = signed_angle(c, end) - signed_angle(c, start);
            let sweep = normalize_sweep(raw, !cw);
            let sign_matches = if cw { sweep < 0.0 } else { sweep > 0.0 };
            let better = match best {
                None => true,
                Some((_, _, best_sweep, best_matches)) => {
                    (sign_matches && !best_matches)
                        || (sign_matches == best_matches && sweep.abs() < best_sweep.abs())
                }
            };
            if better {
                best = Some((c.0, c.1, sweep, sign_matches));
            }
        }
        let (cx, cy, _, _) = best.unwrap();
        (cx, cy)
    } else {
        return Err(CodeError::InvalidArc {
            reason: "no I/J or R given".to_string(),
            loc: loc(node),
        }
        .into());
    };

    let raw = signed_angle(center, end) - signed_angle(center, start);
    let sweep = normalize_sweep(raw, !cw);
    Ok(ArcGeometry { center, sweep })
}

fn arc_points(
    start: Point,
    end: Point,
    geometry: &ArcGeometry,
    max_segment: f64,
    angle_per_segment_deg: f64,
) -> Vec<Point> {
    let radius = ((start.x - geometry.center.0).powi(2) + (start.y - geometry.center.1).powi(2)).sqrt();
    let arc_length = radius * geometry.sweep.abs();
    let by_length = (arc_length / max_segment).ceil() as usize;
    let by_angle = (geometry.sweep.abs() / angle_per_segment_deg.to_radians()).ceil() as usize;
    let n = by_length.max(by_angle).max(2);

    let a0 = signed_angle(geometry.center, (start.x, start.y));
    let mut points = Vec::with_capacity(n + 1);
    points.push(start);
    for k in 1..=n {
        let t = k as f64 / n as f64;
        let a = a0 + geometry.sweep * t;
        let x = geometry.center.0 + radius * a.cos();
        let y = geometry.center.1 + radius * a.sin();
        let z = start.z + (end.z - start.z) * t;
        points.push(Point::new(x, y, z, end.a, end.b, end.c));
    }
    points
}

pub struct MotionHandler;

impl Handler for MotionHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        let Some(motion) = classify(node) else {
            return Ok(HandlerOutput::Delegate);
        };

        let plane = state.modal_groups.get("plane").cloned().unwrap_or_else(|| "X_Y".to_string());
        let target = resolve_targets(node, state);
        let start = start_point(state);

        let (points, duration) = match motion {
            Motion::Rapid | Motion::Linear => {
                let distance = state.compute_distance(&target, &['X', 'Y', 'Z']);
                let pts = linear_points(start, &target, distance, ctx.options.max_segment_mm);
                let duration = if matches!(motion, Motion::Rapid) || distance == 0.0 {
                    0.0
                } else {
                    distance / feed_mm_per_sec(state)
                };
                (pts, duration)
            }
            Motion::ArcCw | Motion::ArcCcw => {
                if plane != "X_Y" {
                    return Err(CodeError::UnsupportedArcPlane { value: plane, loc: loc(node) }.into());
                }
                let cw = matches!(motion, Motion::ArcCw);
                let start_xy = (start.x, start.y);
                let end_xy = (
                    target.get(&'X').copied().unwrap_or(start.x),
                    target.get(&'Y').copied().unwrap_or(start.y),
                );
                let geometry = resolve_arc_geometry(node, state, start_xy, end_xy, cw)?;
                let end = Point::new(
                    end_xy.0,
                    end_xy.1,
                    target.get(&'Z').copied().unwrap_or(start.z),
                    target.get(&'A').copied().unwrap_or(start.a),
                    target.get(&'B').copied().unwrap_or(start.b),
                    target.get(&'C').copied().unwrap_or(start.c),
                );
                let pts = arc_points(start, end, &geometry, ctx.options.max_segment_mm, ctx.options.angle_per_segment_deg);
                let radius = ((start.x - geometry.center.0).powi(2) + (start.y - geometry.center.1).powi(2)).sqrt();
                let arc_length = radius * geometry.sweep.abs();
                let duration = arc_length / feed_mm_per_sec(state);
                (pts, duration)
            }
        };

        for (&letter, &value) in target.iter() {
            state.axes.insert(letter, value);
        }

        Ok(HandlerOutput::Motion { points, duration })
    }
}
