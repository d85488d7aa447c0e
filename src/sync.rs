//! Multi-canal wait-code synchronizer.
//!
//! Grounded on `infrastructure/machines/star_canal_syncro.py`'s
//! `CanalSynchro`: the wait-code grouping rules (pairwise 12/13, three-way
//! 200..999 grouped by `P`), the cumulative-duration equalization, and the
//! iteration cap are carried over directly. The original's
//! `max_iterator = 9999` is rounded up to the spec's stated 10,000-iteration
//! termination bound.

use crate::canal::ToolPathEntry;
use crate::error::{CanalSyncError, NcError};
use crate::node::CommandNode;

/// Which synchronization group a wait M-code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitGroup {
    Pair12,
    Pair13,
    Pair23,
    Triple,
}

fn classify_wait(code: i64) -> Option<WaitGroup> {
    match code {
        40 | 41 | 82 | 83 => Some(WaitGroup::Pair12),
        131 | 133 => Some(WaitGroup::Pair13),
        c if (200..999).contains(&c) => Some(WaitGroup::Triple),
        _ => None,
    }
}

fn wait_code(node: &CommandNode) -> Option<i64> {
    node.param('M').and_then(|v| v.parse::<i64>().ok())
}

/// One canal's linear tool path plus its originating node list, as seen
/// by the synchronizer.
pub struct CanalTrack<'a> {
    pub tool_path: &'a mut Vec<ToolPathEntry>,
    pub nodes: &'a [CommandNode],
}

/// Align wait points across 2 or 3 canal tracks, rewriting each
/// participating wait-node's duration so cumulative time since the last
/// sync matches across canals. Mutates durations in place.
pub fn synchronize(tracks: &mut [CanalTrack], max_iterations: usize) -> Result<(), NcError> {
    if tracks.len() < 2 || tracks.len() > 3 {
        return Err(CanalSyncError::CanalCountMismatch.into());
    }

    let mut cursors = vec![0usize; tracks.len()];
    let mut accumulated = vec![0.0f64; tracks.len()];

    for _ in 0..max_iterations {
        if cursors.iter().enumerate().any(|(k, &c)| c >= tracks[k].tool_path.len()) {
            break;
        }

        let mut codes = Vec::with_capacity(tracks.len());
        let mut groups = Vec::with_capacity(tracks.len());
        for (k, track) in tracks.iter().enumerate() {
            let entry_idx = cursors[k];
            let node_idx = track.tool_path[entry_idx].node_index;
            let node = &track.nodes[node_idx];
            codes.push(wait_code(node));
            groups.push(wait_code(node).and_then(classify_wait));
        }

        let all_waiting = codes.iter().all(Option::is_some) && groups.iter().all(Option::is_some);

        if !all_waiting {
            for (k, track) in tracks.iter().enumerate() {
                let is_wait = groups[k].is_some();
                if !is_wait {
                    accumulated[k] += track.tool_path[cursors[k]].duration;
                    cursors[k] += 1;
                }
            }
            continue;
        }

        let first_group = groups[0];
        if groups.iter().any(|g| *g != first_group) {
            return Err(mismatch_error(&codes));
        }

        let first_code = codes[0];
        if codes.iter().any(|c| *c != first_code) {
            return Err(mismatch_error(&codes));
        }

        let t_max = accumulated
            .iter()
            .zip(tracks.iter().zip(cursors.iter()))
            .map(|(&acc, (track, &c))| acc + track.tool_path[c].duration)
            .fold(f64::MIN, f64::max);

        for (k, track) in tracks.iter_mut().enumerate() {
            let c = cursors[k];
            track.tool_path[c].duration = t_max - accumulated[k];
            accumulated[k] = 0.0;
            cursors[k] += 1;
        }
        continue;
    }

    if cursors.iter().enumerate().any(|(k, &c)| c < tracks[k].tool_path.len()) {
        let still_waiting = cursors.iter().enumerate().all(|(k, &c)| {
            c < tracks[k].tool_path.len()
                && wait_code(&tracks[k].nodes[tracks[k].tool_path[c].node_index]).is_some()
        });
        if still_waiting {
            return Err(CanalSyncError::IterationCapExceeded.into());
        }
    }

    Ok(())
}

fn mismatch_error(codes: &[Option<i64>]) -> NcError {
    match codes.len() {
        2 => CanalSyncError::PairMismatch12 {
            code_a: codes[0].unwrap_or(-1),
            code_b: codes[1].unwrap_or(-1),
        }
        .into(),
        3 => CanalSyncError::TripleMismatch {
            code_a: codes[0].unwrap_or(-1),
            code_b: codes[1].unwrap_or(-1),
            code_c: codes[2].unwrap_or(-1),
        }
        .into(),
        _ => CanalSyncError::CanalCountMismatch.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canal::ToolPathEntry;
    use crate::lexer::parse_line;
    use crate::point::Point;

    fn tool_path_for(lines: &[&str]) -> (Vec<CommandNode>, Vec<ToolPathEntry>) {
        let nodes: Vec<CommandNode> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| parse_line(l, i as u32 + 1).unwrap())
            .collect();
        let tool_path = nodes
            .iter()
            .enumerate()
            .map(|(i, _)| ToolPathEntry { points: vec![Point::default()], duration: 1.0, node_index: i })
            .collect();
        (nodes, tool_path)
    }

    #[test]
    fn equal_wait_codes_equalize_durations() {
        let (nodes_a, mut path_a) = tool_path_for(&["G1 X0", "M40"]);
        let (nodes_b, mut path_b) = tool_path_for(&["G1 X0", "M40"]);
        path_a[0].duration = 5.0;
        path_b[0].duration = 2.0;

        let mut tracks = [
            CanalTrack { tool_path: &mut path_a, nodes: &nodes_a },
            CanalTrack { tool_path: &mut path_b, nodes: &nodes_b },
        ];
        synchronize(&mut tracks, 10_000).unwrap();

        let total_a: f64 = path_a.iter().map(|e| e.duration).sum();
        let total_b: f64 = path_b.iter().map(|e| e.duration).sum();
        assert!((total_a - total_b).abs() < 1e-9);
    }

    #[test]
    fn mismatched_wait_codes_raise() {
        let (nodes_a, mut path_a) = tool_path_for(&["G1 X0", "M300"]);
        let (nodes_b, mut path_b) = tool_path_for(&["G1 X0", "M301"]);

        let mut tracks = [
            CanalTrack { tool_path: &mut path_a, nodes: &nodes_a },
            CanalTrack { tool_path: &mut path_b, nodes: &nodes_b },
        ];
        let err = synchronize(&mut tracks, 10_000).unwrap_err();
        assert!(matches!(err.code(), 202 | 205 | 206 | 207));
    }
}
