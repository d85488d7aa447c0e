//! The execution engine orchestrator.
//!
//! Grounded on `application/nc_execution.py`'s `NCExecutionEngine`: split
//! on `;`, parse-errors-collected-not-fatal, per-canal run, then an
//! optional cross-canal synchronization pass, then plot assembly.

use std::collections::HashMap;

use crate::api::{CanalPlotOut, ExecutionErrorOut, MachineDataRequest, RunResponse, Segment, SegmentType};
use crate::canal::{run_canal, CanalRun, ToolPathEntry};
use crate::error::NcError;
use crate::handlers::{default_chain, EngineOptions, HandlerKind};
use crate::lexer::parse_line;
use crate::machine::{self, MachineConfig};
use crate::node::CommandNode;
use crate::state::{CanalState, ExtraValue, ToolCompensation};
use crate::sync::{synchronize, CanalTrack};

/// One canal's parsed program plus its execution outcome, retained after
/// the run so the engine can build the final plot and attribute errors.
struct CanalResult {
    canal_nr: String,
    nodes: Vec<CommandNode>,
    run: CanalRun,
}

pub struct ExecutionEngine {
    chain: Vec<HandlerKind>,
    options: EngineOptions,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self { chain: default_chain(), options: EngineOptions::default() }
    }
}

impl ExecutionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { chain: default_chain(), options }
    }

    fn resolve_machine(name: &str) -> &'static MachineConfig {
        machine::known(name).unwrap_or(&machine::FANUC_GENERIC)
    }

    /// Parse one program's text into command nodes, collecting per-line
    /// parse errors without aborting the rest of the program.
    fn parse_program(program: &str, errors: &mut Vec<NcError>) -> Vec<CommandNode> {
        let mut nodes = Vec::new();
        for (i, raw_line) in program.split(';').enumerate() {
            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_line(trimmed, i as u32 + 1) {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    tracing::debug!(line = i + 1, "parse error: {e}");
                    errors.push(e);
                }
            }
        }
        nodes
    }

    /// Run every canal in `request`, optionally synchronizing wait points
    /// across them, and assemble the response the hosting layer returns.
    pub fn run(&self, request: &MachineDataRequest) -> RunResponse {
        let mut errors: Vec<NcError> = Vec::new();
        let mut results: Vec<CanalResult> = Vec::new();

        for canal_input in &request.machinedata {
            let machine_config = Self::resolve_machine(&canal_input.machine_name);
            let mut state = CanalState::new(machine_config);

            for var in &canal_input.custom_variables {
                state.parameters.insert(var.name.clone(), var.value);
            }
            if !canal_input.tool_values.is_empty() {
                let mut table = HashMap::new();
                for tv in &canal_input.tool_values {
                    table.insert(tv.tool_number, ToolCompensation { q_value: tv.q_value, r_value: tv.r_value });
                }
                state.extra.insert("tool_compensation_data".to_string(), ExtraValue::ToolData(table));
            }

            let nodes = Self::parse_program(&canal_input.program, &mut errors);
            let run = run_canal(nodes.clone(), &self.chain, &mut state, &self.options);
            errors.extend(run.errors.iter().cloned());

            results.push(CanalResult { canal_nr: canal_input.canal_nr.clone(), nodes, run });
        }

        if results.len() >= 2 {
            if let Err(e) = self.synchronize_all(&mut results) {
                errors.push(e);
            }
        }

        self.build_response(results, errors)
    }

    fn synchronize_all(&self, results: &mut [CanalResult]) -> Result<(), NcError> {
        let mut tracks: Vec<CanalTrack> = results
            .iter_mut()
            .map(|r| CanalTrack { tool_path: &mut r.run.tool_path, nodes: &r.nodes })
            .collect();
        synchronize(&mut tracks, self.options.max_sync_iterations)
    }

    fn build_response(&self, results: Vec<CanalResult>, errors: Vec<NcError>) -> RunResponse {
        let mut canal = HashMap::new();
        let mut any_success = false;

        for result in results {
            let mut segments = Vec::new();
            let mut executed_lines = Vec::new();
            let mut timing = Vec::new();

            for ToolPathEntry { points, duration, node_index } in &result.run.tool_path {
                let node = &result.nodes[*node_index];
                let segment_type = if node.has_any_g_code(&["G0", "G00"]) {
                    SegmentType::Rapid
                } else {
                    SegmentType::Linear
                };
                let tool_number = node.param('T').and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
                segments.push(Segment {
                    segment_type,
                    line_number: node.line_nr,
                    tool_number,
                    points: points.iter().map(|p| (p.x, p.y, p.z)).collect(),
                });
                executed_lines.push(node.line_nr);
                timing.push(*duration);
            }

            if !segments.is_empty() {
                any_success = true;
            }

            canal.insert(
                result.canal_nr.clone(),
                CanalPlotOut { segments, executed_lines, variables: HashMap::new(), timing },
            );
        }

        let errors_out: Vec<ExecutionErrorOut> = errors
            .iter()
            .map(|e| ExecutionErrorOut {
                code: e.code(),
                line: e.line(),
                canal: e.canal(),
                message: e.to_string(),
            })
            .collect();

        RunResponse {
            canal,
            message: Vec::new(),
            success: any_success,
            has_errors: !errors_out.is_empty(),
            errors: errors_out,
        }
    }
}
