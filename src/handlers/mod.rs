//! Handler chain infrastructure.
//!
//! Grounded on `domain/exec_chain.py`'s chain-of-responsibility base
//! class, but realized as a flat vector of handler variants rather than a
//! linked object graph, per the design note ruling out a runtime pointer
//! graph for what is conceptually a fixed, compile-time-composed chain.

pub mod control_flow;
pub mod cycle;
pub mod modal;
pub mod motion;
pub mod tool;
pub mod variable;

use crate::error::Result;
use crate::node::CommandNode;
use crate::point::Point;
use crate::state::CanalState;

/// Tunable limits threaded through the handler chain, replacing the
/// teacher's stringly-typed `AppConfig` with a typed options struct.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub max_segment_mm: f64,
    pub angle_per_segment_deg: f64,
    pub max_steps: usize,
    pub max_sync_iterations: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_segment_mm: 0.5,
            angle_per_segment_deg: 10.0,
            max_steps: 10_000,
            max_sync_iterations: 10_000,
        }
    }
}

/// Node-index maps the control-flow handler needs, built once per canal
/// before the walk begins (§4.9/§4.10).
#[derive(Debug, Default, Clone)]
pub struct ControlFlowMaps {
    /// `N`-number label to node index.
    pub label_map: std::collections::HashMap<String, usize>,
    /// DO-label to the node indices of its `DO` statements.
    pub do_map: std::collections::HashMap<String, Vec<usize>>,
    /// END-label to the node indices of its `END` statements.
    pub end_map: std::collections::HashMap<String, Vec<usize>>,
}

/// Per-canal context a handler needs beyond the node and state: tunables,
/// the control-flow maps, the node list itself (for index-based lookups
/// and rewrites), and the current cursor.
pub struct HandlerContext<'a> {
    pub options: &'a EngineOptions,
    pub maps: &'a ControlFlowMaps,
    pub nodes: &'a [CommandNode],
    pub cursor: usize,
    /// Loop-iteration counters keyed by DO-label, owned by the canal and
    /// mutated across steps.
    pub loop_counters: &'a mut std::collections::HashMap<String, i64>,
}

/// What a handler produced for one node.
pub enum HandlerOutput {
    /// No motion emitted; the next handler in the chain should run.
    Delegate,
    /// A motion handler (or cycle handler) produced a segment.
    Motion { points: Vec<Point>, duration: f64 },
    /// A control-flow handler rewrote `node.next`; nothing else should run.
    Redirected { next: Option<usize> },
}

pub trait Handler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput>;
}

/// The fixed sequence of handlers a canal runs each node through, in the
/// order spec §2 lists them.
pub enum HandlerKind {
    Variable(variable::VariableHandler),
    ControlFlow(control_flow::ControlFlowHandler),
    Modal(modal::ModalHandler),
    Tool(tool::ToolHandler),
    Cycle(cycle::CycleHandler),
    Motion(motion::MotionHandler),
}

impl Handler for HandlerKind {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        match self {
            HandlerKind::Variable(h) => h.handle(node, state, ctx),
            HandlerKind::ControlFlow(h) => h.handle(node, state, ctx),
            HandlerKind::Modal(h) => h.handle(node, state, ctx),
            HandlerKind::Tool(h) => h.handle(node, state, ctx),
            HandlerKind::Cycle(h) => h.handle(node, state, ctx),
            HandlerKind::Motion(h) => h.handle(node, state, ctx),
        }
    }
}

/// Build the default handler chain, composed once at engine construction
/// (the design note's "resolved at compile time" registry).
pub fn default_chain() -> Vec<HandlerKind> {
    vec![
        HandlerKind::Variable(variable::VariableHandler),
        HandlerKind::ControlFlow(control_flow::ControlFlowHandler),
        HandlerKind::Modal(modal::ModalHandler),
        HandlerKind::Tool(tool::ToolHandler),
        HandlerKind::Cycle(cycle::CycleHandler),
        HandlerKind::Motion(motion::MotionHandler),
    ]
}

/// Run `node` through `chain` in order, stopping at the first handler that
/// doesn't delegate.
pub fn run_chain(
    chain: &[HandlerKind],
    node: &mut CommandNode,
    state: &mut CanalState,
    ctx: &mut HandlerContext,
) -> Result<HandlerOutput> {
    for handler in chain {
        match handler.handle(node, state, ctx)? {
            HandlerOutput::Delegate => continue,
            other => return Ok(other),
        }
    }
    Ok(HandlerOutput::Delegate)
}
