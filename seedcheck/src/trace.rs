use log::debug;
use std::time::Duration;

use seedcheck_game::{NodeIndex, RequirementSet, WorldGraph};

#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent {
    NewAttempt {
        attempt: usize,
        depth: usize,
        node: NodeIndex,
        elapsed: Duration,
    },
    SatisfiableActions {
        depth: usize,
        actions: Vec<NodeIndex>,
    },
    SafeAction {
        depth: usize,
        node: NodeIndex,
    },
    Action {
        depth: usize,
        node: NodeIndex,
    },
    SkipAction {
        depth: usize,
        node: NodeIndex,
    },
    Rollback {
        depth: usize,
        node: NodeIndex,
        has_action: bool,
        additional: RequirementSet,
    },
    Victory {
        depth: usize,
        node: NodeIndex,
    },
}

// Receives resolver progress. Never influences the search outcome.
pub trait ResolverTrace {
    fn enabled(&self) -> bool {
        true
    }

    fn event(&mut self, graph: &WorldGraph, event: TraceEvent);
}

#[derive(Default, Clone, Copy, Debug)]
pub struct NoTrace;

impl ResolverTrace for NoTrace {
    fn enabled(&self) -> bool {
        false
    }

    fn event(&mut self, _graph: &WorldGraph, _event: TraceEvent) {}
}

// Renders events through `log::debug!`, indented by search depth.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogTrace;

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

impl ResolverTrace for LogTrace {
    fn enabled(&self) -> bool {
        log::log_enabled!(log::Level::Debug)
    }

    fn event(&mut self, graph: &WorldGraph, event: TraceEvent) {
        match event {
            TraceEvent::NewAttempt {
                attempt,
                depth,
                node,
                elapsed,
            } => debug!(
                "{}> {} (attempt {attempt}, {:.3}s)",
                indent(depth),
                graph.node_name(node),
                elapsed.as_secs_f32()
            ),
            TraceEvent::SatisfiableActions { depth, actions } => {
                let names: Vec<String> = actions.iter().map(|&n| graph.node_name(n)).collect();
                debug!("{}# satisfiable actions: {}", indent(depth), names.join(", "));
            }
            TraceEvent::SafeAction { depth, node } => {
                debug!("{}* safe action {}", indent(depth), graph.node_name(node))
            }
            TraceEvent::Action { depth, node } => {
                debug!("{}- trying {}", indent(depth), graph.node_name(node))
            }
            TraceEvent::SkipAction { depth, node } => debug!(
                "{}- skipping {}, memo no longer satisfied",
                indent(depth),
                graph.node_name(node)
            ),
            TraceEvent::Rollback {
                depth,
                node,
                has_action,
                additional,
            } => {
                debug!(
                    "{}< rollback {} (had action: {has_action})",
                    indent(depth),
                    graph.node_name(node)
                );
                for line in additional.pretty_lines(&graph.resource_database) {
                    debug!("{}  requires {line}", indent(depth));
                }
            }
            TraceEvent::Victory { depth, node } => {
                debug!("{}! victory at {}", indent(depth), graph.node_name(node))
            }
        }
    }
}

// Keeps every event in memory.
#[derive(Default, Clone, Debug)]
pub struct RecordingTrace {
    pub events: Vec<TraceEvent>,
}

impl ResolverTrace for RecordingTrace {
    fn event(&mut self, _graph: &WorldGraph, event: TraceEvent) {
        self.events.push(event);
    }
}
