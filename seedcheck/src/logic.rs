use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use seedcheck_game::{NodeIndex, RequirementSet, WorldGraph};
use seedcheck_logic::State;

use crate::trace::{NoTrace, ResolverTrace, TraceEvent};

#[derive(Clone, Debug, Default)]
pub struct ResolverLimits {
    pub max_attempts: Option<usize>,
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SearchAbort {
    #[error("attempt budget exhausted after {attempts} attempts")]
    AttemptsExhausted { attempts: usize },
    #[error("timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },
}

// Per-run memo of requirements learned from failed branches, plus attempt accounting.
pub struct Logic<T: ResolverTrace = NoTrace> {
    additional_requirements: Vec<RequirementSet>,
    attempts: usize,
    started_at: Instant,
    pub trace: T,
}

impl Logic<NoTrace> {
    pub fn new(graph: &WorldGraph) -> Self {
        Logic::with_trace(graph, NoTrace)
    }
}

impl<T: ResolverTrace> Logic<T> {
    pub fn with_trace(graph: &WorldGraph, trace: T) -> Self {
        Logic {
            additional_requirements: vec![RequirementSet::trivial(); graph.nodes.len()],
            attempts: 0,
            started_at: Instant::now(),
            trace,
        }
    }

    pub fn get(&self, node: NodeIndex) -> &RequirementSet {
        &self.additional_requirements[node]
    }

    // Replaces the entry. A failure learned from a state that passed the old entry supersedes it;
    // conjoining would sum damage from unrelated routes.
    pub fn set(&mut self, node: NodeIndex, req: RequirementSet) {
        self.additional_requirements[node] = req;
    }

    pub fn resolver_start(&mut self, ignore_cache: bool) {
        self.attempts = 0;
        self.started_at = Instant::now();
        if ignore_cache {
            for req in self.additional_requirements.iter_mut() {
                *req = RequirementSet::trivial();
            }
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn start_new_attempt(
        &mut self,
        graph: &WorldGraph,
        state: &State,
        depth: usize,
        limits: &ResolverLimits,
    ) -> Result<(), SearchAbort> {
        if let Some(max_attempts) = limits.max_attempts {
            if self.attempts >= max_attempts {
                return Err(SearchAbort::AttemptsExhausted {
                    attempts: self.attempts,
                });
            }
        }
        if let Some(cancel) = &limits.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(SearchAbort::Cancelled {
                    attempts: self.attempts,
                });
            }
        }
        let elapsed = self.elapsed();
        if let Some(timeout) = limits.timeout {
            if elapsed >= timeout {
                return Err(SearchAbort::TimedOut { elapsed });
            }
        }
        self.attempts += 1;
        let attempt = self.attempts;
        self.emit(graph, || TraceEvent::NewAttempt {
            attempt,
            depth,
            node: state.node,
            elapsed,
        });
        Ok(())
    }

    pub fn emit(&mut self, graph: &WorldGraph, event: impl FnOnce() -> TraceEvent) {
        if self.trace.enabled() {
            self.trace.event(graph, event());
        }
    }
}
