use anyhow::Result;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use seedcheck_game::{Capacity, NodeIndex, RequirementList, RequirementSet, WorldGraph};
use seedcheck_logic::{GamePatches, State, TraversalContext};

use crate::logic::{Logic, ResolverLimits, SearchAbort};
use crate::placement::GeneratorReach;
use crate::reach::ResolverReach;
use crate::settings::ResolverSettings;
use crate::trace::{LogTrace, NoTrace, ResolverTrace, TraceEvent};

#[derive(Clone, Debug)]
pub enum Verdict {
    Succeeded(Arc<State>),
    Impossible,
    AttemptsExhausted { attempts: usize },
    TimedOut { elapsed: Duration },
    Cancelled { attempts: usize },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Succeeded(_))
    }

    pub fn final_state(&self) -> Option<&Arc<State>> {
        match self {
            Verdict::Succeeded(state) => Some(state),
            _ => None,
        }
    }
}

impl From<SearchAbort> for Verdict {
    fn from(abort: SearchAbort) -> Self {
        match abort {
            SearchAbort::AttemptsExhausted { attempts } => Verdict::AttemptsExhausted { attempts },
            SearchAbort::TimedOut { elapsed } => Verdict::TimedOut { elapsed },
            SearchAbort::Cancelled { attempts } => Verdict::Cancelled { attempts },
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolveReport {
    pub verdict: Verdict,
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    pub limits: ResolverLimits,
    pub shuffle_actions: bool,
}

enum FrameKind {
    // Committed to a safe action: the child's result is this frame's result.
    Committed,
    Branching {
        actions: Vec<(NodeIndex, Capacity)>,
        next: usize,
        has_action: bool,
    },
}

struct SearchFrame {
    state: Arc<State>,
    reach: ResolverReach,
    kind: FrameKind,
}

enum Transition {
    Explore(Arc<State>, Option<ResolverReach>),
    Advance,
    Failed,
}

// Drops lists that need something to be missing; drops constraints already met, on dangerous
// resources, or on damage. Energy depends on the route, so only monotone needs are remembered.
fn simplify_additional_requirements(
    cx: &TraversalContext,
    additional: &RequirementSet,
    state: &State,
) -> RequirementSet {
    let db = cx.db();
    RequirementSet::new(
        additional
            .alternatives()
            .filter(|list| list.values().iter().all(|r| !r.negate))
            .map(|list| {
                RequirementList::new(list.values().iter().copied().filter(|r| {
                    !r.is_damage()
                        && !r.satisfied(db, &state.resources, state.energy)
                        && !cx.graph.is_dangerous(r.resource)
                }))
            }),
    )
}

fn rollback<T: ResolverTrace>(
    cx: &TraversalContext,
    logic: &mut Logic<T>,
    frame: &SearchFrame,
    has_action: bool,
    depth: usize,
) {
    // Success from here needs the frontier opened or victory met with more resources.
    let mut additional = frame
        .reach
        .satisfiable_as_requirement_set()
        .or_with(&cx.graph.victory_condition);
    if has_action {
        let collectable = frame
            .reach
            .collectable_memo_requirements(cx, logic, &frame.state);
        additional = additional.and_with(&RequirementSet::new([collectable]));
    }
    let additional = simplify_additional_requirements(cx, &additional, &frame.state);
    let node = frame.state.node;
    if logic.trace.enabled() {
        let event = TraceEvent::Rollback {
            depth,
            node,
            has_action,
            additional: additional.clone(),
        };
        logic.emit(cx.graph, || event);
    }
    logic.set(node, additional);
}

// Depth-first search over collection actions, with an explicit frame stack.
pub fn advance_depth<T: ResolverTrace, R: Rng>(
    cx: &TraversalContext,
    logic: &mut Logic<T>,
    initial: Arc<State>,
    options: &ResolveOptions,
    rng: &mut R,
) -> Result<Option<Arc<State>>, SearchAbort> {
    let db = cx.db();
    let mut stack: Vec<SearchFrame> = vec![];
    let mut transition = Transition::Explore(initial, None);
    loop {
        transition = match transition {
            Transition::Explore(state, known_reach) => {
                let depth = stack.len();
                logic.start_new_attempt(cx.graph, &state, depth, &options.limits)?;
                if cx.victory_satisfied(&state) {
                    logic.emit(cx.graph, || TraceEvent::Victory {
                        depth,
                        node: state.node,
                    });
                    return Ok(Some(state));
                }
                let reach = known_reach
                    .unwrap_or_else(|| ResolverReach::calculate_reach(cx, logic, &state));

                let mut committed = None;
                for (action, energy) in reach.safe_actions(cx, logic, &state) {
                    let path = reach.path_to_node(action);
                    let new_state = State::act_on_node(&state, cx, action, path, energy);
                    let new_reach = ResolverReach::calculate_reach(cx, logic, &new_state);
                    if new_reach.is_reachable_node(state.node) {
                        committed = Some((action, new_state, new_reach));
                        break;
                    }
                }
                if let Some((action, new_state, new_reach)) = committed {
                    logic.emit(cx.graph, || TraceEvent::SafeAction {
                        depth,
                        node: action,
                    });
                    stack.push(SearchFrame {
                        state,
                        reach,
                        kind: FrameKind::Committed,
                    });
                    Transition::Explore(new_state, Some(new_reach))
                } else {
                    let mut actions = reach.satisfiable_actions(cx, logic, &state);
                    if options.shuffle_actions {
                        actions.shuffle(rng);
                    }
                    if logic.trace.enabled() {
                        let event = TraceEvent::SatisfiableActions {
                            depth,
                            actions: actions.iter().map(|&(n, _)| n).collect(),
                        };
                        logic.emit(cx.graph, || event);
                    }
                    stack.push(SearchFrame {
                        state,
                        reach,
                        kind: FrameKind::Branching {
                            actions,
                            next: 0,
                            has_action: false,
                        },
                    });
                    Transition::Advance
                }
            }
            Transition::Advance => {
                let depth = stack.len().saturating_sub(1);
                let Some(frame) = stack.last_mut() else {
                    return Ok(None);
                };
                let FrameKind::Branching {
                    actions,
                    next,
                    has_action,
                } = &mut frame.kind
                else {
                    return Ok(None);
                };
                let mut chosen = None;
                while *next < actions.len() {
                    let (action, energy) = actions[*next];
                    *next += 1;
                    // Earlier siblings may have updated this action's memo entry.
                    if !logic
                        .get(action)
                        .satisfied(db, &frame.state.resources, energy)
                    {
                        logic.emit(cx.graph, || TraceEvent::SkipAction {
                            depth,
                            node: action,
                        });
                        continue;
                    }
                    *has_action = true;
                    chosen = Some((action, energy));
                    break;
                }
                match chosen {
                    Some((action, energy)) => {
                        logic.emit(cx.graph, || TraceEvent::Action {
                            depth,
                            node: action,
                        });
                        let path = frame.reach.path_to_node(action);
                        let new_state =
                            State::act_on_node(&frame.state, cx, action, path, energy);
                        Transition::Explore(new_state, None)
                    }
                    None => {
                        let has_action = *has_action;
                        rollback(cx, logic, frame, has_action, depth);
                        stack.pop();
                        Transition::Failed
                    }
                }
            }
            Transition::Failed => {
                let committed = match stack.last() {
                    None => return Ok(None),
                    Some(frame) => matches!(frame.kind, FrameKind::Committed),
                };
                if committed {
                    stack.pop();
                    Transition::Failed
                } else {
                    Transition::Advance
                }
            }
        };
    }
}

pub fn run_resolver<T: ResolverTrace, R: Rng>(
    cx: &TraversalContext,
    logic: &mut Logic<T>,
    initial: Arc<State>,
    options: &ResolveOptions,
    ignore_cache: bool,
    rng: &mut R,
) -> ResolveReport {
    logic.resolver_start(ignore_cache);
    let verdict = match advance_depth(cx, logic, initial, options, rng) {
        Ok(Some(state)) => Verdict::Succeeded(state),
        Ok(None) => Verdict::Impossible,
        Err(abort) => {
            info!("Resolver stopped: {abort}");
            abort.into()
        }
    };
    let report = ResolveReport {
        verdict,
        attempts: logic.attempts(),
        elapsed: logic.elapsed(),
    };
    info!(
        "Resolver finished after {} attempts in {:.3}s: {}",
        report.attempts,
        report.elapsed.as_secs_f32(),
        if report.verdict.is_success() {
            "beatable"
        } else {
            "not beatable"
        }
    );
    report
}

pub fn resolve(
    graph: &WorldGraph,
    patches: &GamePatches,
    settings: &ResolverSettings,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ResolveReport> {
    let cx = TraversalContext::new(graph, patches);
    let initial = State::initial(&cx)?;
    let options = ResolveOptions {
        limits: settings.limits(cancel),
        shuffle_actions: settings.shuffle_actions,
    };
    let mut rng = settings.rng();
    let report = if settings.trace {
        let mut logic = Logic::with_trace(graph, LogTrace);
        run_resolver(&cx, &mut logic, initial, &options, settings.ignore_cache, &mut rng)
    } else {
        let mut logic = Logic::with_trace(graph, NoTrace);
        run_resolver(&cx, &mut logic, initial, &options, settings.ignore_cache, &mut rng)
    };
    Ok(report)
}

// Full solver when enabled, otherwise the greedy safe-collection check.
pub fn validate_layout(
    graph: &WorldGraph,
    patches: &GamePatches,
    settings: &ResolverSettings,
) -> Result<bool> {
    if settings.validate_with_solver {
        return Ok(resolve(graph, patches, settings, None)?.verdict.is_success());
    }
    let cx = TraversalContext::new(graph, patches);
    let initial = State::initial(&cx)?;
    let mut reach = GeneratorReach::reach_from_state(&cx, initial);
    reach.collect_all_safe(&cx)?;
    Ok(reach.victory_condition_satisfied(&cx))
}
