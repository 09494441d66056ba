use anyhow::{ensure, Context, Result};
use std::collections::BTreeSet;
use std::ops::Sub;
use std::sync::Arc;

use seedcheck_game::{HintId, NodeIndex, PickupIndex, ResourceId, ResourceKind, WorldGraph};
use seedcheck_logic::{GamePatches, State, TraversalContext};

use crate::logic::Logic;
use crate::reach::ResolverReach;

pub fn filter_pickup_nodes<'a>(
    graph: &'a WorldGraph,
    nodes: impl IntoIterator<Item = NodeIndex> + 'a,
) -> impl Iterator<Item = NodeIndex> + 'a {
    nodes
        .into_iter()
        .filter(move |&n| graph.nodes[n].pickup_index.is_some())
}

pub fn filter_unassigned_pickup_nodes<'a>(
    graph: &'a WorldGraph,
    nodes: impl IntoIterator<Item = NodeIndex> + 'a,
    patches: &'a GamePatches,
) -> impl Iterator<Item = NodeIndex> + 'a {
    filter_pickup_nodes(graph, nodes).filter(move |&n| {
        graph.nodes[n]
            .pickup_index
            .is_some_and(|p| patches.pickup_at(p).is_none())
    })
}

pub fn find_node_with_resource(
    graph: &WorldGraph,
    resource: ResourceId,
    haystack: &[NodeIndex],
) -> Result<NodeIndex> {
    haystack
        .iter()
        .copied()
        .find(|&n| graph.nodes[n].resource_gain.iter().any(|&(r, _)| r == resource))
        .with_context(|| {
            format!(
                "could not find a node with resource '{}'",
                graph.resource_database.name(resource)
            )
        })
}

// A reach that stays anchored at its origin while collections pile up.
pub struct GeneratorReach {
    state: Arc<State>,
    reach: ResolverReach,
    logic: Logic,
}

impl GeneratorReach {
    pub fn reach_from_state(cx: &TraversalContext, state: Arc<State>) -> Self {
        let logic = Logic::new(cx.graph);
        let reach = ResolverReach::calculate_reach(cx, &logic, &state);
        GeneratorReach {
            state,
            reach,
            logic,
        }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn reach(&self) -> &ResolverReach {
        &self.reach
    }

    pub fn is_reachable_node(&self, node: NodeIndex) -> bool {
        self.reach.is_reachable_node(node)
    }

    pub fn collectable_nodes(&self, cx: &TraversalContext) -> Vec<NodeIndex> {
        self.reach
            .possible_actions(cx, &self.logic, &self.state)
            .into_iter()
            .map(|(n, _)| n)
            .collect()
    }

    pub fn collect(&mut self, cx: &TraversalContext, node: NodeIndex) -> Result<()> {
        ensure!(
            self.is_reachable_node(node),
            "node {} is not reachable",
            cx.graph.node_name(node)
        );
        ensure!(
            self.state.should_collect(cx, node),
            "node {} has nothing left to collect",
            cx.graph.node_name(node)
        );
        let new_state = State::collect_at_origin(&self.state, cx, node);
        self.reach = self.reach.expand(cx, &self.logic, &self.state, &new_state);
        self.state = new_state;
        Ok(())
    }

    // Collects everything that cannot close a path until nothing new shows up.
    pub fn collect_all_safe(&mut self, cx: &TraversalContext) -> Result<usize> {
        let mut collected = 0;
        loop {
            let actions = self.reach.safe_actions(cx, &self.logic, &self.state);
            if actions.is_empty() {
                return Ok(collected);
            }
            for (node, _) in actions {
                if self.state.should_collect(cx, node) {
                    self.collect(cx, node)?;
                    collected += 1;
                }
            }
        }
    }

    pub fn victory_condition_satisfied(&self, cx: &TraversalContext) -> bool {
        cx.victory_satisfied(&self.state)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UncollectedState {
    pub indices: BTreeSet<PickupIndex>,
    pub hints: BTreeSet<HintId>,
    pub events: BTreeSet<ResourceId>,
    pub nodes: BTreeSet<NodeIndex>,
}

impl UncollectedState {
    // Collected slots nothing was placed in yet, collected hints and events, reachable nodes.
    pub fn from_reach(cx: &TraversalContext, reach: &GeneratorReach) -> Self {
        let state = reach.state();
        let collected = cx
            .graph
            .nodes
            .iter()
            .filter(|n| state.is_collected(n.node_index));
        let mut out = UncollectedState::default();
        for node in collected {
            if let Some(p) = node.pickup_index {
                if cx.patches.pickup_at(p).is_none() {
                    out.indices.insert(p);
                }
            }
            if let Some(h) = node.hint {
                out.hints.insert(h);
            }
        }
        out.events = state
            .resources
            .iter_sorted()
            .into_iter()
            .filter(|(r, _)| r.kind == ResourceKind::Event)
            .map(|(r, _)| r)
            .collect();
        out.nodes = std::iter::once(reach.reach().origin)
            .chain(reach.reach().nodes().iter().copied())
            .collect();
        out
    }
}

impl Sub for &UncollectedState {
    type Output = UncollectedState;

    fn sub(self, other: &UncollectedState) -> UncollectedState {
        UncollectedState {
            indices: &self.indices - &other.indices,
            hints: &self.hints - &other.hints,
            events: &self.events - &other.events,
            nodes: &self.nodes - &other.nodes,
        }
    }
}
