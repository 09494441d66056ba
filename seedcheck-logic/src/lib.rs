pub mod patches;

use anyhow::{ensure, Result};
use std::sync::Arc;

use seedcheck_game::{
    Capacity, NodeIndex, ResourceCollection, ResourceDatabase, ResourceGain, WorldGraph,
};

pub use patches::{GamePatches, PatchesData, PickupData, PickupEntry};

// Everything a search step needs to look up but never changes during a run.
#[derive(Clone, Copy)]
pub struct TraversalContext<'a> {
    pub graph: &'a WorldGraph,
    pub patches: &'a GamePatches,
}

impl<'a> TraversalContext<'a> {
    pub fn new(graph: &'a WorldGraph, patches: &'a GamePatches) -> Self {
        TraversalContext { graph, patches }
    }

    pub fn db(&self) -> &'a ResourceDatabase {
        &self.graph.resource_database
    }

    pub fn starting_node(&self) -> NodeIndex {
        self.patches.starting_node.unwrap_or(self.graph.starting_node)
    }

    // Static node gains followed by whatever pickup the layout put there.
    pub fn resource_gain_on_collect(&self, node: NodeIndex) -> Vec<ResourceGain> {
        let n = &self.graph.nodes[node];
        let mut out = n.resource_gain.clone();
        if let Some(entry) = n.pickup_index.and_then(|p| self.patches.pickup_at(p)) {
            out.extend(entry.resources.iter().copied());
        }
        out
    }

    pub fn victory_satisfied(&self, state: &State) -> bool {
        self.graph
            .victory_condition
            .satisfied(self.db(), &state.resources, state.energy)
    }
}

// Immutable search snapshot. New states are derived and point back at their parent.
#[derive(Clone, Debug)]
pub struct State {
    pub node: NodeIndex,
    pub resources: ResourceCollection,
    pub collected_nodes: Vec<bool>,
    pub energy: Capacity,
    pub maximum_energy: Capacity,
    pub previous_state: Option<Arc<State>>,
    pub path_from_previous_state: Vec<NodeIndex>,
}

impl State {
    pub fn initial(cx: &TraversalContext) -> Result<Arc<State>> {
        let mut resources = ResourceCollection::from_gains(&cx.graph.starting_resources);
        resources.add_gain(cx.patches.starting_resources.iter().copied());
        State::with_start(cx, cx.starting_node(), resources)
    }

    pub fn with_start(
        cx: &TraversalContext,
        node: NodeIndex,
        resources: ResourceCollection,
    ) -> Result<Arc<State>> {
        ensure!(
            node < cx.graph.nodes.len(),
            "starting node {node} is out of range"
        );
        let maximum_energy = cx.db().maximum_energy(&resources);
        Ok(Arc::new(State {
            node,
            resources,
            collected_nodes: vec![false; cx.graph.nodes.len()],
            energy: maximum_energy,
            maximum_energy,
            previous_state: None,
            path_from_previous_state: vec![],
        }))
    }

    pub fn is_collected(&self, node: NodeIndex) -> bool {
        self.collected_nodes[node]
    }

    pub fn should_collect(&self, cx: &TraversalContext, node: NodeIndex) -> bool {
        cx.graph.nodes[node].is_resource_node() && !self.is_collected(node)
    }

    fn derive(
        this: &Arc<State>,
        cx: &TraversalContext,
        node: NodeIndex,
        collected: NodeIndex,
        path: Vec<NodeIndex>,
        energy: Capacity,
    ) -> Arc<State> {
        let mut resources = this.resources.clone();
        resources.add_gain(cx.resource_gain_on_collect(collected));
        let mut collected_nodes = this.collected_nodes.clone();
        collected_nodes[collected] = true;
        let maximum_energy = cx.db().maximum_energy(&resources);
        // Energy tanks fill up as they raise the maximum.
        let mut energy = energy + (maximum_energy - this.maximum_energy).max(0);
        if cx.graph.nodes[collected].heal {
            energy = maximum_energy;
        }
        Arc::new(State {
            node,
            resources,
            collected_nodes,
            energy: energy.min(maximum_energy),
            maximum_energy,
            previous_state: Some(this.clone()),
            path_from_previous_state: path,
        })
    }

    // Moves to `node` along `path` arriving with `energy`, then collects it.
    pub fn act_on_node(
        this: &Arc<State>,
        cx: &TraversalContext,
        node: NodeIndex,
        path: Vec<NodeIndex>,
        energy: Capacity,
    ) -> Arc<State> {
        State::derive(this, cx, node, node, path, energy)
    }

    // Collects `node` while staying at the current position.
    pub fn collect_at_origin(this: &Arc<State>, cx: &TraversalContext, node: NodeIndex) -> Arc<State> {
        State::derive(this, cx, this.node, node, vec![], this.energy)
    }

    pub fn heal(this: &Arc<State>) -> Arc<State> {
        Arc::new(State {
            energy: this.maximum_energy,
            previous_state: Some(this.clone()),
            path_from_previous_state: vec![],
            ..State::clone(this)
        })
    }

    pub fn take_damage(this: &Arc<State>, damage: Capacity) -> Arc<State> {
        Arc::new(State {
            energy: (this.energy - damage).max(0),
            previous_state: Some(this.clone()),
            path_from_previous_state: vec![],
            ..State::clone(this)
        })
    }

    // Chain from the initial state to this one.
    pub fn path_states(this: &Arc<State>) -> Vec<Arc<State>> {
        let mut out = vec![this.clone()];
        let mut cur = this.previous_state.clone();
        while let Some(s) = cur {
            cur = s.previous_state.clone();
            out.push(s);
        }
        out.reverse();
        out
    }

    // Every node visited from the initial state, in order. Each segment starts where the last ended.
    pub fn full_path(this: &Arc<State>) -> Vec<NodeIndex> {
        let states = State::path_states(this);
        let mut out = vec![states[0].node];
        for s in &states[1..] {
            let segment = &s.path_from_previous_state;
            let skip = match (segment.first(), out.last()) {
                (Some(first), Some(last)) if first == last => 1,
                _ => 0,
            };
            out.extend(segment.iter().skip(skip));
        }
        out
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.previous_state.as_ref();
        while let Some(s) = cur {
            depth += 1;
            cur = s.previous_state.as_ref();
        }
        depth
    }
}
