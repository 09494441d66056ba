use hashbrown::HashSet;
use std::collections::{BTreeMap, BTreeSet};

use seedcheck_game::{
    Capacity, NodeIndex, RequirementList, RequirementSet, ResourceCollection, ResourceDatabase,
    ResourceId,
};
use seedcheck_logic::{State, TraversalContext};

use crate::logic::Logic;
use crate::trace::ResolverTrace;

// Resources that could turn some of `lists` from unsatisfied to satisfied.
pub fn calculate_interesting_resources<'a>(
    lists: impl IntoIterator<Item = &'a RequirementList>,
    db: &ResourceDatabase,
    resources: &ResourceCollection,
    energy: Capacity,
) -> HashSet<ResourceId> {
    let mut out = HashSet::new();
    for list in lists {
        if list.satisfied(db, resources, energy) {
            // Each damage requirement may pass alone while their sum does not.
            for req in list.damage_requirements() {
                out.extend(db.resources_for_damage(req.resource, resources));
            }
            continue;
        }
        for req in list.values() {
            if req.negate {
                continue;
            }
            if req.is_damage() {
                out.extend(db.resources_for_damage(req.resource, resources));
            } else if !req.satisfied(db, resources, energy) {
                out.insert(req.resource);
            }
        }
    }
    out
}

// Nodes reachable from one origin under one state, plus the frontier just beyond.
#[derive(Clone, Debug)]
pub struct ResolverReach {
    pub origin: NodeIndex,
    nodes: Vec<NodeIndex>,
    energy_at_node: Vec<Option<Capacity>>,
    predecessor: Vec<Option<NodeIndex>>,
    blocked: BTreeMap<NodeIndex, RequirementSet>,
    blocked_sources: BTreeSet<NodeIndex>,
    satisfiable_requirements: BTreeSet<RequirementList>,
}

impl ResolverReach {
    pub fn calculate_reach<T: ResolverTrace>(
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
    ) -> ResolverReach {
        let num_nodes = cx.graph.nodes.len();
        let origin = state.node;
        let mut energy_at_node = vec![None; num_nodes];
        energy_at_node[origin] = Some(if cx.graph.nodes[origin].heal {
            state.maximum_energy
        } else {
            state.energy
        });
        let mut reach = ResolverReach {
            origin,
            nodes: vec![],
            energy_at_node,
            predecessor: vec![None; num_nodes],
            blocked: BTreeMap::new(),
            blocked_sources: BTreeSet::new(),
            satisfiable_requirements: BTreeSet::new(),
        };
        reach.propagate(cx, logic, state, HashSet::from([origin]));
        reach.finish(logic);
        reach
    }

    fn propagate<T: ResolverTrace>(
        &mut self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
        mut modified_nodes: HashSet<NodeIndex>,
    ) {
        let db = cx.db();
        let resources = &state.resources;
        while !modified_nodes.is_empty() {
            let mut new_modified_nodes: HashSet<NodeIndex> = HashSet::new();
            let modified_nodes_vec = {
                // Process the nodes in sorted order, to make the reach deterministic.
                let mut m: Vec<NodeIndex> = modified_nodes.into_iter().collect();
                m.sort();
                m
            };
            for &src in &modified_nodes_vec {
                let Some(energy) = self.energy_at_node[src] else {
                    continue;
                };
                let memo = logic.get(src);
                let memo_ok = memo.satisfied(db, resources, energy);
                for edge in &cx.graph.nodes[src].edges {
                    let dst = edge.target;
                    let energy_after = if memo_ok {
                        edge.requirement.energy_after(db, resources, energy)
                    } else {
                        None
                    };
                    let Some(mut new_energy) = energy_after else {
                        let guard = if memo_ok {
                            edge.requirement.clone()
                        } else {
                            edge.requirement.and_with(memo)
                        };
                        let merged = match self.blocked.get(&dst) {
                            Some(existing) => existing.or_with(&guard),
                            None => guard,
                        };
                        self.blocked.insert(dst, merged);
                        self.blocked_sources.insert(src);
                        continue;
                    };
                    if cx.graph.nodes[dst].heal {
                        new_energy = state.maximum_energy;
                    }
                    if self.energy_at_node[dst].map_or(true, |e| new_energy > e) {
                        self.energy_at_node[dst] = Some(new_energy);
                        if dst != self.origin {
                            self.predecessor[dst] = Some(src);
                        }
                        new_modified_nodes.insert(dst);
                    }
                }
            }
            modified_nodes = new_modified_nodes;
        }
    }

    fn finish<T: ResolverTrace>(&mut self, logic: &Logic<T>) {
        let origin = self.origin;
        self.nodes = (0..self.energy_at_node.len())
            .filter(|&n| n != origin && self.energy_at_node[n].is_some())
            .collect();
        let energy_at_node = &self.energy_at_node;
        self.blocked.retain(|&n, _| energy_at_node[n].is_none());
        self.satisfiable_requirements = self
            .blocked
            .iter()
            .flat_map(|(&target, guard)| {
                guard
                    .and_with(logic.get(target))
                    .alternatives()
                    .cloned()
                    .collect::<Vec<RequirementList>>()
            })
            .collect();
    }

    // Reach for `state`, reusing this one when `state` only gained harmless resources at the same origin.
    pub fn expand<T: ResolverTrace>(
        &self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        previous: &State,
        state: &State,
    ) -> ResolverReach {
        let db = cx.db();
        let compatible = state.node == self.origin
            && previous.node == self.origin
            && state.energy == previous.energy
            && state.maximum_energy == previous.maximum_energy
            && state.resources.is_superset_of(&previous.resources);
        if !compatible {
            return ResolverReach::calculate_reach(cx, logic, state);
        }
        let gained = state.resources.gained_since(&previous.resources);
        if gained
            .iter()
            .any(|&r| cx.graph.is_dangerous(r) || db.is_damage_reduction_item(r))
        {
            return ResolverReach::calculate_reach(cx, logic, state);
        }

        let frontier_resources: HashSet<ResourceId> = self
            .blocked
            .values()
            .flat_map(|req| req.all_individual())
            .chain(
                self.blocked_sources
                    .iter()
                    .flat_map(|&n| logic.get(n).all_individual()),
            )
            .map(|req| req.resource)
            .collect();
        let mut out = self.clone();
        if !gained.iter().any(|r| frontier_resources.contains(r)) {
            return out;
        }
        let sources = std::mem::take(&mut out.blocked_sources);
        out.blocked.clear();
        out.propagate(cx, logic, state, sources.into_iter().collect());
        out.finish(logic);
        out
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn energy_at(&self, node: NodeIndex) -> Option<Capacity> {
        self.energy_at_node[node]
    }

    pub fn is_reachable_node(&self, node: NodeIndex) -> bool {
        self.energy_at_node[node].is_some()
    }

    pub fn blocked_targets(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.blocked.keys().copied()
    }

    pub fn satisfiable_requirements(&self) -> &BTreeSet<RequirementList> {
        &self.satisfiable_requirements
    }

    pub fn satisfiable_as_requirement_set(&self) -> RequirementSet {
        RequirementSet::new(self.satisfiable_requirements.iter().cloned())
    }

    // Route from the origin to `node`, both ends included.
    pub fn path_to_node(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![node];
        let mut cur = node;
        while cur != self.origin && path.len() <= self.energy_at_node.len() {
            match self.predecessor[cur] {
                Some(prev) => {
                    path.push(prev);
                    cur = prev;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    // Uncollected resource nodes in reach whose memo entry holds, the origin first.
    pub fn possible_actions<T: ResolverTrace>(
        &self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
    ) -> Vec<(NodeIndex, Capacity)> {
        let db = cx.db();
        std::iter::once(self.origin)
            .chain(self.nodes.iter().copied())
            .filter_map(|node| {
                let energy = self.energy_at_node[node]?;
                if state.should_collect(cx, node)
                    && logic.get(node).satisfied(db, &state.resources, energy)
                {
                    Some((node, energy))
                } else {
                    None
                }
            })
            .collect()
    }

    // Possible actions that grant something the frontier or the victory condition asks for.
    pub fn satisfiable_actions<T: ResolverTrace>(
        &self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
    ) -> Vec<(NodeIndex, Capacity)> {
        let interesting = calculate_interesting_resources(
            self.satisfiable_requirements
                .iter()
                .chain(cx.graph.victory_condition.alternatives()),
            cx.db(),
            &state.resources,
            state.energy,
        );
        self.possible_actions(cx, logic, state)
            .into_iter()
            .filter(|&(node, _)| {
                cx.resource_gain_on_collect(node)
                    .iter()
                    .any(|(r, _)| interesting.contains(r))
            })
            .collect()
    }

    // Possible actions whose gains cannot close any path.
    pub fn safe_actions<T: ResolverTrace>(
        &self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
    ) -> Vec<(NodeIndex, Capacity)> {
        self.possible_actions(cx, logic, state)
            .into_iter()
            .filter(|&(node, _)| {
                let gains = cx.resource_gain_on_collect(node);
                !gains.is_empty() && gains.iter().all(|&(r, _)| !cx.graph.is_dangerous(r))
            })
            .collect()
    }

    // Memo individuals of every node that could still be collected from here.
    pub fn collectable_memo_requirements<T: ResolverTrace>(
        &self,
        cx: &TraversalContext,
        logic: &Logic<T>,
        state: &State,
    ) -> RequirementList {
        RequirementList::new(
            std::iter::once(self.origin)
                .chain(self.nodes.iter().copied())
                .filter(|&n| state.should_collect(cx, n))
                .flat_map(|n| logic.get(n).all_individual()),
        )
    }
}
