use anyhow::{bail, ensure, Context, Result};
use hashbrown::{HashMap, HashSet};
use log::info;
use std::collections::{BTreeMap, BTreeSet};

use crate::description::{GameDescription, NodeIdentifier, ResourceAmountData};
use crate::requirement::{RequirementSet, RequirementTemplates};
use crate::resources::{ResourceDatabase, ResourceId, ResourceKind};
use crate::{AreaIdx, Capacity, HintId, IndexedVec, NodeIndex, PickupIndex, RegionIdx, ResourceGain};

#[derive(Clone, Debug)]
pub struct WorldGraphEdge {
    pub target: NodeIndex,
    pub requirement: RequirementSet,
}

#[derive(Clone, Debug)]
pub struct WorldGraphNode {
    pub node_index: NodeIndex,
    pub name: String,
    pub area_idx: AreaIdx,
    pub region_idx: RegionIdx,
    pub pickup_index: Option<PickupIndex>,
    pub hint: Option<HintId>,
    pub resource_gain: Vec<ResourceGain>,
    pub heal: bool,
    pub edges: Vec<WorldGraphEdge>,
}

impl WorldGraphNode {
    pub fn is_resource_node(&self) -> bool {
        self.pickup_index.is_some() || self.hint.is_some() || !self.resource_gain.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct WorldArea {
    pub name: String,
    pub region_idx: RegionIdx,
    pub nodes: Vec<NodeIndex>,
}

// Read-only once built. Nodes are addressed by index; names are only kept for display.
#[derive(Clone, Debug)]
pub struct WorldGraph {
    pub resource_database: ResourceDatabase,
    pub templates: RequirementTemplates,
    pub region_isv: IndexedVec<String>,
    pub areas: Vec<WorldArea>,
    pub hint_isv: IndexedVec<String>,
    pub nodes: Vec<WorldGraphNode>,
    pub node_index_by_key: HashMap<NodeIdentifier, NodeIndex>,
    pub node_by_pickup: HashMap<PickupIndex, NodeIndex>,
    pub victory_condition: RequirementSet,
    pub starting_node: NodeIndex,
    pub starting_resources: Vec<ResourceGain>,
    pub dangerous_resources: HashSet<ResourceId>,
}

fn resolve_gains(db: &ResourceDatabase, gains: &[ResourceAmountData]) -> Result<Vec<ResourceGain>> {
    gains
        .iter()
        .map(|g| g.resolve(db))
        .collect()
}

// Resources that appear negated in some edge guard. Collecting one of them can close paths.
pub fn calculate_dangerous_resources(nodes: &[WorldGraphNode]) -> HashSet<ResourceId> {
    let mut out = HashSet::new();
    for node in nodes {
        for edge in &node.edges {
            for req in edge.requirement.all_individual() {
                if req.negate {
                    out.insert(req.resource);
                }
            }
        }
    }
    out
}

impl WorldGraph {
    pub fn build(
        description: &GameDescription,
        enabled_layers: Option<&HashSet<String>>,
    ) -> Result<WorldGraph> {
        let resource_database = description
            .resource_database
            .build()
            .context("building resource database")?;
        let templates = description.build_templates(&resource_database)?;

        let mut region_isv: IndexedVec<String> = IndexedVec::default();
        let mut hint_isv: IndexedVec<String> = IndexedVec::default();
        let mut areas: Vec<WorldArea> = vec![];
        let mut nodes: Vec<WorldGraphNode> = vec![];
        let mut node_index_by_key: HashMap<NodeIdentifier, NodeIndex> = HashMap::new();
        let mut node_by_pickup: HashMap<PickupIndex, NodeIndex> = HashMap::new();
        let mut disabled: HashSet<NodeIdentifier> = HashSet::new();

        let layer_enabled = |layers: &[String]| match enabled_layers {
            Some(enabled) => layers.iter().any(|l| enabled.contains(l)),
            None => true,
        };

        for region in &description.regions {
            let region_idx = region_isv.add(&region.name);
            for area in &region.areas {
                let area_idx = areas.len();
                let mut area_nodes = vec![];
                for node_data in &area.nodes {
                    let key = NodeIdentifier {
                        region: region.name.clone(),
                        area: area.name.clone(),
                        node: node_data.name.clone(),
                    };
                    ensure!(
                        !node_index_by_key.contains_key(&key) && !disabled.contains(&key),
                        "duplicate node {}/{}/{}",
                        key.region,
                        key.area,
                        key.node
                    );
                    if !layer_enabled(&node_data.layers) {
                        disabled.insert(key);
                        continue;
                    }
                    let node_index = nodes.len();
                    if let Some(pickup_index) = node_data.pickup_index {
                        if let Some(other) = node_by_pickup.insert(pickup_index, node_index) {
                            bail!(
                                "pickup index {pickup_index} used by both '{}' and '{}'",
                                nodes[other].name,
                                node_data.name
                            );
                        }
                    }
                    let resource_gain = resolve_gains(&resource_database, &node_data.gain)
                        .with_context(|| format!("gains of node '{}'", node_data.name))?;
                    nodes.push(WorldGraphNode {
                        node_index,
                        name: node_data.name.clone(),
                        area_idx,
                        region_idx,
                        pickup_index: node_data.pickup_index,
                        hint: node_data.hint.as_ref().map(|h| hint_isv.add(h)),
                        resource_gain,
                        heal: node_data.heal,
                        edges: vec![],
                    });
                    node_index_by_key.insert(key, node_index);
                    area_nodes.push(node_index);
                }
                areas.push(WorldArea {
                    name: area.name.clone(),
                    region_idx,
                    nodes: area_nodes,
                });
            }
        }

        let lookup = |key: &NodeIdentifier| -> Result<Option<NodeIndex>> {
            if let Some(&idx) = node_index_by_key.get(key) {
                Ok(Some(idx))
            } else if disabled.contains(key) {
                Ok(None)
            } else {
                bail!("unknown node {}/{}/{}", key.region, key.area, key.node)
            }
        };

        let mut edges: BTreeMap<(NodeIndex, NodeIndex), RequirementSet> = BTreeMap::new();
        for region in &description.regions {
            for area in &region.areas {
                for conn in &area.connections {
                    let from_key = NodeIdentifier {
                        region: region.name.clone(),
                        area: area.name.clone(),
                        node: conn.from.clone(),
                    };
                    let to_key = NodeIdentifier {
                        region: conn.to_region.clone().unwrap_or_else(|| region.name.clone()),
                        area: conn.to_area.clone().unwrap_or_else(|| area.name.clone()),
                        node: conn.to.clone(),
                    };
                    let context = || {
                        format!(
                            "connection {}/{}/{} -> {}/{}/{}",
                            from_key.region,
                            from_key.area,
                            from_key.node,
                            to_key.region,
                            to_key.area,
                            to_key.node
                        )
                    };
                    let from = lookup(&from_key).with_context(context)?;
                    let to = lookup(&to_key).with_context(context)?;
                    let requirement = conn
                        .requirement
                        .resolve(&resource_database)
                        .and_then(|r| r.as_set(&templates))
                        .with_context(context)?;
                    let (Some(from), Some(to)) = (from, to) else {
                        continue;
                    };
                    let mut pairs = vec![(from, to)];
                    if conn.bidirectional {
                        pairs.push((to, from));
                    }
                    for pair in pairs {
                        let merged = match edges.get(&pair) {
                            Some(existing) => existing.or_with(&requirement),
                            None => requirement.clone(),
                        };
                        edges.insert(pair, merged);
                    }
                }
            }
        }
        for ((from, target), requirement) in edges {
            if requirement.is_impossible() {
                continue;
            }
            nodes[from].edges.push(WorldGraphEdge {
                target,
                requirement,
            });
        }

        let victory_condition = description
            .victory_condition
            .resolve(&resource_database)
            .and_then(|r| r.as_set(&templates))
            .context("victory condition")?;
        let starting_node = lookup(&description.starting_location)
            .context("starting location")?
            .context("starting location is not in an enabled layer")?;
        let starting_resources = resolve_gains(&resource_database, &description.starting_resources)
            .context("starting resources")?;
        let dangerous_resources = calculate_dangerous_resources(&nodes);

        info!(
            "Built world graph: {} regions, {} areas, {} nodes, {} dangerous resources",
            region_isv.len(),
            areas.len(),
            nodes.len(),
            dangerous_resources.len()
        );

        Ok(WorldGraph {
            resource_database,
            templates,
            region_isv,
            areas,
            hint_isv,
            nodes,
            node_index_by_key,
            node_by_pickup,
            victory_condition,
            starting_node,
            starting_resources,
            dangerous_resources,
        })
    }

    pub fn node_by_identifier(&self, key: &NodeIdentifier) -> Result<NodeIndex> {
        self.node_index_by_key
            .get(key)
            .copied()
            .with_context(|| format!("unknown node {}/{}/{}", key.region, key.area, key.node))
    }

    pub fn node_name(&self, node: NodeIndex) -> String {
        let n = &self.nodes[node];
        format!("{}/{}", self.areas[n.area_idx].name, n.name)
    }

    pub fn is_dangerous(&self, resource: ResourceId) -> bool {
        self.dangerous_resources.contains(&resource)
    }

    // For each trick, the levels any edge guard asks for.
    pub fn used_trick_levels(&self) -> BTreeMap<ResourceId, BTreeSet<Capacity>> {
        let mut out: BTreeMap<ResourceId, BTreeSet<Capacity>> = BTreeMap::new();
        for node in &self.nodes {
            for edge in &node.edges {
                for req in edge.requirement.all_individual() {
                    if req.resource.kind == ResourceKind::Trick {
                        out.entry(req.resource).or_default().insert(req.amount);
                    }
                }
            }
        }
        out
    }
}
