use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use seedcheck_game::{
    NodeIdentifier, NodeIndex, PickupIndex, ResourceAmountData, ResourceGain, WorldGraph,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PickupData {
    pub pickup_index: PickupIndex,
    pub name: String,
    // When empty, the pickup grants one unit of the resource named like the pickup.
    #[serde(default)]
    pub resources: Vec<ResourceAmountData>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatchesData {
    #[serde(default)]
    pub pickups: Vec<PickupData>,
    pub starting_location: Option<NodeIdentifier>,
    #[serde(default)]
    pub starting_resources: Vec<ResourceAmountData>,
}

impl PatchesData {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read patches {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing patches {}", path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct PickupEntry {
    pub name: String,
    pub resources: Vec<ResourceGain>,
}

// The layout under test: which pickup sits in which slot, plus start overrides.
#[derive(Clone, Debug, Default)]
pub struct GamePatches {
    pub pickup_assignment: HashMap<PickupIndex, PickupEntry>,
    pub starting_node: Option<NodeIndex>,
    pub starting_resources: Vec<ResourceGain>,
}

impl GamePatches {
    pub fn build(data: &PatchesData, graph: &WorldGraph) -> Result<GamePatches> {
        let db = &graph.resource_database;
        let mut pickup_assignment = HashMap::new();
        for pickup in &data.pickups {
            if !graph.node_by_pickup.contains_key(&pickup.pickup_index) {
                bail!(
                    "pickup '{}' assigned to unknown pickup index {}",
                    pickup.name,
                    pickup.pickup_index
                );
            }
            let resources = if pickup.resources.is_empty() {
                vec![(db.get_by_name(&pickup.name)?, 1)]
            } else {
                pickup
                    .resources
                    .iter()
                    .map(|r| r.resolve(db))
                    .collect::<Result<Vec<ResourceGain>>>()
                    .with_context(|| format!("resources of pickup '{}'", pickup.name))?
            };
            let entry = PickupEntry {
                name: pickup.name.clone(),
                resources,
            };
            if pickup_assignment.insert(pickup.pickup_index, entry).is_some() {
                bail!("pickup index {} assigned twice", pickup.pickup_index);
            }
        }
        let starting_node = match &data.starting_location {
            Some(key) => Some(graph.node_by_identifier(key).context("starting location")?),
            None => None,
        };
        let starting_resources = data
            .starting_resources
            .iter()
            .map(|r| r.resolve(db))
            .collect::<Result<Vec<ResourceGain>>>()
            .context("starting resources")?;
        Ok(GamePatches {
            pickup_assignment,
            starting_node,
            starting_resources,
        })
    }

    pub fn assign(&mut self, pickup_index: PickupIndex, entry: PickupEntry) {
        self.pickup_assignment.insert(pickup_index, entry);
    }

    pub fn pickup_at(&self, pickup_index: PickupIndex) -> Option<&PickupEntry> {
        self.pickup_assignment.get(&pickup_index)
    }
}
