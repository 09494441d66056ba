use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::requirement::{Requirement, RequirementTemplates, ResourceRequirement};
use crate::resources::{ResourceDatabase, ResourceKind};
use crate::{Capacity, PickupIndex, ResourceGain};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIdentifier {
    pub region: String,
    pub area: String,
    pub node: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceAmountData {
    pub resource: String,
    #[serde(default = "default_amount")]
    pub amount: Capacity,
}

fn default_amount() -> Capacity {
    1
}

impl ResourceAmountData {
    pub fn resolve(&self, db: &ResourceDatabase) -> Result<ResourceGain> {
        ensure!(
            self.amount >= 0,
            "negative amount {} of '{}'",
            self.amount,
            self.resource
        );
        Ok((db.get_by_name(&self.resource)?, self.amount))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceNameData {
    Short(String),
    Full {
        short_name: String,
        long_name: String,
    },
}

impl ResourceNameData {
    fn names(&self) -> (&str, &str) {
        match self {
            ResourceNameData::Short(name) => (name, name),
            ResourceNameData::Full {
                short_name,
                long_name,
            } => (short_name, long_name),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DamageReductionData {
    pub damage: String,
    pub item: Option<String>,
    pub multiplier: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceDatabaseData {
    #[serde(default)]
    pub items: Vec<ResourceNameData>,
    #[serde(default)]
    pub events: Vec<ResourceNameData>,
    #[serde(default)]
    pub tricks: Vec<ResourceNameData>,
    #[serde(default)]
    pub damage: Vec<ResourceNameData>,
    #[serde(default = "default_energy_tank")]
    pub energy_tank: String,
    #[serde(default = "default_base_energy")]
    pub base_energy: Capacity,
    #[serde(default = "default_energy_per_tank")]
    pub energy_per_tank: Capacity,
    #[serde(default)]
    pub damage_reductions: Vec<DamageReductionData>,
}

fn default_energy_tank() -> String {
    "EnergyTank".to_string()
}

fn default_base_energy() -> Capacity {
    99
}

fn default_energy_per_tank() -> Capacity {
    100
}

impl ResourceDatabaseData {
    pub fn build(&self) -> Result<ResourceDatabase> {
        let mut db =
            ResourceDatabase::new(&self.energy_tank, self.base_energy, self.energy_per_tank);
        let tables = [
            (ResourceKind::Item, &self.items),
            (ResourceKind::Event, &self.events),
            (ResourceKind::Trick, &self.tricks),
            (ResourceKind::Damage, &self.damage),
        ];
        for (kind, entries) in tables {
            for entry in entries {
                let (short_name, long_name) = entry.names();
                db.add_resource(kind, short_name, long_name)?;
            }
        }
        for reduction in &self.damage_reductions {
            let damage = db.get_by_name(&reduction.damage)?;
            let item = match &reduction.item {
                Some(name) => Some(db.get_by_name(name)?),
                None => None,
            };
            db.add_damage_reduction(damage, item, reduction.multiplier)
                .with_context(|| format!("damage reduction for '{}'", reduction.damage))?;
        }
        Ok(db)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequirementData {
    #[default]
    Free,
    Never,
    Resource {
        resource: String,
        #[serde(default = "default_amount")]
        amount: Capacity,
        #[serde(default)]
        negate: bool,
    },
    And {
        items: Vec<RequirementData>,
    },
    Or {
        items: Vec<RequirementData>,
    },
    Template {
        name: String,
    },
}

impl RequirementData {
    pub fn resolve(&self, db: &ResourceDatabase) -> Result<Requirement> {
        Ok(match self {
            RequirementData::Free => Requirement::Free,
            RequirementData::Never => Requirement::Never,
            RequirementData::Resource {
                resource,
                amount,
                negate,
            } => {
                ensure!(*amount >= 0, "negative amount {amount} of '{resource}'");
                let id = db.get_by_name(resource)?;
                if id.is_damage() && *negate {
                    bail!("damage requirement on '{resource}' cannot be negated");
                }
                Requirement::Resource(ResourceRequirement::new(id, *amount, *negate))
            }
            RequirementData::And { items } => Requirement::make_and(
                items
                    .iter()
                    .map(|r| r.resolve(db))
                    .collect::<Result<Vec<_>>>()?,
            ),
            RequirementData::Or { items } => Requirement::make_or(
                items
                    .iter()
                    .map(|r| r.resolve(db))
                    .collect::<Result<Vec<_>>>()?,
            ),
            RequirementData::Template { name } => Requirement::Template(name.clone()),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub name: String,
    #[serde(default)]
    pub heal: bool,
    pub pickup_index: Option<PickupIndex>,
    pub hint: Option<String>,
    #[serde(default)]
    pub gain: Vec<ResourceAmountData>,
    #[serde(default = "default_layers")]
    pub layers: Vec<String>,
}

fn default_layers() -> Vec<String> {
    vec!["default".to_string()]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionData {
    pub from: String,
    pub to: String,
    // Target area and region default to the area holding the connection.
    pub to_area: Option<String>,
    pub to_region: Option<String>,
    #[serde(default)]
    pub requirement: RequirementData,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AreaData {
    pub name: String,
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub connections: Vec<ConnectionData>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionData {
    pub name: String,
    pub areas: Vec<AreaData>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameDescription {
    pub resource_database: ResourceDatabaseData,
    #[serde(default)]
    pub templates: BTreeMap<String, RequirementData>,
    pub regions: Vec<RegionData>,
    pub victory_condition: RequirementData,
    pub starting_location: NodeIdentifier,
    #[serde(default)]
    pub starting_resources: Vec<ResourceAmountData>,
}

impl FromStr for GameDescription {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parsing game description")
    }
}

impl GameDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read game description {}", path.display()))?;
        text.parse()
            .with_context(|| format!("in game description {}", path.display()))
    }

    pub fn build_templates(&self, db: &ResourceDatabase) -> Result<RequirementTemplates> {
        let mut templates = RequirementTemplates::default();
        for (name, data) in &self.templates {
            let req = data
                .resolve(db)
                .with_context(|| format!("in template '{name}'"))?;
            templates.insert(name, req);
        }
        templates.validate()?;
        Ok(templates)
    }
}
