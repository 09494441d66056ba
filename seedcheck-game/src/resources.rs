use anyhow::{bail, ensure, Context, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use strum::VariantNames as _;
use strum_macros::{EnumString, VariantNames};

use crate::{Capacity, ResourceGain};

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
pub enum ResourceKind {
    Item,
    Event,
    Trick,
    Damage,
    EnergyTank,
}

impl ResourceKind {
    pub fn parse(name: &str) -> Result<ResourceKind> {
        ResourceKind::from_str(name).with_context(|| {
            format!(
                "unknown resource kind '{name}', expected one of: {}",
                ResourceKind::VARIANTS.join(", ")
            )
        })
    }

    pub fn short_code(self) -> char {
        match self {
            ResourceKind::Item => 'I',
            ResourceKind::Event => 'E',
            ResourceKind::Trick => 'T',
            ResourceKind::Damage => 'D',
            ResourceKind::EnergyTank => 'H',
        }
    }
}

// Identity of a resource. Amounts live in a ResourceCollection, never here.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub index: usize,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, index: usize) -> Self {
        ResourceId { kind, index }
    }

    pub fn is_damage(&self) -> bool {
        self.kind == ResourceKind::Damage
    }
}

impl Debug for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.short_code(), self.index)
    }
}

#[derive(Clone, Debug)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DamageReduction {
    // `None` means the reduction applies unconditionally.
    pub item: Option<ResourceId>,
    pub multiplier: f32,
}

#[derive(Clone, Debug)]
pub struct ResourceDatabase {
    pub items: Vec<ResourceInfo>,
    pub events: Vec<ResourceInfo>,
    pub tricks: Vec<ResourceInfo>,
    pub damage: Vec<ResourceInfo>,
    pub energy_tanks: Vec<ResourceInfo>,
    pub energy_tank: ResourceId,
    pub base_energy: Capacity,
    pub energy_per_tank: Capacity,
    pub damage_reductions: HashMap<ResourceId, Vec<DamageReduction>>,
    id_by_name: HashMap<String, ResourceId>,
}

impl ResourceDatabase {
    pub fn new(energy_tank_name: &str, base_energy: Capacity, energy_per_tank: Capacity) -> Self {
        let energy_tank = ResourceId::new(ResourceKind::EnergyTank, 0);
        let mut id_by_name = HashMap::new();
        id_by_name.insert(energy_tank_name.to_string(), energy_tank);
        ResourceDatabase {
            items: vec![],
            events: vec![],
            tricks: vec![],
            damage: vec![],
            energy_tanks: vec![ResourceInfo {
                id: energy_tank,
                short_name: energy_tank_name.to_string(),
                long_name: energy_tank_name.to_string(),
            }],
            energy_tank,
            base_energy,
            energy_per_tank,
            damage_reductions: HashMap::new(),
            id_by_name,
        }
    }

    fn table_mut(&mut self, kind: ResourceKind) -> &mut Vec<ResourceInfo> {
        match kind {
            ResourceKind::Item => &mut self.items,
            ResourceKind::Event => &mut self.events,
            ResourceKind::Trick => &mut self.tricks,
            ResourceKind::Damage => &mut self.damage,
            ResourceKind::EnergyTank => &mut self.energy_tanks,
        }
    }

    pub fn table(&self, kind: ResourceKind) -> &[ResourceInfo] {
        match kind {
            ResourceKind::Item => &self.items,
            ResourceKind::Event => &self.events,
            ResourceKind::Trick => &self.tricks,
            ResourceKind::Damage => &self.damage,
            ResourceKind::EnergyTank => &self.energy_tanks,
        }
    }

    pub fn add_resource(
        &mut self,
        kind: ResourceKind,
        short_name: &str,
        long_name: &str,
    ) -> Result<ResourceId> {
        ensure!(
            !self.id_by_name.contains_key(short_name),
            "duplicate resource name '{short_name}'"
        );
        let table = self.table_mut(kind);
        let id = ResourceId::new(kind, table.len());
        table.push(ResourceInfo {
            id,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
        });
        self.id_by_name.insert(short_name.to_string(), id);
        Ok(id)
    }

    pub fn add_damage_reduction(
        &mut self,
        damage: ResourceId,
        item: Option<ResourceId>,
        multiplier: f32,
    ) -> Result<()> {
        if !damage.is_damage() {
            bail!(
                "damage reduction declared for non-damage resource '{}'",
                self.name(damage)
            );
        }
        ensure!(
            multiplier >= 0.0,
            "negative damage multiplier {multiplier} for '{}'",
            self.name(damage)
        );
        self.damage_reductions
            .entry(damage)
            .or_default()
            .push(DamageReduction { item, multiplier });
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Result<ResourceId> {
        self.id_by_name
            .get(name)
            .copied()
            .with_context(|| format!("unknown resource '{name}'"))
    }

    pub fn info(&self, id: ResourceId) -> &ResourceInfo {
        &self.table(id.kind)[id.index]
    }

    pub fn name(&self, id: ResourceId) -> &str {
        &self.info(id).short_name
    }

    pub fn all_resources(&self) -> impl Iterator<Item = &ResourceInfo> {
        self.items
            .iter()
            .chain(self.events.iter())
            .chain(self.tricks.iter())
            .chain(self.damage.iter())
            .chain(self.energy_tanks.iter())
    }

    pub fn maximum_energy(&self, resources: &ResourceCollection) -> Capacity {
        self.base_energy + self.energy_per_tank * resources.get(self.energy_tank)
    }

    // Smallest multiplier among the reductions currently in effect.
    pub fn damage_multiplier(&self, damage: ResourceId, resources: &ResourceCollection) -> f32 {
        let mut multiplier = 1.0;
        for reduction in self.damage_reductions.get(&damage).into_iter().flatten() {
            let active = match reduction.item {
                Some(item) => resources.has(item),
                None => true,
            };
            if active && reduction.multiplier < multiplier {
                multiplier = reduction.multiplier;
            }
        }
        multiplier
    }

    // Resources whose collection helps with the given damage: more energy, or reductions
    // that are not owned yet. Damage itself can never be "collected away".
    pub fn resources_for_damage(
        &self,
        damage: ResourceId,
        resources: &ResourceCollection,
    ) -> Vec<ResourceId> {
        let mut out = vec![self.energy_tank];
        for reduction in self.damage_reductions.get(&damage).into_iter().flatten() {
            if let Some(item) = reduction.item {
                if !resources.has(item) {
                    out.push(item);
                }
            }
        }
        out
    }

    pub fn is_damage_reduction_item(&self, id: ResourceId) -> bool {
        self.damage_reductions
            .values()
            .flatten()
            .any(|r| r.item == Some(id))
    }
}

// Unspecified resources read as zero; zero amounts are never stored, so equality is by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceCollection {
    amounts: HashMap<ResourceId, Capacity>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_gains(gains: &[ResourceGain]) -> Self {
        let mut collection = Self::new();
        collection.add_gain(gains.iter().copied());
        collection
    }

    pub fn get(&self, resource: ResourceId) -> Capacity {
        self.amounts.get(&resource).copied().unwrap_or(0)
    }

    pub fn has(&self, resource: ResourceId) -> bool {
        self.get(resource) > 0
    }

    pub fn set(&mut self, resource: ResourceId, amount: Capacity) {
        if amount > 0 {
            self.amounts.insert(resource, amount);
        } else {
            self.amounts.remove(&resource);
        }
    }

    pub fn add(&mut self, resource: ResourceId, amount: Capacity) {
        let new_amount = self.get(resource) + amount;
        self.set(resource, new_amount);
    }

    pub fn add_gain(&mut self, gains: impl IntoIterator<Item = ResourceGain>) {
        for (resource, amount) in gains {
            self.add(resource, amount);
        }
    }

    pub fn num_resources(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_superset_of(&self, other: &ResourceCollection) -> bool {
        other
            .amounts
            .iter()
            .all(|(&resource, &amount)| self.get(resource) >= amount)
    }

    // Resources whose amount increased relative to `older`, sorted by identity.
    pub fn gained_since(&self, older: &ResourceCollection) -> Vec<ResourceId> {
        let mut out: Vec<ResourceId> = self
            .amounts
            .iter()
            .filter(|(&resource, &amount)| amount > older.get(resource))
            .map(|(&resource, _)| resource)
            .collect();
        out.sort();
        out
    }

    pub fn iter_sorted(&self) -> Vec<ResourceGain> {
        let mut out: Vec<ResourceGain> = self.amounts.iter().map(|(&r, &a)| (r, a)).collect();
        out.sort();
        out
    }
}
