// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod description;
pub mod requirement;
pub mod resources;
pub mod world_graph;

use hashbrown::HashMap;
use std::borrow::ToOwned;
use std::hash::Hash;

pub use description::{GameDescription, NodeIdentifier, RequirementData, ResourceAmountData};
pub use requirement::{
    Requirement, RequirementList, RequirementSet, RequirementTemplates, ResourceRequirement,
};
pub use resources::{
    DamageReduction, ResourceCollection, ResourceDatabase, ResourceId, ResourceInfo, ResourceKind,
};
pub use world_graph::{WorldArea, WorldGraph, WorldGraphEdge, WorldGraphNode};

pub type NodeIndex = usize; // Index into WorldGraph.nodes: unique across all regions and areas of one graph
pub type RegionIdx = usize; // Index into WorldGraph.region_isv.keys
pub type AreaIdx = usize; // Index into WorldGraph.areas
pub type PickupIndex = usize; // Pickup slot number from the game description
pub type HintId = usize; // Index into WorldGraph.hint_isv.keys: distinct hint names
pub type Capacity = i32; // Data type used to represent quantities of resources and energy
pub type ResourceGain = (ResourceId, Capacity); // Resource granted together with its amount

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
