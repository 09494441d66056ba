use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use std::collections::BTreeSet;

use crate::resources::{ResourceCollection, ResourceDatabase, ResourceId};
use crate::Capacity;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRequirement {
    pub resource: ResourceId,
    pub amount: Capacity,
    pub negate: bool,
}

impl ResourceRequirement {
    pub fn new(resource: ResourceId, amount: Capacity, negate: bool) -> Self {
        ResourceRequirement {
            resource,
            amount,
            negate,
        }
    }

    pub fn is_damage(&self) -> bool {
        self.resource.is_damage()
    }

    fn key(&self) -> (ResourceId, bool) {
        (self.resource, self.negate)
    }

    // Energy lost when passing this requirement, after damage reductions.
    pub fn damage(&self, db: &ResourceDatabase, resources: &ResourceCollection) -> Capacity {
        if !self.is_damage() {
            return 0;
        }
        let multiplier = db.damage_multiplier(self.resource, resources);
        (self.amount as f32 * multiplier).ceil() as Capacity
    }

    pub fn satisfied(
        &self,
        db: &ResourceDatabase,
        resources: &ResourceCollection,
        energy: Capacity,
    ) -> bool {
        if self.is_damage() {
            energy > self.damage(db, resources)
        } else {
            (resources.get(self.resource) >= self.amount) != self.negate
        }
    }

    // Two distinct constraints on the same (resource, negate) collapse into one.
    fn merge(&self, other: &ResourceRequirement) -> ResourceRequirement {
        let amount = if self.is_damage() {
            self.amount + other.amount
        } else if self.negate {
            self.amount.min(other.amount)
        } else {
            self.amount.max(other.amount)
        };
        ResourceRequirement { amount, ..*self }
    }

    // True when satisfying `other` always satisfies `self` (same key assumed).
    fn implied_by(&self, other: &ResourceRequirement) -> bool {
        if self.negate {
            other.amount <= self.amount
        } else {
            other.amount >= self.amount
        }
    }

    pub fn pretty(&self, db: &ResourceDatabase) -> String {
        let name = db.name(self.resource);
        if self.is_damage() {
            format!("{} {}", self.amount, name)
        } else if self.amount == 1 {
            if self.negate {
                format!("No {name}")
            } else {
                name.to_string()
            }
        } else if self.negate {
            format!("{name} < {}", self.amount)
        } else {
            format!("{name} >= {}", self.amount)
        }
    }
}

// A conjunction of resource requirements. Kept sorted by (resource, negate) with one entry per key.
// Repeated identical requirements count once, so damage is only summed across distinct amounts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementList {
    items: Vec<ResourceRequirement>,
}

impl RequirementList {
    pub fn new(reqs: impl IntoIterator<Item = ResourceRequirement>) -> Self {
        let mut items: Vec<ResourceRequirement> = vec![];
        let mut sorted: Vec<ResourceRequirement> = reqs.into_iter().collect();
        sorted.sort_by_key(|r| (r.key(), r.amount));
        sorted.dedup();
        for req in sorted {
            match items.last_mut() {
                Some(last) if last.key() == req.key() => *last = last.merge(&req),
                _ => items.push(req),
            }
        }
        RequirementList { items }
    }

    pub fn values(&self) -> &[ResourceRequirement] {
        &self.items
    }

    pub fn is_trivial(&self) -> bool {
        self.items.is_empty()
    }

    fn find(&self, key: (ResourceId, bool)) -> Option<&ResourceRequirement> {
        self.items
            .binary_search_by_key(&key, |r| r.key())
            .ok()
            .map(|i| &self.items[i])
    }

    // Energy left after passing every requirement left-to-right, or None if some requirement fails.
    pub fn energy_after(
        &self,
        db: &ResourceDatabase,
        resources: &ResourceCollection,
        energy: Capacity,
    ) -> Option<Capacity> {
        let mut energy = energy;
        for req in &self.items {
            if !req.satisfied(db, resources, energy) {
                return None;
            }
            energy -= req.damage(db, resources);
        }
        Some(energy)
    }

    pub fn satisfied(
        &self,
        db: &ResourceDatabase,
        resources: &ResourceCollection,
        energy: Capacity,
    ) -> bool {
        self.energy_after(db, resources, energy).is_some()
    }

    pub fn union(&self, other: &RequirementList) -> RequirementList {
        RequirementList::new(self.items.iter().chain(other.items.iter()).copied())
    }

    // True when this list is never stricter than `other`, so `other` is redundant next to it.
    pub fn dominates(&self, other: &RequirementList) -> bool {
        self.items.iter().all(|req| {
            other
                .find(req.key())
                .is_some_and(|o| req.implied_by(o))
        })
    }

    pub fn damage_requirements(&self) -> impl Iterator<Item = &ResourceRequirement> {
        self.items.iter().filter(|r| r.is_damage())
    }

    pub fn pretty(&self, db: &ResourceDatabase) -> String {
        if self.items.is_empty() {
            return "Trivial".to_string();
        }
        self.items
            .iter()
            .map(|r| r.pretty(db))
            .collect::<Vec<String>>()
            .join(" and ")
    }
}

// Disjunctive normal form: satisfied iff any list is. No list is dominated by another.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequirementSet {
    alternatives: BTreeSet<RequirementList>,
}

impl RequirementSet {
    pub fn new(lists: impl IntoIterator<Item = RequirementList>) -> Self {
        let candidates: Vec<RequirementList> = lists
            .into_iter()
            .collect::<BTreeSet<RequirementList>>()
            .into_iter()
            .collect();
        let mut alternatives = BTreeSet::new();
        for i in 0..candidates.len() {
            let redundant = (0..candidates.len())
                .any(|j| j != i && candidates[j].dominates(&candidates[i]));
            if !redundant {
                alternatives.insert(candidates[i].clone());
            }
        }
        RequirementSet { alternatives }
    }

    pub fn trivial() -> Self {
        RequirementSet {
            alternatives: BTreeSet::from([RequirementList::default()]),
        }
    }

    pub fn impossible() -> Self {
        RequirementSet {
            alternatives: BTreeSet::new(),
        }
    }

    pub fn single(req: ResourceRequirement) -> Self {
        RequirementSet::new([RequirementList::new([req])])
    }

    pub fn alternatives(&self) -> impl Iterator<Item = &RequirementList> {
        self.alternatives.iter()
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_trivial(&self) -> bool {
        self.alternatives.iter().any(|l| l.is_trivial())
    }

    pub fn is_impossible(&self) -> bool {
        self.alternatives.is_empty()
    }

    pub fn satisfied(
        &self,
        db: &ResourceDatabase,
        resources: &ResourceCollection,
        energy: Capacity,
    ) -> bool {
        self.alternatives
            .iter()
            .any(|l| l.satisfied(db, resources, energy))
    }

    pub fn energy_after(
        &self,
        db: &ResourceDatabase,
        resources: &ResourceCollection,
        energy: Capacity,
    ) -> Option<Capacity> {
        self.alternatives
            .iter()
            .filter_map(|l| l.energy_after(db, resources, energy))
            .max()
    }

    // Disjunction.
    pub fn or_with(&self, other: &RequirementSet) -> RequirementSet {
        RequirementSet::new(
            self.alternatives
                .iter()
                .chain(other.alternatives.iter())
                .cloned(),
        )
    }

    // Conjunction: cross product of the alternatives.
    pub fn and_with(&self, other: &RequirementSet) -> RequirementSet {
        let mut lists = vec![];
        for a in &self.alternatives {
            for b in &other.alternatives {
                lists.push(a.union(b));
            }
        }
        RequirementSet::new(lists)
    }

    pub fn all_individual(&self) -> BTreeSet<ResourceRequirement> {
        self.alternatives
            .iter()
            .flat_map(|l| l.values().iter().copied())
            .collect()
    }

    pub fn pretty_lines(&self, db: &ResourceDatabase) -> Vec<String> {
        if self.alternatives.is_empty() {
            return vec!["Impossible".to_string()];
        }
        self.alternatives.iter().map(|l| l.pretty(db)).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Requirement {
    Free,
    Never,
    Resource(ResourceRequirement),
    Template(String),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
}

impl Requirement {
    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                return Requirement::Never;
            } else if let Requirement::Free = req {
                continue;
            } else if let Requirement::And(and_reqs) = req {
                out_reqs.extend(and_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.len() <= 1 {
            out_reqs.pop().unwrap_or(Requirement::Free)
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                continue;
            } else if let Requirement::Free = req {
                return Requirement::Free;
            } else if let Requirement::Or(or_reqs) = req {
                out_reqs.extend(or_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.len() <= 1 {
            out_reqs.pop().unwrap_or(Requirement::Never)
        } else {
            Requirement::Or(out_reqs)
        }
    }

    pub fn as_set(&self, templates: &RequirementTemplates) -> Result<RequirementSet> {
        let mut stack: Vec<String> = vec![];
        self.as_set_inner(templates, &mut stack)
    }

    fn as_set_inner(
        &self,
        templates: &RequirementTemplates,
        stack: &mut Vec<String>,
    ) -> Result<RequirementSet> {
        Ok(match self {
            Requirement::Free => RequirementSet::trivial(),
            Requirement::Never => RequirementSet::impossible(),
            Requirement::Resource(req) => RequirementSet::single(*req),
            Requirement::And(reqs) => {
                let mut out = RequirementSet::trivial();
                for req in reqs {
                    out = out.and_with(&req.as_set_inner(templates, stack)?);
                }
                out
            }
            Requirement::Or(reqs) => {
                let mut out = RequirementSet::impossible();
                for req in reqs {
                    out = out.or_with(&req.as_set_inner(templates, stack)?);
                }
                out
            }
            Requirement::Template(name) => {
                if stack.contains(name) {
                    bail!(
                        "template cycle: {} -> {}",
                        stack.join(" -> "),
                        name
                    );
                }
                stack.push(name.clone());
                let set = templates
                    .get(name)?
                    .as_set_inner(templates, stack)
                    .with_context(|| format!("expanding template '{name}'"))?;
                stack.pop();
                set
            }
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequirementTemplates {
    templates: HashMap<String, Requirement>,
}

impl RequirementTemplates {
    pub fn insert(&mut self, name: &str, req: Requirement) {
        self.templates.insert(name.to_string(), req);
    }

    pub fn get(&self, name: &str) -> Result<&Requirement> {
        self.templates
            .get(name)
            .with_context(|| format!("unknown template '{name}'"))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    // Expands every template once, surfacing missing references and cycles.
    pub fn validate(&self) -> Result<()> {
        let mut names: Vec<&String> = self.templates.keys().collect();
        names.sort();
        for name in names {
            Requirement::Template(name.clone()).as_set(self)?;
        }
        Ok(())
    }
}
