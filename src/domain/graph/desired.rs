use bimap::BiMap;
use slotmap::{SlotMap, new_key_type};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use union_find::{QuickUnionUf, UnionBySize, UnionFind};

use crate::api::desired_dto::DesiredConfigDto;
use crate::api::status_dto::ConstraintDto;
use crate::domain::agent::catalog::AgentCatalog;
use crate::domain::graph::constraint::{ConstraintEdge, ConstraintKind, score_then_creation};
use crate::domain::graph::resource::ResourceInstance;
use crate::domain::ids::{ConstraintId, ResourceName};
use crate::domain::score::Score;
use crate::error::{Error, Result};

new_key_type! {
    pub struct ResourceKey;
}

/// The target graph of resources and constraints as edited by an operator.
///
/// Graph invariants are enforced on every mutation, never repaired after
/// the fact: order constraints stay acyclic, no ordered resource pair
/// carries two edges of the same kind, and infinity colocations never
/// contradict each other. The revision counter is bumped on each
/// successful mutation so callers can detect concurrent edits cheaply.
#[derive(Debug)]
pub struct DesiredConfig {
    catalog: Arc<AgentCatalog>,

    /// Resource storage.
    slots: SlotMap<ResourceKey, ResourceInstance>,

    /// Index lookup between resource name and internal key.
    name_index: BiMap<ResourceName, ResourceKey>,

    constraints: HashMap<ConstraintId, ConstraintEdge>,

    /// Monotonic edit counter.
    revision: u64,

    /// Creation stamp handed to the next constraint edge.
    next_edge_index: u64,
}

impl DesiredConfig {
    pub fn new(catalog: Arc<AgentCatalog>) -> Self {
        Self {
            catalog,
            slots: SlotMap::with_key(),
            name_index: BiMap::new(),
            constraints: HashMap::new(),
            revision: 0,
            next_edge_index: 0,
        }
    }

    /// Builds a full configuration from an operator document.
    ///
    /// Entries go through the same mutation paths as interactive edits, so
    /// a document that violates any graph invariant is rejected as a whole.
    pub fn from_dto(dto: DesiredConfigDto, catalog: Arc<AgentCatalog>) -> Result<DesiredConfig> {
        let mut config = DesiredConfig::new(catalog);

        // Phase 1: Instantiate all resources against the catalog
        for resource_dto in dto.resources {
            let params: BTreeMap<String, String> = resource_dto.params.into_iter().collect();
            config.add_resource(ResourceName::new(resource_dto.name), &resource_dto.agent, params)?;
        }

        // Phase 2: Apply constraints, which can now resolve their endpoints
        for constraint_dto in dto.constraints {
            config.add_constraint_dto(constraint_dto)?;
        }

        log::info!(
            "Desired configuration loaded: {} resource(s), {} constraint(s).",
            config.slots.len(),
            config.constraints.len()
        );

        Ok(config)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn catalog(&self) -> &Arc<AgentCatalog> {
        &self.catalog
    }

    // ---- resources ----

    pub fn add_resource(&mut self, name: ResourceName, agent_key: &str, params: BTreeMap<String, String>) -> Result<ResourceKey> {
        if self.name_index.contains_left(&name) {
            return Err(Error::ValidationError(format!("Resource '{}' already exists", name)));
        }

        let Some(agent) = self.catalog.lookup(agent_key) else {
            return Err(Error::ValidationError(format!(
                "Resource '{}' references unknown agent '{}'",
                name, agent_key
            )));
        };

        let instance = ResourceInstance::new(name.clone(), agent, params)?;

        let key = self.slots.insert(instance);
        self.name_index.insert(name, key);
        self.revision += 1;

        Ok(key)
    }

    /// Removes a resource together with every constraint touching it, so
    /// the graph never holds an edge with a dangling endpoint.
    ///
    /// # Returns
    /// The removed instance and the ids of the constraints dropped with it.
    pub fn remove_resource(&mut self, name: &ResourceName) -> Result<(ResourceInstance, Vec<ConstraintId>)> {
        let Some((_, key)) = self.name_index.remove_by_left(name) else {
            return Err(Error::NotFoundError(format!("Resource '{}' does not exist", name)));
        };

        let mut dropped: Vec<ConstraintId> = self
            .constraints
            .values()
            .filter(|edge| edge.touches(name))
            .map(|edge| edge.id.clone())
            .collect();
        dropped.sort();

        for id in &dropped {
            self.constraints.remove(id);
        }

        let instance = self.slots.remove(key).expect("Indexed resource key must be in the slot map");

        if !dropped.is_empty() {
            log::info!("Removed resource '{}' and {} dependent constraint(s).", name, dropped.len());
        }

        self.revision += 1;
        Ok((instance, dropped))
    }

    /// Sets one parameter on an existing resource after validating the
    /// value against the agent definition.
    pub fn set_parameter(&mut self, name: &ResourceName, param: &str, value: &str) -> Result<()> {
        let Some(&key) = self.name_index.get_by_left(name) else {
            return Err(Error::NotFoundError(format!("Resource '{}' does not exist", name)));
        };

        let instance = self.slots.get_mut(key).expect("Indexed resource key must be in the slot map");
        instance.set_param(param, value)?;

        self.revision += 1;
        Ok(())
    }

    pub fn resource(&self, name: &ResourceName) -> Option<&ResourceInstance> {
        let key = self.name_index.get_by_left(name)?;
        self.slots.get(*key)
    }

    pub fn contains_resource(&self, name: &ResourceName) -> bool {
        self.name_index.contains_left(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceInstance> {
        self.slots.values()
    }

    /// Resource names in lexical order, for reproducible output.
    pub fn resource_names(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self.name_index.left_values().cloned().collect();
        names.sort();
        names
    }

    pub fn resource_count(&self) -> usize {
        self.slots.len()
    }

    // ---- constraints ----

    pub fn add_constraint(&mut self, id: Option<ConstraintId>, kind: ConstraintKind, score: Score) -> Result<ConstraintId> {
        let edge = ConstraintEdge::new(id, kind, score, self.next_edge_index);
        self.insert_edge(edge)
    }

    pub fn add_constraint_dto(&mut self, dto: ConstraintDto) -> Result<ConstraintId> {
        let edge = ConstraintEdge::from_dto(dto, self.next_edge_index)?;
        self.insert_edge(edge)
    }

    pub fn remove_constraint(&mut self, id: &ConstraintId) -> Result<ConstraintEdge> {
        let Some(edge) = self.constraints.remove(id) else {
            return Err(Error::NotFoundError(format!("Constraint '{}' does not exist", id)));
        };

        self.revision += 1;
        Ok(edge)
    }

    pub fn constraint(&self, id: &ConstraintId) -> Option<&ConstraintEdge> {
        self.constraints.get(id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &ConstraintEdge> {
        self.constraints.values()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// All constraints in dump order: score descending, then edge creation
    /// order.
    pub fn constraints_ordered(&self) -> Vec<&ConstraintEdge> {
        let mut edges: Vec<&ConstraintEdge> = self.constraints.values().collect();
        edges.sort_by(|a, b| score_then_creation(a, b));
        edges
    }

    /// Constraints touching one resource, in dump order.
    pub fn constraints_for(&self, name: &ResourceName) -> Vec<&ConstraintEdge> {
        let mut edges: Vec<&ConstraintEdge> = self.constraints.values().filter(|edge| edge.touches(name)).collect();
        edges.sort_by(|a, b| score_then_creation(a, b));
        edges
    }

    fn insert_edge(&mut self, edge: ConstraintEdge) -> Result<ConstraintId> {
        self.validate_edge(&edge)?;

        self.next_edge_index += 1;
        self.revision += 1;

        let id = edge.id.clone();
        self.constraints.insert(id.clone(), edge);

        Ok(id)
    }

    fn validate_edge(&self, edge: &ConstraintEdge) -> Result<()> {
        if self.constraints.contains_key(&edge.id) {
            return Err(Error::ValidationError(format!("Constraint id '{}' is already in use", edge.id)));
        }

        let (left, right) = edge.endpoints();

        for endpoint in [left, right] {
            if !self.name_index.contains_left(endpoint) {
                return Err(Error::ValidationError(format!(
                    "Constraint '{}' references unknown resource '{}'",
                    edge.id, endpoint
                )));
            }
        }

        if left == right {
            return Err(Error::ValidationError(format!(
                "Constraint '{}' must reference two distinct resources",
                edge.id
            )));
        }

        let duplicate = self
            .constraints
            .values()
            .any(|existing| existing.kind_word() == edge.kind_word() && existing.endpoints() == (left, right));
        if duplicate {
            return Err(Error::ValidationError(format!(
                "A {} constraint from '{}' to '{}' already exists",
                edge.kind_word(),
                left,
                right
            )));
        }

        match &edge.kind {
            ConstraintKind::Order { first, then, .. } => {
                if self.order_cycle_with(first, then) {
                    return Err(Error::ValidationError(format!(
                        "Constraint '{}': ordering '{}' before '{}' would close a cycle",
                        edge.id, first, then
                    )));
                }
            }
            ConstraintKind::Colocation { .. } => {
                if let Some(reason) = self.colocation_contradiction(edge) {
                    return Err(Error::ValidationError(reason));
                }
            }
        }

        Ok(())
    }

    /// True when a candidate order edge `first -> then` would close a cycle,
    /// i.e. `first` is already reachable from `then` over existing order
    /// edges.
    fn order_cycle_with(&self, first: &ResourceName, then: &ResourceName) -> bool {
        if first == then {
            return true;
        }

        let mut successors: HashMap<&ResourceName, Vec<&ResourceName>> = HashMap::new();
        for edge in self.constraints.values() {
            if let ConstraintKind::Order { first, then, .. } = &edge.kind {
                successors.entry(first).or_default().push(then);
            }
        }

        let mut stack = vec![then];
        let mut visited: HashSet<&ResourceName> = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == first {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = successors.get(node) {
                stack.extend(next.iter().copied());
            }
        }

        false
    }

    /// Checks a candidate colocation against the pinning structure.
    ///
    /// Plus-infinity colocations weld resources into one placement group.
    /// A minus-infinity colocation between two resources of the same group
    /// (or a plus-infinity edge that would merge two groups separated by a
    /// minus-infinity edge) can never be satisfied by any node assignment.
    fn colocation_contradiction(&self, candidate: &ConstraintEdge) -> Option<String> {
        let mut edges: Vec<&ConstraintEdge> = self.constraints.values().filter(|edge| edge.is_colocation()).collect();
        edges.push(candidate);

        // 1. Map resource names onto dense indices for the DSU structure
        let names = self.resource_names();
        let mut name_to_index: HashMap<&ResourceName, usize> = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            name_to_index.insert(name, index);
        }

        // 2. Union the endpoints of every plus-infinity colocation
        let mut dsu = QuickUnionUf::<UnionBySize>::new(names.len());
        for edge in &edges {
            if edge.score == Score::PlusInfinity {
                let (left, right) = edge.endpoints();
                if let (Some(&left_index), Some(&right_index)) = (name_to_index.get(left), name_to_index.get(right)) {
                    dsu.union(left_index, right_index);
                }
            }
        }

        // 3. A minus-infinity colocation inside one group is unsatisfiable
        for edge in &edges {
            if edge.score == Score::MinusInfinity {
                let (left, right) = edge.endpoints();
                if let (Some(&left_index), Some(&right_index)) = (name_to_index.get(left), name_to_index.get(right)) {
                    if dsu.find(left_index) == dsu.find(right_index) {
                        return Some(format!(
                            "Constraint '{}': resources '{}' and '{}' are pinned to one node but also forbidden from sharing it",
                            candidate.id, left, right
                        ));
                    }
                }
            }
        }

        None
    }

    /// Groups of resources welded together by plus-infinity colocations.
    /// Resources without such a colocation form singleton groups. Members
    /// and groups come out sorted for reproducible output.
    pub fn placement_groups(&self) -> Vec<Vec<ResourceName>> {
        let names = self.resource_names();

        let mut name_to_index: HashMap<&ResourceName, usize> = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            name_to_index.insert(name, index);
        }

        let mut dsu = QuickUnionUf::<UnionBySize>::new(names.len());
        for edge in self.constraints.values() {
            if edge.is_colocation() && edge.score == Score::PlusInfinity {
                let (left, right) = edge.endpoints();
                if let (Some(&left_index), Some(&right_index)) = (name_to_index.get(left), name_to_index.get(right)) {
                    dsu.union(left_index, right_index);
                }
            }
        }

        let mut groups: HashMap<usize, Vec<ResourceName>> = HashMap::new();
        for (index, name) in names.iter().enumerate() {
            groups.entry(dsu.find(index)).or_default().push(name.clone());
        }

        let mut result: Vec<Vec<ResourceName>> = groups.into_values().collect();
        for group in &mut result {
            group.sort();
        }
        result.sort_by(|a, b| a[0].cmp(&b[0]));

        result
    }
}
