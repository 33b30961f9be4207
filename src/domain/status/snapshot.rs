use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::api::status_dto::{NodeStateDto, RunRoleDto, StatusDto};
use crate::domain::graph::constraint::{ConstraintEdge, score_then_creation};
use crate::domain::ids::{ConstraintId, HostName, ResourceName};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Online,
    Offline,
    Standby,
    Maintenance,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeState::Online => "online",
            NodeState::Offline => "offline",
            NodeState::Standby => "standby",
            NodeState::Maintenance => "maintenance",
        };
        write!(f, "{}", label)
    }
}

fn map_node_state(dto: NodeStateDto) -> NodeState {
    match dto {
        NodeStateDto::Online => NodeState::Online,
        NodeStateDto::Offline => NodeState::Offline,
        NodeStateDto::Standby => NodeState::Standby,
        NodeStateDto::Maintenance => NodeState::Maintenance,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunRole {
    Stopped,
    Started,
    Promoted,
    Unpromoted,
}

impl fmt::Display for RunRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunRole::Stopped => "stopped",
            RunRole::Started => "started",
            RunRole::Promoted => "promoted",
            RunRole::Unpromoted => "unpromoted",
        };
        write!(f, "{}", label)
    }
}

fn map_run_role(dto: RunRoleDto) -> RunRole {
    match dto {
        RunRoleDto::Stopped => RunRole::Stopped,
        RunRoleDto::Started => RunRole::Started,
        RunRoleDto::Promoted => RunRole::Promoted,
        RunRoleDto::Unpromoted => RunRole::Unpromoted,
    }
}

/// Live state of one resource as the engine reports it.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    /// Full agent key, e.g. "ocf:heartbeat:IPaddr2".
    pub agent: String,

    /// Node the resource runs on, `None` when stopped.
    pub running_on: Option<HostName>,
    pub role: RunRole,
    pub fail_count: u32,

    /// Parameter values as last applied on the cluster.
    pub params: HashMap<String, String>,
}

/// Immutable, timestamped view of the live cluster.
///
/// A snapshot is replaced wholesale on each poll and shared behind an
/// `Arc`, never mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub cluster_name: Option<String>,
    pub dc_host: Option<HostName>,
    pub taken_at: DateTime<Utc>,

    pub nodes: HashMap<HostName, NodeState>,
    pub resources: HashMap<ResourceName, ResourceStatus>,

    /// Live edges with their document position as creation index.
    pub constraints: Vec<ConstraintEdge>,
}

impl ClusterSnapshot {
    pub fn from_dto(dto: StatusDto) -> Result<ClusterSnapshot> {
        // Phase 1: Map node states
        let mut nodes: HashMap<HostName, NodeState> = HashMap::with_capacity(dto.nodes.len());
        for node_dto in dto.nodes {
            let host = HostName::new(node_dto.name);
            if nodes.insert(host.clone(), map_node_state(node_dto.state)).is_some() {
                return Err(Error::ParseError(format!("Status document lists node '{}' more than once", host)));
            }
        }

        // Phase 2: Map resource status
        let mut resources: HashMap<ResourceName, ResourceStatus> = HashMap::with_capacity(dto.resources.len());
        for resource_dto in dto.resources {
            let name = ResourceName::new(resource_dto.id);
            let running_on = resource_dto.node.map(HostName::new);

            if let Some(host) = &running_on {
                if !nodes.contains_key(host) {
                    log::warn!("Resource '{}' reports running on unknown node '{}'.", name, host);
                }
            }

            let status = ResourceStatus {
                agent: resource_dto.agent,
                running_on,
                role: map_run_role(resource_dto.role),
                fail_count: resource_dto.fail_count,
                params: resource_dto.params,
            };

            if resources.insert(name.clone(), status).is_some() {
                return Err(Error::ParseError(format!("Status document lists resource '{}' more than once", name)));
            }
        }

        // Phase 3: Parse constraints, stamping document position
        let mut constraints = Vec::with_capacity(dto.constraints.len());
        for (position, constraint_dto) in dto.constraints.into_iter().enumerate() {
            let edge = ConstraintEdge::from_dto(constraint_dto, position as u64)?;

            let (left, right) = edge.endpoints();
            for endpoint in [left, right] {
                if !resources.contains_key(endpoint) {
                    log::warn!("Live constraint '{}' references resource '{}' absent from the status document.", edge.id, endpoint);
                }
            }

            constraints.push(edge);
        }

        Ok(ClusterSnapshot {
            cluster_name: dto.cluster_name,
            dc_host: dto.dc_host.map(HostName::new),
            taken_at: Utc::now(),
            nodes,
            resources,
            constraints,
        })
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.taken_at)
    }

    pub fn resource(&self, name: &ResourceName) -> Option<&ResourceStatus> {
        self.resources.get(name)
    }

    pub fn has_resource(&self, name: &ResourceName) -> bool {
        self.resources.contains_key(name)
    }

    /// Resource names in lexical order, for reproducible output.
    pub fn resource_names(&self) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = self.resources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn constraint_by_id(&self, id: &ConstraintId) -> Option<&ConstraintEdge> {
        self.constraints.iter().find(|edge| &edge.id == id)
    }

    /// Live edges in dump order: score descending, document position as the
    /// tie break.
    pub fn constraints_ordered(&self) -> Vec<&ConstraintEdge> {
        let mut edges: Vec<&ConstraintEdge> = self.constraints.iter().collect();
        edges.sort_by(|a, b| score_then_creation(a, b));
        edges
    }

    pub fn online_nodes(&self) -> Vec<HostName> {
        let mut online: Vec<HostName> = self
            .nodes
            .iter()
            .filter(|(_, state)| **state == NodeState::Online)
            .map(|(host, _)| host.clone())
            .collect();
        online.sort();
        online
    }
}
