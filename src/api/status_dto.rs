use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::score::Score;

/// Root of a cluster status document as the status bridge reports it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusDto {
    pub cluster_name: Option<String>,
    pub dc_host: Option<String>,

    pub nodes: Vec<NodeStatusDto>,

    #[serde(default)]
    pub resources: Vec<ResourceStatusDto>,

    #[serde(default)]
    pub constraints: Vec<ConstraintDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusDto {
    pub name: String,
    pub state: NodeStateDto,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStateDto {
    Online,
    Offline,
    Standby,
    Maintenance,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatusDto {
    pub id: String,

    /// Full agent key, e.g. "ocf:heartbeat:IPaddr2".
    pub agent: String,

    /// Node the resource runs on, absent when stopped.
    pub node: Option<String>,
    pub role: RunRoleDto,

    #[serde(default)]
    pub fail_count: u32,

    /// Parameter values as last applied on the cluster.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunRoleDto {
    Stopped,
    Started,
    Promoted,
    Unpromoted,
}

/// Constraint entry, shared between status documents (live edges) and
/// desired configuration documents (target edges).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConstraintDto {
    Colocation(ColocationDto),
    Order(OrderDto),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ColocationDto {
    pub id: Option<String>,
    pub resource: String,
    pub with: String,
    pub score: Score,
    pub resource_role: Option<String>,
    pub with_role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: Option<String>,
    pub first: String,
    pub then: String,
    pub score: Score,
    pub first_action: Option<String>,
    pub then_action: Option<String>,
}
