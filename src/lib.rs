use std::sync::Arc;

use crate::api::agent_dto::AgentCatalogDto;
use crate::api::desired_dto::DesiredConfigDto;
use crate::api::status_dto::StatusDto;
use crate::domain::agent::catalog::AgentCatalog;
use crate::domain::graph::desired::DesiredConfig;
use crate::domain::status::snapshot::ClusterSnapshot;
use crate::error::Result;
use crate::loader::parser::{parse_json_file, parse_json_str};

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Loads and validates an agent manifest from disk.
///
/// The whole manifest is rejected on the first invalid entry, a catalog
/// is never built from a partially valid document.
pub fn load_agent_catalog(file_path: &str) -> Result<Arc<AgentCatalog>> {
    let root_dto = parse_json_file::<AgentCatalogDto>(file_path)?;
    log::info!("Agent manifest parsed successfully.");

    let catalog = AgentCatalog::from_dto(root_dto)?;
    log::info!("Agent catalog constructed successfully.");

    Ok(Arc::new(catalog))
}

/// Loads a desired configuration from disk and validates it against the
/// given agent catalog.
pub fn load_desired_config(file_path: &str, catalog: Arc<AgentCatalog>) -> Result<DesiredConfig> {
    let root_dto = parse_json_file::<DesiredConfigDto>(file_path)?;
    log::info!("Desired configuration parsed successfully.");

    let desired = DesiredConfig::from_dto(root_dto, catalog)?;
    log::info!("Desired configuration constructed successfully.");

    Ok(desired)
}

/// Parses one status document, as emitted by the cluster's status tool,
/// into an immutable snapshot.
pub fn parse_status_document(raw: &str) -> Result<ClusterSnapshot> {
    let root_dto = parse_json_str::<StatusDto>(raw)?;
    let snapshot = ClusterSnapshot::from_dto(root_dto)?;
    log::info!("Cluster status snapshot constructed successfully.");

    Ok(snapshot)
}
