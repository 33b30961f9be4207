use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::status_dto::ConstraintDto;

/// Root of a desired configuration document as edited by an operator.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfigDto {
    #[serde(default)]
    pub resources: Vec<DesiredResourceDto>,

    #[serde(default)]
    pub constraints: Vec<ConstraintDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DesiredResourceDto {
    pub name: String,

    /// Full agent key, resolved against the loaded catalog.
    pub agent: String,

    #[serde(default)]
    pub params: HashMap<String, String>,
}
