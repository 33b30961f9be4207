use serde::{Deserialize, Serialize};

/// Root of an agent manifest document.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentCatalogDto {
    pub agents: Vec<AgentDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentDto {
    pub name: String,
    pub class: String,
    pub provider: Option<String>,
    pub version: Option<String>,
    pub short_description: Option<String>,

    #[serde(default)]
    pub parameters: Vec<AgentParameterDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentParameterDto {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamTypeDto,

    #[serde(default)]
    pub required: bool,
    pub default: Option<String>,

    #[serde(default)]
    pub allowed: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamTypeDto {
    String,
    Integer,
    Boolean,
    Enum,
}
