use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::api::agent_dto::{AgentDto, AgentParameterDto, ParamTypeDto};
use crate::domain::ids::AgentName;
use crate::error::{Error, Result};

/// Resource agent standard the cluster engine knows how to drive.
///
/// Only the `ocf` class carries a provider segment, e.g. "ocf:heartbeat".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AgentClass {
    Ocf,
    Heartbeat,
    Lsb,
    Systemd,
    Stonith,
}

impl FromStr for AgentClass {
    type Err = Error;

    fn from_str(class: &str) -> Result<AgentClass> {
        match class {
            "ocf" => Ok(AgentClass::Ocf),
            "heartbeat" => Ok(AgentClass::Heartbeat),
            "lsb" => Ok(AgentClass::Lsb),
            "systemd" => Ok(AgentClass::Systemd),
            "stonith" => Ok(AgentClass::Stonith),
            _ => Err(Error::ParseError(format!("Unknown agent class: '{}'", class))),
        }
    }
}

impl fmt::Display for AgentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentClass::Ocf => "ocf",
            AgentClass::Heartbeat => "heartbeat",
            AgentClass::Lsb => "lsb",
            AgentClass::Systemd => "systemd",
            AgentClass::Stonith => "stonith",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Enum,
}

impl From<ParamTypeDto> for ParamType {
    fn from(dto: ParamTypeDto) -> Self {
        match dto {
            ParamTypeDto::String => ParamType::String,
            ParamTypeDto::Integer => ParamType::Integer,
            ParamTypeDto::Boolean => ParamType::Boolean,
            ParamTypeDto::Enum => ParamType::Enum,
        }
    }
}

/// One parameter definition from an agent manifest. Definition order within
/// the agent is preserved.
#[derive(Debug, Clone, Serialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<String>,

    /// Allowed values, only populated for `ParamType::Enum`.
    pub allowed: Vec<String>,
}

const BOOLEAN_TOKENS: [&str; 6] = ["true", "false", "yes", "no", "0", "1"];

impl ParamDef {
    /// Checks a candidate value against this definition.
    ///
    /// Returns a human-readable reason on rejection so callers can wrap it
    /// into their own error kind (parse failure for manifest defaults,
    /// validation failure for operator input).
    pub fn check_value(&self, value: &str) -> std::result::Result<(), String> {
        match self.param_type {
            ParamType::String => Ok(()),
            ParamType::Integer => match value.parse::<i64>() {
                Ok(_) => Ok(()),
                Err(_) => Err(format!("parameter '{}' expects an integer, got '{}'", self.name, value)),
            },
            ParamType::Boolean => {
                if BOOLEAN_TOKENS.contains(&value.to_ascii_lowercase().as_str()) {
                    Ok(())
                } else {
                    Err(format!("parameter '{}' expects a boolean, got '{}'", self.name, value))
                }
            }
            ParamType::Enum => {
                if self.allowed.iter().any(|allowed| allowed == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "parameter '{}' expects one of [{}], got '{}'",
                        self.name,
                        self.allowed.join(", "),
                        value
                    ))
                }
            }
        }
    }
}

/// Immutable description of one resource agent from the cluster's manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceAgent {
    pub name: AgentName,
    pub class: AgentClass,
    pub provider: Option<String>,
    pub version: Option<String>,
    pub short_description: Option<String>,

    /// Parameter definitions in manifest order.
    pub parameters: Vec<ParamDef>,
}

impl ResourceAgent {
    /// Builds one agent from its manifest DTO, verifying the definition is
    /// internally consistent. Any defect rejects the agent.
    pub fn from_dto(dto: AgentDto) -> Result<ResourceAgent> {
        let class = AgentClass::from_str(&dto.class)?;

        match (class, &dto.provider) {
            (AgentClass::Ocf, None) => {
                return Err(Error::ParseError(format!("Agent '{}' has class 'ocf' but no provider", dto.name)));
            }
            (AgentClass::Ocf, Some(_)) => {}
            (_, Some(provider)) => {
                return Err(Error::ParseError(format!(
                    "Agent '{}' has class '{}' which does not take a provider (got '{}')",
                    dto.name, dto.class, provider
                )));
            }
            (_, None) => {}
        }

        let mut parameters = Vec::with_capacity(dto.parameters.len());
        for param_dto in dto.parameters {
            let param = Self::build_param(&dto.name, param_dto)?;

            if parameters.iter().any(|existing: &ParamDef| existing.name == param.name) {
                return Err(Error::ParseError(format!(
                    "Agent '{}' defines parameter '{}' more than once",
                    dto.name, param.name
                )));
            }

            parameters.push(param);
        }

        Ok(ResourceAgent {
            name: AgentName::new(dto.name),
            class,
            provider: dto.provider,
            version: dto.version,
            short_description: dto.short_description,
            parameters,
        })
    }

    fn build_param(agent_name: &str, dto: AgentParameterDto) -> Result<ParamDef> {
        let param = ParamDef {
            name: dto.name,
            param_type: ParamType::from(dto.param_type),
            required: dto.required,
            default: dto.default,
            allowed: dto.allowed,
        };

        if param.param_type == ParamType::Enum && param.allowed.is_empty() {
            return Err(Error::ParseError(format!(
                "Agent '{}' parameter '{}' is an enum without allowed values",
                agent_name, param.name
            )));
        }
        if param.param_type != ParamType::Enum && !param.allowed.is_empty() {
            return Err(Error::ParseError(format!(
                "Agent '{}' parameter '{}' lists allowed values but is not an enum",
                agent_name, param.name
            )));
        }

        if let Some(default) = &param.default {
            if let Err(reason) = param.check_value(default) {
                return Err(Error::ParseError(format!("Agent '{}' has an invalid default: {}", agent_name, reason)));
            }
        }

        Ok(param)
    }

    /// Full lookup key as the engine spells it, e.g. "ocf:heartbeat:IPaddr2"
    /// or "systemd:nginx".
    pub fn full_key(&self) -> String {
        match &self.provider {
            Some(provider) => format!("{}:{}:{}", self.class, provider, self.name),
            None => format!("{}:{}", self.class, self.name),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.parameters.iter().find(|param| param.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.parameters.iter().filter(|param| param.required)
    }

    pub fn is_stonith(&self) -> bool {
        self.class == AgentClass::Stonith
    }
}
