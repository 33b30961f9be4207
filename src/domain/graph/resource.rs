use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::agent::agent::ResourceAgent;
use crate::domain::ids::ResourceName;
use crate::error::{Error, Result};

/// One configured resource: an instantiation of a catalog agent under a
/// unique name with saved parameter values.
///
/// Saved values are kept in a `BTreeMap` so parameter dumps and rendered
/// commands always come out in the same order.
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    pub name: ResourceName,
    pub agent: Arc<ResourceAgent>,
    pub params: BTreeMap<String, String>,
}

impl ResourceInstance {
    pub fn new(name: ResourceName, agent: Arc<ResourceAgent>, params: BTreeMap<String, String>) -> Result<ResourceInstance> {
        let instance = ResourceInstance { name, agent, params };
        instance.validate()?;

        Ok(instance)
    }

    /// Checks every saved value against the agent definition and verifies
    /// that all required parameters are covered by a value or a default.
    pub fn validate(&self) -> Result<()> {
        for (param, value) in &self.params {
            self.check_param(param, value)?;
        }

        for def in self.agent.required_params() {
            if !self.params.contains_key(&def.name) && def.default.is_none() {
                return Err(Error::ValidationError(format!(
                    "Resource '{}' is missing required parameter '{}' of agent '{}'",
                    self.name,
                    def.name,
                    self.agent.full_key()
                )));
            }
        }

        Ok(())
    }

    /// Sets one parameter after validating it.
    pub fn set_param(&mut self, param: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.check_param(param, &value)?;

        self.params.insert(param.to_string(), value);
        Ok(())
    }

    fn check_param(&self, param: &str, value: &str) -> Result<()> {
        let Some(def) = self.agent.param(param) else {
            return Err(Error::ValidationError(format!(
                "Resource '{}': agent '{}' does not define parameter '{}'",
                self.name,
                self.agent.full_key(),
                param
            )));
        };

        if let Err(reason) = def.check_value(value) {
            return Err(Error::ValidationError(format!("Resource '{}': {}", self.name, reason)));
        }

        Ok(())
    }

    /// Effective parameter values: agent defaults overlaid with saved
    /// values. This is what the cluster will hold once applied, and what
    /// the reconciler diffs against live state.
    pub fn resolved_params(&self) -> BTreeMap<String, String> {
        let mut resolved = BTreeMap::new();

        for def in &self.agent.parameters {
            if let Some(default) = &def.default {
                resolved.insert(def.name.clone(), default.clone());
            }
        }

        for (param, value) in &self.params {
            resolved.insert(param.clone(), value.clone());
        }

        resolved
    }

    pub fn agent_key(&self) -> String {
        self.agent.full_key()
    }
}
