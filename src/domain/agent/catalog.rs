use std::collections::HashMap;
use std::sync::Arc;

use crate::api::agent_dto::AgentCatalogDto;
use crate::domain::agent::agent::ResourceAgent;
use crate::error::{Error, Result};

/// Immutable catalog of every resource agent the cluster advertises,
/// keyed by the full agent key ("class:provider:name" or "class:name").
///
/// A manifest with any defective agent is rejected wholesale so that
/// downstream validation never runs against a partial agent set.
#[derive(Debug)]
pub struct AgentCatalog {
    agents: HashMap<String, Arc<ResourceAgent>>,
}

impl AgentCatalog {
    pub fn from_dto(dto: AgentCatalogDto) -> Result<AgentCatalog> {
        let mut agents: HashMap<String, Arc<ResourceAgent>> = HashMap::with_capacity(dto.agents.len());

        for agent_dto in dto.agents {
            let agent = ResourceAgent::from_dto(agent_dto)?;
            let key = agent.full_key();

            if agents.contains_key(&key) {
                return Err(Error::ParseError(format!("Agent manifest lists '{}' more than once", key)));
            }

            agents.insert(key, Arc::new(agent));
        }

        log::info!("Agent catalog loaded with {} agent(s).", agents.len());

        Ok(AgentCatalog { agents })
    }

    pub fn lookup(&self, full_key: &str) -> Option<Arc<ResourceAgent>> {
        self.agents.get(full_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent keys in lexical order, for reproducible listings.
    pub fn agent_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.agents.keys().map(|key| key.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}
