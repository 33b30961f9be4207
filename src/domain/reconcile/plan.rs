use std::collections::{BTreeSet, HashMap};
use union_find::{QuickUnionUf, UnionBySize, UnionFind};

use crate::domain::ids::{HostName, ResourceName};
use crate::domain::reconcile::command::CrmCommand;
use crate::error::{Error, Result};

/// Commands bound for one host, executed strictly in dispatch order.
#[derive(Debug)]
pub struct HostStream {
    pub host: HostName,
    pub commands: Vec<CrmCommand>,
}

/// A delta split into per-host serialized streams.
#[derive(Debug)]
pub struct DeltaPlan {
    pub streams: Vec<HostStream>,
}

impl DeltaPlan {
    pub fn total_commands(&self) -> usize {
        self.streams.iter().map(|stream| stream.commands.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Splits an ordered command list into per-host streams.
///
/// Commands whose resources are linked through any command of the delta
/// must observe each other's effects, so their dependency component stays
/// in a single stream. Independent components are dealt out round robin
/// over the given hosts and may execute concurrently. Within each stream
/// the global command order is preserved.
pub fn build_plan(commands: Vec<CrmCommand>, hosts: &[HostName]) -> Result<DeltaPlan> {
    if commands.is_empty() {
        return Ok(DeltaPlan { streams: Vec::new() });
    }
    if hosts.is_empty() {
        return Err(Error::ValidationError("Cannot plan dispatch without a target host".to_string()));
    }

    // 1. Map every touched resource onto dense indices for the DSU structure
    let name_set: BTreeSet<ResourceName> = commands
        .iter()
        .flat_map(|command| command.resources().into_iter().cloned())
        .collect();
    let names: Vec<ResourceName> = name_set.into_iter().collect();

    let mut name_to_index: HashMap<&ResourceName, usize> = HashMap::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        name_to_index.insert(name, index);
    }

    // 2. Union the resources touched by each command
    let mut dsu = QuickUnionUf::<UnionBySize>::new(names.len());
    for command in &commands {
        let touched = command.resources();
        for pair in touched.windows(2) {
            let left = *name_to_index.get(pair[0]).expect("Touched resource must be indexed");
            let right = *name_to_index.get(pair[1]).expect("Touched resource must be indexed");
            dsu.union(left, right);
        }
    }

    // 3. Assign components to hosts round robin. Iterating names in sorted
    // order makes the assignment reproducible for a given host list.
    let mut component_host: HashMap<usize, usize> = HashMap::new();
    let mut next_host = 0usize;
    for index in 0..names.len() {
        let root = dsu.find(index);
        if !component_host.contains_key(&root) {
            component_host.insert(root, next_host % hosts.len());
            next_host += 1;
        }
    }

    // 4. Deal the commands into their streams, keeping global order
    let mut streams: HashMap<HostName, Vec<CrmCommand>> = HashMap::new();
    for command in commands {
        let root = {
            let touched = command.resources();
            let index = *name_to_index.get(touched[0]).expect("Touched resource must be indexed");
            dsu.find(index)
        };

        let host = hosts[component_host[&root]].clone();
        streams.entry(host).or_default().push(command);
    }

    let mut result: Vec<HostStream> = streams
        .into_iter()
        .map(|(host, commands)| HostStream { host, commands })
        .collect();
    result.sort_by(|a, b| a.host.cmp(&b.host));

    log::debug!(
        "Delta plan: {} command(s) over {} host stream(s).",
        result.iter().map(|stream| stream.commands.len()).sum::<usize>(),
        result.len()
    );

    Ok(DeltaPlan { streams: result })
}
