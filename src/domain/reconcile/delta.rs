use std::collections::{HashMap, HashSet};

use crate::domain::graph::constraint::{ConstraintEdge, score_then_creation};
use crate::domain::graph::desired::DesiredConfig;
use crate::domain::ids::{ConstraintId, ResourceName};
use crate::domain::reconcile::command::{CommandKind, CrmCommand};
use crate::domain::status::snapshot::ClusterSnapshot;

/// A parameter assignment already dispatched but not yet visible in any
/// snapshot: (resource, parameter, value).
pub type InFlightChange = (ResourceName, String, String);

/// Diffs the target configuration against a live snapshot.
///
/// The returned commands are ordered for referential safety: no command
/// ever references a resource that a later command creates or an earlier
/// command deleted. Within each phase the order is deterministic, so the
/// same inputs always produce the same command list.
pub fn compute_delta(desired: &DesiredConfig, snapshot: &ClusterSnapshot) -> Vec<CrmCommand> {
    compute_delta_filtered(desired, snapshot, &HashSet::new())
}

/// Like [`compute_delta`], but suppresses parameter assignments that are
/// already in flight so a reconciliation loop does not resend them while
/// waiting for the next snapshot to confirm.
pub fn compute_delta_filtered(
    desired: &DesiredConfig,
    snapshot: &ClusterSnapshot,
    in_flight: &HashSet<InFlightChange>,
) -> Vec<CrmCommand> {
    let mut commands = Vec::new();

    // A resource whose live agent differs from the target has changed
    // identity and is replaced. Deleting it on the engine also tears down
    // its live constraints, so those must be rebuilt as well.
    let replaced: HashSet<&ResourceName> = desired
        .resources()
        .filter(|instance| {
            snapshot
                .resource(&instance.name)
                .is_some_and(|live| live.agent != instance.agent_key())
        })
        .map(|instance| &instance.name)
        .collect();

    let desired_edges: HashMap<&ConstraintId, &ConstraintEdge> =
        desired.constraints().map(|edge| (&edge.id, edge)).collect();

    // Phase 1: delete live edges without an identical surviving target.
    // Edges touching resources that leave the target are always in this
    // set, which keeps every later resource delete referentially safe.
    let mut edge_deletes: Vec<&ConstraintEdge> = snapshot
        .constraints
        .iter()
        .filter(|live| {
            let survives = desired_edges
                .get(&live.id)
                .is_some_and(|want| want.same_definition(live))
                && !touches_any(live, &replaced);
            !survives
        })
        .collect();
    edge_deletes.sort_by(|a, b| score_then_creation(a, b));

    for live in edge_deletes {
        let (left, right) = live.endpoints();
        commands.push(CrmCommand::new(CommandKind::DeleteConstraint {
            constraint: live.id.clone(),
            endpoints: (left.clone(), right.clone()),
        }));
    }

    // Phase 2: delete live resources that left the target, plus replaced ones
    for name in snapshot.resource_names() {
        if !desired.contains_resource(&name) || replaced.contains(&name) {
            commands.push(CrmCommand::new(CommandKind::DeleteResource { resource: name }));
        }
    }

    // Phase 3: create target resources missing live, plus replaced ones
    let mut resource_creates: Vec<_> = desired
        .resources()
        .filter(|instance| !snapshot.has_resource(&instance.name) || replaced.contains(&instance.name))
        .collect();
    resource_creates.sort_by(|a, b| a.name.cmp(&b.name));

    for instance in resource_creates {
        commands.push(CrmCommand::new(CommandKind::CreateResource {
            resource: instance.name.clone(),
            agent: instance.agent_key(),
            params: instance.resolved_params().into_iter().collect(),
        }));
    }

    // Phase 4: align parameters on resources present on both sides
    let mut common: Vec<_> = desired
        .resources()
        .filter(|instance| snapshot.has_resource(&instance.name) && !replaced.contains(&instance.name))
        .collect();
    common.sort_by(|a, b| a.name.cmp(&b.name));

    for instance in common {
        let live = snapshot
            .resource(&instance.name)
            .expect("Common resource must be in the snapshot");

        for (param, value) in instance.resolved_params() {
            if live.params.get(&param) == Some(&value) {
                continue;
            }
            if in_flight.contains(&(instance.name.clone(), param.clone(), value.clone())) {
                continue;
            }

            commands.push(CrmCommand::new(CommandKind::SetParameter {
                resource: instance.name.clone(),
                param,
                value,
            }));
        }
    }

    // Phase 5: create target edges with no surviving live counterpart
    let live_edges: HashMap<&ConstraintId, &ConstraintEdge> =
        snapshot.constraints.iter().map(|edge| (&edge.id, edge)).collect();

    for want in desired.constraints_ordered() {
        let kept = live_edges
            .get(&want.id)
            .is_some_and(|live| live.same_definition(want))
            && !touches_any(want, &replaced);

        if !kept {
            commands.push(CrmCommand::new(CommandKind::CreateConstraint { edge: want.clone() }));
        }
    }

    commands
}

fn touches_any(edge: &ConstraintEdge, names: &HashSet<&ResourceName>) -> bool {
    let (left, right) = edge.endpoints();
    names.contains(left) || names.contains(right)
}
