use serde::Serialize;
use uuid::Uuid;

use crate::domain::graph::constraint::{ConstraintEdge, ConstraintKind, OrderAction};
use crate::domain::ids::{ConstraintId, ResourceName};

/// One configuration change for the cluster engine.
///
/// Commands carry structured data until the moment of dispatch and are
/// rendered to argv form only at the connection boundary.
#[derive(Debug, Clone, Serialize)]
pub struct CrmCommand {
    pub id: Uuid,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Serialize)]
pub enum CommandKind {
    CreateResource {
        resource: ResourceName,
        agent: String,

        /// Resolved parameter pairs, sorted by name.
        params: Vec<(String, String)>,
    },
    DeleteResource {
        resource: ResourceName,
    },
    SetParameter {
        resource: ResourceName,
        param: String,
        value: String,
    },
    CreateConstraint {
        edge: ConstraintEdge,
    },
    DeleteConstraint {
        constraint: ConstraintId,

        /// Endpoints of the deleted edge, kept for dependency grouping.
        endpoints: (ResourceName, ResourceName),
    },
}

impl CrmCommand {
    pub fn new(kind: CommandKind) -> Self {
        Self { id: Uuid::new_v4(), kind }
    }

    /// Renders the command as argv cells for the connection layer.
    pub fn render_argv(&self) -> Vec<String> {
        match &self.kind {
            CommandKind::CreateResource { resource, agent, params } => {
                let mut argv = vec![
                    "crm".to_string(),
                    "configure".to_string(),
                    "primitive".to_string(),
                    resource.to_string(),
                    agent.clone(),
                ];

                if !params.is_empty() {
                    argv.push("params".to_string());
                    for (param, value) in params {
                        argv.push(format!("{}={}", param, value));
                    }
                }

                argv
            }
            CommandKind::DeleteResource { resource } => {
                vec!["crm".to_string(), "configure".to_string(), "delete".to_string(), resource.to_string()]
            }
            CommandKind::SetParameter { resource, param, value } => {
                vec![
                    "crm_resource".to_string(),
                    "--resource".to_string(),
                    resource.to_string(),
                    "--set-parameter".to_string(),
                    param.clone(),
                    "--parameter-value".to_string(),
                    value.clone(),
                ]
            }
            CommandKind::CreateConstraint { edge } => Self::render_constraint(edge),
            CommandKind::DeleteConstraint { constraint, .. } => {
                vec!["crm".to_string(), "configure".to_string(), "delete".to_string(), constraint.to_string()]
            }
        }
    }

    fn render_constraint(edge: &ConstraintEdge) -> Vec<String> {
        let score_cell = format!("{}:", edge.score.render_token());

        match &edge.kind {
            ConstraintKind::Colocation { resource, with, resource_role, with_role } => {
                let mut argv = vec![
                    "crm".to_string(),
                    "configure".to_string(),
                    "colocation".to_string(),
                    edge.id.to_string(),
                    score_cell,
                ];

                for (name, role) in [(resource, resource_role), (with, with_role)] {
                    match role {
                        Some(role) => argv.push(format!("{}:{}", name, role)),
                        None => argv.push(name.to_string()),
                    }
                }

                argv
            }
            ConstraintKind::Order { first, then, first_action, then_action } => {
                let mut argv = vec![
                    "crm".to_string(),
                    "configure".to_string(),
                    "order".to_string(),
                    edge.id.to_string(),
                    score_cell,
                ];

                // The engine defaults both actions to "start", so the
                // suffix is only spelled out when either differs.
                let explicit = *first_action != OrderAction::Start || *then_action != OrderAction::Start;
                for (name, action) in [(first, first_action), (then, then_action)] {
                    if explicit {
                        argv.push(format!("{}:{}", name, action));
                    } else {
                        argv.push(name.to_string());
                    }
                }

                argv
            }
        }
    }

    /// Single-line shell rendering for logs and reports.
    pub fn render_line(&self) -> String {
        shell_words::join(self.render_argv())
    }

    /// Whether re-running the command converges on the same final state.
    ///
    /// Setting a parameter states the target value itself, so replays are
    /// harmless. Create and delete commands fail on replay once their
    /// effect is in place, so an uncertain outcome must not be retried.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.kind, CommandKind::SetParameter { .. })
    }

    /// Resources this command touches, for dependency grouping.
    pub fn resources(&self) -> Vec<&ResourceName> {
        match &self.kind {
            CommandKind::CreateResource { resource, .. } => vec![resource],
            CommandKind::DeleteResource { resource } => vec![resource],
            CommandKind::SetParameter { resource, .. } => vec![resource],
            CommandKind::CreateConstraint { edge } => {
                let (left, right) = edge.endpoints();
                vec![left, right]
            }
            CommandKind::DeleteConstraint { endpoints, .. } => vec![&endpoints.0, &endpoints.1],
        }
    }

    /// Short verb label for audit records.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            CommandKind::CreateResource { .. } => "create-resource",
            CommandKind::DeleteResource { .. } => "delete-resource",
            CommandKind::SetParameter { .. } => "set-parameter",
            CommandKind::CreateConstraint { .. } => "create-constraint",
            CommandKind::DeleteConstraint { .. } => "delete-constraint",
        }
    }

    /// Primary identifier the command acts on, for logs and audit records.
    pub fn subject(&self) -> String {
        match &self.kind {
            CommandKind::CreateResource { resource, .. } => resource.to_string(),
            CommandKind::DeleteResource { resource } => resource.to_string(),
            CommandKind::SetParameter { resource, param, .. } => format!("{}.{}", resource, param),
            CommandKind::CreateConstraint { edge } => edge.id.to_string(),
            CommandKind::DeleteConstraint { constraint, .. } => constraint.to_string(),
        }
    }
}
