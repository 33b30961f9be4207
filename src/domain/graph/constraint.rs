use serde::Serialize;
use std::fmt;

use crate::api::status_dto::{ColocationDto, ConstraintDto, OrderDto};
use crate::domain::ids::{ConstraintId, ResourceName};
use crate::domain::score::Score;
use crate::error::{Error, Result};

/// Role qualifier on a colocation endpoint. The legacy "master"/"slave"
/// spellings still appear in older cluster documents and map onto the
/// current names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoleQualifier {
    Promoted,
    Unpromoted,
}

impl RoleQualifier {
    pub fn parse_opt(raw: &Option<String>) -> Result<Option<RoleQualifier>> {
        let Some(token) = raw else {
            return Ok(None);
        };

        match token.to_ascii_lowercase().as_str() {
            "promoted" | "master" => Ok(Some(RoleQualifier::Promoted)),
            "unpromoted" | "slave" => Ok(Some(RoleQualifier::Unpromoted)),
            _ => Err(Error::ParseError(format!("Unknown role qualifier: '{}'", token))),
        }
    }
}

impl fmt::Display for RoleQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleQualifier::Promoted => write!(f, "Promoted"),
            RoleQualifier::Unpromoted => write!(f, "Unpromoted"),
        }
    }
}

/// Lifecycle action an order constraint sequences. Defaults to `Start`
/// when the document leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OrderAction {
    #[default]
    Start,
    Stop,
    Promote,
    Demote,
}

impl OrderAction {
    pub fn parse_opt(raw: &Option<String>) -> Result<OrderAction> {
        let Some(token) = raw else {
            return Ok(OrderAction::Start);
        };

        match token.to_ascii_lowercase().as_str() {
            "start" => Ok(OrderAction::Start),
            "stop" => Ok(OrderAction::Stop),
            "promote" => Ok(OrderAction::Promote),
            "demote" => Ok(OrderAction::Demote),
            _ => Err(Error::ParseError(format!("Unknown order action: '{}'", token))),
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderAction::Start => "start",
            OrderAction::Stop => "stop",
            OrderAction::Promote => "promote",
            OrderAction::Demote => "demote",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintKind {
    Colocation {
        resource: ResourceName,
        with: ResourceName,
        resource_role: Option<RoleQualifier>,
        with_role: Option<RoleQualifier>,
    },
    Order {
        first: ResourceName,
        then: ResourceName,
        first_action: OrderAction,
        then_action: OrderAction,
    },
}

/// One colocation or order relationship between two resources.
///
/// `creation_index` records when the edge entered its containing graph and
/// breaks score ties so that configuration dumps are reproducible.
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintEdge {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    pub score: Score,
    pub creation_index: u64,
}

impl ConstraintEdge {
    pub fn new(id: Option<ConstraintId>, kind: ConstraintKind, score: Score, creation_index: u64) -> ConstraintEdge {
        let id = id.unwrap_or_else(|| Self::default_id(&kind));

        ConstraintEdge { id, kind, score, creation_index }
    }

    pub fn from_dto(dto: ConstraintDto, creation_index: u64) -> Result<ConstraintEdge> {
        match dto {
            ConstraintDto::Colocation(colocation) => Self::from_colocation_dto(colocation, creation_index),
            ConstraintDto::Order(order) => Self::from_order_dto(order, creation_index),
        }
    }

    fn from_colocation_dto(dto: ColocationDto, creation_index: u64) -> Result<ConstraintEdge> {
        let kind = ConstraintKind::Colocation {
            resource: ResourceName::new(dto.resource),
            with: ResourceName::new(dto.with),
            resource_role: RoleQualifier::parse_opt(&dto.resource_role)?,
            with_role: RoleQualifier::parse_opt(&dto.with_role)?,
        };

        let id = match dto.id {
            Some(id) => ConstraintId::new(id),
            None => Self::default_id(&kind),
        };

        Ok(ConstraintEdge { id, kind, score: dto.score, creation_index })
    }

    fn from_order_dto(dto: OrderDto, creation_index: u64) -> Result<ConstraintEdge> {
        let kind = ConstraintKind::Order {
            first: ResourceName::new(dto.first),
            then: ResourceName::new(dto.then),
            first_action: OrderAction::parse_opt(&dto.first_action)?,
            then_action: OrderAction::parse_opt(&dto.then_action)?,
        };

        let id = match dto.id {
            Some(id) => ConstraintId::new(id),
            None => Self::default_id(&kind),
        };

        Ok(ConstraintEdge { id, kind, score: dto.score, creation_index })
    }

    fn default_id(kind: &ConstraintKind) -> ConstraintId {
        match kind {
            ConstraintKind::Colocation { resource, with, .. } => ConstraintId::new(format!("col-{}-{}", resource, with)),
            ConstraintKind::Order { first, then, .. } => ConstraintId::new(format!("ord-{}-{}", first, then)),
        }
    }

    /// Endpoints as the ordered pair the document wrote them in.
    pub fn endpoints(&self) -> (&ResourceName, &ResourceName) {
        match &self.kind {
            ConstraintKind::Colocation { resource, with, .. } => (resource, with),
            ConstraintKind::Order { first, then, .. } => (first, then),
        }
    }

    pub fn touches(&self, name: &ResourceName) -> bool {
        let (left, right) = self.endpoints();
        left == name || right == name
    }

    pub fn is_order(&self) -> bool {
        matches!(self.kind, ConstraintKind::Order { .. })
    }

    pub fn is_colocation(&self) -> bool {
        matches!(self.kind, ConstraintKind::Colocation { .. })
    }

    /// True when `other` pins the same relationship with the same strength.
    /// Creation indices are bookkeeping and do not participate.
    pub fn same_definition(&self, other: &ConstraintEdge) -> bool {
        self.kind == other.kind && self.score == other.score
    }

    pub fn kind_word(&self) -> &'static str {
        match self.kind {
            ConstraintKind::Colocation { .. } => "colocation",
            ConstraintKind::Order { .. } => "order",
        }
    }
}

/// Dump order for constraint listings: score descending, creation order as
/// the tie break. Two edges only compare equal when they are the same edge.
pub fn score_then_creation(a: &ConstraintEdge, b: &ConstraintEdge) -> std::cmp::Ordering {
    b.score.cmp(&a.score).then_with(|| a.creation_index.cmp(&b.creation_index))
}
