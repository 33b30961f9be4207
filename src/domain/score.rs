use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Finite magnitude at which the cluster engine saturates scores. Parsed
/// values at or beyond this bound collapse into the matching sentinel, so
/// no finite `Score` can ever hold it.
pub const SCORE_INFINITY: i64 = 1_000_000;

/// Constraint weight, either a finite integer or one of the two reserved
/// infinity sentinels.
///
/// The variant declaration order carries the total order used everywhere:
/// `MinusInfinity` compares below every finite value and `PlusInfinity`
/// above every finite value, equal sentinels compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Score {
    MinusInfinity,
    Finite(i64),
    PlusInfinity,
}

lazy_static! {
    /// Sentinel tokens as they appear in status documents and desired
    /// configurations, lowercased for lookup.
    static ref SENTINEL_TOKENS: HashMap<&'static str, Score> = {
        let mut tokens = HashMap::new();
        tokens.insert("infinity", Score::PlusInfinity);
        tokens.insert("+infinity", Score::PlusInfinity);
        tokens.insert("-infinity", Score::MinusInfinity);
        tokens.insert("inf", Score::PlusInfinity);
        tokens.insert("+inf", Score::PlusInfinity);
        tokens.insert("-inf", Score::MinusInfinity);
        tokens
    };
}

impl Score {
    /// Builds a score from a raw integer, saturating at the engine bound.
    pub fn finite(value: i64) -> Score {
        if value >= SCORE_INFINITY {
            Score::PlusInfinity
        } else if value <= -SCORE_INFINITY {
            Score::MinusInfinity
        } else {
            Score::Finite(value)
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Score::PlusInfinity | Score::MinusInfinity)
    }

    pub fn as_finite(&self) -> Option<i64> {
        match self {
            Score::Finite(value) => Some(*value),
            _ => None,
        }
    }

    /// Short token used when rendering engine commands, e.g. "inf:" in a
    /// colocation statement.
    pub fn render_token(&self) -> String {
        match self {
            Score::PlusInfinity => "inf".to_string(),
            Score::MinusInfinity => "-inf".to_string(),
            Score::Finite(value) => value.to_string(),
        }
    }
}

impl FromStr for Score {
    type Err = Error;

    fn from_str(token: &str) -> Result<Score, Self::Err> {
        let trimmed = token.trim();

        if let Some(score) = SENTINEL_TOKENS.get(trimmed.to_ascii_lowercase().as_str()) {
            return Ok(*score);
        }

        match trimmed.parse::<i64>() {
            Ok(value) => Ok(Score::finite(value)),
            Err(_) => Err(Error::ParseError(format!("Invalid score token: '{}'", token))),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::PlusInfinity => write!(f, "INFINITY"),
            Score::MinusInfinity => write!(f, "-INFINITY"),
            Score::Finite(value) => write!(f, "{}", value),
        }
    }
}

impl TryFrom<String> for Score {
    type Error = Error;

    fn try_from(token: String) -> Result<Score, Self::Error> {
        token.parse()
    }
}

impl From<Score> for String {
    fn from(score: Score) -> Self {
        score.to_string()
    }
}
