//! Weighted signals shared by the pattern scanner and the classifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How strongly a signal or pattern argues for its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Weak,
    Moderate,
    Strong,
}

impl Weight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weight::Weak => "weak",
            Weight::Moderate => "moderate",
            Weight::Strong => "strong",
        }
    }

    /// Report marker: `***` strong, `**` moderate, `*` weak.
    pub fn marker(&self) -> &'static str {
        match self {
            Weight::Weak => "*",
            Weight::Moderate => "**",
            Weight::Strong => "***",
        }
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a signal points toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    IsolatedBase,
    SharedBase,
    EnablesIsolation,
    PartialIsolation,
    BlocksSample,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::IsolatedBase => "isolated_base",
            Direction::SharedBase => "shared_base",
            Direction::EnablesIsolation => "enables_isolation",
            Direction::PartialIsolation => "partial_isolation",
            Direction::BlocksSample => "blocks_sample",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One explanatory entry of a classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: String,
    pub value: Value,
    pub detail: String,
    pub weight: Weight,
    pub direction: Direction,
    pub reason: String,
}

impl Signal {
    pub fn new(
        signal: &str,
        value: impl Into<Value>,
        detail: impl Into<String>,
        weight: Weight,
        direction: Direction,
        reason: &str,
    ) -> Self {
        Self {
            signal: signal.to_string(),
            value: value.into(),
            detail: detail.into(),
            weight,
            direction,
            reason: reason.to_string(),
        }
    }
}
