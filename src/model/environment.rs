//! Environments
//!
//! Definitions move through three ordered stages. The ordering is total
//! (Working < Qa < Production) but says nothing about which promotions are
//! legal; that is decided by `promotion::Transition`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A pipeline stage backed by its own revisioned store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[serde(rename = "trunk", alias = "working")]
    Working,
    Qa,
    Production,
}

impl Environment {
    /// All environments in promotion order.
    pub const ALL: [Environment; 3] = [Self::Working, Self::Qa, Self::Production];

    /// Branch name used in URLs and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Working => "trunk",
            Self::Qa => "qa",
            Self::Production => "production",
        }
    }

    /// Resolve a request parameter; anything unrecognised means Working.
    pub fn from_parameter(param: Option<&str>) -> Self {
        param
            .and_then(|p| p.parse().ok())
            .unwrap_or(Self::Working)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trunk" | "working" => Ok(Self::Working),
            "qa" => Ok(Self::Qa),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}
