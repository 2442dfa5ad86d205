use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Item as equipped on a unit or listed in the item catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub is_component: bool,
    /// Component ids a completed item is built from; empty for components.
    #[serde(default)]
    pub components: Vec<String>,
    /// Provider-reported usage, consulted only when merging sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

impl Item {
    pub fn component(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_component: true,
            components: Vec::new(),
            frequency: None,
        }
    }

    pub fn completed(
        id: impl Into<String>,
        name: impl Into<String>,
        components: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_component: false,
            components,
            frequency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Champion {
    pub id: String,
    pub name: String,
    /// Shop cost, 1 through 5.
    pub cost: u8,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentTier {
    Silver,
    Gold,
    Prismatic,
}

impl AugmentTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Prismatic => "prismatic",
        }
    }

    /// Numeric tiers as some providers report them.
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(Self::Silver),
            2 => Some(Self::Gold),
            3 => Some(Self::Prismatic),
            _ => None,
        }
    }
}

impl Display for AugmentTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AugmentTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "prismatic" => Ok(Self::Prismatic),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Augment {
    pub id: String,
    pub name: String,
    pub tier: AugmentTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub synergies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamComp {
    pub id: String,
    pub name: String,
    pub units: Vec<Champion>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Average finishing placement, 1.0 (best) to 8.0.
    pub avg_placement: f64,
    /// Percentage of games, 0 to 100.
    pub play_rate: f64,
    /// Percentage of first-place finishes, 0 to 100.
    pub win_rate: f64,
    /// Games observed, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u64>,
}
