use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Augment, Item, Source, TeamComp, UtcDateTime, ValidationError};

/// Version stamped on every model the normalizer produces.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Kind of data a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "teamComps")]
    TeamComps,
    #[serde(rename = "items")]
    Items,
    #[serde(rename = "augments")]
    Augments,
}

impl Domain {
    pub const ALL: [Self; 3] = [Self::TeamComps, Self::Items, Self::Augments];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TeamComps => "teamComps",
            Self::Items => "items",
            Self::Augments => "augments",
        }
    }

    /// Path segment providers serve this domain under.
    pub const fn endpoint_path(self) -> &'static str {
        match self {
            Self::TeamComps => "comps",
            Self::Items => "items",
            Self::Augments => "augments",
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teamcomps" | "team-comps" | "comps" => Ok(Self::TeamComps),
            "items" => Ok(Self::Items),
            "augments" => Ok(Self::Augments),
            other => Err(ValidationError::InvalidDomain {
                value: other.to_owned(),
            }),
        }
    }
}

/// Game patch identifier, or the `latest` alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Patch(String);

impl Patch {
    pub const LATEST: &'static str = "latest";

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }

        if let Some(ch) = value
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')))
        {
            return Err(ValidationError::InvalidPatchChar { ch });
        }

        Ok(Self(value.to_owned()))
    }

    pub fn latest() -> Self {
        Self(String::from(Self::LATEST))
    }

    pub fn is_latest(&self) -> bool {
        self.0 == Self::LATEST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Patch {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Patch {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Patch> for String {
    fn from(value: Patch) -> Self {
        value.0
    }
}

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub domain: Domain,
    pub source: Source,
    pub patch: Patch,
}

impl CacheKey {
    pub fn new(domain: Domain, source: Source, patch: Patch) -> Self {
        Self {
            domain,
            source,
            patch,
        }
    }

    /// Same domain and source under a different patch.
    pub fn with_patch(&self, patch: Patch) -> Self {
        Self {
            patch,
            ..self.clone()
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.source, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub source: Source,
    pub timestamp: UtcDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub schema_version: String,
}

/// Canonical entities plus the metadata of the sync that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel<T> {
    pub data: Vec<T>,
    pub metadata: ModelMetadata,
}

/// A model of any domain. Lets caches and in-flight fetches hold mixed domains.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    TeamComps(DataModel<TeamComp>),
    Items(DataModel<Item>),
    Augments(DataModel<Augment>),
}

impl Dataset {
    pub const fn domain(&self) -> Domain {
        match self {
            Self::TeamComps(_) => Domain::TeamComps,
            Self::Items(_) => Domain::Items,
            Self::Augments(_) => Domain::Augments,
        }
    }

    pub const fn metadata(&self) -> &ModelMetadata {
        match self {
            Self::TeamComps(model) => &model.metadata,
            Self::Items(model) => &model.metadata,
            Self::Augments(model) => &model.metadata,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::TeamComps(model) => model.data.len(),
            Self::Items(model) => model.data.len(),
            Self::Augments(model) => model.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::TeamComps(model) => serde_json::to_string(model),
            Self::Items(model) => serde_json::to_string(model),
            Self::Augments(model) => serde_json::to_string(model),
        }
    }

    pub fn from_json(domain: Domain, payload: &str) -> Result<Self, serde_json::Error> {
        Ok(match domain {
            Domain::TeamComps => Self::TeamComps(serde_json::from_str(payload)?),
            Domain::Items => Self::Items(serde_json::from_str(payload)?),
            Domain::Augments => Self::Augments(serde_json::from_str(payload)?),
        })
    }
}

/// Canonical entity bound to its domain.
pub trait Canonical: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const DOMAIN: Domain;

    fn id(&self) -> &str;

    /// Provider-reported popularity used to arbitrate merges.
    fn sample_weight(&self) -> Option<f64>;

    fn into_dataset(model: DataModel<Self>) -> Dataset;

    fn from_dataset(dataset: Dataset) -> Option<DataModel<Self>>;
}

impl Canonical for TeamComp {
    const DOMAIN: Domain = Domain::TeamComps;

    fn id(&self) -> &str {
        &self.id
    }

    fn sample_weight(&self) -> Option<f64> {
        Some(self.play_rate)
    }

    fn into_dataset(model: DataModel<Self>) -> Dataset {
        Dataset::TeamComps(model)
    }

    fn from_dataset(dataset: Dataset) -> Option<DataModel<Self>> {
        match dataset {
            Dataset::TeamComps(model) => Some(model),
            _ => None,
        }
    }
}

impl Canonical for Item {
    const DOMAIN: Domain = Domain::Items;

    fn id(&self) -> &str {
        &self.id
    }

    fn sample_weight(&self) -> Option<f64> {
        self.frequency
    }

    fn into_dataset(model: DataModel<Self>) -> Dataset {
        Dataset::Items(model)
    }

    fn from_dataset(dataset: Dataset) -> Option<DataModel<Self>> {
        match dataset {
            Dataset::Items(model) => Some(model),
            _ => None,
        }
    }
}

impl Canonical for Augment {
    const DOMAIN: Domain = Domain::Augments;

    fn id(&self) -> &str {
        &self.id
    }

    fn sample_weight(&self) -> Option<f64> {
        self.frequency
    }

    fn into_dataset(model: DataModel<Self>) -> Dataset {
        Dataset::Augments(model)
    }

    fn from_dataset(dataset: Dataset) -> Option<DataModel<Self>> {
        match dataset {
            Dataset::Augments(model) => Some(model),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderId;

    #[test]
    fn domain_parses_aliases() {
        assert_eq!("teamComps".parse::<Domain>(), Ok(Domain::TeamComps));
        assert_eq!("comps".parse::<Domain>(), Ok(Domain::TeamComps));
        assert!("units".parse::<Domain>().is_err());
    }

    #[test]
    fn patch_rejects_separators() {
        assert_eq!(Patch::parse("14.1").map(|p| p.to_string()), Ok(String::from("14.1")));
        assert_eq!(Patch::parse(" "), Err(ValidationError::EmptyPatch));
        assert_eq!(
            Patch::parse("14/1"),
            Err(ValidationError::InvalidPatchChar { ch: '/' })
        );
        assert!(Patch::latest().is_latest());
    }

    #[test]
    fn dataset_json_keeps_domain_shape() {
        let model = DataModel {
            data: vec![Item::component("bf", "B.F. Sword")],
            metadata: ModelMetadata {
                source: Source::Provider(ProviderId::MetaTft),
                timestamp: UtcDateTime::parse("2024-01-01T00:00:00Z").expect("timestamp"),
                patch: Some(String::from("14.1")),
                schema_version: String::from(SCHEMA_VERSION),
            },
        };
        let dataset = Item::into_dataset(model.clone());

        let json = dataset.to_json().expect("serialize");
        assert!(json.contains("\"schemaVersion\":\"1.0.0\""));
        assert!(json.contains("\"source\":\"metatft\""));

        let back = Dataset::from_json(Domain::Items, &json).expect("deserialize");
        assert_eq!(Item::from_dataset(back), Some(model));
    }
}
