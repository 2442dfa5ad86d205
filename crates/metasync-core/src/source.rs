use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream providers with their own clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "metatft")]
    MetaTft,
    #[serde(rename = "tacticstools")]
    TacticsTools,
}

impl ProviderId {
    /// Precedence order used when merging sources.
    pub const ALL: [Self; 2] = [Self::MetaTft, Self::TacticsTools];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetaTft => "metatft",
            Self::TacticsTools => "tacticstools",
        }
    }

    /// Prefix of the `METASYNC_<PREFIX>_*` environment variables.
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::MetaTft => "METATFT",
            Self::TacticsTools => "TACTICSTOOLS",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "metatft" => Ok(Self::MetaTft),
            "tacticstools" => Ok(Self::TacticsTools),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Where a model came from: one provider, or the merge of all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    Provider(ProviderId),
    Combined,
}

impl Source {
    pub const ALL: [Self; 3] = [
        Self::Provider(ProviderId::MetaTft),
        Self::Provider(ProviderId::TacticsTools),
        Self::Combined,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider(provider) => provider.as_str(),
            Self::Combined => "combined",
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("combined") {
            return Ok(Self::Combined);
        }
        value.parse().map(Self::Provider)
    }
}

impl From<ProviderId> for Source {
    fn from(value: ProviderId) -> Self {
        Self::Provider(value)
    }
}

impl TryFrom<String> for Source {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Source> for String {
    fn from(value: Source) -> Self {
        value.as_str().to_owned()
    }
}
