//! Maps provider payloads onto the canonical model.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::adapters::{metatft, tacticstools, MetaTftPayload, TacticsToolsPayload};
use crate::provider::RawPayload;
use crate::{
    Canonical, DataModel, Dataset, Domain, ModelMetadata, Source, UtcDateTime, SCHEMA_VERSION,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("expected a {expected} payload, got {actual}")]
    DomainMismatch { expected: Domain, actual: Domain },
    #[error("augment '{id}' has unknown tier '{tier}'")]
    UnknownTier { id: String, tier: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Strip game-internal prefixes and title-case names.
    pub normalize_names: bool,
    /// Stamped into the model metadata.
    pub source: Source,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            normalize_names: true,
            source: Source::Combined,
        }
    }
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(TFT\d+_Augment_|TFT_Item_|TFT\d+_)").expect("prefix pattern is valid")
    })
}

/// `TFT11_Augment_Rebel_Crest` becomes `Rebel Crest`.
pub fn normalize_name(raw: &str) -> String {
    let stripped = prefix_pattern().replace(raw, "");
    stripped
        .replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) fn display_name(raw: &str, options: &NormalizeOptions) -> String {
    if options.normalize_names {
        normalize_name(raw)
    } else {
        raw.to_owned()
    }
}

/// Stateless payload mapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Normalizes `raw` into `T`'s domain.
    pub fn normalize<T: Canonical>(
        raw: &RawPayload,
        options: &NormalizeOptions,
    ) -> Result<DataModel<T>, NormalizeError> {
        let dataset = Self::normalize_dataset(T::DOMAIN, raw, options)?;
        T::from_dataset(dataset).ok_or(NormalizeError::DomainMismatch {
            expected: T::DOMAIN,
            actual: raw.domain(),
        })
    }

    /// Normalizes `raw`, failing when it does not hold `domain`.
    pub fn normalize_dataset(
        domain: Domain,
        raw: &RawPayload,
        options: &NormalizeOptions,
    ) -> Result<Dataset, NormalizeError> {
        if raw.domain() != domain {
            return Err(NormalizeError::DomainMismatch {
                expected: domain,
                actual: raw.domain(),
            });
        }

        let metadata = ModelMetadata {
            source: options.source,
            timestamp: UtcDateTime::now(),
            patch: raw.patch().map(str::to_owned),
            schema_version: String::from(SCHEMA_VERSION),
        };

        let dataset = match raw {
            RawPayload::MetaTft(MetaTftPayload::Comps(response)) => Dataset::TeamComps(DataModel {
                data: metatft::team_comps(response, options),
                metadata,
            }),
            RawPayload::MetaTft(MetaTftPayload::Items(response)) => Dataset::Items(DataModel {
                data: metatft::items(response, options),
                metadata,
            }),
            RawPayload::MetaTft(MetaTftPayload::Augments(response)) => {
                Dataset::Augments(DataModel {
                    data: metatft::augments(response, options)?,
                    metadata,
                })
            }
            RawPayload::TacticsTools(TacticsToolsPayload::Comps(envelope)) => {
                Dataset::TeamComps(DataModel {
                    data: tacticstools::team_comps(&envelope.data, options),
                    metadata,
                })
            }
            RawPayload::TacticsTools(TacticsToolsPayload::Items(envelope)) => {
                Dataset::Items(DataModel {
                    data: tacticstools::items(&envelope.data, options),
                    metadata,
                })
            }
            RawPayload::TacticsTools(TacticsToolsPayload::Augments(envelope)) => {
                Dataset::Augments(DataModel {
                    data: tacticstools::augments(&envelope.data, options)?,
                    metadata,
                })
            }
        };

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::metatft::{MetaTftItemsResponse, FIXTURE_ITEMS};
    use crate::{Item, ProviderId, TeamComp};

    fn items_payload() -> RawPayload {
        let response: MetaTftItemsResponse =
            serde_json::from_str(FIXTURE_ITEMS).expect("fixture decodes");
        RawPayload::MetaTft(MetaTftPayload::Items(response))
    }

    #[test]
    fn strips_known_prefixes() {
        assert_eq!(normalize_name("TFT11_Augment_Rebel_Crest"), "Rebel Crest");
        assert_eq!(normalize_name("TFT_Item_Infinity_Edge"), "Infinity Edge");
        assert_eq!(normalize_name("TFT9_Ahri"), "Ahri");
        assert_eq!(normalize_name("Infinity Edge"), "Infinity Edge");
        assert_eq!(normalize_name("spatula"), "Spatula");
    }

    #[test]
    fn prefix_is_only_stripped_at_start() {
        assert_eq!(normalize_name("Crest_TFT9_Rebel"), "Crest TFT9 Rebel");
    }

    #[test]
    fn normalizing_twice_yields_identical_data() {
        let options = NormalizeOptions {
            normalize_names: true,
            source: Source::Provider(ProviderId::MetaTft),
        };
        let raw = items_payload();

        let first = Normalizer::normalize::<Item>(&raw, &options).expect("first");
        let second = Normalizer::normalize::<Item>(&raw, &options).expect("second");

        assert_eq!(first.data, second.data);
        assert_eq!(first.metadata.patch.as_deref(), Some("14.1"));
        assert_eq!(first.metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(first.metadata.source, Source::Provider(ProviderId::MetaTft));
        assert_eq!(first.data[0].name, "BFSword");
    }

    #[test]
    fn names_are_kept_when_normalization_is_off() {
        let options = NormalizeOptions {
            normalize_names: false,
            ..NormalizeOptions::default()
        };
        let model = Normalizer::normalize::<Item>(&items_payload(), &options).expect("items");
        assert_eq!(model.data[0].name, "TFT_Item_BFSword");
    }

    #[test]
    fn domain_mismatch_is_an_error() {
        let error = Normalizer::normalize::<TeamComp>(&items_payload(), &NormalizeOptions::default())
            .expect_err("items payload is not comps");

        assert_eq!(
            error,
            NormalizeError::DomainMismatch {
                expected: Domain::TeamComps,
                actual: Domain::Items,
            }
        );
    }
}
