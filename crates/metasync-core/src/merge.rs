use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    Augment, Canonical, DataModel, Dataset, Domain, Item, ModelMetadata, Source, TeamComp,
    UtcDateTime, ValidationError, SCHEMA_VERSION,
};

/// How colliding ids from different providers are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Prefer the record with the larger sample weight; equal or absent
    /// weights fall back to provider precedence.
    #[default]
    SampleWeight,
    /// The earliest provider in precedence order always wins.
    Precedence,
}

impl MergeStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SampleWeight => "sample-weight",
            Self::Precedence => "precedence",
        }
    }
}

impl Display for MergeStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sample-weight" | "sample_weight" | "weight" => Ok(Self::SampleWeight),
            "precedence" => Ok(Self::Precedence),
            other => Err(ValidationError::InvalidMergeStrategy {
                value: other.to_owned(),
            }),
        }
    }
}

/// Merges per-provider record lists, given in precedence order, by id.
///
/// Every id seen in any list appears exactly once in the output, in order of
/// first appearance.
pub fn merge_by_id<T: Canonical>(sources: Vec<Vec<T>>, strategy: MergeStrategy) -> Vec<T> {
    let mut merged: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in sources.into_iter().flatten() {
        match positions.get(record.id()).copied() {
            None => {
                positions.insert(record.id().to_owned(), merged.len());
                merged.push(record);
            }
            Some(index) => {
                if strategy == MergeStrategy::SampleWeight
                    && outweighs(record.sample_weight(), merged[index].sample_weight())
                {
                    merged[index] = record;
                }
            }
        }
    }

    merged
}

/// Merges per-provider models of one domain into a `combined` model.
///
/// The merged metadata carries the first patch any provider reported.
pub fn merge_datasets(domain: Domain, datasets: Vec<Dataset>, strategy: MergeStrategy) -> Dataset {
    let metadata = ModelMetadata {
        source: Source::Combined,
        timestamp: UtcDateTime::now(),
        patch: datasets
            .iter()
            .find_map(|dataset| dataset.metadata().patch.clone()),
        schema_version: String::from(SCHEMA_VERSION),
    };

    match domain {
        Domain::TeamComps => merge_typed::<TeamComp>(datasets, strategy, metadata),
        Domain::Items => merge_typed::<Item>(datasets, strategy, metadata),
        Domain::Augments => merge_typed::<Augment>(datasets, strategy, metadata),
    }
}

fn merge_typed<T: Canonical>(
    datasets: Vec<Dataset>,
    strategy: MergeStrategy,
    metadata: ModelMetadata,
) -> Dataset {
    let sources = datasets
        .into_iter()
        .filter_map(T::from_dataset)
        .map(|model| model.data)
        .collect();

    T::into_dataset(DataModel {
        data: merge_by_id(sources, strategy),
        metadata,
    })
}

fn outweighs(challenger: Option<f64>, incumbent: Option<f64>) -> bool {
    match (challenger, incumbent) {
        (Some(challenger), Some(incumbent)) => challenger > incumbent,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Item;

    fn item(id: &str, name: &str, frequency: Option<f64>) -> Item {
        Item {
            frequency,
            ..Item::component(id, name)
        }
    }

    #[test]
    fn reported_weight_beats_missing_weight() {
        let merged = merge_by_id(
            vec![
                vec![item("x", "Old", None)],
                vec![item("x", "New", Some(0.4))],
            ],
            MergeStrategy::SampleWeight,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "New");
    }

    #[test]
    fn ties_and_precedence_keep_earlier_provider() {
        let sources = vec![
            vec![item("x", "First", Some(0.5)), item("a", "Only A", None)],
            vec![item("x", "Second", Some(0.5)), item("b", "Only B", None)],
        ];

        let weighted = merge_by_id(sources, MergeStrategy::SampleWeight);
        assert_eq!(weighted[0].name, "First");

        let ordered = merge_by_id(
            vec![
                vec![item("x", "First", Some(0.1))],
                vec![item("x", "Second", Some(0.9))],
            ],
            MergeStrategy::Precedence,
        );
        assert_eq!(ordered[0].name, "First");

        let ids: Vec<&str> = weighted.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "a", "b"]);
    }

    #[test]
    fn dataset_merge_stamps_combined_metadata() {
        let model = |name: &str, frequency, patch: Option<&str>| {
            Dataset::Items(DataModel {
                data: vec![item("x", name, frequency)],
                metadata: ModelMetadata {
                    source: Source::Provider(crate::ProviderId::MetaTft),
                    timestamp: UtcDateTime::now(),
                    patch: patch.map(str::to_owned),
                    schema_version: String::from(SCHEMA_VERSION),
                },
            })
        };

        let merged = merge_datasets(
            Domain::Items,
            vec![model("Old", None, None), model("New", Some(0.2), Some("14.1"))],
            MergeStrategy::SampleWeight,
        );

        assert_eq!(merged.metadata().source, Source::Combined);
        assert_eq!(merged.metadata().patch.as_deref(), Some("14.1"));
        let Dataset::Items(model) = merged else {
            panic!("expected items");
        };
        assert_eq!(model.data.len(), 1);
        assert_eq!(model.data[0].name, "New");
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("precedence".parse::<MergeStrategy>(), Ok(MergeStrategy::Precedence));
        assert_eq!("Sample-Weight".parse::<MergeStrategy>(), Ok(MergeStrategy::SampleWeight));
        assert!("newest".parse::<MergeStrategy>().is_err());
    }
}
