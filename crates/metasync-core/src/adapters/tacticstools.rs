//! TacticsTools-shaped provider: camelCase documents wrapped in a `data`
//! envelope, with popularity figures grouped under a `stats` object.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::http_client::{FixtureHttpClient, HttpClient};
use crate::normalizer::{display_name, NormalizeError, NormalizeOptions};
use crate::provider::{FetchFailure, ProviderClient, ProviderTransport, RawPayload};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::RateLimitedQueue;
use crate::{Augment, AugmentTier, Champion, Domain, Item, Patch, ProviderId, TeamComp};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Average placement.
    #[serde(default)]
    pub placement: Option<f64>,
    /// Play rate, percent for comps and a 0..1 share for items and augments.
    #[serde(default)]
    pub frequency: Option<f64>,
    /// First-place rate, percent.
    #[serde(default)]
    pub top1: Option<f64>,
    #[serde(default)]
    pub games: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsComps {
    #[serde(default)]
    pub patch: Option<String>,
    pub comps: Vec<TacticsToolsComp>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsComp {
    pub id: String,
    pub name: String,
    pub units: Vec<TacticsToolsUnit>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub core_items: Vec<TacticsToolsItemRef>,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsUnit {
    pub champion_id: String,
    pub name: String,
    pub cost: u8,
    #[serde(default)]
    pub items: Vec<TacticsToolsItemRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsItemRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsItems {
    #[serde(default)]
    pub patch: Option<String>,
    pub items: Vec<TacticsToolsItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsItem {
    pub id: String,
    pub name: String,
    /// Component ids; empty for components themselves.
    #[serde(default)]
    pub composition: Vec<String>,
    #[serde(default)]
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsAugments {
    #[serde(default)]
    pub patch: Option<String>,
    pub augments: Vec<TacticsToolsAugment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticsToolsAugment {
    pub id: String,
    pub name: String,
    pub rarity: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub associated_traits: Vec<String>,
    #[serde(default)]
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TacticsToolsPayload {
    Comps(Envelope<TacticsToolsComps>),
    Items(Envelope<TacticsToolsItems>),
    Augments(Envelope<TacticsToolsAugments>),
}

impl TacticsToolsPayload {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Comps(_) => Domain::TeamComps,
            Self::Items(_) => Domain::Items,
            Self::Augments(_) => Domain::Augments,
        }
    }

    pub fn patch(&self) -> Option<&str> {
        match self {
            Self::Comps(envelope) => envelope.data.patch.as_deref(),
            Self::Items(envelope) => envelope.data.patch.as_deref(),
            Self::Augments(envelope) => envelope.data.patch.as_deref(),
        }
    }
}

pub(crate) fn team_comps(comps: &TacticsToolsComps, options: &NormalizeOptions) -> Vec<TeamComp> {
    comps
        .comps
        .iter()
        .map(|comp| TeamComp {
            id: comp.id.clone(),
            name: comp.name.clone(),
            units: comp
                .units
                .iter()
                .map(|unit| Champion {
                    id: unit.champion_id.clone(),
                    name: display_name(&unit.name, options),
                    cost: unit.cost,
                    items: unit.items.iter().map(|item| item_ref(item, options)).collect(),
                })
                .collect(),
            traits: comp.traits.iter().map(|name| display_name(name, options)).collect(),
            items: comp
                .core_items
                .iter()
                .map(|item| item_ref(item, options))
                .collect(),
            // Missing statistics are left out of range so validation reports them.
            avg_placement: comp.stats.placement.unwrap_or(0.0),
            play_rate: comp.stats.frequency.unwrap_or(0.0),
            win_rate: comp.stats.top1.unwrap_or(0.0),
            sample_size: comp.stats.games,
        })
        .collect()
}

fn item_ref(item: &TacticsToolsItemRef, options: &NormalizeOptions) -> Item {
    Item {
        id: item.id.clone(),
        name: display_name(item.name.as_deref().unwrap_or(&item.id), options),
        is_component: false,
        components: Vec::new(),
        frequency: None,
    }
}

pub(crate) fn items(items: &TacticsToolsItems, options: &NormalizeOptions) -> Vec<Item> {
    items
        .items
        .iter()
        .map(|item| Item {
            id: item.id.clone(),
            name: display_name(&item.name, options),
            is_component: item.composition.is_empty(),
            components: item.composition.clone(),
            frequency: item.stats.frequency,
        })
        .collect()
}

pub(crate) fn augments(
    augments: &TacticsToolsAugments,
    options: &NormalizeOptions,
) -> Result<Vec<Augment>, NormalizeError> {
    augments
        .augments
        .iter()
        .map(|augment| {
            let tier: AugmentTier =
                augment
                    .rarity
                    .parse()
                    .map_err(|tier| NormalizeError::UnknownTier {
                        id: augment.id.clone(),
                        tier,
                    })?;
            Ok(Augment {
                id: augment.id.clone(),
                name: display_name(&augment.name, options),
                tier,
                description: augment.description.clone(),
                synergies: augment
                    .associated_traits
                    .iter()
                    .map(|name| display_name(name, options))
                    .collect(),
                frequency: augment.stats.frequency,
            })
        })
        .collect()
}

/// TacticsTools client over the shared transport.
#[derive(Clone)]
pub struct TacticsToolsClient {
    transport: ProviderTransport,
}

impl TacticsToolsClient {
    pub fn new(policy: ProviderPolicy, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            transport: ProviderTransport::new(policy, http_client),
        }
    }

    pub fn with_queue(mut self, queue: RateLimitedQueue) -> Self {
        self.transport = self.transport.with_queue(queue);
        self
    }

    /// Client answering from the bundled sample documents.
    pub fn offline() -> Self {
        Self::new(ProviderPolicy::offline(ProviderId::TacticsTools), Arc::new(fixtures()))
    }

    pub fn transport(&self) -> &ProviderTransport {
        &self.transport
    }
}

impl ProviderClient for TacticsToolsClient {
    fn id(&self) -> ProviderId {
        ProviderId::TacticsTools
    }

    fn fetch<'a>(
        &'a self,
        domain: Domain,
        patch: Option<&'a Patch>,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FetchFailure>> + Send + 'a>> {
        Box::pin(async move {
            let payload = match domain {
                Domain::TeamComps => {
                    TacticsToolsPayload::Comps(self.transport.fetch_json(domain, patch).await?)
                }
                Domain::Items => {
                    TacticsToolsPayload::Items(self.transport.fetch_json(domain, patch).await?)
                }
                Domain::Augments => {
                    TacticsToolsPayload::Augments(self.transport.fetch_json(domain, patch).await?)
                }
            };
            Ok(RawPayload::TacticsTools(payload))
        })
    }
}

pub const FIXTURE_COMPS: &str = r#"{
  "data": {
    "patch": "14.1",
    "comps": [
      {
        "id": "rebel_yasuo",
        "name": "Rebel Yasuo",
        "units": [
          {"championId": "TFT11_Yasuo", "name": "Yasuo", "cost": 1, "items": [{"id": "TFT_Item_InfinityEdge", "name": "Infinity Edge"}]}
        ],
        "traits": ["Rebel"],
        "coreItems": [{"id": "TFT_Item_InfinityEdge", "name": "Infinity Edge"}],
        "stats": {"placement": 4.05, "frequency": 9.2, "top1": 15.3, "games": 20400}
      },
      {
        "id": "bruiser_sett",
        "name": "Bruiser Sett",
        "units": [
          {"championId": "TFT11_Sett", "name": "Sett", "cost": 4, "items": [{"id": "TFT_Item_WarmogsArmor"}]}
        ],
        "traits": ["Brawler"],
        "stats": {"placement": 4.6, "frequency": 3.3, "top1": 9.8}
      }
    ]
  }
}"#;

pub const FIXTURE_ITEMS: &str = r#"{
  "data": {
    "patch": "14.1",
    "items": [
      {"id": "TFT_Item_BFSword", "name": "B.F. Sword", "stats": {"frequency": 0.29}},
      {"id": "TFT_Item_SparringGloves", "name": "Sparring Gloves"},
      {"id": "TFT_Item_InfinityEdge", "name": "Infinity Edge", "composition": ["TFT_Item_BFSword", "TFT_Item_SparringGloves"], "stats": {"frequency": 0.25}},
      {"id": "TFT_Item_GuinsoosRageblade", "name": "Guinsoo's Rageblade", "composition": ["TFT_Item_RecurveBow", "TFT_Item_NeedlesslyLargeRod"], "stats": {"frequency": 0.18}}
    ]
  }
}"#;

pub const FIXTURE_AUGMENTS: &str = r#"{
  "data": {
    "patch": "14.1",
    "augments": [
      {"id": "TFT11_Augment_RebelCrest", "name": "Rebel Crest", "rarity": "gold", "description": "Gain a Rebel emblem.", "associatedTraits": ["Rebel"], "stats": {"frequency": 0.09}},
      {"id": "TFT11_Augment_ClearMind", "name": "Clear Mind", "rarity": "silver", "stats": {"frequency": 0.04}}
    ]
  }
}"#;

/// Offline transport serving the bundled sample documents.
pub fn fixtures() -> FixtureHttpClient {
    FixtureHttpClient::new()
        .with_body(Domain::TeamComps.endpoint_path(), FIXTURE_COMPS)
        .with_body(Domain::Items.endpoint_path(), FIXTURE_ITEMS)
        .with_body(Domain::Augments.endpoint_path(), FIXTURE_AUGMENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_client_decodes_every_domain() {
        let client = TacticsToolsClient::offline();

        for domain in Domain::ALL {
            let payload = client.fetch(domain, None).await.expect("fixture fetch");
            assert_eq!(payload.domain(), domain);
            assert_eq!(payload.patch(), Some("14.1"));
        }
    }

    #[test]
    fn composition_decides_component_flag() {
        let envelope: Envelope<TacticsToolsItems> =
            serde_json::from_str(FIXTURE_ITEMS).expect("fixture decodes");
        let items = items(&envelope.data, &NormalizeOptions::default());

        assert!(items[0].is_component);
        assert_eq!(items[0].frequency, Some(0.29));
        assert!(!items[2].is_component);
        assert_eq!(items[2].components.len(), 2);
    }

    #[test]
    fn stats_map_to_placement_and_rates() {
        let envelope: Envelope<TacticsToolsComps> =
            serde_json::from_str(FIXTURE_COMPS).expect("fixture decodes");
        let comps = team_comps(&envelope.data, &NormalizeOptions::default());

        assert_eq!(comps[0].avg_placement, 4.05);
        assert_eq!(comps[0].play_rate, 9.2);
        assert_eq!(comps[0].win_rate, 15.3);
        assert_eq!(comps[1].units[0].items[0].name, "WarmogsArmor");
    }

    #[test]
    fn unknown_rarity_is_rejected() {
        let envelope: Envelope<TacticsToolsAugments> = serde_json::from_str(
            r#"{"data":{"augments":[{"id":"x","name":"X","rarity":"hextech"}]}}"#,
        )
        .expect("decodes");

        let error = augments(&envelope.data, &NormalizeOptions::default()).expect_err("rarity");
        assert!(matches!(error, NormalizeError::UnknownTier { .. }));
    }
}
