//! MetaTFT-shaped provider: snake_case documents with flat arrays at the top
//! level and unit items given as bare ids.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::http_client::{FixtureHttpClient, HttpClient};
use crate::normalizer::{display_name, NormalizeError, NormalizeOptions};
use crate::provider::{FetchFailure, ProviderClient, ProviderTransport, RawPayload};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::RateLimitedQueue;
use crate::{
    Augment, AugmentTier, Champion, Domain, Item, Patch, ProviderId, TeamComp,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftCompsResponse {
    #[serde(default)]
    pub patch: Option<String>,
    pub comps: Vec<MetaTftComp>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftComp {
    pub comp_id: String,
    pub name: String,
    pub units: Vec<MetaTftUnit>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    pub avg_place: f64,
    pub play_rate: f64,
    pub win_rate: f64,
    #[serde(default)]
    pub games: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftUnit {
    pub character_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cost: u8,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftItemsResponse {
    #[serde(default)]
    pub patch: Option<String>,
    pub items: Vec<MetaTftItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftItem {
    pub item_id: String,
    pub name: String,
    pub is_component: bool,
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftAugmentsResponse {
    #[serde(default)]
    pub patch: Option<String>,
    pub augments: Vec<MetaTftAugment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaTftAugment {
    pub augment_id: String,
    pub name: String,
    /// 1 silver, 2 gold, 3 prismatic.
    pub tier: u8,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaTftPayload {
    Comps(MetaTftCompsResponse),
    Items(MetaTftItemsResponse),
    Augments(MetaTftAugmentsResponse),
}

impl MetaTftPayload {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Comps(_) => Domain::TeamComps,
            Self::Items(_) => Domain::Items,
            Self::Augments(_) => Domain::Augments,
        }
    }

    pub fn patch(&self) -> Option<&str> {
        match self {
            Self::Comps(response) => response.patch.as_deref(),
            Self::Items(response) => response.patch.as_deref(),
            Self::Augments(response) => response.patch.as_deref(),
        }
    }
}

pub(crate) fn team_comps(
    response: &MetaTftCompsResponse,
    options: &NormalizeOptions,
) -> Vec<TeamComp> {
    response
        .comps
        .iter()
        .map(|comp| TeamComp {
            id: comp.comp_id.clone(),
            name: comp.name.clone(),
            units: comp
                .units
                .iter()
                .map(|unit| Champion {
                    id: unit.character_id.clone(),
                    name: display_name(
                        unit.name.as_deref().unwrap_or(&unit.character_id),
                        options,
                    ),
                    cost: unit.cost,
                    items: unit.items.iter().map(|id| unit_item(id, options)).collect(),
                })
                .collect(),
            traits: comp.traits.iter().map(|name| display_name(name, options)).collect(),
            items: comp.items.iter().map(|id| unit_item(id, options)).collect(),
            avg_placement: comp.avg_place,
            play_rate: comp.play_rate,
            win_rate: comp.win_rate,
            sample_size: comp.games,
        })
        .collect()
}

// Equipped items arrive as ids only; recipes live in the item catalog.
fn unit_item(id: &str, options: &NormalizeOptions) -> Item {
    Item {
        id: id.to_owned(),
        name: display_name(id, options),
        is_component: false,
        components: Vec::new(),
        frequency: None,
    }
}

pub(crate) fn items(response: &MetaTftItemsResponse, options: &NormalizeOptions) -> Vec<Item> {
    response
        .items
        .iter()
        .map(|item| Item {
            id: item.item_id.clone(),
            name: display_name(&item.name, options),
            is_component: item.is_component,
            components: item.from.clone(),
            frequency: item.frequency,
        })
        .collect()
}

pub(crate) fn augments(
    response: &MetaTftAugmentsResponse,
    options: &NormalizeOptions,
) -> Result<Vec<Augment>, NormalizeError> {
    response
        .augments
        .iter()
        .map(|augment| {
            let tier = AugmentTier::from_rank(augment.tier).ok_or_else(|| {
                NormalizeError::UnknownTier {
                    id: augment.augment_id.clone(),
                    tier: augment.tier.to_string(),
                }
            })?;
            Ok(Augment {
                id: augment.augment_id.clone(),
                name: display_name(&augment.name, options),
                tier,
                description: augment.desc.clone(),
                synergies: augment
                    .traits
                    .iter()
                    .map(|name| display_name(name, options))
                    .collect(),
                frequency: augment.frequency,
            })
        })
        .collect()
}

/// MetaTFT client over the shared transport.
#[derive(Clone)]
pub struct MetaTftClient {
    transport: ProviderTransport,
}

impl MetaTftClient {
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
        Self::new(ProviderPolicy::offline(ProviderId::MetaTft), Arc::new(fixtures()))
    }

    pub fn transport(&self) -> &ProviderTransport {
        &self.transport
    }
}

impl ProviderClient for MetaTftClient {
    fn id(&self) -> ProviderId {
        ProviderId::MetaTft
    }

    fn fetch<'a>(
        &'a self,
        domain: Domain,
        patch: Option<&'a Patch>,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FetchFailure>> + Send + 'a>> {
        Box::pin(async move {
            let payload = match domain {
                Domain::TeamComps => {
                    MetaTftPayload::Comps(self.transport.fetch_json(domain, patch).await?)
                }
                Domain::Items => {
                    MetaTftPayload::Items(self.transport.fetch_json(domain, patch).await?)
                }
                Domain::Augments => {
                    MetaTftPayload::Augments(self.transport.fetch_json(domain, patch).await?)
                }
            };
            Ok(RawPayload::MetaTft(payload))
        })
    }
}

pub const FIXTURE_COMPS: &str = r#"{
  "patch": "14.1",
  "comps": [
    {
      "comp_id": "rebel_yasuo",
      "name": "Rebel Yasuo",
      "units": [
        {"character_id": "TFT11_Yasuo", "cost": 1, "items": ["TFT_Item_InfinityEdge", "TFT_Item_Bloodthirster"]},
        {"character_id": "TFT11_Sett", "cost": 4, "items": ["TFT_Item_WarmogsArmor"]}
      ],
      "traits": ["TFT11_Rebel", "TFT11_Brawler"],
      "items": ["TFT_Item_InfinityEdge"],
      "avg_place": 4.12,
      "play_rate": 8.4,
      "win_rate": 14.9,
      "games": 18250
    },
    {
      "comp_id": "sage_ahri",
      "name": "Sage Ahri",
      "units": [
        {"character_id": "TFT11_Ahri", "name": "Ahri", "cost": 2, "items": ["TFT_Item_JeweledGauntlet"]}
      ],
      "traits": ["TFT11_Sage"],
      "avg_place": 4.48,
      "play_rate": 5.1,
      "win_rate": 11.2
    }
  ]
}"#;

pub const FIXTURE_ITEMS: &str = r#"{
  "patch": "14.1",
  "items": [
    {"item_id": "TFT_Item_BFSword", "name": "TFT_Item_BFSword", "is_component": true, "frequency": 0.31},
    {"item_id": "TFT_Item_RecurveBow", "name": "TFT_Item_RecurveBow", "is_component": true},
    {"item_id": "TFT_Item_ChainVest", "name": "TFT_Item_ChainVest", "is_component": true},
    {"item_id": "TFT_Item_GiantsBelt", "name": "TFT_Item_GiantsBelt", "is_component": true},
    {"item_id": "TFT_Item_SparringGloves", "name": "TFT_Item_SparringGloves", "is_component": true},
    {"item_id": "TFT_Item_NeedlesslyLargeRod", "name": "TFT_Item_NeedlesslyLargeRod", "is_component": true},
    {"item_id": "TFT_Item_NegatronCloak", "name": "TFT_Item_NegatronCloak", "is_component": true},
    {"item_id": "TFT_Item_InfinityEdge", "name": "TFT_Item_InfinityEdge", "is_component": false, "from": ["TFT_Item_BFSword", "TFT_Item_SparringGloves"], "frequency": 0.22},
    {"item_id": "TFT_Item_Bloodthirster", "name": "TFT_Item_Bloodthirster", "is_component": false, "from": ["TFT_Item_BFSword", "TFT_Item_NegatronCloak"]},
    {"item_id": "TFT_Item_WarmogsArmor", "name": "TFT_Item_WarmogsArmor", "is_component": false, "from": ["TFT_Item_GiantsBelt", "TFT_Item_GiantsBelt"]}
  ]
}"#;

pub const FIXTURE_AUGMENTS: &str = r#"{
  "patch": "14.1",
  "augments": [
    {"augment_id": "TFT11_Augment_RebelCrest", "name": "TFT11_Augment_Rebel_Crest", "tier": 2, "desc": "Gain a Rebel emblem.", "traits": ["TFT11_Rebel"], "frequency": 0.07},
    {"augment_id": "TFT11_Augment_PandorasItems", "name": "TFT11_Augment_Pandoras_Items", "tier": 1, "traits": []},
    {"augment_id": "TFT11_Augment_LevelUp", "name": "TFT11_Augment_Level_Up", "tier": 3, "desc": "Gain 4 XP per round."}
  ]
}"#;

/// Offline transport serving the bundled sample documents.
pub fn fixtures() -> FixtureHttpClient {
    FixtureHttpClient::new()
        .with_body(Domain::TeamComps.endpoint_path(), FIXTURE_COMPS)
        .with_body(Domain::Items.endpoint_path(), FIXTURE_ITEMS)
        .with_body(Domain::Augments.endpoint_path(), FIXTURE_AUGMENTS)
}
