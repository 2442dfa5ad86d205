//! Concrete provider clients and their raw document shapes.

pub mod metatft;
pub mod tacticstools;

use std::sync::Arc;

pub use metatft::{MetaTftClient, MetaTftPayload};
pub use tacticstools::{TacticsToolsClient, TacticsToolsPayload};

use crate::http_client::HttpClient;
use crate::provider::ProviderClient;
use crate::provider_policy::ProviderPolicy;
use crate::ProviderId;

/// Builds the client for `policy.provider_id` over `http_client`.
pub fn client_for(
    policy: ProviderPolicy,
    http_client: Arc<dyn HttpClient>,
) -> Arc<dyn ProviderClient> {
    match policy.provider_id {
        ProviderId::MetaTft => Arc::new(MetaTftClient::new(policy, http_client)),
        ProviderId::TacticsTools => Arc::new(TacticsToolsClient::new(policy, http_client)),
    }
}

/// Clients for every provider answering from bundled sample documents.
pub fn offline_clients() -> Vec<Arc<dyn ProviderClient>> {
    vec![
        Arc::new(MetaTftClient::offline()),
        Arc::new(TacticsToolsClient::offline()),
    ]
}
