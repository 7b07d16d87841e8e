//! Authentication: token issuance, token validation and peer identity.

pub mod jwks_client;
pub mod provider;
pub mod relying_party;
pub mod spiffe;
pub mod state;
pub mod types;

pub use provider::{OidcProvider, ProviderConfig, ProviderMetadata};
pub use relying_party::{DiscoveryDocument, OidcRelyingParty, RelyingPartyConfig};
pub use types::{Claims, Principal, TokenSet};
