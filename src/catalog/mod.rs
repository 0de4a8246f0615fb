//! Catalog access: HTTP client, request identities, payload types and the
//! cache-aware gateway.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use api_types::NamedResource;
pub use cached_client::CatalogGateway;
pub use client::{FetchError, FetchOptions, NetworkClient, ReqwestTransport};
pub use types::{EntityProfile, EntitySummary};
