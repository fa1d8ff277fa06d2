//! GitHub remote: the listing client, its wire types, and normalization
//! into the cached repository type.

pub mod api_types;
pub mod client;
pub mod types;

pub use api_types::RemoteRecord;
pub use client::GitHubClient;
pub use types::CachedRepository;
