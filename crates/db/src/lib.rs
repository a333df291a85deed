pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_storage, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    ChatTranscripts, InMemoryKeyValueStore, KeyValueStore, QuoteStore, RepositoryError,
    SqlKeyValueStore, TenderStore,
};
