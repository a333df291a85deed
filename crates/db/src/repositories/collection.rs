//! JSON array documents stored under a single key.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{KeyValueStore, RepositoryError};

/// Reads the array stored under `key`. A missing key and an unparseable value
/// both read as empty; the latter is logged and overwritten by the next write.
pub async fn load_collection<T: DeserializeOwned>(
    storage: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<T>, RepositoryError> {
    let Some(raw) = storage.get(key).await? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(records) => Ok(records),
        Err(error) => {
            tracing::warn!(
                event_name = "storage.parse_failed",
                key,
                error = %error,
                "stored collection is not valid JSON; treating it as empty"
            );
            Ok(Vec::new())
        }
    }
}

pub async fn store_collection<T: Serialize>(
    storage: &dyn KeyValueStore,
    key: &str,
    records: &[T],
) -> Result<(), RepositoryError> {
    let encoded = serde_json::to_string(records)?;
    storage.set(key, encoded).await
}

#[cfg(test)]
mod tests {
    use super::{load_collection, store_collection};
    use crate::repositories::{InMemoryKeyValueStore, KeyValueStore};

    #[tokio::test]
    async fn corrupt_document_reads_as_empty() {
        let storage = InMemoryKeyValueStore::with_entries([("tenders", "{not json")]);
        let records: Vec<String> = load_collection(&storage, "tenders").await.expect("load");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn stored_records_keep_their_order() {
        let storage = InMemoryKeyValueStore::default();
        let records = vec!["b".to_owned(), "a".to_owned(), "c".to_owned()];
        store_collection(&storage, "letters", &records).await.expect("store");

        let raw = storage.get("letters").await.expect("get");
        assert_eq!(raw.as_deref(), Some(r#"["b","a","c"]"#));
        let loaded: Vec<String> = load_collection(&storage, "letters").await.expect("load");
        assert_eq!(loaded, records);
    }
}
