//! Durable collections under a local directory.
//!
//! Layout: `<root>/<collection>/collection.json` holds the collection
//! descriptor and `<root>/<collection>/records.json` the records in insertion
//! order. Everything is loaded on open and each mutation rewrites the affected
//! files through a temporary file and a rename.

use super::{
    validate_collection_name, validate_upsert, Collection, DistanceMetric, Metadata, QueryHit,
    Record, VectorStore,
};
use crate::error::RagError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const COLLECTION_FILE: &str = "collection.json";
const RECORDS_FILE: &str = "records.json";

#[derive(Debug)]
struct StoredCollection {
    collection: Collection,
    records: Vec<Record>,
}

pub struct LocalStore {
    root: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
    collections: RwLock<BTreeMap<String, StoredCollection>>,
}

impl LocalStore {
    /// Opens (creating if needed) the storage root and loads every collection
    /// found in it. `dimension` and `metric` apply to collections created
    /// later; existing collections keep their persisted settings.
    pub async fn open(
        root: impl AsRef<Path>,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|error| {
            RagError::StoreUnavailable(format!(
                "cannot create storage directory {}: {error}",
                root.display()
            ))
        })?;

        let mut collections = BTreeMap::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let descriptor = entry.path().join(COLLECTION_FILE);
            if !fs::try_exists(&descriptor).await? {
                continue;
            }

            let stored = match load_collection(&entry.path()).await {
                Ok(stored) => stored,
                Err(error) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %error,
                        "skipping unreadable collection"
                    );
                    continue;
                }
            };
            debug!(
                collection = %stored.collection.name,
                records = stored.records.len(),
                "loaded collection"
            );
            collections.insert(stored.collection.name.clone(), stored);
        }

        info!(path = %root.display(), collections = collections.len(), "local vector store opened");
        Ok(Self {
            root,
            dimension,
            metric,
            collections: RwLock::new(collections),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn persist_records(&self, name: &str, records: &[Record]) -> Result<(), RagError> {
        write_json_atomic(&self.collection_dir(name).join(RECORDS_FILE), records).await
    }
}

async fn load_collection(dir: &Path) -> Result<StoredCollection, RagError> {
    let descriptor = fs::read(dir.join(COLLECTION_FILE)).await?;
    let collection: Collection = serde_json::from_slice(&descriptor)?;

    let records = match fs::read(dir.join(RECORDS_FILE)).await {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
        Err(error) => return Err(error.into()),
    };

    Ok(StoredCollection {
        collection,
        records,
    })
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RagError> {
    let bytes = serde_json::to_vec(value)?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await?;
    Ok(())
}

fn missing_collection(name: &str) -> RagError {
    RagError::StoreUnavailable(format!("collection '{name}' does not exist"))
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, RagError> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            debug!(collection = name, "collection retrieved");
            return Ok(existing.collection.clone());
        }

        let collection = Collection {
            name: name.to_string(),
            dimension: self.dimension,
            metric: self.metric,
        };
        let dir = self.collection_dir(name);
        fs::create_dir_all(&dir).await?;
        write_json_atomic(&dir.join(COLLECTION_FILE), &collection).await?;
        write_json_atomic(&dir.join(RECORDS_FILE), &Vec::<Record>::new()).await?;

        info!(collection = name, dimension = self.dimension, "created collection");
        collections.insert(
            name.to_string(),
            StoredCollection {
                collection: collection.clone(),
                records: Vec::new(),
            },
        );
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>, RagError> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|stored| stored.collection.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, RagError> {
        let collections = self.collections.read().await;
        Ok(collections
            .values()
            .map(|stored| stored.collection.clone())
            .collect())
    }

    async fn upsert(
        &self,
        collection: &Collection,
        ids: &[String],
        embeddings: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), RagError> {
        validate_upsert(collection, ids, embeddings, documents, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection.name)
            .ok_or_else(|| missing_collection(&collection.name))?;

        // Staged on a copy so a failed write leaves memory matching disk.
        let mut records = stored.records.clone();
        let mut positions: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect();

        let mut overwritten = 0usize;
        for (((id, embedding), document), metadata) in
            ids.iter().zip(embeddings).zip(documents).zip(metadatas)
        {
            let record = Record {
                id: id.clone(),
                embedding: embedding.clone(),
                document: document.clone(),
                metadata: metadata.clone(),
            };

            match positions.get(id) {
                Some(&position) => {
                    records[position] = record;
                    overwritten += 1;
                }
                None => {
                    positions.insert(id.clone(), records.len());
                    records.push(record);
                }
            }
        }

        self.persist_records(&collection.name, &records).await?;
        stored.records = records;
        info!(
            collection = %collection.name,
            upserted = ids.len(),
            overwritten,
            total = stored.records.len(),
            "records upserted"
        );
        Ok(())
    }

    async fn query(
        &self,
        collection: &Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryHit>, RagError> {
        if vector.len() != collection.dimension {
            return Err(RagError::Validation(format!(
                "query dimension {} != collection '{}' dimension {}",
                vector.len(),
                collection.name,
                collection.dimension
            )));
        }

        let collections = self.collections.read().await;
        let stored = collections
            .get(&collection.name)
            .ok_or_else(|| missing_collection(&collection.name))?;

        let mut scored: Vec<(f32, &Record)> = stored
            .records
            .iter()
            .map(|record| {
                (
                    stored.collection.metric.distance(vector, &record.embedding),
                    record,
                )
            })
            .collect();

        // Stable: equal distances keep insertion order.
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, record)| QueryHit {
                id: record.id.clone(),
                distance,
                document: record.document.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    async fn get_all(&self, collection: &Collection) -> Result<Vec<Record>, RagError> {
        let collections = self.collections.read().await;
        collections
            .get(&collection.name)
            .map(|stored| stored.records.clone())
            .ok_or_else(|| missing_collection(&collection.name))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        if !collections.contains_key(name) {
            warn!(collection = name, "collection does not exist, nothing to delete");
            return Ok(());
        }

        match fs::remove_dir_all(self.collection_dir(name)).await {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        collections.remove(name);

        info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn delete_all_collections(&self) -> Result<(), RagError> {
        let names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        for name in &names {
            self.delete_collection(name).await?;
        }
        info!(count = names.len(), "all collections deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metadata(source: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), source.into());
        metadata
    }

    async fn upsert_rows(
        store: &LocalStore,
        collection: &Collection,
        rows: &[(&str, Vec<f32>, &str)],
    ) -> Result<(), RagError> {
        let ids: Vec<String> = rows.iter().map(|row| row.0.to_string()).collect();
        let embeddings: Vec<Vec<f32>> = rows.iter().map(|row| row.1.clone()).collect();
        let documents: Vec<String> = rows.iter().map(|row| row.2.to_string()).collect();
        let metadatas: Vec<Metadata> = rows.iter().map(|row| metadata(row.2)).collect();
        store
            .upsert(collection, &ids, &embeddings, &documents, &metadatas)
            .await
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;

        let first = store.get_or_create_collection("vehicle_collection").await?;
        let second = store.get_or_create_collection("vehicle_collection").await?;
        assert_eq!(first, second);
        assert_eq!(store.list_collections().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reused_ids_overwrite_records() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::L2).await?;
        let collection = store.get_or_create_collection("demo").await?;

        upsert_rows(&store, &collection, &[("a_vec0", vec![0.0, 1.0], "first")]).await?;
        upsert_rows(
            &store,
            &collection,
            &[("a_vec0", vec![1.0, 0.0], "second"), ("a_vec1", vec![1.0, 1.0], "third")],
        )
        .await?;

        let records = store.get_all(&collection).await?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a_vec0");
        assert_eq!(records[0].document, "second");
        assert_eq!(records[0].embedding, vec![1.0, 0.0]);
        Ok(())
    }

    #[tokio::test]
    async fn query_orders_by_ascending_distance() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::L2).await?;
        let collection = store.get_or_create_collection("demo").await?;
        upsert_rows(
            &store,
            &collection,
            &[
                ("far", vec![5.0, 5.0], "far"),
                ("near", vec![1.0, 0.0], "near"),
                ("mid", vec![2.0, 0.0], "mid"),
                ("near_twin", vec![1.0, 0.0], "near twin"),
            ],
        )
        .await?;

        let hits = store.query(&collection, &[1.0, 0.0], 3).await?;
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "near_twin", "mid"]);
        assert!(hits[0].distance <= hits[1].distance && hits[1].distance <= hits[2].distance);
        Ok(())
    }

    #[tokio::test]
    async fn empty_collection_query_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        let collection = store.get_or_create_collection("demo").await?;

        assert!(store.query(&collection, &[1.0, 0.0], 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn collections_survive_reopening() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
            let collection = store.get_or_create_collection("durable").await?;
            upsert_rows(&store, &collection, &[("x_vec0", vec![0.5, 0.5], "kept")]).await?;
        }

        let reopened = LocalStore::open(dir.path(), 8, DistanceMetric::L2).await?;
        let collection = reopened
            .get_collection("durable")
            .await?
            .ok_or("collection missing after reopen")?;
        assert_eq!(collection.dimension, 2);
        assert_eq!(collection.metric, DistanceMetric::Cosine);

        let records = reopened.get_all(&collection).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].metadata.get("source"),
            Some(&crate::stores::MetadataValue::from("kept"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn deleting_missing_collection_is_tolerated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        store.delete_collection("never_created").await?;
        Ok(())
    }

    #[tokio::test]
    async fn delete_all_removes_directories() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        store.get_or_create_collection("first").await?;
        store.get_or_create_collection("second").await?;

        store.delete_all_collections().await?;
        assert!(store.list_collections().await?.is_empty());
        assert!(!dir.path().join("first").exists());

        let reopened = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        assert!(reopened.list_collections().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn upsert_into_deleted_collection_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        let collection = store.get_or_create_collection("gone").await?;
        store.delete_collection("gone").await?;

        let result = upsert_rows(&store, &collection, &[("id", vec![0.0, 1.0], "doc")]).await;
        assert!(matches!(result, Err(RagError::StoreUnavailable(_))));
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_records_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        let collection = store.get_or_create_collection("demo").await?;
        std::fs::remove_dir_all(dir.path().join("demo"))?;

        let result = upsert_rows(&store, &collection, &[("a_vec0", vec![0.0, 1.0], "doc")]).await;
        assert!(result.is_err());
        assert!(store.get_all(&collection).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_removal_keeps_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        store.get_or_create_collection("demo").await?;
        // A plain file where the directory should be makes removal fail.
        std::fs::remove_dir_all(dir.path().join("demo"))?;
        std::fs::write(dir.path().join("demo"), b"not a directory")?;

        assert!(store.delete_collection("demo").await.is_err());
        assert!(store.get_collection("demo").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_collection_is_skipped_on_open() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
            let good = store.get_or_create_collection("good").await?;
            upsert_rows(&store, &good, &[("g_vec0", vec![1.0, 0.0], "healthy")]).await?;
            store.get_or_create_collection("bad").await?;
        }
        std::fs::write(dir.path().join("bad").join(RECORDS_FILE), b"{\"trunc")?;

        let reopened = LocalStore::open(dir.path(), 2, DistanceMetric::Cosine).await?;
        let names: Vec<String> = reopened
            .list_collections()
            .await?
            .into_iter()
            .map(|collection| collection.name)
            .collect();
        assert_eq!(names, vec!["good".to_string()]);

        let good = reopened.get_collection("good").await?.ok_or("good collection missing")?;
        assert_eq!(reopened.get_all(&good).await?.len(), 1);
        Ok(())
    }
}
