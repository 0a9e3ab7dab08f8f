use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use cache::{CacheConfig, CacheError, EncodingCache, EnsureStatus, ProcessingError, ReconcileReport};
use embedding::{FaceEmbedder, ScriptedEmbedder};
use image::{ImageFormat, Rgb, RgbImage};
use preprocess::PreprocessConfig;
use store::{
    BackendConfig, BlobBackend, BlobMeta, BlobStore, InMemoryBackend, Namespace, StoreConfig,
    StoreError,
};

const TWO_FACES: [u8; 3] = [200, 10, 10];
const NO_FACE: [u8; 3] = [10, 200, 10];
const BROKEN: [u8; 3] = [10, 10, 200];

fn png(rgb: [u8; 3]) -> Vec<u8> {
    let mut out = Vec::new();
    RgbImage::from_pixel(16, 16, Rgb(rgb))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn embedder() -> Arc<ScriptedEmbedder> {
    Arc::new(
        ScriptedEmbedder::new()
            .with_faces(TWO_FACES, vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.5, 0.25]])
            .with_failure(BROKEN),
    )
}

fn cache_over(store: BlobStore, embedder: Arc<ScriptedEmbedder>) -> EncodingCache {
    let embedder: Arc<dyn FaceEmbedder> = embedder;
    EncodingCache::new(
        store,
        embedder,
        PreprocessConfig::default(),
        CacheConfig::default(),
    )
}

fn memory_store() -> BlobStore {
    BlobStore::new(StoreConfig::new().with_backend(BackendConfig::in_memory())).unwrap()
}

async fn setup() -> (EncodingCache, Arc<ScriptedEmbedder>) {
    let embedder = embedder();
    let cache = cache_over(memory_store(), embedder.clone());
    let store = cache.store();
    store.upload(Namespace::Photos, "two.png", png(TWO_FACES)).await.unwrap();
    store.upload(Namespace::Photos, "none.png", png(NO_FACE)).await.unwrap();
    store.upload(Namespace::Photos, "broken.png", png(BROKEN)).await.unwrap();
    (cache, embedder)
}

#[tokio::test]
async fn ensure_computes_at_most_once_without_force() {
    let (cache, embedder) = setup().await;

    let first = cache.ensure("two.png", "two.png", false).await.unwrap();
    assert_eq!(first, EnsureStatus::Computed { faces: 2 });
    let stored = cache.get("two.png").await.unwrap();

    let second = cache.ensure("two.png", "two.png", false).await.unwrap();
    assert_eq!(second, EnsureStatus::Cached);
    assert_eq!(embedder.detect_calls(), 1);
    assert_eq!(cache.get("two.png").await.unwrap(), stored);
}

#[tokio::test]
async fn forced_update_recomputes() {
    let (cache, embedder) = setup().await;
    cache.ensure("two.png", "two.png", false).await.unwrap();
    let forced = cache.ensure("two.png", "two.png", true).await.unwrap();
    assert!(forced.is_computed());
    assert_eq!(embedder.detect_calls(), 2);
}

#[tokio::test]
async fn put_then_get_returns_identical_vectors() {
    let (cache, _) = setup().await;
    let encodings = vec![vec![0.1f32, -0.2, 0.3], vec![4.0, 5.5, -6.25]];
    cache.put("manual", encodings.clone()).await.unwrap();
    assert_eq!(cache.get("manual").await.unwrap(), Some(encodings));

    let entry = cache.get_entry("manual").await.unwrap().unwrap();
    assert_eq!(entry.model, "scripted");
    assert!(entry.computed_at().is_some());
}

#[tokio::test]
async fn no_face_entry_is_distinct_from_absent() {
    let (cache, embedder) = setup().await;
    assert_eq!(cache.get("none.png").await.unwrap(), None);
    assert!(!cache.has("none.png").await);

    let status = cache.ensure("none.png", "none.png", false).await.unwrap();
    assert_eq!(status, EnsureStatus::Computed { faces: 0 });
    assert_eq!(cache.get("none.png").await.unwrap(), Some(Vec::new()));
    assert!(cache.has("none.png").await);

    assert_eq!(
        cache.ensure("none.png", "none.png", false).await.unwrap(),
        EnsureStatus::Cached
    );
    assert_eq!(embedder.detect_calls(), 1);
}

#[tokio::test]
async fn missing_photo_is_reported() {
    let (cache, _) = setup().await;
    let err = cache.ensure("ghost.png", "ghost.png", false).await.unwrap_err();
    assert!(matches!(err, CacheError::PhotoMissing(ref k) if k == "ghost.png"));
}

#[tokio::test]
async fn processing_failures_leave_entry_absent() {
    let (cache, _) = setup().await;
    let err = cache.ensure("broken.png", "broken.png", false).await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Processing {
            source: ProcessingError::Embedding(_),
            ..
        }
    ));
    assert!(!cache.has("broken.png").await);

    cache
        .store()
        .upload(Namespace::Photos, "garbage.png", b"not an image".to_vec())
        .await
        .unwrap();
    let err = cache.ensure("garbage.png", "garbage.png", false).await.unwrap_err();
    assert!(matches!(
        err,
        CacheError::Processing {
            source: ProcessingError::Preprocess(_),
            ..
        }
    ));
}

#[tokio::test]
async fn corrupt_entry_is_a_miss_and_heals() {
    let (cache, _) = setup().await;
    cache
        .store()
        .upload(Namespace::Encodings, "two.png", vec![0xde, 0xad, 0xbe, 0xef])
        .await
        .unwrap();

    assert_eq!(cache.get("two.png").await.unwrap(), None);
    assert!(!cache.has("two.png").await, "corrupt blob is deleted");

    let status = cache.ensure("two.png", "two.png", false).await.unwrap();
    assert_eq!(status, EnsureStatus::Computed { faces: 2 });
    assert_eq!(cache.get("two.png").await.unwrap().map(|e| e.len()), Some(2));
}

#[tokio::test]
async fn entries_from_another_model_are_recomputed() {
    let (cache, _) = setup().await;
    cache.ensure("two.png", "two.png", false).await.unwrap();

    let upgraded = Arc::new(
        ScriptedEmbedder::new()
            .with_model("face-model-v2")
            .with_faces(TWO_FACES, vec![vec![9.0, 9.0, 9.0]]),
    );
    let cache = cache_over(cache.store().clone(), upgraded.clone());
    assert_eq!(cache.get("two.png").await.unwrap(), None);
    assert!(!cache.has("two.png").await);

    let status = cache.ensure("two.png", "two.png", false).await.unwrap();
    assert_eq!(status, EnsureStatus::Computed { faces: 1 });
    assert_eq!(upgraded.detect_calls(), 1);

    let entry = cache.get_entry("two.png").await.unwrap().unwrap();
    assert_eq!(entry.model, "face-model-v2");
    assert_eq!(entry.encodings, vec![vec![9.0, 9.0, 9.0]]);
}

#[tokio::test]
async fn delete_removes_entry_and_tolerates_absence() {
    let (cache, _) = setup().await;
    cache.ensure("two.png", "two.png", false).await.unwrap();
    cache.delete("two.png").await.unwrap();
    assert_eq!(cache.get("two.png").await.unwrap(), None);
    cache.delete("two.png").await.unwrap();
}

#[tokio::test]
async fn reconcile_fills_gaps_and_counts_failures() {
    let (cache, embedder) = setup().await;
    cache.ensure("none.png", "none.png", false).await.unwrap();

    let photos = ["two.png", "none.png", "broken.png"];
    let report = cache.reconcile(&photos).await;
    assert_eq!(
        report,
        ReconcileReport {
            total: 3,
            cached: 1,
            computed: 1,
            failed: 1,
        }
    );
    assert!(cache.has("two.png").await);
    // none.png once during setup, then two.png and broken.png
    assert_eq!(embedder.detect_calls(), 3);
}

/// Accepts photos but refuses every write to the encodings namespace.
struct ReadOnlyCache(InMemoryBackend);

#[async_trait]
impl BlobBackend for ReadOnlyCache {
    async fn put(&self, ns: Namespace, key: &str, data: Vec<u8>) -> Result<BlobMeta, StoreError> {
        if ns == Namespace::Encodings {
            return Err(StoreError::backend("bucket is read-only"));
        }
        self.0.put(ns, key, data).await
    }
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.0.get(ns, key).await
    }
    async fn stat(&self, ns: Namespace, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        self.0.stat(ns, key).await
    }
    async fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        self.0.delete(ns, key).await
    }
    async fn list(&self, ns: Namespace, prefix: &str, limit: usize) -> Result<Vec<BlobMeta>, StoreError> {
        self.0.list(ns, prefix, limit).await
    }
}

#[tokio::test]
async fn store_write_failure_is_a_cache_write_error() {
    let store = BlobStore::with_backend(
        StoreConfig::new(),
        Arc::new(ReadOnlyCache(InMemoryBackend::new())),
    );
    store.upload(Namespace::Photos, "two.png", png(TWO_FACES)).await.unwrap();
    let cache = cache_over(store, embedder());

    let err = cache.ensure("two.png", "two.png", false).await.unwrap_err();
    assert!(matches!(err, CacheError::CacheWrite { ref photo, .. } if photo == "two.png"));
    assert!(!cache.has("two.png").await);
}

#[tokio::test]
async fn entries_persist_in_redb() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facefind.redb");
    let cfg = || StoreConfig::new().with_backend(BackendConfig::redb(path.to_string_lossy()));

    {
        let cache = cache_over(BlobStore::new(cfg()).unwrap(), embedder());
        cache
            .store()
            .upload(Namespace::Photos, "two.png", png(TWO_FACES))
            .await
            .unwrap();
        cache.ensure("two.png", "two.png", false).await.unwrap();
    }

    let embedder = embedder();
    let cache = cache_over(BlobStore::new(cfg()).unwrap(), embedder.clone());
    assert_eq!(
        cache.ensure("two.png", "two.png", false).await.unwrap(),
        EnsureStatus::Cached
    );
    assert_eq!(cache.get("two.png").await.unwrap().map(|e| e.len()), Some(2));
    assert_eq!(embedder.detect_calls(), 0);
}
