use crate::chunking::build_chunks;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::loaders::loader_for_extension;
use crate::models::{
    ChunkingOptions, Document, HnswParams, IngestionReport, SkippedFile, DEFAULT_CATEGORY,
    META_CATEGORY,
};
use crate::traits::VectorStore;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Recursively lists ingestible files under the root. Directories and
/// dot-prefixed names are skipped; output is sorted for determinism.
pub fn discover_source_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Category = first path segment under the ingestion root. Files sitting
/// directly at the root get the default category.
pub fn derive_category(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .and_then(|relative| {
            let mut components = relative.components();
            let first = components.next()?;
            // A lone component is the file itself, not a directory.
            components
                .next()
                .is_some()
                .then(|| first.as_os_str().to_string_lossy().to_string())
        })
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Load → categorize → chunk → embed → upsert → index. Per-file load
/// failures are collected as diagnostics; everything from chunking onward is
/// fatal to the run.
pub struct IngestionPipeline<E, S> {
    embedder: E,
    store: S,
    chunking: ChunkingOptions,
    index_params: HnswParams,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn new(embedder: E, store: S) -> Self {
        Self {
            embedder,
            store,
            chunking: ChunkingOptions::default(),
            index_params: HnswParams::default(),
        }
    }

    pub fn with_chunking(mut self, options: ChunkingOptions) -> Self {
        self.chunking = options;
        self
    }

    pub fn with_index_params(mut self, params: HnswParams) -> Self {
        self.index_params = params;
        self
    }

    pub async fn run(&self, root: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_source_files(root);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no files found in {}",
                root.display()
            )));
        }

        let mut documents: Vec<Document> = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            let extension = path
                .extension()
                .and_then(|extension| extension.to_str())
                .unwrap_or_default();

            let Some(loader) = loader_for_extension(extension) else {
                warn!(path = %path.display(), "unsupported extension, skipping file");
                skipped_files.push(SkippedFile {
                    path,
                    reason: "unsupported extension".to_string(),
                });
                continue;
            };

            match loader.load(&path) {
                Ok(mut loaded) => {
                    let category = derive_category(root, &path);
                    for document in &mut loaded {
                        document
                            .metadata
                            .insert(META_CATEGORY.to_string(), category.clone());
                    }
                    documents.extend(loaded);
                }
                Err(load_error) => {
                    warn!(path = %path.display(), error = %load_error, "failed to load file, skipping");
                    skipped_files.push(SkippedFile {
                        path,
                        reason: load_error.to_string(),
                    });
                }
            }
        }

        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for document in &documents {
            let (document_chunks, next_cursor) = build_chunks(document, self.chunking, cursor)
                .map_err(|chunk_error| {
                    error!(error = %chunk_error, "chunking failed, aborting ingestion run");
                    chunk_error
                })?;
            cursor = next_cursor;
            chunks.extend(document_chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        self.store.add_chunks(&chunks, &embeddings).await?;
        self.store.build_index(&self.index_params).await?;

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            skipped = skipped_files.len(),
            "ingestion run complete"
        );

        Ok(IngestionReport {
            documents_loaded: documents.len(),
            chunks_indexed: chunks.len(),
            skipped_files,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::QueryError;
    use crate::models::{DocChunk, RetrievedChunk, META_SOURCE};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Default, Clone)]
    struct RecordingStore {
        chunks: Arc<Mutex<Vec<DocChunk>>>,
        index_builds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn add_chunks(
            &self,
            chunks: &[DocChunk],
            embeddings: &[Vec<f32>],
        ) -> Result<(), QueryError> {
            assert_eq!(chunks.len(), embeddings.len());
            self.chunks.lock().unwrap().extend_from_slice(chunks);
            Ok(())
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _limit: usize,
            _category: Option<&str>,
        ) -> Result<Vec<RetrievedChunk>, QueryError> {
            Ok(Vec::new())
        }

        async fn build_index(&self, _params: &HnswParams) -> Result<(), QueryError> {
            self.index_builds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(store: RecordingStore) -> IngestionPipeline<HashingEmbedder, RecordingStore> {
        IngestionPipeline::new(HashingEmbedder::default(), store)
    }

    #[test]
    fn discovery_skips_hidden_files_and_recurses() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("policies");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("readme.txt"), "top")?;
        fs::write(nested.join("vacation.txt"), "nested")?;
        fs::write(dir.path().join(".env"), "secret")?;

        let files = discover_source_files(dir.path());

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| !path.ends_with(".env")));
        Ok(())
    }

    #[test]
    fn category_comes_from_first_path_segment() {
        let root = Path::new("/data");
        assert_eq!(
            derive_category(root, Path::new("/data/policies/vacation.txt")),
            "policies"
        );
        assert_eq!(
            derive_category(root, Path::new("/data/policies/2024/vacation.txt")),
            "policies"
        );
        assert_eq!(derive_category(root, Path::new("/data/readme.txt")), "general");
    }

    #[tokio::test]
    async fn long_file_in_subdirectory_yields_tagged_chunks(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let policies = dir.path().join("policies");
        fs::create_dir(&policies)?;
        let body: String = (0..2_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        fs::write(policies.join("policy.txt"), &body)?;

        let store = RecordingStore::default();
        let report = pipeline(store.clone()).run(dir.path()).await?;

        assert_eq!(report.documents_loaded, 1);
        assert!(report.chunks_indexed >= 2);
        assert!(report.skipped_files.is_empty());
        assert_eq!(store.index_builds.load(Ordering::SeqCst), 1);

        let stored = store.chunks.lock().unwrap();
        assert_eq!(stored.len(), report.chunks_indexed);
        for chunk in stored.iter() {
            assert_eq!(chunk.metadata.get(META_CATEGORY).unwrap(), "policies");
            assert!(chunk.metadata.contains_key(META_SOURCE));
        }
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_extension_is_skipped_not_fatal(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("data.xyz"), "binary blob")?;
        fs::write(dir.path().join("notes.txt"), "vacation policy text")?;

        let store = RecordingStore::default();
        let report = pipeline(store).run(dir.path()).await?;

        assert_eq!(report.documents_loaded, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0].reason,
            "unsupported extension".to_string()
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_skipped_and_run_continues() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("notes.txt"), "still ingested")?;

        let store = RecordingStore::default();
        let report = pipeline(store).run(dir.path()).await?;

        assert_eq!(report.documents_loaded, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0].path.file_name().and_then(|n| n.to_str()),
            Some("broken.pdf")
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_root_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = pipeline(RecordingStore::default()).run(dir.path()).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_chunking_config_aborts_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("notes.txt"), "some policy text")?;

        let result = pipeline(RecordingStore::default())
            .with_chunking(ChunkingOptions {
                max_chars: 100,
                overlap_chars: 100,
            })
            .run(dir.path())
            .await;

        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        Ok(())
    }
}
