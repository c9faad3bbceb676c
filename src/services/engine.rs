//! The index service: single owner of the vectorizer, vector index,
//! metadata and snapshots.
//!
//! Writers (ingest, rebuild, clear) are serialised by one mutex. Each write
//! builds a complete new [`IndexState`], persists it, and only then swaps it
//! in, so readers see either the old state or the new one. Readers re-load
//! from disk when the on-disk generation differs from the in-memory one,
//! which lets several processes share one index directory.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, EmbeddingError, IngestError, SearchError, SnapshotError};
use crate::models::{
    Answer, ChunkMeta, Config, Document, DocumentBody, IndexStatus, IngestReport, SearchResults,
};
use crate::services::assembler;
use crate::services::chunker::TextChunker;
use crate::services::index::{Neighbor, VectorIndex};
use crate::services::snapshot::SnapshotStore;
use crate::services::state::IndexState;
use crate::services::vectorizer::{InputKind, QueryVector, TfidfVectorizer, Vectorizer};
use crate::utils::{DecodedText, read_document};

pub struct IndexService {
    config: Config,
    vectorizer: Vectorizer,
    chunker: TextChunker,
    snapshots: SnapshotStore,
    state: RwLock<Arc<IndexState>>,
    writer: Mutex<()>,
}

impl IndexService {
    /// Open the index configured by `config`, loading the latest snapshot.
    pub async fn open(config: Config) -> Result<Self, AppError> {
        let vectorizer = Vectorizer::from_config(&config)?;
        Self::with_vectorizer(config, vectorizer)
    }

    pub fn with_vectorizer(config: Config, vectorizer: Vectorizer) -> Result<Self, AppError> {
        let snapshots = SnapshotStore::open(config.index_dir())?;
        let state = match snapshots.load()? {
            Some(state) => {
                if state.scheme != vectorizer.scheme() && !state.is_empty() {
                    tracing::warn!(
                        stored = %state.scheme,
                        configured = %vectorizer.scheme(),
                        "snapshot scheme differs from configuration; rebuild required"
                    );
                }
                state
            }
            None => IndexState::empty(vectorizer.scheme(), empty_index(&vectorizer)),
        };
        tracing::info!(
            dir = %snapshots.dir().display(),
            scheme = %vectorizer.scheme(),
            entries = state.len(),
            generation = state.generation,
            "index opened"
        );

        Ok(Self {
            chunker: TextChunker::new(&config.index, &config.ingest),
            config,
            vectorizer,
            snapshots,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chunk, vectorize and persist one document.
    ///
    /// With the TF-IDF scheme this re-fits over every stored chunk, an
    /// O(corpus) re-index. Dense schemes embed only the new chunks.
    pub async fn ingest(&self, document: Document) -> Result<IngestReport, IngestError> {
        let decoded = self.read_body(&document.body)?;
        let chunked =
            self.chunker
                .chunk_document(&document.job_id, &document.file_name, &decoded.text);

        let mut report = IngestReport {
            job_id: document.job_id.clone(),
            num_chunks: chunked.num_chunks,
            indexed: false,
            summary_chunk: chunked.summary_chunk,
            skipped_cells: chunked.skipped_cells,
            skipped_rows: chunked.skipped_rows,
            skipped_bytes: decoded.skipped_bytes,
        };
        if chunked.entries.is_empty() {
            tracing::info!(job_id = %document.job_id, file = %document.file_name, "empty document, nothing indexed");
            return Ok(report);
        }

        let _guard = self.writer.lock().await;
        let current = self.current_state().await?;
        self.ensure_scheme(&current)?;

        let next = self.build_state(&current, chunked.entries, false).await?;
        self.commit(next).await?;

        report.indexed = true;
        tracing::info!(
            job_id = %report.job_id,
            file = %document.file_name,
            chunks = report.num_chunks,
            summary = report.summary_chunk,
            "document ingested"
        );
        Ok(report)
    }

    /// Ranked hits for `query`. An empty index, `k == 0` or a blank query
    /// yield no hits.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchResults, SearchError> {
        let start = Instant::now();
        let state = self.current_state().await?;
        let neighbors = self.retrieve(&state, query, k).await?;
        let hits = assembler::to_hits(&neighbors, &state.metadata, self.config.search.preview_chars);

        tracing::debug!(query, k, hits = hits.len(), "search");
        Ok(SearchResults::new(
            query.to_string(),
            state.index.score_kind(),
            hits,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// Extractive answer for `query` built from its top `k` chunks.
    pub async fn generate(&self, query: &str, k: usize) -> Result<Answer, SearchError> {
        let state = self.current_state().await?;
        if state.is_empty() {
            return Ok(assembler::empty_index_answer());
        }
        let neighbors = self.retrieve(&state, query, k).await?;

        tracing::debug!(query, k, sources = neighbors.len(), "generate");
        Ok(assembler::answer(
            &neighbors,
            &state.metadata,
            self.config.search.preview_chars,
            &self.config.answer,
        ))
    }

    /// Re-vectorize every stored chunk with the configured scheme.
    pub async fn rebuild(&self) -> Result<IndexStatus, IngestError> {
        let _guard = self.writer.lock().await;
        let current = self.current_state().await?;
        let next = self.build_state(&current, Vec::new(), true).await?;
        tracing::info!(
            from = %current.scheme,
            to = %next.scheme,
            entries = next.len(),
            "index rebuilt"
        );
        self.commit(next).await?;
        Ok(self.status().await)
    }

    /// Drop every stored chunk.
    pub async fn clear(&self) -> Result<IndexStatus, IngestError> {
        let _guard = self.writer.lock().await;
        let current = self.current_state().await?;
        let mut next = IndexState::empty(self.vectorizer.scheme(), empty_index(&self.vectorizer));
        next.generation = current.generation + 1;
        self.commit(next).await?;
        tracing::info!("index cleared");
        Ok(self.status().await)
    }

    pub async fn status(&self) -> IndexStatus {
        let state = match self.current_state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("failed to refresh index state: {e}");
                self.state.read().await.clone()
            }
        };
        let configured = self.vectorizer.scheme();
        IndexStatus {
            stale_scheme: (state.scheme != configured && !state.is_empty())
                .then(|| state.scheme.clone()),
            scheme: configured,
            generation: state.generation,
            entries: state.len(),
            jobs: state.job_count(),
            vocabulary: state.vectorizer.as_ref().map(|v| v.vocabulary_len()),
            index_dir: self.snapshots.dir().display().to_string(),
        }
    }

    fn read_body(&self, body: &DocumentBody) -> Result<DecodedText, IngestError> {
        match body {
            DocumentBody::Content(text) => Ok(DecodedText {
                text: text.clone(),
                skipped_bytes: 0,
            }),
            DocumentBody::Path(path) => {
                if !path.is_file() {
                    return Err(IngestError::NotFound(path.clone()));
                }
                let decoded = read_document(path, self.config.ingest.max_file_size).map_err(
                    |e| IngestError::FileReadError(format!("{}: {e}", path.display())),
                )?;
                if decoded.skipped_bytes > 0 {
                    tracing::warn!(
                        path = %path.display(),
                        skipped_bytes = decoded.skipped_bytes,
                        "dropped invalid UTF-8"
                    );
                }
                Ok(decoded)
            }
        }
    }

    /// The live state, re-loaded first if another writer committed a newer
    /// generation to disk.
    async fn current_state(&self) -> Result<Arc<IndexState>, SnapshotError> {
        let state = self.state.read().await.clone();
        match self.snapshots.generation()? {
            Some(generation) if generation != state.generation => {
                let Some(loaded) = self.snapshots.load()? else {
                    return Ok(state);
                };
                tracing::debug!(
                    from = state.generation,
                    to = loaded.generation,
                    "reloading newer snapshot"
                );
                let loaded = Arc::new(loaded);
                *self.state.write().await = Arc::clone(&loaded);
                Ok(loaded)
            }
            _ => Ok(state),
        }
    }

    fn ensure_scheme(&self, state: &IndexState) -> Result<(), SnapshotError> {
        let configured = self.vectorizer.scheme();
        if state.scheme != configured && !state.is_empty() {
            return Err(SnapshotError::SchemeMismatch {
                stored: state.scheme.clone(),
                configured,
            });
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        state: &IndexState,
        query: &str,
        k: usize,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let query = query.trim();
        if k == 0 || query.is_empty() || state.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_scheme(state)?;

        let vector = match &self.vectorizer {
            Vectorizer::Tfidf { .. } => match &state.vectorizer {
                Some(fitted) => QueryVector::Sparse(fitted.transform(query)),
                None => return Ok(Vec::new()),
            },
            Vectorizer::Dense(embedder) => QueryVector::Dense(embedder.embed_query(query).await?),
        };
        Ok(state.index.search(&vector, k)?)
    }

    /// Vectorize `base` plus `new_entries` into the next generation.
    ///
    /// Dense schemes reuse the stored vectors of `base` unless `rebuild`.
    async fn build_state(
        &self,
        base: &IndexState,
        new_entries: Vec<ChunkMeta>,
        rebuild: bool,
    ) -> Result<IndexState, IngestError> {
        let mut metadata = base.metadata.clone();
        let carried = metadata.len();
        metadata.extend(new_entries);

        let (vectorizer, index) = match &self.vectorizer {
            Vectorizer::Tfidf { max_features } => {
                if metadata.is_empty() {
                    (None, VectorIndex::sparse(Vec::new()))
                } else {
                    let corpus: Vec<&str> = metadata.iter().map(|m| m.text.as_str()).collect();
                    let (fitted, rows) = TfidfVectorizer::fit(&corpus, *max_features);
                    (Some(fitted), VectorIndex::sparse(rows))
                }
            }
            Vectorizer::Dense(embedder) => {
                let reuse = !rebuild && carried > 0;
                let (mut index, first_new) = if reuse {
                    (base.index.clone(), carried)
                } else {
                    (VectorIndex::flat(embedder.dimension()), 0)
                };
                let texts: Vec<String> =
                    metadata[first_new..].iter().map(|m| m.text.clone()).collect();
                let vectors = embedder.embed(&texts, InputKind::Document).await?;
                if vectors.len() != texts.len() {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        texts.len(),
                        vectors.len()
                    ))
                    .into());
                }
                for vector in vectors {
                    index.add(QueryVector::Dense(vector))?;
                }
                (None, index)
            }
        };

        let next = IndexState {
            generation: base.generation + 1,
            scheme: self.vectorizer.scheme(),
            vectorizer,
            index,
            metadata,
        };
        next.check_aligned()?;
        Ok(next)
    }

    /// Persist `next`, then make it the live state. A failed write leaves
    /// both the live state and the previous snapshot untouched.
    async fn commit(&self, next: IndexState) -> Result<(), SnapshotError> {
        self.snapshots.save(&next)?;
        *self.state.write().await = Arc::new(next);
        Ok(())
    }
}

fn empty_index(vectorizer: &Vectorizer) -> VectorIndex {
    match vectorizer {
        Vectorizer::Tfidf { .. } => VectorIndex::sparse(Vec::new()),
        Vectorizer::Dense(embedder) => VectorIndex::flat(embedder.dimension()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;

    use super::*;
    use crate::models::{EmbeddingConfig, Scheme, ScoreKind};
    use crate::services::assembler::{NO_DOCUMENTS_MESSAGE, NOTHING_FOUND_MESSAGE};

    fn tfidf_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.index.dir = Some(dir.to_path_buf());
        config
    }

    fn hash_config(dir: &Path) -> Config {
        let mut config = tfidf_config(dir);
        config.vectorizer.scheme = Scheme::Dense;
        config.embedding = EmbeddingConfig::hashed(64);
        config
    }

    async fn open(config: Config) -> IndexService {
        IndexService::open(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_index_search_and_generate() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;

        let results = service.search("anything", 5).await.unwrap();
        assert!(results.is_empty());

        let answer = service.generate("anything", 5).await.unwrap();
        assert_eq!(answer.answer, NO_DOCUMENTS_MESSAGE);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_unique_term_ranks_its_chunk_first() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        for (job, text) in [
            ("j1", "quarterly invoices were paid on time"),
            ("j2", "the warehouse stores pallets of flour"),
            ("j3", "an aardvark wandered past the depot"),
        ] {
            service
                .ingest(Document::from_content(job, "notes.txt", text))
                .await
                .unwrap();
        }

        let results = service.search("aardvark", 5).await.unwrap();
        assert_eq!(results.score_kind, ScoreKind::Similarity);
        assert_eq!(results.len(), 1);
        assert_eq!(results.hits[0].job_id, "j3");
        assert!(results.hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_reingest_yields_distinct_chunk_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tfidf_config(dir.path());
        config.index.chunk_size = 10;
        let service = open(config).await;
        let text = "abcdefghij".repeat(3);

        let first = service
            .ingest(Document::from_content("job-a", "x.txt", text.clone()))
            .await
            .unwrap();
        let second = service
            .ingest(Document::from_content("job-b", "x.txt", text))
            .await
            .unwrap();
        assert_eq!(first.num_chunks, 3);
        assert_eq!(second.num_chunks, 3);

        let state = service.current_state().await.unwrap();
        assert_eq!(state.len(), 6);
        let ids: HashSet<&str> = state.metadata.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids.len(), 6);
        assert!(state.check_aligned().is_ok());
    }

    #[tokio::test]
    async fn test_k_zero_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        service
            .ingest(Document::from_content("j", "a.txt", "apples and pears"))
            .await
            .unwrap();

        assert!(service.search("apples", 0).await.unwrap().is_empty());
        let answer = service.generate("apples", 0).await.unwrap();
        assert_eq!(answer.answer, NOTHING_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_generate_without_match_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        service
            .ingest(Document::from_content("j", "a.txt", "apples and pears"))
            .await
            .unwrap();

        let answer = service.generate("submarine", 5).await.unwrap();
        assert_eq!(answer.answer, NOTHING_FOUND_MESSAGE);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_generate_respects_answer_cap() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        let text = "ledger entry balance ".repeat(400);
        service
            .ingest(Document::from_content("j", "big.txt", text))
            .await
            .unwrap();

        let answer = service.generate("ledger balance", 10).await.unwrap();
        assert!(answer.answer.chars().count() <= service.config().answer.max_answer_chars);
        assert_eq!(answer.sources.len(), 9);
    }

    #[tokio::test]
    async fn test_csv_summary_is_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        let report = service
            .ingest(Document::from_content(
                "j",
                "ledger.csv",
                "amt,memo\n\"$10.00\",rent\n\"$20.00\",food\n",
            ))
            .await
            .unwrap();
        assert!(report.indexed);
        assert!(report.summary_chunk);
        assert_eq!(report.num_chunks, 1);
        assert_eq!(report.skipped_cells, 2);

        let state = service.current_state().await.unwrap();
        assert_eq!(state.len(), 2);
        let summary = &state.metadata[1];
        assert_eq!(summary.file_name, "ledger.csv::summary");
        assert!(summary.text.contains("amt=sum:30.00@count:2@avg:15.00"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        let err = service
            .ingest(Document::from_path("j", dir.path().join("missing.txt")))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ingest_from_path_counts_invalid_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello \xff world").unwrap();
        let service = open(tfidf_config(&dir.path().join("index"))).await;

        let report = service.ingest(Document::from_path("j", &path)).await.unwrap();
        assert!(report.indexed);
        assert_eq!(report.skipped_bytes, 1);
        assert_eq!(report.num_chunks, 1);
    }

    #[tokio::test]
    async fn test_empty_document_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        let report = service
            .ingest(Document::from_content("j", "empty.txt", ""))
            .await
            .unwrap();
        assert!(!report.indexed);
        assert_eq!(report.num_chunks, 0);
        assert_eq!(service.status().await.generation, 0);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_reproduces_results() {
        for make_config in [tfidf_config, hash_config] {
            let dir = tempfile::tempdir().unwrap();
            let config = make_config(dir.path());
            let before = {
                let service = open(config.clone()).await;
                for (job, text) in [
                    ("j1", "solar panels convert sunlight"),
                    ("j2", "wind turbines convert moving air"),
                    ("j3", "sunlight warms the greenhouse"),
                ] {
                    service
                        .ingest(Document::from_content(job, "energy.md", text))
                        .await
                        .unwrap();
                }
                service.search("sunlight", 3).await.unwrap()
            };

            let reopened = open(config).await;
            let state = reopened.current_state().await.unwrap();
            assert_eq!(state.len(), 3);
            assert!(state.check_aligned().is_ok());

            let after = reopened.search("sunlight", 3).await.unwrap();
            assert_eq!(before.hits, after.hits);
            assert!(!after.hits.is_empty());
        }
    }

    #[tokio::test]
    async fn test_dense_scheme_appends_incrementally() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(hash_config(dir.path())).await;
        service
            .ingest(Document::from_content("j1", "a.txt", "red green blue"))
            .await
            .unwrap();
        let first = service.current_state().await.unwrap();

        service
            .ingest(Document::from_content("j2", "b.txt", "cyan magenta yellow"))
            .await
            .unwrap();
        let second = service.current_state().await.unwrap();

        let crate::services::index::VectorIndex::Flat(a) = &first.index else {
            panic!("expected flat index");
        };
        let crate::services::index::VectorIndex::Flat(b) = &second.index else {
            panic!("expected flat index");
        };
        assert_eq!(a.dimension(), 64);
        assert_eq!(second.len(), 2);
        assert_eq!(b.dimension(), a.dimension());

        let results = service.search("magenta", 5).await.unwrap();
        assert_eq!(results.score_kind, ScoreKind::Distance);
        assert_eq!(results.len(), 2);
        assert_eq!(results.hits[0].job_id, "j2");
    }

    #[tokio::test]
    async fn test_scheme_change_requires_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = open(tfidf_config(dir.path())).await;
            service
                .ingest(Document::from_content("j", "a.txt", "copper wire spool"))
                .await
                .unwrap();
        }

        let service = open(hash_config(dir.path())).await;
        assert!(matches!(
            service.search("copper", 5).await,
            Err(SearchError::Snapshot(SnapshotError::SchemeMismatch { .. }))
        ));
        assert!(service.status().await.stale_scheme.is_some());

        let status = service.rebuild().await.unwrap();
        assert_eq!(status.scheme, "dense:hash-v1:64");
        assert_eq!(status.entries, 1);
        assert!(status.stale_scheme.is_none());
        assert_eq!(service.search("copper", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_empties_index() {
        let dir = tempfile::tempdir().unwrap();
        let service = open(tfidf_config(dir.path())).await;
        service
            .ingest(Document::from_content("j", "a.txt", "granite quarry"))
            .await
            .unwrap();

        let status = service.clear().await.unwrap();
        assert_eq!(status.entries, 0);
        assert_eq!(status.generation, 2);
        assert!(service.search("granite", 5).await.unwrap().is_empty());

        let reopened = open(tfidf_config(dir.path())).await;
        assert_eq!(reopened.status().await.entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_ingests_stay_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(open(hash_config(dir.path())).await);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .ingest(Document::from_content(
                            format!("job-{i}"),
                            "doc.txt",
                            format!("document number {i} body"),
                        ))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let state = service.current_state().await.unwrap();
        assert_eq!(state.len(), 8);
        assert_eq!(state.job_count(), 8);
        assert_eq!(state.generation, 8);
        assert!(state.check_aligned().is_ok());
    }

    #[tokio::test]
    async fn test_second_service_sees_newer_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open(tfidf_config(dir.path())).await;
        let writer = open(tfidf_config(dir.path())).await;

        writer
            .ingest(Document::from_content("j", "a.txt", "lighthouse keeper"))
            .await
            .unwrap();
        let results = reader.search("lighthouse", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
