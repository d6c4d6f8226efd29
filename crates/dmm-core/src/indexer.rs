//! Indexer (§4.G): orchestrates Parser → Embedder → Index Store, keeping the store in
//! sync with the on-disk memory root.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ValidationConfig;
use crate::models::IndexedMemory;
use crate::parser::{self, parse_memory_file};
use crate::storage::Storage;

#[cfg(feature = "embeddings")]
use crate::embeddings::EmbeddingService;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("parse error at {path}: {source}")]
    Parse { path: String, source: crate::parser::ParserError },
    #[cfg(feature = "embeddings")]
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),
}

#[derive(Debug, Default, Clone)]
pub struct IndexResult {
    pub indexed: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: Vec<(String, String)>,
    pub duration_ms: f64,
}

pub struct Indexer<'a> {
    pub root: PathBuf,
    pub storage: &'a Storage,
    pub validation: ValidationConfig,
    #[cfg(feature = "embeddings")]
    pub embedder: &'a EmbeddingService,
}

impl<'a> Indexer<'a> {
    #[cfg(feature = "embeddings")]
    pub fn new(root: PathBuf, storage: &'a Storage, validation: ValidationConfig, embedder: &'a EmbeddingService) -> Self {
        Self { root, storage, validation, embedder }
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn new(root: PathBuf, storage: &'a Storage, validation: ValidationConfig) -> Self {
        Self { root, storage, validation }
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy().replace('\\', "/")
    }

    fn enumerate_markdown_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) == Some("deprecated") {
                        continue;
                    }
                    stack.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                    out.push(path);
                }
            }
        }
        out
    }

    /// Reads and parses a single file, without embedding, returning the parsed memory
    /// plus its content hash.
    fn parse_for_index(&self, absolute_path: &Path, relative: &str) -> Result<(crate::models::MemoryFile, String), IndexerError> {
        let raw_bytes = std::fs::read(absolute_path)?;
        let hash = parser::file_hash(&raw_bytes);
        let parsed = parse_memory_file(&raw_bytes, relative, &self.validation);
        let Some(memory_file) = parsed.memory else {
            return Err(IndexerError::Parse {
                path: relative.to_string(),
                source: parsed.error.expect("parse failure without memory must carry an error"),
            });
        };
        Ok((memory_file, hash))
    }

    fn assemble_indexed(memory_file: crate::models::MemoryFile, hash: String, composite_embedding: Vec<f32>, directory_embedding: Vec<f32>) -> IndexedMemory {
        IndexedMemory {
            id: memory_file.header.id.clone(),
            path: memory_file.path.clone(),
            title: memory_file.title.clone(),
            body: memory_file.body.clone(),
            tags: memory_file.header.tags.clone(),
            scope: memory_file.header.scope,
            priority: memory_file.header.priority,
            confidence: memory_file.header.confidence,
            status: memory_file.header.status,
            directory: memory_file.directory().to_string(),
            file_hash: hash,
            token_count: memory_file.token_count,
            composite_embedding,
            directory_embedding,
            indexed_at: Utc::now(),
            created: memory_file.header.created.clone(),
            last_used: memory_file.header.last_used.clone(),
            usage_count: memory_file.header.usage_count,
            supersedes: memory_file.header.supersedes.clone(),
            related: memory_file.header.related.clone(),
            expires: memory_file.header.expires.clone(),
        }
    }

    fn build_memory(&self, absolute_path: &Path, relative: &str) -> Result<IndexedMemory, IndexerError> {
        let (memory_file, hash) = self.parse_for_index(absolute_path, relative)?;

        #[cfg(feature = "embeddings")]
        let (composite_embedding, directory_embedding) = {
            let directory = memory_file.directory();
            let (composite, directory_emb) = self.embedder.embed_memory(
                directory,
                &memory_file.title,
                &memory_file.header.tags,
                memory_file.header.scope.as_str(),
                &memory_file.body,
            )?;
            (composite.vector, directory_emb.vector)
        };
        #[cfg(not(feature = "embeddings"))]
        let (composite_embedding, directory_embedding) = (Vec::new(), Vec::new());

        Ok(Self::assemble_indexed(memory_file, hash, composite_embedding, directory_embedding))
    }

    /// Full reindex: enumerate, parse, batch-embed, upsert every `.md` file under the
    /// memory root (§4.G step 3). Every file is parsed first so the embedder sees one
    /// batch call for the whole tree instead of one call per file.
    pub fn reindex_all(&self) -> Result<IndexResult, IndexerError> {
        let start = Instant::now();
        let files = self.enumerate_markdown_files();
        let mut result = IndexResult::default();

        let mut parsed_files = Vec::with_capacity(files.len());
        for path in &files {
            let relative = self.relative_path(path);
            match self.parse_for_index(path, &relative) {
                Ok(parsed) => parsed_files.push(parsed),
                Err(e) => result.errors.push((relative, e.to_string())),
            }
        }

        #[cfg(feature = "embeddings")]
        {
            let texts: Vec<String> = parsed_files
                .iter()
                .flat_map(|(memory_file, _)| {
                    let directory = memory_file.directory();
                    [
                        crate::embeddings::composite_text(directory, &memory_file.title, &memory_file.header.tags, memory_file.header.scope.as_str(), &memory_file.body),
                        crate::embeddings::directory_text(directory, ""),
                    ]
                })
                .collect();
            let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            let embedded = self.embedder.embed_batch(&text_refs)?;
            let mut embedded = embedded.into_iter();

            for (memory_file, hash) in parsed_files {
                let composite_embedding = embedded.next().expect("embed_batch preserves length").vector;
                let directory_embedding = embedded.next().expect("embed_batch preserves length").vector;
                let memory = Self::assemble_indexed(memory_file, hash, composite_embedding, directory_embedding);
                self.storage.upsert_memory(&memory)?;
                result.indexed += 1;
            }
        }

        #[cfg(not(feature = "embeddings"))]
        for (memory_file, hash) in parsed_files {
            let memory = Self::assemble_indexed(memory_file, hash, Vec::new(), Vec::new());
            self.storage.upsert_memory(&memory)?;
            result.indexed += 1;
        }

        self.storage.set_system_meta("last_full_reindex", &Utc::now().to_rfc3339())?;
        result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(result)
    }

    /// Incremental index of a single path: skips re-embedding if `file_hash` is
    /// unchanged (§4.G).
    pub fn index_file(&self, absolute_path: &Path) -> Result<bool, IndexerError> {
        let relative = self.relative_path(absolute_path);
        let raw_bytes = std::fs::read(absolute_path)?;
        let hash = parser::file_hash(&raw_bytes);

        if let Some(existing) = self.storage.get_memory_by_path(&relative)? {
            if existing.file_hash == hash {
                return Ok(false);
            }
        }

        let memory = self.build_memory(absolute_path, &relative)?;
        self.storage.upsert_memory(&memory)?;
        Ok(true)
    }

    /// Removes any indexed record at `relative_path`. Silent no-op if absent (§4.G).
    pub fn delete_file(&self, relative_path: &str) -> Result<(), IndexerError> {
        self.storage.delete_memory_by_path(relative_path)?;
        Ok(())
    }
}
