//! RocksDB-backed project store.
//!
//! Column families:
//! - `cells`    : grid cells, bincode rows keyed by
//!                 `<project:16><section bytes><0x00><cell_id:4 BE>`
//! - `snapshots`: whiteboard snapshots (JSON, LZ4 compressed), keyed by project
//! - `images`   : uploaded image bytes, keyed by upload path
//! - `metadata` : per-project counters and timestamps (bincode)
//!
//! A section's cells share one key prefix, so loading a section is a single
//! forward scan and removing a row band is one `WriteBatch`.

use async_trait::async_trait;
use folio_core::{
    CanvasSnapshot, CellId, CellStore, GridItem, ImageStore, ProjectId, SectionId, SnapshotStore,
    StoreError,
};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

const CF_CELLS: &str = "cells";
const CF_SNAPSHOTS: &str = "snapshots";
const CF_IMAGES: &str = "images";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_CELLS, CF_SNAPSHOTS, CF_IMAGES, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
    /// Prefix of the URLs returned for uploaded images
    pub public_base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folio_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
            public_base_url: "/images".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, given directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
            public_base_url: "https://cdn.test/images".to_string(),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

/// Per-project bookkeeping stored alongside snapshots and cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_id: Uuid,
    /// Number of snapshot saves so far
    pub snapshot_version: u64,
    /// Uncompressed snapshot size in bytes
    pub snapshot_size: u64,
    /// Compressed snapshot size in bytes
    pub compressed_size: u64,
    /// Cell rows written (upserts) so far
    pub cell_writes: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl ProjectMetadata {
    fn new(project: ProjectId) -> Self {
        let now = now_secs();
        Self {
            project_id: *project.as_uuid(),
            snapshot_version: 0,
            snapshot_size: 0,
            compressed_size: 0,
            cell_writes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_secs();
    }
}

/// RocksDB-backed store for cells, whiteboard snapshots and images.
pub struct ProjectStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl ProjectStore {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )
        .map_err(db_err)?;

        log::info!("Opened project store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_CELLS => {
                // Many small rows, prefix-scanned per section
                opts.set_max_write_buffer_number(4);
            }
            CF_SNAPSHOTS | CF_METADATA => {
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_IMAGES => {
                // Already-compressed formats; don't compress twice
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::None);
            }
            _ => {}
        }

        opts
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    // ─── Cells ────────────────────────────────────────────────────────

    /// Insert or replace cells; idempotent on (project, section, id).
    pub fn put_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        cells: &[GridItem],
    ) -> Result<usize, StoreError> {
        let cf_cells = self.cf(CF_CELLS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut meta = self.metadata_or_new(project)?;
        meta.cell_writes += cells.len() as u64;
        meta.touch();

        let mut batch = WriteBatch::default();
        for cell in cells {
            batch.put_cf(&cf_cells, Self::cell_key(project, section, cell.id), encode(cell)?);
        }
        batch.put_cf(&cf_meta, project.as_bytes(), encode(&meta)?);
        self.db.write_opt(batch, &self.write_options()).map_err(db_err)?;

        log::trace!("Stored {} cells for {}/{}", cells.len(), project, section);
        Ok(cells.len())
    }

    /// All cells of one section, in id order.
    pub fn load_cells(&self, project: ProjectId, section: &SectionId) -> Result<Vec<GridItem>, StoreError> {
        let cf = self.cf(CF_CELLS)?;
        let prefix = Self::section_prefix(project, section);

        let mut cells = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            cells.push(decode::<GridItem>(&value)?);
        }
        Ok(cells)
    }

    /// Delete cells by id as one atomic batch.
    pub fn remove_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        ids: &[CellId],
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_CELLS)?;
        let mut batch = WriteBatch::default();
        for id in ids {
            batch.delete_cf(&cf, Self::cell_key(project, section, *id));
        }
        self.db.write_opt(batch, &self.write_options()).map_err(db_err)?;
        Ok(())
    }

    // ─── Snapshots ────────────────────────────────────────────────────

    /// Save a whiteboard snapshot (LZ4 compressed) and bump its version.
    pub fn save_snapshot(
        &self,
        project: ProjectId,
        snapshot: &CanvasSnapshot,
    ) -> Result<ProjectMetadata, StoreError> {
        let cf_snapshots = self.cf(CF_SNAPSHOTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let raw = snapshot
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&raw);

        let mut meta = self.metadata_or_new(project)?;
        meta.snapshot_version += 1;
        meta.snapshot_size = raw.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.touch();

        // Snapshot and metadata land together
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_snapshots, project.as_bytes(), &compressed);
        batch.put_cf(&cf_meta, project.as_bytes(), encode(&meta)?);
        self.db.write_opt(batch, &self.write_options()).map_err(db_err)?;

        Ok(meta)
    }

    pub fn load_snapshot(&self, project: ProjectId) -> Result<Option<CanvasSnapshot>, StoreError> {
        let cf = self.cf(CF_SNAPSHOTS)?;
        match self.db.get_cf(&cf, project.as_bytes()).map_err(db_err)? {
            Some(compressed) => {
                let raw = lz4_flex::decompress_size_prepended(&compressed)
                    .map_err(|e| StoreError::Compression(e.to_string()))?;
                let snapshot = CanvasSnapshot::from_bytes(&raw)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    // ─── Images ───────────────────────────────────────────────────────

    /// Store image bytes under `path` and return its public URL.
    pub fn put_image(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let cf = self.cf(CF_IMAGES)?;
        self.db
            .put_cf_opt(&cf, path.as_bytes(), bytes, &self.write_options())
            .map_err(db_err)?;
        Ok(self.public_url(path))
    }

    pub fn load_image(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_IMAGES)?;
        self.db.get_cf(&cf, path.as_bytes()).map_err(db_err)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.public_base_url.trim_end_matches('/'), path)
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    /// Metadata of a project, if anything was ever stored for it.
    pub fn load_metadata(&self, project: ProjectId) -> Result<Option<ProjectMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, project.as_bytes()).map_err(db_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn metadata_or_new(&self, project: ProjectId) -> Result<ProjectMetadata, StoreError> {
        Ok(self
            .load_metadata(project)?
            .unwrap_or_else(|| ProjectMetadata::new(project)))
    }

    /// All projects with stored data.
    pub fn list_projects(&self) -> Result<Vec<ProjectId>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut projects = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(db_err)?;
            let bytes: [u8; 16] = key
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Deserialization("Invalid project key".into()))?;
            projects.push(ProjectId::from_uuid(Uuid::from_bytes(bytes)));
        }
        Ok(projects)
    }

    /// Delete a project's cells, snapshot, images and metadata.
    pub fn delete_project(&self, project: ProjectId) -> Result<(), StoreError> {
        let cf_cells = self.cf(CF_CELLS)?;
        let cf_snapshots = self.cf(CF_SNAPSHOTS)?;
        let cf_images = self.cf(CF_IMAGES)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_snapshots, project.as_bytes());
        batch.delete_cf(&cf_meta, project.as_bytes());

        let prefix = project.as_bytes().to_vec();
        for item in self
            .db
            .iterator_cf(&cf_cells, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(&cf_cells, &key);
        }

        let image_prefix = format!("{project}/").into_bytes();
        for item in self
            .db
            .iterator_cf(&cf_images, IteratorMode::From(&image_prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&image_prefix) {
                break;
            }
            batch.delete_cf(&cf_images, &key);
        }

        self.db.write_opt(batch, &self.write_options()).map_err(db_err)?;
        log::info!("Deleted project {}", project);
        Ok(())
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(db_err)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    /// `<project:16><section bytes><0x00>`
    fn section_prefix(project: ProjectId, section: &SectionId) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + section.as_str().len() + 5);
        key.extend_from_slice(project.as_bytes());
        key.extend_from_slice(section.as_str().as_bytes());
        key.push(0);
        key
    }

    fn cell_key(project: ProjectId, section: &SectionId, id: CellId) -> Vec<u8> {
        let mut key = Self::section_prefix(project, section);
        key.extend_from_slice(&id.to_be_bytes());
        key
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

// ─── Adapter traits ───────────────────────────────────────────────────

#[async_trait]
impl CellStore for ProjectStore {
    async fn read_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
    ) -> Result<Vec<GridItem>, StoreError> {
        self.load_cells(project, section)
    }

    async fn upsert_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        cells: &[GridItem],
    ) -> Result<(), StoreError> {
        self.put_cells(project, section, cells).map(|_| ())
    }

    async fn delete_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        ids: &[CellId],
    ) -> Result<(), StoreError> {
        self.remove_cells(project, section, ids)
    }
}

#[async_trait]
impl SnapshotStore for ProjectStore {
    async fn read_snapshot(
        &self,
        project: ProjectId,
    ) -> Result<Option<CanvasSnapshot>, StoreError> {
        self.load_snapshot(project)
    }

    async fn write_snapshot(
        &self,
        project: ProjectId,
        snapshot: &CanvasSnapshot,
    ) -> Result<(), StoreError> {
        self.save_snapshot(project, snapshot).map(|_| ())
    }
}

#[async_trait]
impl ImageStore for ProjectStore {
    async fn upload_image(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        self.put_image(path, &bytes)
    }
}
