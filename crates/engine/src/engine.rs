//! Engine state and public API.
//!
//! One `PrefetchEngine` serves one mounted volume. External commands enqueue
//! work onto one of three bounded queues (index-load, prefetch-path,
//! download); a pool of fungible workers drains all three. A janitor task
//! expires registry entries and dentry caches and publishes read metrics.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_channel as chan;
use prewarm_cache::{BlockPool, DentryCache};
use prewarm_common::{
    epoch_seconds, join_mount, split_dir_file, DATA_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
    INDEX_QUEUE_CAPACITY,
};
use tokio::task::JoinHandle;

use crate::download::DownloadJob;
use crate::error::EngineError;
use crate::fs::{FsClient, InodeAttr};
use crate::index::{parse_index_file, FileInfo, IndexInfo};
use crate::instance::{write_instance_config, InstanceInfo};
use crate::janitor::janitor_loop;
use crate::metrics::ReadMetrics;
use crate::resolver::{DirScanCache, IndexDentryMap, LookupCache};
use crate::response::BatchResponseWriter;
use crate::worker::worker_loop;

/// Startup parameters for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Volume backing the mount.
    pub vol_name: String,
    /// Mount point every accepted absolute path must carry.
    pub mount_point: String,
    /// IP published in the instance config, empty for local-only.
    pub local_ip: String,
    /// Number of worker tasks.
    pub workers: usize,
    /// Capacity of the index-load queue.
    pub index_queue_capacity: usize,
    /// Capacity of the prefetch-path and download queues.
    pub data_queue_capacity: usize,
}

impl EngineOptions {
    /// Options with defaults for the given volume and mount.
    pub fn new(vol_name: impl Into<String>, mount_point: impl Into<String>) -> Self {
        Self {
            vol_name: vol_name.into(),
            mount_point: mount_point.into(),
            local_ip: String::new(),
            workers: DEFAULT_WORKER_COUNT,
            index_queue_capacity: INDEX_QUEUE_CAPACITY,
            data_queue_capacity: DATA_QUEUE_CAPACITY,
        }
    }

    /// Set the worker count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the IP published in the instance config.
    pub fn with_local_ip(mut self, local_ip: impl Into<String>) -> Self {
        self.local_ip = local_ip.into();
        self
    }

    /// Override queue capacities.
    pub fn with_queue_capacities(mut self, index: usize, data: usize) -> Self {
        self.index_queue_capacity = index.max(1);
        self.data_queue_capacity = data.max(1);
        self
    }
}

/// Shared state behind the public engine handle.
pub(crate) struct PrefetchInner {
    pub(crate) options: EngineOptions,
    pub(crate) fs: Arc<dyn FsClient>,

    pub(crate) registry: RwLock<HashMap<String, Arc<IndexInfo>>>,
    pub(crate) dcache_map: IndexDentryMap,
    pub(crate) lookup_cache: LookupCache,
    pub(crate) app_pids: RwLock<HashSet<u32>>,
    pub(crate) metrics: ReadMetrics,
    pub(crate) pool: BlockPool,

    pub(crate) index_tx: chan::Sender<Arc<IndexInfo>>,
    pub(crate) index_rx: chan::Receiver<Arc<IndexInfo>>,
    pub(crate) path_tx: chan::Sender<Arc<FileInfo>>,
    pub(crate) path_rx: chan::Receiver<Arc<FileInfo>>,
    pub(crate) download_tx: chan::Sender<DownloadJob>,
    pub(crate) download_rx: chan::Receiver<DownloadJob>,
    pub(crate) shutdown_tx: chan::Sender<()>,
    pub(crate) shutdown_rx: chan::Receiver<()>,

    /// Shutdown gate: enqueues hold it as readers, `close` flips it as the
    /// writer, so no send races the shutdown decision.
    pub(crate) gate: tokio::sync::RwLock<bool>,
}

impl PrefetchInner {
    // ------------------------------------------------------------------
    // Enqueue (shared gate discipline)
    // ------------------------------------------------------------------

    pub(crate) async fn put_index(&self, info: Arc<IndexInfo>) -> Result<(), EngineError> {
        let gate = self.gate.read().await;
        if *gate {
            return Err(EngineError::Closed);
        }
        self.index_tx.send(info).await.map_err(|_| EngineError::Closed)
    }

    pub(crate) async fn put_path(&self, file: Arc<FileInfo>) -> Result<(), EngineError> {
        let gate = self.gate.read().await;
        if *gate {
            return Err(EngineError::Closed);
        }
        self.path_tx.send(file).await.map_err(|_| EngineError::Closed)
    }

    pub(crate) async fn put_download(
        &self,
        abs_path: String,
        file_info: Option<Arc<FileInfo>>,
        writer: Arc<BatchResponseWriter>,
    ) -> Result<(), EngineError> {
        let gate = self.gate.read().await;
        if *gate {
            return Err(EngineError::Closed);
        }
        // The job holds the batch wait-group entry from here on; dropping it
        // on any path completes that entry.
        let job: DownloadJob = DownloadJob::new(abs_path, file_info, writer);
        self.download_tx.send(job).await.map_err(|_| EngineError::Closed)
    }

    // ------------------------------------------------------------------
    // Index registry
    // ------------------------------------------------------------------

    pub(crate) async fn add_index(
        &self,
        dataset_id: &str,
        index_path: &str,
        ttl_minutes: i64,
    ) -> Result<(), EngineError> {
        let candidate: Arc<IndexInfo> =
            Arc::new(IndexInfo::new(dataset_id, index_path, ttl_minutes));

        let refreshed: Option<Arc<IndexInfo>> = {
            let mut registry = self.registry.write().unwrap();
            match registry.get(index_path) {
                Some(existing) if !existing.is_expired_at(epoch_seconds()) => {
                    Some(existing.clone())
                }
                // Absent or expired: the candidate takes the slot and a full
                // reload follows.
                _ => {
                    registry.insert(index_path.to_string(), candidate.clone());
                    None
                }
            }
        };

        if let Some(existing) = refreshed {
            existing.set_ttl(ttl_minutes);
            self.dcache_map
                .reset_for_index(index_path, existing.dentry_validity());
            log::info!("refreshed {}", existing);
            return Ok(());
        }

        if tokio::fs::metadata(index_path).await.is_err() {
            self.registry.write().unwrap().remove(index_path);
            return Err(EngineError::IndexNotFound {
                path: index_path.to_string(),
            });
        }
        self.put_index(candidate).await
    }

    /// Worker-side index load: parse, publish the member list, resolve
    /// inodes through a directory cache scoped to this one load.
    pub(crate) async fn handle_index_load(&self, info: Arc<IndexInfo>) {
        let start: std::time::Instant = std::time::Instant::now();
        if let Err(err) = self.load_index(&info).await {
            log::warn!("load of {} failed: {}", info, err);
            return;
        }
        log::info!("loaded {} in {:?}", info, start.elapsed());
    }

    async fn load_index(&self, info: &Arc<IndexInfo>) -> Result<(), EngineError> {
        let capacity_hint: usize = info.dataset_id().parse().unwrap_or(0);
        let files: Vec<Arc<FileInfo>> =
            match parse_index_file(info.path(), &self.options.mount_point, capacity_hint) {
                Ok(files) => files,
                Err(err) => {
                    self.registry.write().unwrap().remove(info.path());
                    return Err(EngineError::read(info.path(), err));
                }
            };

        // Publish into whichever entry now owns this path; the janitor may
        // have removed ours while the load sat in the queue.
        let actual: Arc<IndexInfo> = {
            let mut registry = self.registry.write().unwrap();
            match registry.get(info.path()) {
                Some(existing) => existing.clone(),
                None => {
                    registry.insert(info.path().to_string(), info.clone());
                    info.clone()
                }
            }
        };
        actual.set_files(files);

        let mut scan: DirScanCache = DirScanCache::new();
        for (line, file) in actual.files().iter().enumerate() {
            if file.path().is_empty() {
                continue;
            }
            if let Err(err) = self.resolve_member(&mut scan, &actual, file).await {
                log::warn!(
                    "{} line({}) path({}) resolution failed: {}",
                    actual,
                    line,
                    file.path(),
                    err
                );
            }
        }
        Ok(())
    }

    async fn resolve_member(
        &self,
        scan: &mut DirScanCache,
        index: &Arc<IndexInfo>,
        file: &Arc<FileInfo>,
    ) -> Result<(), EngineError> {
        let (dir, name) = split_dir_file(file.path());
        let found = scan.resolve_child(self.fs.as_ref(), dir, name).await?;
        match found.inode {
            Some(ino) => {
                self.dcache_map.record_child(found.parent_ino, name, ino, index);
                file.set_inode(ino);
                Ok(())
            }
            None => Err(EngineError::lookup(
                file.path(),
                "name not present in parent directory",
            )),
        }
    }

    pub(crate) fn matching_indexes(&self, dataset_id: &str) -> Vec<Arc<IndexInfo>> {
        self.registry
            .read()
            .unwrap()
            .values()
            .filter(|info| info.dataset_id() == dataset_id)
            .cloned()
            .collect()
    }

    pub(crate) async fn prefetch_by_index(
        &self,
        dataset_id: &str,
        line_index: u64,
    ) -> Result<(), EngineError> {
        for index in self.matching_indexes(dataset_id) {
            let Some(file) = index.file_at(line_index as usize) else {
                continue;
            };
            if file.path().is_empty() {
                log::warn!("{} has no member at line({})", index, line_index);
                continue;
            }
            self.put_path(file).await?;
        }
        Ok(())
    }

    pub(crate) async fn prefetch_inodes(&self, dataset_id: &str, batches: &[Vec<u64>]) {
        if !self.fs.has_inode_sink() {
            return;
        }
        let indexes: Vec<Arc<IndexInfo>> = self.matching_indexes(dataset_id);
        let mut inodes: Vec<u64> = Vec::new();
        for batch in batches {
            for &line in batch {
                for index in &indexes {
                    let Some(file) = index.file_at(line as usize) else {
                        continue;
                    };
                    let ino: u64 = file.inode();
                    if ino != 0 {
                        inodes.push(ino);
                    } else {
                        log::warn!("{} line({}) is unresolved", index, line);
                    }
                }
            }
        }
        if inodes.is_empty() {
            return;
        }
        let attrs: Vec<InodeAttr> = self.fs.batch_inode_get(&inodes).await;
        for attr in attrs {
            self.fs.put_inode(attr);
        }
    }

    pub(crate) fn batch_file_infos(
        &self,
        dataset_id: &str,
        batches: &[Vec<u64>],
    ) -> Vec<Arc<FileInfo>> {
        let indexes: Vec<Arc<IndexInfo>> = self.matching_indexes(dataset_id);
        let mut out: Vec<Arc<FileInfo>> = Vec::new();
        for batch in batches {
            for &line in batch {
                for index in &indexes {
                    let Some(file) = index.file_at(line as usize) else {
                        continue;
                    };
                    if file.path().is_empty() {
                        log::warn!("{} has no member at line({})", index, line);
                        continue;
                    }
                    out.push(file);
                }
            }
        }
        out
    }
}

/// Prefetch and batch-download engine for one mounted volume.
///
/// Construct inside a tokio runtime; workers and the janitor are spawned
/// immediately. Call [`close`](Self::close) before dropping to stop them
/// and complete any queued download jobs.
pub struct PrefetchEngine {
    inner: Arc<PrefetchInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PrefetchEngine {
    /// Start an engine over the given filesystem client.
    ///
    /// # Arguments
    /// * `fs` - Distributed-filesystem client for the mounted volume
    /// * `options` - Startup parameters
    pub fn new(fs: Arc<dyn FsClient>, options: EngineOptions) -> Self {
        let workers: usize = options.workers;
        let (index_tx, index_rx) = chan::bounded(options.index_queue_capacity);
        let (path_tx, path_rx) = chan::bounded(options.data_queue_capacity);
        let (download_tx, download_rx) = chan::bounded(options.data_queue_capacity);
        let (shutdown_tx, shutdown_rx) = chan::bounded(1);

        let inner: Arc<PrefetchInner> = Arc::new(PrefetchInner {
            options,
            fs,
            registry: RwLock::new(HashMap::new()),
            dcache_map: IndexDentryMap::new(),
            lookup_cache: LookupCache::new(),
            app_pids: RwLock::new(HashSet::new()),
            metrics: ReadMetrics::new(),
            pool: BlockPool::new(),
            index_tx,
            index_rx,
            path_tx,
            path_rx,
            download_tx,
            download_rx,
            shutdown_tx,
            shutdown_rx,
            gate: tokio::sync::RwLock::new(false),
        });

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(workers + 1);
        for id in 0..workers {
            tasks.push(tokio::spawn(worker_loop(inner.clone(), id)));
        }
        tasks.push(tokio::spawn(janitor_loop(inner.clone())));
        log::info!(
            "prefetch engine for volume({}) started with {} workers",
            inner.options.vol_name,
            workers
        );

        Self {
            inner,
            tasks: Mutex::new(tasks),
        }
    }

    /// Register (or refresh) an index file under a dataset.
    ///
    /// A new path is verified to exist and queued for loading. A known,
    /// unexpired path only has its TTL and dentry expirations refreshed;
    /// the member list is not reparsed. A known but expired path is
    /// replaced and reloaded.
    ///
    /// # Arguments
    /// * `dataset_id` - Caller-chosen dataset grouping key
    /// * `index_path` - Absolute path of the index file
    /// * `ttl_minutes` - Entry lifetime; 0 keeps it until shutdown
    pub async fn add_index(
        &self,
        dataset_id: &str,
        index_path: &str,
        ttl_minutes: i64,
    ) -> Result<(), EngineError> {
        self.inner.add_index(dataset_id, index_path, ttl_minutes).await
    }

    /// Queue a read-through of the member at `line_index` in every index of
    /// the dataset.
    pub async fn prefetch_by_index(
        &self,
        dataset_id: &str,
        line_index: u64,
    ) -> Result<(), EngineError> {
        self.inner.prefetch_by_index(dataset_id, line_index).await
    }

    /// Push inode metadata for the given line indices into the client's
    /// inode cache. A no-op when the client has no sink.
    pub async fn prefetch_inodes(&self, dataset_id: &str, batches: &[Vec<u64>]) {
        self.inner.prefetch_inodes(dataset_id, batches).await
    }

    /// Queue a read-through of an absolute path.
    pub async fn prefetch_by_path(&self, abs_path: &str) -> Result<(), EngineError> {
        self.inner
            .put_path(Arc::new(FileInfo::absolute(abs_path)))
            .await
    }

    /// Member records for the given line indices, for caller-driven
    /// downloads.
    pub fn get_batch_file_infos(
        &self,
        dataset_id: &str,
        batches: &[Vec<u64>],
    ) -> Vec<Arc<FileInfo>> {
        self.inner.batch_file_infos(dataset_id, batches)
    }

    /// Queue a download of an index member onto the batch response stream.
    ///
    /// # Arguments
    /// * `file` - Member record, typically from `get_batch_file_infos`
    /// * `writer` - Batch response stream shared by the HTTP handler
    pub async fn download(
        &self,
        file: Arc<FileInfo>,
        writer: Arc<BatchResponseWriter>,
    ) -> Result<(), EngineError> {
        let abs_path: String = if file.is_absolute() {
            file.path().to_string()
        } else {
            join_mount(&self.inner.options.mount_point, file.path())
        };
        self.inner.put_download(abs_path, Some(file), writer).await
    }

    /// Queue a download of an absolute path onto the batch response stream.
    pub async fn download_path(
        &self,
        abs_path: &str,
        writer: Arc<BatchResponseWriter>,
    ) -> Result<(), EngineError> {
        self.inner
            .put_download(abs_path.to_string(), None, writer)
            .await
    }

    /// Dentry cache for a parent directory, if one is live.
    pub fn get_dentry_cache(&self, parent_ino: u64) -> Option<Arc<DentryCache>> {
        self.inner.dcache_map.get(parent_ino)
    }

    /// Register a training-process pid.
    pub fn put_app_pid(&self, pid: u32) {
        self.inner.app_pids.write().unwrap().insert(pid);
    }

    /// Remove a training-process pid.
    pub fn delete_app_pid(&self, pid: u32) {
        self.inner.app_pids.write().unwrap().remove(&pid);
    }

    /// Whether a pid belongs to a registered training process.
    pub fn contains_app_pid(&self, pid: u32) -> bool {
        self.inner.app_pids.read().unwrap().contains(&pid)
    }

    /// Count one read observed on the mount.
    pub fn add_total_read_count(&self) {
        self.inner.metrics.add_total();
    }

    /// Count one read that reached the backend for the application.
    pub fn add_app_read_count(&self) {
        self.inner.metrics.add_app();
    }

    /// Publish the instance discovery file for this engine.
    ///
    /// # Arguments
    /// * `prof_port` - Port of the control HTTP listener
    pub fn write_instance_config(&self, prof_port: u64) -> Result<(), EngineError> {
        write_instance_config(&InstanceInfo {
            prof: prof_port,
            mount_point: self.inner.options.mount_point.clone(),
            local_ip: self.inner.options.local_ip.clone(),
            vol_name: self.inner.options.vol_name.clone(),
        })
    }

    /// Current depths of the index-load, prefetch-path, and download
    /// queues.
    pub fn queue_depths(&self) -> (usize, usize, usize) {
        (
            self.inner.index_rx.len(),
            self.inner.path_rx.len(),
            self.inner.download_rx.len(),
        )
    }

    /// Mount point served by this engine.
    pub fn mount_point(&self) -> &str {
        &self.inner.options.mount_point
    }

    /// Volume backing the mount.
    pub fn vol_name(&self) -> &str {
        &self.inner.options.vol_name
    }

    /// Stop accepting work, join the workers and the janitor, then discard
    /// queued download jobs so every batch wait group drains.
    ///
    /// In-flight handlers run to completion. Idempotent.
    pub async fn close(&self) {
        {
            let mut closed = self.inner.gate.write().await;
            if *closed {
                return;
            }
            *closed = true;
        }
        self.inner.shutdown_tx.close();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            if let Err(err) = task.await {
                log::error!("engine task join failed: {}", err);
            }
        }

        let mut discarded: u64 = 0;
        while let Ok(job) = self.inner.download_rx.try_recv() {
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("discarded queued download {}", job);
            }
            discarded += 1;
            drop(job);
        }
        if discarded > 0 {
            log::info!("discarded {} queued downloads at shutdown", discarded);
        }
        log::info!("prefetch engine for volume({}) closed", self.inner.options.vol_name);
    }
}
