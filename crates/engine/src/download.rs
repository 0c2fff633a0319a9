//! Download handler: read one file and frame it onto the batch stream.

use std::fmt;
use std::sync::Arc;

use crate::engine::PrefetchInner;
use crate::error::EngineError;
use crate::index::FileInfo;
use crate::response::{encode_record, record_len, BatchResponseWriter};
use crate::waitgroup::{WaitGroup, WaitGroupGuard};

/// One queued download.
///
/// Holds the batch wait-group entry from enqueue until drop, so the entry
/// completes exactly once on every path: success, failure, handler panic,
/// or shutdown drain.
pub(crate) struct DownloadJob {
    pub(crate) abs_path: String,
    pub(crate) file_info: Option<Arc<FileInfo>>,
    pub(crate) writer: Arc<BatchResponseWriter>,
    _guard: WaitGroupGuard,
}

impl DownloadJob {
    pub(crate) fn new(
        abs_path: String,
        file_info: Option<Arc<FileInfo>>,
        writer: Arc<BatchResponseWriter>,
    ) -> Self {
        let guard: WaitGroupGuard = WaitGroup::add(writer.pending());
        Self {
            abs_path,
            file_info,
            writer,
            _guard: guard,
        }
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_info {
            Some(info) => write!(f, "path({}) member({})", self.abs_path, info),
            None => write!(f, "path({})", self.abs_path),
        }
    }
}

impl PrefetchInner {
    /// Serve one download job. Failures are logged, never surfaced; the
    /// job's wait-group entry completes when the job drops.
    pub(crate) async fn handle_download(&self, job: DownloadJob) {
        if let Err(err) = self.send_file(&job).await {
            log::warn!("download {} failed: {}", job, err);
        }
    }

    async fn send_file(&self, job: &DownloadJob) -> Result<(), EngineError> {
        let resolved: Option<u64> = job
            .file_info
            .as_ref()
            .map(|file| file.inode())
            .filter(|&ino| ino != 0);
        let ino: u64 = match resolved {
            Some(ino) => ino,
            None => {
                self.lookup_cache
                    .resolve_absolute(
                        self.fs.as_ref(),
                        &self.options.mount_point,
                        &job.abs_path,
                    )
                    .await?
            }
        };

        self.fs.open_stream(ino).await?;
        let result: Result<(), EngineError> = self.read_and_frame(ino, job).await;
        if let Err(err) = self.fs.close_stream(ino).await {
            log::warn!("close stream ino({}) failed: {}", ino, err);
        }
        result
    }

    async fn read_and_frame(&self, ino: u64, job: &DownloadJob) -> Result<(), EngineError> {
        let file_size: usize = self.fs.file_size(ino).await.unwrap_or(0) as usize;
        if file_size == 0 {
            return Err(EngineError::EmptyFile {
                path: job.abs_path.clone(),
            });
        }

        let mut content: Vec<u8> = self.pool.acquire(file_size);
        content.resize(file_size, 0);
        let read: usize = match self.fs.read(ino, &mut content[..file_size], 0).await {
            Ok(read) => read,
            Err(err) => {
                self.pool.release(content);
                return Err(err);
            }
        };
        if read == 0 {
            self.pool.release(content);
            return Err(EngineError::EmptyFile {
                path: job.abs_path.clone(),
            });
        }

        let mut record: Vec<u8> = self.pool.acquire(record_len(job.abs_path.len(), read));
        encode_record(&mut record, &job.abs_path, &content[..read]);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "framed record path({}) bytes({}) total({})",
                job.abs_path,
                read,
                record.len()
            );
        }
        job.writer.write_record(&record).await;

        self.pool.release(record);
        self.pool.release(content);
        Ok(())
    }
}
