//! Batched download response stream.
//!
//! Each completed download emits one framed record onto a shared response
//! stream:
//!
//! ```text
//! [ 8-byte BE u64: path length ]
//! [ path bytes, UTF-8          ]
//! [ 8-byte BE u64: data length ]
//! [ data bytes                 ]
//! ```
//!
//! Records are concatenated back-to-back; the HTTP layer closes the stream
//! once the batch wait group drains.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::waitgroup::WaitGroup;

/// Version tag of the batch-download wire format.
pub const BATCH_DOWNLOAD_V1: u32 = 0;

/// Serialized access to one batch's response stream.
///
/// The handler creates one writer per batch request, enqueues a download
/// job per member, then awaits `wait` before tearing the stream down.
/// Workers write whole records under the mutex so frames never interleave.
pub struct BatchResponseWriter {
    sink: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Arc<WaitGroup>,
}

impl BatchResponseWriter {
    /// Wrap a response stream.
    pub fn new(sink: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            sink: Mutex::new(sink),
            pending: Arc::new(WaitGroup::new()),
        }
    }

    /// Wait group tracking outstanding download jobs for this batch.
    pub(crate) fn pending(&self) -> &Arc<WaitGroup> {
        &self.pending
    }

    /// Number of download jobs still outstanding.
    pub fn outstanding(&self) -> usize {
        self.pending.count()
    }

    /// Resolve once every enqueued download job has completed.
    pub async fn wait(&self) {
        self.pending.wait().await;
    }

    /// Write one framed record and flush.
    ///
    /// Write errors are logged, not surfaced; downloads are best-effort and
    /// the client detects truncation from the framing.
    pub(crate) async fn write_record(&self, record: &[u8]) {
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.write_all(record).await {
            log::warn!("response write failed: {}", err);
            return;
        }
        if let Err(err) = sink.flush().await {
            log::warn!("response flush failed: {}", err);
        }
    }
}

/// Append one framed record to `buf`.
///
/// # Arguments
/// * `buf` - Destination buffer, typically pool-acquired
/// * `path` - Absolute path of the downloaded file
/// * `data` - File content
pub(crate) fn encode_record(buf: &mut Vec<u8>, path: &str, data: &[u8]) {
    buf.extend_from_slice(&(path.len() as u64).to_be_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(&(data.len() as u64).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Byte length of a record framing the given path and content sizes.
pub(crate) fn record_len(path_len: usize, data_len: usize) -> usize {
    8 + path_len + 8 + data_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_record_layout() {
        let mut buf: Vec<u8> = Vec::new();
        encode_record(&mut buf, "/mnt/v/d1/f1", b"abc");

        // 8 + 12 + 8 + 3 bytes, exactly as framed on the wire.
        assert_eq!(buf.len(), record_len(12, 3));
        assert_eq!(&buf[0..8], &12u64.to_be_bytes());
        assert_eq!(&buf[8..20], b"/mnt/v/d1/f1");
        assert_eq!(&buf[20..28], &3u64.to_be_bytes());
        assert_eq!(&buf[28..31], b"abc");
    }

    #[test]
    fn test_encode_record_empty_path_and_data() {
        let mut buf: Vec<u8> = Vec::new();
        encode_record(&mut buf, "", b"");
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_records_concatenate() {
        let mut buf: Vec<u8> = Vec::new();
        encode_record(&mut buf, "/a", b"xy");
        encode_record(&mut buf, "/b", b"z");

        // Parse back sequentially.
        let mut offset: usize = 0;
        let mut seen: Vec<(String, Vec<u8>)> = Vec::new();
        while offset < buf.len() {
            let path_len: usize =
                u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap()) as usize;
            offset += 8;
            let path: String =
                String::from_utf8(buf[offset..offset + path_len].to_vec()).unwrap();
            offset += path_len;
            let data_len: usize =
                u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap()) as usize;
            offset += 8;
            let data: Vec<u8> = buf[offset..offset + data_len].to_vec();
            offset += data_len;
            seen.push((path, data));
        }
        assert_eq!(offset, buf.len());
        assert_eq!(seen, vec![("/a".to_string(), b"xy".to_vec()), ("/b".to_string(), b"z".to_vec())]);
    }
}
