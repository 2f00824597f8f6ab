use std::fs;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{AssetAccessor, AssetRequest, AssetResponse, RequestCallback, RequestOutcome};
use super::task::RayonTaskProcessor;
use crate::uri;

/// Serves `file://` URLs and plain paths from the local file system.
///
/// Reads happen on rayon. A missing file answers with status 404, any
/// other IO error is a transport failure, and non-file URLs are rejected
/// as transport failures.
#[derive(Debug, Clone, Default)]
pub struct FileAssetAccessor {
    workers: RayonTaskProcessor,
}

impl FileAssetAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read files on the given processor's pool instead of the global one.
    pub fn with_workers(workers: RayonTaskProcessor) -> Self {
        Self { workers }
    }
}

struct FileRequest {
    url: String,
    cancelled: Arc<AtomicBool>,
}

impl AssetRequest for FileRequest {
    fn url(&self) -> &str {
        &self.url
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

fn read(url: &str) -> RequestOutcome {
    let Some(path) = uri::to_file_path(url) else {
        return Err(format!("unsupported URL scheme in {url}"));
    };

    match fs::read(path) {
        Ok(data) => Ok(AssetResponse {
            url: url.to_string(),
            status: 200,
            data,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AssetResponse {
            url: url.to_string(),
            status: 404,
            data: Vec::new(),
        }),
        Err(e) => Err(e.to_string()),
    }
}

impl AssetAccessor for FileAssetAccessor {
    fn request(&self, url: &str, on_complete: RequestCallback) -> Box<dyn AssetRequest> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let request = FileRequest {
            url: url.to_string(),
            cancelled: Arc::clone(&cancelled),
        };

        let url = url.to_string();
        self.workers.spawn(move || {
            if cancelled.load(Ordering::Acquire) {
                debug!(%url, "request cancelled before read");
                return;
            }
            let outcome = read(&url);
            if cancelled.load(Ordering::Acquire) {
                debug!(%url, "request cancelled after read");
                return;
            }
            on_complete(outcome);
        });

        Box::new(request)
    }
}
