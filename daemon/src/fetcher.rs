use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::task::Task;

/// Retrieves a task's asset and stores it locally.
pub trait AssetFetcher: Send + Sync + 'static {
    /// Fetch the asset named `identifier`, returning where it was written.
    fn fetch(&self, identifier: &str) -> impl Future<Output = Result<PathBuf, FetchError>> + Send;
}

/// Downloads assets from `<base>/static/images/<identifier>`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    storage: PathBuf,
}

impl HttpFetcher {
    pub fn new(base_url: &str, storage: PathBuf) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
        })
    }

    pub fn asset_url(&self, identifier: &str) -> String {
        format!("{}/static/images/{}", self.base_url, identifier)
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }
}

impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str) -> Result<PathBuf, FetchError> {
        validate_identifier(identifier)?;

        let url = self.asset_url(identifier);
        log::debug!("Downloading {}", url);

        let mut response = self.client.get(&url).send().await?.error_for_status()?;

        // Stage the body next to its destination; an existing copy is only
        // replaced once the download completed. The staged file is removed
        // when it is dropped on an error path.
        let staging = tempfile::Builder::new()
            .prefix(".wallsync-")
            .suffix(".part")
            .tempfile_in(&self.storage)?;
        let (file, staged_path) = staging.into_parts();

        let mut file = tokio::fs::File::from_std(file);
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let dest = self.storage.join(identifier);
        staged_path.persist(&dest).map_err(std::io::Error::from)?;

        Ok(dest)
    }
}

/// Reject identifiers that would resolve outside the storage directory.
pub fn validate_identifier(identifier: &str) -> Result<(), FetchError> {
    let invalid = identifier.is_empty()
        || identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\'])
        || identifier.contains('\0');

    if invalid {
        return Err(FetchError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

/// Start a detached download for `task` unless its asset is already local.
///
/// On success the task's local path is set; failures are logged and leave
/// the task waiting until the list is replaced.
pub fn dispatch<F: AssetFetcher>(fetcher: &Arc<F>, task: &Task) {
    if task.is_ready() {
        return;
    }

    let fetcher = Arc::clone(fetcher);
    let task = task.clone();
    tokio::spawn(async move {
        match fetcher.fetch(task.identifier()).await {
            Ok(path) => {
                log::info!("Fetched {} -> {}", task.identifier(), path.display());
                task.mark_ready(path);
            }
            Err(e) => {
                log::warn!("Failed to fetch {}: {}", task.identifier(), e);
            }
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Resolves every identifier to `/assets/<identifier>` except the ones
    /// listed as failing.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub failing: HashSet<String>,
        pub requested: Mutex<Vec<String>>,
    }

    impl AssetFetcher for FakeFetcher {
        async fn fetch(&self, identifier: &str) -> Result<PathBuf, FetchError> {
            self.requested.lock().unwrap().push(identifier.to_string());
            if self.failing.contains(identifier) {
                return Err(FetchError::Io(std::io::Error::other("unavailable")));
            }
            Ok(Path::new("/assets").join(identifier))
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("sunset.jpg").is_ok());
        assert!(validate_identifier("..hidden.jpg").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("..").is_err());
        assert!(validate_identifier("../etc/passwd").is_err());
        assert!(validate_identifier("dir/file.jpg").is_err());
        assert!(validate_identifier("dir\\file.jpg").is_err());
    }

    #[test]
    fn test_asset_url() {
        let fetcher = HttpFetcher::new("http://localhost:5000/", PathBuf::from("/tmp")).unwrap();
        assert_eq!(
            fetcher.asset_url("a.jpg"),
            "http://localhost:5000/static/images/a.jpg"
        );
        assert_eq!(fetcher.storage(), Path::new("/tmp"));
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_traversal_before_request() {
        let fetcher = HttpFetcher::new("http://127.0.0.1:9", PathBuf::from("/tmp")).unwrap();
        assert!(matches!(
            fetcher.fetch("../escape.jpg").await,
            Err(FetchError::InvalidIdentifier(_))
        ));
    }

    /// Answer one request per entry of `responses`, in order, closing the
    /// connection after each.
    async fn serve_http(responses: Vec<&'static [u8]>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let read = stream.read(&mut buf).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..read]);
                }
                let _ = stream.write_all(response).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", address)
    }

    const GOOD: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nGOODIMAGE!";
    const TRUNCATED: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\nBROKEN";
    const NOT_FOUND: &[u8] =
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_http_fetch_stores_body() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_http(vec![GOOD]).await;
        let fetcher = HttpFetcher::new(&base, dir.path().to_path_buf()).unwrap();

        let path = fetcher.fetch("a.jpg").await.unwrap();

        assert_eq!(path, dir.path().join("a.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"GOODIMAGE!");
        assert_eq!(entries(dir.path()), vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn test_http_fetch_not_found_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_http(vec![NOT_FOUND]).await;
        let fetcher = HttpFetcher::new(&base, dir.path().to_path_buf()).unwrap();

        match fetcher.fetch("missing.jpg").await {
            Err(FetchError::Http(e)) => {
                assert_eq!(e.status(), Some(reqwest::StatusCode::NOT_FOUND));
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_truncated_download_keeps_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_http(vec![GOOD, TRUNCATED]).await;
        let fetcher = HttpFetcher::new(&base, dir.path().to_path_buf()).unwrap();

        let path = fetcher.fetch("a.jpg").await.unwrap();
        assert!(fetcher.fetch("a.jpg").await.is_err());

        assert_eq!(std::fs::read(&path).unwrap(), b"GOODIMAGE!");
        assert_eq!(entries(dir.path()), vec!["a.jpg"]);

        let offline = crate::library::scan(dir.path(), &["jpg".to_string()], 30);
        assert_eq!(offline.len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_first_download_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_http(vec![TRUNCATED]).await;
        let fetcher = HttpFetcher::new(&base, dir.path().to_path_buf()).unwrap();

        assert!(fetcher.fetch("b.jpg").await.is_err());
        assert!(entries(dir.path()).is_empty());
        assert!(crate::library::scan(dir.path(), &["jpg".to_string()], 30).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_marks_task_ready() {
        let fetcher = Arc::new(FakeFetcher::default());
        let task = Task::remote("a.jpg", 5);

        dispatch(&fetcher, &task);
        wait_until(|| task.is_ready()).await;

        assert_eq!(task.local_path(), Some(Path::new("/assets/a.jpg")));
    }

    #[tokio::test]
    async fn test_dispatch_failure_leaves_task_waiting() {
        let fetcher = Arc::new(FakeFetcher {
            failing: HashSet::from(["b.jpg".to_string()]),
            ..Default::default()
        });
        let task = Task::remote("b.jpg", 5);

        dispatch(&fetcher, &task);
        wait_until(|| !fetcher.requested.lock().unwrap().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!task.is_ready());
    }

    #[tokio::test]
    async fn test_dispatch_skips_local_tasks() {
        let fetcher = Arc::new(FakeFetcher::default());
        let task = Task::local("c.jpg", PathBuf::from("/pictures/c.jpg"), 5);

        dispatch(&fetcher, &task);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(fetcher.requested.lock().unwrap().is_empty());
        assert_eq!(task.local_path(), Some(Path::new("/pictures/c.jpg")));
    }
}
