//! Artifact upload with completion gating.
//!
//! An upload is three steps: the service provisions an upload record with a
//! presigned URL, the file bytes are PUT to that URL, and the record is polled
//! until the service has finished processing it. A run may only reference an
//! upload that reached [`UploadStatus::Succeeded`].
//!
//! [`Uploader::batch_upload`] runs many uploads at once on a bounded pool of
//! tasks. The first failure observed wins; the other tasks are left to finish
//! on their own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::select;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{CreateUploadRequest, DeviceFarmApi, Upload, UploadStatus, UploadType};
use crate::error::{DeviceFarmError, DeviceFarmResult};

/// Content type requested for every upload.
pub const OCTET_STREAM: &str = "application/octet-stream";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONCURRENT: usize = 4;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Uploads artifacts and waits for the service to process them.
///
/// Cloning is cheap; clones share the API client, HTTP client and
/// cancellation token.
#[derive(Clone)]
pub struct Uploader {
    api: Arc<dyn DeviceFarmApi>,
    http: reqwest::Client,
    poll_interval: Duration,
    max_concurrent: usize,
    cancellation_token: CancellationToken,
}

impl Uploader {
    /// Creates an uploader polling every 5 seconds with 4 concurrent uploads.
    pub fn new(api: Arc<dyn DeviceFarmApi>, http: reqwest::Client) -> Self {
        Self {
            api,
            http,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the number of uploads a batch runs at once. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Sets a cancellation token for stopping the processing wait.
    ///
    /// A cancelled wait returns the last observed record instead of an error;
    /// callers check [`UploadStatus::Succeeded`] before using it.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Uploads one file and waits until the service has processed it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceFarmError::Transfer`] if the file cannot be read (before
    /// any remote call is made), if the storage PUT fails or returns a
    /// non-success status, or if the service marks the upload FAILED.
    pub async fn upload(
        &self,
        path: &Path,
        project_arn: &str,
        upload_type: UploadType,
    ) -> DeviceFarmResult<Upload> {
        let name = file_name(path);
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            DeviceFarmError::transfer(path.display().to_string(), format!("cannot read file: {}", e))
        })?;

        let upload = self
            .api
            .create_upload(&CreateUploadRequest {
                project_arn: project_arn.to_string(),
                name: name.clone(),
                upload_type,
                content_type: OCTET_STREAM.to_string(),
            })
            .await?;
        debug!("Created upload {} for {} ({})", upload.arn, name, upload_type);

        self.put_bytes(&upload, &name, bytes).await?;
        self.wait_for_processing(upload, &name).await
    }

    async fn put_bytes(&self, upload: &Upload, name: &str, bytes: Vec<u8>) -> DeviceFarmResult<()> {
        let url = upload
            .url
            .as_deref()
            .ok_or_else(|| DeviceFarmError::transfer(name, "upload record has no URL"))?;
        let content_type = upload.content_type.as_deref().unwrap_or(OCTET_STREAM);

        let size = bytes.len();
        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| DeviceFarmError::transfer(name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceFarmError::transfer(
                name,
                format!("storage returned HTTP {}", status.as_u16()),
            ));
        }
        debug!("Transferred {} bytes for {}", size, name);
        Ok(())
    }

    async fn wait_for_processing(&self, mut upload: Upload, name: &str) -> DeviceFarmResult<Upload> {
        let mut last_status = None;

        loop {
            let current = self.api.get_upload(&upload.arn).await?;
            if last_status != Some(current.status) {
                info!("Upload {} is {}", name, current.status);
                last_status = Some(current.status);
            }

            match current.status {
                UploadStatus::Succeeded => return Ok(current),
                UploadStatus::Failed => {
                    let message = current
                        .message
                        .unwrap_or_else(|| "processing failed".to_string());
                    return Err(DeviceFarmError::transfer(
                        name,
                        format!("upload {} failed: {}", current.arn, message),
                    ));
                }
                _ => upload = current,
            }

            select! {
                _ = self.cancellation_token.cancelled() => {
                    warn!("Stopped waiting for upload {} ({})", name, upload.status);
                    return Ok(upload);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Uploads every file concurrently and returns the processed records.
    ///
    /// Records come back in completion order. If any upload fails the first
    /// error observed is returned and the remaining uploads are detached.
    pub async fn batch_upload(
        &self,
        paths: &[PathBuf],
        project_arn: &str,
        upload_type: UploadType,
    ) -> DeviceFarmResult<Vec<Upload>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for path in paths {
            let uploader = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            let project_arn = project_arn.to_string();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    DeviceFarmError::transfer(path.display().to_string(), "upload pool closed")
                })?;
                uploader.upload(&path, &project_arn, upload_type).await
            });
        }

        let mut uploads = Vec::with_capacity(paths.len());
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(DeviceFarmError::transfer(
                    upload_type.to_string(),
                    format!("upload task failed: {}", e),
                )),
            };

            match result {
                Ok(upload) => uploads.push(upload),
                Err(e) => {
                    tasks.detach_all();
                    return Err(e);
                }
            }
        }

        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeDeviceFarm;
    use tempfile::TempDir;
    use wiremock::matchers::{body_bytes, header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn storage(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex("^/upload/"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    fn uploader(fake: Arc<FakeDeviceFarm>) -> Uploader {
        Uploader::new(fake, reqwest::Client::new()).with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_before_remote_calls() {
        let fake = Arc::new(FakeDeviceFarm::new());

        let err = uploader(fake.clone())
            .upload(
                Path::new("/definitely/not/here/app.apk"),
                "1234",
                UploadType::AndroidApp,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceFarmError::Transfer { .. }));
        assert_eq!(fake.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_puts_bytes_and_waits_for_success() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.apk", b"apk-bytes");

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex("^/upload/app.apk$"))
            .and(header("content-type", OCTET_STREAM))
            .and(body_bytes(b"apk-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fake = Arc::new(
            FakeDeviceFarm::new()
                .with_upload_url_base(&server.uri())
                .with_upload_statuses(
                    "app.apk",
                    &[
                        UploadStatus::Processing,
                        UploadStatus::Processing,
                        UploadStatus::Succeeded,
                    ],
                ),
        );

        let upload = uploader(fake.clone())
            .upload(&app, "1234", UploadType::AndroidApp)
            .await
            .unwrap();

        assert_eq!(upload.status, UploadStatus::Succeeded);
        assert_eq!(upload.name, "app.apk");
        assert_eq!(fake.get_upload_calls(), 3);

        let requests = fake.create_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].project_arn, "1234");
        assert_eq!(requests[0].upload_type, UploadType::AndroidApp);
        assert_eq!(requests[0].content_type, OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_upload_rejected_put_is_transfer_error() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.apk", b"x");
        let server = storage(403).await;
        let fake = Arc::new(FakeDeviceFarm::new().with_upload_url_base(&server.uri()));

        let err = uploader(fake.clone())
            .upload(&app, "1234", UploadType::AndroidApp)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("403"), "{}", err);
        assert_eq!(fake.get_upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_failed_processing_is_transfer_error() {
        let dir = TempDir::new().unwrap();
        let package = write_file(&dir, "tests.apk", b"x");
        let server = storage(200).await;
        let fake = Arc::new(
            FakeDeviceFarm::new()
                .with_upload_url_base(&server.uri())
                .with_upload_statuses("tests.apk", &[UploadStatus::Failed]),
        );

        let err = uploader(fake)
            .upload(&package, "1234", UploadType::InstrumentationTestPackage)
            .await
            .unwrap_err();

        match err {
            DeviceFarmError::Transfer { artifact, message } => {
                assert_eq!(artifact, "tests.apk");
                assert!(message.contains("Invalid package"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_cancelled_wait_returns_last_record() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.apk", b"x");
        let server = storage(200).await;
        let fake = Arc::new(
            FakeDeviceFarm::new()
                .with_upload_url_base(&server.uri())
                .with_upload_statuses("app.apk", &[UploadStatus::Processing]),
        );

        let token = CancellationToken::new();
        token.cancel();
        let upload = uploader(fake.clone())
            .with_poll_interval(Duration::from_secs(60))
            .with_cancellation_token(token)
            .upload(&app, "1234", UploadType::AndroidApp)
            .await
            .unwrap();

        assert_eq!(upload.status, UploadStatus::Processing);
        assert_eq!(fake.get_upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_upload_returns_every_record() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = ["a.yml", "b.yml", "c.yml"]
            .iter()
            .map(|name| write_file(&dir, name, b"version: 0.1"))
            .collect();
        let server = storage(200).await;
        let fake = Arc::new(FakeDeviceFarm::new().with_upload_url_base(&server.uri()));

        let uploads = uploader(fake)
            .with_max_concurrent(2)
            .batch_upload(&paths, "1234", UploadType::InstrumentationTestSpec)
            .await
            .unwrap();

        let mut names: Vec<_> = uploads.into_iter().map(|u| u.name).collect();
        names.sort();
        assert_eq!(names, vec!["a.yml", "b.yml", "c.yml"]);
    }

    #[tokio::test]
    async fn test_batch_upload_fails_when_any_upload_fails() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_file(&dir, "good.apk", b"x"),
            write_file(&dir, "bad.apk", b"x"),
        ];
        let server = storage(200).await;
        let fake = Arc::new(
            FakeDeviceFarm::new()
                .with_upload_url_base(&server.uri())
                .with_upload_statuses("bad.apk", &[UploadStatus::Failed]),
        );

        let err = uploader(fake)
            .batch_upload(&paths, "1234", UploadType::AndroidApp)
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceFarmError::Transfer { ref artifact, .. } if artifact == "bad.apk"));
    }

    #[tokio::test]
    async fn test_batch_upload_empty() {
        let fake = Arc::new(FakeDeviceFarm::new());
        let uploads = uploader(fake)
            .batch_upload(&[], "1234", UploadType::AndroidApp)
            .await
            .unwrap();
        assert!(uploads.is_empty());
    }
}
