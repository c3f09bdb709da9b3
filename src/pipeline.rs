//! The upload → schedule → poll → report pipeline.
//!
//! [`DeviceFarmServer`] implements [`TestServer`], the capability a build
//! tool calls once it has produced an app (and possibly a test package).
//!
//! # Execution Flow
//!
//! 1. **Resolution**: project, device pool (and its devices when sharding)
//!    and any named test spec are looked up by name. A miss stops the
//!    pipeline before anything is uploaded.
//! 2. **Upload**: app, auxiliary apps, test package, test specs and extra
//!    data upload concurrently. Every upload must succeed; cancellation
//!    during the uploads stops the pipeline before scheduling.
//! 3. **Scheduling**: one request, or one per shard, submitted sequentially.
//! 4. **Polling**: each run is polled to completion, timeout or cancellation.
//! 5. **Reporting**: completed runs are translated and written as JUnit XML,
//!    one subdirectory per run when sharded. A run that cannot be reported
//!    counts as failed without stopping the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{DeviceFarmApi, Upload, UploadType};
use crate::arn::run_url_from_arn;
use crate::compose::{RunComposer, UploadedArtifacts};
use crate::config::{Config, TestPackage, expand_path};
use crate::error::{DeviceFarmError, DeviceFarmResult};
use crate::lookup::{find_device_pool_by_name, find_project_by_name, find_test_spec_by_name};
use crate::poller::{PollState, RunPoller};
use crate::report::{ResultTranslator, RunReport, print_summary, run_report_dir, write_reports};
use crate::upload::Uploader;

/// Files produced by the build that triggers a test run.
#[derive(Debug, Clone)]
pub struct BuildArtifacts {
    /// The application under test (`.apk` or `.ipa`).
    pub app: PathBuf,
    /// Test package built alongside the app, used by instrumentation runs.
    pub test_package: Option<PathBuf>,
}

/// A test backend a build tool can hand its artifacts to.
#[async_trait]
pub trait TestServer: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `true` if the server has everything it needs to run.
    fn is_configured(&self) -> bool;

    /// Uploads the artifacts and runs the tests.
    async fn upload_artifacts(&self, artifacts: &BuildArtifacts)
    -> DeviceFarmResult<PipelineResult>;
}

/// Final state of one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    /// Scheduled but not waited on.
    Submitted,
    Passed,
    Failed,
    TimedOut,
    Cancelled,
}

/// One scheduled run and what became of it.
#[derive(Debug, Clone)]
pub struct ShardOutcome {
    pub name: String,
    pub run_arn: String,
    pub console_url: String,
    pub status: ShardStatus,
    pub report: Option<RunReport>,
    pub waited: Duration,
}

impl ShardOutcome {
    /// The timeout error for a shard whose poll ran out of time.
    pub fn timeout_error(&self) -> Option<DeviceFarmError> {
        (self.status == ShardStatus::TimedOut).then(|| DeviceFarmError::Timeout {
            arn: self.run_arn.clone(),
            waited_secs: self.waited.as_secs(),
        })
    }
}

/// Outcome of a whole pipeline invocation.
///
/// # Exit Codes
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | Every shard passed, or was submitted without waiting |
/// | 1 | Some shard failed, timed out or was cancelled |
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub shards: Vec<ShardOutcome>,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.shards
            .iter()
            .all(|shard| matches!(shard.status, ShardStatus::Passed | ShardStatus::Submitted))
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Runs tests on the remote device farm.
pub struct DeviceFarmServer {
    config: Config,
    api: Arc<dyn DeviceFarmApi>,
    uploader: Uploader,
    run_interval: Duration,
    max_wait: Duration,
    cancellation_token: CancellationToken,
}

impl DeviceFarmServer {
    /// Creates a server with intervals and limits taken from `config`.
    pub fn new(config: Config, api: Arc<dyn DeviceFarmApi>, http: reqwest::Client) -> Self {
        let cancellation_token = CancellationToken::new();
        let uploader = Uploader::new(Arc::clone(&api), http)
            .with_poll_interval(config.polling.upload_interval())
            .with_max_concurrent(config.devicefarm.max_concurrent_uploads)
            .with_cancellation_token(cancellation_token.clone());

        Self {
            run_interval: config.polling.run_interval(),
            max_wait: config.polling.max_wait(),
            config,
            api,
            uploader,
            cancellation_token,
        }
    }

    /// Sets the token that stops upload waits and run polling.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.uploader = self.uploader.with_cancellation_token(token.clone());
        self.cancellation_token = token;
        self
    }

    /// Overrides the poll intervals and the run wait ceiling.
    pub fn with_polling(
        mut self,
        upload_interval: Duration,
        run_interval: Duration,
        max_wait: Duration,
    ) -> Self {
        self.uploader = self.uploader.with_poll_interval(upload_interval);
        self.run_interval = run_interval;
        self.max_wait = max_wait;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Polls an already scheduled run and reports on it.
    pub async fn report_run(&self, name: &str, run_arn: &str) -> DeviceFarmResult<ShardOutcome> {
        let report_dir = self.config.report.junit_dir.as_deref().map(expand_path);
        self.follow_run(name, run_arn, report_dir.as_deref()).await
    }

    async fn follow_run(
        &self,
        name: &str,
        run_arn: &str,
        report_dir: Option<&Path>,
    ) -> DeviceFarmResult<ShardOutcome> {
        let console_url = run_url_from_arn(&self.config.devicefarm.console_url, run_arn);
        let poller = RunPoller::new(
            Arc::clone(&self.api),
            self.config.devicefarm.console_url.clone(),
        )
        .with_interval(self.run_interval)
        .with_max_wait(self.max_wait)
        .with_cancellation_token(self.cancellation_token.clone());

        let outcome = poller.poll(run_arn).await?;
        let mut shard = ShardOutcome {
            name: name.to_string(),
            run_arn: run_arn.to_string(),
            console_url,
            status: ShardStatus::Cancelled,
            report: None,
            waited: outcome.waited,
        };

        let run = match (outcome.state, outcome.run) {
            (PollState::Completed, Some(run)) => run,
            (PollState::TimedOut, _) => {
                shard.status = ShardStatus::TimedOut;
                if let Some(e) = shard.timeout_error() {
                    warn!("{}", e);
                }
                return Ok(shard);
            }
            _ => return Ok(shard),
        };

        let report = ResultTranslator::new(Arc::clone(&self.api))
            .build_report(&run)
            .await?;
        if let Some(dir) = report_dir {
            write_reports(&report, dir);
        }

        let passed = match run.result {
            Some(_) => run.passed() && report.success(),
            None => report.success(),
        };
        shard.status = if passed {
            ShardStatus::Passed
        } else {
            ShardStatus::Failed
        };
        info!(
            "Run {} finished: {} ({:?})",
            name,
            run.result.as_deref().unwrap_or("no result"),
            shard.status
        );

        shard.report = Some(report);
        Ok(shard)
    }

    async fn upload_all(
        &self,
        project_arn: &str,
        app: &Path,
        test_package: &TestPackage,
    ) -> DeviceFarmResult<UploadedArtifacts> {
        let state = &self.config.device_state;
        let test = &self.config.test;
        let auxiliary_apps: Vec<PathBuf> =
            state.auxiliary_apps.iter().map(|p| expand_path(p)).collect();
        let test_specs: Vec<PathBuf> = test.test_specs.iter().map(|p| expand_path(p)).collect();

        let app_upload = self.uploader.upload(app, project_arn, app_upload_type(app));
        let aux_uploads = self
            .uploader
            .batch_upload(&auxiliary_apps, project_arn, UploadType::AndroidApp);
        let package_upload = async {
            match test_package {
                TestPackage::Plain => Ok(None),
                TestPackage::WithTestPackage { path, upload_type } => self
                    .uploader
                    .upload(path, project_arn, *upload_type)
                    .await
                    .map(Some),
            }
        };
        let spec_uploads = async {
            match test.kind.spec_upload_type() {
                Some(upload_type) => {
                    self.uploader
                        .batch_upload(&test_specs, project_arn, upload_type)
                        .await
                }
                None => Ok(Vec::new()),
            }
        };
        let extra_data_upload = async {
            match &state.extra_data_zip {
                Some(zip) => self
                    .uploader
                    .upload(&expand_path(zip), project_arn, UploadType::ExternalData)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (app, auxiliary_apps, test_package, mut specs, extra_data) = tokio::try_join!(
            app_upload,
            aux_uploads,
            package_upload,
            spec_uploads,
            extra_data_upload
        )?;

        info!("Will test app in {}, {}", app.name, app.arn);
        for upload in &auxiliary_apps {
            info!("Will install additional app {}, {}", upload.name, upload.arn);
        }
        if let Some(package) = &test_package {
            info!("Will run tests in {}, {}", package.name, package.arn);
        }
        if let Some(data) = &extra_data {
            info!("Will copy data from zip {}, {}", data.name, data.arn);
        }

        sort_like(&mut specs, &test_specs);
        Ok(UploadedArtifacts {
            app,
            auxiliary_apps,
            test_package,
            test_specs: specs,
            extra_data,
            existing_test_spec: None,
        })
    }
}

#[async_trait]
impl TestServer for DeviceFarmServer {
    fn name(&self) -> &str {
        "devicefarm"
    }

    fn is_configured(&self) -> bool {
        let problems = self.config.validate();
        for problem in &problems {
            warn!("{}", problem);
        }
        let configured = problems.is_empty();
        info!(
            "Device Farm configuration is {}",
            if configured { "VALID" } else { "NOT VALID" }
        );
        configured
    }

    async fn upload_artifacts(&self, artifacts: &BuildArtifacts) -> DeviceFarmResult<PipelineResult> {
        let api = self.api.as_ref();
        let df = &self.config.devicefarm;

        let project = find_project_by_name(api, &df.project).await?;
        info!("Using project \"{}\", \"{}\"", project.name, project.arn);

        let pool = find_device_pool_by_name(api, &project, &df.device_pool).await?;
        info!("Using device pool \"{}\", \"{}\"", pool.name, pool.arn);

        let composer = RunComposer::new(&self.config);
        let target = composer.target_pool(pool)?;

        let existing_test_spec = match &self.config.test.test_spec_name {
            Some(name) if self.config.test.test_specs.is_empty() => {
                let spec = find_test_spec_by_name(api, &project, name).await?;
                info!("Using test spec \"{}\", \"{}\"", spec.name, spec.arn);
                Some(spec)
            }
            _ => None,
        };

        let test_package = self
            .config
            .test
            .resolve_test_package(artifacts.test_package.as_deref());

        let mut uploaded = self
            .upload_all(&project.arn, &artifacts.app, &test_package)
            .await?;
        uploaded.existing_test_spec = existing_test_spec;

        let unprocessed: Vec<String> = uploaded
            .unprocessed()
            .into_iter()
            .map(str::to_string)
            .collect();
        if self.cancellation_token.is_cancelled() || !unprocessed.is_empty() {
            warn!("Cancelled before scheduling, unprocessed uploads: {:?}", unprocessed);
            return Err(DeviceFarmError::Cancelled { unprocessed });
        }

        let requests = composer.compose(&project, &target, &uploaded)?;
        let sharded = composer.is_sharded(&uploaded);

        let mut scheduled = Vec::with_capacity(requests.len());
        for request in &requests {
            if self.cancellation_token.is_cancelled() {
                if scheduled.is_empty() {
                    return Err(DeviceFarmError::Cancelled {
                        unprocessed: Vec::new(),
                    });
                }
                warn!(
                    "Cancelled, {} of {} runs were not scheduled",
                    requests.len() - scheduled.len(),
                    requests.len()
                );
                break;
            }

            let run = self.api.schedule_run(request).await?;
            info!(
                "View the {:?} run \"{}\" in the Device Farm console: {}",
                request.test.test_type,
                request.name,
                run_url_from_arn(&df.console_url, &run.arn)
            );
            scheduled.push((request.name.clone(), run.arn));
        }

        let base_dir = self.config.report.junit_dir.as_deref().map(expand_path);
        let mut result = PipelineResult::default();
        for (name, run_arn) in scheduled {
            let shard = if self.config.report.wait {
                let report_dir = base_dir.as_deref().map(|base| {
                    if sharded {
                        run_report_dir(base, &run_arn)
                    } else {
                        base.to_path_buf()
                    }
                });
                match self.follow_run(&name, &run_arn, report_dir.as_deref()).await {
                    Ok(shard) => shard,
                    Err(e) => {
                        error!("Failed to report on run {}: {}", name, e);
                        ShardOutcome {
                            console_url: run_url_from_arn(&df.console_url, &run_arn),
                            name,
                            run_arn,
                            status: ShardStatus::Failed,
                            report: None,
                            waited: Duration::ZERO,
                        }
                    }
                }
            } else {
                ShardOutcome {
                    console_url: run_url_from_arn(&df.console_url, &run_arn),
                    name,
                    run_arn,
                    status: ShardStatus::Submitted,
                    report: None,
                    waited: Duration::ZERO,
                }
            };

            if let Some(report) = &shard.report {
                print_summary(report);
            }
            result.shards.push(shard);
        }

        Ok(result)
    }
}

fn app_upload_type(app: &Path) -> UploadType {
    match app.extension().and_then(|ext| ext.to_str()) {
        Some("ipa") => UploadType::IosApp,
        _ => UploadType::AndroidApp,
    }
}

/// Orders uploads the way their files were listed in the configuration.
fn sort_like(uploads: &mut [Upload], paths: &[PathBuf]) {
    uploads.sort_by_key(|upload| {
        paths
            .iter()
            .position(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy() == upload.name)
            })
            .unwrap_or(usize::MAX)
    });
}
