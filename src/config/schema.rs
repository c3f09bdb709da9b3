//! Configuration schema definitions for devicefarm.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. The schema uses serde defaults so that only the
//! project, device pool and test type are mandatory.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── DeviceFarmConfig     - Project, pool, endpoint, billing, sharding
//! ├── DeviceStateConfig    - Locale, location, radios, extra apps and data
//! ├── TestConfig           - Test type, package, specs, filter, parameters
//! ├── FeatureConfig        - Video recording, performance monitoring
//! ├── PollingConfig        - Upload/run poll intervals and the wait ceiling
//! └── ReportConfig         - JUnit output directory, wait-for-results
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::{Location, Radios, TestType, UploadType};

/// Device pool name that selects every device instead of a curated pool.
///
/// Sharding never applies to this pool.
pub const ALL_DEVICES_POOL: &str = "ALL_DEVICES";

static LOCALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}_[A-Z]{2}$").unwrap());

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [devicefarm]
/// project = "MyProject"
/// device_pool = "Top Devices"
///
/// [test]
/// type = "instrumentation"
///
/// [report]
/// junit_dir = "build/test-results/devicefarm"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Project, pool and service settings.
    pub devicefarm: DeviceFarmConfig,

    /// Device state applied to every device in the run.
    #[serde(default)]
    pub device_state: DeviceStateConfig,

    /// The test to run.
    pub test: TestConfig,

    /// Capture toggles.
    #[serde(default)]
    pub features: FeatureConfig,

    /// Poll intervals and limits.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Report output settings.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Checks the configuration and returns every problem found.
    ///
    /// An empty list means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let df = &self.devicefarm;

        if df.project.trim().is_empty() {
            problems.push("devicefarm.project must not be empty".to_string());
        }
        if df.device_pool.trim().is_empty() {
            problems.push("devicefarm.device_pool must not be empty".to_string());
        }
        if df.execution_timeout_minutes == 0 {
            problems.push("devicefarm.execution_timeout_minutes must be positive".to_string());
        }
        if df.max_concurrent_uploads == 0 {
            problems.push("devicefarm.max_concurrent_uploads must be positive".to_string());
        }
        if df.console_url.matches("%s").count() != 2 {
            problems.push(
                "devicefarm.console_url must contain two %s placeholders (project, run)"
                    .to_string(),
            );
        }

        problems.extend(self.device_state.validate());
        problems.extend(self.test.validate());

        if self.polling.run_interval_secs == 0 || self.polling.upload_interval_secs == 0 {
            problems.push("polling intervals must be positive".to_string());
        }
        if self.polling.max_wait_secs < self.polling.run_interval_secs {
            problems.push("polling.max_wait_secs must be at least run_interval_secs".to_string());
        }

        problems
    }

    /// Returns `true` when [`validate`](Self::validate) finds nothing.
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Returns `true` when the run should be split across the pool's devices.
    ///
    /// Whether any test specs were actually uploaded is decided later.
    pub fn sharding_requested(&self) -> bool {
        self.devicefarm.sharding && self.devicefarm.device_pool != ALL_DEVICES_POOL
    }
}

/// Project, pool and service settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `endpoint` | `https://devicefarm.us-west-2.amazonaws.com` |
/// | `metered` | false |
/// | `execution_timeout_minutes` | 60 |
/// | `sharding` | false |
/// | `max_concurrent_uploads` | 4 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceFarmConfig {
    /// Name of the project runs are scheduled in.
    pub project: String,

    /// Name of the device pool, or [`ALL_DEVICES_POOL`].
    pub device_pool: String,

    /// Run name. Defaults to `"<app file name> (devicefarm)"`.
    pub run_name: Option<String>,

    /// Service endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable holding a bearer token for the endpoint.
    pub token_env: Option<String>,

    /// Console URL template with `%s` placeholders for project and run ids.
    #[serde(default = "default_console_url")]
    pub console_url: String,

    /// User agent; `{version}` is replaced with the crate version.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bill device minutes as metered instead of unmetered.
    #[serde(default)]
    pub metered: bool,

    /// Per-job execution timeout in minutes.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_minutes: u32,

    /// Split the run into one request per test spec, one device each.
    #[serde(default)]
    pub sharding: bool,

    /// Upper bound on uploads in flight within one batch.
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

impl DeviceFarmConfig {
    /// The user agent with the crate version filled in.
    pub fn user_agent(&self) -> String {
        self.user_agent
            .replace("{version}", env!("CARGO_PKG_VERSION"))
    }
}

fn default_endpoint() -> String {
    "https://devicefarm.us-west-2.amazonaws.com".to_string()
}

fn default_console_url() -> String {
    "https://us-west-2.console.aws.amazon.com/devicefarm/home#/projects/%s/runs/%s".to_string()
}

fn default_user_agent() -> String {
    "devicefarm-runner/{version}".to_string()
}

fn default_execution_timeout() -> u32 {
    60
}

fn default_max_concurrent_uploads() -> usize {
    4
}

/// Device state applied to every device in the run.
///
/// # Example
///
/// ```toml
/// [device_state]
/// locale = "en_US"
/// auxiliary_apps = ["helpers/mock-server.apk"]
/// extra_data_zip = "fixtures.zip"
///
/// [device_state.location]
/// latitude = 47.6204
/// longitude = -122.3491
///
/// [device_state.radios]
/// wifi = true
/// bluetooth = false
/// gps = true
/// nfc = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceStateConfig {
    /// Locale in `language_COUNTRY` form.
    #[serde(default = "default_locale")]
    pub locale: String,

    pub location: Option<Location>,

    #[serde(default)]
    pub radios: Radios,

    /// Extra apps installed next to the app under test.
    #[serde(default)]
    pub auxiliary_apps: Vec<PathBuf>,

    /// Zip whose contents are copied onto the devices.
    pub extra_data_zip: Option<PathBuf>,
}

impl Default for DeviceStateConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            location: None,
            radios: Radios::default(),
            auxiliary_apps: Vec::new(),
            extra_data_zip: None,
        }
    }
}

impl DeviceStateConfig {
    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !LOCALE.is_match(&self.locale) {
            problems.push(format!(
                "device_state.locale '{}' is not of the form en_US",
                self.locale
            ));
        }

        if let Some(location) = &self.location
            && (!(-90.0..=90.0).contains(&location.latitude)
                || !(-180.0..=180.0).contains(&location.longitude))
        {
            problems.push("device_state.location is out of range".to_string());
        }

        problems
    }
}

fn default_locale() -> String {
    "en_US".to_string()
}

/// Test frameworks as named in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    BuiltinFuzz,
    BuiltinExplorer,
    AppiumJavaJunit,
    AppiumJavaTestng,
    AppiumPython,
    AppiumNode,
    AppiumRuby,
    AppiumWebJavaJunit,
    AppiumWebJavaTestng,
    AppiumWebPython,
    AppiumWebNode,
    AppiumWebRuby,
    Calabash,
    Instrumentation,
    Uiautomation,
    Uiautomator,
    Xctest,
    XctestUi,
}

impl TestKind {
    /// The service's name for this test type.
    pub fn test_type(self) -> TestType {
        match self {
            Self::BuiltinFuzz => TestType::BuiltinFuzz,
            Self::BuiltinExplorer => TestType::BuiltinExplorer,
            Self::AppiumJavaJunit => TestType::AppiumJavaJunit,
            Self::AppiumJavaTestng => TestType::AppiumJavaTestng,
            Self::AppiumPython => TestType::AppiumPython,
            Self::AppiumNode => TestType::AppiumNode,
            Self::AppiumRuby => TestType::AppiumRuby,
            Self::AppiumWebJavaJunit => TestType::AppiumWebJavaJunit,
            Self::AppiumWebJavaTestng => TestType::AppiumWebJavaTestng,
            Self::AppiumWebPython => TestType::AppiumWebPython,
            Self::AppiumWebNode => TestType::AppiumWebNode,
            Self::AppiumWebRuby => TestType::AppiumWebRuby,
            Self::Calabash => TestType::Calabash,
            Self::Instrumentation => TestType::Instrumentation,
            Self::Uiautomation => TestType::Uiautomation,
            Self::Uiautomator => TestType::Uiautomator,
            Self::Xctest => TestType::Xctest,
            Self::XctestUi => TestType::XctestUi,
        }
    }

    /// Upload type of this kind's test package, if it takes one.
    pub fn package_upload_type(self) -> Option<UploadType> {
        let upload_type = match self {
            Self::BuiltinFuzz | Self::BuiltinExplorer => return None,
            Self::AppiumJavaJunit => UploadType::AppiumJavaJunitTestPackage,
            Self::AppiumJavaTestng => UploadType::AppiumJavaTestngTestPackage,
            Self::AppiumPython => UploadType::AppiumPythonTestPackage,
            Self::AppiumNode => UploadType::AppiumNodeTestPackage,
            Self::AppiumRuby => UploadType::AppiumRubyTestPackage,
            Self::AppiumWebJavaJunit => UploadType::AppiumWebJavaJunitTestPackage,
            Self::AppiumWebJavaTestng => UploadType::AppiumWebJavaTestngTestPackage,
            Self::AppiumWebPython => UploadType::AppiumWebPythonTestPackage,
            Self::AppiumWebNode => UploadType::AppiumWebNodeTestPackage,
            Self::AppiumWebRuby => UploadType::AppiumWebRubyTestPackage,
            Self::Calabash => UploadType::CalabashTestPackage,
            Self::Instrumentation => UploadType::InstrumentationTestPackage,
            Self::Uiautomation => UploadType::UiautomationTestPackage,
            Self::Uiautomator => UploadType::UiautomatorTestPackage,
            Self::Xctest => UploadType::XctestTestPackage,
            Self::XctestUi => UploadType::XctestUiTestPackage,
        };
        Some(upload_type)
    }

    /// Upload type of this kind's test specs, if custom environments exist for it.
    pub fn spec_upload_type(self) -> Option<UploadType> {
        let upload_type = match self {
            Self::AppiumJavaJunit => UploadType::AppiumJavaJunitTestSpec,
            Self::AppiumJavaTestng => UploadType::AppiumJavaTestngTestSpec,
            Self::AppiumPython => UploadType::AppiumPythonTestSpec,
            Self::AppiumNode => UploadType::AppiumNodeTestSpec,
            Self::AppiumRuby => UploadType::AppiumRubyTestSpec,
            Self::AppiumWebJavaJunit => UploadType::AppiumWebJavaJunitTestSpec,
            Self::AppiumWebJavaTestng => UploadType::AppiumWebJavaTestngTestSpec,
            Self::AppiumWebPython => UploadType::AppiumWebPythonTestSpec,
            Self::AppiumWebNode => UploadType::AppiumWebNodeTestSpec,
            Self::AppiumWebRuby => UploadType::AppiumWebRubyTestSpec,
            Self::Instrumentation => UploadType::InstrumentationTestSpec,
            Self::XctestUi => UploadType::XctestUiTestSpec,
            _ => return None,
        };
        Some(upload_type)
    }

    pub fn is_appium(self) -> bool {
        matches!(
            self,
            Self::AppiumJavaJunit
                | Self::AppiumJavaTestng
                | Self::AppiumPython
                | Self::AppiumNode
                | Self::AppiumRuby
                | Self::AppiumWebJavaJunit
                | Self::AppiumWebJavaTestng
                | Self::AppiumWebPython
                | Self::AppiumWebNode
                | Self::AppiumWebRuby
        )
    }

    /// Instrumentation runs use the test APK produced by the build.
    pub fn uses_build_test_package(self) -> bool {
        matches!(self, Self::Instrumentation)
    }
}

/// The test to run.
///
/// # Example
///
/// ```toml
/// [test]
/// type = "appium_java_junit"
/// test_package = "build/appium-tests.zip"
/// test_specs = ["specs/login.yml", "specs/checkout.yml"]
/// appium_version = "1.9.1"
///
/// [test.parameters]
/// screenshot_on_failure = "true"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestConfig {
    #[serde(rename = "type")]
    pub kind: TestKind,

    /// Test package; instrumentation runs fall back to the build's test APK.
    pub test_package: Option<PathBuf>,

    /// Test filter passed through to the framework.
    pub filter: Option<String>,

    /// Extra framework parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Test spec files to upload; each becomes a shard when sharding.
    #[serde(default)]
    pub test_specs: Vec<PathBuf>,

    /// Name of a test spec already uploaded to the project.
    pub test_spec_name: Option<String>,

    /// Appium version requested for Appium test types.
    #[serde(default = "default_appium_version")]
    pub appium_version: String,
}

fn default_appium_version() -> String {
    "latest".to_string()
}

impl TestConfig {
    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let needs_package = self.kind.package_upload_type().is_some()
            && !self.kind.uses_build_test_package();
        if needs_package && self.test_package.is_none() {
            problems.push(format!(
                "test.test_package is required for {:?} tests",
                self.kind
            ));
        }
        if !self.test_specs.is_empty() && self.kind.spec_upload_type().is_none() {
            problems.push(format!(
                "test.test_specs are not supported for {:?} tests",
                self.kind
            ));
        }
        for spec in &self.test_specs {
            let is_yaml = spec
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                problems.push(format!(
                    "test spec {} must be a .yml or .yaml file",
                    spec.display()
                ));
            }
        }

        problems
    }

    /// Decides once which test package the run uses.
    ///
    /// `build_test_package` is the test APK the build produced, if any.
    /// Instrumentation runs prefer an explicitly configured package over it.
    pub fn resolve_test_package(&self, build_test_package: Option<&Path>) -> TestPackage {
        let Some(upload_type) = self.kind.package_upload_type() else {
            return TestPackage::Plain;
        };

        let configured = self.test_package.as_deref().map(expand_path);
        let path = if self.kind.uses_build_test_package() {
            configured.or_else(|| build_test_package.map(Path::to_path_buf))
        } else {
            configured
        };

        match path {
            Some(path) => TestPackage::WithTestPackage { path, upload_type },
            None => TestPackage::Plain,
        }
    }
}

/// The test package a run needs, resolved before any upload starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestPackage {
    /// Built-in tests; nothing to upload.
    Plain,
    /// A package file uploaded with the given type.
    WithTestPackage {
        path: PathBuf,
        upload_type: UploadType,
    },
}

/// Capture toggles passed to every run.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub video: bool,

    #[serde(default = "default_true")]
    pub app_performance_monitoring: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            video: true,
            app_performance_monitoring: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Poll intervals and the wait ceiling.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `upload_interval_secs` | 5 |
/// | `run_interval_secs` | 2 |
/// | `max_wait_secs` | 3000 (50 minutes) |
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_upload_interval")]
    pub upload_interval_secs: u64,

    #[serde(default = "default_run_interval")]
    pub run_interval_secs: u64,

    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

impl PollingConfig {
    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            upload_interval_secs: default_upload_interval(),
            run_interval_secs: default_run_interval(),
            max_wait_secs: default_max_wait(),
        }
    }
}

fn default_upload_interval() -> u64 {
    5
}

fn default_run_interval() -> u64 {
    2
}

fn default_max_wait() -> u64 {
    3000 // 50 minutes
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory JUnit XML files are written to. No directory, no files.
    pub junit_dir: Option<PathBuf>,

    /// Wait for runs to finish and fetch their results.
    #[serde(default = "default_true")]
    pub wait: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            junit_dir: None,
            wait: true,
        }
    }
}

/// Expands `~` and environment variables in a configured path.
///
/// Paths that fail to expand are returned unchanged.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(Cow::Borrowed(_)) => path.to_path_buf(),
        Ok(Cow::Owned(expanded)) => PathBuf::from(expanded),
        Err(_) => path.to_path_buf(),
    }
}
