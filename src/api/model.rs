//! Wire model for the Device Testing API.
//!
//! Field names follow the service's camelCase JSON. Enumerations carry an
//! `Unknown` catch-all so a new server-side value never breaks decoding.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page of results from a list operation.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A final page with no continuation token.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// A Device Farm project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub arn: String,
    pub name: String,
}

/// One selection rule of a device pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A named collection of devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePool {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Classification of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadType {
    AndroidApp,
    IosApp,
    WebApp,
    ExternalData,
    AppiumJavaJunitTestPackage,
    AppiumJavaTestngTestPackage,
    AppiumPythonTestPackage,
    AppiumNodeTestPackage,
    AppiumRubyTestPackage,
    AppiumWebJavaJunitTestPackage,
    AppiumWebJavaTestngTestPackage,
    AppiumWebPythonTestPackage,
    AppiumWebNodeTestPackage,
    AppiumWebRubyTestPackage,
    CalabashTestPackage,
    InstrumentationTestPackage,
    UiautomationTestPackage,
    UiautomatorTestPackage,
    XctestTestPackage,
    XctestUiTestPackage,
    AppiumJavaJunitTestSpec,
    AppiumJavaTestngTestSpec,
    AppiumPythonTestSpec,
    AppiumNodeTestSpec,
    AppiumRubyTestSpec,
    AppiumWebJavaJunitTestSpec,
    AppiumWebJavaTestngTestSpec,
    AppiumWebPythonTestSpec,
    AppiumWebNodeTestSpec,
    AppiumWebRubyTestSpec,
    InstrumentationTestSpec,
    XctestUiTestSpec,
    #[serde(other)]
    Unknown,
}

impl UploadType {
    /// Returns `true` for the test specification kinds.
    pub fn is_test_spec(self) -> bool {
        self.as_str().ends_with("_TEST_SPEC")
    }

    /// The wire name of this upload type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AndroidApp => "ANDROID_APP",
            Self::IosApp => "IOS_APP",
            Self::WebApp => "WEB_APP",
            Self::ExternalData => "EXTERNAL_DATA",
            Self::AppiumJavaJunitTestPackage => "APPIUM_JAVA_JUNIT_TEST_PACKAGE",
            Self::AppiumJavaTestngTestPackage => "APPIUM_JAVA_TESTNG_TEST_PACKAGE",
            Self::AppiumPythonTestPackage => "APPIUM_PYTHON_TEST_PACKAGE",
            Self::AppiumNodeTestPackage => "APPIUM_NODE_TEST_PACKAGE",
            Self::AppiumRubyTestPackage => "APPIUM_RUBY_TEST_PACKAGE",
            Self::AppiumWebJavaJunitTestPackage => "APPIUM_WEB_JAVA_JUNIT_TEST_PACKAGE",
            Self::AppiumWebJavaTestngTestPackage => "APPIUM_WEB_JAVA_TESTNG_TEST_PACKAGE",
            Self::AppiumWebPythonTestPackage => "APPIUM_WEB_PYTHON_TEST_PACKAGE",
            Self::AppiumWebNodeTestPackage => "APPIUM_WEB_NODE_TEST_PACKAGE",
            Self::AppiumWebRubyTestPackage => "APPIUM_WEB_RUBY_TEST_PACKAGE",
            Self::CalabashTestPackage => "CALABASH_TEST_PACKAGE",
            Self::InstrumentationTestPackage => "INSTRUMENTATION_TEST_PACKAGE",
            Self::UiautomationTestPackage => "UIAUTOMATION_TEST_PACKAGE",
            Self::UiautomatorTestPackage => "UIAUTOMATOR_TEST_PACKAGE",
            Self::XctestTestPackage => "XCTEST_TEST_PACKAGE",
            Self::XctestUiTestPackage => "XCTEST_UI_TEST_PACKAGE",
            Self::AppiumJavaJunitTestSpec => "APPIUM_JAVA_JUNIT_TEST_SPEC",
            Self::AppiumJavaTestngTestSpec => "APPIUM_JAVA_TESTNG_TEST_SPEC",
            Self::AppiumPythonTestSpec => "APPIUM_PYTHON_TEST_SPEC",
            Self::AppiumNodeTestSpec => "APPIUM_NODE_TEST_SPEC",
            Self::AppiumRubyTestSpec => "APPIUM_RUBY_TEST_SPEC",
            Self::AppiumWebJavaJunitTestSpec => "APPIUM_WEB_JAVA_JUNIT_TEST_SPEC",
            Self::AppiumWebJavaTestngTestSpec => "APPIUM_WEB_JAVA_TESTNG_TEST_SPEC",
            Self::AppiumWebPythonTestSpec => "APPIUM_WEB_PYTHON_TEST_SPEC",
            Self::AppiumWebNodeTestSpec => "APPIUM_WEB_NODE_TEST_SPEC",
            Self::AppiumWebRubyTestSpec => "APPIUM_WEB_RUBY_TEST_SPEC",
            Self::InstrumentationTestSpec => "INSTRUMENTATION_TEST_SPEC",
            Self::XctestUiTestSpec => "XCTEST_UI_TEST_SPEC",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Initialized,
    Processing,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "INITIALIZED",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Remote-side record of one artifact transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub arn: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub upload_type: UploadType,
    pub status: UploadStatus,
    /// Presigned URL the artifact bytes are PUT to.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Service-side explanation, populated for failed uploads.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Request body for `CreateUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub project_arn: String,
    pub name: String,
    #[serde(rename = "type")]
    pub upload_type: UploadType,
    pub content_type: String,
}

/// Execution status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    PendingConcurrency,
    PendingDevice,
    Processing,
    Scheduling,
    Preparing,
    Running,
    Completed,
    Stopping,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::PendingConcurrency => "PENDING_CONCURRENCY",
            Self::PendingDevice => "PENDING_DEVICE",
            Self::Processing => "PROCESSING",
            Self::Scheduling => "SCHEDULING",
            Self::Preparing => "PREPARING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Stopping => "STOPPING",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Aggregate test counters reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub warned: u32,
    pub errored: u32,
    pub stopped: u32,
    pub skipped: u32,
}

/// One execution of a test campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub arn: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: ExecutionStatus,
    /// Overall result string, e.g. `PASSED` or `FAILED`.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub counters: Option<Counters>,
}

impl Run {
    /// Returns `true` when the service reports the run as passed.
    pub fn passed(&self) -> bool {
        self.result.as_deref() == Some("PASSED")
    }
}

/// A device as referenced by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub arn: String,
    #[serde(default)]
    pub name: String,
}

/// A run's execution on a single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub arn: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device: Option<Device>,
}

/// A group of tests within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub counters: Counters,
}

/// A single test case result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, with = "epoch_seconds")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, with = "epoch_seconds")]
    pub stopped: Option<DateTime<Utc>>,
}

/// Geographic location set on the devices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Radio states set on the devices. Radios left unspecified are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Radios {
    pub wifi: bool,
    pub bluetooth: bool,
    pub nfc: bool,
    pub gps: bool,
}

impl Default for Radios {
    fn default() -> Self {
        Self {
            wifi: true,
            bluetooth: true,
            nfc: true,
            gps: true,
        }
    }
}

/// How device minutes are billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMethod {
    Metered,
    Unmetered,
}

/// The test framework a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
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

/// Test section of a scheduling request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRunTest {
    #[serde(rename = "type")]
    pub test_type: TestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_package_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_spec_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// Device state and billing section of a scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRunConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data_package_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub radios: Radios,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxiliary_apps: Vec<String>,
    pub billing_method: BillingMethod,
}

/// Execution limits and capture toggles of a scheduling request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfiguration {
    pub job_timeout_minutes: u32,
    pub video_capture: bool,
    pub app_performance_monitoring: bool,
}

/// A filter in a device selection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    pub attribute: String,
    pub operator: String,
    pub values: Vec<String>,
}

/// Selects devices directly instead of through a device pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelectionConfiguration {
    pub filters: Vec<DeviceFilter>,
    pub max_devices: u32,
}

impl DeviceSelectionConfiguration {
    /// Selects exactly the given device.
    pub fn single_device(device_arn: impl Into<String>) -> Self {
        Self {
            filters: vec![DeviceFilter {
                attribute: "ARN".to_string(),
                operator: "IN".to_string(),
                values: vec![device_arn.into()],
            }],
            max_devices: 1,
        }
    }
}

/// Request body for `ScheduleRun`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRunRequest {
    pub project_arn: String,
    pub app_arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_pool_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_selection_configuration: Option<DeviceSelectionConfiguration>,
    pub name: String,
    pub test: ScheduleRunTest,
    pub configuration: ScheduleRunConfiguration,
    pub execution_configuration: ExecutionConfiguration,
}

/// Timestamps travel as fractional epoch seconds.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_f64(ts.timestamp_millis() as f64 / 1000.0),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        Ok(secs.and_then(|s| DateTime::from_timestamp_millis((s * 1000.0).round() as i64)))
    }
}
