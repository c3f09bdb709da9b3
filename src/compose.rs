//! Scheduling request composition.
//!
//! [`RunComposer`] turns uploaded artifacts and the run configuration into
//! one `ScheduleRun` request, or into one request per test spec when the run
//! is sharded across the devices of a pool.
//!
//! # Sharding
//!
//! Sharding applies when it is enabled, the pool is not
//! [`ALL_DEVICES_POOL`](crate::config::ALL_DEVICES_POOL), and at least one
//! test spec was uploaded. The pool is expanded into devices by
//! [`RunComposer::target_pool`] before anything is uploaded. Shard `i` runs
//! spec `i` on device `i % pool_size`:
//!
//! ```text
//!  specs:    login.yml   cart.yml   search.yml
//!               │           │           │
//!  devices:  [pixel]     [galaxy]    [pixel]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::api::{
    BillingMethod, DevicePool, DeviceSelectionConfiguration, ExecutionConfiguration, Project,
    ScheduleRunConfiguration, ScheduleRunRequest, ScheduleRunTest, Upload, UploadStatus,
};
use crate::config::Config;
use crate::error::{DeviceFarmError, DeviceFarmResult};
use crate::lookup::devices_in_pool;

/// Test parameter carrying the video capture toggle.
pub const VIDEO_RECORDING_PARAM: &str = "video_recording";
/// Test parameter carrying the performance monitoring toggle.
pub const PERFORMANCE_MONITORING_PARAM: &str = "app_performance_monitoring";
/// Test parameter carrying the Appium version.
pub const APPIUM_VERSION_PARAM: &str = "appium_version";

/// Everything that was uploaded for one run.
#[derive(Debug, Clone)]
pub struct UploadedArtifacts {
    pub app: Upload,
    pub auxiliary_apps: Vec<Upload>,
    pub test_package: Option<Upload>,
    pub test_specs: Vec<Upload>,
    pub extra_data: Option<Upload>,
    /// A previously uploaded spec selected by name in the configuration.
    pub existing_test_spec: Option<Upload>,
}

impl UploadedArtifacts {
    /// Names of the uploads the service has not finished processing.
    ///
    /// Only non-empty when the processing wait was cancelled.
    pub fn unprocessed(&self) -> Vec<&str> {
        std::iter::once(&self.app)
            .chain(&self.auxiliary_apps)
            .chain(&self.test_package)
            .chain(&self.test_specs)
            .chain(&self.extra_data)
            .filter(|upload| upload.status != UploadStatus::Succeeded)
            .map(|upload| upload.name.as_str())
            .collect()
    }
}

/// The device pool a run targets, with its devices when sharding.
#[derive(Debug, Clone)]
pub struct TargetPool {
    pub pool: DevicePool,
    /// Device ARNs in pool order; empty unless sharding was requested.
    pub devices: Vec<String>,
}

/// Builds scheduling requests from a configuration.
pub struct RunComposer<'a> {
    config: &'a Config,
}

impl<'a> RunComposer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Expands the pool's devices when the configuration asks for sharding.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDevicePool`](crate::DeviceFarmError::InvalidDevicePool)
    /// if sharding is requested and the pool's devices cannot be determined.
    pub fn target_pool(&self, pool: DevicePool) -> DeviceFarmResult<TargetPool> {
        let devices = if self.config.sharding_requested() {
            let devices = devices_in_pool(&pool)?;
            info!("Device pool '{}' has {} devices", pool.name, devices.len());
            devices
        } else {
            Vec::new()
        };
        Ok(TargetPool { pool, devices })
    }

    /// Returns `true` when the uploads allow the configured sharding.
    pub fn is_sharded(&self, artifacts: &UploadedArtifacts) -> bool {
        self.config.sharding_requested() && !artifacts.test_specs.is_empty()
    }

    /// Builds the requests for a run: one, or one per test spec when sharded.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDevicePool`](crate::DeviceFarmError::InvalidDevicePool)
    /// if the run is sharded and `target` carries no devices.
    pub fn compose(
        &self,
        project: &Project,
        target: &TargetPool,
        artifacts: &UploadedArtifacts,
    ) -> DeviceFarmResult<Vec<ScheduleRunRequest>> {
        let pool = &target.pool;
        if !self.is_sharded(artifacts) {
            let spec_arn = artifacts
                .test_specs
                .first()
                .or(artifacts.existing_test_spec.as_ref())
                .map(|spec| spec.arn.clone());

            let mut request = self.base_request(project, artifacts, spec_arn);
            request.device_pool_arn = Some(pool.arn.clone());
            return Ok(vec![request]);
        }

        let devices = &target.devices;
        if devices.is_empty() {
            return Err(DeviceFarmError::InvalidDevicePool {
                pool: pool.name.clone(),
                reason: "no devices to shard across".to_string(),
            });
        }
        info!(
            "Sharding {} test specs across {} devices of pool '{}'",
            artifacts.test_specs.len(),
            devices.len(),
            pool.name
        );

        let requests = artifacts
            .test_specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let device = &devices[i % devices.len()];
                debug!("Shard {} runs {} on {}", i, spec.name, device);

                let mut request = self.base_request(project, artifacts, Some(spec.arn.clone()));
                request.name = shard_name(&spec.name, &artifacts.app.name);
                request.device_selection_configuration =
                    Some(DeviceSelectionConfiguration::single_device(device.clone()));
                request
            })
            .collect();

        Ok(requests)
    }

    /// The configured run name or `"<app file name> (devicefarm)"`.
    pub fn run_name(&self, app_name: &str) -> String {
        self.config
            .devicefarm
            .run_name
            .clone()
            .unwrap_or_else(|| format!("{} (devicefarm)", app_name))
    }

    /// Test parameters shared by every request of the run.
    pub fn parameters(&self) -> BTreeMap<String, String> {
        let mut parameters = self.config.test.parameters.clone();
        parameters.insert(
            VIDEO_RECORDING_PARAM.to_string(),
            self.config.features.video.to_string(),
        );
        parameters.insert(
            PERFORMANCE_MONITORING_PARAM.to_string(),
            self.config.features.app_performance_monitoring.to_string(),
        );
        if self.config.test.kind.is_appium() {
            parameters.insert(
                APPIUM_VERSION_PARAM.to_string(),
                self.config.test.appium_version.clone(),
            );
        }
        parameters
    }

    fn base_request(
        &self,
        project: &Project,
        artifacts: &UploadedArtifacts,
        test_spec_arn: Option<String>,
    ) -> ScheduleRunRequest {
        let test = ScheduleRunTest {
            test_type: self.config.test.kind.test_type(),
            test_package_arn: artifacts.test_package.as_ref().map(|p| p.arn.clone()),
            test_spec_arn,
            filter: self.config.test.filter.clone(),
            parameters: self.parameters(),
        };

        let state = &self.config.device_state;
        let configuration = ScheduleRunConfiguration {
            extra_data_package_arn: artifacts.extra_data.as_ref().map(|d| d.arn.clone()),
            locale: Some(state.locale.clone()),
            location: state.location,
            radios: state.radios,
            auxiliary_apps: artifacts
                .auxiliary_apps
                .iter()
                .map(|app| app.arn.clone())
                .collect(),
            billing_method: if self.config.devicefarm.metered {
                BillingMethod::Metered
            } else {
                BillingMethod::Unmetered
            },
        };

        let execution_configuration = ExecutionConfiguration {
            job_timeout_minutes: self.config.devicefarm.execution_timeout_minutes,
            video_capture: self.config.features.video,
            app_performance_monitoring: self.config.features.app_performance_monitoring,
        };

        ScheduleRunRequest {
            project_arn: project.arn.clone(),
            app_arn: artifacts.app.arn.clone(),
            device_pool_arn: None,
            device_selection_configuration: None,
            name: self.run_name(&artifacts.app.name),
            test,
            configuration,
            execution_configuration,
        }
    }
}

/// Shard name: the spec's file stem followed by the app file name.
fn shard_name(spec_name: &str, app_name: &str) -> String {
    let stem = Path::new(spec_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| spec_name.to_string());
    format!("{} {}", stem, app_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Rule, TestType, UploadType};
    use crate::config::{ALL_DEVICES_POOL, TestKind, load_config_str};

    fn config() -> Config {
        load_config_str(
            r#"
            [devicefarm]
            project = "MyProject"
            device_pool = "Top Devices"
            run_name = "MyRun"

            [test]
            type = "instrumentation"
            filter = "com.example.SmokeTest"
            [test.parameters]
            event_count = "500"
        "#,
        )
        .unwrap()
    }

    fn upload(name: &str, upload_type: UploadType) -> Upload {
        Upload {
            arn: format!("arn:upload:{}", name),
            name: name.to_string(),
            upload_type,
            status: UploadStatus::Succeeded,
            url: None,
            content_type: None,
            message: None,
            metadata: None,
        }
    }

    fn project() -> Project {
        Project {
            arn: "1234".to_string(),
            name: "MyProject".to_string(),
        }
    }

    fn pool(devices: &[&str]) -> DevicePool {
        DevicePool {
            arn: "1234".to_string(),
            name: "Top Devices".to_string(),
            rules: vec![Rule {
                attribute: Some("ARN".to_string()),
                operator: Some("IN".to_string()),
                value: Some(serde_json::to_string(devices).unwrap()),
            }],
        }
    }

    fn app_only(app: Upload) -> UploadedArtifacts {
        UploadedArtifacts {
            app,
            auxiliary_apps: Vec::new(),
            test_package: None,
            test_specs: Vec::new(),
            extra_data: None,
            existing_test_spec: None,
        }
    }

    fn target(config: &Config, devices: &[&str]) -> TargetPool {
        RunComposer::new(config).target_pool(pool(devices)).unwrap()
    }

    fn specs(names: &[&str]) -> Vec<Upload> {
        names
            .iter()
            .map(|name| upload(name, UploadType::InstrumentationTestSpec))
            .collect()
    }

    #[test]
    fn test_compose_single_request() {
        let config = config();
        let mut artifacts = app_only(upload("app.apk", UploadType::AndroidApp));
        artifacts.test_package = Some(upload(
            "app-test.apk",
            UploadType::InstrumentationTestPackage,
        ));
        artifacts.auxiliary_apps = vec![upload("helper.apk", UploadType::AndroidApp)];

        let requests = RunComposer::new(&config)
            .compose(&project(), &target(&config, &["d0"]), &artifacts)
            .unwrap();

        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.name, "MyRun");
        assert_eq!(request.project_arn, "1234");
        assert_eq!(request.device_pool_arn.as_deref(), Some("1234"));
        assert!(request.device_selection_configuration.is_none());
        assert_eq!(request.app_arn, "arn:upload:app.apk");
        assert_eq!(request.test.test_type, TestType::Instrumentation);
        assert_eq!(
            request.test.test_package_arn.as_deref(),
            Some("arn:upload:app-test.apk")
        );
        assert_eq!(request.test.filter.as_deref(), Some("com.example.SmokeTest"));
        assert_eq!(request.configuration.auxiliary_apps, vec!["arn:upload:helper.apk"]);
        assert_eq!(request.configuration.billing_method, BillingMethod::Unmetered);
        assert_eq!(request.configuration.locale.as_deref(), Some("en_US"));
        assert_eq!(request.execution_configuration.job_timeout_minutes, 60);
    }

    #[test]
    fn test_default_run_name() {
        let mut config = config();
        config.devicefarm.run_name = None;
        assert_eq!(
            RunComposer::new(&config).run_name("app-debug.apk"),
            "app-debug.apk (devicefarm)"
        );
    }

    #[test]
    fn test_parameters() {
        let mut config = config();
        config.features.video = false;
        let parameters = RunComposer::new(&config).parameters();
        assert_eq!(parameters["event_count"], "500");
        assert_eq!(parameters[VIDEO_RECORDING_PARAM], "false");
        assert_eq!(parameters[PERFORMANCE_MONITORING_PARAM], "true");
        assert!(!parameters.contains_key(APPIUM_VERSION_PARAM));

        config.test.kind = TestKind::AppiumPython;
        config.test.appium_version = "1.9.1".to_string();
        let parameters = RunComposer::new(&config).parameters();
        assert_eq!(parameters[APPIUM_VERSION_PARAM], "1.9.1");
    }

    #[test]
    fn test_sharded_devices_wrap_around_pool() {
        let mut config = config();
        config.devicefarm.sharding = true;
        let mut artifacts = app_only(upload("app.apk", UploadType::AndroidApp));
        artifacts.test_specs = specs(&["login.yml", "cart.yml", "search.yml"]);

        let requests = RunComposer::new(&config)
            .compose(&project(), &target(&config, &["d0", "d1"]), &artifacts)
            .unwrap();

        assert_eq!(requests.len(), 3);
        let devices: Vec<&str> = requests
            .iter()
            .map(|r| {
                let selection = r.device_selection_configuration.as_ref().unwrap();
                assert_eq!(selection.max_devices, 1);
                assert!(r.device_pool_arn.is_none());
                selection.filters[0].values[0].as_str()
            })
            .collect();
        assert_eq!(devices, vec!["d0", "d1", "d0"]);

        assert_eq!(requests[0].name, "login app.apk");
        assert_eq!(
            requests[2].test.test_spec_arn.as_deref(),
            Some("arn:upload:search.yml")
        );
    }

    #[test]
    fn test_sharding_needs_specs_and_curated_pool() {
        let mut config = config();
        config.devicefarm.sharding = true;
        let app = upload("app.apk", UploadType::AndroidApp);

        let artifacts = app_only(app.clone());
        assert!(!RunComposer::new(&config).is_sharded(&artifacts));

        let mut artifacts = app_only(app);
        artifacts.test_specs = specs(&["a.yml", "b.yml"]);
        assert!(RunComposer::new(&config).is_sharded(&artifacts));

        config.devicefarm.device_pool = ALL_DEVICES_POOL.to_string();
        let requests = RunComposer::new(&config)
            .compose(&project(), &target(&config, &["d0"]), &artifacts)
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].test.test_spec_arn.as_deref(),
            Some("arn:upload:a.yml")
        );
    }

    #[test]
    fn test_existing_test_spec_used_when_nothing_uploaded() {
        let config = config();
        let mut artifacts = app_only(upload("app.apk", UploadType::AndroidApp));
        artifacts.existing_test_spec = Some(upload("default.yml", UploadType::InstrumentationTestSpec));

        let requests = RunComposer::new(&config)
            .compose(&project(), &target(&config, &["d0"]), &artifacts)
            .unwrap();
        assert_eq!(
            requests[0].test.test_spec_arn.as_deref(),
            Some("arn:upload:default.yml")
        );
    }

    #[test]
    fn test_target_pool_expands_devices_only_when_sharding() {
        let mut config = config();
        assert!(target(&config, &["d0", "d1"]).devices.is_empty());

        config.devicefarm.sharding = true;
        assert_eq!(target(&config, &["d0", "d1"]).devices, vec!["d0", "d1"]);

        let err = RunComposer::new(&config)
            .target_pool(pool(&[]))
            .unwrap_err();
        assert!(matches!(err, DeviceFarmError::InvalidDevicePool { .. }));
    }

    #[test]
    fn test_sharding_rejects_target_without_devices() {
        let mut config = config();
        let unexpanded = target(&config, &["d0"]);
        config.devicefarm.sharding = true;
        let mut artifacts = app_only(upload("app.apk", UploadType::AndroidApp));
        artifacts.test_specs = specs(&["a.yml"]);

        let err = RunComposer::new(&config)
            .compose(&project(), &unexpanded, &artifacts)
            .unwrap_err();
        assert!(matches!(err, DeviceFarmError::InvalidDevicePool { .. }));
    }

    #[test]
    fn test_unprocessed_lists_pending_uploads() {
        let mut artifacts = app_only(upload("app.apk", UploadType::AndroidApp));
        assert!(artifacts.unprocessed().is_empty());

        let mut package = upload("app-test.apk", UploadType::InstrumentationTestPackage);
        package.status = UploadStatus::Processing;
        artifacts.test_package = Some(package);
        assert_eq!(artifacts.unprocessed(), vec!["app-test.apk"]);
    }
}
