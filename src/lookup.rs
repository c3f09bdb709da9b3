//! Name-based resolution of projects, device pools and test specs.
//!
//! All lookups drain the paginated list and match names exactly
//! (case-sensitive). A miss is [`DeviceFarmError::NotFound`].

use tracing::debug;

use crate::api::{
    DeviceFarmApi, DevicePool, Project, Upload, UploadStatus, collect_pages,
};
use crate::error::{DeviceFarmError, DeviceFarmResult};

/// Finds the project whose name is exactly `name`.
pub async fn find_project_by_name(
    api: &dyn DeviceFarmApi,
    name: &str,
) -> DeviceFarmResult<Project> {
    let projects = collect_pages(|token| api.list_projects(token)).await?;
    debug!("Searching {} projects for '{}'", projects.len(), name);

    projects
        .into_iter()
        .find(|project| project.name == name)
        .ok_or_else(|| DeviceFarmError::not_found("Project", name))
}

/// Finds the device pool in `project` whose name is exactly `name`.
pub async fn find_device_pool_by_name(
    api: &dyn DeviceFarmApi,
    project: &Project,
    name: &str,
) -> DeviceFarmResult<DevicePool> {
    let pools = collect_pages(|token| api.list_device_pools(&project.arn, token)).await?;
    debug!("Searching {} device pools for '{}'", pools.len(), name);

    pools
        .into_iter()
        .find(|pool| pool.name == name)
        .ok_or_else(|| DeviceFarmError::not_found("Device pool", name))
}

/// Finds a successfully processed test spec upload named `name`.
pub async fn find_test_spec_by_name(
    api: &dyn DeviceFarmApi,
    project: &Project,
    name: &str,
) -> DeviceFarmResult<Upload> {
    let uploads = collect_pages(|token| api.list_uploads(&project.arn, token)).await?;

    uploads
        .into_iter()
        .filter(|upload| upload.upload_type.is_test_spec())
        .filter(|upload| upload.status == UploadStatus::Succeeded)
        .find(|upload| upload.name == name)
        .ok_or_else(|| DeviceFarmError::not_found("Test spec", name))
}

/// Expands a device pool's ARN rules into an ordered list of device ARNs.
///
/// Rule values are expected to hold a JSON array of ARNs. Values that are
/// not valid JSON are read leniently by stripping brackets and quotes and
/// splitting on commas. A pool that yields no devices is rejected.
pub fn devices_in_pool(pool: &DevicePool) -> DeviceFarmResult<Vec<String>> {
    let invalid = |reason: &str| DeviceFarmError::InvalidDevicePool {
        pool: pool.name.clone(),
        reason: reason.to_string(),
    };

    let values: Vec<&str> = pool
        .rules
        .iter()
        .filter(|rule| rule.attribute.as_deref() == Some("ARN"))
        .filter_map(|rule| rule.value.as_deref())
        .collect();
    if values.is_empty() {
        return Err(invalid("no ARN rule"));
    }

    let mut devices = Vec::new();
    for value in values {
        devices.extend(parse_rule_value(value));
    }

    if devices.is_empty() {
        return Err(invalid("ARN rule lists no devices"));
    }
    Ok(devices)
}

fn parse_rule_value(value: &str) -> Vec<String> {
    if let Ok(arns) = serde_json::from_str::<Vec<String>>(value) {
        return arns
            .into_iter()
            .map(|arn| arn.trim().to_string())
            .filter(|arn| !arn.is_empty())
            .collect();
    }

    value
        .replace(['[', ']', '"', '\\'], "")
        .split(',')
        .map(str::trim)
        .filter(|arn| !arn.is_empty())
        .map(str::to_string)
        .collect()
}
