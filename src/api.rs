//! The Device Testing API boundary.
//!
//! Everything the pipeline needs from the remote service goes through the
//! [`DeviceFarmApi`] trait. The production implementation speaks the
//! service's JSON protocol over HTTP ([`http::HttpDeviceFarmClient`]); tests
//! use an in-memory fake.
//!
//! ```text
//!  lookup ──┐
//!  upload ──┤
//!  compose ─┼──► DeviceFarmApi ──► HttpDeviceFarmClient ──► service
//!  poller ──┤
//!  report ──┘
//! ```
//!
//! List operations are paginated. Callers that want every item use
//! [`collect_pages`], which follows `next_token` until it runs out.

#[cfg(test)]
pub(crate) mod fake;
pub mod http;
pub mod model;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::DeviceFarmResult;

pub use http::HttpDeviceFarmClient;
pub use model::*;

/// Operations offered by the remote device-testing service.
///
/// Every method maps to exactly one remote call. Implementations must be
/// shareable across tasks; the uploader calls them from spawned tasks.
#[async_trait]
pub trait DeviceFarmApi: Send + Sync {
    async fn list_projects(&self, next_token: Option<String>) -> DeviceFarmResult<Page<Project>>;

    async fn list_device_pools(
        &self,
        project_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<DevicePool>>;

    async fn list_uploads(
        &self,
        project_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Upload>>;

    async fn create_upload(&self, request: &CreateUploadRequest) -> DeviceFarmResult<Upload>;

    async fn get_upload(&self, arn: &str) -> DeviceFarmResult<Upload>;

    async fn schedule_run(&self, request: &ScheduleRunRequest) -> DeviceFarmResult<Run>;

    async fn get_run(&self, arn: &str) -> DeviceFarmResult<Run>;

    async fn list_jobs(&self, run_arn: &str, next_token: Option<String>)
    -> DeviceFarmResult<Page<Job>>;

    async fn list_suites(
        &self,
        job_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Suite>>;

    async fn list_tests(
        &self,
        suite_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Test>>;
}

/// Drains a paginated list operation.
///
/// `fetch` is called with `None` first and then with each continuation
/// token until a page arrives without one.
///
/// ```no_run
/// # use devicefarm::api::{collect_pages, DeviceFarmApi};
/// # async fn example(api: &dyn DeviceFarmApi) -> devicefarm::DeviceFarmResult<()> {
/// let projects = collect_pages(|token| api.list_projects(token)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn collect_pages<'a, T, F>(mut fetch: F) -> DeviceFarmResult<Vec<T>>
where
    F: FnMut(Option<String>) -> BoxFuture<'a, DeviceFarmResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut token = None;

    loop {
        let page = fetch(token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => return Ok(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeDeviceFarm;

    #[tokio::test]
    async fn test_collect_pages_follows_tokens() {
        let fake = FakeDeviceFarm::new();
        fake.push_project_page(
            vec![Project {
                arn: "1".to_string(),
                name: "first".to_string(),
            }],
            Some("page-2"),
        );
        fake.push_project_page(
            vec![Project {
                arn: "2".to_string(),
                name: "second".to_string(),
            }],
            None,
        );

        let projects = collect_pages(|token| fake.list_projects(token))
            .await
            .unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].name, "second");
        assert_eq!(
            fake.project_tokens(),
            vec![None, Some("page-2".to_string())]
        );
    }
}
