//! Scripted in-memory implementation of [`DeviceFarmApi`] for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    CreateUploadRequest, DeviceFarmApi, DevicePool, ExecutionStatus, Job, Page, Project, Run,
    ScheduleRunRequest, Suite, Test, Upload, UploadStatus,
};
use crate::error::{DeviceFarmError, DeviceFarmResult};

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    project_pages: VecDeque<Page<Project>>,
    project_tokens: Vec<Option<String>>,
    pools: Vec<DevicePool>,
    listed_uploads: Vec<Upload>,
    upload_url_base: Option<String>,
    upload_scripts: HashMap<String, VecDeque<UploadStatus>>,
    created: HashMap<String, Upload>,
    create_requests: Vec<CreateUploadRequest>,
    get_upload_calls: usize,
    run_arn: Option<String>,
    scheduled: Vec<ScheduleRunRequest>,
    run_statuses: VecDeque<ExecutionStatus>,
    last_run_status: Option<ExecutionStatus>,
    run_result: Option<String>,
    get_run_calls: usize,
    jobs: Vec<Job>,
    failing_job_lists: Vec<String>,
    suites: HashMap<String, Vec<Suite>>,
    tests: HashMap<String, Vec<Test>>,
    remote_calls: usize,
}

/// Fake device farm whose answers are configured up front.
#[derive(Default)]
pub(crate) struct FakeDeviceFarm {
    state: Mutex<State>,
}

impl FakeDeviceFarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, name: &str, arn: &str) -> Self {
        self.state.lock().unwrap().projects.push(Project {
            arn: arn.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_pool(self, pool: DevicePool) -> Self {
        self.state.lock().unwrap().pools.push(pool);
        self
    }

    pub fn with_listed_upload(self, upload: Upload) -> Self {
        self.state.lock().unwrap().listed_uploads.push(upload);
        self
    }

    /// Presigned URLs handed out by `create_upload` point below this base.
    pub fn with_upload_url_base(self, base: &str) -> Self {
        self.state.lock().unwrap().upload_url_base = Some(base.to_string());
        self
    }

    /// Statuses returned by successive `get_upload` calls for a file name.
    ///
    /// Without a script an upload succeeds on the first poll.
    pub fn with_upload_statuses(self, file_name: &str, statuses: &[UploadStatus]) -> Self {
        self.state
            .lock()
            .unwrap()
            .upload_scripts
            .insert(file_name.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn with_run_arn(self, arn: &str) -> Self {
        self.state.lock().unwrap().run_arn = Some(arn.to_string());
        self
    }

    /// Statuses returned by successive `get_run` calls; the last one repeats.
    pub fn with_run_statuses(self, statuses: &[ExecutionStatus]) -> Self {
        self.state.lock().unwrap().run_statuses = statuses.iter().copied().collect();
        self
    }

    pub fn with_run_result(self, result: &str) -> Self {
        self.state.lock().unwrap().run_result = Some(result.to_string());
        self
    }

    pub fn with_job(self, job: Job, suites: Vec<(Suite, Vec<Test>)>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut job_suites = Vec::new();
            for (suite, tests) in suites {
                state.tests.insert(suite.arn.clone(), tests);
                job_suites.push(suite);
            }
            state.suites.insert(job.arn.clone(), job_suites);
            state.jobs.push(job);
        }
        self
    }

    /// Makes `list_jobs` fail with a server error for one run.
    pub fn with_failing_jobs(self, run_arn: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_job_lists
            .push(run_arn.to_string());
        self
    }

    pub fn push_project_page(&self, items: Vec<Project>, next_token: Option<&str>) {
        self.state.lock().unwrap().project_pages.push_back(Page {
            items,
            next_token: next_token.map(str::to_string),
        });
    }

    pub fn project_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().project_tokens.clone()
    }

    pub fn create_requests(&self) -> Vec<CreateUploadRequest> {
        self.state.lock().unwrap().create_requests.clone()
    }

    pub fn get_upload_calls(&self) -> usize {
        self.state.lock().unwrap().get_upload_calls
    }

    pub fn scheduled(&self) -> Vec<ScheduleRunRequest> {
        self.state.lock().unwrap().scheduled.clone()
    }

    pub fn get_run_calls(&self) -> usize {
        self.state.lock().unwrap().get_run_calls
    }

    pub fn remote_calls(&self) -> usize {
        self.state.lock().unwrap().remote_calls
    }
}

#[async_trait]
impl DeviceFarmApi for FakeDeviceFarm {
    async fn list_projects(&self, next_token: Option<String>) -> DeviceFarmResult<Page<Project>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.project_tokens.push(next_token);
        if let Some(page) = state.project_pages.pop_front() {
            return Ok(page);
        }
        Ok(Page::last(state.projects.clone()))
    }

    async fn list_device_pools(
        &self,
        _project_arn: &str,
        _next_token: Option<String>,
    ) -> DeviceFarmResult<Page<DevicePool>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(Page::last(state.pools.clone()))
    }

    async fn list_uploads(
        &self,
        _project_arn: &str,
        _next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Upload>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(Page::last(state.listed_uploads.clone()))
    }

    async fn create_upload(&self, request: &CreateUploadRequest) -> DeviceFarmResult<Upload> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.create_requests.push(request.clone());

        let base = state
            .upload_url_base
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:9".to_string());
        let upload = Upload {
            arn: format!("arn:upload:{}", request.name),
            name: request.name.clone(),
            upload_type: request.upload_type,
            status: UploadStatus::Initialized,
            url: Some(format!("{}/upload/{}", base, request.name)),
            content_type: Some(request.content_type.clone()),
            message: None,
            metadata: None,
        };
        state.created.insert(upload.arn.clone(), upload.clone());
        Ok(upload)
    }

    async fn get_upload(&self, arn: &str) -> DeviceFarmResult<Upload> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.get_upload_calls += 1;

        let mut upload = state
            .created
            .get(arn)
            .cloned()
            .ok_or_else(|| DeviceFarmError::not_found("Upload", arn))?;
        upload.status = match state.upload_scripts.get_mut(&upload.name) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(UploadStatus::Succeeded),
            Some(script) => script.front().copied().unwrap_or(UploadStatus::Succeeded),
            None => UploadStatus::Succeeded,
        };
        if upload.status == UploadStatus::Failed {
            upload.message = Some("Invalid package".to_string());
        }
        Ok(upload)
    }

    async fn schedule_run(&self, request: &ScheduleRunRequest) -> DeviceFarmResult<Run> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.scheduled.push(request.clone());
        let arn = state.run_arn.clone().unwrap_or_else(|| {
            format!(
                "arn:aws:devicefarm:us-west-2:1:run:run-{}/project",
                state.scheduled.len()
            )
        });
        Ok(Run {
            arn,
            name: Some(request.name.clone()),
            status: ExecutionStatus::Scheduling,
            result: None,
            counters: None,
        })
    }

    async fn get_run(&self, arn: &str) -> DeviceFarmResult<Run> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        state.get_run_calls += 1;

        let status = match state.run_statuses.pop_front() {
            Some(status) => status,
            None => state.last_run_status.unwrap_or(ExecutionStatus::Completed),
        };
        state.last_run_status = Some(status);
        Ok(Run {
            arn: arn.to_string(),
            name: None,
            status,
            result: state.run_result.clone(),
            counters: None,
        })
    }

    async fn list_jobs(
        &self,
        run_arn: &str,
        _next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Job>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        if state.failing_job_lists.iter().any(|arn| arn == run_arn) {
            return Err(DeviceFarmError::Api {
                operation: "ListJobs".to_string(),
                status: 500,
                message: "Internal failure".to_string(),
            });
        }
        Ok(Page::last(state.jobs.clone()))
    }

    async fn list_suites(
        &self,
        job_arn: &str,
        _next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Suite>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(Page::last(
            state.suites.get(job_arn).cloned().unwrap_or_default(),
        ))
    }

    async fn list_tests(
        &self,
        suite_arn: &str,
        _next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Test>> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls += 1;
        Ok(Page::last(
            state.tests.get(suite_arn).cloned().unwrap_or_default(),
        ))
    }
}
