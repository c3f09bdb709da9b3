//! HTTP JSON client for the Device Testing API.
//!
//! Every operation is a `POST` to the service endpoint with the operation
//! named in the `X-Amz-Target` header and a camelCase JSON body. This is the
//! only place that interprets HTTP status codes.
//!
//! Request signing is not done here. When a token is configured it is sent
//! as a bearer token, which lets the client talk to a signing proxy or any
//! endpoint that accepts pre-issued session credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{
    CreateUploadRequest, DeviceFarmApi, DevicePool, Job, Page, Project, Run, ScheduleRunRequest,
    Suite, Test, Upload,
};
use crate::error::{DeviceFarmError, DeviceFarmResult};

const TARGET_PREFIX: &str = "DeviceFarm_20150623";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Client for the service's JSON-over-HTTP protocol.
#[derive(Debug, Clone)]
pub struct HttpDeviceFarmClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpDeviceFarmClient {
    /// Creates a client for `endpoint` identifying itself with `user_agent`.
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> DeviceFarmResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Sends `token` as a bearer credential with every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn call<Req, Resp>(&self, operation: &str, body: &Req) -> DeviceFarmResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        debug!("Calling {}", operation);

        let mut request = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(body);

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(map_error(operation, status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| DeviceFarmError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

/// Service error body: `{"__type": "...#NotFoundException", "message": "..."}`.
#[derive(serde::Deserialize, Default)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

fn map_error(operation: &str, status: u16, body: &str) -> DeviceFarmError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body.to_string()
    } else {
        parsed.message
    };

    if parsed.error_type.ends_with("NotFoundException") {
        return DeviceFarmError::NotFound {
            kind: "Resource",
            name: message,
        };
    }

    DeviceFarmError::Api {
        operation: operation.to_string(),
        status,
        message,
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsPage {
    #[serde(default)]
    projects: Vec<Project>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicePoolsPage {
    #[serde(default)]
    device_pools: Vec<DevicePool>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadsPage {
    #[serde(default)]
    uploads: Vec<Upload>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<Job>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuitesPage {
    #[serde(default)]
    suites: Vec<Suite>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestsPage {
    #[serde(default)]
    tests: Vec<Test>,
    next_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct UploadEnvelope {
    upload: Upload,
}

#[derive(serde::Deserialize)]
struct RunEnvelope {
    run: Run,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    arn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[async_trait]
impl DeviceFarmApi for HttpDeviceFarmClient {
    async fn list_projects(&self, next_token: Option<String>) -> DeviceFarmResult<Page<Project>> {
        let request = ListRequest {
            arn: None,
            next_token,
        };
        let page: ProjectsPage = self.call("ListProjects", &request).await?;
        Ok(Page {
            items: page.projects,
            next_token: page.next_token,
        })
    }

    async fn list_device_pools(
        &self,
        project_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<DevicePool>> {
        let request = ListRequest {
            arn: Some(project_arn),
            next_token,
        };
        let page: DevicePoolsPage = self.call("ListDevicePools", &request).await?;
        Ok(Page {
            items: page.device_pools,
            next_token: page.next_token,
        })
    }

    async fn list_uploads(
        &self,
        project_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Upload>> {
        let request = ListRequest {
            arn: Some(project_arn),
            next_token,
        };
        let page: UploadsPage = self.call("ListUploads", &request).await?;
        Ok(Page {
            items: page.uploads,
            next_token: page.next_token,
        })
    }

    async fn create_upload(&self, request: &CreateUploadRequest) -> DeviceFarmResult<Upload> {
        let envelope: UploadEnvelope = self.call("CreateUpload", request).await?;
        Ok(envelope.upload)
    }

    async fn get_upload(&self, arn: &str) -> DeviceFarmResult<Upload> {
        let envelope: UploadEnvelope = self.call("GetUpload", &json!({ "arn": arn })).await?;
        Ok(envelope.upload)
    }

    async fn schedule_run(&self, request: &ScheduleRunRequest) -> DeviceFarmResult<Run> {
        let envelope: RunEnvelope = self.call("ScheduleRun", request).await?;
        Ok(envelope.run)
    }

    async fn get_run(&self, arn: &str) -> DeviceFarmResult<Run> {
        let envelope: RunEnvelope = self.call("GetRun", &json!({ "arn": arn })).await?;
        Ok(envelope.run)
    }

    async fn list_jobs(
        &self,
        run_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Job>> {
        let request = ListRequest {
            arn: Some(run_arn),
            next_token,
        };
        let page: JobsPage = self.call("ListJobs", &request).await?;
        Ok(Page {
            items: page.jobs,
            next_token: page.next_token,
        })
    }

    async fn list_suites(
        &self,
        job_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Suite>> {
        let request = ListRequest {
            arn: Some(job_arn),
            next_token,
        };
        let page: SuitesPage = self.call("ListSuites", &request).await?;
        Ok(Page {
            items: page.suites,
            next_token: page.next_token,
        })
    }

    async fn list_tests(
        &self,
        suite_arn: &str,
        next_token: Option<String>,
    ) -> DeviceFarmResult<Page<Test>> {
        let request = ListRequest {
            arn: Some(suite_arn),
            next_token,
        };
        let page: TestsPage = self.call("ListTests", &request).await?;
        Ok(Page {
            items: page.tests,
            next_token: page.next_token,
        })
    }
}
