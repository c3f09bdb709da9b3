//! devicefarm: run mobile app tests on a remote device farm from CI.
//!
//! This crate uploads a build's app and test artifacts to a device-testing
//! service, schedules a run (optionally sharded across a device pool), waits
//! for it to finish and turns the results into JUnit XML.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Api**: The remote service boundary ([`api::DeviceFarmApi`])
//! - **Upload**: Concurrent artifact upload gated on processing
//! - **Compose**: Scheduling requests, one per shard when sharding
//! - **Poller**: Bounded wait for run completion
//! - **Report**: Result classification and JUnit XML output
//! - **Pipeline**: Ties the stages together behind [`pipeline::TestServer`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use devicefarm::config::load_config;
//! use devicefarm::api::HttpDeviceFarmClient;
//! use devicefarm::pipeline::{BuildArtifacts, DeviceFarmServer, TestServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("devicefarm.toml"))?;
//!     let user_agent = config.devicefarm.user_agent();
//!     let api = HttpDeviceFarmClient::new(config.devicefarm.endpoint.clone(), &user_agent)?;
//!
//!     let server = DeviceFarmServer::new(config, Arc::new(api), reqwest::Client::new());
//!     let result = server
//!         .upload_artifacts(&BuildArtifacts {
//!             app: "build/app-debug.apk".into(),
//!             test_package: Some("build/app-debug-androidTest.apk".into()),
//!         })
//!         .await?;
//!
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod api;
pub mod arn;
pub mod compose;
pub mod config;
pub mod error;
pub mod lookup;
pub mod pipeline;
pub mod poller;
pub mod report;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use error::{DeviceFarmError, DeviceFarmResult};
pub use pipeline::{BuildArtifacts, DeviceFarmServer, PipelineResult, TestServer};
pub use report::RunReport;
