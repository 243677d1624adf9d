//! Video request lifecycle service.
//!
//! This crate provides:
//! - Job builders for concat, merge and encode requests
//! - The process executor with cancellation and bounded concurrency
//! - The [`VideoService`] facade over store, engine and result paths
//! - A JSON-lines host bridge

pub mod bridge;
pub mod builder;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod paths;
pub mod service;

pub use bridge::Bridge;
pub use builder::{ConcatBuilder, EncodeBuilder, JobBuilder, MergeBuilder};
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use executor::ProcessExecutor;
pub use logging::RequestLogger;
pub use paths::ResultPaths;
pub use service::{parse_position, VideoService};
