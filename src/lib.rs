//! Avatar render job service
//!
//! Accepts text-to-avatar generation requests over HTTP, runs each render as a
//! supervised child process, and tracks job state in Redis (or in memory) so
//! clients can poll progress and download the finished video.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
