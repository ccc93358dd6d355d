//! livedeploy library
//!
//! Deployment status controller for simulated cloud deployments, with local
//! playback and push-channel driven runs.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod pubsub;
pub mod render;
pub mod server;
pub mod storage;
pub mod utils;
