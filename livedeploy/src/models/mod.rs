//! Data models

pub mod catalog;
pub mod deployment;
pub mod log;
