//! Terminal rendering of deployment runs

pub mod console;
