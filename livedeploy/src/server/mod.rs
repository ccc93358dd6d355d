//! Local HTTP API for the rendering layer

pub mod handlers;
pub mod serve;
pub mod state;
