//! Push channel transports

pub mod memory;
pub mod mqtt;
pub mod pusher;
pub mod subscription;
