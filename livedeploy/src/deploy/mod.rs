//! Deployment module

pub mod controller;
pub mod events;
pub mod fsm;
pub mod playback;
pub mod push;
