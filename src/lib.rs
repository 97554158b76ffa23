//! Aicon, a voice and SMS onboarding assistant.

pub mod config;
pub mod error;
pub mod flow;
pub mod store;
pub mod webhook;
