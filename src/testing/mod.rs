//! Testing utilities and mock implementations
//!
//! This module provides mock collaborators for testing the task pipeline
//! without external storage, moderation or notification services.

pub mod mocks;

pub use mocks::*;
