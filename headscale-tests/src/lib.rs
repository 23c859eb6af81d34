//! Test utilities for the headscale harness
//!
//! This crate provides an in-memory container runtime, a scripted stand-in
//! for the headscale CLI, and a controllable health endpoint, so the harness
//! can be exercised without a Docker daemon.

pub mod helpers;

pub use helpers::fake_headscale::FakeHeadscale;
pub use helpers::fake_runtime::{Call, ExecHandler, Fault, FakeRuntime};
pub use helpers::health_responder::{HealthResponder, unused_port};
pub use helpers::policy_builder::PolicyBuilder;
