pub mod fake_headscale;
pub mod fake_runtime;
pub mod health_responder;
pub mod policy_builder;
