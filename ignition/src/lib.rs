//! Application framework based on [ignition_service] lifecycle management.
//!
//! Applications are usually composed of long-lived services, such as connection pools, caches or
//! servers, which need to be started in the right order before any business logic can run, and
//! which need to be shut down gracefully when the application exits. This crate provides an
//! entrypoint for such applications in the form of [Application](application::Application),
//! which discovers services, starts them concurrently in dependency order, runs
//! [ApplicationRunners](runner::ApplicationRunner) with the actual application logic, and finally
//! shuts everything down. It also configures additional supporting infrastructure, e.g. logging.

pub mod application;
pub mod config;
pub mod runner;

pub mod future {
    pub use ignition_service::future::{BoxFuture, FutureExt};
}

pub use ignition_service::CancellationToken;
