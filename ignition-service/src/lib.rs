//! Dependency-ordered lifecycle management for application services.
//!
//! Applications are usually composed of many services which need to be started before the
//! application can do any useful work, and which need to be stopped gracefully when it exits. Some
//! of those services depend on others, e.g. a database connection pool should be started only
//! after logging is configured, and an API server should start only after the pool is available.
//! This crate takes a flat collection of services, each described by a
//! [ServiceDescriptor](descriptor::ServiceDescriptor) naming its prerequisites, and turns it into a
//! [ServiceGraph](graph::ServiceGraph). The [ServiceScheduler](scheduler::ServiceScheduler) then
//! walks the graph, starting services in dependency order with maximum parallelism, and later
//! shutting them down in reverse order.
//!
//! ### Features
//!
//! * `derive` - automatic service registration with `#[derive(Service)]`

pub mod descriptor;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
pub mod node;
pub mod provider;
pub mod registration;
pub mod scheduler;
pub mod signal;

#[cfg(feature = "derive")]
pub use ignition_service_derive::Service;

pub mod future {
    pub use futures::future::{BoxFuture, FutureExt};
}

pub use tokio_util::sync::CancellationToken;
