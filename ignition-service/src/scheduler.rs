//! Concurrent startup and shutdown of a [ServiceGraph].
//!
//! Startup begins at the roots of the graph. Each node is spawned as a separate task as soon as it's
//! reached, and then immediately reaches out to its dependents, which in turn wait for all their
//! prerequisites before running their own hooks. This way, siblings run fully concurrently while
//! dependents never start before their prerequisites finish. Shutdown walks the graph in the
//! opposite direction, starting at the leaves.
//!
//! Startup fails fast on the first failure of an awaited service, or on a fatal failure of a
//! service which is not awaited. Shutdown is best-effort - it always visits every service and only
//! reports failures in the returned [ShutdownReport].

use crate::error::{ServiceFailure, StartupError};
use crate::executor::Executors;
use crate::graph::ServiceGraph;
use crate::node::ServiceNode;
use crate::signal::Completion;
use futures::future::{join_all, pending, try_join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default time to wait for services which are still starting, before shutting down.
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Scheduler configuration.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// How long should shutdown wait for services which are still starting. Services which don't
    /// finish starting in this time are not shut down.
    pub shutdown_grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
        }
    }
}

impl SchedulerConfig {
    pub fn with_shutdown_grace_period(mut self, shutdown_grace_period: Duration) -> Self {
        self.shutdown_grace_period = shutdown_grace_period;
        self
    }
}

/// Outcome of a shutdown. Shutdown never fails as a whole, but individual services might.
#[derive(Clone, Debug, Default)]
pub struct ShutdownReport {
    /// Services whose shutdown hook failed.
    pub failures: Vec<ServiceFailure>,
    /// Services which were not shut down, since they never finished starting.
    pub skipped: Vec<String>,
    /// Services which were not shut down due to cancellation.
    pub cancelled: Vec<String>,
}

impl ShutdownReport {
    /// Checks if all services which were started have been shut down successfully.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }
}

/// Drives lifecycle phases of all services in a [ServiceGraph]. A scheduler is meant for a single
/// startup/shutdown cycle - repeated calls don't run any hooks again and only report the outcome
/// of the first run.
#[derive(Debug)]
pub struct ServiceScheduler {
    graph: Arc<ServiceGraph>,
    executors: Executors,
    config: SchedulerConfig,
}

impl ServiceScheduler {
    pub fn new(graph: ServiceGraph, executors: Executors, config: SchedulerConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            executors,
            config,
        }
    }

    #[inline]
    pub fn graph(&self) -> &Arc<ServiceGraph> {
        &self.graph
    }

    /// Starts all services and waits for those which should be awaited. Cancelling the token
    /// prevents hooks which didn't start yet from running.
    ///
    /// # Panics
    ///
    /// Panics when polled outside the context of a Tokio runtime, since services without a
    /// registered [scheduler affinity](crate::descriptor::ServiceDescriptor::scheduler_affinity)
    /// are spawned on the current one.
    pub async fn startup(&self, cancellation: &CancellationToken) -> Result<(), StartupError> {
        info!(services = self.graph.len(), "Starting services...");

        self.launch_startup(self.graph.roots(), cancellation);

        let awaited = try_join_all(
            self.graph
                .nodes()
                .filter(|node| !node.descriptor().skip_await_on_startup)
                .map(|node| Self::await_startup(node)),
        );

        let result = tokio::select! {
            result = awaited => result.map(|_| ()),
            failure = self.detached_fatal_failure() => Err(failure.into()),
        };

        match &result {
            Ok(()) => info!("Services started"),
            Err(error) => error!("Startup failed: {}", error),
        }

        result
    }

    /// Shuts down all services which have been started, in reverse dependency order. Failures are
    /// logged and returned in the report.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [ServiceScheduler::startup].
    pub async fn shutdown(&self, cancellation: &CancellationToken) -> ShutdownReport {
        info!(services = self.graph.len(), "Shutting down services...");

        self.await_pending_startups().await;

        self.launch_shutdown(self.graph.leaves(), cancellation);

        let completions = join_all(self.graph.nodes().map(|node| async move {
            (node.name(), node.shutdown_signal().wait().await)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (name, completion) in completions {
            match completion {
                Completion::Succeeded => {}
                Completion::Failed(failure) | Completion::Propagated(failure) => {
                    report.failures.push(failure)
                }
                Completion::Cancelled => report.cancelled.push(name.to_string()),
                Completion::Skipped => report.skipped.push(name.to_string()),
            }
        }

        if report.is_clean() {
            info!(skipped = report.skipped.len(), "Services shut down");
        } else {
            warn!(
                failed = report.failures.len(),
                cancelled = report.cancelled.len(),
                skipped = report.skipped.len(),
                "Services shut down with errors"
            );
        }

        report
    }

    // dependents are reached only by the winner, so each node gets spawned exactly once
    fn launch_startup<'a>(
        &'a self,
        roots: impl Iterator<Item = &'a Arc<ServiceNode>>,
        cancellation: &CancellationToken,
    ) {
        let mut queue = roots.collect_vec();
        while let Some(node) = queue.pop() {
            if !node.try_begin_startup() {
                continue;
            }

            let task_node = node.clone();
            let task_cancellation = cancellation.clone();
            self.executors
                .handle(node.descriptor().scheduler_affinity.as_deref())
                .spawn(async move { task_node.execute_startup(&task_cancellation).await });

            queue.extend(self.graph.dependents_of(node));
        }
    }

    fn launch_shutdown<'a>(
        &'a self,
        leaves: impl Iterator<Item = &'a Arc<ServiceNode>>,
        cancellation: &CancellationToken,
    ) {
        let mut queue = leaves.collect_vec();
        while let Some(node) = queue.pop() {
            if !node.try_begin_shutdown() {
                continue;
            }

            let task_node = node.clone();
            let task_cancellation = cancellation.clone();
            self.executors
                .handle(node.descriptor().scheduler_affinity.as_deref())
                .spawn(async move { task_node.execute_shutdown(&task_cancellation).await });

            queue.extend(self.graph.prerequisites_of(node));
        }
    }

    async fn await_startup(node: &ServiceNode) -> Result<(), StartupError> {
        match node.startup_signal().wait().await {
            Completion::Succeeded => Ok(()),
            Completion::Failed(failure) | Completion::Propagated(failure) => Err(failure.into()),
            Completion::Cancelled | Completion::Skipped => Err(StartupError::Cancelled),
        }
    }

    // resolves with the first fatal failure of a service which is not awaited; never resolves if
    // there are none
    async fn detached_fatal_failure(&self) -> ServiceFailure {
        let mut detached = self
            .graph
            .nodes()
            .filter(|node| node.descriptor().skip_await_on_startup)
            .map(|node| async move { (node.name(), node.startup_signal().wait().await) })
            .collect::<FuturesUnordered<_>>();

        while let Some((name, completion)) = detached.next().await {
            if let Completion::Failed(failure) = completion {
                if failure.is_fatal() {
                    return failure;
                }

                warn!(
                    service = name,
                    "Background service failed to start: {}", failure.error
                );
            }
        }

        pending().await
    }

    async fn await_pending_startups(&self) {
        let pending = self
            .graph
            .nodes()
            .filter(|node| node.has_begun_startup() && !node.startup_signal().is_resolved())
            .collect_vec();

        if pending.is_empty() {
            return;
        }

        debug!(
            services = pending.len(),
            "Waiting for services which are still starting..."
        );

        let startups = join_all(pending.iter().map(|node| node.startup_signal().wait()));
        if timeout(self.config.shutdown_grace_period, startups)
            .await
            .is_err()
        {
            let names = pending
                .iter()
                .filter(|node| !node.startup_signal().is_resolved())
                .map(|node| node.name())
                .join(", ");
            warn!(
                services = names.as_str(),
                "Services are still starting after the grace period and will not be shut down"
            );
        }
    }
}
