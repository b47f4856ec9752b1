//! A single schedulable service, along with the synchronization state of its lifecycle phases.
//!
//! Each node tracks two phases: startup and shutdown. A phase can be executed at most once - the
//! first caller of [ServiceNode::try_begin_startup] (or [ServiceNode::try_begin_shutdown]) wins and
//! runs the hook, while everyone else only waits for the phase [CompletionSignal]. Startup waits
//! for all prerequisites to start, while shutdown waits for all dependents to shut down.

use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceFailure;
use crate::lifecycle::{LifecycleHook, ServiceHooks};
use crate::registration::{ServiceInstancePtr, ServiceRegistration};
use crate::signal::{Completion, CompletionSignal};
use derivative::Derivative;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Observable state of a single lifecycle phase.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum PhaseState {
    NotStarted,
    /// Waiting for prerequisites (startup) or dependents (shutdown).
    Awaiting,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl PhaseState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Awaiting,
            2 => Self::Running,
            3 => Self::Completed,
            4 => Self::Failed,
            5 => Self::Cancelled,
            _ => Self::Skipped,
        }
    }

    fn from_completion(completion: &Completion) -> Self {
        match completion {
            Completion::Succeeded => Self::Completed,
            Completion::Failed(_) | Completion::Propagated(_) => Self::Failed,
            Completion::Cancelled => Self::Cancelled,
            Completion::Skipped => Self::Skipped,
        }
    }
}

#[derive(Debug)]
struct Phase {
    started: AtomicBool,
    state: AtomicU8,
    signal: CompletionSignal,
}

impl Phase {
    fn new(signal: CompletionSignal, pre_completed: bool) -> Self {
        let state = if pre_completed && signal.resolve(Completion::Succeeded) {
            PhaseState::Completed
        } else {
            PhaseState::NotStarted
        };

        Self {
            started: AtomicBool::new(false),
            state: AtomicU8::new(state as u8),
            signal,
        }
    }

    #[inline]
    fn has_begun(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    #[inline]
    fn try_begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    fn enter(&self, state: PhaseState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    fn state(&self) -> PhaseState {
        PhaseState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn finish(&self, completion: Completion) -> Completion {
        self.enter(PhaseState::from_completion(&completion));
        self.signal.resolve(completion.clone());
        completion
    }
}

/// Reference to another node in the graph, giving access to its completion signals.
#[derive(Clone, Debug)]
pub struct NodeLink {
    name: String,
    startup: CompletionSignal,
    shutdown: CompletionSignal,
}

impl NodeLink {
    pub(crate) fn new(name: String, startup: CompletionSignal, shutdown: CompletionSignal) -> Self {
        Self {
            name,
            startup,
            shutdown,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn startup_signal(&self) -> &CompletionSignal {
        &self.startup
    }

    #[inline]
    pub fn shutdown_signal(&self) -> &CompletionSignal {
        &self.shutdown
    }
}

/// A service in a [ServiceGraph](crate::graph::ServiceGraph). Nodes are created by the graph and
/// are immutable apart from their phase state.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ServiceNode {
    descriptor: ServiceDescriptor,
    #[derivative(Debug = "ignore")]
    instance: ServiceInstancePtr,
    #[derivative(Debug = "ignore")]
    hooks: ServiceHooks,
    prerequisites: Vec<NodeLink>,
    dependents: Vec<NodeLink>,
    startup: Phase,
    shutdown: Phase,
}

impl ServiceNode {
    pub(crate) fn new(
        registration: ServiceRegistration,
        own_link: NodeLink,
        prerequisites: Vec<NodeLink>,
        dependents: Vec<NodeLink>,
    ) -> Self {
        let ServiceRegistration {
            descriptor,
            instance,
            hooks,
        } = registration;

        // nothing to run and nothing to wait for - dependents shouldn't block on a no-op
        let startup = Phase::new(
            own_link.startup,
            hooks.startup.is_none() && prerequisites.is_empty(),
        );
        let shutdown = Phase::new(
            own_link.shutdown,
            hooks.shutdown.is_none() && dependents.is_empty(),
        );

        Self {
            descriptor,
            instance,
            hooks,
            prerequisites,
            dependents,
            startup,
            shutdown,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[inline]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Services which need to start before this one.
    #[inline]
    pub fn prerequisites(&self) -> &[NodeLink] {
        &self.prerequisites
    }

    /// Services which depend on this one.
    #[inline]
    pub fn dependents(&self) -> &[NodeLink] {
        &self.dependents
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.dependents.is_empty()
    }

    #[inline]
    pub fn has_startup_hook(&self) -> bool {
        self.hooks.startup.is_some()
    }

    #[inline]
    pub fn has_shutdown_hook(&self) -> bool {
        self.hooks.shutdown.is_some()
    }

    /// Returns the service instance, if it's of the given type.
    pub fn instance<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    #[inline]
    pub fn startup_state(&self) -> PhaseState {
        self.startup.state()
    }

    #[inline]
    pub fn shutdown_state(&self) -> PhaseState {
        self.shutdown.state()
    }

    #[inline]
    pub fn startup_signal(&self) -> &CompletionSignal {
        &self.startup.signal
    }

    #[inline]
    pub fn shutdown_signal(&self) -> &CompletionSignal {
        &self.shutdown.signal
    }

    /// Checks if startup has been claimed by someone.
    #[inline]
    pub fn has_begun_startup(&self) -> bool {
        self.startup.has_begun()
    }

    /// Checks if shutdown has been claimed by someone.
    #[inline]
    pub fn has_begun_shutdown(&self) -> bool {
        self.shutdown.has_begun()
    }

    /// Claims the right to execute startup. Returns `true` only for the first caller.
    #[inline]
    pub fn try_begin_startup(&self) -> bool {
        self.startup.try_begin()
    }

    /// Claims the right to execute shutdown. Returns `true` only for the first caller.
    #[inline]
    pub fn try_begin_shutdown(&self) -> bool {
        self.shutdown.try_begin()
    }

    /// Runs startup if no one else has claimed it yet, and waits for the outcome.
    pub async fn startup(&self, cancellation: &CancellationToken) -> Completion {
        if self.try_begin_startup() {
            self.execute_startup(cancellation).await
        } else {
            self.startup.signal.wait().await
        }
    }

    /// Runs shutdown if no one else has claimed it yet, and waits for the outcome.
    pub async fn shutdown(&self, cancellation: &CancellationToken) -> Completion {
        if self.try_begin_shutdown() {
            self.execute_shutdown(cancellation).await
        } else {
            self.shutdown.signal.wait().await
        }
    }

    /// Executes startup. Must only be called by the winner of [ServiceNode::try_begin_startup].
    pub(crate) async fn execute_startup(&self, cancellation: &CancellationToken) -> Completion {
        if let Some(completion) = self.startup.signal.current() {
            return completion;
        }

        self.startup.enter(PhaseState::Awaiting);

        let completion = match self.await_prerequisites(cancellation).await {
            Some(completion) => completion,
            None => match &self.hooks.startup {
                Some(hook) => self.run_startup_hook(hook, cancellation).await,
                None => Completion::Succeeded,
            },
        };

        self.startup.finish(completion)
    }

    /// Executes shutdown. Must only be called by the winner of [ServiceNode::try_begin_shutdown].
    pub(crate) async fn execute_shutdown(&self, cancellation: &CancellationToken) -> Completion {
        if let Some(completion) = self.shutdown.signal.current() {
            return completion;
        }

        self.shutdown.enter(PhaseState::Awaiting);

        let completion = if self.await_dependents(cancellation).await {
            debug!(service = self.name(), "Shutdown cancelled");
            Completion::Cancelled
        } else {
            match &self.hooks.shutdown {
                None => Completion::Succeeded,
                Some(_) if !self.is_started() => {
                    debug!(
                        service = self.name(),
                        "Skipping shutdown of a service which didn't start"
                    );
                    Completion::Skipped
                }
                Some(hook) => self.run_shutdown_hook(hook, cancellation).await,
            }
        };

        self.shutdown.finish(completion)
    }

    #[inline]
    fn is_started(&self) -> bool {
        matches!(self.startup.signal.current(), Some(Completion::Succeeded))
    }

    // returns the completion to use instead of running the hook, if it shouldn't be run
    async fn await_prerequisites(&self, cancellation: &CancellationToken) -> Option<Completion> {
        let mut pending = self
            .prerequisites
            .iter()
            .map(|prerequisite| prerequisite.startup.wait())
            .collect::<FuturesUnordered<_>>();

        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    debug!(service = self.name(), "Startup cancelled");
                    return Some(Completion::Cancelled);
                }
                next = pending.next() => match next {
                    None => return None,
                    Some(Completion::Succeeded) => {}
                    Some(Completion::Failed(failure) | Completion::Propagated(failure)) => {
                        warn!(
                            service = self.name(),
                            cause = failure.service.as_str(),
                            "Not starting service due to a failed prerequisite"
                        );
                        return Some(Completion::Propagated(failure));
                    }
                    Some(Completion::Cancelled | Completion::Skipped) => {
                        return Some(Completion::Cancelled)
                    }
                },
            }
        }
    }

    // returns true if cancelled while waiting
    async fn await_dependents(&self, cancellation: &CancellationToken) -> bool {
        let dependents = join_all(
            self.dependents
                .iter()
                .map(|dependent| dependent.shutdown.wait()),
        );

        tokio::select! {
            biased;

            _ = cancellation.cancelled() => true,
            _ = dependents => cancellation.is_cancelled(),
        }
    }

    async fn run_startup_hook(
        &self,
        hook: &LifecycleHook,
        cancellation: &CancellationToken,
    ) -> Completion {
        self.startup.enter(PhaseState::Running);
        debug!(service = self.name(), "Starting service...");

        match hook.invoke(cancellation).await {
            Ok(()) => {
                info!(service = self.name(), "Service started");
                Completion::Succeeded
            }
            Err(error) => {
                let failure = ServiceFailure::from_hook_error(self.name(), error);
                error!(
                    service = self.name(),
                    kind = ?failure.kind,
                    "Service failed to start: {}",
                    failure.error
                );
                Completion::Failed(failure)
            }
        }
    }

    async fn run_shutdown_hook(
        &self,
        hook: &LifecycleHook,
        cancellation: &CancellationToken,
    ) -> Completion {
        self.shutdown.enter(PhaseState::Running);
        debug!(service = self.name(), "Shutting down service...");

        match hook.invoke(cancellation).await {
            Ok(()) => {
                info!(service = self.name(), "Service shut down");
                Completion::Succeeded
            }
            Err(error) => {
                let failure = ServiceFailure::from_hook_error(self.name(), error);
                error!(
                    service = self.name(),
                    "Service failed to shut down: {}", failure.error
                );
                Completion::Failed(failure)
            }
        }
    }
}
