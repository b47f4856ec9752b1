//! One-shot, multi-waiter completion signals used to order lifecycle hooks.

use crate::error::ServiceFailure;
use std::sync::Arc;
use tokio::sync::watch::{channel, Sender};

/// Final outcome of a single lifecycle phase of a service.
#[derive(Clone, Debug)]
pub enum Completion {
    /// The hook succeeded or there was no hook to run.
    Succeeded,
    /// The hook of this service failed.
    Failed(ServiceFailure),
    /// The hook was not run, because a prerequisite failed. Carries the original failure.
    Propagated(ServiceFailure),
    /// Cancellation was requested before the hook could run.
    Cancelled,
    /// The hook was not run, because the service never finished starting.
    Skipped,
}

impl Completion {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns the failure which caused this outcome, if any.
    pub fn failure(&self) -> Option<&ServiceFailure> {
        match self {
            Self::Failed(failure) | Self::Propagated(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Resolves exactly once and broadcasts the [Completion] to every current and future waiter.
/// Clones share the same underlying state.
#[derive(Clone, Debug)]
pub struct CompletionSignal {
    state: Arc<Sender<Option<Completion>>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        let (sender, _) = channel(None);
        Self {
            state: Arc::new(sender),
        }
    }
}

impl CompletionSignal {
    /// Creates an already resolved signal.
    pub fn resolved(completion: Completion) -> Self {
        let (sender, _) = channel(Some(completion));
        Self {
            state: Arc::new(sender),
        }
    }

    /// Resolves the signal. Returns `false` if it was already resolved, in which case the given
    /// completion is discarded.
    pub fn resolve(&self, completion: Completion) -> bool {
        let mut completion = Some(completion);
        self.state.send_if_modified(|state| {
            if state.is_none() {
                *state = completion.take();
                true
            } else {
                false
            }
        })
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Returns the completion without waiting.
    #[inline]
    pub fn current(&self) -> Option<Completion> {
        self.state.borrow().clone()
    }

    /// Waits for the signal to resolve.
    pub async fn wait(&self) -> Completion {
        let mut receiver = self.state.subscribe();
        let completion = match receiver.wait_for(Option::is_some).await {
            Ok(state) => state.clone().unwrap_or(Completion::Cancelled),
            // the sender lives as long as self, so it cannot be dropped while waiting
            Err(_) => Completion::Cancelled,
        };
        completion
    }
}
