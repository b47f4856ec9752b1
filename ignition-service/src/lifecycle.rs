//! Lifecycle hooks which services can expose. Each phase (startup and shutdown) comes in two
//! shapes: a synchronous one, run on the blocking thread pool, and an asynchronous cancellable one.
//! The shape is resolved once, when the service is
//! [registered](crate::registration::ServiceRegistration), and stored as a [LifecycleHook].

use crate::error::{HookError, HookPanicked};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of running a lifecycle hook.
pub type HookResult = Result<(), HookError>;

/// Synchronous startup hook.
pub trait Startup {
    fn startup(&self) -> HookResult;
}

/// Asynchronous startup hook. Long-running hooks should observe the cancellation token.
pub trait AsyncStartup {
    fn startup_async(&self, cancellation: CancellationToken) -> BoxFuture<'_, HookResult>;
}

/// Synchronous shutdown hook.
pub trait Shutdown {
    fn shutdown(&self) -> HookResult;
}

/// Asynchronous shutdown hook. Long-running hooks should observe the cancellation token.
pub trait AsyncShutdown {
    fn shutdown_async(&self, cancellation: CancellationToken) -> BoxFuture<'_, HookResult>;
}

pub type SyncHookFn = dyn Fn() -> HookResult + Send + Sync;
pub type AsyncHookFn = dyn Fn(CancellationToken) -> BoxFuture<'static, HookResult> + Send + Sync;

/// Type-erased lifecycle hook for a single phase.
#[derive(Clone)]
pub enum LifecycleHook {
    Sync(Arc<SyncHookFn>),
    Async(Arc<AsyncHookFn>),
}

impl LifecycleHook {
    pub fn startup<T: Startup + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::Sync(Arc::new(move || instance.startup()))
    }

    pub fn async_startup<T: AsyncStartup + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::Async(Arc::new(move |cancellation| {
            let instance = instance.clone();
            async move { instance.startup_async(cancellation).await }.boxed()
        }))
    }

    pub fn shutdown<T: Shutdown + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::Sync(Arc::new(move || instance.shutdown()))
    }

    pub fn async_shutdown<T: AsyncShutdown + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::Async(Arc::new(move |cancellation| {
            let instance = instance.clone();
            async move { instance.shutdown_async(cancellation).await }.boxed()
        }))
    }

    /// Runs the hook to completion. Panics are converted into transient [HookError]s.
    pub async fn invoke(&self, cancellation: &CancellationToken) -> HookResult {
        match self {
            Self::Sync(hook) => {
                let hook = hook.clone();
                match tokio::task::spawn_blocking(move || hook()).await {
                    Ok(result) => result,
                    Err(error) if error.is_panic() => {
                        Err(HookError::transient(panic_error(error.into_panic())))
                    }
                    Err(error) => Err(HookError::transient(error)),
                }
            }
            Self::Async(hook) => AssertUnwindSafe(hook(cancellation.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(HookError::transient(panic_error(payload)))),
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> HookPanicked {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    HookPanicked(message)
}

/// Hooks exposed by a single service. A missing hook means the service doesn't take part in the
/// given phase.
#[derive(Clone, Default)]
pub struct ServiceHooks {
    pub startup: Option<LifecycleHook>,
    pub shutdown: Option<LifecycleHook>,
}
