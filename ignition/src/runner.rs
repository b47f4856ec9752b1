//! Runners executing actual application logic.

pub use ignition_service::error::ErrorPtr;
pub use ignition_service::future::{BoxFuture, FutureExt};
#[cfg(test)]
use mockall::automock;

pub type ApplicationRunnerPtr = dyn ApplicationRunner + Send + Sync;

/// Runs application logic. Runners are run by the [Application](crate::application::Application)
/// after all services have started, and before they are shut down. Runners with the same priority
/// are ran concurrently.
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> BoxFuture<'_, Result<(), ErrorPtr>>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}
