//! Core application framework functionality.

use crate::config::ApplicationConfig;
use crate::runner::ApplicationRunnerPtr;
use config::ConfigError;
use futures::future::try_join_all;
use ignition_service::error::{ErrorPtr, GraphError, StartupError};
use ignition_service::executor::Executors;
use ignition_service::graph::ServiceGraph;
use ignition_service::provider::{ServiceProvider, StaticServiceProvider};
use ignition_service::scheduler::ServiceScheduler;
use itertools::Itertools;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Error loading configuration: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Error retrieving services: {0}")]
    ServiceProviderError(ErrorPtr),
    #[error("Invalid service graph: {0}")]
    GraphError(#[from] GraphError),
    #[error("Error starting services: {0}")]
    StartupError(#[from] StartupError),
    #[error("Runner error: {0}")]
    RunnerError(ErrorPtr),
}

/// Main entrypoint for the application. Bootstraps the application by starting all services from
/// the [ServiceProvider], runs [ApplicationRunners](crate::runner::ApplicationRunner) and shuts the
/// services down afterwards. Services are shut down regardless of startup or runner errors.
pub struct Application<SP: ServiceProvider> {
    service_provider: SP,
    config: ApplicationConfig,
    executors: Executors,
    runners: Vec<Arc<ApplicationRunnerPtr>>,
}

impl<SP: ServiceProvider> Application<SP> {
    pub fn new(service_provider: SP, config: ApplicationConfig) -> Self {
        Self {
            service_provider,
            config,
            executors: Executors::default(),
            runners: vec![],
        }
    }

    /// Sets named runtimes for services with scheduler affinity.
    pub fn with_executors(mut self, executors: Executors) -> Self {
        self.executors = executors;
        self
    }

    pub fn with_runner(mut self, runner: Arc<ApplicationRunnerPtr>) -> Self {
        self.runners.push(runner);
        self
    }

    pub fn add_runner(&mut self, runner: Arc<ApplicationRunnerPtr>) -> &mut Self {
        self.runners.push(runner);
        self
    }

    #[inline]
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Starts services, runs all runners and shuts the services down once the runners finish.
    pub async fn run(&mut self) -> Result<(), ApplicationError> {
        self.execute(&CancellationToken::new(), false).await
    }

    /// Starts services, runs all runners and waits for the token to be cancelled before shutting
    /// the services down. Cancelling the token while starting or running stops waiting and
    /// proceeds to shutdown immediately, which counts as a successful run.
    pub async fn run_until(
        &mut self,
        cancellation: CancellationToken,
    ) -> Result<(), ApplicationError> {
        self.execute(&cancellation, true).await
    }

    async fn execute(
        &mut self,
        cancellation: &CancellationToken,
        wait_for_cancellation: bool,
    ) -> Result<(), ApplicationError> {
        if self.config.install_tracing_logger {
            install_tracing_logger();
        }

        info!("Searching for services...");

        let services = self
            .service_provider
            .services()
            .map_err(ApplicationError::ServiceProviderError)?;
        let graph = ServiceGraph::build(services)?;

        let scheduler = ServiceScheduler::new(
            graph,
            self.executors.clone(),
            self.config.scheduler_config(),
        );

        let result = match scheduler.startup(cancellation).await {
            Ok(()) => {
                tokio::select! {
                    result = self.run_runners(cancellation, wait_for_cancellation) => result,
                    _ = cancellation.cancelled() => {
                        info!("Application stop requested");
                        Ok(())
                    }
                }
            }
            Err(StartupError::Cancelled) if cancellation.is_cancelled() => {
                info!("Application stop requested during startup");
                Ok(())
            }
            Err(error) => Err(error.into()),
        };

        // stopping the application must not prevent graceful shutdown
        scheduler.shutdown(&CancellationToken::new()).await;

        result
    }

    async fn run_runners(
        &self,
        cancellation: &CancellationToken,
        wait_for_cancellation: bool,
    ) -> Result<(), ApplicationError> {
        info!("Running application runners...");

        for group in self.prioritized_runners() {
            try_join_all(group.iter().map(|runner| runner.run()))
                .await
                .map_err(ApplicationError::RunnerError)?;
        }

        if wait_for_cancellation {
            info!("Application runners finished - waiting for stop request");
            cancellation.cancelled().await;
        }

        Ok(())
    }

    fn prioritized_runners(&self) -> Vec<Vec<&ApplicationRunnerPtr>> {
        let grouped = self
            .runners
            .iter()
            .map(|runner| runner.as_ref())
            .sorted_by_key(|runner| Reverse(runner.priority()))
            .group_by(|runner| runner.priority());

        let mut groups = Vec::new();
        for (priority, group) in &grouped {
            let group = group.collect_vec();
            debug!(priority, runners = group.len(), "Found runner group");
            groups.push(group);
        }

        groups
    }
}

fn install_tracing_logger() {
    if tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {
        debug!("Global tracing subscriber already installed");
    }
}

/// Creates an [Application] with statically registered services and configuration loaded from the
/// environment.
pub fn create_default() -> Result<Application<StaticServiceProvider>, ApplicationError> {
    ApplicationConfig::init_from_environment()
        .map(|config| Application::new(StaticServiceProvider, config))
        .map_err(ApplicationError::ConfigError)
}
