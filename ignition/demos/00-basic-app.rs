use ignition::application;
use ignition::future::{BoxFuture, FutureExt};
use ignition::runner::{ApplicationRunner, ErrorPtr};
use ignition_service::lifecycle::{AsyncStartup, HookResult, Shutdown, Startup};
use ignition_service::{CancellationToken, Service};
use std::sync::Arc;
use std::time::Duration;

// services are discovered automatically when deriving Service; this one has no prerequisites, so
// it starts first
#[derive(Service)]
#[service(startup = "sync", shutdown = "sync")]
struct Logger;

impl Startup for Logger {
    fn startup(&self) -> HookResult {
        println!("Logger ready");
        Ok(())
    }
}

impl Shutdown for Logger {
    fn shutdown(&self) -> HookResult {
        println!("Logger closed");
        Ok(())
    }
}

// both caches wait for the logger, but start concurrently with each other
#[derive(Service)]
#[service(prerequisites = ["logger"], startup = "async")]
struct UserCache;

impl AsyncStartup for UserCache {
    fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            println!("User cache warmed up");
            Ok(())
        }
        .boxed()
    }
}

#[derive(Service)]
#[service(prerequisites = ["logger"], startup = "async")]
struct ProductCache;

impl AsyncStartup for ProductCache {
    fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            println!("Product cache warmed up");
            Ok(())
        }
        .boxed()
    }
}

// runners contain the actual application logic and run once all services have started
struct HelloWorldRunner;

impl ApplicationRunner for HelloWorldRunner {
    fn run(&self) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async {
            println!("Hello world!");
            Ok(())
        }
        .boxed()
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
#[tokio::main]
async fn main() {
    let mut application = application::create_default()
        .expect("unable to create default application")
        .with_runner(Arc::new(HelloWorldRunner));

    // prints "Logger ready", both caches in any order, "Hello world!" and "Logger closed"
    application.run().await.expect("error running application");
}
