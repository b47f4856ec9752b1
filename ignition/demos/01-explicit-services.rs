// note: this example assumes you've analyzed the previous one

use ignition::application::Application;
use ignition::config::ApplicationConfig;
use ignition::future::{BoxFuture, FutureExt};
use ignition::CancellationToken;
use ignition_service::descriptor::ServiceDescriptor;
use ignition_service::error::HookError;
use ignition_service::lifecycle::{AsyncShutdown, AsyncStartup, HookResult, Startup};
use ignition_service::provider::ServiceCollection;
use ignition_service::registration::ServiceRegistration;
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Log;

impl Startup for Log {
    fn startup(&self) -> HookResult {
        println!("[log] started");
        Ok(())
    }
}

#[derive(Default)]
struct Db {
    connected: AtomicBool,
}

impl AsyncStartup for Db {
    fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.connected.store(true, Ordering::SeqCst);
            println!("[db] connected");
            Ok(())
        }
        .boxed()
    }
}

impl AsyncShutdown for Db {
    fn shutdown_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            self.connected.store(false, Ordering::SeqCst);
            println!("[db] disconnected");
            Ok(())
        }
        .boxed()
    }
}

struct Api {
    db: Arc<Db>,
}

impl AsyncStartup for Api {
    fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            // a fatal error aborts the whole startup, not only dependents of this service
            if !self.db.connected.load(Ordering::SeqCst) {
                return Err(HookError::fatal(Error::new(
                    ErrorKind::NotConnected,
                    "database is not available",
                )));
            }

            println!("[api] listening");
            Ok(())
        }
        .boxed()
    }
}

impl AsyncShutdown for Api {
    fn shutdown_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async {
            println!("[api] stopped");
            Ok(())
        }
        .boxed()
    }
}

#[tokio::main]
async fn main() {
    let db = Arc::new(Db::default());

    // services can be registered explicitly, which allows sharing instances between them
    let services = ServiceCollection::new()
        .with(
            ServiceRegistration::builder(ServiceDescriptor::new("log"), Arc::new(Log))
                .startup()
                .build(),
        )
        .with(
            ServiceRegistration::builder(
                ServiceDescriptor::new("db").with_prerequisite("log"),
                db.clone(),
            )
            .async_startup()
            .async_shutdown()
            .build(),
        )
        .with(
            ServiceRegistration::builder(
                ServiceDescriptor::new("api").with_prerequisite("db"),
                Arc::new(Api { db }),
            )
            .async_startup()
            .async_shutdown()
            .build(),
        );

    let config = ApplicationConfig::default().with_shutdown_grace_period(Duration::from_secs(5));
    let mut application = Application::new(services, config);

    // run until ctrl-c is pressed, then shut down api before db
    let cancellation = CancellationToken::new();
    tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        }
    });

    application
        .run_until(cancellation)
        .await
        .expect("error running application");
}
