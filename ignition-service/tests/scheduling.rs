use futures::future::{BoxFuture, FutureExt};
use ignition_service::descriptor::ServiceDescriptor;
use ignition_service::error::{FailureKind, HookError, StartupError};
use ignition_service::executor::Executors;
use ignition_service::graph::ServiceGraph;
use ignition_service::lifecycle::{AsyncShutdown, AsyncStartup, HookResult};
use ignition_service::node::PhaseState;
use ignition_service::registration::ServiceRegistration;
use ignition_service::scheduler::{SchedulerConfig, ServiceScheduler};
use ignition_service::CancellationToken;
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::{sleep, timeout};

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|recorded| recorded == event)
            .unwrap_or_else(|| panic!("missing event: {event}"))
    }

    fn count(&self, event: &str) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }
}

struct RecordedService {
    name: String,
    recorder: Recorder,
    delay: Duration,
    startup_failure: Option<FailureKind>,
    barrier: Option<Arc<Barrier>>,
}

impl RecordedService {
    fn new(name: &str, recorder: &Recorder) -> Self {
        Self {
            name: name.to_string(),
            recorder: recorder.clone(),
            delay: Duration::from_millis(5),
            startup_failure: None,
            barrier: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self, kind: FailureKind) -> Self {
        self.startup_failure = Some(kind);
        self
    }

    fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }
}

impl AsyncStartup for RecordedService {
    fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async move {
            self.recorder.record(format!("start:{}:begin", self.name));

            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }

            sleep(self.delay).await;
            self.recorder.record(format!("start:{}:end", self.name));

            match self.startup_failure {
                Some(kind) => Err(HookError::new(
                    kind,
                    Arc::new(Error::new(
                        ErrorKind::Other,
                        format!("{} refused to start", self.name),
                    )),
                )),
                None => Ok(()),
            }
        }
        .boxed()
    }
}

impl AsyncShutdown for RecordedService {
    fn shutdown_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
        async move {
            self.recorder.record(format!("stop:{}:begin", self.name));
            sleep(self.delay).await;
            self.recorder.record(format!("stop:{}:end", self.name));
            Ok(())
        }
        .boxed()
    }
}

fn register(descriptor: ServiceDescriptor, service: RecordedService) -> ServiceRegistration {
    ServiceRegistration::builder(descriptor, Arc::new(service))
        .async_startup()
        .async_shutdown()
        .build()
}

fn create_scheduler(registrations: Vec<ServiceRegistration>) -> ServiceScheduler {
    ServiceScheduler::new(
        ServiceGraph::build(registrations).unwrap(),
        Executors::default(),
        SchedulerConfig::default().with_shutdown_grace_period(Duration::from_secs(5)),
    )
}

fn diamond(recorder: &Recorder) -> Vec<ServiceRegistration> {
    vec![
        register(
            ServiceDescriptor::new("r"),
            RecordedService::new("r", recorder),
        ),
        register(
            ServiceDescriptor::new("a").with_prerequisite("r"),
            RecordedService::new("a", recorder).with_delay(Duration::from_millis(20)),
        ),
        register(
            ServiceDescriptor::new("b").with_prerequisite("r"),
            RecordedService::new("b", recorder),
        ),
        register(
            ServiceDescriptor::new("l").with_prerequisites(["a", "b"]),
            RecordedService::new("l", recorder),
        ),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_start_and_stop_in_dependency_order() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("api").with_prerequisite("db"),
            RecordedService::new("api", &recorder),
        ),
        register(
            ServiceDescriptor::new("db").with_prerequisite("log"),
            RecordedService::new("db", &recorder),
        ),
        register(
            ServiceDescriptor::new("log"),
            RecordedService::new("log", &recorder),
        ),
    ]);
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();
    let report = scheduler.shutdown(&cancellation).await;
    assert!(report.is_clean());

    assert_eq!(
        recorder.events(),
        vec![
            "start:log:begin",
            "start:log:end",
            "start:db:begin",
            "start:db:end",
            "start:api:begin",
            "start:api:end",
            "stop:api:begin",
            "stop:api:end",
            "stop:db:begin",
            "stop:db:end",
            "stop:log:begin",
            "stop:log:end",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_run_shared_prerequisite_once() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(diamond(&recorder));
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();
    scheduler.shutdown(&cancellation).await;

    for name in ["r", "a", "b", "l"] {
        assert_eq!(recorder.count(&format!("start:{name}:begin")), 1);
        assert_eq!(recorder.count(&format!("stop:{name}:begin")), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_start_dependent_after_all_prerequisites() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(diamond(&recorder));
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();

    let leaf_start = recorder.position("start:l:begin");
    assert!(recorder.position("start:a:end") < leaf_start);
    assert!(recorder.position("start:b:end") < leaf_start);
    assert!(recorder.position("start:r:end") < recorder.position("start:a:begin"));
    assert!(recorder.position("start:r:end") < recorder.position("start:b:begin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_shut_down_prerequisite_after_all_dependents() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(diamond(&recorder));
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();
    scheduler.shutdown(&cancellation).await;

    let root_stop = recorder.position("stop:r:begin");
    assert!(recorder.position("stop:a:end") < root_stop);
    assert!(recorder.position("stop:b:end") < root_stop);
    assert!(recorder.position("stop:l:end") < recorder.position("stop:a:begin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_run_siblings_concurrently() {
    let recorder = Recorder::default();
    let barrier = Arc::new(Barrier::new(2));
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("r"),
            RecordedService::new("r", &recorder),
        ),
        register(
            ServiceDescriptor::new("a").with_prerequisite("r"),
            RecordedService::new("a", &recorder).with_barrier(barrier.clone()),
        ),
        register(
            ServiceDescriptor::new("b").with_prerequisite("r"),
            RecordedService::new("b", &recorder).with_barrier(barrier),
        ),
    ]);

    // both siblings must be inside their hooks at the same time to pass the barrier
    timeout(
        Duration::from_secs(5),
        scheduler.startup(&CancellationToken::new()),
    )
    .await
    .expect("siblings did not run concurrently")
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_propagate_fatal_failure() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("r"),
            RecordedService::new("r", &recorder),
        ),
        register(
            ServiceDescriptor::new("a").with_prerequisite("r"),
            RecordedService::new("a", &recorder).failing(FailureKind::Fatal),
        ),
        register(
            ServiceDescriptor::new("b").with_prerequisite("r"),
            RecordedService::new("b", &recorder),
        ),
        register(
            ServiceDescriptor::new("l").with_prerequisites(["a", "b"]),
            RecordedService::new("l", &recorder),
        ),
    ]);
    let cancellation = CancellationToken::new();

    let error = scheduler.startup(&cancellation).await.unwrap_err();
    assert!(matches!(error, StartupError::Fatal { ref service, .. } if service == "a"));

    let report = scheduler.shutdown(&cancellation).await;
    assert_eq!(recorder.count("start:l:begin"), 0);
    assert_eq!(
        scheduler.graph().node("l").unwrap().startup_state(),
        PhaseState::Failed
    );

    // started services are still shut down, failed ones are skipped
    assert_eq!(recorder.count("stop:r:begin"), 1);
    assert_eq!(recorder.count("stop:a:begin"), 0);
    assert!(report.skipped.contains(&"a".to_string()));
    assert!(report.skipped.contains(&"l".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_fail_on_transient_failure_of_awaited_service() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![register(
        ServiceDescriptor::new("a"),
        RecordedService::new("a", &recorder).failing(FailureKind::Transient),
    )]);

    assert!(matches!(
        scheduler.startup(&CancellationToken::new()).await.unwrap_err(),
        StartupError::ServiceFailed { ref service, .. } if service == "a"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_ignore_transient_failure_of_background_service() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("background").skip_await_on_startup(),
            RecordedService::new("background", &recorder).failing(FailureKind::Transient),
        ),
        register(
            ServiceDescriptor::new("main"),
            RecordedService::new("main", &recorder).with_delay(Duration::from_millis(50)),
        ),
    ]);

    scheduler.startup(&CancellationToken::new()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_abort_on_fatal_failure_of_background_service() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("background").skip_await_on_startup(),
            RecordedService::new("background", &recorder).failing(FailureKind::Fatal),
        ),
        register(
            ServiceDescriptor::new("main"),
            RecordedService::new("main", &recorder).with_delay(Duration::from_secs(5)),
        ),
    ]);

    let error = timeout(
        Duration::from_secs(2),
        scheduler.startup(&CancellationToken::new()),
    )
    .await
    .expect("startup didn't fail fast")
    .unwrap_err();

    assert!(matches!(error, StartupError::Fatal { ref service, .. } if service == "background"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_not_await_background_service() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("background").skip_await_on_startup(),
            RecordedService::new("background", &recorder).with_delay(Duration::from_millis(200)),
        ),
        register(
            ServiceDescriptor::new("main"),
            RecordedService::new("main", &recorder),
        ),
    ]);
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();
    assert_eq!(recorder.count("start:background:end"), 0);

    // shutdown waits for the background service to finish starting, and then shuts it down
    let report = scheduler.shutdown(&cancellation).await;
    assert!(report.skipped.is_empty());
    assert!(recorder.position("start:background:end") < recorder.position("stop:background:begin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_make_service_with_missing_prerequisite_a_root() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![register(
        ServiceDescriptor::new("x")
            .with_prerequisite("y")
            .skip_if_prerequisite_missing(),
        RecordedService::new("x", &recorder),
    )]);

    assert!(scheduler.graph().node("x").unwrap().is_root());
    scheduler.startup(&CancellationToken::new()).await.unwrap();
    assert_eq!(recorder.count("start:x:end"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_complete_larger_acyclic_graph() {
    let recorder = Recorder::default();
    let registrations = (0u64..24)
        .map(|index| {
            let prerequisites = [index / 2, index / 3, index.saturating_sub(5)]
                .into_iter()
                .filter(|prerequisite| *prerequisite < index)
                .map(|prerequisite| format!("s{prerequisite}"));

            register(
                ServiceDescriptor::new(format!("s{index}")).with_prerequisites(prerequisites),
                RecordedService::new(&format!("s{index}"), &recorder)
                    .with_delay(Duration::from_millis(index % 4)),
            )
        })
        .collect();

    let scheduler = create_scheduler(registrations);
    let cancellation = CancellationToken::new();

    timeout(Duration::from_secs(10), async {
        scheduler.startup(&cancellation).await.unwrap();
        assert!(scheduler.shutdown(&cancellation).await.is_clean());
    })
    .await
    .expect("graph did not complete");

    let graph = scheduler.graph();
    for node in graph.nodes() {
        let name = node.name();
        assert_eq!(recorder.count(&format!("start:{name}:begin")), 1);
        assert_eq!(recorder.count(&format!("stop:{name}:begin")), 1);

        for prerequisite in graph.prerequisites_of(node) {
            assert!(
                recorder.position(&format!("start:{}:end", prerequisite.name()))
                    < recorder.position(&format!("start:{name}:begin"))
            );
            assert!(
                recorder.position(&format!("stop:{name}:end"))
                    < recorder.position(&format!("stop:{}:begin", prerequisite.name()))
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_complete_deep_chain() {
    let registrations = (0usize..10_000)
        .map(|index| {
            ServiceRegistration::builder(
                ServiceDescriptor::new(format!("s{index}"))
                    .with_prerequisites((index > 0).then(|| format!("s{}", index - 1))),
                Arc::new(()),
            )
            .build()
        })
        .collect();

    let scheduler = create_scheduler(registrations);
    let cancellation = CancellationToken::new();

    let report = timeout(Duration::from_secs(30), async {
        scheduler.startup(&cancellation).await.unwrap();
        scheduler.shutdown(&cancellation).await
    })
    .await
    .expect("chain did not complete");

    assert!(report.is_clean());
    assert!(scheduler.graph().nodes().all(|node| {
        node.startup_state() == PhaseState::Completed
            && node.shutdown_state() == PhaseState::Completed
    }));
}

#[tokio::test]
async fn should_cancel_pending_shutdowns() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("root"),
            RecordedService::new("root", &recorder),
        ),
        register(
            ServiceDescriptor::new("leaf").with_prerequisite("root"),
            RecordedService::new("leaf", &recorder).with_delay(Duration::from_millis(100)),
        ),
    ]);

    scheduler.startup(&CancellationToken::new()).await.unwrap();

    let cancellation = CancellationToken::new();
    let stop = {
        let cancellation = cancellation.clone();
        async move {
            sleep(Duration::from_millis(20)).await;
            cancellation.cancel();
        }
    };

    let (report, _) = tokio::join!(scheduler.shutdown(&cancellation), stop);

    // the running hook is not interrupted, but nothing new gets started
    assert_eq!(recorder.count("stop:leaf:end"), 1);
    assert_eq!(recorder.count("stop:root:begin"), 0);

    assert!(!report.is_clean());
    assert!(report.failures.is_empty());
    assert_eq!(report.cancelled, vec!["root"]);

    let graph = scheduler.graph();
    assert_eq!(
        graph.node("leaf").unwrap().shutdown_state(),
        PhaseState::Completed
    );
    assert_eq!(
        graph.node("root").unwrap().shutdown_state(),
        PhaseState::Cancelled
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_not_run_hooks_again() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(diamond(&recorder));
    let cancellation = CancellationToken::new();

    scheduler.startup(&cancellation).await.unwrap();
    scheduler.startup(&cancellation).await.unwrap();
    scheduler.shutdown(&cancellation).await;
    scheduler.shutdown(&cancellation).await;

    assert_eq!(recorder.count("start:r:begin"), 1);
    assert_eq!(recorder.count("stop:r:begin"), 1);

    let root = scheduler.graph().node("r").unwrap();
    assert!(!root.try_begin_shutdown());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_stop_launching_hooks_when_cancelled() {
    let recorder = Recorder::default();
    let scheduler = create_scheduler(vec![
        register(
            ServiceDescriptor::new("slow"),
            RecordedService::new("slow", &recorder).with_delay(Duration::from_millis(100)),
        ),
        register(
            ServiceDescriptor::new("dependent").with_prerequisite("slow"),
            RecordedService::new("dependent", &recorder),
        ),
    ]);
    let cancellation = CancellationToken::new();

    let cancel = {
        let cancellation = cancellation.clone();
        async move {
            sleep(Duration::from_millis(20)).await;
            cancellation.cancel();
        }
    };

    let (result, _) = tokio::join!(scheduler.startup(&cancellation), cancel);
    assert!(matches!(result.unwrap_err(), StartupError::Cancelled));

    let graph = scheduler.graph();
    let slow = graph.node("slow").unwrap();
    slow.startup_signal().wait().await;

    // the in-flight hook finishes, but the dependent never starts
    assert_eq!(recorder.count("start:slow:end"), 1);
    assert_eq!(recorder.count("start:dependent:begin"), 0);
    assert_eq!(
        graph.node("dependent").unwrap().startup_state(),
        PhaseState::Cancelled
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_honor_scheduler_affinity() {
    struct ThreadRecorder(Arc<Mutex<Option<String>>>);

    impl AsyncStartup for ThreadRecorder {
        fn startup_async(&self, _cancellation: CancellationToken) -> BoxFuture<'_, HookResult> {
            async {
                *self.0.lock().unwrap() = std::thread::current().name().map(str::to_string);
                Ok(())
            }
            .boxed()
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("affine-worker")
        .enable_all()
        .build()
        .unwrap();

    let thread_name = Arc::new(Mutex::new(None));
    let scheduler = ServiceScheduler::new(
        ServiceGraph::build(vec![ServiceRegistration::builder(
            ServiceDescriptor::new("affine").with_scheduler_affinity("dedicated"),
            Arc::new(ThreadRecorder(thread_name.clone())),
        )
        .async_startup()
        .build()])
        .unwrap(),
        Executors::new().with("dedicated", runtime.handle().clone()),
        SchedulerConfig::default(),
    );

    scheduler.startup(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        thread_name.lock().unwrap().as_deref(),
        Some("affine-worker")
    );

    runtime.shutdown_background();
}
