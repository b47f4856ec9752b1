//! Declarative metadata attached to each service.

/// Describes a single service: its unique name, the services which need to be started before it
/// and options altering how it's scheduled. Descriptors are usually created alongside service
/// instances by a [ServiceProvider](crate::provider::ServiceProvider), either explicitly or with
/// `#[derive(Service)]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    /// Unique service name.
    pub name: String,

    /// Names of services which must complete startup before this one starts, and which will be
    /// shut down only after this one completes shutdown.
    pub prerequisites: Vec<String>,

    /// Silently drop edges to prerequisites which are not registered, instead of failing graph
    /// construction.
    pub skip_if_prerequisite_missing: bool,

    /// Start the service, but don't block overall startup until it finishes. Dependents still wait
    /// for it.
    pub skip_await_on_startup: bool,

    /// Name of the [executor](crate::executor::Executors) to run lifecycle hooks on. Uses the
    /// ambient runtime when not set.
    pub scheduler_affinity: Option<String>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: impl Into<String>) -> Self {
        self.prerequisites.push(prerequisite.into());
        self
    }

    pub fn skip_if_prerequisite_missing(mut self) -> Self {
        self.skip_if_prerequisite_missing = true;
        self
    }

    pub fn skip_await_on_startup(mut self) -> Self {
        self.skip_await_on_startup = true;
        self
    }

    pub fn with_scheduler_affinity(mut self, scheduler: impl Into<String>) -> Self {
        self.scheduler_affinity = Some(scheduler.into());
        self
    }

    /// Checks if the name can be used to identify a service.
    #[inline]
    pub fn has_valid_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}
