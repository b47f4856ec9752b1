//! Services are registered as a [ServiceRegistration] - a service instance along with its
//! [ServiceDescriptor] and the [LifecycleHooks](crate::lifecycle::LifecycleHook) it exposes.
//!
//! Registrations can be created manually:
//!
//! ```
//! use ignition_service::descriptor::ServiceDescriptor;
//! use ignition_service::lifecycle::{HookResult, Startup};
//! use ignition_service::registration::ServiceRegistration;
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! impl Startup for Database {
//!     fn startup(&self) -> HookResult {
//!         Ok(())
//!     }
//! }
//!
//! let registration = ServiceRegistration::builder(
//!     ServiceDescriptor::new("db").with_prerequisite("log"),
//!     Arc::new(Database),
//! )
//! .startup()
//! .build();
//! ```
//!
//! or automatically with `#[derive(Service)]`, if the `derive` feature is enabled:
//!
//! ```
//! use ignition_service::lifecycle::{HookResult, Shutdown};
//! use ignition_service::Service;
//!
//! #[derive(Service)]
//! #[service(name = "cache", prerequisites = ["db"], shutdown = "sync")]
//! struct Cache;
//!
//! impl Shutdown for Cache {
//!     fn shutdown(&self) -> HookResult {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ### Supported `#[service]` configuration
//!
//! * `name = "name"` - service name; defaults to the snake-cased type name
//! * `prerequisites = ["name", ...]` - names of services which need to start first
//! * `skip_if_prerequisite_missing` - ignore prerequisites which are not registered
//! * `skip_await` - don't block overall startup on this service
//! * `scheduler = "name"` - run hooks on the named [executor](crate::executor::Executors)
//! * `startup = "sync" | "async"` - register the [Startup](crate::lifecycle::Startup) or
//! [AsyncStartup](crate::lifecycle::AsyncStartup) implementation as the startup hook
//! * `shutdown = "sync" | "async"` - register the [Shutdown](crate::lifecycle::Shutdown) or
//! [AsyncShutdown](crate::lifecycle::AsyncShutdown) implementation as the shutdown hook
//! * `constructor = "expr"` - call `expr()` returning `Result<Self, ErrorPtr>` to create the
//! instance, instead of using `Default::default()`

use crate::descriptor::ServiceDescriptor;
use crate::error::ErrorPtr;
use crate::lifecycle::{
    AsyncShutdown, AsyncStartup, LifecycleHook, ServiceHooks, Shutdown, Startup,
};
use derivative::Derivative;
use std::any::Any;
use std::sync::Arc;

/// Type-erased service instance.
pub type ServiceInstancePtr = Arc<dyn Any + Send + Sync>;

/// A service instance ready to be put in a [ServiceGraph](crate::graph::ServiceGraph).
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ServiceRegistration {
    pub descriptor: ServiceDescriptor,

    #[derivative(Debug = "ignore")]
    pub instance: ServiceInstancePtr,

    #[derivative(Debug = "ignore")]
    pub hooks: ServiceHooks,
}

impl ServiceRegistration {
    pub fn builder<T: Send + Sync + 'static>(
        descriptor: ServiceDescriptor,
        instance: Arc<T>,
    ) -> ServiceRegistrationBuilder<T> {
        ServiceRegistrationBuilder {
            descriptor,
            instance,
            hooks: ServiceHooks::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Builder for [ServiceRegistration], which resolves lifecycle capabilities of the concrete
/// service type.
pub struct ServiceRegistrationBuilder<T> {
    descriptor: ServiceDescriptor,
    instance: Arc<T>,
    hooks: ServiceHooks,
}

impl<T: Send + Sync + 'static> ServiceRegistrationBuilder<T> {
    pub fn startup(mut self) -> Self
    where
        T: Startup,
    {
        self.hooks.startup = Some(LifecycleHook::startup(self.instance.clone()));
        self
    }

    pub fn async_startup(mut self) -> Self
    where
        T: AsyncStartup,
    {
        self.hooks.startup = Some(LifecycleHook::async_startup(self.instance.clone()));
        self
    }

    pub fn shutdown(mut self) -> Self
    where
        T: Shutdown,
    {
        self.hooks.shutdown = Some(LifecycleHook::shutdown(self.instance.clone()));
        self
    }

    pub fn async_shutdown(mut self) -> Self
    where
        T: AsyncShutdown,
    {
        self.hooks.shutdown = Some(LifecycleHook::async_shutdown(self.instance.clone()));
        self
    }

    pub fn build(self) -> ServiceRegistration {
        ServiceRegistration {
            descriptor: self.descriptor,
            instance: self.instance,
            hooks: self.hooks,
        }
    }
}

/// Statically defined service. Typically automatically derived with `#[derive(Service)]`.
pub trait ServiceDefinition: Sized + Send + Sync + 'static {
    /// Returns the static metadata for this service.
    fn descriptor() -> ServiceDescriptor;

    /// Creates a new instance of this service.
    fn create() -> Result<Self, ErrorPtr>;

    /// Creates a registration for given instance, with all declared lifecycle hooks.
    fn registration(instance: Arc<Self>) -> ServiceRegistration;

    /// Creates an instance and its registration.
    fn register() -> Result<ServiceRegistration, ErrorPtr> {
        Self::create().map(|instance| Self::registration(Arc::new(instance)))
    }
}

#[doc(hidden)]
pub mod internal {
    use crate::error::ErrorPtr;
    use crate::registration::ServiceRegistration;
    use inventory::collect;
    pub use inventory::submit;

    pub struct ServiceRegisterer {
        pub register: fn() -> Result<ServiceRegistration, ErrorPtr>,
    }

    collect!(ServiceRegisterer);
}
