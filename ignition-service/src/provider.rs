//! Providers are the source of services for a [ServiceGraph](crate::graph::ServiceGraph). They
//! are responsible for creating service instances and attaching their declarative metadata.

use crate::error::ErrorPtr;
use crate::registration::internal::ServiceRegisterer;
use crate::registration::ServiceRegistration;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

/// Generic source of [ServiceRegistrations](ServiceRegistration).
#[cfg_attr(test, automock)]
pub trait ServiceProvider {
    /// Creates and returns all known services.
    fn services(&self) -> Result<Vec<ServiceRegistration>, ErrorPtr>;
}

/// Provider of services registered statically, e.g. with `#[derive(Service)]`. Each call to
/// [ServiceProvider::services] creates new instances.
#[derive(Default, Clone, Copy, Debug)]
pub struct StaticServiceProvider;

impl ServiceProvider for StaticServiceProvider {
    fn services(&self) -> Result<Vec<ServiceRegistration>, ErrorPtr> {
        let services: Vec<_> = inventory::iter::<ServiceRegisterer>
            .into_iter()
            .map(|registerer| (registerer.register)())
            .try_collect()?;

        debug!(count = services.len(), "Found statically registered services");
        Ok(services)
    }
}

/// Provider of explicitly added services.
#[derive(Default, Clone, Debug)]
pub struct ServiceCollection {
    services: Vec<ServiceRegistration>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: ServiceRegistration) -> &mut Self {
        self.services.push(registration);
        self
    }

    pub fn with(mut self, registration: ServiceRegistration) -> Self {
        self.services.push(registration);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceProvider for ServiceCollection {
    fn services(&self) -> Result<Vec<ServiceRegistration>, ErrorPtr> {
        Ok(self.services.clone())
    }
}

impl FromIterator<ServiceRegistration> for ServiceCollection {
    fn from_iter<T: IntoIterator<Item = ServiceRegistration>>(iter: T) -> Self {
        Self {
            services: iter.into_iter().collect(),
        }
    }
}
