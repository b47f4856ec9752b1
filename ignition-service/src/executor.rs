//! Services can request their lifecycle hooks to run on a specific runtime, e.g. a dedicated
//! runtime for blocking I/O or a single-threaded one for thread-affine resources. Such runtimes are
//! registered by name in [Executors] and referenced by
//! [ServiceDescriptor::scheduler_affinity](crate::descriptor::ServiceDescriptor::scheduler_affinity).

use fxhash::FxHashMap;
use tokio::runtime::Handle;
use tracing::warn;

/// Named runtime handles used to honor scheduler affinity.
#[derive(Clone, Default, Debug)]
pub struct Executors {
    handles: FxHashMap<String, Handle>,
}

impl Executors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named runtime handle. Returns the previous handle with the same name.
    pub fn register(&mut self, name: impl Into<String>, handle: Handle) -> Option<Handle> {
        self.handles.insert(name.into(), handle)
    }

    pub fn with(mut self, name: impl Into<String>, handle: Handle) -> Self {
        self.register(name, handle);
        self
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Returns the handle for the given affinity, falling back to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if the affinity doesn't name a registered runtime and this is called outside the
    /// context of a Tokio runtime.
    pub fn handle(&self, affinity: Option<&str>) -> Handle {
        match affinity {
            Some(name) => self.handles.get(name).cloned().unwrap_or_else(|| {
                warn!(
                    scheduler = name,
                    "Unknown scheduler requested - using the current runtime"
                );
                Handle::current()
            }),
            None => Handle::current(),
        }
    }
}
