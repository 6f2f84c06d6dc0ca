//! Utility functions for the container

/// Dependency resolution utilities
pub mod dependency {
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::thread::{self, ThreadId};

    /// Tracks beans currently being created, and by which thread.
    ///
    /// Registries consult this to answer "is this name currently being
    /// constructed", which lets callers skip an in-flight bean instead of
    /// recursing into it. Only the creating thread sees a circular
    /// reference; other threads should wait for the instance instead.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: RwLock<HashMap<String, ThreadId>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Checks if a bean is currently being created.
        pub fn is_creating(&self, name: &str) -> bool {
            self.creating.read().contains_key(name)
        }

        /// Checks if the current thread is creating the bean, i.e. asking
        /// again would be a circular reference.
        pub fn is_creating_in_current_thread(&self, name: &str) -> bool {
            self.creating.read().get(name) == Some(&thread::current().id())
        }

        /// Marks a bean as being created by the current thread.
        ///
        /// Returns `false` if the bean was already in the creating set.
        pub fn start_creating(&self, name: &str) -> bool {
            let mut creating = self.creating.write();
            if creating.contains_key(name) {
                return false;
            }
            creating.insert(name.to_string(), thread::current().id());
            true
        }

        /// Marks a bean as finished being created.
        pub fn finish_creating(&self, name: &str) {
            self.creating.write().remove(name);
        }

        /// Marks `name` as in creation until the returned guard is dropped.
        ///
        /// Returns `None` if the bean is already being created.
        pub fn guard(&self, name: &str) -> Option<CreationGuard<'_>> {
            if self.start_creating(name) {
                Some(CreationGuard {
                    tracker: self,
                    name: name.to_string(),
                })
            } else {
                None
            }
        }

        /// Gets a snapshot of all beans currently being created.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating.read().keys().cloned().collect()
        }
    }

    /// RAII marker that clears the creation flag on every exit path.
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        name: String,
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            self.tracker.finish_creating(&self.name);
        }
    }
}
