//! Task name registry
//!
//! Names are reserved for the lifetime of the owning scheduler; there is no
//! unregister operation.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, SchedulerError};

/// Set of task names registered on one scheduler
#[derive(Debug, Default)]
pub struct TaskRegistry {
    names: Mutex<HashSet<String>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn names(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is only ever inserted into, so a poisoned guard is still consistent
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `name`, failing if it is already taken
    pub fn register(&self, name: &str) -> Result<()> {
        let mut names = self.names();
        if names.contains(name) {
            return Err(SchedulerError::NotUniqueTaskName(name.to_string()));
        }
        names.insert(name.to_string());
        Ok(())
    }

    /// Whether `name` has been registered
    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Whether nothing has been registered yet
    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names().iter().cloned().collect();
        names.sort();
        names
    }
}
