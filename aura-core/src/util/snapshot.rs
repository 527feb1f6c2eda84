use std::sync::Arc;

use parking_lot::Mutex;

/// Holds a collection that is never mutated in place.
/// Every update builds a new version and swaps it in, so readers can keep
/// iterating an older [Arc] while writers move on.
#[derive(Debug)]
pub struct Snapshot<T> {
    current: Mutex<Arc<Vec<T>>>,
}

impl<T: Clone> Snapshot<T> {
    /// Returns the current version.
    pub fn get(&self) -> Arc<Vec<T>> {
        self.current.lock().clone()
    }

    /// Builds a new version from the current one.
    /// The closure decides what the next version looks like, and its return value is passed through.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let mut current = self.current.lock();
        let mut next = Vec::clone(&current);

        let result = f(&mut next);
        *current = Arc::new(next);

        result
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(Arc::new(Vec::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_versions_are_untouched() {
        let snapshot = Snapshot::default();
        snapshot.update(|v| v.push(1));

        let before = snapshot.get();
        snapshot.update(|v| v.push(2));

        assert_eq!(*before, vec![1]);
        assert_eq!(*snapshot.get(), vec![1, 2]);
    }
}
