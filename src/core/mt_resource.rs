use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` provides synchronized access to a value of type `T` that can be
/// shared between the main thread and task workers. Clones share the same
/// value.
///
/// A worker that panics while holding the lock does not take the engine down
/// with it: the lock is recovered and the value handed out as it was left.
///
/// # Examples
///
/// ```rust,ignore
/// # use std::thread;
/// use voxel_terrain::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let counter_clone = counter.clone();
///
/// let handle = thread::spawn(move || {
///     *counter_clone.get_mut() += 1;
/// });
///
/// handle.join().unwrap();
/// assert_eq!(*counter.get(), 1);
/// ```
///
/// # Performance Considerations
/// - Read operations (`get()`) can occur concurrently
/// - Write operations (`get_mut()`) are exclusive and will block other operations
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard for the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a mutable guard for the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_value() {
        let counter = MtResource::new(0);
        let worker_counter = counter.clone();

        std::thread::spawn(move || *worker_counter.get_mut() += 2)
            .join()
            .unwrap();

        assert_eq!(*counter.get(), 2);
    }

    #[test]
    fn a_panicking_writer_does_not_poison_readers() {
        let value = MtResource::new(String::from("kept"));
        let worker_value = value.clone();

        let outcome = std::thread::spawn(move || {
            let _guard = worker_value.get_mut();
            panic!("worker failed");
        })
        .join();

        assert!(outcome.is_err());
        assert_eq!(*value.get(), "kept");
    }
}
