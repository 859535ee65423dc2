use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash, RandomState};
use std::pin::pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

/// Run jobs only once and store the results in a parallel hash map.
///
/// Dry-running a `setup.py` means spawning an interpreter, so when multiple threads ask for the
/// same key in parallel we want the first one to run the job and the others to wait for its
/// result. Unlike a plain memoization map, a job may fail: the registering thread then calls
/// [`OnceMap::abandon`], which wakes every waiter without storing anything, so that failures are
/// never remembered.
///
/// Note that this always clones the value out of the underlying map. Because
/// of this, it's common to wrap the `V` in an `Arc<V>` to make cloning cheap.
pub struct OnceMap<K, V, S = RandomState> {
    items: DashMap<K, Value<V>, S>,
}

impl<K: Eq + Hash + Clone, V: Clone, H: BuildHasher + Clone> OnceMap<K, V, H> {
    /// Create a [`OnceMap`] with the specified hasher.
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            items: DashMap::with_hasher(hasher),
        }
    }

    /// Register that you want to start a job.
    ///
    /// If this method returns `true`, you need to start a job and call either [`OnceMap::done`]
    /// or [`OnceMap::abandon`] eventually, or other threads will hang. If it returns `false`,
    /// this job is already in progress or finished and you can [`OnceMap::wait_blocking`] for the
    /// result.
    pub fn register(&self, key: K) -> bool {
        let entry = self.items.entry(key);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Value::Waiting(Arc::new(Notify::new())));
                true
            }
        }
    }

    /// Submit the result of a job you registered.
    pub fn done(&self, key: K, value: V) {
        if let Some(Value::Waiting(notify)) = self.items.insert(key, Value::Filled(value)) {
            notify.notify_waiters();
        }
    }

    /// Give up on a job you registered, waking everyone waiting for it.
    ///
    /// Waiters observe `None` and the key can be registered again.
    pub fn abandon(&self, key: &K) {
        if let Some((_, Value::Waiting(notify))) = self
            .items
            .remove_if(key, |_, value| matches!(value, Value::Waiting(_)))
        {
            notify.notify_waiters();
        }
    }

    /// Wait for the result of a job that is running.
    ///
    /// Returns `None` if the key was never registered or if the job was abandoned.
    pub async fn wait(&self, key: &K) -> Option<V> {
        let notify = {
            let entry = self.items.get(key)?;
            match entry.value() {
                Value::Filled(value) => return Some(value.clone()),
                Value::Waiting(notify) => notify.clone(),
            }
        };

        // Register the waiter for calls to `notify_waiters`.
        let notification = pin!(notify.notified());

        // Make sure the value wasn't inserted or abandoned in-between us checking the map and
        // registering the waiter.
        match self.items.get(key).as_deref() {
            Some(Value::Filled(value)) => return Some(value.clone()),
            Some(Value::Waiting(current)) if Arc::ptr_eq(current, &notify) => {}
            Some(Value::Waiting(_)) | None => return None,
        }

        // Wait until the value is inserted or the job is abandoned.
        notification.await;

        match self.items.get(key).as_deref() {
            Some(Value::Filled(value)) => Some(value.clone()),
            Some(Value::Waiting(_)) | None => None,
        }
    }

    /// Wait for the result of a job that is running, in a blocking context.
    ///
    /// Returns `None` if the key was never registered or if the job was abandoned.
    pub fn wait_blocking(&self, key: &K) -> Option<V> {
        futures::executor::block_on(self.wait(key))
    }

    /// Return the result of a previous job, if any.
    pub fn get<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        let entry = self.items.get(key)?;
        match entry.value() {
            Value::Filled(value) => Some(value.clone()),
            Value::Waiting(_) => None,
        }
    }

    /// Remove the result of a previous job, if any.
    pub fn remove<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        let (_, value) = self
            .items
            .remove_if(key, |_, value| matches!(value, Value::Filled(_)))?;
        match value {
            Value::Filled(value) => Some(value),
            Value::Waiting(_) => unreachable!("only filled values are removed"),
        }
    }

    /// Remove every finished result.
    ///
    /// Jobs that are still running are kept, so that their waiters are still woken up.
    pub fn clear(&self) {
        self.items
            .retain(|_, value| matches!(value, Value::Waiting(_)));
    }

    /// Returns the number of finished results.
    pub fn len(&self) -> usize {
        self.items
            .iter()
            .filter(|entry| matches!(entry.value(), Value::Filled(_)))
            .count()
    }

    /// Returns `true` if there are no finished results.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V, H: Default + BuildHasher + Clone> Default for OnceMap<K, V, H> {
    fn default() -> Self {
        Self {
            items: DashMap::with_hasher(H::default()),
        }
    }
}

enum Value<V> {
    Waiting(Arc<Notify>),
    Filled(V),
}
