//! Keyed callback fan-out shared by the connection layer and the registry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub(crate) type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by every `on(...)` registration.
///
/// Dropping the handle keeps the registration alive; call
/// [`Subscription::unsubscribe`] to remove exactly this callback.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// Callbacks grouped by key. Every callback registered for a key runs on
/// every emission for that key.
pub(crate) struct ListenerSet<K, E> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<K, Vec<(u64, Callback<E>)>>>,
}

impl<K, E> ListenerSet<K, E>
where
    K: Eq + Hash + Send + Sync + 'static,
    E: 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn add(self: &Arc<Self>, key: K, callback: Callback<E>) -> Subscription
    where
        K: Clone,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .push((id, callback));

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(set) = weak.upgrade() {
                set.remove(&key, id);
            }
        })
    }

    fn remove(&self, key: &K, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(callbacks) = entries.get_mut(key) {
            callbacks.retain(|(cb_id, _)| *cb_id != id);
            if callbacks.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// Invoke every callback for `key`. Callbacks run outside the lock, so
    /// they may register or remove listeners themselves. Returns how many
    /// callbacks ran.
    pub(crate) fn emit<Q>(&self, key: &Q, event: &E) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let callbacks: Vec<Callback<E>> = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(callbacks) => callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    pub(crate) fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }

    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Callback<u32>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = Arc::clone(&hits);
        let cb: Callback<u32> = Arc::new(move |_: &u32| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        });
        (hits, cb)
    }

    #[test]
    fn emit_fans_out_to_every_registration() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let _sa = set.add("tick".to_string(), cb_a);
        let _sb = set.add("tick".to_string(), cb_b);

        assert_eq!(set.emit("tick", &1), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_registration() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let sa = set.add("tick".to_string(), cb_a);
        let _sb = set.add("tick".to_string(), cb_b);

        sa.unsubscribe();
        set.emit("tick", &1);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(set.count("tick"), 1);
    }

    #[test]
    fn emit_for_unknown_key_is_a_no_op() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        assert_eq!(set.emit("nothing", &0), 0);
    }

    #[test]
    fn callback_may_register_during_emit() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        let inner = Arc::clone(&set);
        let _s = set.add(
            "outer".to_string(),
            Arc::new(move |_: &u32| {
                let _ = inner.add("late".to_string(), Arc::new(|_: &u32| {}));
            }),
        );

        set.emit("outer", &0);
        assert_eq!(set.count("late"), 1);
    }

    #[test]
    fn unsubscribe_after_set_dropped_is_harmless() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        let (_hits, cb) = counter();
        let sub = set.add("tick".to_string(), cb);
        drop(set);
        sub.unsubscribe();
    }

    #[test]
    fn clear_drops_everything() {
        let set: Arc<ListenerSet<String, u32>> = ListenerSet::new();
        let (hits, cb) = counter();
        let _s = set.add("tick".to_string(), cb);
        set.clear();
        set.emit("tick", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
