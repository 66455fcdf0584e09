//! Collapse concurrent calls sharing a key into one execution

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{collections::HashMap, future::Future};

type Call<T> = Shared<BoxFuture<'static, T>>;

/// In-flight calls keyed by name. Every caller for a key awaits the same
/// future, so whatever that future writes before resolving is visible to all
/// of them once they wake up.
pub struct Group<T: Clone> {
    calls: Mutex<HashMap<String, Call<T>>>,
}

impl<T: Clone> Default for Group<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a call for it is already in flight, in
    /// which case wait for that one instead.
    pub async fn work<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let call = {
            let mut calls = self.calls.lock();
            calls
                .entry(key.to_string())
                .or_insert_with(|| work().boxed().shared())
                .clone()
        };

        let result = call.clone().await;

        // the first caller to wake up forgets the call, a newer one under the
        // same key is left alone
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| current.ptr_eq(&call)) {
            calls.remove(key);
        }

        result
    }

    /// Number of keys with a call in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}
