use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::models::Item;

type NotifierFn = Arc<dyn Fn(Arc<[Item]>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Subscribers interested in newly observed items.
///
/// Every subscriber receives the same frozen item sequence in its own task,
/// so a slow or panicking subscriber never holds up the others.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Mutex<Vec<NotifierFn>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register<F, Fut>(&self, notifier: F)
    where
        F: Fn(Arc<[Item]>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let notifier: NotifierFn = Arc::new(move |items| notifier(items).boxed());
        let mut notifiers = self.notifiers.lock().await;
        notifiers.push(notifier);
        debug!(count = notifiers.len(), "registered notifier");
    }

    pub async fn len(&self) -> usize {
        self.notifiers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notifiers.lock().await.is_empty()
    }

    /// Spawns one task per subscriber into `tasks` and returns how many were
    /// spawned. Does not wait for them.
    pub async fn dispatch(&self, items: Arc<[Item]>, tasks: &mut JoinSet<()>) -> usize {
        let notifiers = self.notifiers.lock().await;
        for notifier in notifiers.iter() {
            // Called inside the task so a panic in the synchronous part stays
            // contained there.
            let notifier = notifier.clone();
            let items = items.clone();
            tasks.spawn(async move { notifier(items).await });
        }
        notifiers.len()
    }

    /// Dispatches `items` and waits for every subscriber. Returns the number
    /// of subscribers that panicked.
    pub async fn notify(&self, items: Arc<[Item]>) -> usize {
        let mut tasks = JoinSet::new();
        self.dispatch(items, &mut tasks).await;

        let mut failed = 0;
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "notifier task failed");
                failed += 1;
            }
        }
        failed
    }
}

impl std::fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(title: &str) -> Item {
        Item {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_same_items() {
        let registry = NotifierRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = seen.clone();
            registry
                .register(move |items: Arc<[Item]>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(items.to_vec());
                    }
                })
                .await;
        }

        let failed = registry.notify(Arc::from(vec![item("a")])).await;
        assert_eq!(failed, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0][0].title.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn a_panicking_subscriber_does_not_stop_the_others() {
        let registry = NotifierRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry
            .register(|_items: Arc<[Item]>| async move {
                panic!("subscriber failure");
            })
            .await;
        let counter = calls.clone();
        registry
            .register(move |_items: Arc<[Item]>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        let failed = registry.notify(Arc::from(vec![item("a")])).await;
        assert_eq!(failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_subscriber_panicking_before_its_future_does_not_stop_the_others() {
        let registry = NotifierRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry
            .register(|_items: Arc<[Item]>| -> std::future::Ready<()> {
                panic!("subscriber failed before returning a future");
            })
            .await;
        let counter = calls.clone();
        registry
            .register(move |_items: Arc<[Item]>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        let mut tasks = JoinSet::new();
        assert_eq!(registry.dispatch(Arc::from(vec![item("a")]), &mut tasks).await, 2);
        let mut panicked = 0;
        while let Some(result) = tasks.join_next().await {
            if result.is_err_and(|err| err.is_panic()) {
                panicked += 1;
            }
        }
        assert_eq!(panicked, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.notify(Arc::from(vec![item("b")])).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_without_subscribers_spawns_nothing() {
        let registry = NotifierRegistry::new();
        let mut tasks = JoinSet::new();
        assert_eq!(registry.dispatch(Arc::from(Vec::new()), &mut tasks).await, 0);
        assert!(tasks.is_empty());
    }
}
