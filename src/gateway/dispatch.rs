#![expect(
    clippy::module_name_repetitions,
    reason = "Dispatch types deliberately include the module name for clarity"
)]

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use futures::{FutureExt as _, Stream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::codec::Envelope;
use crate::{Result, serde_helpers};

/// Event name that receives every event, in addition to the subscribers of its own name.
pub const WILDCARD: &str = "*";

/// A typed gateway event, keyed by its wire name.
pub trait Event: DeserializeOwned + Send + Sync + 'static {
    /// The `t` field of the envelopes carrying this event
    const NAME: &'static str;
}

/// Handle returned by every registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An event as it came off the wire, delivered to [`WILDCARD`] subscribers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub data: Value,
    pub resume_token: Option<String>,
}

/// Deserializes the envelope for one subscriber and produces its handler future, or `None`
/// when the payload does not fit that subscriber.
type Route = Arc<dyn Fn(&Envelope) -> Option<BoxFuture<'static, ()>> + Send + Sync>;

type Routes = DashMap<String, Vec<Subscription>>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    route: Route,
}

enum Job {
    Dispatch(Envelope),
    Barrier(oneshot::Sender<()>),
    Close,
}

/// Routes decoded event envelopes to the handlers registered for their name.
///
/// Handlers run on a dedicated worker task, one envelope at a time and in registration order,
/// so the read loop never waits on subscriber code. Each subscriber deserializes the payload
/// into its own type; a payload that does not fit, or a handler that panics, affects only that
/// subscriber.
pub struct EventDispatchTable {
    routes: Arc<Routes>,
    next_id: AtomicU64,
    queue: mpsc::UnboundedSender<Job>,
}

impl fmt::Debug for EventDispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatchTable")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl EventDispatchTable {
    /// Creates an empty table and spawns its worker. Must be called within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let routes = Arc::new(Routes::new());
        let (queue, jobs) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(Arc::clone(&routes), jobs));

        Self {
            routes,
            next_id: AtomicU64::new(1),
            queue,
        }
    }

    /// Registers `handler` for `E::NAME`, deserializing the payload into `E`.
    pub fn on<E, H, Fut>(&self, handler: H) -> SubscriptionId
    where
        E: Event,
        H: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(E::NAME, serde_helpers::deserialize_with_warnings::<E>, handler)
    }

    /// Registers `handler` for `event_name` with an explicit payload deserializer.
    pub fn register<T, D, H, Fut>(&self, event_name: &str, deserializer: D, handler: H) -> SubscriptionId
    where
        T: Send + Sync + 'static,
        D: Fn(Value) -> Result<T> + Send + Sync + 'static,
        H: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let route: Route = Arc::new(move |envelope: &Envelope| {
            let data = envelope.data().cloned().unwrap_or(Value::Null);
            match deserializer(data) {
                Ok(event) => Some(handler(Arc::new(event)).boxed()),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        event = envelope.event_name(),
                        error = %e,
                        "Event payload does not fit subscriber, skipping it"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    None
                }
            }
        });

        self.insert(event_name, route)
    }

    /// Registers `handler` for every event, undeserialized.
    pub fn subscribe_all<H, Fut>(&self, handler: H) -> SubscriptionId
    where
        H: Fn(Arc<RawEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let route: Route = Arc::new(move |envelope: &Envelope| {
            let event = RawEvent {
                name: envelope.event_name().unwrap_or_default().to_owned(),
                data: envelope.data().cloned().unwrap_or(Value::Null),
                resume_token: envelope.resume_token().map(str::to_owned),
            };
            Some(handler(Arc::new(event)).boxed())
        });

        self.insert(WILDCARD, route)
    }

    /// Streams every `E` delivered from now on. Dropping the stream unsubscribes it.
    pub fn stream<E: Event>(&self) -> impl Stream<Item = Arc<E>> + Send + 'static {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = self.on(move |event: Arc<E>| {
            _ = tx.send(event);
            future::ready(())
        });
        let guard = Unsubscribe {
            routes: Arc::downgrade(&self.routes),
            id,
        };

        async_stream::stream! {
            let _guard = guard;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }

    /// Removes a registration. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove(&self.routes, id)
    }

    /// Number of live registrations across all event names.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.routes.iter().map(|entry| entry.value().len()).sum()
    }

    /// Queues `envelope` for its subscribers. Returns `false` when nobody listens for its name
    /// (or the table is closed), in which case the envelope is dropped.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        let Some(name) = envelope.event_name() else {
            return false;
        };

        let listened = [name, WILDCARD]
            .into_iter()
            .any(|key| self.routes.get(key).is_some_and(|entry| !entry.is_empty()));
        if !listened {
            #[cfg(feature = "tracing")]
            tracing::trace!(event = name, "No subscribers for event");
            return false;
        }

        self.queue.send(Job::Dispatch(envelope)).is_ok()
    }

    /// Waits until every envelope queued before this call has been handled.
    pub async fn drained(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(Job::Barrier(tx)).is_ok() {
            _ = rx.await;
        }
    }

    /// Handles what is already queued, then drops every registration and stops the worker.
    pub fn close(&self) {
        _ = self.queue.send(Job::Close);
    }

    fn insert(&self, event_name: &str, route: Route) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        #[cfg(feature = "tracing")]
        tracing::debug!(event = event_name, subscription = %id, "Registering subscriber");

        self.routes
            .entry(event_name.to_owned())
            .or_default()
            .push(Subscription { id, route });
        id
    }
}

impl Default for EventDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

struct Unsubscribe {
    routes: Weak<Routes>,
    id: SubscriptionId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(routes) = self.routes.upgrade() {
            remove(&routes, self.id);
        }
    }
}

fn remove(routes: &Routes, id: SubscriptionId) -> bool {
    let mut removed = false;
    for mut entry in routes.iter_mut() {
        let before = entry.len();
        entry.retain(|subscription| subscription.id != id);
        removed |= entry.len() != before;
    }
    routes.retain(|_, subscriptions| !subscriptions.is_empty());
    removed
}

/// Named and wildcard subscribers of `name`, in registration order.
fn subscribers(routes: &Routes, name: &str) -> Vec<Subscription> {
    let mut subscribers = Vec::new();
    for key in [name, WILDCARD] {
        if let Some(entry) = routes.get(key) {
            subscribers.extend(entry.value().iter().cloned());
        }
        if name == WILDCARD {
            break;
        }
    }
    subscribers.sort_by_key(|subscription| subscription.id);
    subscribers
}

async fn run_worker(routes: Arc<Routes>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Dispatch(envelope) => deliver(&routes, &envelope).await,
            Job::Barrier(done) => {
                _ = done.send(());
            }
            Job::Close => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Dispatch table closed, dropping subscribers");
                routes.clear();
                break;
            }
        }
    }
}

async fn deliver(routes: &Routes, envelope: &Envelope) {
    let name = envelope.event_name().unwrap_or_default();

    for Subscription { id, route } in subscribers(routes, name) {
        let handled = match std::panic::catch_unwind(AssertUnwindSafe(|| route(envelope))) {
            Ok(Some(future)) => AssertUnwindSafe(future).catch_unwind().await,
            Ok(None) => Ok(()),
            Err(panic) => Err(panic),
        };

        if handled.is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(event = name, subscription = %id, "Event handler panicked");
            #[cfg(not(feature = "tracing"))]
            let _ = &id;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::StreamExt as _;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Pinged {
        server_id: String,
    }

    impl Event for Pinged {
        const NAME: &'static str = "Pinged";
    }

    fn pinged(server_id: &str) -> Envelope {
        Envelope::event("Pinged", json!({ "serverId": server_id }), None)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let log = Arc::clone(&log);
            move |entry: &str| log.lock().expect("not poisoned").push(entry.to_owned())
        };
        (log, writer)
    }

    #[tokio::test]
    async fn registered_event_reaches_handler_once() {
        let table = EventDispatchTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        table.on(move |event: Arc<Pinged>| {
            _ = tx.send(event);
            future::ready(())
        });

        assert!(table.dispatch(pinged("s1")));
        table.drained().await;

        let event = rx.try_recv().expect("delivered");
        assert_eq!(event.server_id, "s1");
        assert!(rx.try_recv().is_err(), "delivered exactly once");
    }

    #[tokio::test]
    async fn unregistered_event_is_dropped() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();
        table.on(move |_: Arc<Pinged>| {
            write("pinged");
            future::ready(())
        });

        assert!(!table.dispatch(Envelope::event("SomethingElse", json!({}), None)));
        table.drained().await;

        assert!(log.lock().expect("not poisoned").is_empty());
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();

        let first = write.clone();
        table.on(move |_: Arc<Pinged>| {
            first("first");
            future::ready(())
        });
        let wildcard = write.clone();
        table.subscribe_all(move |event: Arc<RawEvent>| {
            wildcard(&format!("wildcard:{}", event.name));
            future::ready(())
        });
        let second = write;
        table.on(move |_: Arc<Pinged>| {
            let second = second.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                second("second");
            }
        });

        table.dispatch(pinged("s1"));
        table.dispatch(pinged("s2"));
        table.drained().await;

        assert_eq!(
            *log.lock().expect("not poisoned"),
            ["first", "wildcard:Pinged", "second", "first", "wildcard:Pinged", "second"]
        );
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();

        table.on(|_: Arc<Pinged>| async { panic!("handler bug") });
        table.on(move |event: Arc<Pinged>| {
            write(&event.server_id);
            future::ready(())
        });

        table.dispatch(pinged("s1"));
        table.dispatch(pinged("s2"));
        table.drained().await;

        assert_eq!(*log.lock().expect("not poisoned"), ["s1", "s2"]);
    }

    #[tokio::test]
    async fn payload_mismatch_skips_only_that_subscriber() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();

        let typed = write.clone();
        table.on(move |_: Arc<Pinged>| {
            typed("typed");
            future::ready(())
        });
        table.subscribe_all(move |event: Arc<RawEvent>| {
            write(&event.data.to_string());
            future::ready(())
        });

        table.dispatch(Envelope::event("Pinged", json!({ "unexpected": true }), None));
        table.drained().await;

        assert_eq!(*log.lock().expect("not poisoned"), [r#"{"unexpected":true}"#]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();
        let id = table.on(move |_: Arc<Pinged>| {
            write("pinged");
            future::ready(())
        });
        assert_eq!(table.subscription_count(), 1);

        assert!(table.unsubscribe(id));
        assert!(!table.unsubscribe(id));
        assert_eq!(table.subscription_count(), 0);

        assert!(!table.dispatch(pinged("s1")));
        table.drained().await;
        assert!(log.lock().expect("not poisoned").is_empty());
    }

    #[tokio::test]
    async fn stream_yields_events_and_unsubscribes_on_drop() {
        let table = EventDispatchTable::new();
        let mut stream = Box::pin(table.stream::<Pinged>());

        table.dispatch(pinged("s1"));
        let event = stream.next().await.expect("stream open");
        assert_eq!(event.server_id, "s1");

        drop(stream);
        assert_eq!(table.subscription_count(), 0);
    }

    #[tokio::test]
    async fn close_delivers_queued_events_then_clears() {
        let table = EventDispatchTable::new();
        let (log, write) = recorder();
        table.on(move |event: Arc<Pinged>| {
            write(&event.server_id);
            future::ready(())
        });

        table.dispatch(pinged("s1"));
        table.close();
        table.drained().await;

        assert_eq!(*log.lock().expect("not poisoned"), ["s1"]);
        assert_eq!(table.subscription_count(), 0);
        assert!(!table.dispatch(pinged("s2")));
    }
}
