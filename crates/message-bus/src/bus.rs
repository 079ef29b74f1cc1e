use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{BusError, HandlerFailure, Result};
use crate::handler::{EventHandler, FnHandler, HandlerError};

/// A message that can travel over the bus.
///
/// Subscriptions are keyed by the message's kind, a closed set of values.
pub trait Message: Send + Sync + 'static {
    /// The discriminant handlers subscribe to.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns the kind of this message.
    fn kind(&self) -> Self::Kind;
}

/// Lifecycle of the delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Created; messages queue up but nothing is delivered.
    Idle,
    /// The worker is delivering messages.
    Running,
    /// Stop was requested; the worker is finishing queued messages.
    Draining,
    /// The worker has exited.
    Stopped,
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusState::Idle => "idle",
            BusState::Running => "running",
            BusState::Draining => "draining",
            BusState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters describing bus activity so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Messages accepted by `publish`.
    pub published: u64,
    /// Messages whose handlers have all run.
    pub processed: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
}

enum Envelope<M> {
    Deliver(M),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    processed: u64,
    finished: bool,
}

type Subscribers<M> = HashMap<<M as Message>::Kind, Vec<Arc<dyn EventHandler<M>>>>;

/// State shared between the bus handles and the delivery worker.
struct Shared<M: Message> {
    subscribers: RwLock<Subscribers<M>>,
    published: AtomicU64,
    handler_failures: AtomicU64,
    progress: watch::Sender<Progress>,
}

/// Worker lifecycle, only touched by the bus handles.
struct Control<M> {
    state: Mutex<BusState>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Envelope<M>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Asynchronous publish/subscribe bus.
///
/// Cloning the bus yields another handle to the same queue and subscriber
/// table. Messages are delivered by a single worker in publish order; for
/// each message every handler subscribed to its kind runs in subscription
/// order. A failing or panicking handler is logged and skipped.
pub struct MessageBus<M: Message> {
    shared: Arc<Shared<M>>,
    control: Arc<Control<M>>,
    sender: mpsc::UnboundedSender<Envelope<M>>,
}

impl<M: Message> Clone for MessageBus<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            control: Arc::clone(&self.control),
            sender: self.sender.clone(),
        }
    }
}

impl<M: Message> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: Message> MessageBus<M> {
    /// Creates an idle bus with no subscribers.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (progress, _) = watch::channel(Progress::default());

        Self {
            shared: Arc::new(Shared {
                subscribers: RwLock::new(HashMap::new()),
                published: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
                progress,
            }),
            control: Arc::new(Control {
                state: Mutex::new(BusState::Idle),
                receiver: Mutex::new(Some(receiver)),
                worker: Mutex::new(None),
            }),
            sender,
        }
    }

    /// Registers `handler` for messages of `kind`.
    ///
    /// The handler runs after every handler registered earlier for the same
    /// kind. It only sees messages delivered after this call; there is no
    /// replay of past messages.
    pub fn subscribe<H>(&self, kind: M::Kind, handler: Arc<H>)
    where
        H: EventHandler<M> + 'static,
    {
        let handler: Arc<dyn EventHandler<M>> = handler;
        tracing::debug!(handler = handler.name(), kind = ?kind, "handler subscribed");

        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Registers one handler for several kinds.
    pub fn subscribe_all<H>(&self, kinds: impl IntoIterator<Item = M::Kind>, handler: Arc<H>)
    where
        H: EventHandler<M> + 'static,
    {
        for kind in kinds {
            self.subscribe(kind, Arc::clone(&handler));
        }
    }

    /// Registers a synchronous closure for messages of `kind`.
    pub fn subscribe_fn<F>(&self, kind: M::Kind, name: impl Into<String>, f: F)
    where
        F: Fn(&M) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnHandler::new(name, f)));
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: M::Kind) -> usize {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Enqueues a message for delivery and returns without waiting for it.
    ///
    /// Messages published before [`start`](Self::start) are held until the
    /// worker runs. Messages published after [`stop`](Self::stop) are dropped
    /// and not counted in [`stats`](Self::stats).
    pub fn publish(&self, message: M) {
        let kind = message.kind();

        // The ticket is taken before the send so a concurrent flush never
        // misses a message already sitting ahead in the queue.
        self.shared.published.fetch_add(1, Ordering::SeqCst);

        if self.sender.send(Envelope::Deliver(message)).is_err() {
            self.shared.published.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(kind = ?kind, "message bus stopped, message dropped");
            return;
        }

        metrics::counter!("bus_events_published").increment(1);
        tracing::trace!(kind = ?kind, "message published");
    }

    /// Spawns the delivery worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = lock(&self.control.state);
        if *state != BusState::Idle {
            return Err(BusError::InvalidState {
                operation: "start",
                state: *state,
            });
        }

        let receiver = lock(&self.control.receiver)
            .take()
            .ok_or(BusError::InvalidState {
                operation: "start",
                state: *state,
            })?;

        let worker = tokio::spawn(run_worker(Arc::clone(&self.shared), receiver));
        *lock(&self.control.worker) = Some(worker);
        *state = BusState::Running;

        tracing::info!("message bus started");
        Ok(())
    }

    /// Drains every queued message, then stops the worker.
    ///
    /// Stopping an already stopped bus is a no-op.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = lock(&self.control.state);
            match *state {
                BusState::Running => *state = BusState::Draining,
                BusState::Stopped => return Ok(()),
                other => {
                    return Err(BusError::InvalidState {
                        operation: "stop",
                        state: other,
                    });
                }
            }
        }

        // The worker is still alive and owns the receiver, so this cannot fail.
        let _ = self.sender.send(Envelope::Shutdown);

        let worker = lock(&self.control.worker).take();
        let outcome = match worker {
            Some(worker) => worker.await.map_err(|e| BusError::Worker(e.to_string())),
            None => Ok(()),
        };

        *lock(&self.control.state) = BusState::Stopped;
        tracing::info!(stats = ?self.stats(), "message bus stopped");
        outcome
    }

    /// Waits until every message published before this call was delivered.
    ///
    /// Messages published concurrently with or after the call are not
    /// waited for. Returns [`BusError::NotRunning`] when messages are
    /// pending and no worker will ever deliver them.
    pub async fn flush(&self) -> Result<()> {
        let target = self.shared.published.load(Ordering::SeqCst);
        let mut progress = self.shared.progress.subscribe();

        let processed = progress.borrow().processed;
        if processed >= target {
            return Ok(());
        }

        let state = self.state();
        if matches!(state, BusState::Idle | BusState::Stopped) {
            return Err(BusError::NotRunning {
                state,
                pending: target - processed,
            });
        }

        let reached = progress
            .wait_for(|p| p.processed >= target || p.finished)
            .await
            .map(|p| *p)
            .map_err(|e| BusError::Worker(e.to_string()))?;

        if reached.processed < target {
            return Err(BusError::NotRunning {
                state: self.state(),
                pending: target - reached.processed,
            });
        }
        Ok(())
    }

    /// Current worker state.
    pub fn state(&self) -> BusState {
        *lock(&self.control.state)
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.shared.published.load(Ordering::SeqCst),
            processed: self.shared.progress.borrow().processed,
            handler_failures: self.shared.handler_failures.load(Ordering::SeqCst),
        }
    }
}

async fn run_worker<M: Message>(
    shared: Arc<Shared<M>>,
    mut receiver: mpsc::UnboundedReceiver<Envelope<M>>,
) {
    while let Some(envelope) = receiver.recv().await {
        match envelope {
            Envelope::Deliver(message) => {
                shared.deliver(&message).await;
                shared.progress.send_modify(|p| p.processed += 1);
            }
            Envelope::Shutdown => break,
        }
    }

    shared.progress.send_modify(|p| p.finished = true);
    tracing::debug!("delivery worker exited");
}

impl<M: Message> Shared<M> {
    fn handlers_for(&self, kind: M::Kind) -> Vec<Arc<dyn EventHandler<M>>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    async fn deliver(&self, message: &M) {
        let kind = message.kind();

        for handler in self.handlers_for(kind) {
            let outcome = AssertUnwindSafe(handler.handle(message))
                .catch_unwind()
                .await;

            let reason = match outcome {
                Ok(Ok(())) => {
                    metrics::counter!("bus_events_delivered").increment(1);
                    continue;
                }
                Ok(Err(error)) => error.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            let failure = HandlerFailure {
                handler: handler.name().to_string(),
                kind: format!("{kind:?}"),
                reason,
            };
            self.handler_failures.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("bus_handler_failures").increment(1);
            tracing::error!(
                handler = %failure.handler,
                kind = %failure.kind,
                error = %failure.reason,
                "event handler failed"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Ping,
        Pong,
    }

    #[derive(Debug, Clone)]
    struct TestMessage {
        kind: TestKind,
        value: u32,
    }

    impl TestMessage {
        fn ping(value: u32) -> Self {
            Self {
                kind: TestKind::Ping,
                value,
            }
        }

        fn pong(value: u32) -> Self {
            Self {
                kind: TestKind::Pong,
                value,
            }
        }
    }

    impl Message for TestMessage {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            self.kind
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(bus: &MessageBus<TestMessage>, kind: TestKind, name: &'static str) -> Log {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        bus.subscribe_fn(kind, name, move |m: &TestMessage| {
            sink.lock().unwrap().push(format!("{name}:{}", m.value));
            Ok(())
        });
        log
    }

    struct SlowHandler {
        delay: Duration,
        seen: Arc<Mutex<Vec<u32>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl SlowHandler {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                seen: Arc::default(),
                active: Arc::default(),
                max_active: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl EventHandler<TestMessage> for SlowHandler {
        fn name(&self) -> &str {
            "slow"
        }

        async fn handle(&self, message: &TestMessage) -> std::result::Result<(), HandlerError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(message.value);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl EventHandler<TestMessage> for PanickingHandler {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _message: &TestMessage) -> std::result::Result<(), HandlerError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = MessageBus::new();
        let log = recorder(&bus, TestKind::Ping, "a");
        bus.start().unwrap();

        for value in 0..100 {
            bus.publish(TestMessage::ping(value));
        }
        bus.flush().await.unwrap();

        let expected: Vec<_> = (0..100).map(|v| format!("a:{v}")).collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn handlers_run_in_subscription_order() {
        let bus = MessageBus::new();
        let log: Log = Arc::default();
        for name in ["first", "second", "third"] {
            let sink = Arc::clone(&log);
            bus.subscribe_fn(TestKind::Ping, name, move |m: &TestMessage| {
                sink.lock().unwrap().push(format!("{name}:{}", m.value));
                Ok(())
            });
        }
        bus.start().unwrap();

        bus.publish(TestMessage::ping(1));
        bus.publish(TestMessage::ping(2));
        bus.flush().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:1", "second:1", "third:1", "first:2", "second:2", "third:2"
            ]
        );
    }

    #[tokio::test]
    async fn only_matching_kind_is_delivered() {
        let bus = MessageBus::new();
        let pings = recorder(&bus, TestKind::Ping, "ping");
        let pongs = recorder(&bus, TestKind::Pong, "pong");
        bus.start().unwrap();

        bus.publish(TestMessage::ping(1));
        bus.publish(TestMessage::pong(2));
        bus.publish(TestMessage::ping(3));
        bus.flush().await.unwrap();

        assert_eq!(*pings.lock().unwrap(), vec!["ping:1", "ping:3"]);
        assert_eq!(*pongs.lock().unwrap(), vec!["pong:2"]);
    }

    #[tokio::test]
    async fn messages_without_subscribers_count_as_processed() {
        let bus = MessageBus::new();
        bus.start().unwrap();

        bus.publish(TestMessage::pong(1));
        bus.flush().await.unwrap();

        assert_eq!(bus.stats().processed, 1);
    }

    #[tokio::test]
    async fn messages_published_before_start_are_delivered_after_start() {
        let bus = MessageBus::new();
        let log = recorder(&bus, TestKind::Ping, "a");

        bus.publish(TestMessage::ping(1));
        bus.publish(TestMessage::ping(2));
        assert!(log.lock().unwrap().is_empty());

        bus.start().unwrap();
        bus.flush().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:2"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_others() {
        let bus = MessageBus::new();
        bus.subscribe_fn(TestKind::Ping, "failing", |_m: &TestMessage| {
            Err("nope".into())
        });
        let log = recorder(&bus, TestKind::Ping, "after");
        bus.start().unwrap();

        bus.publish(TestMessage::ping(7));
        bus.publish(TestMessage::ping(8));
        bus.flush().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["after:7", "after:8"]);
        let stats = bus.stats();
        assert_eq!(stats.handler_failures, 2);
        assert_eq!(stats.processed, 2);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let bus = MessageBus::new();
        bus.subscribe(TestKind::Ping, Arc::new(PanickingHandler));
        let log = recorder(&bus, TestKind::Ping, "after");
        bus.start().unwrap();

        bus.publish(TestMessage::ping(1));
        bus.publish(TestMessage::ping(2));
        bus.flush().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["after:1", "after:2"]);
        assert_eq!(bus.stats().handler_failures, 2);
        assert_eq!(bus.state(), BusState::Running);
    }

    #[tokio::test]
    async fn flush_waits_for_slow_handlers() {
        let bus = MessageBus::new();
        let handler = Arc::new(SlowHandler::new(Duration::from_millis(20)));
        bus.subscribe(TestKind::Ping, Arc::clone(&handler));
        bus.start().unwrap();

        for value in 0..5 {
            bus.publish(TestMessage::ping(value));
        }
        bus.flush().await.unwrap();

        assert_eq!(*handler.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn flush_with_nothing_published_returns_immediately() {
        let bus: MessageBus<TestMessage> = MessageBus::new();
        bus.flush().await.unwrap();

        bus.start().unwrap();
        bus.flush().await.unwrap();
    }

    #[tokio::test]
    async fn flush_on_idle_bus_with_pending_messages_fails() {
        let bus = MessageBus::new();
        bus.publish(TestMessage::ping(1));

        let result = bus.flush().await;

        assert!(matches!(
            result,
            Err(BusError::NotRunning {
                state: BusState::Idle,
                pending: 1
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handler_invocations_never_overlap() {
        let bus = MessageBus::new();
        let handler = Arc::new(SlowHandler::new(Duration::from_millis(1)));
        bus.subscribe_all([TestKind::Ping, TestKind::Pong], Arc::clone(&handler));
        bus.start().unwrap();

        let mut publishers = Vec::new();
        for task in 0..4 {
            let bus = bus.clone();
            publishers.push(tokio::spawn(async move {
                for value in 0..10 {
                    bus.publish(TestMessage::ping(task * 100 + value));
                }
            }));
        }
        for publisher in publishers {
            publisher.await.unwrap();
        }
        bus.flush().await.unwrap();

        assert_eq!(handler.seen.lock().unwrap().len(), 40);
        assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_drains_queued_messages() {
        let bus = MessageBus::new();
        let handler = Arc::new(SlowHandler::new(Duration::from_millis(5)));
        bus.subscribe(TestKind::Ping, Arc::clone(&handler));
        bus.start().unwrap();

        for value in 0..10 {
            bus.publish(TestMessage::ping(value));
        }
        bus.stop().await.unwrap();

        assert_eq!(handler.seen.lock().unwrap().len(), 10);
        assert_eq!(bus.state(), BusState::Stopped);
        assert_eq!(bus.stats().processed, 10);
    }

    #[tokio::test]
    async fn stop_is_idempotent_but_start_is_not() {
        let bus: MessageBus<TestMessage> = MessageBus::new();
        assert!(matches!(
            bus.stop().await,
            Err(BusError::InvalidState { state: BusState::Idle, .. })
        ));

        bus.start().unwrap();
        assert!(matches!(
            bus.start(),
            Err(BusError::InvalidState { state: BusState::Running, .. })
        ));

        bus.stop().await.unwrap();
        bus.stop().await.unwrap();
        assert!(bus.start().is_err());
    }

    #[tokio::test]
    async fn publish_after_stop_is_not_delivered() {
        let bus = MessageBus::new();
        let log = recorder(&bus, TestKind::Ping, "a");
        bus.start().unwrap();
        bus.stop().await.unwrap();

        bus.publish(TestMessage::ping(1));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.stats().published, 0);
        bus.flush().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_messages_do_not_count_as_published() {
        let bus = MessageBus::new();
        let _log = recorder(&bus, TestKind::Ping, "a");
        bus.start().unwrap();
        bus.publish(TestMessage::ping(1));
        bus.stop().await.unwrap();

        bus.publish(TestMessage::ping(2));
        bus.publish(TestMessage::pong(3));

        assert_eq!(
            bus.stats(),
            BusStats {
                published: 1,
                processed: 1,
                handler_failures: 0,
            }
        );
        bus.flush().await.unwrap();
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_messages() {
        let bus = MessageBus::new();
        let early = recorder(&bus, TestKind::Ping, "early");
        bus.start().unwrap();

        bus.publish(TestMessage::ping(1));
        bus.flush().await.unwrap();

        let late = recorder(&bus, TestKind::Ping, "late");
        bus.publish(TestMessage::ping(2));
        bus.flush().await.unwrap();

        assert_eq!(*early.lock().unwrap(), vec!["early:1", "early:2"]);
        assert_eq!(*late.lock().unwrap(), vec!["late:2"]);
        assert_eq!(bus.subscriber_count(TestKind::Ping), 2);
        assert_eq!(bus.subscriber_count(TestKind::Pong), 0);
    }
}
