//! Orchestrator lifecycle and execution.
//!
//! An [`Orchestrator`] owns one bounded channel. Registered producers feed it,
//! at most `max_concurrency` of them at a time, while every registered
//! consumer drains it concurrently. [`Orchestrator::start`] runs the whole
//! thing once and resolves when every task has returned.

use futures::stream;
use futures_core::Stream;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::stats::{Counters, OrchestratorStats};
use crate::tracing_support::{log_debug, log_trace, log_warn};
use crate::traits::{Consumer, Producer};
use crate::util::{consumer_fn, producer_fn};

/// Lifecycle of an orchestrator. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrchestratorState {
    /// Accepting registrations
    NotStarted,
    /// `start` is executing tasks
    Running,
    /// Every task has finished; only status queries remain meaningful
    Ended,
}

type BoxedProducer<T> = Box<dyn Producer<Item = T>>;
type BoxedConsumer<T> = Box<dyn Consumer<Item = T>>;

struct Registry<T> {
    state: OrchestratorState,
    producers: Vec<BoxedProducer<T>>,
    consumers: Vec<BoxedConsumer<T>>,
    producer_count: usize,
    consumer_count: usize,
}

impl<T> Registry<T> {
    fn ensure_not_started(&self) -> Result<()> {
        match self.state {
            OrchestratorState::NotStarted => Ok(()),
            OrchestratorState::Running => Err(Error::AlreadyRunning),
            OrchestratorState::Ended => Err(Error::AlreadyEnded),
        }
    }
}

/// A buffered payload. On an unbuffered orchestrator `delivered` is
/// completed by the `receive` that takes the payload.
struct Envelope<T> {
    item: T,
    delivered: Option<oneshot::Sender<()>>,
}

struct Shared<T> {
    config: OrchestratorConfig,
    max_concurrency: usize,
    unbuffered: bool,
    registry: Mutex<Registry<T>>,
    // `None` once the buffer is closed for writing.
    sender: Mutex<Option<mpsc::Sender<Envelope<T>>>>,
    receiver: TokioMutex<mpsc::Receiver<Envelope<T>>>,
    gate: Arc<Semaphore>,
    send_stop: CancellationToken,
    receive_stop: CancellationToken,
    counters: Counters,
}

/// A fan-out/fan-in orchestrator over a single bounded channel.
///
/// The orchestrator is a cheap handle: clones share the same buffer,
/// registries and stop signals. Each registered task is handed a clone so
/// it can call [`send`](Self::send), [`receive`](Self::receive) and the stop
/// controls.
///
/// # Examples
///
/// ```rust
/// use chanweld::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let task = Orchestrator::new(2, 1);
///
///     for n in 0..3u32 {
///         task.add_producer(
///             |task: Orchestrator<u32>, n: u32| async move {
///                 task.send(n).await;
///             },
///             n,
///         )?;
///     }
///
///     task.add_consumer(
///         |task: Orchestrator<u32>, _: ()| async move {
///             while let Some(n) = task.receive().await {
///                 println!("got {}", n);
///             }
///         },
///         (),
///     )?;
///
///     let stats = task.start().await?;
///     assert_eq!(stats.received, 3);
///     Ok(())
/// }
/// ```
pub struct Orchestrator<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Orchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Orchestrator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.registry().state)
            .field("config", &self.shared.config)
            .field("send_stopped", &self.shared.send_stop.is_cancelled())
            .field("receive_stopped", &self.shared.receive_stop.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T> Orchestrator<T> {
    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the configuration this orchestrator was built with
    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> OrchestratorState {
        self.registry().state
    }

    /// Whether `start` is currently executing tasks
    pub fn is_running(&self) -> bool {
        self.state() == OrchestratorState::Running
    }

    /// Whether the run has completed
    pub fn is_ended(&self) -> bool {
        self.state() == OrchestratorState::Ended
    }

    /// Number of producers registered so far
    pub fn producer_count(&self) -> usize {
        self.registry().producer_count
    }

    /// Number of consumers registered so far
    pub fn consumer_count(&self) -> usize {
        self.registry().consumer_count
    }

    /// Snapshot of the run counters
    pub fn stats(&self) -> OrchestratorStats {
        self.shared.counters.snapshot()
    }

    /// Whether sending has been stopped
    pub fn is_send_stopped(&self) -> bool {
        self.shared.send_stop.is_cancelled()
    }

    /// Whether receiving has been stopped
    pub fn is_receive_stopped(&self) -> bool {
        self.shared.receive_stop.is_cancelled()
    }

    /// Stop sending.
    ///
    /// Every later `send` is refused and producers that have not been
    /// launched yet never run. Producers already running are not
    /// interrupted, and a `send` already waiting on a full buffer keeps
    /// waiting. Calling this more than once is a no-op.
    pub fn stop_send(&self) {
        if !self.shared.send_stop.is_cancelled() {
            log_debug!("send stopped");
        }
        self.shared.send_stop.cancel();
    }

    /// Stop receiving.
    ///
    /// Every later `receive` returns `None` and consumers that have not been
    /// dispatched yet never run. A `receive` already waiting on an empty
    /// buffer keeps waiting. Calling this more than once is a no-op.
    pub fn stop_receive(&self) {
        if !self.shared.receive_stop.is_cancelled() {
            log_debug!("receive stopped");
        }
        self.shared.receive_stop.cancel();
    }

    fn close_buffer(&self) {
        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            log_debug!("buffer closed for writing");
        }
    }

    fn record_join_error(&self, err: JoinError) {
        if err.is_panic() {
            self.shared.counters.record_panicked();
            log_warn!(error = %err, "task panicked");
        } else {
            log_debug!(error = %err, "task cancelled");
        }
    }
}

impl<T> Orchestrator<T>
where
    T: Send + 'static,
{
    /// Create an orchestrator with the given buffer size and concurrency cap.
    ///
    /// A `max_concurrency` of zero is treated as one. A `buffer_size` of zero
    /// makes the orchestrator unbuffered: each `send` waits until a
    /// `receive` takes its payload.
    pub fn new(buffer_size: usize, max_concurrency: usize) -> Self {
        Self::with_config(OrchestratorConfig::new(buffer_size, max_concurrency))
    }

    /// Create an orchestrator from a config
    pub fn with_config(config: OrchestratorConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity());
        let max_concurrency = config.effective_max_concurrency();

        Self {
            shared: Arc::new(Shared {
                max_concurrency,
                unbuffered: config.is_unbuffered(),
                registry: Mutex::new(Registry {
                    state: OrchestratorState::NotStarted,
                    producers: Vec::new(),
                    consumers: Vec::new(),
                    producer_count: 0,
                    consumer_count: 0,
                }),
                sender: Mutex::new(Some(sender)),
                receiver: TokioMutex::new(receiver),
                gate: Arc::new(Semaphore::new(max_concurrency)),
                send_stop: CancellationToken::new(),
                receive_stop: CancellationToken::new(),
                counters: Counters::default(),
                config,
            }),
        }
    }

    /// Register a producer function with the arguments it will be called
    /// with.
    ///
    /// `args` is moved in now and handed back when the producer runs, which
    /// may be much later.
    pub fn add_producer<F, Fut, A>(&self, f: F, args: A) -> Result<()>
    where
        F: FnOnce(Orchestrator<T>, A) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        A: Send + 'static,
    {
        self.add_producer_task(producer_fn(f, args))
    }

    /// Register a consumer function with the arguments it will be called
    /// with. See [`add_producer`](Self::add_producer).
    pub fn add_consumer<F, Fut, A>(&self, f: F, args: A) -> Result<()>
    where
        F: FnOnce(Orchestrator<T>, A) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        A: Send + 'static,
    {
        self.add_consumer_task(consumer_fn(f, args))
    }

    /// Register a producer implementation
    pub fn add_producer_task<P>(&self, producer: P) -> Result<()>
    where
        P: Producer<Item = T> + 'static,
    {
        let mut registry = self.registry();
        registry.ensure_not_started()?;
        registry.producers.push(Box::new(producer));
        registry.producer_count += 1;
        Ok(())
    }

    /// Register a consumer implementation
    pub fn add_consumer_task<C>(&self, consumer: C) -> Result<()>
    where
        C: Consumer<Item = T> + 'static,
    {
        let mut registry = self.registry();
        registry.ensure_not_started()?;
        registry.consumers.push(Box::new(consumer));
        registry.consumer_count += 1;
        Ok(())
    }

    /// Push a payload into the buffer, waiting while it is full. On an
    /// unbuffered orchestrator this also waits until a `receive` has taken
    /// the payload.
    ///
    /// Returns `false` without touching the buffer if sending was stopped or
    /// the buffer is closed. The two cases are not told apart. An unbuffered
    /// payload that is discarded at the end of the run instead of received
    /// also yields `false`.
    pub async fn send(&self, item: T) -> bool {
        if self.is_send_stopped() {
            return false;
        }

        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return false;
        };

        let (delivered, handed_over) = if self.shared.unbuffered {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        if sender.send(Envelope { item, delivered }).await.is_err() {
            return false;
        }
        drop(sender);
        self.shared.counters.record_sent();

        match handed_over {
            Some(handed_over) => handed_over.await.is_ok(),
            None => true,
        }
    }

    /// Pop a payload from the buffer, waiting while it is empty.
    ///
    /// Returns `None` if receiving was stopped, or once every producer has
    /// finished and the buffer is drained.
    pub async fn receive(&self) -> Option<T> {
        if self.is_receive_stopped() {
            return None;
        }

        let envelope = self.shared.receiver.lock().await.recv().await?;
        if let Some(delivered) = envelope.delivered {
            // The sender may have been dropped mid-wait; the payload still counts.
            let _ = delivered.send(());
        }
        self.shared.counters.record_received();
        Some(envelope.item)
    }

    /// A stream of payloads that ends at the first `None` from
    /// [`receive`](Self::receive).
    pub fn receive_stream(&self) -> impl Stream<Item = T> + Send + 'static {
        stream::unfold(self.clone(), |task| async move {
            let item = task.receive().await?;
            Some((item, task))
        })
    }

    /// Run every registered producer and consumer to completion.
    ///
    /// Producers are launched in registration order, at most
    /// `max_concurrency` at a time. Consumers all start immediately. The
    /// buffer is closed once the last producer returns, so consumers looping
    /// on `receive` see `None` after draining it. Anything still buffered
    /// when every task has returned is discarded and counted in
    /// [`OrchestratorStats::discarded`].
    ///
    /// Fails only if the orchestrator is running or has ended, in which case
    /// nothing is run.
    pub async fn start(&self) -> Result<OrchestratorStats> {
        let (producers, consumers) = {
            let mut registry = self.registry();
            registry.ensure_not_started()?;
            registry.state = OrchestratorState::Running;
            (
                std::mem::take(&mut registry.producers),
                std::mem::take(&mut registry.consumers),
            )
        };

        log_debug!(
            producers = producers.len(),
            consumers = consumers.len(),
            max_concurrency = self.shared.max_concurrency,
            buffer_size = self.shared.config.buffer_size,
            "orchestrator started"
        );

        let supervisor = tokio::spawn(self.clone().supervise_producers(producers));

        let mut consumer_tasks = JoinSet::new();
        for (index, consumer) in consumers.into_iter().enumerate() {
            consumer_tasks.spawn(self.clone().run_consumer(index, consumer));
        }

        if let Err(err) = supervisor.await {
            self.record_join_error(err);
            self.close_buffer();
        }
        while let Some(joined) = consumer_tasks.join_next().await {
            if let Err(err) = joined {
                self.record_join_error(err);
            }
        }

        self.registry().state = OrchestratorState::Ended;

        let discarded = self.drain().await;
        if discarded > 0 {
            self.shared.counters.record_discarded(discarded);
            log_warn!(discarded, "payloads left in buffer after all tasks finished");
        }

        let stats = self.stats();
        log_debug!(
            sent = stats.sent,
            received = stats.received,
            discarded = stats.discarded,
            "orchestrator ended"
        );
        Ok(stats)
    }

    async fn supervise_producers(self, producers: Vec<BoxedProducer<T>>) {
        let total = producers.len();
        // Without more producers than permits the gate can never block.
        let gated = self.shared.max_concurrency < total;
        let mut running = JoinSet::new();

        for (index, mut producer) in producers.into_iter().enumerate() {
            if self.is_send_stopped() {
                let skipped = total - index;
                self.shared.counters.record_producers_skipped(skipped);
                log_debug!(skipped, "send stopped, remaining producers not launched");
                break;
            }

            let permit = if gated {
                let Ok(permit) = self.shared.gate.clone().acquire_owned().await else {
                    break;
                };
                Some(permit)
            } else {
                None
            };

            let task = self.clone();
            running.spawn(async move {
                let _permit = permit;
                if task.is_send_stopped() {
                    task.shared.counters.record_producers_skipped(1);
                    return;
                }
                task.shared.counters.record_producer_launched();
                log_trace!(index, "producer launched");
                producer.produce(task.clone()).await;
                log_trace!(index, "producer finished");
            });
        }

        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined {
                self.record_join_error(err);
            }
        }

        self.close_buffer();
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn run_consumer(self, index: usize, mut consumer: BoxedConsumer<T>) {
        if self.is_receive_stopped() {
            self.shared.counters.record_consumer_skipped();
            log_trace!(index, "receive stopped, consumer skipped");
            return;
        }
        self.shared.counters.record_consumer_launched();
        consumer.consume(self.clone()).await;
        log_trace!(index, "consumer finished");
    }

    /// Close the buffer and drop whatever is still in it.
    async fn drain(&self) -> usize {
        self.close_buffer();
        let mut receiver = self.shared.receiver.lock().await;
        // Refuses any push still waiting on capacity. Dropping an envelope
        // releases its unbuffered sender with `false`.
        receiver.close();
        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_registration_before_start() {
        let task = Orchestrator::<u32>::new(4, 2);
        for _ in 0..3 {
            task.add_producer(|_task: Orchestrator<u32>, _: ()| async {}, ())
                .unwrap();
        }
        task.add_consumer(|_task: Orchestrator<u32>, _: ()| async {}, ())
            .unwrap();

        assert_eq!(task.state(), OrchestratorState::NotStarted);
        assert_eq!(task.producer_count(), 3);
        assert_eq!(task.consumer_count(), 1);
    }

    #[tokio::test]
    async fn test_registration_after_end_fails() {
        let task = Orchestrator::<u32>::new(4, 1);
        task.start().await.unwrap();

        assert!(task.is_ended());
        assert_eq!(
            task.add_producer(|_task: Orchestrator<u32>, _: ()| async {}, ()),
            Err(Error::AlreadyEnded)
        );
        assert_eq!(
            task.add_consumer(|_task: Orchestrator<u32>, _: ()| async {}, ()),
            Err(Error::AlreadyEnded)
        );
    }

    #[tokio::test]
    async fn test_second_start_does_no_work() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Orchestrator::<u32>::new(4, 1);
        task.add_producer(
            |_task: Orchestrator<u32>, runs: Arc<AtomicUsize>| async move {
                runs.fetch_add(1, Ordering::SeqCst);
            },
            runs.clone(),
        )
        .unwrap();

        let first = task.start().await.unwrap();
        assert_eq!(task.start().await, Err(Error::AlreadyEnded));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(task.stats(), first);
    }

    #[tokio::test]
    async fn test_registration_while_running_fails() {
        let task = Orchestrator::<u32>::new(4, 1);
        let observed = Arc::new(Mutex::new(Vec::new()));

        task.add_producer(
            |task: Orchestrator<u32>, observed: Arc<Mutex<Vec<Result<()>>>>| async move {
                let add = task.add_producer(|_task: Orchestrator<u32>, _: ()| async {}, ());
                let add_consumer =
                    task.add_consumer(|_task: Orchestrator<u32>, _: ()| async {}, ());
                let restart = task.start().await.map(|_| ());
                let mut observed = observed.lock().unwrap();
                observed.extend([add, add_consumer, restart]);
            },
            observed.clone(),
        )
        .unwrap();

        task.start().await.unwrap();

        let observed = observed.lock().unwrap();
        assert_eq!(
            *observed,
            vec![
                Err(Error::AlreadyRunning),
                Err(Error::AlreadyRunning),
                Err(Error::AlreadyRunning)
            ]
        );
        assert_eq!(task.producer_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_signals_are_idempotent() {
        let task = Orchestrator::<u32>::new(1, 1);
        assert!(!task.is_send_stopped());
        assert!(!task.is_receive_stopped());

        task.stop_send();
        task.stop_send();
        task.stop_receive();
        task.stop_receive();

        assert!(task.is_send_stopped());
        assert!(task.is_receive_stopped());
    }

    #[tokio::test]
    async fn test_send_after_stop_leaves_buffer_untouched() {
        let task = Orchestrator::<u32>::new(4, 1);
        assert!(task.send(1).await);

        task.stop_send();
        assert!(!task.send(2).await);
        assert_eq!(task.stats().sent, 1);

        task.close_buffer();
        assert_eq!(task.receive().await, Some(1));
        assert_eq!(task.receive().await, None);
    }

    #[tokio::test]
    async fn test_receive_after_stop_returns_none() {
        let task = Orchestrator::<u32>::new(4, 1);
        assert!(task.send(1).await);

        task.stop_receive();
        assert_eq!(task.receive().await, None);
        assert_eq!(task.stats().received, 0);
    }

    #[tokio::test]
    async fn test_send_after_close_is_refused() {
        let task = Orchestrator::<u32>::new(4, 1);
        task.close_buffer();
        assert!(!task.send(1).await);
        assert_eq!(task.receive().await, None);
    }

    #[test]
    fn test_send_waits_while_full() {
        let task = Orchestrator::<u32>::new(1, 1);
        assert!(tokio_test::block_on(task.send(1)));

        let mut blocked = tokio_test::task::spawn(task.send(2));
        tokio_test::assert_pending!(blocked.poll());

        // Stopping does not release a push that is already waiting.
        task.stop_send();
        tokio_test::assert_pending!(blocked.poll());

        let mut received = tokio_test::task::spawn(task.receive());
        assert_eq!(tokio_test::assert_ready!(received.poll()), Some(1));
        assert!(blocked.is_woken());
        assert!(tokio_test::assert_ready!(blocked.poll()));
    }

    #[test]
    fn test_receive_waits_while_empty() {
        let task = Orchestrator::<u32>::new(2, 1);

        let mut waiting = tokio_test::task::spawn(task.receive());
        tokio_test::assert_pending!(waiting.poll());

        // Stopping does not release a pop that is already waiting.
        task.stop_receive();
        tokio_test::assert_pending!(waiting.poll());

        assert!(tokio_test::block_on(task.send(3)));
        assert!(waiting.is_woken());
        assert_eq!(tokio_test::assert_ready!(waiting.poll()), Some(3));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let task = Orchestrator::<u32>::new(4, 0);
        assert_eq!(task.shared.max_concurrency, 1);
        assert_eq!(task.shared.gate.available_permits(), 1);
        assert!(task.send(1).await);
        assert_eq!(task.receive().await, Some(1));
    }

    #[test]
    fn test_unbuffered_send_waits_for_receive() {
        let task = Orchestrator::<u32>::new(0, 1);

        let mut sending = tokio_test::task::spawn(task.send(1));
        tokio_test::assert_pending!(sending.poll());
        tokio_test::assert_pending!(sending.poll());

        let mut received = tokio_test::task::spawn(task.receive());
        assert_eq!(tokio_test::assert_ready!(received.poll()), Some(1));
        assert!(sending.is_woken());
        assert!(tokio_test::assert_ready!(sending.poll()));
    }

    #[test]
    fn test_unbuffered_send_refused_when_payload_discarded() {
        let task = Orchestrator::<u32>::new(0, 1);

        let mut sending = tokio_test::task::spawn(task.send(1));
        tokio_test::assert_pending!(sending.poll());

        assert_eq!(tokio_test::block_on(task.drain()), 1);
        assert!(sending.is_woken());
        assert!(!tokio_test::assert_ready!(sending.poll()));
    }

    #[tokio::test]
    async fn test_debug_reports_state() {
        let task = Orchestrator::<u32>::new(4, 1);
        let rendered = format!("{:?}", task);
        assert!(rendered.contains("NotStarted"));
    }
}
