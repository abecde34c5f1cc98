//! Core traits for tasks registered with an orchestrator.
//!
//! A producer pushes payloads into the shared buffer with
//! [`Orchestrator::send`]; a consumer pulls them out with
//! [`Orchestrator::receive`]. Each registered task runs exactly once, in its
//! own tokio task, and receives a handle to the orchestrator that owns it.
//!
//! Most callers register closures through
//! [`Orchestrator::add_producer`] and [`Orchestrator::add_consumer`]; the
//! traits are the seam for stateful tasks that are easier to write as a
//! type.

use async_trait::async_trait;

use crate::orchestrator::Orchestrator;

/// A producer sends payloads into the orchestrator's shared buffer.
///
/// Stopping is cooperative: a producer that wants to exit early after
/// [`Orchestrator::stop_send`] should watch the return value of
/// [`Orchestrator::send`] or poll [`Orchestrator::is_send_stopped`].
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use chanweld::{Orchestrator, Producer};
///
/// struct Countdown {
///     from: u32,
/// }
///
/// #[async_trait]
/// impl Producer for Countdown {
///     type Item = u32;
///
///     async fn produce(&mut self, task: Orchestrator<u32>) {
///         for n in (1..=self.from).rev() {
///             if !task.send(n).await {
///                 break;
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Producer: Send {
    /// The type of payloads this producer sends
    type Item;

    /// Run the producer to completion.
    async fn produce(&mut self, task: Orchestrator<Self::Item>);
}

/// A consumer drains payloads from the orchestrator's shared buffer.
///
/// The usual shape is a loop over [`Orchestrator::receive`] that ends on
/// `None`, which signals that every producer has finished and the buffer
/// is empty, or that receiving was stopped.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use chanweld::{Consumer, Orchestrator};
///
/// struct Summer {
///     total: u64,
/// }
///
/// #[async_trait]
/// impl Consumer for Summer {
///     type Item = u64;
///
///     async fn consume(&mut self, task: Orchestrator<u64>) {
///         while let Some(n) = task.receive().await {
///             self.total += n;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Consumer: Send {
    /// The type of payloads this consumer receives
    type Item;

    /// Run the consumer to completion.
    async fn consume(&mut self, task: Orchestrator<Self::Item>);
}
