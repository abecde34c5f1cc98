//! Closure adapters for producers and consumers.
//!
//! The argument bundle is moved into the adapter when the task is
//! registered, so whatever the closure sees at run time is exactly what was
//! captured at registration.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use crate::orchestrator::Orchestrator;
use crate::traits::{Consumer, Producer};

/// Helper function to create a producer from a function and its arguments
pub fn producer_fn<F, Fut, A, T>(f: F, args: A) -> FnProducer<F, Fut, A, T>
where
    F: FnOnce(Orchestrator<T>, A) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
    A: Send,
    T: Send + 'static,
{
    FnProducer {
        call: Some((f, args)),
        _phantom: PhantomData,
    }
}

/// A producer created from a function
pub struct FnProducer<F, Fut, A, T> {
    call: Option<(F, A)>,
    _phantom: PhantomData<fn() -> (Fut, T)>,
}

#[async_trait]
impl<F, Fut, A, T> Producer for FnProducer<F, Fut, A, T>
where
    F: FnOnce(Orchestrator<T>, A) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
    A: Send,
    T: Send + 'static,
{
    type Item = T;

    async fn produce(&mut self, task: Orchestrator<T>) {
        // A registered task runs once; a second call has nothing left to run.
        if let Some((f, args)) = self.call.take() {
            f(task, args).await;
        }
    }
}

/// Helper function to create a consumer from a function and its arguments
pub fn consumer_fn<F, Fut, A, T>(f: F, args: A) -> FnConsumer<F, Fut, A, T>
where
    F: FnOnce(Orchestrator<T>, A) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
    A: Send,
    T: Send + 'static,
{
    FnConsumer {
        call: Some((f, args)),
        _phantom: PhantomData,
    }
}

/// A consumer created from a function
pub struct FnConsumer<F, Fut, A, T> {
    call: Option<(F, A)>,
    _phantom: PhantomData<fn() -> (Fut, T)>,
}

#[async_trait]
impl<F, Fut, A, T> Consumer for FnConsumer<F, Fut, A, T>
where
    F: FnOnce(Orchestrator<T>, A) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
    A: Send,
    T: Send + 'static,
{
    type Item = T;

    async fn consume(&mut self, task: Orchestrator<T>) {
        if let Some((f, args)) = self.call.take() {
            f(task, args).await;
        }
    }
}
