//! # Bounded fan-out/fan-in over a single channel
//!
//! This crate runs a set of producers and a set of consumers against one
//! shared bounded buffer. Producers are launched in registration order with
//! at most `max_concurrency` running at once; consumers all run concurrently
//! and drain the buffer until every producer has finished.
//!
//! ## Core Concepts
//!
//! - **Producer**: Sends payloads into the shared buffer
//! - **Consumer**: Receives payloads until the buffer is exhausted
//! - **Orchestrator**: Owns the buffer, the concurrency gate and the stop signals
//! - **Stop signals**: Cooperative, idempotent latches for the send and receive sides
//!
//! ## Example
//!
//! ```rust
//! use chanweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let task = Orchestrator::new(10, 4);
//!
//!     for chunk in [vec![1, 2], vec![3, 4], vec![5]] {
//!         task.add_producer(
//!             |task: Orchestrator<i64>, chunk: Vec<i64>| async move {
//!                 for n in chunk {
//!                     if !task.send(n * 2).await {
//!                         break;
//!                     }
//!                 }
//!             },
//!             chunk,
//!         )?;
//!     }
//!
//!     task.add_consumer(
//!         |task: Orchestrator<i64>, _: ()| async move {
//!             while let Some(n) = task.receive().await {
//!                 println!("{}", n);
//!             }
//!         },
//!         (),
//!     )?;
//!
//!     task.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod stats;
pub mod traits;
pub mod util;

mod tracing_support;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{Orchestrator, OrchestratorState};
    pub use crate::stats::OrchestratorStats;
    pub use crate::traits::{Consumer, Producer};
    pub use crate::util::{consumer_fn, producer_fn};
}

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use stats::OrchestratorStats;
pub use traits::{Consumer, Producer};

// Feature flags for optional dependencies
#[cfg(feature = "metrics")]
mod metrics;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
