//! Fan-out/fan-in basics
//!
//! Several producers split a range of numbers between them, two at a time,
//! while three consumers square whatever they receive.

use chanweld::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    println!("Fan-out/fan-in over one channel\n");

    let task = Orchestrator::new(4, 2);

    for chunk in [1..6, 6..11, 11..16, 16..21] {
        task.add_producer(
            |task: Orchestrator<u64>, chunk: std::ops::Range<u64>| async move {
                for n in chunk {
                    if !task.send(n).await {
                        break;
                    }
                    sleep(Duration::from_millis(5)).await;
                }
            },
            chunk,
        )?;
    }

    let total = Arc::new(AtomicU64::new(0));
    for id in 1..=3 {
        task.add_consumer(
            |task: Orchestrator<u64>, (id, total): (u32, Arc<AtomicU64>)| async move {
                while let Some(n) = task.receive().await {
                    println!("consumer-{}: {}^2 = {}", id, n, n * n);
                    total.fetch_add(n * n, Ordering::Relaxed);
                }
            },
            (id, total.clone()),
        )?;
    }

    let stats = task.start().await?;

    println!("\nSum of squares: {}", total.load(Ordering::Relaxed));
    println!("Stats: {:?}", stats);
    Ok(())
}
