//! Cooperative stop signals
//!
//! A consumer stops the send side once it has seen enough. Producers already
//! running notice `send` returning false and exit; producers still waiting
//! for a slot are never launched.

use chanweld::prelude::*;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    let task = Orchestrator::new(2, 1);

    for id in 0..5u32 {
        task.add_producer(
            |task: Orchestrator<String>, id: u32| async move {
                for n in 0.. {
                    if !task.send(format!("producer-{} item-{}", id, n)).await {
                        println!("producer-{} refused, exiting", id);
                        break;
                    }
                    sleep(Duration::from_millis(10)).await;
                }
            },
            id,
        )?;
    }

    task.add_consumer(
        |task: Orchestrator<String>, limit: usize| async move {
            let mut seen = 0;
            while let Some(item) = task.receive().await {
                println!("received {}", item);
                seen += 1;
                if seen == limit {
                    println!("limit reached, stopping senders");
                    task.stop_send();
                }
            }
        },
        8usize,
    )?;

    let stats = task.start().await?;
    println!(
        "launched {} producers, skipped {}, received {}, discarded {}",
        stats.producers_launched, stats.producers_skipped, stats.received, stats.discarded
    );
    Ok(())
}
