//! Minimal embedding example for stockwatch-core
//!
//! Drives the monitor from application code: an in-process inventory whose
//! statuses the application flips, and a channel that prints to stdout.
//! No timer is started; every check is an explicit trigger.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stockwatch_core::traits::NotificationChannel;
use stockwatch_core::{
    ChannelConfig, EngineConfig, MemoryHistoryStore, Monitor, MonitorConfig, Result,
    StaticInventorySource, WatchRule,
};

/// Channel that prints every message
#[derive(Clone, Default)]
struct StdoutChannel {
    delivered: Arc<AtomicUsize>,
}

impl StdoutChannel {
    fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NotificationChannel for StdoutChannel {
    async fn deliver(&self, destination: &str, _credential: &str, message: &str) -> Result<bool> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        println!("--- message for {} ---\n{}\n---------------------", destination, message);
        Ok(true)
    }

    fn channel_name(&self) -> &'static str {
        "stdout"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("=== Embedded stockwatch-core Example ===\n");

    let inventory = StaticInventorySource::demo();
    let channel = StdoutChannel::default();
    let store = MemoryHistoryStore::new();

    let config = MonitorConfig::new(ChannelConfig::telegram("console", "unused"))
        .with_rule(
            WatchRule::new("sk-gra")
                .with_identifier("24sk10.ram-32g-ecc-2133.softraid-2x2000sa")
                .with_location("gra"),
        )
        .with_rule(
            WatchRule::new("sk2-bhs")
                .with_identifier("test-product-2")
                .with_location("bhs"),
        );

    println!("1. Creating monitor...");
    let (monitor, mut events) = Monitor::new(
        Box::new(inventory.clone()),
        Box::new(channel.clone()),
        Box::new(store.clone()),
        EngineConfig::default(),
    )?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    monitor.configure(config).await?;

    println!("\n2. First check records the baseline silently");
    let report = monitor.trigger().await?;
    println!("   {:?}", report);

    println!("\n3. Flipping both watched locations to unavailable");
    inventory
        .set_status("24sk10.ram-32g-ecc-2133.softraid-2x2000sa", "gra", "unavailable")
        .await;
    inventory.set_status("test-product-2", "bhs", "unavailable").await;

    let report = monitor.trigger().await?;
    println!("   {:?}", report);

    println!("\n4. Unchanged inventory sends nothing");
    let report = monitor.trigger().await?;
    println!("   {:?}", report);

    println!("\n5. Rules with their updated history:");
    for rule in monitor.rules().await? {
        for (location, log) in &rule.history {
            println!("   {} @ {}: {} transition(s)", rule.id, location, log.len());
        }
    }

    monitor.shutdown().await?;
    drop(monitor);
    let _ = event_listener.await;

    println!("\n=== {} notification(s) delivered ===", channel.delivered());
    println!("- No timer: the application decides when to check");
    println!("- History lives in the store, not in the monitor");
    println!("- All components are custom (not stockwatchd defaults)");

    Ok(())
}
