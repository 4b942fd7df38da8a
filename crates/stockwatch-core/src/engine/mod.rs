//! Core monitor engine
//!
//! The Monitor is responsible for:
//! - Owning the check timer and serializing check cycles
//! - Fetching a snapshot (with fallback) every cycle
//! - Running every enabled rule through the transition detector
//! - Delivering notifications for qualifying transitions
//! - Flushing the history store after each cycle
//!
//! ## Architecture
//!
//! ```text
//!          ┌──────────────┐
//!          │ Timer / call │──── tick / trigger() ───┐
//!          └──────────────┘                         │
//!                                                   ▼
//!                                          ┌──────────────┐
//!                                          │   Monitor    │
//!                                          └──────────────┘
//!                                                   │
//!       ┌──────────────────┬────────────────────────┼──────────────────┐
//!       │                  │                        │                  │
//!       ▼                  ▼                        ▼                  ▼
//! ┌─────────────┐   ┌─────────────┐        ┌──────────────┐    ┌─────────────┐
//! │  Snapshot   │   │   Matcher   │        │ HistoryStore │    │  Notifier   │
//! │  Fetcher    │   │  + Detector │        │  (diff/log)  │    │  (deliver)  │
//! └─────────────┘   └─────────────┘        └──────────────┘    └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Fetch a snapshot (live, cached or placeholder)
//! 2. For each enabled rule, each matching resource and each matching location,
//!    compare the status with the last record for (rule, history key)
//! 3. Record changed statuses; notify every change except first observations
//! 4. Flush the history store and emit a cycle report

pub mod detector;

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, MonitorConfig};
use crate::error::{Error, Result};
use crate::history::RuleHistory;
use crate::matcher;
use crate::model::{Status, WatchRule};
use crate::notify::{DeliveryOutcome, Notification, Notifier};
use crate::source::{SnapshotFetcher, SnapshotOrigin};
use crate::traits::{HistoryStore, InventorySource, NotificationChannel};

pub use detector::{Transition, format_elapsed, observe};

/// Events emitted by the Monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Timer armed
    Started {
        rules: usize,
        interval_secs: u64,
    },

    /// Timer cancelled
    Stopped {
        reason: String,
    },

    /// A cycle began
    CycleStarted {
        at: DateTime<Utc>,
    },

    /// The source failed and a fallback snapshot is being used
    FetchDegraded {
        origin: SnapshotOrigin,
        error: String,
    },

    /// No snapshot at all; the cycle did nothing
    CycleSkipped {
        reason: String,
    },

    /// A status change was appended to history
    TransitionRecorded {
        rule_id: String,
        identifier: String,
        location: String,
        previous: Option<Status>,
        current: Status,
    },

    /// The channel acknowledged a notification
    NotificationSent {
        rule_id: String,
        identifier: String,
        location: String,
    },

    /// A notification was skipped, rejected or failed
    NotificationFailed {
        rule_id: String,
        identifier: String,
        location: String,
        reason: String,
    },

    /// A cycle finished
    CycleCompleted {
        report: CycleReport,
    },
}

/// Summary of one check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// `None` when the cycle was skipped for lack of a snapshot
    pub origin: Option<SnapshotOrigin>,
    pub resources: usize,
    pub transitions: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

/// Point-in-time view of the monitor for the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Whether the timer is armed
    pub running: bool,
    pub check_interval_secs: Option<u64>,
    /// Number of configured rules
    pub rules: usize,
    pub last_snapshot_size: usize,
    pub last_snapshot_origin: Option<SnapshotOrigin>,
    pub last_check: Option<DateTime<Utc>>,
    pub degraded_fetches: u64,
    pub cycles: u64,
}

#[derive(Debug, Default)]
struct Stats {
    last_snapshot_size: usize,
    last_snapshot_origin: Option<SnapshotOrigin>,
    last_check: Option<DateTime<Utc>>,
    cycles: u64,
}

struct Timer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    fetcher: SnapshotFetcher,
    notifier: Notifier,
    store: Arc<dyn HistoryStore>,
    config: RwLock<Option<MonitorConfig>>,
    /// Held for the duration of a cycle
    cycle_lock: Mutex<()>,
    timer: Mutex<Option<Timer>>,
    stats: RwLock<Stats>,
    event_tx: mpsc::Sender<MonitorEvent>,
}

/// Availability monitor
///
/// One `Monitor` is one engine instance: it owns the current configuration,
/// the snapshot cache and the timer. The handle is cheap to clone and every
/// clone drives the same instance.
///
/// ## Lifecycle
///
/// 1. Create with [`Monitor::new()`]
/// 2. Arm the timer with [`Monitor::start()`], or drive cycles by hand with
///    [`Monitor::configure()`] and [`Monitor::trigger()`]
/// 3. Disarm with [`Monitor::stop()`], or [`Monitor::shutdown()`] to also wait
///    for the timer task and flush history
///
/// ## Concurrency
///
/// Cycles never overlap: timer ticks and manual triggers queue on the same
/// async mutex. Ticks that fall due while a cycle is still running are
/// skipped rather than bunched up.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    /// Create a new monitor
    ///
    /// # Returns
    ///
    /// A tuple of (monitor, event_receiver) where event_receiver yields monitor events
    pub fn new(
        source: Box<dyn InventorySource>,
        channel: Box<dyn NotificationChannel>,
        store: Box<dyn HistoryStore>,
        engine: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<MonitorEvent>)> {
        engine.validate()?;

        let (tx, rx) = mpsc::channel(engine.event_channel_capacity);

        let inner = Inner {
            fetcher: SnapshotFetcher::new(Arc::from(source), engine.placeholder_snapshot),
            notifier: Notifier::new(
                Arc::from(channel),
                Duration::from_secs(engine.notify_timeout_secs),
            ),
            store: Arc::from(store),
            config: RwLock::new(None),
            cycle_lock: Mutex::new(()),
            timer: Mutex::new(None),
            stats: RwLock::new(Stats::default()),
            event_tx: tx,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            rx,
        ))
    }

    /// Install a configuration without arming the timer
    ///
    /// History carried by the rules seeds the store for rules the store does
    /// not know yet. Stored history for rules no longer configured is dropped.
    pub async fn configure(&self, config: MonitorConfig) -> Result<()> {
        config.validate()?;

        for rule in &config.rules {
            let carried = RuleHistory::from(rule);
            if carried.is_empty() {
                continue;
            }
            if self.inner.store.seed(&rule.id, carried).await? {
                debug!("Seeded history for rule {} from configuration", rule.id);
            }
        }

        for stored in self.inner.store.list_rules().await? {
            if !config.rules.iter().any(|rule| rule.id == stored) {
                debug!("Dropping history for removed rule {}", stored);
                self.inner.store.remove_rule(&stored).await?;
            }
        }

        info!(
            "Monitor configured: {} rules ({} enabled), interval {}s",
            config.rules.len(),
            config.enabled_rules(),
            config.check_interval_secs
        );
        *self.inner.config.write().await = Some(config);
        Ok(())
    }

    /// Configure and arm the timer
    ///
    /// Any existing timer is cancelled first. The first cycle runs
    /// immediately, then one every `check_interval_secs`.
    pub async fn start(&self, config: MonitorConfig) -> Result<()> {
        if let Some(previous) = self.take_timer().await {
            // Let the old loop finish its in-flight cycle before re-arming
            let _ = previous.await;
        }

        let interval_secs = config.check_interval_secs;
        let rules = config.rules.len();
        self.configure(config).await?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            Duration::from_secs(interval_secs),
            shutdown_rx,
        ));

        *self.inner.timer.lock().await = Some(Timer {
            shutdown: shutdown_tx,
            task,
        });

        info!("Monitor started, checking every {}s", interval_secs);
        self.emit_event(MonitorEvent::Started {
            rules,
            interval_secs,
        });
        Ok(())
    }

    /// Cancel the timer
    ///
    /// Safe to call at any time. A cycle already running completes, including
    /// its notifications, but no new cycle starts.
    ///
    /// # Returns
    ///
    /// `true` if a timer was armed
    pub async fn stop(&self) -> bool {
        self.take_timer().await.is_some()
    }

    /// Stop, wait for the timer task to exit, and flush history
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(task) = self.take_timer().await {
            if let Err(e) = task.await {
                error!("Timer task ended abnormally: {}", e);
            }
        }

        self.inner.store.flush().await?;
        info!("History flushed, monitor stopped");
        Ok(())
    }

    async fn take_timer(&self) -> Option<JoinHandle<()>> {
        let timer = self.inner.timer.lock().await.take()?;
        // The loop may already have exited if every handle was dropped
        let _ = timer.shutdown.send(());

        info!("Monitor stopped");
        self.emit_event(MonitorEvent::Stopped {
            reason: "stop requested".to_string(),
        });
        Some(timer.task)
    }

    /// Current state for the control surface
    pub async fn status(&self) -> MonitorStatus {
        let running = self
            .inner
            .timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|timer| !timer.task.is_finished());

        let (check_interval_secs, rules) = match &*self.inner.config.read().await {
            Some(config) => (Some(config.check_interval_secs), config.rules.len()),
            None => (None, 0),
        };

        let stats = self.inner.stats.read().await;
        MonitorStatus {
            running,
            check_interval_secs,
            rules,
            last_snapshot_size: stats.last_snapshot_size,
            last_snapshot_origin: stats.last_snapshot_origin,
            last_check: stats.last_check,
            degraded_fetches: self.inner.fetcher.degraded_fetches(),
            cycles: stats.cycles,
        }
    }

    /// Run one cycle now
    ///
    /// Waits for a running cycle to finish first.
    pub async fn trigger(&self) -> Result<CycleReport> {
        self.trigger_at(Utc::now()).await
    }

    /// Run one cycle with an explicit clock reading
    pub async fn trigger_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.inner.run_cycle(now).await
    }

    /// Configured rules with their current history
    pub async fn rules(&self) -> Result<Vec<WatchRule>> {
        let Some(config) = self.inner.config.read().await.clone() else {
            return Ok(Vec::new());
        };

        let mut rules = config.rules;
        for rule in &mut rules {
            if let Some(history) = self.inner.store.rule_history(&rule.id).await? {
                rule.history = history.locations;
                rule.last_notification = history.last_notification;
            }
        }
        Ok(rules)
    }

    fn emit_event(&self, event: MonitorEvent) {
        self.inner.emit_event(event);
    }
}

impl Inner {
    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;

        let config = self
            .config
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::config("Monitor has no configuration"))?;

        self.emit_event(MonitorEvent::CycleStarted { at: now });

        let Some(snapshot) = self.fetcher.fetch().await else {
            warn!("No snapshot available, skipping cycle");
            self.emit_event(MonitorEvent::CycleSkipped {
                reason: "no snapshot available".to_string(),
            });
            self.stats.write().await.last_check = Some(now);
            return Ok(CycleReport::default());
        };

        if let Some(error) = &snapshot.degraded {
            self.emit_event(MonitorEvent::FetchDegraded {
                origin: snapshot.origin,
                error: error.clone(),
            });
        }

        {
            let mut stats = self.stats.write().await;
            stats.last_snapshot_size = snapshot.resources.len();
            stats.last_snapshot_origin = Some(snapshot.origin);
        }

        let mut report = CycleReport {
            origin: Some(snapshot.origin),
            resources: snapshot.resources.len(),
            ..CycleReport::default()
        };

        for rule in config.rules.iter().filter(|rule| rule.enabled) {
            for resource in snapshot
                .resources
                .iter()
                .filter(|resource| matcher::matches_resource(rule, resource))
            {
                for (index, record) in resource.locations.iter().enumerate() {
                    if !matcher::matches_location(rule, &record.location) {
                        continue;
                    }

                    let key = rule.history_key(&resource.identifier, &record.location);
                    let transition = match observe(
                        self.store.as_ref(),
                        &rule.id,
                        &key,
                        &record.location,
                        &record.status,
                        now,
                    )
                    .await
                    {
                        Ok(Some(transition)) => transition,
                        Ok(None) => continue,
                        Err(e) => {
                            error!(
                                "Failed to record status for rule {} at {}: {}",
                                rule.id, record.location, e
                            );
                            continue;
                        }
                    };

                    report.transitions += 1;
                    info!(
                        rule = %rule.id,
                        "{} at {}: {} -> {}",
                        resource.identifier,
                        record.location,
                        transition
                            .previous_status()
                            .map(Status::as_str)
                            .unwrap_or("(first seen)"),
                        record.status
                    );
                    self.emit_event(MonitorEvent::TransitionRecorded {
                        rule_id: rule.id.clone(),
                        identifier: resource.identifier.clone(),
                        location: record.location.clone(),
                        previous: transition.previous_status().cloned(),
                        current: record.status.clone(),
                    });

                    if !transition.is_notifiable() {
                        continue;
                    }

                    let notification = Notification {
                        resource: resource.clone(),
                        location_index: index,
                        scoped: rule.is_location_scoped(),
                        now,
                        elapsed: transition.elapsed.clone(),
                        previous_status: transition.previous_status().cloned(),
                    };
                    let outcome = self.notifier.send(&config.channel, &notification).await;

                    if let Err(e) = self.store.set_last_notification(&rule.id, now).await {
                        error!("Failed to record notification time for rule {}: {}", rule.id, e);
                    }

                    match outcome {
                        DeliveryOutcome::Delivered => {
                            report.notifications_sent += 1;
                            self.emit_event(MonitorEvent::NotificationSent {
                                rule_id: rule.id.clone(),
                                identifier: resource.identifier.clone(),
                                location: record.location.clone(),
                            });
                        }
                        other => {
                            report.notifications_failed += 1;
                            self.emit_event(MonitorEvent::NotificationFailed {
                                rule_id: rule.id.clone(),
                                identifier: resource.identifier.clone(),
                                location: record.location.clone(),
                                reason: other.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if let Err(e) = self.store.flush().await {
            error!("Failed to flush history: {}", e);
        }

        {
            let mut stats = self.stats.write().await;
            stats.cycles += 1;
            stats.last_check = Some(now);
        }

        debug!(
            "Cycle complete: {} resources ({}), {} transitions, {} sent, {} failed",
            report.resources,
            snapshot.origin,
            report.transitions,
            report.notifications_sent,
            report.notifications_failed
        );
        self.emit_event(MonitorEvent::CycleCompleted {
            report: report.clone(),
        });

        Ok(report)
    }

    fn emit_event(&self, event: MonitorEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Timer loop: one cycle per tick until shutdown or until every handle is gone
async fn run_timer(inner: Weak<Inner>, period: Duration, mut shutdown_rx: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = IntervalStream::new(interval);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("Timer shutdown signal received");
                break;
            }

            Some(_) = ticks.next() => {
                let Some(inner) = inner.upgrade() else {
                    debug!("Monitor dropped, timer exiting");
                    break;
                };
                if let Err(e) = inner.run_cycle(Utc::now()).await {
                    error!("Check cycle failed: {}", e);
                }
            }
        }
    }
}
