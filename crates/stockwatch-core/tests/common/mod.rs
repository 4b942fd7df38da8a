//! Test doubles and common utilities for contract tests
//!
//! Doubles share their state through `Arc`, so a test keeps a handle while the
//! monitor owns the boxed trait object.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stockwatch_core::error::{Error, Result};
use stockwatch_core::traits::{InventorySource, NotificationChannel};
use stockwatch_core::{
    ChannelConfig, EngineConfig, HistoryStore, MemoryHistoryStore, Monitor, MonitorConfig,
    MonitorEvent, Resource, WatchRule,
};
use tokio::sync::mpsc;

/// Inventory source that replays queued results
///
/// Once the queue is empty it keeps serving the fallback result.
#[derive(Clone)]
pub struct ScriptedSource {
    queue: Arc<Mutex<VecDeque<Result<Vec<Resource>>>>>,
    fallback: Arc<Mutex<Option<Vec<Resource>>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// A source that fails until something is queued
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(None)),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source that always serves `resources` unless told otherwise
    pub fn serving(resources: Vec<Resource>) -> Self {
        let source = Self::new();
        source.set_fallback(resources);
        source
    }

    pub fn push_ok(&self, resources: Vec<Resource>) {
        self.queue.lock().unwrap().push_back(Ok(resources));
    }

    pub fn push_err(&self, message: &str) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Err(Error::source(message.to_string())));
    }

    pub fn set_fallback(&self, resources: Vec<Resource>) {
        *self.fallback.lock().unwrap() = Some(resources);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InventorySource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<Resource>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::source("scripted source has nothing to serve"))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Notification channel that records every delivered message
#[derive(Clone)]
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    behavior: ChannelBehavior,
}

#[derive(Clone, Copy)]
pub enum ChannelBehavior {
    Accept,
    Reject,
    Fail,
    /// Accept after sleeping
    Slow(Duration),
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::with_behavior(ChannelBehavior::Accept)
    }

    pub fn with_behavior(behavior: ChannelBehavior) -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            behavior,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    async fn deliver(&self, _destination: &str, _credential: &str, message: &str) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            ChannelBehavior::Accept => {}
            ChannelBehavior::Reject => return Ok(false),
            ChannelBehavior::Fail => return Err(Error::http("connection reset")),
            ChannelBehavior::Slow(delay) => tokio::time::sleep(delay).await,
        }

        self.messages.lock().unwrap().push(message.to_string());
        Ok(true)
    }

    fn channel_name(&self) -> &'static str {
        "recording"
    }
}

/// Build a resource with the given (location, status) pairs
pub fn resource(identifier: &str, locations: &[(&str, &str)]) -> Resource {
    locations
        .iter()
        .fold(Resource::new(identifier, identifier), |resource, (location, status)| {
            resource.with_location(*location, *status)
        })
}

/// Enabled channel with dummy credentials
pub fn channel() -> ChannelConfig {
    ChannelConfig::telegram("chat-1", "token-1")
}

/// Monitor config with the given rules and a 60s interval
pub fn config(rules: Vec<WatchRule>) -> MonitorConfig {
    rules
        .into_iter()
        .fold(MonitorConfig::new(channel()).with_interval(60), |config, rule| {
            config.with_rule(rule)
        })
}

/// Monitor over a scripted source, recording channel and memory store
pub fn monitor(
    source: &ScriptedSource,
    channel: &RecordingChannel,
) -> (Monitor, mpsc::Receiver<MonitorEvent>, MemoryHistoryStore) {
    let store = MemoryHistoryStore::new();
    let (monitor, events) = Monitor::new(
        Box::new(source.clone()),
        Box::new(channel.clone()),
        Box::new(store.clone()),
        EngineConfig::default(),
    )
    .expect("monitor construction succeeds");
    (monitor, events, store)
}

/// Monitor over an arbitrary store
pub fn monitor_with_store(
    source: &ScriptedSource,
    channel: &RecordingChannel,
    store: Box<dyn HistoryStore>,
    engine: EngineConfig,
) -> (Monitor, mpsc::Receiver<MonitorEvent>) {
    Monitor::new(Box::new(source.clone()), Box::new(channel.clone()), store, engine)
        .expect("monitor construction succeeds")
}

/// Collect every event currently queued
pub fn drain(events: &mut mpsc::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
