//! # Tick Driver
//!
//! The `Gateway` owns every channel, the poll scheduler with its bus, the
//! decoder and the publisher, and advances all state machines exactly once per
//! iteration of its control loop. Nothing in `tick` blocks; the loop itself
//! only sleeps between iterations.

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};

use crate::bus::Bus;
use crate::channel::{ChannelState, SharedChannel};
use crate::clock::{Clock, Millis};
use crate::decoder::Decoder;
use crate::poll::{PollScheduler, PollState};
use crate::publish::Publisher;

/// Per-channel part of a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub state: ChannelState,
    pub frames_delivered: u64,
    pub frames_discarded: u64,
    pub bytes_dropped: u64,
    pub last_error: Option<String>,
}

/// Per-slave part of a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SlaveStatus {
    pub name: String,
    pub address: u8,
    pub serial: Option<u32>,
    pub success: u32,
    pub fail: u32,
    pub last_error: Option<String>,
    pub last_error_code: Option<u8>,
}

/// Point-in-time view of the whole gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub version: &'static str,
    pub uptime_ms: u32,
    /// Milliseconds since the most recent delivery on any channel.
    pub last_frame_ms_ago: Option<u32>,
    pub publisher_connected: bool,
    pub poll_state: Option<PollState>,
    pub channels: Vec<ChannelStatus>,
    pub slaves: Vec<SlaveStatus>,
}

struct Poller {
    scheduler: PollScheduler,
    bus: Box<dyn Bus>,
}

/// Control loop composing channels and the poll scheduler.
pub struct Gateway {
    channels: Vec<SharedChannel>,
    poller: Option<Poller>,
    decoder: Box<dyn Decoder>,
    publisher: Box<dyn Publisher>,
    started: Option<Millis>,
    status_interval_ms: u32,
    last_status: Millis,
    ticks: u64,
}

impl Gateway {
    pub fn new(channels: Vec<SharedChannel>, decoder: Box<dyn Decoder>, publisher: Box<dyn Publisher>) -> Self {
        Self {
            channels,
            poller: None,
            decoder,
            publisher,
            started: None,
            status_interval_ms: 0,
            last_status: Millis::ZERO,
            ticks: 0,
        }
    }

    /// Adds a poll scheduler driving `bus`.
    pub fn with_poller(mut self, scheduler: PollScheduler, bus: Box<dyn Bus>) -> Self {
        self.poller = Some(Poller { scheduler, bus });
        self
    }

    /// Logs a status snapshot every `ms` milliseconds; 0 disables it.
    pub fn with_status_interval(mut self, ms: u32) -> Self {
        self.status_interval_ms = ms;
        self
    }

    pub fn channels(&self) -> &[SharedChannel] {
        &self.channels
    }

    pub fn scheduler(&self) -> Option<&PollScheduler> {
        self.poller.as_ref().map(|p| &p.scheduler)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advances every channel and the scheduler once.
    pub fn tick(&mut self, now: Millis) {
        let started = *self.started.get_or_insert(now);

        for channel in &self.channels {
            channel.with(|ch| ch.tick(now, self.decoder.as_mut(), self.publisher.as_mut()));
        }

        if let Some(poller) = self.poller.as_mut() {
            poller
                .scheduler
                .tick(now, poller.bus.as_mut(), self.publisher.as_mut());
        }

        if self.status_interval_ms > 0 && now.since(self.last_status) >= self.status_interval_ms {
            self.last_status = now;
            if now != started {
                self.log_status(now);
            }
        }
        self.ticks += 1;
    }

    /// True once every channel has delivered at least one frame.
    pub fn all_channels_delivered(&self) -> bool {
        self.channels.iter().all(|c| c.with(|ch| ch.has_delivered()))
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    pub fn status(&self, now: Millis) -> GatewayStatus {
        let channels: Vec<ChannelStatus> = self
            .channels
            .iter()
            .map(|c| {
                c.with(|ch| ChannelStatus {
                    name: ch.name().to_string(),
                    state: ch.state(),
                    frames_delivered: ch.stats().frames_delivered,
                    frames_discarded: ch.stats().frames_discarded,
                    bytes_dropped: ch.stats().bytes_dropped,
                    last_error: ch.stats().last_error.map(|e| e.to_string()),
                })
            })
            .collect();

        let last_frame_ms_ago = self
            .channels
            .iter()
            .filter_map(|c| c.with(|ch| ch.stats().last_delivery))
            .map(|t| now.since(t))
            .min();

        let slaves = self
            .scheduler()
            .map(|s| {
                s.slaves()
                    .iter()
                    .map(|slave| SlaveStatus {
                        name: slave.name().to_string(),
                        address: slave.address(),
                        serial: slave.identity.map(|i| i.serial),
                        success: slave.success,
                        fail: slave.errors,
                        last_error: slave.last_error.map(|e| e.to_string()),
                        last_error_code: slave.last_error.map(|e| e.code()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        GatewayStatus {
            version: env!("CARGO_PKG_VERSION"),
            uptime_ms: self.started.map(|s| now.since(s)).unwrap_or(0),
            last_frame_ms_ago,
            publisher_connected: self.publisher.is_connected(),
            poll_state: self.scheduler().map(|s| s.state()),
            channels,
            slaves,
        }
    }

    fn log_status(&self, now: Millis) {
        match serde_json::to_string(&self.status(now)) {
            Ok(json) => info!("status {json}"),
            Err(e) => debug!("status snapshot not serializable: {e}"),
        }
    }

    /// Runs the control loop every `period` until `shutdown` resolves.
    pub async fn run<F>(&mut self, clock: &dyn Clock, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Gateway running: {} channel(s), poller {}",
            self.channels.len(),
            if self.poller.is_some() { "enabled" } else { "disabled" }
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.tick(clock.now()),
            }
        }

        info!("Gateway stopped after {} ticks", self.ticks);
    }
}
