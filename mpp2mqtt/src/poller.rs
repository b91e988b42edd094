use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_derive::Deserialize;

use crate::clock::Clock;
use crate::device::{self, DeviceOpener};
use crate::error::ProtocolError;
use crate::inverter::Inverter;
use crate::metric_collector::{Availability, MetricCollector};

/// Longest uninterrupted sleep, bounds how late a shutdown request is noticed.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    /// Consecutive failures tolerated before checking whether the device is gone.
    pub failure_threshold: u32,
    pub device_wait_attempts: u32,
    pub device_wait_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            failure_threshold: 5,
            device_wait_attempts: 30,
            device_wait_interval_secs: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    AwaitingDevice,
    Connected,
    Polling,
    Degraded,
    ShuttingDown,
}

pub struct Poller<O: DeviceOpener, C: Clock> {
    inverter: Inverter<O, C>,
    config: PollerConfig,
    state: PollState,
    failures: u32,
}

impl<O: DeviceOpener, C: Clock> Poller<O, C> {
    pub fn new(inverter: Inverter<O, C>, config: PollerConfig) -> Self {
        Self {
            inverter,
            config,
            state: PollState::AwaitingDevice,
            failures: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns true if the sleep was cut short by a shutdown request.
    fn pause(&self, duration: Duration, shutdown: &AtomicBool) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if shutdown.load(Ordering::Relaxed) {
                return true;
            }
            let step = remaining.min(SLEEP_SLICE);
            self.inverter.clock().sleep(step);
            remaining -= step;
        }
        shutdown.load(Ordering::Relaxed)
    }

    fn wait_for_device(&self, shutdown: &AtomicBool) -> bool {
        let path = self.inverter.path();
        let interval = Duration::from_secs(self.config.device_wait_interval_secs);
        for attempt in 0..self.config.device_wait_attempts {
            if device::is_present(path) {
                info!("Device {} found", path.display());
                return true;
            }
            if attempt == 0 {
                info!("Waiting for device {}...", path.display());
            }
            if self.pause(interval, shutdown) {
                return false;
            }
        }
        error!(
            "Device {} not found after {} attempts",
            path.display(),
            self.config.device_wait_attempts
        );
        false
    }

    /// Runs one poll and hands a successful reading to every collector.
    pub fn tick(&mut self, collectors: &mut [Box<dyn MetricCollector>]) {
        debug!("Reading inverter data...");
        match self.inverter.update_state() {
            Ok(telemetry) => {
                self.failures = 0;
                self.state = PollState::Polling;
                let captured_at = self.inverter.clock().now();
                collectors
                    .iter_mut()
                    .for_each(|collector| collector.publish(&telemetry, &captured_at));
                info!("Published: {}", telemetry.summary());
            }
            Err(e) => {
                self.failures += 1;
                self.state = PollState::Degraded;
                warn!("No data from inverter: {e} (error count: {})", self.failures);

                if self.failures > self.config.failure_threshold
                    && !device::is_present(self.inverter.path())
                {
                    error!("Device disappeared, waiting for reconnection...");
                    self.state = PollState::AwaitingDevice;
                }
            }
        }
    }

    /// Polls until shutdown is requested or the device is gone for good.
    pub fn run(
        &mut self,
        collectors: &mut [Box<dyn MetricCollector>],
        shutdown: &AtomicBool,
    ) -> Result<(), ProtocolError> {
        let interval = Duration::from_secs(self.config.interval_secs);
        loop {
            if shutdown.load(Ordering::Relaxed) {
                self.state = PollState::ShuttingDown;
            }

            match self.state {
                PollState::AwaitingDevice => {
                    if self.wait_for_device(shutdown) {
                        self.state = PollState::Connected;
                    } else if !shutdown.load(Ordering::Relaxed) {
                        return Err(ProtocolError::DeviceDisappeared(
                            self.inverter.path().to_path_buf(),
                        ));
                    }
                }
                PollState::Connected => {
                    self.failures = 0;
                    collectors
                        .iter_mut()
                        .for_each(|collector| collector.set_availability(Availability::Online));
                    self.state = PollState::Polling;
                }
                PollState::Polling | PollState::Degraded => {
                    self.tick(collectors);
                    if self.state != PollState::AwaitingDevice {
                        self.pause(interval, shutdown);
                    }
                }
                PollState::ShuttingDown => {
                    info!("Shutting down...");
                    collectors
                        .iter_mut()
                        .for_each(|collector| collector.set_availability(Availability::Offline));
                    return Ok(());
                }
            }
        }
    }
}
