use std::time::Duration;

use log::debug;
use serde_derive::Deserialize;

use crate::clock::Clock;
use crate::device::Device;
use crate::error::{NoResponseCause, ProtocolError};
use crate::protocol::{hex, Command};

/// Bounds of one request/response cycle. Responses carry no length field, so a
/// response is considered complete once `complete_len` bytes arrived, the
/// device stayed idle for `accumulate_timeout_ms`, or `max_attempts` reads
/// were made. Worst case a transaction takes
/// `flush_timeout + response_timeout + max_attempts * (pause + accumulate_timeout)`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransactionConfig {
    pub flush_timeout_ms: u64,
    pub flush_chunk: usize,
    pub response_timeout_ms: u64,
    pub response_chunk: usize,
    pub accumulate_timeout_ms: u64,
    pub accumulate_pause_ms: u64,
    pub accumulate_chunk: usize,
    pub complete_len: usize,
    pub max_attempts: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            flush_timeout_ms: 100,
            flush_chunk: 200,
            response_timeout_ms: 3_000,
            response_chunk: 200,
            accumulate_timeout_ms: 2_000,
            accumulate_pause_ms: 100,
            accumulate_chunk: 1_000,
            complete_len: 300,
            max_attempts: 30,
        }
    }
}

impl TransactionConfig {
    fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    fn accumulate_timeout(&self) -> Duration {
        Duration::from_millis(self.accumulate_timeout_ms)
    }

    fn accumulate_pause(&self) -> Duration {
        Duration::from_millis(self.accumulate_pause_ms)
    }
}

fn read_into<D: Device>(
    device: &mut D,
    chunk: usize,
    response: &mut Vec<u8>,
) -> Result<usize, ProtocolError> {
    let mut buf = vec![0u8; chunk];
    let read = device.read_available(&mut buf).map_err(ProtocolError::io)?;
    response.extend_from_slice(&buf[..read]);
    Ok(read)
}

// Stale bytes from an earlier, unrelated exchange. Best effort only.
fn flush<D: Device>(device: &mut D, config: &TransactionConfig) {
    match device.wait_readable(config.flush_timeout()) {
        Ok(true) => {
            let mut buf = vec![0u8; config.flush_chunk];
            match device.read_available(&mut buf) {
                Ok(read) => debug!("Cleared {read} bytes of pending data"),
                Err(e) => debug!("Clearing pending data failed: {e}"),
            }
        }
        Ok(false) => {}
        Err(e) => debug!("Polling for pending data failed: {e}"),
    }
}

/// Runs one request/response cycle against `device` and returns the raw bytes
/// received. The device is consumed and released when this returns, whatever
/// the outcome.
pub fn transact<D: Device, C: Clock>(
    mut device: D,
    clock: &C,
    command: &Command,
    config: &TransactionConfig,
) -> Result<Vec<u8>, ProtocolError> {
    flush(&mut device, config);

    let request = command.framed();
    debug!("Sending {command} command: {}", hex(&request));
    device.write_all(&request).map_err(ProtocolError::io)?;

    debug!("Waiting for response...");
    if !device
        .wait_readable(config.response_timeout())
        .map_err(ProtocolError::io)?
    {
        return Err(NoResponseCause::Timeout(config.response_timeout().as_millis()).into());
    }

    let mut response = Vec::with_capacity(config.complete_len);
    read_into(&mut device, config.response_chunk, &mut response)?;
    debug!("Received response: {} bytes", response.len());

    let mut attempts = 0;
    while response.len() < config.complete_len && attempts < config.max_attempts {
        attempts += 1;
        clock.sleep(config.accumulate_pause());
        if !device
            .wait_readable(config.accumulate_timeout())
            .map_err(ProtocolError::io)?
        {
            debug!("Device idle after {attempts} attempts");
            break;
        }
        let read = read_into(&mut device, config.accumulate_chunk, &mut response)?;
        if read == 0 {
            debug!("No more data available");
            break;
        }
        debug!("Read additional {read} bytes, total: {}", response.len());
    }

    debug!("Complete response ({} bytes): {}", response.len(), hex(&response));
    Ok(response)
}
