use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::device::{DeviceOpener, HidrawOpener};
use crate::error::ProtocolError;
use crate::frame;
use crate::protocol::Command;
use crate::telemetry::{self, Telemetry};
use crate::transaction::{transact, TransactionConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

/// Everything one poll needs: where the device lives, what to ask it, how
/// long to wait, and how to open it. Built once at start-up.
pub struct Inverter<O: DeviceOpener = HidrawOpener, C: Clock = SystemClock> {
    path: PathBuf,
    command: Command,
    config: TransactionConfig,
    opener: O,
    clock: C,
    state: NetworkState,
}

impl Inverter {
    pub fn new(path: impl Into<PathBuf>, config: TransactionConfig) -> Self {
        Self::with_parts(path, config, HidrawOpener, SystemClock)
    }
}

impl<O: DeviceOpener, C: Clock> Inverter<O, C> {
    pub fn with_parts(
        path: impl Into<PathBuf>,
        config: TransactionConfig,
        opener: O,
        clock: C,
    ) -> Self {
        Self {
            path: path.into(),
            command: Command::general_status(),
            config,
            opener,
            clock,
            state: NetworkState::Unknown,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    fn set_state(&mut self, new_state: NetworkState) {
        if self.state != new_state {
            self.state = new_state;
            info!("Inverter is {new_state:?}");
        }
    }

    fn read_telemetry(&self) -> Result<Telemetry, ProtocolError> {
        debug!("Opening device {}", self.path.display());
        let device = self.opener.open(&self.path).map_err(ProtocolError::io)?;
        let raw = transact(device, &self.clock, &self.command, &self.config)?;
        let fields = frame::decode(&raw)?;
        telemetry::parse(&fields)
    }

    /// One poll: transaction, frame decoding and field mapping.
    pub fn update_state(&mut self) -> Result<Telemetry, ProtocolError> {
        let result = self.read_telemetry();
        match &result {
            Ok(_) => self.set_state(NetworkState::Online),
            Err(_) => self.set_state(NetworkState::Offline),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoResponseCause;
    use crate::transaction::tests::{data, CountingClock, ScriptedDevice, IDLE};
    use std::cell::RefCell;
    use std::io;

    struct OnceOpener(RefCell<Option<ScriptedDevice>>);

    impl DeviceOpener for OnceOpener {
        type Device = ScriptedDevice;

        fn open(&self, _path: &Path) -> io::Result<ScriptedDevice> {
            self.0
                .borrow_mut()
                .take()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn inverter(device: Option<ScriptedDevice>) -> Inverter<OnceOpener, CountingClock> {
        Inverter::with_parts(
            "/dev/hidraw0",
            TransactionConfig::default(),
            OnceOpener(RefCell::new(device)),
            CountingClock::default(),
        )
    }

    const RESPONSE: &[u8] =
        b"(217.0 50.0 230.0 50.0 0367 0400 012 361 52.4 010 090 035 005 259 54.0 00 000 00101000\r";

    #[test]
    fn successful_poll_goes_online() {
        let mut inverter = inverter(Some(ScriptedDevice::new(vec![IDLE, data(RESPONSE), IDLE])));
        assert_eq!(inverter.state(), NetworkState::Unknown);

        let telemetry = inverter.update_state().unwrap();
        assert_eq!(telemetry.ac_output_power, 367);
        assert_eq!(telemetry.battery_capacity, 90);
        assert_eq!(telemetry.pv_input_power, 1240);
        assert_eq!(inverter.state(), NetworkState::Online);
    }

    #[test]
    fn missing_device_is_no_response() {
        let mut inverter = inverter(None);
        let err = inverter.update_state().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::NoResponse(NoResponseCause::DeviceNotFound)
        ));
        assert_eq!(inverter.state(), NetworkState::Offline);
    }

    #[test]
    fn garbage_response_is_malformed() {
        let device = ScriptedDevice::new(vec![IDLE, data(b"NAKss\r"), IDLE]);
        let mut inverter = inverter(Some(device));
        assert!(matches!(
            inverter.update_state(),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
