use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use log::warn;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd::{access, AccessFlags};

/// A byte-oriented duplex handle to the inverter. Reads never block, waiting
/// for data only happens through `wait_readable` with an explicit bound.
pub trait Device {
    /// Returns `Ok(false)` when nothing became readable within `timeout`.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Reads whatever is pending, `Ok(0)` if nothing is.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Acquires a device for the duration of one transaction.
pub trait DeviceOpener {
    type Device: Device;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

/// USB HID character device (`/dev/hidrawN`) opened read/write and non-blocking.
#[derive(Debug)]
pub struct HidrawDevice {
    file: File,
}

impl HidrawDevice {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)?;
        Ok(Self { file })
    }

    /// Wraps an already opened descriptor, which must be in non-blocking mode.
    pub fn from_file(file: File) -> Self {
        Self { file }
    }
}

fn poll_timeout(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

impl Device for HidrawDevice {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [PollFd::new(&self.file, PollFlags::POLLIN)];
        let ready = poll(&mut fds, poll_timeout(timeout))?;
        Ok(ready > 0)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Ok(read) => Ok(read),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HidrawOpener;

impl DeviceOpener for HidrawOpener {
    type Device = HidrawDevice;

    fn open(&self, path: &Path) -> io::Result<HidrawDevice> {
        HidrawDevice::open(path)
    }
}

/// The device counts as present once its path exists. Missing permissions are
/// reported but do not make it absent, opening will fail loudly later on.
pub fn is_present(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    if let Err(e) = access(path, AccessFlags::R_OK | AccessFlags::W_OK) {
        warn!("Device {} not accessible: {e}", path.display());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    fn device_pair() -> (HidrawDevice, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        let file = File::from(OwnedFd::from(ours));
        (HidrawDevice::from_file(file), theirs)
    }

    #[test]
    fn silent_device_times_out() {
        let (mut device, _peer) = device_pair();
        let started = Instant::now();
        assert!(!device.wait_readable(Duration::from_millis(50)).unwrap());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn read_without_pending_data_returns_zero() {
        let (mut device, _peer) = device_pair();
        let mut buf = [0u8; 16];
        assert_eq!(device.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn pending_data_is_readable() {
        let (mut device, mut peer) = device_pair();
        peer.write_all(b"(230.0 50.0").unwrap();

        assert!(device.wait_readable(Duration::from_millis(500)).unwrap());
        let mut buf = [0u8; 64];
        let read = device.read_available(&mut buf).unwrap();
        assert_eq!(&buf[..read], b"(230.0 50.0");
    }

    #[test]
    fn writes_reach_the_peer() {
        let (mut device, mut peer) = device_pair();
        device.write_all(b"QPIGS\xb7\xa9\r").unwrap();

        let mut buf = [0u8; 8];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"QPIGS\xb7\xa9\r");
    }

    #[test]
    fn opening_missing_device_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = HidrawOpener.open(&dir.path().join("hidraw9")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn presence_follows_the_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(is_present(file.path()));
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!is_present(&path));
    }
}
