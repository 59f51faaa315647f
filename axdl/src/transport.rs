//! Bulk Transport: open/close a USB interface, write/read the bulk
//! OUT/IN endpoints with timeouts.

use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use rusb::{DeviceHandle, GlobalContext};

use crate::error::{Error, Result};

/// Interface and alternate setting the BSL exposes.
const INTERFACE: u8 = 0;
const ALT_SETTING: u8 = 0;
/// Bulk OUT / IN endpoint addresses. The device does not vary these, so
/// they are a defaulted configuration knob rather than something probed
/// for at runtime.
const ENDPOINT_OUT: u8 = 0x01;
const ENDPOINT_IN: u8 = 0x81;

/// Default USB vendor ID for BSL devices, overridable by the caller.
pub const DEFAULT_VID: u16 = 0x32C9;
/// Default USB product ID for BSL devices, overridable by the caller.
pub const DEFAULT_PID: u16 = 0x1000;

const OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// A bidirectional bulk channel: write bytes out, read bytes in with a
/// timeout. [`BulkTransport`] is the production implementation over
/// `rusb`; the command client and protocol drivers above it are written
/// against this trait so they can be exercised against an in-memory fake
/// in tests instead of real silicon.
pub trait Transport {
    /// Write `bytes` out. Must not return until the write is accepted or
    /// has failed.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read up to `max_bytes`, waiting at most `timeout_ms`. Returns an
    /// empty buffer on timeout rather than an error.
    fn read(&mut self, max_bytes: usize, timeout_ms: u64) -> Result<Vec<u8>>;
}

/// Owns the USB bulk channel to a BSL device.
///
/// Exactly one request may be outstanding at a time: every `write` is
/// expected to be followed by a `read` for its reply before the next
/// `write`. The transport itself does not enforce this — the command
/// client built on top of it does, by construction.
#[derive(Default)]
pub struct BulkTransport {
    handle: Option<DeviceHandle<GlobalContext>>,
    kernel_driver_detached: bool,
}

impl BulkTransport {
    /// Create an unopened transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the first device matching `(vid, pid)`, trying up to
    /// `retries` times total at one-second spacing if no matching device
    /// is present yet or a transient USB error occurs.
    pub fn open(&mut self, vid: u16, pid: u16, retries: u32) -> Result<()> {
        let mut last_error = Error::UsbIo(rusb::Error::NoDevice);

        for attempt in 0..retries {
            match Self::try_claim(vid, pid) {
                Ok((handle, detached)) => {
                    debug!("opened USB device {vid:#06x}:{pid:#06x} on attempt {}", attempt + 1);
                    self.handle = Some(handle);
                    self.kernel_driver_detached = detached;
                    return Ok(());
                },
                Err(e) => {
                    last_error = e;
                    if attempt + 1 < retries {
                        debug!(
                            "device {vid:#06x}:{pid:#06x} not ready ({last_error}), retrying ({}/{retries})",
                            attempt + 1
                        );
                        thread::sleep(OPEN_RETRY_DELAY);
                    }
                },
            }
        }

        Err(last_error)
    }

    /// One attempt at locating, claiming, and configuring the device.
    /// Transient USB errors (device not yet enumerated, interface busy)
    /// are returned rather than panicking, so the caller can retry.
    fn try_claim(vid: u16, pid: u16) -> Result<(DeviceHandle<GlobalContext>, bool)> {
        let mut handle = rusb::open_device_with_vid_pid(vid, pid).ok_or(Error::UsbIo(rusb::Error::NoDevice))?;

        let detached = match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                handle.detach_kernel_driver(INTERFACE)?;
                true
            },
            _ => false,
        };

        handle.claim_interface(INTERFACE)?;
        handle.set_alternate_setting(INTERFACE, ALT_SETTING)?;

        if let Err(e) = Self::verify_bulk_endpoints(&handle) {
            let _ = handle.release_interface(INTERFACE);
            if detached {
                let _ = handle.attach_kernel_driver(INTERFACE);
            }
            return Err(e);
        }

        Ok((handle, detached))
    }

    /// Confirm the claimed interface/alt-setting actually exposes bulk
    /// OUT `0x01` and bulk IN `0x81`. The device does not vary these
    /// addresses, so this checks the two fixed addresses rather than
    /// scanning for whatever endpoints happen to be present — a device
    /// wearing the expected VID/PID but the wrong interface or firmware
    /// must fail here, not on the first `write_bulk`/`read_bulk` call.
    fn verify_bulk_endpoints(handle: &DeviceHandle<GlobalContext>) -> Result<()> {
        let config = handle.device().active_config_descriptor()?;
        let interface = config
            .interfaces()
            .find(|i| i.number() == INTERFACE)
            .ok_or(Error::UsbIo(rusb::Error::NotFound))?;
        let alt_setting = interface
            .descriptors()
            .find(|d| d.setting_number() == ALT_SETTING)
            .ok_or(Error::UsbIo(rusb::Error::NotFound))?;

        let addresses: Vec<u8> = alt_setting.endpoint_descriptors().map(|e| e.address()).collect();
        if !addresses.contains(&ENDPOINT_OUT) {
            return Err(Error::MissingEndpoint(ENDPOINT_OUT));
        }
        if !addresses.contains(&ENDPOINT_IN) {
            return Err(Error::MissingEndpoint(ENDPOINT_IN));
        }
        Ok(())
    }

    /// Close the transport. Idempotent; reattaches the kernel driver if
    /// it was detached on open.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let _ = handle.release_interface(INTERFACE);
        if self.kernel_driver_detached {
            let _ = handle.attach_kernel_driver(INTERFACE);
        }
        self.kernel_driver_detached = false;
        Ok(())
    }

    /// Write `bytes` to the bulk OUT endpoint.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(Error::NotOpen)?;
        trace!("write {} bytes", bytes.len());
        handle.write_bulk(ENDPOINT_OUT, bytes, WRITE_TIMEOUT)?;
        Ok(())
    }

    /// Read up to `max_bytes` from the bulk IN endpoint, waiting at most
    /// `timeout_ms`. Returns an empty buffer on timeout rather than an
    /// error.
    pub fn read(&mut self, max_bytes: usize, timeout_ms: u64) -> Result<Vec<u8>> {
        let handle = self.handle.as_mut().ok_or(Error::NotOpen)?;
        let mut buf = vec![0u8; max_bytes];
        match handle.read_bulk(ENDPOINT_IN, &mut buf, Duration::from_millis(timeout_ms)) {
            Ok(n) => {
                trace!("read {n} bytes");
                buf.truncate(n);
                Ok(buf)
            },
            Err(rusb::Error::Timeout) => {
                warn!("read timed out after {timeout_ms}ms");
                Ok(Vec::new())
            },
            Err(e) => Err(Error::UsbIo(e)),
        }
    }

    /// Whether the transport currently holds an open handle.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl Transport for BulkTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        Self::write(self, bytes)
    }

    fn read(&mut self, max_bytes: usize, timeout_ms: u64) -> Result<Vec<u8>> {
        Self::read(self, max_bytes, timeout_ms)
    }
}

impl Drop for BulkTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}


/// A scripted in-memory [`Transport`] for exercising the command client
/// and the protocol drivers above it without real hardware. Replies are
/// queued up front; `write` just records what was sent for later
/// assertions.
#[cfg(test)]
pub(crate) mod fake {
    use super::Transport;
    use crate::error::Result;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub(crate) writes: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a reply returned by the next call to `read`.
        pub(crate) fn push_reply(&mut self, bytes: Vec<u8>) -> &mut Self {
            self.replies.push_back(bytes);
            self
        }
    }

    impl Transport for FakeTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn read(&mut self, _max_bytes: usize, _timeout_ms: u64) -> Result<Vec<u8>> {
            Ok(self.replies.pop_front().unwrap_or_default())
        }
    }
}
