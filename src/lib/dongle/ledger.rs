// Nanosign
// Written in 2026 by
//   The Nanosign developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # Ledger Dongle
//!
//! Specific support for Ledger-branded dongles over HID
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::constants::apdu::ledger::PACKET_SIZE;
use crate::device::DeviceKey;
use crate::dongle::chunk::{self, Frame};
use crate::dongle::message::Apdu;
use crate::dongle::{check_status, Dongle};
use crate::{hid, Config, Error};

/// Serializes access to the HID bus across every session in the process
static BUS_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_bus() -> MutexGuard<'static, ()> {
    // A panicking holder cannot leave the bus in a state we care about
    BUS_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Raw HID read/write primitives of an open device
pub trait HidTransport {
    /// Writes one report, returning the number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Reads at most `buf.len()` bytes, returning 0 on timeout
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error>;
}

/// Something which can open a device by serial number
pub trait Connector {
    /// The open device
    type Transport: HidTransport;

    /// Opens the device with the given serial number
    fn connect(&mut self, serial: &str) -> Result<Self::Transport, Error>;
}

/// Filter used to recognize the APDU interface of a Ledger device
#[derive(Clone, Debug, PartialEq, Eq)]
struct DeviceFilter {
    vendor_ids: Vec<u16>,
    interface_number: i32,
    usage_page: u16,
}

impl DeviceFilter {
    fn new(config: &Config) -> Self {
        DeviceFilter {
            vendor_ids: config.vendor_ids.clone(),
            interface_number: config.interface_number,
            usage_page: config.usage_page,
        }
    }

    fn matches(&self, info: &hidapi::DeviceInfo) -> bool {
        self.vendor_ids.contains(&info.vendor_id())
            && (info.interface_number() == self.interface_number
                || info.usage_page() == self.usage_page)
    }
}

/// Opens devices through `hidapi`
///
/// A fresh [`hid::Api`] is created for every open and released with the
/// device, so that no library state outlives a session.
#[derive(Clone, Debug)]
pub struct HidConnector {
    filter: DeviceFilter,
}

impl HidConnector {
    /// Constructor
    pub fn new(config: &Config) -> Self {
        HidConnector {
            filter: DeviceFilter::new(config),
        }
    }
}

/// An open HID device
pub struct HidDevice {
    // Dropped before the API handle
    device: hid::Device,
    _api: hid::Api,
}

impl HidTransport for HidDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        Ok(self.device.write(data)?)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        Ok(self.device.read_timeout(buf, millis)?)
    }
}

impl Connector for HidConnector {
    type Transport = HidDevice;

    fn connect(&mut self, serial: &str) -> Result<HidDevice, Error> {
        let api = hid::Api::new()?;
        let info = api
            .device_list()
            .find(|info| self.filter.matches(info) && info.serial_number() == Some(serial))
            .ok_or_else(|| Error::DongleNotFound(serial.to_owned()))?;
        let device = info.open_device(&api)?;
        Ok(HidDevice { device, _api: api })
    }
}

/// Enumerates the connected Ledger devices
pub fn list_devices(config: &Config) -> Result<Vec<DeviceKey>, Error> {
    let _guard = lock_bus();
    let filter = DeviceFilter::new(config);
    let api = hid::Api::new()?;
    let mut ret: Vec<DeviceKey> = vec![];
    for info in api.device_list().filter(|info| filter.matches(info)) {
        let serial = match info.serial_number() {
            Some(serial) => serial.to_owned(),
            None => continue,
        };
        // macOS lists the same device once per interface
        if ret.iter().any(|key| key.serial == serial) {
            continue;
        }
        ret.push(DeviceKey::ledger(
            info.product_string().unwrap_or_default(),
            info.manufacturer_string().unwrap_or_default(),
            &serial,
        ));
    }
    log::debug!("found {} ledger device(s)", ret.len());
    Ok(ret)
}

/// Structure representing an open session with the device
///
/// The session owns the bus lock from open to drop, so at most one session
/// talks to the hardware at a time.
pub struct Session<C: Connector> {
    connector: C,
    serial: String,
    transport: Option<C::Transport>,
    read_timeout: Duration,
    sentinel: u16,
    reopen_budget: u32,
    reopens_left: u32,
    cancel: Arc<AtomicBool>,
    // Released last
    _guard: MutexGuard<'static, ()>,
}

impl<C: Connector> Session<C> {
    /// Takes the bus lock and opens the device with serial number `serial`
    pub fn open(
        mut connector: C,
        serial: &str,
        config: &Config,
        cancel: Arc<AtomicBool>,
    ) -> Result<Session<C>, Error> {
        let guard = lock_bus();
        let transport = connector.connect(serial)?;
        log::info!("opened device {}", serial);
        Ok(Session {
            connector,
            serial: serial.to_owned(),
            transport: Some(transport),
            read_timeout: config.read_timeout(),
            sentinel: config.sequence_sentinel,
            reopen_budget: config.reopen_budget,
            reopens_left: config.reopen_budget,
            cancel,
            _guard: guard,
        })
    }

    /// Number of reopens still available to recover from the sequence sentinel
    pub fn reopens_left(&self) -> u32 {
        self.reopens_left
    }

    /// Closes and reopens the device, keeping the bus lock
    fn reopen(&mut self) -> Result<(), Error> {
        self.transport = None;
        self.transport = Some(self.connector.connect(&self.serial)?);
        log::info!("reopened device {}", self.serial);
        Ok(())
    }

    /// Write a message encoded as a APDU to the Ledger device
    fn write_apdu(&mut self, data: &[u8]) -> Result<(), Error> {
        let transport = self.transport.as_mut().ok_or(Error::SessionClosed)?;
        for frame in chunk::encode_chunks(data)? {
            let report = chunk::with_report_id(&frame);
            let written = transport.write(&report)?;
            if written == 0 {
                return Err(Error::ShortWrite {
                    written,
                    expected: report.len(),
                });
            }
        }
        Ok(())
    }

    /// Read a message encoded as a APDU from the Ledger device
    fn read_apdu(&mut self) -> Result<(u16, Vec<u8>), Error> {
        let timeout = self.read_timeout;
        let transport = self.transport.as_mut().ok_or(Error::SessionClosed)?;
        chunk::decode_response(|| read_frame(transport, timeout))
    }
}

/// Reads one full frame
fn read_frame<T: HidTransport>(transport: &mut T, timeout: Duration) -> Result<Frame, Error> {
    let mut frame = [0u8; PACKET_SIZE];
    let mut frame_ptr = &mut frame[..];
    while !frame_ptr.is_empty() {
        let n_read_bytes = transport.read_timeout(frame_ptr, timeout)?;
        if n_read_bytes == 0 {
            return Err(Error::Timeout);
        }
        frame_ptr = &mut frame_ptr[n_read_bytes..];
    }
    Ok(frame)
}

impl<C: Connector> Dongle for Session<C> {
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>, Error> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let data = apdu.encode();
        log::debug!("=> {}", hex::encode(&data));
        loop {
            self.write_apdu(&data)?;
            match self.read_apdu() {
                Ok((status, reply)) => {
                    log::debug!("<= {} {:04x}", hex::encode(&reply), status);
                    check_status(apdu, status)?;
                    return Ok(reply);
                }
                // Some firmware reports a bogus sequence number on the first
                // frame; the only known remedy is to reconnect and resend.
                Err(Error::ApduWrongSequence { expected: 0, found }) if found == self.sentinel => {
                    if self.reopens_left == 0 {
                        return Err(Error::SequenceRetriesExhausted(self.reopen_budget));
                    }
                    self.reopens_left -= 1;
                    log::warn!(
                        "device sent sequence number {:04x} in reply to {}, reopening ({} retries left)",
                        found,
                        apdu.ins,
                        self.reopens_left
                    );
                    self.reopen()?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if self.transport.take().is_some() {
            log::info!("closed device {}", self.serial);
        }
    }
}
