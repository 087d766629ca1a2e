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

//! # Devices
//!
//! Caller-facing handle on a hardware wallet. Every request runs on its own
//! worker thread and reports back through a bounded event queue, so the
//! caller is never blocked while the user stares at the device screen.
//!

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use std::{fmt, thread};

use crossbeam::channel::{self, RecvTimeoutError, TrySendError};
use miniscript::bitcoin::{bip32, Network};
use serde::{Deserialize, Serialize};

use crate::constants::purpose;
use crate::dongle::ledger::{self, Connector, HidConnector, Session};
use crate::dongle::Dongle;
use crate::signer::{self, Progress, SignedInputs, SigningRequest};
use crate::{Config, Error, ErrorCategory};

/// Supported device families
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DeviceType {
    /// Ledger Nano S / Nano X
    Ledger,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DeviceType::Ledger => f.write_str("ledger"),
        }
    }
}

/// Identifies a connected device
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DeviceKey {
    /// USB product string
    pub product: String,
    /// Vendor name, as the device reports it
    pub vendor: String,
    /// USB manufacturer string
    pub manufacturer: String,
    /// USB serial number, used to reopen the device
    pub serial: String,
    /// Identifier of the known wallet held by this device, if any
    pub wallet_id: Option<String>,
    /// Device family
    pub device_type: DeviceType,
}

impl DeviceKey {
    /// Key of a Ledger device from its USB strings
    ///
    /// Ledger reports its company name as the manufacturer, which is also
    /// the vendor name shown to users.
    pub fn ledger(product: &str, manufacturer: &str, serial: &str) -> DeviceKey {
        DeviceKey {
            product: product.to_owned(),
            vendor: manufacturer.to_owned(),
            manufacturer: manufacturer.to_owned(),
            serial: serial.to_owned(),
            wallet_id: None,
            device_type: DeviceType::Ledger,
        }
    }

    /// Sets `wallet_id` to the known wallet whose root key is `root`
    ///
    /// Returns whether a wallet matched.
    pub fn match_wallet(&mut self, root: &bip32::Xpub, known: &HashMap<String, bip32::Xpub>) -> bool {
        self.wallet_id = known
            .iter()
            .find(|(_, xpub)| xpub.public_key == root.public_key && xpub.chain_code == root.chain_code)
            .map(|(id, _)| id.clone());
        self.wallet_id.is_some()
    }
}

/// Account-level extended public keys of a device
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct WalletInfo {
    /// Known wallet whose root key matched the device's, if any
    pub wallet_id: Option<String>,
    /// Key at `m/0'`, used to recognize the device's seed
    pub root: bip32::Xpub,
    /// Key at `m/49'/coin'/account'`
    pub nested_segwit: bip32::Xpub,
    /// Key at `m/84'/coin'/account'`
    pub native_segwit: bip32::Xpub,
    /// Key at `m/44'/coin'/account'`
    pub legacy: bip32::Xpub,
}

/// Something that happened while a request was running
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event<T> {
    /// The request moved to a new phase
    Progress(Progress),
    /// The request failed; nothing follows
    Error {
        /// What kind of failure this was
        category: ErrorCategory,
        /// Human-readable description
        detail: String,
    },
    /// The request succeeded; nothing follows
    Result(T),
}

impl<T> Event<T> {
    fn from_result(res: Result<T, Error>) -> Self {
        match res {
            Ok(t) => Event::Result(t),
            Err(e) => Event::Error {
                category: e.category(),
                detail: e.to_string(),
            },
        }
    }
}

/// Receiving end of the events of one request
#[derive(Debug)]
pub struct EventReceiver<T> {
    rx: channel::Receiver<Event<T>>,
    cancel: Arc<AtomicBool>,
}

impl<T> EventReceiver<T> {
    /// Blocks until the next event, or returns `None` once the request is
    /// over and every event has been received
    pub fn recv(&self) -> Option<Event<T>> {
        self.rx.recv().ok()
    }

    /// Like [`EventReceiver::recv`] but gives up after `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event<T>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// The underlying channel, for use with `crossbeam::select!`
    pub fn receiver(&self) -> &channel::Receiver<Event<T>> {
        &self.rx
    }

    /// Asks this request, and no other, to stop before its next device
    /// exchange
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Blocks until the request is over, passing progress events to
    /// `on_progress`
    pub fn wait<F: FnMut(Progress)>(self, mut on_progress: F) -> Result<T, (ErrorCategory, String)> {
        while let Some(event) = self.recv() {
            match event {
                Event::Progress(p) => on_progress(p),
                Event::Error { category, detail } => return Err((category, detail)),
                Event::Result(t) => return Ok(t),
            }
        }
        Err((
            ErrorCategory::InternalError,
            "worker exited without a result".to_owned(),
        ))
    }
}

/// Capabilities of a hardware wallet
pub trait HwDevice {
    /// Identity of the device
    fn key(&self) -> DeviceKey;

    /// Fetches the account-level keys of the device
    fn get_public_keys(&self, testnet: bool, account: u32) -> EventReceiver<WalletInfo>;

    /// Signs every input of a transaction
    fn sign_transaction(&self, request: SigningRequest) -> EventReceiver<SignedInputs>;

    /// Asks every request still running to stop before its next device
    /// exchange; requests made afterwards are not affected
    fn cancel(&self);
}

/// A Ledger device, reached through connector `C`
#[derive(Debug)]
pub struct LedgerDevice<C = HidConnector> {
    key: Arc<Mutex<DeviceKey>>,
    known_wallets: HashMap<String, bip32::Xpub>,
    connector: C,
    config: Config,
    /// Cancel flags of the requests that may still be running
    requests: Mutex<Vec<Weak<AtomicBool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LedgerDevice<HidConnector> {
    /// Lists the connected Ledger devices
    pub fn enumerate(config: &Config) -> Result<Vec<Self>, Error> {
        Ok(ledger::list_devices(config)?
            .into_iter()
            .map(|key| LedgerDevice::new(key, HidConnector::new(config), config.clone()))
            .collect())
    }
}

impl<C> LedgerDevice<C>
where
    C: Connector + Clone + Send + 'static,
{
    /// Constructor
    pub fn new(key: DeviceKey, connector: C, config: Config) -> Self {
        LedgerDevice {
            key: Arc::new(Mutex::new(key)),
            known_wallets: HashMap::new(),
            connector,
            config,
            requests: Mutex::new(vec![]),
        }
    }

    /// Sets the wallets, by root key at `m/0'`, that
    /// [`HwDevice::get_public_keys`] recognizes the device as
    pub fn with_known_wallets(mut self, known_wallets: HashMap<String, bip32::Xpub>) -> Self {
        self.known_wallets = known_wallets;
        self
    }

    /// Creates the cancel flag of a new request
    fn register_request(&self) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut requests = lock(&self.requests);
        requests.retain(|flag| flag.strong_count() > 0);
        requests.push(Arc::downgrade(&cancel));
        cancel
    }

    /// Runs `job` against a fresh session on a worker thread
    fn spawn<T, F>(&self, job: F) -> EventReceiver<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session<C>, &mut dyn FnMut(Progress)) -> Result<T, Error> + Send + 'static,
    {
        // a zero-capacity queue would block the worker on its first event
        let (tx, rx) = channel::bounded(self.config.event_queue_depth.max(1));
        let cancel = self.register_request();

        let connector = self.connector.clone();
        let serial = lock(&self.key).serial.clone();
        let config = self.config.clone();
        let worker_cancel = Arc::clone(&cancel);
        let worker_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("ledger-{}", serial))
            .spawn(move || {
                let res = Session::open(connector, &serial, &config, worker_cancel)
                    .and_then(|mut session| {
                        let mut notify = |p| send_progress(&worker_tx, p);
                        job(&mut session, &mut notify)
                    });
                if let Err(ref e) = res {
                    log::warn!("request on device {} failed: {}", serial, e);
                }
                if worker_tx.send(Event::from_result(res)).is_err() {
                    log::debug!("event receiver for device {} went away", serial);
                }
            });
        if let Err(e) = spawned {
            // the queue is empty and has room for this one
            let _ = tx.send(Event::from_result(Err(Error::Io(e))));
        }
        EventReceiver { rx, cancel }
    }
}

/// Delivers a progress event without ever blocking the worker
fn send_progress<T>(tx: &channel::Sender<Event<T>>, progress: Progress) {
    match tx.try_send(Event::Progress(progress)) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            log::warn!("event queue full, dropping progress event {:?}", progress);
        }
    }
}

/// Paths of the keys reported by [`HwDevice::get_public_keys`]
fn account_paths(testnet: bool, account: u32) -> Result<[bip32::DerivationPath; 4], Error> {
    let hardened = |index| {
        bip32::ChildNumber::from_hardened_idx(index)
            .map_err(|_| Error::BadDerivationPath(bip32::DerivationPath::master()))
    };
    let coin = hardened(if testnet { 1 } else { 0 })?;
    let account = hardened(account)?;
    let at = |purpose| -> Result<bip32::DerivationPath, Error> {
        Ok(bip32::DerivationPath::from(vec![hardened(purpose)?, coin, account]))
    };
    Ok([
        bip32::DerivationPath::from(vec![hardened(0)?]),
        at(purpose::NESTED_SEGWIT)?,
        at(purpose::NATIVE_SEGWIT)?,
        at(purpose::LEGACY)?,
    ])
}

impl<C> HwDevice for LedgerDevice<C>
where
    C: Connector + Clone + Send + 'static,
{
    fn key(&self) -> DeviceKey {
        lock(&self.key).clone()
    }

    fn get_public_keys(&self, testnet: bool, account: u32) -> EventReceiver<WalletInfo> {
        let network = if testnet {
            Network::Testnet
        } else {
            Network::Bitcoin
        };
        let key = Arc::clone(&self.key);
        let known_wallets = self.known_wallets.clone();
        self.spawn(move |session, notify| {
            let [root, nested, native, legacy] = account_paths(testnet, account)?;
            log::info!("fetching account {} keys (testnet: {})", account, testnet);
            let root = session.get_node_with_fingerprint(network, &root)?;
            let wallet_id = {
                let mut key = lock(&key);
                if key.match_wallet(&root, &known_wallets) {
                    log::info!("device {} holds wallet {:?}", key.serial, key.wallet_id);
                }
                key.wallet_id.clone()
            };
            let info = WalletInfo {
                wallet_id,
                root,
                nested_segwit: session.get_node_with_fingerprint(network, &nested)?,
                native_segwit: session.get_node_with_fingerprint(network, &native)?,
                legacy: session.get_node_with_fingerprint(network, &legacy)?,
            };
            notify(Progress::Finished);
            Ok(info)
        })
    }

    fn sign_transaction(&self, request: SigningRequest) -> EventReceiver<SignedInputs> {
        // Reject bad requests before touching the device
        if let Err(e) = request.validate() {
            let (tx, rx) = channel::bounded(1);
            let _ = tx.send(Event::from_result(Err(e)));
            return EventReceiver {
                rx,
                cancel: self.register_request(),
            };
        }
        self.spawn(move |session, notify| signer::sign(session, &request, notify))
    }

    fn cancel(&self) {
        let requests = lock(&self.requests);
        log::info!("cancelling requests on device {}", lock(&self.key).serial);
        for flag in requests.iter().filter_map(Weak::upgrade) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
