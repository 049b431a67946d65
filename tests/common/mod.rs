#![allow(dead_code)]

use inverter_bridge::prelude::*;
use inverter_bridge::voltronic::channel::{DeviceChannel, ReadSettings};
use inverter_bridge::voltronic::device::Device;

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the mock inverter does when it receives a command.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Swallows the command, the read times out.
    Silent,
    /// Queues these bytes for reading.
    Bytes(Vec<u8>),
    /// The next read fails with an I/O error.
    ReadFault,
    /// The write itself fails.
    WriteFault,
    /// The write would block and is dropped.
    WouldBlock,
}

#[derive(Default, Debug)]
pub struct MockState {
    pub open: bool,
    pub opens: u32,
    pub closes: u32,
    pub fail_open: bool,
    pub written: Vec<Vec<u8>>,
    pub pending: VecDeque<u8>,
    pub read_fault: bool,
    pub scripts: HashMap<String, VecDeque<Reply>>,
    pub defaults: HashMap<String, Reply>,
}

impl MockState {
    pub fn written_mnemonics(&self) -> Vec<String> {
        self.written.iter().map(|w| mnemonic_of(w)).collect()
    }
}

fn mnemonic_of(frame: &[u8]) -> String {
    String::from_utf8_lossy(&frame[..frame.len().saturating_sub(3)]).into_owned()
}

/// A fake hidraw node. The state is shared so tests can script and inspect
/// it after the device has been moved into a channel.
#[derive(Clone, Default)]
pub struct MockDevice {
    pub state: Arc<Mutex<MockState>>,
    path: PathBuf,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            path: PathBuf::from("/dev/hidraw-mock"),
        }
    }

    /// Replies for successive sends of `mnemonic`; once used up, the default
    /// for that mnemonic (or silence) applies.
    pub fn script(&self, mnemonic: &str, replies: Vec<Reply>) -> &Self {
        self.state()
            .scripts
            .entry(mnemonic.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn always(&self, mnemonic: &str, reply: Reply) -> &Self {
        self.state().defaults.insert(mnemonic.to_string(), reply);
        self
    }

    /// Bytes already sitting in the device before anything is sent.
    pub fn preload(&self, bytes: &[u8]) -> &Self {
        self.state().pending.extend(bytes);
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Device for MockDevice {
    fn open(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        if !state.open {
            state.open = true;
            state.opens += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if !state.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device is not open"));
        }
        if state.read_fault {
            state.read_fault = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
        }
        if state.pending.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }

        let n = buf.len().min(8).min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if !state.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device is not open"));
        }

        let mnemonic = mnemonic_of(buf);
        let scripted = state
            .scripts
            .get_mut(&mnemonic)
            .and_then(|queue| queue.pop_front());
        let reply = scripted
            .or_else(|| state.defaults.get(&mnemonic).cloned())
            .unwrap_or(Reply::Silent);

        match reply {
            Reply::Silent => {}
            Reply::Bytes(bytes) => state.pending.extend(bytes),
            Reply::ReadFault => state.read_fault = true,
            Reply::WriteFault => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"))
            }
            Reply::WouldBlock => return Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }

        state.written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Factory();
impl Factory {
    pub const STATUS_REPLY: &'static str = "(230.0 50.0 230.0 50.0 0 0 000 400.0 51.2 010 100 035 005.2 072.0 51.0 000 00000000 00 00 00000 00\r";

    pub fn status_reply() -> Reply {
        Reply::Bytes(Self::STATUS_REPLY.as_bytes().to_vec())
    }

    // QMOD answers carry their own CRC before the \r
    pub fn mode_reply(code: u8) -> Reply {
        Reply::Bytes(vec![b'(', code, 0x06, 0x07, b'\r'])
    }

    pub fn fast_settings() -> ReadSettings {
        ReadSettings {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn channel(device: &MockDevice) -> DeviceChannel<MockDevice> {
        DeviceChannel::new(device.clone(), Self::fast_settings())
    }

    pub fn config() -> Config {
        let mut config = Config::default();
        config.poll.interval_secs = 0;
        config.device.read_timeout_ms = Some(30);
        config.device.poll_interval_ms = Some(1);
        config
    }
}
