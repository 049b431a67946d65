use crate::error::{DeviceError, ReadError};
use crate::voltronic::device::Device;
use crate::voltronic::frame::{self, CommandFrame, FRAME_START};
use crate::voltronic::mode::{self, OperatingMode};

use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::ops::Range;
use std::time::{Duration, Instant};

/// hidraw hands replies back in 8 byte reports.
pub const READ_CHUNK: usize = 8;

// upper bound on reads per flush, so a chattering device can't stall us
const MAX_FLUSH_READS: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(20),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub timeouts: u64,
    pub resends: u64,
    pub reopens: u64,
    pub bytes_flushed: u64,
}

// why one send_and_read attempt failed; picks the next retry tier
#[derive(Debug)]
enum Failure {
    Device(DeviceError),
    Read(ReadError),
}

impl Failure {
    // a broken descriptor won't be fixed by resending on it
    fn is_descriptor_fault(&self) -> bool {
        matches!(self, Failure::Device(_) | Failure::Read(ReadError::Io(_)))
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Device(e) => write!(f, "{}", e),
            Failure::Read(e) => write!(f, "{}", e),
        }
    }
}

impl From<DeviceError> for Failure {
    fn from(e: DeviceError) -> Self {
        Failure::Device(e)
    }
}

impl From<ReadError> for Failure {
    fn from(e: ReadError) -> Self {
        Failure::Read(e)
    }
}

/// Owns the device descriptor and implements the request/response discipline
/// on top of it: flush before send, poll reads with a deadline, and the
/// resend → reopen → give up retry ladder.
pub struct DeviceChannel<D: Device> {
    device: D,
    settings: ReadSettings,
    stats: ChannelStats,
}

impl<D: Device> DeviceChannel<D> {
    pub fn new(device: D, settings: ReadSettings) -> Self {
        Self {
            device,
            settings,
            stats: ChannelStats::default(),
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    /// Opens the device unless it already is.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        if self.device.is_open() {
            return Ok(());
        }

        self.device.open().map_err(|source| {
            error!("unable to open {}: {}", self.device.path().display(), source);
            DeviceError::Open {
                path: self.device.path().to_path_buf(),
                source,
            }
        })
    }

    pub fn close(&mut self) {
        self.device.close();
    }

    pub fn reopen(&mut self) -> Result<(), DeviceError> {
        info!("reopening {}", self.device.path().display());
        self.stats.reopens += 1;
        self.device.close();
        self.open()
    }

    /// Discards whatever the device has buffered, typically the tail of a
    /// reply from an abandoned cycle. Returns the number of bytes dropped.
    pub fn flush(&mut self) -> usize {
        if !self.device.is_open() {
            return 0;
        }

        let mut chunk = [0u8; READ_CHUNK];
        let mut discarded = 0;

        for _ in 0..MAX_FLUSH_READS {
            match self.device.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("flush stopped: {}", e);
                    break;
                }
            }
        }

        if discarded > 0 {
            debug!("flushed {} stale bytes", discarded);
            self.stats.bytes_flushed += discarded as u64;
        }

        discarded
    }

    /// One non-blocking write of the whole frame. A full device buffer is not
    /// an error; the command is simply dropped.
    pub fn send(&mut self, frame: &CommandFrame) -> Result<(), DeviceError> {
        if !self.device.is_open() {
            return Err(DeviceError::NotOpen);
        }

        debug!("TX {:?} {:02X?}", frame, frame.bytes());

        match self.device.write(frame.bytes()) {
            Ok(n) => {
                if n < frame.bytes().len() {
                    warn!("short write of {}: {} of {} bytes", frame, n, frame.bytes().len());
                }
                self.stats.frames_sent += 1;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                debug!("write of {} would block, dropped", frame);
                Ok(())
            }
            Err(e) => {
                error!("error sending {}: {}", frame, e);
                self.device.close();
                Err(DeviceError::Write(e))
            }
        }
    }

    /// Polls until a complete `(`…`\r` frame has arrived and returns it as
    /// text, leading junk removed.
    pub fn read_until_terminator(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<String, ReadError> {
        let raw = self.poll_read(timeout, poll_interval, |buf| {
            frame::find_frame_boundary(buf).map(|(start, end)| start..end + 1)
        })?;

        let reply = frame::decode_ascii(&raw);
        debug!("RX {:?}", reply);
        Ok(reply)
    }

    /// Polls for the short QMOD reply. Returns `Ok(None)` when the device
    /// answered with a code we don't know.
    pub fn read_mode_reply(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<OperatingMode>, ReadError> {
        let raw = self.poll_read(timeout, poll_interval, |buf| {
            if !mode::has_mode_reply(buf) {
                return None;
            }
            let start = buf.iter().position(|&b| b == FRAME_START)?;
            Some(start..buf.len())
        })?;

        debug!("RX {:?}", frame::decode_ascii(&raw));
        let mode = mode::decode_mode_reply(&raw);
        if mode.is_none() {
            warn!("unrecognised mode reply {:02X?}", raw);
        }

        Ok(mode)
    }

    /// Flush, send, read. On failure resend once, then reopen the device
    /// and try a last time. Errors on the descriptor itself skip the resend.
    pub fn send_and_read<T, F>(&mut self, frame: &CommandFrame, mut read: F) -> Option<T>
    where
        F: FnMut(&mut Self, ReadSettings) -> Result<T, ReadError>,
    {
        let failure = match self.attempt(frame, &mut read, true) {
            Ok(reply) => return Some(reply),
            Err(failure) => failure,
        };

        if !failure.is_descriptor_fault() {
            warn!("{}: {}, resending", frame, failure);
            self.stats.resends += 1;

            match self.attempt(frame, &mut read, true) {
                Ok(reply) => return Some(reply),
                Err(failure) => warn!("{}: {} after resend", frame, failure),
            }
        } else {
            warn!("{}: {}", frame, failure);
        }

        if let Err(e) = self.reopen() {
            error!("{}: giving up, {}", frame, e);
            return None;
        }

        match self.attempt(frame, &mut read, false) {
            Ok(reply) => Some(reply),
            Err(failure) => {
                error!("{}: giving up after reopen, {}", frame, failure);
                None
            }
        }
    }

    fn attempt<T, F>(&mut self, frame: &CommandFrame, read: &mut F, flush: bool) -> Result<T, Failure>
    where
        F: FnMut(&mut Self, ReadSettings) -> Result<T, ReadError>,
    {
        self.open()?;
        if flush {
            self.flush();
        }
        self.send(frame)?;

        let settings = self.settings;
        Ok(read(self, settings)?)
    }

    // Accumulates READ_CHUNK sized reads until `complete` finds a frame in the
    // buffer or the deadline passes. Sleeps only when the device had nothing.
    fn poll_read<F>(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
        complete: F,
    ) -> Result<Vec<u8>, ReadError>
    where
        F: Fn(&[u8]) -> Option<Range<usize>>,
    {
        let started = Instant::now();
        let mut raw: Vec<u8> = Vec::with_capacity(128);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let got_data = match self.device.read(&mut chunk) {
                Ok(0) => false,
                Ok(n) => {
                    raw.extend_from_slice(&chunk[..n]);
                    if let Some(range) = complete(&raw) {
                        self.stats.frames_received += 1;
                        return Ok(raw[range].to_vec());
                    }
                    // nothing before a '(' can belong to our reply
                    if !raw.contains(&FRAME_START) {
                        raw.clear();
                    }
                    true
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => false,
                Err(e) => return Err(ReadError::Io(e)),
            };

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                self.stats.timeouts += 1;
                if !raw.is_empty() {
                    debug!("discarding partial reply {:?}", frame::decode_ascii(&raw));
                }
                return Err(ReadError::Timeout { elapsed });
            }

            if !got_data {
                std::thread::sleep(poll_interval);
            }
        }
    }
}

impl<D: Device> Drop for DeviceChannel<D> {
    fn drop(&mut self) {
        self.device.close();
    }
}
