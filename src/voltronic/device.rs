use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Raw byte endpoint the [`DeviceChannel`](super::channel::DeviceChannel) drives.
///
/// Reads and writes never block: an empty device answers
/// `ErrorKind::WouldBlock`.
pub trait Device: Send {
    fn open(&mut self) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn path(&self) -> &Path;
}

// {{{ Hidraw
/// `/dev/hidrawN` opened `O_RDWR | O_NONBLOCK`.
pub struct Hidraw {
    path: PathBuf,
    file: Option<File>,
}

impl Hidraw {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is not open"))
    }
}

impl Device for Hidraw {
    fn open(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)?;
        info!("opened {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closed {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
// }}}
