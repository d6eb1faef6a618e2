//! Byte channels to a module.
//!
//! A transport is any blocking `Read + Write` value. [`Device`] opens a
//! kernel character device such as `/dev/tpmrm0`; tests and the CLI's
//! `--simulator` mode use [`tpm_simulator::SimulatorChannel`].

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use tpm_protocol::{Header, ProtocolError, HEADER_SIZE};

use crate::error::{ClientError, Result};

/// Default resource-manager device node.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/tpmrm0";

/// A blocking, ordered byte channel to a module.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// A module character device.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    file: File,
}

impl Device {
    /// Open `path` for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!(path = %path.display(), "device opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for Device {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Send one command buffer and read back exactly one response buffer.
///
/// The response is framed by its own header: ten bytes first, then
/// `size - 10` more. Transport failures come back as
/// [`ClientError::Transport`]; a header that cannot be trusted comes back
/// as [`ClientError::Protocol`].
pub fn transact<T: Read + Write + ?Sized>(
    channel: &mut T,
    command: &[u8],
    max_response_size: usize,
) -> Result<Vec<u8>> {
    channel.write_all(command)?;
    channel.flush()?;

    let mut response = vec![0u8; HEADER_SIZE];
    channel.read_exact(&mut response)?;
    let header = Header::parse(&response)?;

    let size = header.size as usize;
    if size > max_response_size {
        return Err(ClientError::Protocol(ProtocolError::FrameTooLarge {
            size,
            max: max_response_size,
        }));
    }
    response.resize(size, 0);
    channel.read_exact(&mut response[HEADER_SIZE..])?;

    trace!(command = command.len(), response = size, "frame exchanged");
    Ok(response)
}
