//! Command execution over a transport.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};
use tpm_protocol::{Command, FrameCodec, MAX_FRAME_SIZE};

use crate::error::{ClientError, Result};
use crate::transport::{self, Device, Transport};

/// A connection to one module.
///
/// Commands are strictly request/response: the transport sits behind a
/// mutex and each [`execute`](Tpm::execute) holds it from the first byte
/// written to the last byte read. Once the byte channel fails the stream
/// may be out of step with the module, so every later command fails
/// immediately with [`ClientError::Transport`].
#[derive(Debug)]
pub struct Tpm<T> {
    transport: Mutex<T>,
    codec: FrameCodec,
    failed: AtomicBool,
}

impl Tpm<Device> {
    /// Open a module character device.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Device::open(path)?))
    }
}

impl<T: Transport> Tpm<T> {
    pub fn new(transport: T) -> Self {
        Self::with_max_response_size(transport, MAX_FRAME_SIZE)
    }

    /// Use a different bound on command and response buffers.
    pub fn with_max_response_size(transport: T, max_response_size: usize) -> Self {
        Self {
            transport: Mutex::new(transport),
            codec: FrameCodec::with_max_frame_size(max_response_size),
            failed: AtomicBool::new(false),
        }
    }

    pub fn max_response_size(&self) -> usize {
        self.codec.max_frame_size()
    }

    /// Whether an earlier transport failure has poisoned this connection.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Run one command and decode its response.
    ///
    /// A module error is returned as [`ClientError::Module`] without
    /// looking at the response body.
    pub fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
        if self.is_failed() {
            return Err(ClientError::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transport failed on an earlier command",
            )));
        }

        let request = self.codec.encode_command(command)?;
        debug!(command = %C::CODE, size = request.len(), "sending command");

        let response = {
            let mut channel = self
                .transport
                .lock()
                .map_err(|_| io::Error::other("transport lock poisoned"))?;
            match transport::transact(&mut *channel, &request, self.codec.max_frame_size()) {
                Ok(response) => response,
                Err(err) => {
                    self.failed.store(true, Ordering::Release);
                    warn!(command = %C::CODE, error = %err, "transport failed");
                    return Err(err);
                }
            }
        };

        match self.codec.decode_response::<C>(&response)? {
            Ok(decoded) => {
                debug!(command = %C::CODE, size = response.len(), "command succeeded");
                Ok(decoded)
            }
            Err(code) => {
                debug!(command = %C::CODE, code = %code, "module rejected command");
                Err(ClientError::Module(code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tpm_protocol::commands::GetRandom;
    use tpm_protocol::ResponseCode;
    use tpm_simulator::{Simulator, SimulatorChannel, SimulatorConfig};

    /// A channel whose reads fail.
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "unplugged"))
        }
    }

    impl Write for Broken {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Answers every command with a fixed buffer.
    struct Canned(io::Cursor<Vec<u8>>);

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.set_position(0);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_execute_against_simulator() {
        let tpm = Tpm::new(SimulatorChannel::default());
        let random = tpm.execute(&GetRandom { bytes_requested: 12 }).unwrap();
        assert_eq!(random.random_bytes.len(), 12);
        assert!(!tpm.is_failed());
    }

    #[test]
    fn test_module_error_surfaces_code() {
        let simulator = Simulator::new(SimulatorConfig::default().disable(
            tpm_protocol::CommandCode::GetRandom,
        ));
        let tpm = Tpm::new(SimulatorChannel::new(simulator));
        let err = tpm.execute(&GetRandom { bytes_requested: 1 }).unwrap_err();
        assert!(matches!(err, ClientError::Module(ResponseCode::COMMAND_CODE)));
        // A module error leaves the stream in step
        assert!(!tpm.is_failed());
    }

    #[test]
    fn test_transport_failure_poisons_session() {
        let tpm = Tpm::new(Broken);
        let first = tpm.execute(&GetRandom { bytes_requested: 1 }).unwrap_err();
        assert!(matches!(first, ClientError::Transport(_)));
        assert!(tpm.is_failed());

        let second = tpm.execute(&GetRandom { bytes_requested: 1 }).unwrap_err();
        match second {
            ClientError::Transport(err) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_response_is_an_error() {
        // Success header followed by a random-bytes buffer that claims 8 bytes but carries 2
        let canned = vec![0x80, 0x01, 0, 0, 0, 14, 0, 0, 0, 0, 0, 8, 0xAA, 0xBB];
        let tpm = Tpm::new(Canned(io::Cursor::new(canned)));
        let err = tpm.execute(&GetRandom { bytes_requested: 8 }).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_custom_response_limit() {
        let tpm = Tpm::with_max_response_size(SimulatorChannel::default(), 1024);
        assert_eq!(tpm.max_response_size(), 1024);
    }
}
