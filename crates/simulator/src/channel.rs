//! Byte-stream access to a [`Simulator`].
//!
//! [`SimulatorChannel`] behaves like the character device of a hardware
//! module: the client writes a complete command buffer, then reads the
//! response. Writes may arrive in pieces; a command runs once its header
//! and declared size have been received.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};
use tpm_protocol::{FrameCodec, Header, ResponseCode};

use crate::simulator::{response_code_for, Simulator};

/// A device-like endpoint in front of a shared simulator.
#[derive(Debug)]
pub struct SimulatorChannel {
    simulator: Arc<Mutex<Simulator>>,
    pending: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl Default for SimulatorChannel {
    fn default() -> Self {
        Self::new(Simulator::default())
    }
}

impl SimulatorChannel {
    pub fn new(simulator: Simulator) -> Self {
        Self::shared(Arc::new(Mutex::new(simulator)))
    }

    /// Open another channel onto a simulator that outlives it.
    pub fn shared(simulator: Arc<Mutex<Simulator>>) -> Self {
        Self {
            simulator,
            pending: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn simulator(&self) -> Arc<Mutex<Simulator>> {
        Arc::clone(&self.simulator)
    }

    fn process_pending(&mut self) -> io::Result<()> {
        loop {
            let header = match Header::try_parse(&self.pending) {
                Ok(Some(header)) => header,
                Ok(None) => return Ok(()),
                Err(err) => {
                    debug!(error = %err, "discarding malformed command");
                    self.pending.clear();
                    self.outbox
                        .extend(FrameCodec::encode_error(response_code_for(&err)));
                    return Ok(());
                }
            };

            let size = header.size as usize;
            let response = {
                let mut simulator = self
                    .simulator
                    .lock()
                    .map_err(|_| io::Error::other("simulator lock poisoned"))?;
                if size > simulator.max_frame_size() {
                    debug!(size, "command exceeds frame limit");
                    self.pending.clear();
                    drop(simulator);
                    self.outbox
                        .extend(FrameCodec::encode_error(ResponseCode::COMMAND_SIZE));
                    return Ok(());
                }
                if self.pending.len() < size {
                    return Ok(());
                }
                simulator.execute(&self.pending[..size])
            };
            trace!(command = size, response = response.len(), "frame exchanged");
            self.pending.drain(..size);
            self.outbox.extend(response);
        }
    }
}

impl Write for SimulatorChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.process_pending()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatorChannel {
    /// Returns 0 when no response is waiting.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
