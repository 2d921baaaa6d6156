//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! In-memory byte link used by the simulators and tests.
//!

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// One end of a duplex in-memory link. Clones share the link; each clone keeps its own
/// not-yet-consumed input, so only one clone per end should be reading.
pub struct LoopbackPort {
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    unread: Vec<u8>,
    timeout: std::time::Duration
}

impl Clone for LoopbackPort {
    fn clone(&self) -> LoopbackPort {
        LoopbackPort{
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            unread: vec![],
            timeout: self.timeout
        }
    }
}

impl std::fmt::Debug for LoopbackPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoopbackPort{{ timeout: {:?} }}", self.timeout)
    }
}

/// Creates both ends of a link.
pub fn pair() -> (LoopbackPort, LoopbackPort) {
    let (sender_a, receiver_b) = crossbeam::channel::unbounded();
    let (sender_b, receiver_a) = crossbeam::channel::unbounded();

    (
        LoopbackPort{ sender: sender_a, receiver: receiver_a, unread: vec![], timeout: DEFAULT_TIMEOUT },
        LoopbackPort{ sender: sender_b, receiver: receiver_b, unread: vec![], timeout: DEFAULT_TIMEOUT }
    )
}

impl LoopbackPort {
    pub fn set_timeout(&mut self, timeout: std::time::Duration) {
        self.timeout = timeout;
    }
}

impl std::io::Read for LoopbackPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() { return Ok(0); }

        if self.unread.is_empty() {
            match self.receiver.recv_timeout(self.timeout) {
                Ok(chunk) => self.unread = chunk,
                Err(RecvTimeoutError::Timeout) => return Err(std::io::ErrorKind::TimedOut.into()),
                // the other end is gone: end of stream
                Err(RecvTimeoutError::Disconnected) => return Ok(0)
            }
        }

        let num = buf.len().min(self.unread.len());
        buf[..num].copy_from_slice(&self.unread[..num]);
        self.unread.drain(..num);

        Ok(num)
    }
}

impl std::io::Write for LoopbackPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() { return Ok(0); }

        self.sender.send(buf.to_vec()).map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
