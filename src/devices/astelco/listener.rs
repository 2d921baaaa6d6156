//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Background reader correlating response lines with issued commands.
//!

use crate::devices::astelco::axis::AxisState;
use crate::devices::astelco::decode;
use crate::devices::astelco::pending::{Pending, PendingTable, Reply};
use crate::devices::astelco::protocol::{self, ParseFailure, Response};
use crate::devices::utils::LineReader;
use crate::properties::{DriverToMainThreadMsg, GroupSnapshot, TextProperties, ASTELCO_GROUPS};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex, MutexGuard, PoisonError};

const READ_ERROR_PAUSE: std::time::Duration = std::time::Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the command issuer and the listener.
pub struct Shared {
    pending: Mutex<PendingTable>,
    axes: Mutex<AxisState>,
    texts: Mutex<TextProperties>,
    powered: AtomicBool
}

impl Shared {
    pub fn new() -> Shared {
        Shared{
            pending: Mutex::new(PendingTable::new()),
            axes: Mutex::new(AxisState::default()),
            texts: Mutex::new(TextProperties::default()),
            powered: AtomicBool::new(false)
        }
    }

    pub fn pending(&self) -> MutexGuard<'_, PendingTable> { lock(&self.pending) }

    pub fn axes(&self) -> MutexGuard<'_, AxisState> { lock(&self.axes) }

    pub fn texts(&self) -> MutexGuard<'_, TextProperties> { lock(&self.texts) }

    pub fn is_powered(&self) -> bool { self.powered.load(Ordering::SeqCst) }

    pub fn snapshots(&self) -> Vec<GroupSnapshot> {
        let texts = self.texts();
        ASTELCO_GROUPS.iter().map(|group| texts.snapshot(*group)).collect()
    }
}

#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    /// A pending entry was decoded; the refreshed groups are included.
    Updated(Vec<GroupSnapshot>),
    Warning(String),
    Ignored
}

/// Handles one received line.
pub fn process_line(shared: &Shared, line: &str) -> LineOutcome {
    match protocol::parse_response_line(line) {
        Ok(Response{ id, key, value }) => {
            let pending = shared.pending().take(id);
            match pending {
                Some(Pending{ annotation: Some(annotation), waiter }) => {
                    let decoded = decode::decode(annotation.kind, &value);

                    if let (Some(number), Some((axis, position))) = (decoded.axis_value, annotation.axis) {
                        shared.axes().set(axis, position, number);
                    }
                    if let Some(powered) = decoded.powered {
                        shared.powered.store(powered, Ordering::SeqCst);
                    }
                    shared.texts().set(annotation.field, decoded.text);

                    if let Some(waiter) = waiter {
                        let _ = waiter.try_send(Reply{ raw: value, axis_value: decoded.axis_value });
                    }

                    LineOutcome::Updated(shared.snapshots())
                },

                Some(Pending{ annotation: None, .. }) => {
                    log::info!("ignoring value of {} returned for command {}", key, id);
                    LineOutcome::Ignored
                },

                None => {
                    log::info!("response to unknown command {}: {}={}", id, key, value);
                    LineOutcome::Ignored
                }
            }
        },

        Err(ParseFailure::NoValue{ id, text }) => {
            if protocol::is_completion_event(&text) {
                shared.pending().retire(id);
            }
            if text.contains("FAILED") {
                log::warn!("command {} failed: {}", id, text);
            } else {
                log::debug!("command {}: {}", id, text);
            }
            LineOutcome::Ignored
        },

        Err(ParseFailure::Warning(text)) => {
            log::warn!("controller warning: {}", text);
            LineOutcome::Warning(text)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Running,
    Stopping,
    Stopped
}

pub struct Listener {
    state: ListenerState,
    running: Arc<AtomicBool>,
    exited: Option<Receiver<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    read_timeout: std::time::Duration
}

impl Listener {
    pub fn new(read_timeout: std::time::Duration) -> Listener {
        Listener{
            state: ListenerState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            exited: None,
            thread: None,
            read_timeout
        }
    }

    pub fn state(&self) -> ListenerState { self.state }

    pub fn start<R: std::io::Read + Send + 'static>(
        &mut self,
        reader: LineReader<R>,
        shared: Arc<Shared>,
        sender: Sender<DriverToMainThreadMsg>
    ) {
        if self.state == ListenerState::Running { return; }

        let (exit_sender, exit_receiver) = crossbeam::channel::bounded(1);
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        self.thread = Some(std::thread::spawn(move || {
            listener_loop(reader, &shared, &running, &sender);
            let _ = exit_sender.send(());
        }));
        self.exited = Some(exit_receiver);
        self.state = ListenerState::Running;
        log::info!("response listener started");
    }

    /// Asks the thread to finish and waits for it at most two read timeouts. Returns false if it did not exit in time.
    pub fn stop(&mut self) -> bool {
        if self.state != ListenerState::Running { return true; }

        self.running.store(false, Ordering::SeqCst);
        self.state = ListenerState::Stopping;

        let exited = match &self.exited {
            Some(receiver) => match receiver.recv_timeout(2 * self.read_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                Err(RecvTimeoutError::Timeout) => false
            },
            None => true
        };

        if exited {
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() { log::error!("response listener panicked"); }
            }
            self.exited = None;
            self.state = ListenerState::Stopped;
            log::info!("response listener stopped");
        } else {
            log::warn!("response listener did not stop within {:.1} s", 2.0 * self.read_timeout.as_secs_f64());
        }

        exited
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn listener_loop<R: std::io::Read>(
    mut reader: LineReader<R>,
    shared: &Shared,
    running: &AtomicBool,
    sender: &Sender<DriverToMainThreadMsg>
) {
    while running.load(Ordering::SeqCst) {
        let result = reader.read_line();
        if !running.load(Ordering::SeqCst) { break; }

        match result {
            Ok(Some(line)) => {
                log::info!("received: {}", line);
                match process_line(shared, &line) {
                    LineOutcome::Updated(snapshots) => { let _ = sender.send(DriverToMainThreadMsg::Refresh(snapshots)); },
                    LineOutcome::Warning(text) => { let _ = sender.send(DriverToMainThreadMsg::Warning(text)); },
                    LineOutcome::Ignored => ()
                }
            },

            Ok(None) => (),

            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::error!("connection closed by controller");
                let _ = sender.send(DriverToMainThreadMsg::ConnectionLost);
                break;
            },

            Err(e) => {
                log::warn!("error reading response: {}", e);
                std::thread::sleep(READ_ERROR_PAUSE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::astelco::decode::SemanticKind;
    use crate::devices::astelco::pending::{reply_channel, Annotation, Completion};
    use crate::devices::astelco::protocol::{DeviceAxis, PositionKind, StatusField};
    use crate::devices::loopback;
    use crate::properties::TextField;
    use std::io::Write;

    fn pending(annotation: Annotation) -> Pending {
        Pending{ annotation: Some(annotation), waiter: None }
    }

    fn real_position() -> Annotation {
        Annotation::axis_value(TextField::Status(StatusField::RealPosition), DeviceAxis::Focus, PositionKind::Real)
    }

    #[test]
    fn given_axis_position_response_update_axis_and_text() {
        let shared = Shared::new();
        shared.pending().insert(1, pending(real_position()));

        let outcome = process_line(&shared, "1 REALPOS=10.000000");

        assert_eq!(Some(10.0), shared.axes().get(DeviceAxis::Focus, PositionKind::Real));
        assert_eq!("10.000000", shared.texts().get(TextField::Status(StatusField::RealPosition)));
        match outcome {
            LineOutcome::Updated(snapshots) => assert_eq!(ASTELCO_GROUPS.len(), snapshots.len()),
            _ => panic!("expected an update")
        }
        assert_eq!(0, shared.pending().len());
    }

    #[test]
    fn given_warning_line_state_is_untouched() {
        let shared = Shared::new();
        shared.pending().insert(1, pending(real_position()));

        assert_eq!(LineOutcome::Warning("LOGIN REQUIRED".into()), process_line(&shared, "LOGIN REQUIRED"));
        assert!(shared.pending().contains(1));
        assert_eq!(None, shared.axes().get(DeviceAxis::Focus, PositionKind::Real));
    }

    #[test]
    fn given_ready_state_response_set_powered() {
        let shared = Shared::new();
        shared.pending().insert(2, pending(Annotation::text(TextField::TelescopeReady, SemanticKind::ReadyState)));
        process_line(&shared, "2 DATA INLINE TELESCOPE.READY_STATE=1.0");

        assert!(shared.is_powered());
        assert_eq!("FULLY OPERATIONAL", shared.texts().get(TextField::TelescopeReady));
    }

    #[test]
    fn given_completion_event_retire_set_entry() {
        let shared = Shared::new();
        shared.pending().insert(3, Pending{ annotation: None, waiter: None });
        process_line(&shared, "3 COMMAND OK");
        assert!(shared.pending().contains(3));
        process_line(&shared, "3 COMMAND COMPLETE");
        assert!(!shared.pending().contains(3));
    }

    #[test]
    fn given_unknown_id_ignore() {
        let shared = Shared::new();
        assert_eq!(LineOutcome::Ignored, process_line(&shared, "77 REALPOS=1.0"));
    }

    #[test]
    fn given_waiter_receive_decoded_value() {
        let shared = Shared::new();
        let (sender, receiver) = reply_channel();
        let completion = Completion::new(4, receiver);
        shared.pending().insert(4, Pending{ annotation: Some(real_position()), waiter: Some(sender) });
        process_line(&shared, "4 REALPOS=2.5");

        let reply = completion.wait(std::time::Duration::from_millis(10)).unwrap();
        assert_eq!(Some(2.5), reply.axis_value);
        assert_eq!("2.5", reply.raw);
    }

    #[test]
    fn given_running_listener_publish_and_stop() {
        let timeout = std::time::Duration::from_millis(20);
        let (mut device, mut host) = loopback::pair();
        host.set_timeout(timeout);
        let shared = Arc::new(Shared::new());
        shared.pending().insert(1, pending(real_position()));
        let (sender, receiver) = crossbeam::channel::unbounded();

        let mut listener = Listener::new(timeout);
        listener.start(LineReader::new(host), Arc::clone(&shared), sender);
        assert_eq!(ListenerState::Running, listener.state());

        device.write_all(b"1 REALPOS=3.000000\r\n").unwrap();
        match receiver.recv_timeout(std::time::Duration::from_secs(2)).unwrap() {
            DriverToMainThreadMsg::Refresh(_) => (),
            _ => panic!("expected a refresh")
        }

        assert!(listener.stop());
        assert_eq!(ListenerState::Stopped, listener.state());

        // nothing is processed after stopping
        shared.pending().insert(2, pending(real_position()));
        let _ = device.write_all(b"2 REALPOS=4.000000\r\n");
        std::thread::sleep(3 * timeout);
        assert!(shared.pending().contains(2));
    }

    #[test]
    fn given_closed_connection_report_lost() {
        let timeout = std::time::Duration::from_millis(20);
        let (device, mut host) = loopback::pair();
        host.set_timeout(timeout);
        let (sender, receiver) = crossbeam::channel::unbounded();

        let mut listener = Listener::new(timeout);
        listener.start(LineReader::new(host), Arc::new(Shared::new()), sender);
        drop(device);

        assert!(matches!(
            receiver.recv_timeout(std::time::Duration::from_secs(2)).unwrap(),
            DriverToMainThreadMsg::ConnectionLost
        ));
        assert!(listener.stop());
    }
}
