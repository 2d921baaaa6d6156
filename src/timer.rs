//
// tsilink - Observatory device drivers for Astelco OpenTSI controllers and auxiliary hardware
// Copyright (c) 2025 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Polling timer.
//!

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

pub const DEFAULT_POLLING_PERIOD: std::time::Duration = std::time::Duration::from_millis(1000);

/// Delivers a tick every `period` until stopped or dropped.
pub struct PollingTimer {
    stop_sender: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>
}

impl PollingTimer {
    pub fn start(period: std::time::Duration) -> (PollingTimer, Receiver<std::time::Instant>) {
        let (stop_sender, stop_receiver) = crossbeam::channel::bounded::<()>(1);
        let (tick_sender, tick_receiver) = crossbeam::channel::bounded(1);

        let thread = std::thread::spawn(move || {
            loop {
                match stop_receiver.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        // a tick still waiting to be handled is not duplicated
                        if let Err(crossbeam::channel::TrySendError::Disconnected(_)) = tick_sender.try_send(std::time::Instant::now()) {
                            break;
                        }
                    },

                    _ => break
                }
            }
        });

        (PollingTimer{ stop_sender: Some(stop_sender), thread: Some(thread) }, tick_receiver)
    }

    pub fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() { log::error!("polling timer thread panicked"); }
        }
    }
}

impl Drop for PollingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
