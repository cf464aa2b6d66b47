//! Keyboard device fed from standard input.
//!
//! A background thread reads lines from stdin and forwards one key event per
//! character (an empty line is reported as `return`). This lets an operator,
//! or a trigger box that types into a terminal, drive TR detection.

use crate::device::simulated::drain_matching;
use crate::device::types::{KeyEvent, KeyboardDevice};
use crate::error::{RecorderError, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Keys read from the process's standard input.
pub struct StdinKeyboard {
    receiver: Option<Receiver<KeyEvent>>,
    running: Arc<AtomicBool>,
    buffered: Vec<KeyEvent>,
}

impl StdinKeyboard {
    pub fn new() -> Self {
        Self {
            receiver: None,
            running: Arc::new(AtomicBool::new(false)),
            buffered: Vec::new(),
        }
    }
}

impl Default for StdinKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardDevice for StdinKeyboard {
    fn open(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        // Bounded to prevent unbounded memory growth if nobody polls.
        let (sender, receiver) = bounded(1024);
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        thread::Builder::new()
            .name("stdin-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    let keys: Vec<KeyEvent> = if line.is_empty() {
                        vec![KeyEvent::new("return")]
                    } else {
                        line.chars().map(|c| KeyEvent::new(c.to_string())).collect()
                    };
                    for key in keys {
                        if !running.load(Ordering::SeqCst) || sender.send(key).is_err() {
                            return;
                        }
                    }
                }
                debug!("stdin closed");
            })
            .map_err(|e| RecorderError::DeviceOpenFailure(format!("stdin reader: {e}")))?;

        self.receiver = Some(receiver);
        Ok(())
    }

    fn close(&mut self) {
        // The reader thread may be parked in a blocking read; it exits on its
        // next line or when stdin closes.
        self.running.store(false, Ordering::SeqCst);
        self.receiver = None;
    }

    fn poll_keys(&mut self, key_filter: &[String], consume_on_read: bool) -> Result<Vec<KeyEvent>> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Err(RecorderError::DeviceReadFailure("stdin keyboard is not open".into()));
        };
        loop {
            match receiver.try_recv() {
                Ok(event) => self.buffered.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(drain_matching(&mut self.buffered, key_filter, consume_on_read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_before_open_fails() {
        let mut kb = StdinKeyboard::new();
        let err = kb.poll_keys(&[], true).unwrap_err();
        assert!(matches!(err, RecorderError::DeviceReadFailure(_)));
    }

    #[test]
    fn test_close_without_open() {
        let mut kb = StdinKeyboard::new();
        kb.close();
        assert!(kb.poll_keys(&[], true).is_err());
    }
}
