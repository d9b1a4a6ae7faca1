use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// `q`: stop starting new work, let running probes finish.
    Graceful,
    /// `Ctrl+C`: abort everything now.
    Forced,
}

/// Listens for `q` and `Ctrl+C` on a raw-mode terminal until dropped.
pub struct KeyListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyListener {
    /// Starts listening. Does nothing when stdin is not a terminal.
    pub fn start<F>(on_interrupt: F) -> Self
    where
        F: Fn(Interrupt) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        if !std::io::stdin().is_terminal() || enable_raw_mode().is_err() {
            return Self { stop, thread: None };
        }

        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if !event::poll(POLL_INTERVAL).unwrap_or(false) {
                    continue;
                }
                let Ok(Event::Key(key_event)) = event::read() else {
                    continue;
                };
                if key_event.kind != KeyEventKind::Press {
                    continue;
                }

                let is_ctrl_c = key_event.code == KeyCode::Char('c')
                    && key_event.modifiers.contains(KeyModifiers::CONTROL);
                if is_ctrl_c {
                    on_interrupt(Interrupt::Forced);
                    break;
                }
                if key_event.code == KeyCode::Char('q') {
                    on_interrupt(Interrupt::Graceful);
                }
            }
            let _ = disable_raw_mode();
        });

        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let _ = disable_raw_mode();
    }
}
