use std::sync::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

const TIP_DURATION: Duration = Duration::from_secs(2);
const MESSAGE_READ_TIME: Duration = Duration::from_secs(1);
const MIN_TIP_VISIBILITY: Duration = Duration::from_millis(750);
const TIPS: &[&str] = &[
    "You can press 'q' to finish early",
    "Ctrl+C aborts probes that are still running",
];
const TICKS: &[&str] = &[
    "▁▁▁▁▁", "▁▂▂▂▁", "▁▄▂▄▁", "▂▄▆▄▂", "▄▆█▆▄", "▂▄▆▄▂", "▁▄▂▄▁", "▁▂▂▂▁",
];

/// The bar log lines are printed above, while one is on screen.
static ACTIVE: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Prints `line` above the active bar. Returns `false` when no bar is showing.
pub fn println(line: &str) -> bool {
    let Ok(active) = ACTIVE.lock() else {
        return false;
    };
    match active.as_ref() {
        Some(bar) if !bar.is_finished() => {
            bar.println(line);
            true
        }
        _ => false,
    }
}

pub struct ProgressHandle {
    bar: ProgressBar,
    tx: Option<Sender<String>>,
}

impl ProgressHandle {
    fn register(bar: ProgressBar, tx: Option<Sender<String>>) -> Self {
        if let Ok(mut active) = ACTIVE.lock() {
            *active = Some(bar.clone());
        }
        Self { bar, tx }
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    /// Shows `message` for a while before the tips take over again.
    pub fn send_to_queue(&self, message: String) {
        match &self.tx {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => self.bar.set_message(message),
        }
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
        if let Ok(mut active) = ACTIVE.lock() {
            *active = None;
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.finish_and_clear();
    }
}

/// A bar for `total` probes.
pub fn scan_bar(total: u64) -> ProgressHandle {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] {bar:32.green/bright_black} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .tick_strings(TICKS)
    .progress_chars("━╸─");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));
    ProgressHandle::register(bar, None)
}

/// An open-ended spinner that rotates through usage tips between messages.
pub fn spinner() -> ProgressHandle {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));

    let (tx, rx) = mpsc::channel::<String>();
    let pb = bar.clone();

    thread::spawn(move || {
        let mut tip_index = 0;
        let mut next_action_time = Instant::now();
        let mut is_showing_tip = false;
        let mut last_tip_time = Instant::now();

        loop {
            if pb.is_finished() {
                break;
            }

            let wait_time = next_action_time.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait_time) {
                Ok(mut msg) => {
                    if is_showing_tip {
                        let elapsed = last_tip_time.elapsed();
                        if elapsed < MIN_TIP_VISIBILITY {
                            thread::sleep(MIN_TIP_VISIBILITY - elapsed);
                        }
                        is_showing_tip = false;
                    }
                    while let Ok(newer_msg) = rx.try_recv() {
                        msg = newer_msg;
                    }
                    pb.set_message(msg);
                    next_action_time = Instant::now() + MESSAGE_READ_TIME;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let tip = TIPS[tip_index % TIPS.len()];
                    pb.set_message(format!("{}", tip.italic().white()));

                    tip_index += 1;
                    is_showing_tip = true;
                    last_tip_time = Instant::now();
                    next_action_time = Instant::now() + TIP_DURATION;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    ProgressHandle::register(bar, Some(tx))
}
