//! Status shell: a dedicated thread that renders enforcement state and
//! transient mute notices, the console stand-in for a tray surface.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use volguard::ports::NotificationPort;
use volguard::shutdown::request_shutdown;

/// Max pending surface updates before the engine thread drops them.
pub(crate) const SHELL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellMessage {
    /// Replace the status title.
    Status(String),
    /// One-shot notice, shown once and not repeated.
    Toast(String),
    /// Drain and exit the shell thread.
    Shutdown,
}

/// Title string for the status surface.
pub(crate) fn status_title(muted: &BTreeSet<String>) -> String {
    if muted.is_empty() {
        "running".to_string()
    } else {
        let joined = muted
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!("muted: {joined}")
    }
}

/// Engine-side handle to the surface. Sends never block; a stalled surface
/// drops updates instead of stalling an enforcement tick.
pub(crate) struct ShellNotifier {
    tx: Sender<ShellMessage>,
}

impl ShellNotifier {
    pub(crate) fn new(tx: Sender<ShellMessage>) -> Self {
        Self { tx }
    }
}

impl NotificationPort for ShellNotifier {
    fn notify_muted(&mut self, app: &str) {
        let _ = self
            .tx
            .try_send(ShellMessage::Toast(format!("{app} was forcefully muted")));
    }

    fn update_status(&mut self, muted: &BTreeSet<String>) {
        let _ = self.tx.try_send(ShellMessage::Status(status_title(muted)));
    }
}

pub(crate) fn spawn_shell_thread(rx: Receiver<ShellMessage>) -> JoinHandle<()> {
    thread::spawn(move || run_shell(rx))
}

fn run_shell(rx: Receiver<ShellMessage>) {
    let stdout = io::stdout();
    for message in rx.iter() {
        match message {
            ShellMessage::Status(title) => {
                let mut out = stdout.lock();
                let _ = writeln!(out, "[volguard] {title}");
            }
            ShellMessage::Toast(text) => {
                let mut out = stdout.lock();
                let _ = writeln!(out, "[volguard] {text}");
            }
            ShellMessage::Shutdown => break,
        }
    }
}

/// Watch stdin for a quit command, the menu-action analog on a console.
/// The thread parks on stdin and is left detached at shutdown.
pub(crate) fn spawn_quit_listener() {
    thread::spawn(|| {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("q") || trimmed.eq_ignore_ascii_case("quit") {
                request_shutdown();
                break;
            }
        }
    });
}
