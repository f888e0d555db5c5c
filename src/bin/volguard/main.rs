//! volguard entrypoint: wires the enforcement engine to the OS mixer, the
//! status shell, and the persisted safe-volume store.
//!
//! Two threads do the work: the enforcement loop owns all per-application
//! state and runs at a fixed interval; the shell thread owns the status
//! surface and only reacts to updates sent over a bounded channel.

mod config;
mod shell;

use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use tracing::{error, info};
use volguard::ports::NotificationPort;
use volguard::shutdown::{install_signal_handlers, shutdown_requested};
use volguard::{audio, telemetry, EnforcementEngine, SafeVolumeStore};

use crate::config::{load_file_config, resolve, Cli, Settings};
use crate::shell::{
    spawn_quit_listener, spawn_shell_thread, ShellMessage, ShellNotifier, SHELL_CHANNEL_CAPACITY,
};

const SHELL_JOIN_POLL_MS: u64 = 10;
const SHELL_SHUTDOWN_JOIN_TIMEOUT_MS: u64 = 500;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve(cli, load_file_config())?;
    telemetry::init_logging(settings.log_file.as_deref(), settings.verbose)?;

    if let Err(err) = run(settings) {
        // Whatever escapes the loop gets full detail in the log before the
        // process gives up; a silent zombie loop helps nobody.
        error!("fatal: {err:#}");
        return Err(err);
    }
    Ok(())
}

fn run(settings: Settings) -> Result<()> {
    info!(
        "volguard starting (tick {}ms, state {})",
        settings.tick.as_millis(),
        settings.state_file.display()
    );
    install_signal_handlers();

    let audio = audio::open_sessions().map_err(|err| anyhow!("{err}"))?;
    let store = SafeVolumeStore::load(&settings.state_file);

    let (shell_tx, shell_rx) = bounded(SHELL_CHANNEL_CAPACITY);
    let shell_handle = spawn_shell_thread(shell_rx);
    spawn_quit_listener();

    let mut notifier = ShellNotifier::new(shell_tx.clone());
    // Surface is visible before the first tick lands.
    notifier.update_status(&BTreeSet::new());

    let mut engine = EnforcementEngine::new(audio, notifier, store, settings.tuning);

    loop {
        let tick_started = Instant::now();
        engine.run_tick(tick_started);
        if settings.once || shutdown_requested() {
            break;
        }
        if let Some(remaining) = settings.tick.checked_sub(tick_started.elapsed()) {
            thread::sleep(remaining);
        }
        if shutdown_requested() {
            break;
        }
    }

    info!("volguard shutting down");
    // Final flush catches anything a failed mid-run save left behind.
    engine.persist(false);

    let _ = shell_tx.send(ShellMessage::Shutdown);
    join_thread_with_timeout(
        "shell",
        shell_handle,
        Duration::from_millis(SHELL_SHUTDOWN_JOIN_TIMEOUT_MS),
    );
    Ok(())
}

fn join_thread_with_timeout(name: &str, handle: thread::JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.is_finished() || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(SHELL_JOIN_POLL_MS));
    }

    if handle.is_finished() {
        if let Err(err) = handle.join() {
            error!("{name} thread panicked during shutdown: {err:?}");
        }
    } else {
        info!(
            "{name} thread did not exit within {}ms; detaching",
            timeout.as_millis()
        );
    }
}
