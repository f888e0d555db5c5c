//! The enforcement state machine: classify each application's volume movement
//! every tick and correct it, escalating persistent offenders to a forced mute.
//!
//! Per tick, every live session lands in exactly one branch:
//!
//! - unknown application: learn a capped safe volume and apply it
//! - at its safe volume: leave it alone
//! - sharp jump above the reset threshold: reassert the safe volume, and
//!   after repeated jumps back off once, then mute
//! - anything gentler: the user moved it, so the new level becomes safe
//!
//! All per-application state is owned here; the store is only asked to
//! remember safe volumes across restarts.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::ports::{AppSession, AudioSessionPort, NotificationPort};
use crate::store::SafeVolumeStore;

/// Cap applied to newly observed applications.
pub const DEFAULT_THRESHOLD: f32 = 0.03;

/// Tick-over-tick volume jump treated as an application reset rather than a
/// deliberate user drag.
pub const RESET_THRESHOLD: f32 = 0.10;

/// Reassertions tolerated before escalating to a mute.
const MAX_REASSERT_ATTEMPTS: u32 = 3;

/// Two volume readings within this distance count as the same level.
const VOLUME_EPSILON: f32 = 1e-3;

/// Tunable knobs. The escalation ladder itself (reassert, back off, mute) is
/// fixed behavior, not configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineTuning {
    /// Cap for newly observed applications.
    pub default_threshold: f32,
    /// Jump size that classifies a change as an application reset.
    pub reset_threshold: f32,
    /// How long a persistent offender is left alone before the next decision.
    pub grace_window: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            reset_threshold: RESET_THRESHOLD,
            grace_window: Duration::from_millis(600),
        }
    }
}

/// Runtime state for one application. Lives for the process lifetime; an app
/// with no session this tick keeps its slot for when it reappears.
#[derive(Debug, Clone, Default)]
struct AppState {
    /// Volume the session was left at when the last tick finished with it:
    /// the raw reading when nothing was written, the written value otherwise.
    baseline: f32,
    /// Consecutive reset detections since the last accepted user adjustment.
    reset_attempts: u32,
    /// Open back-off window; the app is skipped until it expires.
    hold_until: Option<Instant>,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickOutcome {
    dirty: bool,
    muted_changed: bool,
}

/// Owns all per-application decisions and drives the collaborating ports.
pub struct EnforcementEngine<A, N> {
    audio: A,
    notifier: N,
    store: SafeVolumeStore,
    tuning: EngineTuning,
    apps: HashMap<String, AppState>,
    muted: BTreeSet<String>,
}

impl<A: AudioSessionPort, N: NotificationPort> EnforcementEngine<A, N> {
    pub fn new(audio: A, notifier: N, store: SafeVolumeStore, tuning: EngineTuning) -> Self {
        Self {
            audio,
            notifier,
            store,
            tuning,
            apps: HashMap::new(),
            muted: BTreeSet::new(),
        }
    }

    /// Applications currently held in the forced-mute set.
    pub fn muted_apps(&self) -> &BTreeSet<String> {
        &self.muted
    }

    /// Learned safe volume for `app`, if any.
    pub fn safe_volume(&self, app: &str) -> Option<f32> {
        self.store.get(app)
    }

    /// One enforcement pass over every live session.
    ///
    /// `now` is taken as a parameter so back-off windows are deterministic
    /// under test; the supervisor passes the tick start time.
    pub fn run_tick(&mut self, now: Instant) {
        let sessions = match self.audio.list_sessions() {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!("session enumeration failed, skipping tick: {err}");
                return;
            }
        };

        let mut dirty = false;
        let mut muted_changed = false;
        for AppSession { app, volume } in sessions {
            let outcome = self.enforce_session(&app, volume, now);
            dirty |= outcome.dirty;
            muted_changed |= outcome.muted_changed;
        }

        if muted_changed {
            self.notifier.update_status(&self.muted);
        }
        if dirty {
            if let Err(err) = self.store.save(false) {
                warn!("safe-volume save failed, retrying next change: {err}");
            }
        }
    }

    /// Best-effort persistence, used for the final flush on shutdown.
    pub fn persist(&mut self, force: bool) {
        if let Err(err) = self.store.save(force) {
            error!("safe-volume save failed: {err}");
        }
    }

    fn enforce_session(&mut self, app: &str, current: f32, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let Some(safe) = self.store.get(app) else {
            // First sighting ever: cap immediately so a fresh launch cannot
            // blast at whatever default the OS hands it.
            let safe = current.min(self.tuning.default_threshold);
            self.store.set(app, safe);
            outcome.dirty = true;
            info!(
                "new session {app} at {:.1}%; safe volume set to {:.1}%",
                current * 100.0,
                safe * 100.0
            );
            if let Err(err) = self.audio.set_volume(app, safe) {
                warn!("{app}: applying initial cap failed: {err}");
                return outcome;
            }
            self.apps.insert(
                app.to_string(),
                AppState {
                    baseline: safe,
                    ..AppState::default()
                },
            );
            return outcome;
        };

        // Known from a previous run but not seen this process yet: measure
        // the first delta against the persisted safe volume.
        let state = self
            .apps
            .entry(app.to_string())
            .or_insert_with(|| AppState {
                baseline: safe,
                ..AppState::default()
            });

        if let Some(hold) = state.hold_until {
            if now < hold {
                // Back-off window: leave the offender alone entirely. Its
                // baseline stays frozen so the next reading after the window
                // still registers against the level we left it at.
                return outcome;
            }
            state.hold_until = None;
        }

        let muted = self.muted.contains(app);

        if !muted && (current - safe).abs() <= VOLUME_EPSILON {
            state.baseline = current;
            return outcome;
        }
        if muted && (current - state.baseline).abs() <= VOLUME_EPSILON {
            // Parked at the muted level; only a user change moves it on.
            state.baseline = current;
            return outcome;
        }

        let delta = current - state.baseline;
        if delta > self.tuning.reset_threshold {
            if muted {
                debug!(
                    "{app}: reset to {:.0}% ignored while muted",
                    current * 100.0
                );
                return outcome;
            }

            state.reset_attempts += 1;
            let attempt = state.reset_attempts;
            if attempt <= MAX_REASSERT_ATTEMPTS {
                info!(
                    "{app}: abrupt reset to {:.0}% (attempt {attempt}); restoring {:.1}%",
                    current * 100.0,
                    safe * 100.0
                );
                if let Err(err) = self.audio.set_volume(app, safe) {
                    // Treat a failed write as the tick not happening for this
                    // app; next enumeration retries with a fresh session.
                    warn!("{app}: reassert failed: {err}");
                    state.reset_attempts -= 1;
                    return outcome;
                }
                state.baseline = safe;
                if attempt == MAX_REASSERT_ATTEMPTS {
                    warn!("{app}: persistently resetting volume; backing off before escalating");
                    state.hold_until = Some(now + self.tuning.grace_window);
                }
            } else {
                let commanded = self
                    .audio
                    .set_volume(app, 0.0)
                    .and(self.audio.set_muted(app, true));
                if let Err(err) = commanded {
                    warn!("{app}: mute failed: {err}");
                    state.reset_attempts -= 1;
                    return outcome;
                }
                state.baseline = 0.0;
                self.muted.insert(app.to_string());
                self.notifier.notify_muted(app);
                outcome.muted_changed = true;
                warn!("{app} was forcefully muted after repeated volume resets");
            }
            return outcome;
        }

        // Anything gentler is the user's own adjustment; their preference
        // wins and becomes the new safe volume.
        state.reset_attempts = 0;
        state.hold_until = None;
        state.baseline = current;
        self.store.set(app, current);
        outcome.dirty = true;
        if self.muted.remove(app) {
            outcome.muted_changed = true;
            info!(
                "{app}: volume moved to {:.1}% by user; lifting mute",
                current * 100.0
            );
        } else {
            info!(
                "{app}: user adjusted volume to {:.1}%; keeping preference",
                current * 100.0
            );
        }
        outcome
    }
}
