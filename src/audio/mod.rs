//! OS audio-session access: the WASAPI adapter on Windows plus a scripted
//! in-process substitute for smoke tests and development elsewhere.

use std::collections::BTreeSet;
use std::env;

use tracing::{info, warn};

use crate::ports::{AppSession, AudioSessionPort, SessionError};

#[cfg(windows)]
mod wasapi;
#[cfg(windows)]
pub use wasapi::WasapiSessions;

/// Environment variable that swaps the platform mixer for scripted sessions,
/// e.g. `VOLGUARD_SESSIONS="game.exe=0.5,player.exe=0.02"`.
pub const SESSIONS_ENV: &str = "VOLGUARD_SESSIONS";

/// Build the audio port for this process: scripted sessions when
/// [`SESSIONS_ENV`] is set, otherwise the platform mixer.
pub fn open_sessions() -> Result<Box<dyn AudioSessionPort>, SessionError> {
    if let Ok(spec) = env::var(SESSIONS_ENV) {
        info!("using scripted audio sessions from {SESSIONS_ENV}");
        return Ok(Box::new(StaticSessions::from_spec(&spec)));
    }
    platform_sessions()
}

#[cfg(windows)]
fn platform_sessions() -> Result<Box<dyn AudioSessionPort>, SessionError> {
    Ok(Box::new(WasapiSessions::new()?))
}

#[cfg(not(windows))]
fn platform_sessions() -> Result<Box<dyn AudioSessionPort>, SessionError> {
    Err(SessionError::Unavailable(
        "per-application audio sessions are only available on Windows".to_string(),
    ))
}

/// Fixed session list parsed from `app=volume` pairs. Writes apply in memory
/// so multi-tick runs behave like a compliant mixer.
#[derive(Debug, Default)]
pub struct StaticSessions {
    sessions: Vec<AppSession>,
    muted: BTreeSet<String>,
}

impl StaticSessions {
    pub fn from_spec(spec: &str) -> Self {
        let mut sessions = Vec::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((app, volume)) = entry.split_once('=') else {
                warn!("ignoring malformed session entry '{entry}'");
                continue;
            };
            match volume.trim().parse::<f32>() {
                Ok(volume) if (0.0..=1.0).contains(&volume) => sessions.push(AppSession {
                    app: app.trim().to_string(),
                    volume,
                }),
                _ => warn!("ignoring session entry '{entry}' with invalid volume"),
            }
        }
        Self {
            sessions,
            muted: BTreeSet::new(),
        }
    }

    pub fn is_muted(&self, app: &str) -> bool {
        self.muted.contains(app)
    }
}

impl AudioSessionPort for StaticSessions {
    fn list_sessions(&mut self) -> Result<Vec<AppSession>, SessionError> {
        Ok(self.sessions.clone())
    }

    fn set_volume(&mut self, app: &str, volume: f32) -> Result<(), SessionError> {
        match self.sessions.iter_mut().find(|session| session.app == app) {
            Some(session) => {
                session.volume = volume;
                Ok(())
            }
            None => Err(SessionError::NotFound(app.to_string())),
        }
    }

    fn set_muted(&mut self, app: &str, muted: bool) -> Result<(), SessionError> {
        if !self.sessions.iter().any(|session| session.app == app) {
            return Err(SessionError::NotFound(app.to_string()));
        }
        if muted {
            self.muted.insert(app.to_string());
        } else {
            self.muted.remove(app);
        }
        Ok(())
    }
}
