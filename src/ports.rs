//! Boundary traits for the OS mixer and the notification surface, so the
//! enforcement logic can be driven against scripted stand-ins.

use std::collections::BTreeSet;
use std::fmt;
use std::io;

/// One active application audio session as reported by the OS mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSession {
    /// Stable identifier for the owning application (executable name).
    pub app: String,
    /// Current session volume in `[0.0, 1.0]`.
    pub volume: f32,
}

/// Failures at the audio-session boundary.
///
/// Sessions come and go between enumeration and mutation; callers treat these
/// as transient and retry on the next enumeration.
#[derive(Debug)]
pub enum SessionError {
    /// The audio subsystem cannot be reached at all.
    Unavailable(String),
    /// No live session matches the application right now.
    NotFound(String),
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "audio subsystem unavailable: {detail}"),
            Self::NotFound(app) => write!(f, "no active audio session for {app}"),
            Self::Io(err) => write!(f, "audio session I/O failed: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Access to per-application audio sessions. Purely a conduit to the mixer;
/// no policy lives behind this trait.
pub trait AudioSessionPort {
    /// Applications with a live audio session right now, with their volumes.
    fn list_sessions(&mut self) -> Result<Vec<AppSession>, SessionError>;

    /// Set the session volume for every live session of `app`.
    fn set_volume(&mut self, app: &str, volume: f32) -> Result<(), SessionError>;

    /// Set the session mute flag for every live session of `app`.
    fn set_muted(&mut self, app: &str, muted: bool) -> Result<(), SessionError>;
}

impl<T: AudioSessionPort + ?Sized> AudioSessionPort for Box<T> {
    fn list_sessions(&mut self) -> Result<Vec<AppSession>, SessionError> {
        (**self).list_sessions()
    }

    fn set_volume(&mut self, app: &str, volume: f32) -> Result<(), SessionError> {
        (**self).set_volume(app, volume)
    }

    fn set_muted(&mut self, app: &str, muted: bool) -> Result<(), SessionError> {
        (**self).set_muted(app, muted)
    }
}

/// User-facing escalation surface. Calls are best-effort and must never block
/// the enforcement loop.
pub trait NotificationPort {
    /// A transient notice that `app` was forcibly muted.
    fn notify_muted(&mut self, app: &str);

    /// Refresh the status surface with the current muted set.
    fn update_status(&mut self, muted: &BTreeSet<String>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_display_names_the_app() {
        let err = SessionError::NotFound("game.exe".to_string());
        assert_eq!(err.to_string(), "no active audio session for game.exe");
    }

    #[test]
    fn session_error_wraps_io_errors_with_source() {
        let err = SessionError::from(io::Error::new(io::ErrorKind::Other, "device lost"));
        assert!(err.to_string().contains("device lost"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
