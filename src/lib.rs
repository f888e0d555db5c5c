//! Per-application safe-volume enforcement for desktop audio sessions.
//!
//! Learns a safe level for every application that opens an audio session,
//! re-asserts that level when the application resets itself, and force-mutes
//! applications that keep resetting. The library holds the decision logic;
//! the `volguard` binary wires it to the OS mixer and a status shell.

pub mod audio;
pub mod engine;
pub mod ports;
pub mod shutdown;
pub mod store;
pub mod telemetry;

pub use engine::{EnforcementEngine, EngineTuning, DEFAULT_THRESHOLD, RESET_THRESHOLD};
pub use ports::{AppSession, AudioSessionPort, NotificationPort, SessionError};
pub use store::{SafeVolumeStore, SafeVolumes};
