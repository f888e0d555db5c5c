//! WASAPI session adapter: one audio session per owning process on the
//! default render endpoint, identified by executable name.
//!
//! Every operation re-enumerates the session list, the same way the session
//! manager hands them out. Sessions routinely vanish between calls, so a
//! missing target surfaces as a transient [`SessionError::NotFound`].

use std::ptr;

use windows::core::{Interface, PWSTR};
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Media::Audio::{
    eMultimedia, eRender, IAudioSessionControl2, IAudioSessionManager2, IMMDeviceEnumerator,
    ISimpleAudioVolume, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

use crate::ports::{AppSession, AudioSessionPort, SessionError};

/// Per-application session access through the Windows audio session manager.
pub struct WasapiSessions {
    _com: ComGuard,
}

/// Keeps COM initialized for the lifetime of the adapter.
struct ComGuard;

impl ComGuard {
    fn init() -> Result<Self, SessionError> {
        // SAFETY: plain COM runtime initialization for this thread; the
        // matching CoUninitialize runs in Drop.
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|err| SessionError::Unavailable(format!("COM init failed: {err}")))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        // SAFETY: balances the successful CoInitializeEx in init().
        unsafe { CoUninitialize() };
    }
}

impl WasapiSessions {
    pub fn new() -> Result<Self, SessionError> {
        Ok(Self {
            _com: ComGuard::init()?,
        })
    }

    /// Visit every session with an owning process on the default endpoint.
    fn each_session<F>(&self, mut visit: F) -> Result<(), SessionError>
    where
        F: FnMut(&str, &ISimpleAudioVolume) -> Result<(), SessionError>,
    {
        // SAFETY: COM is initialized for this thread (ComGuard); interface
        // pointers are used only while the owning objects are alive in scope.
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(unavailable)?;
            let device = enumerator
                .GetDefaultAudioEndpoint(eRender, eMultimedia)
                .map_err(unavailable)?;
            let manager: IAudioSessionManager2 =
                device.Activate(CLSCTX_ALL, None).map_err(unavailable)?;
            let sessions = manager.GetSessionEnumerator().map_err(unavailable)?;
            let count = sessions.GetCount().map_err(unavailable)?;

            for index in 0..count {
                let Ok(control) = sessions.GetSession(index) else {
                    continue;
                };
                let Ok(control2) = control.cast::<IAudioSessionControl2>() else {
                    continue;
                };
                // Pid 0 is the system-sounds session; it has no owning app.
                let pid = control2.GetProcessId().unwrap_or(0);
                if pid == 0 {
                    continue;
                }
                let Some(app) = process_image_name(pid) else {
                    continue;
                };
                let Ok(volume) = control.cast::<ISimpleAudioVolume>() else {
                    continue;
                };
                visit(&app, &volume)?;
            }
        }
        Ok(())
    }
}

impl AudioSessionPort for WasapiSessions {
    fn list_sessions(&mut self) -> Result<Vec<AppSession>, SessionError> {
        let mut listed = Vec::new();
        self.each_session(|app, volume| {
            // SAFETY: the interface pointer is valid for the visit call.
            let level = unsafe { volume.GetMasterVolume() }.map_err(unavailable)?;
            listed.push(AppSession {
                app: app.to_string(),
                volume: level,
            });
            Ok(())
        })?;
        Ok(listed)
    }

    fn set_volume(&mut self, app: &str, level: f32) -> Result<(), SessionError> {
        let mut found = false;
        self.each_session(|name, volume| {
            if name.eq_ignore_ascii_case(app) {
                // SAFETY: valid interface pointer; the event-context GUID is
                // optional and null means "no originator".
                unsafe { volume.SetMasterVolume(level, ptr::null()) }.map_err(unavailable)?;
                found = true;
            }
            Ok(())
        })?;
        if found {
            Ok(())
        } else {
            Err(SessionError::NotFound(app.to_string()))
        }
    }

    fn set_muted(&mut self, app: &str, muted: bool) -> Result<(), SessionError> {
        let mut found = false;
        self.each_session(|name, volume| {
            if name.eq_ignore_ascii_case(app) {
                // SAFETY: as in set_volume.
                unsafe { volume.SetMute(muted, ptr::null()) }.map_err(unavailable)?;
                found = true;
            }
            Ok(())
        })?;
        if found {
            Ok(())
        } else {
            Err(SessionError::NotFound(app.to_string()))
        }
    }
}

fn unavailable(err: windows::core::Error) -> SessionError {
    SessionError::Unavailable(err.to_string())
}

/// Executable name (file component only) for a process id.
fn process_image_name(pid: u32) -> Option<String> {
    // SAFETY: the process handle is closed on every path, and the buffer
    // length handed to the query matches the allocation.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
        let mut buffer = [0u16; 512];
        let mut length = buffer.len() as u32;
        let queried = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut length,
        );
        let _ = CloseHandle(handle);
        queried.ok()?;
        let path = String::from_utf16_lossy(&buffer[..length as usize]);
        path.rsplit(['\\', '/']).next().map(str::to_string)
    }
}
