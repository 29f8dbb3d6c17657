//! C ABI over [`SessionHandle`]
//!
//! Sessions are opaque pointers created by `cs_session_create` and released
//! by `cs_session_free`. Fallible calls return 0 on success, a positive
//! error code on failure, or `CS_ERR_NULL_HANDLE` for a null handle.
//! Strings returned by `cs_session_last_error` stay valid until the next call
//! on the same handle or its release. Strings returned as `*mut c_char` must
//! be freed with `cs_string_free`.

use crate::capture::CaptureSourceFactory;
use crate::handle::SessionHandle;
use crate::logging;
use crate::session::{RecorderResult, SessionConfig};
use parking_lot::Mutex;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use tracing::{error, warn};

pub const CS_OK: i32 = 0;
pub const CS_ERR_NULL_HANDLE: i32 = -1;

/// Event callback: receives the event code and the registered user data
pub type CsEventCallback = extern "C" fn(event: i32, user_data: *mut c_void);

/// Opaque session handed across the boundary
pub struct CsSession {
    handle: SessionHandle,
    last_error: Mutex<Option<CString>>,
}

/// User data is only passed back to the caller, never dereferenced here
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

unsafe fn optional_str<'a>(ptr: *const c_char, what: &str) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr).to_str().map(Some).map_err(|e| {
        error!("{} is not valid UTF-8: {}", what, e);
    })
}

fn to_c_string(text: String) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

fn result_code(result: RecorderResult<()>) -> i32 {
    match result {
        Ok(()) => CS_OK,
        Err(e) => e.kind().code(),
    }
}

fn into_raw_session(result: RecorderResult<SessionHandle>) -> *mut CsSession {
    match result {
        Ok(handle) => Box::into_raw(Box::new(CsSession {
            handle,
            last_error: Mutex::new(None),
        })),
        Err(e) => {
            error!("Failed to create session: {}", e);
            ptr::null_mut()
        }
    }
}

/// Create a session; returns null on failure
///
/// `audio_device_id` may be null to auto-select.
///
/// # Safety
/// `output_path` must be a valid NUL-terminated string; `audio_device_id`
/// must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cs_session_create(
    output_path: *const c_char,
    width: u32,
    height: u32,
    fps: u32,
    quality: u32,
    display_id: u32,
    capture_audio: bool,
    audio_device_id: *const c_char,
) -> *mut CsSession {
    let output_path = match optional_str(output_path, "output_path") {
        Ok(Some(path)) => PathBuf::from(path),
        Ok(None) => {
            error!("Failed to create session: output_path is null");
            return ptr::null_mut();
        }
        Err(()) => return ptr::null_mut(),
    };
    let audio_device_id = match optional_str(audio_device_id, "audio_device_id") {
        Ok(id) => id.map(str::to_string),
        Err(()) => return ptr::null_mut(),
    };

    let config = SessionConfig {
        output_path,
        width,
        height,
        fps,
        quality,
        display_id,
        capture_audio,
        audio_device_id,
        ..Default::default()
    };
    into_raw_session(SessionHandle::create(config))
}

/// Create a session from a JSON `SessionConfig`; returns null on failure
///
/// # Safety
/// `config_json` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cs_session_create_json(config_json: *const c_char) -> *mut CsSession {
    let json = match optional_str(config_json, "config_json") {
        Ok(Some(json)) => json,
        _ => return ptr::null_mut(),
    };
    match serde_json::from_str::<SessionConfig>(json) {
        Ok(config) => into_raw_session(SessionHandle::create(config)),
        Err(e) => {
            error!("Failed to parse session config: {}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `session` must be null or a pointer returned by `cs_session_create*` and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn cs_session_start(session: *mut CsSession) -> i32 {
    match session.as_ref() {
        Some(session) => result_code(session.handle.start()),
        None => CS_ERR_NULL_HANDLE,
    }
}

/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_stop(session: *mut CsSession) -> i32 {
    match session.as_ref() {
        Some(session) => result_code(session.handle.stop()),
        None => CS_ERR_NULL_HANDLE,
    }
}

/// Recorded seconds; 0 for a null handle
///
/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_duration(session: *mut CsSession) -> f64 {
    session.as_ref().map_or(0.0, |session| session.handle.duration())
}

/// State ordinal (0 created .. 5 failed); -1 for a null handle
///
/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_state(session: *mut CsSession) -> i32 {
    session
        .as_ref()
        .map_or(CS_ERR_NULL_HANDLE, |session| session.handle.state().ordinal())
}

/// Register the event callback; a null callback clears it
///
/// The callback runs on a session thread and must not call back into
/// `cs_session_start`, `cs_session_stop` or `cs_session_free`.
///
/// # Safety
/// See [`cs_session_start`]. `user_data` is passed back untouched and must
/// stay valid while the callback is registered.
#[no_mangle]
pub unsafe extern "C" fn cs_session_set_callback(
    session: *mut CsSession,
    callback: Option<CsEventCallback>,
    user_data: *mut c_void,
) {
    let Some(session) = session.as_ref() else {
        warn!("cs_session_set_callback called with a null handle");
        return;
    };

    match callback {
        Some(callback) => {
            let user_data = UserData(user_data);
            session
                .handle
                .set_observer(move |event| callback(event.code(), user_data.get()));
        }
        None => session.handle.clear_observer(),
    }
}

/// Last error message, or null if none was recorded
///
/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_last_error(session: *mut CsSession) -> *const c_char {
    let Some(session) = session.as_ref() else {
        return ptr::null();
    };

    let mut slot = session.last_error.lock();
    *slot = session
        .handle
        .last_error()
        .map(|record| to_c_string(record.to_string()));
    slot.as_ref().map_or(ptr::null(), |message| message.as_ptr())
}

/// Code of the last recorded error; 0 if none
///
/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_last_error_code(session: *mut CsSession) -> i32 {
    match session.as_ref() {
        Some(session) => session
            .handle
            .last_error()
            .map_or(CS_OK, |record| record.kind.code()),
        None => CS_ERR_NULL_HANDLE,
    }
}

/// Session statistics as JSON; free with `cs_string_free`
///
/// # Safety
/// See [`cs_session_start`].
#[no_mangle]
pub unsafe extern "C" fn cs_session_stats_json(session: *mut CsSession) -> *mut c_char {
    let Some(session) = session.as_ref() else {
        return ptr::null_mut();
    };
    match serde_json::to_string(&session.handle.stats()) {
        Ok(json) => to_c_string(json).into_raw(),
        Err(e) => {
            error!("Failed to serialize session stats: {}", e);
            ptr::null_mut()
        }
    }
}

/// Audio input devices of the default capture source as JSON; free with `cs_string_free`
#[no_mangle]
pub extern "C" fn cs_audio_devices_json() -> *mut c_char {
    let devices = match CaptureSourceFactory::create(&SessionConfig::default()) {
        Ok(source) => source.audio_devices(),
        Err(e) => {
            error!("Failed to create capture source: {:#}", e);
            return ptr::null_mut();
        }
    };
    match serde_json::to_string(&devices) {
        Ok(json) => to_c_string(json).into_raw(),
        Err(e) => {
            error!("Failed to serialize audio devices: {}", e);
            ptr::null_mut()
        }
    }
}

/// Stop if needed and release the session
///
/// # Safety
/// `session` must be null or a pointer returned by `cs_session_create*`;
/// it must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn cs_session_free(session: *mut CsSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// # Safety
/// `text` must be null or a pointer returned by this library as `*mut c_char`.
#[no_mangle]
pub unsafe extern "C" fn cs_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Install the log subscriber at `level` (0 = error .. 4 = trace)
///
/// Returns false if logging was already initialized.
#[no_mangle]
pub extern "C" fn cs_log_init(level: i32) -> bool {
    let level = logging::level_from_code(level);
    let filter = format!("capture_session={}", level.as_str().to_lowercase());
    logging::init(&filter)
}

/// Log a message from native code at `level` (0 = error .. 4 = trace)
///
/// # Safety
/// `message` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cs_log(level: i32, message: *const c_char) {
    if message.is_null() {
        return;
    }
    let message = CStr::from_ptr(message).to_string_lossy();
    logging::forward(logging::level_from_code(level), &message);
}
