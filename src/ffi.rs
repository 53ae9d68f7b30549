// src/ffi.rs
//
// C ABI over ReaderHandle.
//
// Two surfaces:
// - `serial_reader_*`: explicit handles owned by the caller.
// - `InitialiseReader` / `Connect` / ...: the process-wide single reader
//   used by existing C callers.
//
// No panic unwinds across this boundary; every entry point runs inside
// `catch_unwind` and reports `ReaderStatusCode::Panic` instead.

use std::ffi::{c_char, c_int, c_uint, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::error::{ReaderError, Result};
use crate::handle::{delay, ReaderHandle};
use crate::io::{StreamEnd, Terminator, WorkerStatus};
use crate::settings::ReaderConfig;
use crate::snapshot::LineArray;

/// Result code of the C entry points
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatusCode {
    Ok = 0,
    ChannelOpenFailure = 1,
    ChannelReadFailure = 2,
    Empty = 3,
    Disposed = 4,
    Busy = 5,
    InvalidArgument = 6,
    InvalidConfig = 7,
    BufferTooSmall = 8,
    Panic = 9,
    Io = 10,
}

impl From<&ReaderError> for ReaderStatusCode {
    fn from(err: &ReaderError) -> Self {
        match err {
            ReaderError::ChannelOpen(_) => ReaderStatusCode::ChannelOpenFailure,
            ReaderError::ChannelRead(_) => ReaderStatusCode::ChannelReadFailure,
            ReaderError::Empty => ReaderStatusCode::Empty,
            ReaderError::Disposed => ReaderStatusCode::Disposed,
            ReaderError::Busy(_) => ReaderStatusCode::Busy,
            ReaderError::InvalidConfig(_) | ReaderError::Config(_) => ReaderStatusCode::InvalidConfig,
            ReaderError::Io(_) => ReaderStatusCode::Io,
        }
    }
}

// ============================================================================
// Boundary helpers
// ============================================================================

fn ffi_guard<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tlog!("[ffi] {} panicked: {}", name, msg);
            fallback
        }
    }
}

fn to_code(name: &str, result: Result<ReaderStatusCode>) -> c_int {
    match result {
        Ok(code) => code as c_int,
        Err(e) => {
            tlog!("[ffi] {} failed: {}", name, e);
            ReaderStatusCode::from(&e) as c_int
        }
    }
}

/// Run `f` against a caller-supplied handle pointer.
///
/// # Safety
/// `handle` must be null or a pointer returned by `serial_reader_new` /
/// `serial_reader_from_config_file` that has not been freed.
unsafe fn with_handle(
    name: &str,
    handle: *const ReaderHandle,
    f: impl FnOnce(&ReaderHandle) -> Result<ReaderStatusCode>,
) -> c_int {
    // SAFETY: validity of a non-null pointer is the caller's contract.
    let Some(reader) = (unsafe { handle.as_ref() }) else {
        return ReaderStatusCode::InvalidArgument as c_int;
    };
    ffi_guard(name, ReaderStatusCode::Panic as c_int, || to_code(name, f(reader)))
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_bytes<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    Some(unsafe { CStr::from_ptr(ptr) }.to_bytes())
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    unsafe { c_bytes(ptr) }.and_then(|bytes| std::str::from_utf8(bytes).ok())
}

fn into_raw(result: Result<ReaderHandle>) -> *mut ReaderHandle {
    match result {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            tlog!("[ffi] Failed to create reader: {}", e);
            std::ptr::null_mut()
        }
    }
}

// ============================================================================
// Handle API
// ============================================================================

/// Create a reader for `port`. Does not open the device.
/// `buffer_size` 0 selects the default line capacity. Returns null on
/// invalid arguments.
///
/// # Safety
/// `port` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_new(
    port: *const c_char,
    baud: c_uint,
    buffer_size: c_uint,
) -> *mut ReaderHandle {
    ffi_guard("serial_reader_new", std::ptr::null_mut(), || {
        let Some(port) = (unsafe { c_str(port) }) else {
            tlog!("[ffi] serial_reader_new: port is null or not UTF-8");
            return std::ptr::null_mut();
        };
        into_raw(ReaderHandle::initialize(port, baud, buffer_size as usize))
    })
}

/// Create a reader from a TOML config file. Returns null on failure.
///
/// # Safety
/// `path` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_from_config_file(path: *const c_char) -> *mut ReaderHandle {
    ffi_guard("serial_reader_from_config_file", std::ptr::null_mut(), || {
        let Some(path) = (unsafe { c_str(path) }) else {
            return std::ptr::null_mut();
        };
        into_raw(ReaderConfig::load(Path::new(path)).and_then(ReaderHandle::new))
    })
}

/// Replace the line terminator; rejected with `Busy` while reading.
///
/// # Safety
/// `handle` must be a live handle pointer or null; `terminator` must be null
/// or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_set_terminator(
    handle: *const ReaderHandle,
    terminator: *const c_char,
) -> c_int {
    let Some(bytes) = (unsafe { c_bytes(terminator) }) else {
        return ReaderStatusCode::InvalidArgument as c_int;
    };
    unsafe {
        with_handle("serial_reader_set_terminator", handle, |h| {
            h.set_terminator(Terminator::new(bytes)?)?;
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Open the device. Returns 1 on success, 0 on failure (including a null or
/// destroyed handle).
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_connect(handle: *const ReaderHandle) -> c_int {
    let Some(reader) = (unsafe { handle.as_ref() }) else {
        return 0;
    };
    ffi_guard("serial_reader_connect", 0, || match reader.connect() {
        Ok(connected) => c_int::from(connected),
        Err(e) => {
            tlog!("[ffi] serial_reader_connect failed: {}", e);
            0
        }
    })
}

/// Start the acquisition worker. `Ok` also when it was already running or
/// the device is not connected yet.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_start(handle: *const ReaderHandle) -> c_int {
    unsafe {
        with_handle("serial_reader_start", handle, |h| {
            h.start_reading()?;
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Request the worker to stop. Returns without waiting.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_stop(handle: *const ReaderHandle) -> c_int {
    unsafe {
        with_handle("serial_reader_stop", handle, |h| {
            h.stop_reading()?;
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Wait for the worker to exit. `Busy` if it is still running after
/// `timeout_ms`.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_wait_stopped(handle: *const ReaderHandle, timeout_ms: c_uint) -> c_int {
    unsafe {
        with_handle("serial_reader_wait_stopped", handle, |h| {
            if h.wait_stopped(Duration::from_millis(u64::from(timeout_ms)))? {
                Ok(ReaderStatusCode::Ok)
            } else {
                Ok(ReaderStatusCode::Busy)
            }
        })
    }
}

/// Snapshot of all lines received so far.
///
/// The strings are owned by the handle and stay valid until the next export,
/// `serial_reader_release_snapshot` or `serial_reader_destroy`. Empty
/// (`{0, NULL}`) when there are no lines or on error.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_export(handle: *const ReaderHandle) -> LineArray {
    let Some(reader) = (unsafe { handle.as_ref() }) else {
        return LineArray::empty();
    };
    ffi_guard("serial_reader_export", LineArray::empty(), || {
        reader.export_line_array().unwrap_or_else(|e| {
            tlog!("[ffi] serial_reader_export failed: {}", e);
            LineArray::empty()
        })
    })
}

/// Free the memory behind the last `serial_reader_export`.
///
/// # Safety
/// `handle` must be a live handle pointer or null. Pointers from the last
/// export must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_release_snapshot(handle: *const ReaderHandle) -> c_int {
    unsafe {
        with_handle("serial_reader_release_snapshot", handle, |h| {
            h.release_snapshot()?;
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Copy the most recent line, NUL-terminated, into `out`.
///
/// `*len` (if non-null) receives the line length without the NUL, also when
/// `BufferTooSmall` is returned. `Empty` if no line has completed yet.
///
/// # Safety
/// `handle` must be a live handle pointer or null. `out` must be null or
/// valid for `capacity` bytes; `len` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_last_line(
    handle: *const ReaderHandle,
    out: *mut c_char,
    capacity: usize,
    len: *mut usize,
) -> c_int {
    unsafe {
        with_handle("serial_reader_last_line", handle, |h| {
            let line = h.last_line()?;
            let n = line.bytes.len();
            if !len.is_null() {
                *len = n;
            }
            if out.is_null() || capacity <= n {
                return Ok(ReaderStatusCode::BufferTooSmall);
            }
            std::ptr::copy_nonoverlapping(line.bytes.as_ptr(), out.cast::<u8>(), n);
            *out.add(n) = 0;
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Worker health: `Ok`, `ChannelReadFailure` once the worker died on a
/// read error, or `Disposed`.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_status(handle: *const ReaderHandle) -> c_int {
    unsafe {
        with_handle("serial_reader_status", handle, |h| {
            match h.status()? {
                WorkerStatus::Ended(StreamEnd::Error(reason)) => Err(ReaderError::ChannelRead(reason)),
                _ => Ok(ReaderStatusCode::Ok),
            }
        })
    }
}

/// Stop, release the device and drop all lines. Idempotent; the handle
/// memory itself is freed by `serial_reader_free`.
///
/// # Safety
/// `handle` must be a live handle pointer or null.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_destroy(handle: *const ReaderHandle) -> c_int {
    unsafe {
        with_handle("serial_reader_destroy", handle, |h| {
            h.destroy();
            Ok(ReaderStatusCode::Ok)
        })
    }
}

/// Destroy (if needed) and free the handle.
///
/// # Safety
/// `handle` must be null or a pointer from `serial_reader_new` /
/// `serial_reader_from_config_file`, and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_free(handle: *mut ReaderHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: the pointer came from Box::into_raw and is freed once.
    let reader = unsafe { Box::from_raw(handle) };
    ffi_guard("serial_reader_free", (), move || drop(reader));
}

#[no_mangle]
pub extern "C" fn serial_reader_delay(seconds: c_uint) {
    delay(seconds);
}

/// Append log output to a timestamped file in `dir`.
///
/// # Safety
/// `dir` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn serial_reader_enable_file_log(dir: *const c_char) -> c_int {
    let Some(dir) = (unsafe { c_str(dir) }) else {
        return ReaderStatusCode::InvalidArgument as c_int;
    };
    ffi_guard("serial_reader_enable_file_log", ReaderStatusCode::Panic as c_int, || {
        to_code(
            "serial_reader_enable_file_log",
            crate::logging::init_file_logging(Path::new(dir)).map(|_| ReaderStatusCode::Ok),
        )
    })
}

// ============================================================================
// Process-wide reader
// ============================================================================

/// Layout-compatible name for existing C callers
pub type ResultStruct = LineArray;

enum LegacySlot {
    Empty,
    Live(ReaderHandle),
    Disposed,
}

static LEGACY_READER: Lazy<Mutex<LegacySlot>> = Lazy::new(|| Mutex::new(LegacySlot::Empty));

fn with_legacy<T>(name: &str, fallback: T, f: impl FnOnce(&ReaderHandle) -> T) -> T {
    ffi_guard(name, None, || {
        let slot = LEGACY_READER.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            LegacySlot::Live(reader) => Some(f(reader)),
            LegacySlot::Empty | LegacySlot::Disposed => None,
        }
    })
    .unwrap_or(fallback)
}

/// Create the process-wide reader. Ignored while one already exists.
///
/// # Safety
/// `id` must be null or a NUL-terminated string.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn InitialiseReader(id: *const c_char, baud: c_uint, buffer_size: c_uint) {
    let Some(port) = (unsafe { c_str(id) }) else {
        tlog!("[ffi] InitialiseReader: port is null or not UTF-8");
        return;
    };
    ffi_guard("InitialiseReader", (), || {
        let mut slot = LEGACY_READER.lock().unwrap_or_else(PoisonError::into_inner);
        if let LegacySlot::Live(existing) = &*slot {
            tlog!("[ffi] InitialiseReader ignored, reader for {} already exists", existing.port());
            return;
        }
        match ReaderHandle::initialize(port, baud, buffer_size as usize) {
            Ok(reader) => *slot = LegacySlot::Live(reader),
            Err(e) => tlog!("[ffi] InitialiseReader failed: {}", e),
        }
    });
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn Connect() -> c_int {
    with_legacy("Connect", 0, |reader| {
        c_int::from(reader.connect().unwrap_or(false))
    })
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn StartRead() {
    with_legacy("StartRead", (), |reader| {
        if let Err(e) = reader.start_reading() {
            tlog!("[ffi] StartRead failed: {}", e);
        }
    })
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn StopRead() {
    with_legacy("StopRead", (), |reader| {
        if let Err(e) = reader.stop_reading() {
            tlog!("[ffi] StopRead failed: {}", e);
        }
    })
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn Delay(seconds: c_uint) {
    delay(seconds);
}

/// Lines so far; valid until the next call or `DeleteReaderPointer`.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn GetCTypeArray() -> ResultStruct {
    with_legacy("GetCTypeArray", LineArray::empty(), |reader| {
        reader.export_line_array().unwrap_or_else(|_| LineArray::empty())
    })
}

/// Set the terminator of the process-wide reader.
///
/// # Safety
/// `terminator` must be null or a NUL-terminated string.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SetLineEndCharacters(terminator: *const c_char) {
    let Some(bytes) = (unsafe { c_bytes(terminator) }) else {
        return;
    };
    with_legacy("SetLineEndCharacters", (), |reader| {
        if let Err(e) = Terminator::new(bytes).and_then(|t| reader.set_terminator(t)) {
            tlog!("[ffi] SetLineEndCharacters failed: {}", e);
        }
    })
}

/// Destroy the process-wide reader. Later calls fail until the next
/// `InitialiseReader`.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn DeleteReaderPointer() {
    ffi_guard("DeleteReaderPointer", (), || {
        let previous = {
            let mut slot = LEGACY_READER.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, LegacySlot::Disposed)
        };
        // Worker join happens outside the slot lock
        if let LegacySlot::Live(reader) = previous {
            reader.destroy();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::{ScriptedChannel, ScriptedOpener, Step};
    use std::ffi::CString;
    use std::time::Instant;

    fn scripted_handle(steps: Vec<Step>) -> *mut ReaderHandle {
        let config = ReaderConfig::new("/dev/ttyTEST", 9600, 256);
        let opener = ScriptedOpener::with_channel(ScriptedChannel::new(steps));
        Box::into_raw(Box::new(ReaderHandle::with_opener(config, opener).unwrap()))
    }

    unsafe fn exported_strings(array: LineArray) -> Vec<String> {
        (0..array.size as usize)
            .map(|i| {
                CStr::from_ptr(*array.results.add(i))
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn test_null_handle_is_invalid_argument() {
        let null = std::ptr::null();
        unsafe {
            assert_eq!(serial_reader_start(null), ReaderStatusCode::InvalidArgument as c_int);
            assert_eq!(serial_reader_destroy(null), ReaderStatusCode::InvalidArgument as c_int);
            assert_eq!(serial_reader_connect(null), 0);
            assert!(serial_reader_export(null).results.is_null());
            serial_reader_free(std::ptr::null_mut());
            assert!(serial_reader_new(std::ptr::null(), 9600, 256).is_null());
        }
    }

    #[test]
    fn test_new_rejects_empty_port() {
        let port = CString::new("").unwrap();
        let handle = unsafe { serial_reader_new(port.as_ptr(), 9600, 256) };
        assert!(handle.is_null());
    }

    #[test]
    fn test_handle_lifecycle() {
        let handle = scripted_handle(vec![Step::Bytes(b"HELLO\r\nWORLD\r\n".to_vec())]);
        unsafe {
            let mut len = 0usize;
            let mut buf = [0 as c_char; 16];
            assert_eq!(
                serial_reader_last_line(handle, buf.as_mut_ptr(), buf.len(), &mut len),
                ReaderStatusCode::Empty as c_int
            );
            assert!(serial_reader_export(handle).results.is_null());

            assert_eq!(serial_reader_connect(handle), 1);
            assert_eq!(serial_reader_start(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_start(handle), ReaderStatusCode::Ok as c_int);

            let deadline = Instant::now() + Duration::from_secs(5);
            let mut array = serial_reader_export(handle);
            while array.size < 2 {
                assert!(Instant::now() < deadline);
                std::thread::sleep(Duration::from_millis(1));
                array = serial_reader_export(handle);
            }
            assert_eq!(exported_strings(array), vec!["HELLO", "WORLD"]);

            assert_eq!(
                serial_reader_last_line(handle, buf.as_mut_ptr(), buf.len(), &mut len),
                ReaderStatusCode::Ok as c_int
            );
            assert_eq!(len, 5);
            assert_eq!(CStr::from_ptr(buf.as_ptr()).to_bytes(), b"WORLD");

            let mut small = [0 as c_char; 5];
            assert_eq!(
                serial_reader_last_line(handle, small.as_mut_ptr(), small.len(), &mut len),
                ReaderStatusCode::BufferTooSmall as c_int
            );

            assert_eq!(serial_reader_release_snapshot(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_status(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_stop(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_wait_stopped(handle, 5000), ReaderStatusCode::Ok as c_int);

            assert_eq!(serial_reader_destroy(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_destroy(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_start(handle), ReaderStatusCode::Disposed as c_int);
            assert_eq!(serial_reader_status(handle), ReaderStatusCode::Disposed as c_int);
            assert_eq!(serial_reader_connect(handle), 0);
            assert!(serial_reader_export(handle).results.is_null());
            serial_reader_free(handle);
        }
    }

    #[test]
    fn test_terminator_and_busy() {
        let handle = scripted_handle(vec![Step::Bytes(b"a|b|".to_vec())]);
        let pipe = CString::new("|").unwrap();
        let empty = CString::new("").unwrap();
        unsafe {
            assert_eq!(
                serial_reader_set_terminator(handle, empty.as_ptr()),
                ReaderStatusCode::InvalidConfig as c_int
            );
            assert_eq!(serial_reader_set_terminator(handle, pipe.as_ptr()), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_connect(handle), 1);
            assert_eq!(serial_reader_start(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(
                serial_reader_set_terminator(handle, pipe.as_ptr()),
                ReaderStatusCode::Busy as c_int
            );

            let deadline = Instant::now() + Duration::from_secs(5);
            while serial_reader_export(handle).size < 2 {
                assert!(Instant::now() < deadline);
                std::thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(exported_strings(serial_reader_export(handle)), vec!["a", "b"]);
            serial_reader_free(handle);
        }
    }

    #[test]
    fn test_status_reports_read_failure() {
        let handle = scripted_handle(vec![Step::Fail(std::io::ErrorKind::BrokenPipe)]);
        unsafe {
            assert_eq!(serial_reader_connect(handle), 1);
            assert_eq!(serial_reader_start(handle), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_wait_stopped(handle, 5000), ReaderStatusCode::Ok as c_int);
            assert_eq!(serial_reader_status(handle), ReaderStatusCode::ChannelReadFailure as c_int);
            serial_reader_free(handle);
        }
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(&path, "port = \"/dev/ttyUSB9\"\nbaud_rate = 115200\n").unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let missing = CString::new(dir.path().join("missing.toml").to_str().unwrap()).unwrap();
        unsafe {
            let handle = serial_reader_from_config_file(c_path.as_ptr());
            assert!(!handle.is_null());
            assert_eq!((*handle).config().unwrap().baud_rate, 115200);
            serial_reader_free(handle);

            assert!(serial_reader_from_config_file(missing.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(ReaderStatusCode::from(&ReaderError::Empty), ReaderStatusCode::Empty);
        assert_eq!(
            ReaderStatusCode::from(&ReaderError::ChannelOpen("x".into())),
            ReaderStatusCode::ChannelOpenFailure
        );
        assert_eq!(ReaderStatusCode::Ok as c_int, 0);
        assert_eq!(ReaderStatusCode::Panic as c_int, 9);
    }

    #[test]
    fn test_guard_catches_panic() {
        let code = ffi_guard("test", ReaderStatusCode::Panic as c_int, || -> c_int {
            panic!("boom")
        });
        assert_eq!(code, ReaderStatusCode::Panic as c_int);
    }

    #[test]
    fn test_legacy_fallback_on_missing_reader_or_panic() {
        // Same result whether or not the process-wide reader exists
        let value = with_legacy("test", 7, |_| -> i32 { panic!("boom") });
        assert_eq!(value, 7);
    }

    fn legacy_port() -> Option<String> {
        match &*LEGACY_READER.lock().unwrap() {
            LegacySlot::Live(reader) => Some(reader.port().to_string()),
            LegacySlot::Empty | LegacySlot::Disposed => None,
        }
    }

    // The only test touching the process-wide reader
    #[test]
    fn test_legacy_reader_lifecycle() {
        assert_eq!(Connect(), 0);
        assert!(GetCTypeArray().results.is_null());

        let port = CString::new("/dev/serial-lines-missing-device").unwrap();
        let other = CString::new("/dev/serial-lines-other").unwrap();
        unsafe {
            InitialiseReader(port.as_ptr(), 9600, 256);
            InitialiseReader(other.as_ptr(), 9600, 256);
        }
        assert_eq!(legacy_port().as_deref(), Some("/dev/serial-lines-missing-device"));

        assert_eq!(Connect(), 0);
        StartRead();
        StopRead();
        let array = GetCTypeArray();
        assert_eq!(array.size, 0);
        assert!(array.results.is_null());

        DeleteReaderPointer();
        DeleteReaderPointer();
        assert_eq!(Connect(), 0);
        assert!(GetCTypeArray().results.is_null());

        unsafe { InitialiseReader(other.as_ptr(), 9600, 0) };
        assert_eq!(legacy_port().as_deref(), Some("/dev/serial-lines-other"));
        DeleteReaderPointer();
    }
}
