use std::ffi::CString;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// Priority for the audio thread. The block cadence leaves tens of
/// milliseconds of slack, so it only needs to outrank ordinary load, not
/// the whole machine.
const AUDIO_PRIORITY: libc::c_int = 50;

pub fn set_name(name: &str) {
    let Ok(cstr) = CString::new(name) else {
        return;
    };

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

/// Best-effort SCHED_FIFO for the calling thread. Missing privileges are
/// reported once and otherwise ignored; the pipeline still works, with more
/// capture jitter for the estimator to absorb.
pub fn set_realtime_priority() {
    let param = libc::sched_param {
        sched_priority: AUDIO_PRIORITY,
    };

    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc == 0 {
        return;
    }

    static WARNED: AtomicBool = AtomicBool::new(false);
    if WARNED.swap(true, Ordering::Relaxed) {
        return;
    }

    let err = std::io::Error::last_os_error();
    log::warn!("failed to set realtime thread priority: {err}");

    if err.kind() == ErrorKind::PermissionDenied {
        log::warn!("grant it with: setcap cap_sys_nice=ep $(command -v chord)");
    }
}
