#[cfg(target_os = "linux")]
use anyhow::anyhow;
use anyhow::Result;

// pthread names are limited to 16 bytes, including the null terminator.
#[cfg(target_os = "linux")]
const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Renames the calling OS thread, truncating to what pthread accepts.
///
/// `std::thread::Builder::name` only covers threads we spawn ourselves, this
/// also works for threads handed to us by a custom `ThreadFactory`.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_name(name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_PTHREAD_NAME_LEN - 1);

    // Zero-initialized, so the byte after the copied prefix is the terminator.
    let mut c_name: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];
    for (dst, src) in c_name.iter_mut().zip(&bytes[..len]) {
        *dst = *src as libc::c_char;
    }

    // SAFETY: `c_name` is a valid null-terminated buffer within pthread's limit.
    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), c_name.as_ptr());
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_name(_name: &str) {}

/// OS-level name of the calling thread.
#[cfg(target_os = "linux")]
#[allow(unused)]
pub(crate) fn current_thread_name() -> Result<String> {
    let mut c_name: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];

    // SAFETY: buffer length matches the size we pass in.
    let ret = unsafe {
        libc::pthread_getname_np(libc::pthread_self(), c_name.as_mut_ptr(), MAX_PTHREAD_NAME_LEN)
    };
    if ret != 0 {
        return Err(anyhow!("pthread_getname_np failed with error code: {ret}"));
    }

    // SAFETY: pthread_getname_np always null-terminates on success.
    let c_str = unsafe { std::ffi::CStr::from_ptr(c_name.as_ptr()) };
    Ok(c_str.to_str()?.to_owned())
}

#[cfg(not(target_os = "linux"))]
#[allow(unused)]
pub(crate) fn current_thread_name() -> Result<String> {
    Ok(std::thread::current().name().unwrap_or_default().to_owned())
}
