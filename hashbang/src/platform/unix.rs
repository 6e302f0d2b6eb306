// Unix implementation: execve through libc, paths and env entries as raw bytes

use std::ffi::{CStr, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::carray::CArray;

/// Replace the process image. Only returns on failure.
pub(crate) fn execve(path: &CStr, argv: &CArray<'_>, envp: &CArray<'_>) -> io::Error {
    // SAFETY: all three pointers come from live CStr/CArray borrows and both
    // arrays are NULL-terminated.
    unsafe {
        libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr());
    }
    io::Error::last_os_error()
}

/// ENOEXEC: the file exists and may be executed, but its format is unknown.
pub(crate) fn is_not_executable_format(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOEXEC)
}

pub(crate) fn cstr_to_path(path: &CStr) -> &Path {
    Path::new(OsStr::from_bytes(path.to_bytes()))
}

pub(crate) fn os_bytes(s: &OsStr) -> Vec<u8> {
    s.as_bytes().to_vec()
}
