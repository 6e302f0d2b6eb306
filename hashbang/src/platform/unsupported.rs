// Fallback for targets without execve: every exec attempt reports Unsupported

use std::borrow::Cow;
use std::ffi::{CStr, OsStr};
use std::io;
use std::path::Path;

use crate::carray::CArray;

pub(crate) fn execve(_path: &CStr, _argv: &CArray<'_>, _envp: &CArray<'_>) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "execve is not available on this platform")
}

pub(crate) fn is_not_executable_format(_err: &io::Error) -> bool {
    false
}

pub(crate) fn cstr_to_path(path: &CStr) -> Cow<'_, Path> {
    match path.to_str() {
        Ok(s) => Cow::Borrowed(Path::new(s)),
        Err(_) => Cow::Owned(Path::new(&*path.to_string_lossy()).to_path_buf()),
    }
}

pub(crate) fn os_bytes(s: &OsStr) -> Vec<u8> {
    s.to_string_lossy().into_owned().into_bytes()
}
