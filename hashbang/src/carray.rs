use std::ffi::{c_char, CStr};
use std::marker::PhantomData;

/// NULL-terminated array of C string pointers, as taken by `execve`.
///
/// Borrows the strings it points at, so it cannot outlive them.
#[derive(Debug)]
pub struct CArray<'a> {
    ptrs: Vec<*const c_char>,
    _strings: PhantomData<&'a CStr>,
}

impl<'a> CArray<'a> {
    pub fn new<I>(strings: I) -> Self
    where
        I: IntoIterator<Item = &'a CStr>,
    {
        let mut ptrs: Vec<*const c_char> = strings.into_iter().map(CStr::as_ptr).collect();
        ptrs.push(std::ptr::null());
        Self {
            ptrs,
            _strings: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// Entries before the NULL sentinel.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All slots, sentinel included.
    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[*const c_char] {
        &self.ptrs
    }
}
