//! Argument vector reconstruction.
//!
//! The new vector is laid out as
//!
//! ```text
//! word[0] .. word[n-1]  script  original[1] .. original[m-1]  NULL
//! ```
//!
//! Directive words are copied, because the scanned line they come from is
//! short-lived. The script path and the original arguments are reused by
//! reference and must outlive the vector.

use std::borrow::Cow;
use std::ffi::{CStr, CString};

use crate::carray::CArray;
use crate::error::BuildError;
use crate::scan::Directive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedArgv<'a> {
    args: Vec<Cow<'a, CStr>>,
    words: usize,
}

/// Build the interpreter argument vector for `script`.
///
/// `original` is the argument vector the script was meant to run with; its
/// first element (the program name) is not carried over.
pub fn build<'a>(
    directive: &Directive,
    script: &'a CStr,
    original: &[&'a CStr],
) -> Result<ReconstructedArgv<'a>, BuildError> {
    build_from_words(directive.words(), script, original)
}

/// Same as [`build`], for words that did not come from a scan.
pub fn build_from_words<'a, 'w, I>(
    words: I,
    script: &'a CStr,
    original: &[&'a CStr],
) -> Result<ReconstructedArgv<'a>, BuildError>
where
    I: IntoIterator<Item = &'w [u8]>,
    I::IntoIter: ExactSizeIterator,
{
    let words = words.into_iter();
    let word_count = words.len();
    let tail = original.get(1..).unwrap_or(&[]);
    let elements = word_count + 1 + tail.len();

    let mut args: Vec<Cow<'a, CStr>> = Vec::new();
    args.try_reserve_exact(elements)
        .map_err(|_| BuildError::OutOfMemory { elements })?;

    for (index, word) in words.enumerate() {
        let mut bytes: Vec<u8> = Vec::new();
        bytes
            .try_reserve_exact(word.len() + 1)
            .map_err(|_| BuildError::OutOfMemory { elements })?;
        bytes.extend_from_slice(word);
        let word = CString::new(bytes).map_err(|_| BuildError::InteriorNul { index })?;
        args.push(Cow::Owned(word));
    }

    args.push(Cow::Borrowed(script));
    args.extend(tail.iter().copied().map(Cow::Borrowed));

    Ok(ReconstructedArgv {
        args,
        words: word_count,
    })
}

impl<'a> ReconstructedArgv<'a> {
    /// Number of entries, not counting the NULL sentinel.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Always false: the script path is always present.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.args.get(index).map(|arg| &**arg)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &CStr> + '_ {
        self.args.iter().map(|arg| &**arg)
    }

    /// Number of directive words at the front of the vector.
    pub fn word_count(&self) -> usize {
        self.words
    }

    /// The program to execute: the first directive word, or the script path
    /// itself for an empty directive line.
    pub fn interpreter(&self) -> &CStr {
        &self.args[0]
    }

    /// The script path slot.
    pub fn script(&self) -> &CStr {
        &self.args[self.words]
    }

    /// Whether the entry at `index` is owned by this vector rather than
    /// borrowed from the caller.
    #[cfg(test)]
    pub(crate) fn is_copied(&self, index: usize) -> bool {
        matches!(self.args.get(index), Some(Cow::Owned(_)))
    }

    /// Put the caller's program name back into slot 0.
    ///
    /// Only the name the new program sees changes; read [`Self::interpreter`]
    /// before calling this to know what to execute.
    pub fn set_program_name(&mut self, name: &'a CStr) {
        self.args[0] = Cow::Borrowed(name);
    }

    /// NULL-terminated pointer view, suitable for `execve`.
    pub fn as_c_argv(&self) -> CArray<'_> {
        CArray::new(self.iter())
    }

    pub fn to_vec_lossy(&self) -> Vec<String> {
        self.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    /// Copy every borrowed entry, detaching the vector from the caller's
    /// storage.
    #[cfg(test)]
    pub(crate) fn into_owned(self) -> ReconstructedArgv<'static> {
        ReconstructedArgv {
            args: self
                .args
                .into_iter()
                .map(|arg| Cow::Owned(arg.into_owned()))
                .collect(),
            words: self.words,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::scan::tokenize;

    fn cstrings(items: &[&str]) -> Vec<CString> {
        items.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    fn refs(items: &[CString]) -> Vec<&CStr> {
        items.iter().map(CString::as_c_str).collect()
    }

    #[test]
    fn prepends_words_and_script_and_drops_program_name() {
        let directive = tokenize(b"/bin/sh -x\n", &ScanConfig::default()).unwrap();
        let script = CString::new("/tmp/script").unwrap();
        let original = cstrings(&["script", "foo", "bar"]);

        let argv = build(&directive, &script, &refs(&original)).unwrap();
        assert_eq!(argv.to_vec_lossy(), ["/bin/sh", "-x", "/tmp/script", "foo", "bar"]);
        assert_eq!(argv.word_count(), 2);
        assert_eq!(argv.interpreter().to_bytes(), b"/bin/sh");
        assert_eq!(argv.script(), script.as_c_str());

        let c_argv = argv.as_c_argv();
        assert_eq!(c_argv.len(), 5);
        assert!(c_argv.as_slice()[5].is_null());
    }

    #[test]
    fn empty_directive_runs_the_script_itself() {
        let directive = tokenize(b"\n", &ScanConfig::default()).unwrap();
        let script = CString::new("./run").unwrap();
        let original = cstrings(&["run", "-v"]);

        let argv = build(&directive, &script, &refs(&original)).unwrap();
        assert_eq!(argv.to_vec_lossy(), ["./run", "-v"]);
        assert_eq!(argv.interpreter(), script.as_c_str());
        assert_eq!(argv.word_count(), 0);
    }

    #[test]
    fn length_follows_words_script_and_tail() {
        let script = CString::new("s").unwrap();
        let words: [&[u8]; 3] = [b"a", b"b", b"c"];

        for original_len in 0..4usize {
            let original: Vec<CString> = (0..original_len)
                .map(|i| CString::new(format!("arg{i}")).unwrap())
                .collect();
            let argv = build_from_words(words, &script, &refs(&original)).unwrap();
            assert_eq!(argv.len(), 3 + 1 + original_len.saturating_sub(1));
            assert_eq!(argv.as_c_argv().as_slice().len(), argv.len() + 1);
        }
    }

    #[test]
    fn repeated_builds_are_independent() {
        let directive = tokenize(b"/usr/bin/env python3\n", &ScanConfig::default()).unwrap();
        let script = CString::new("/srv/tool.py").unwrap();
        let original = cstrings(&["tool", "--check"]);

        let first = build(&directive, &script, &refs(&original)).unwrap();
        let second = build(&directive, &script, &refs(&original)).unwrap();

        assert_eq!(first, second);
        for index in 0..first.word_count() {
            assert_ne!(
                first.get(index).unwrap().as_ptr(),
                second.get(index).unwrap().as_ptr()
            );
        }
    }

    #[test]
    fn words_are_copied_but_script_and_tail_alias_caller_storage() {
        let script = CString::new("/tmp/script").unwrap();
        let original = cstrings(&["script", "foo", "bar"]);
        let original_refs = refs(&original);

        let (argv, line_range) = {
            let directive = tokenize(b"/bin/sh -x\n", &ScanConfig::default()).unwrap();
            let line = directive.line().as_ptr_range();
            let line_range = (line.start as usize)..(line.end as usize);
            (build(&directive, &script, &original_refs).unwrap(), line_range)
        };

        // The directive is gone; its words live on in the vector.
        assert_eq!(argv.to_vec_lossy()[..2], ["/bin/sh", "-x"]);
        for index in 0..argv.word_count() {
            assert!(argv.is_copied(index));
            let ptr = argv.get(index).unwrap().as_ptr() as usize;
            assert!(!line_range.contains(&ptr));
        }

        assert!(!argv.is_copied(2));
        assert_eq!(argv.get(2).unwrap().as_ptr(), script.as_ptr());
        assert!(!argv.is_copied(3));
        assert_eq!(argv.get(3).unwrap().as_ptr(), original[1].as_ptr());
        assert_eq!(argv.get(4).unwrap().as_ptr(), original[2].as_ptr());

        let slots = argv.as_c_argv();
        assert_eq!(slots.as_slice()[3], original[1].as_ptr());
    }

    #[test]
    fn owned_copy_outlives_caller_storage() {
        let argv = {
            let script = CString::new("/tmp/script").unwrap();
            let original = cstrings(&["script", "foo"]);
            build_from_words([&b"/bin/sh"[..]], &script, &refs(&original))
                .unwrap()
                .into_owned()
        };
        assert_eq!(argv.to_vec_lossy(), ["/bin/sh", "/tmp/script", "foo"]);
        assert!((0..argv.len()).all(|i| argv.is_copied(i)));
    }

    #[test]
    fn program_name_replaces_first_slot_only() {
        let script = CString::new("/tmp/script").unwrap();
        let name = CString::new("my-tool").unwrap();
        let original = cstrings(&["my-tool", "x"]);

        let mut argv =
            build_from_words([&b"/bin/sh"[..], b"-e"], &script, &refs(&original)).unwrap();
        argv.set_program_name(&name);
        assert_eq!(argv.to_vec_lossy(), ["my-tool", "-e", "/tmp/script", "x"]);
    }

    #[test]
    fn words_with_nul_are_rejected() {
        let script = CString::new("s").unwrap();
        let err = build_from_words([&b"ok"[..], b"b\0d"], &script, &[]).unwrap_err();
        assert_eq!(err, BuildError::InteriorNul { index: 1 });
    }
}
