use std::ffi::{CStr, CString};

/// Environment handed to the executed program.
#[derive(Debug, Clone, Copy, Default)]
pub enum Environment<'a> {
    /// Whatever the current process has when the exec is attempted.
    #[default]
    Inherit,
    /// Exactly these `KEY=VALUE` entries.
    Explicit(&'a [&'a CStr]),
}

impl<'a> Environment<'a> {
    /// Resolve to concrete entries. `Inherit` snapshots the process
    /// environment at this point; nothing downstream reads it again.
    pub(crate) fn resolve(self) -> ResolvedEnv<'a> {
        match self {
            Self::Inherit => ResolvedEnv::Snapshot(snapshot()),
            Self::Explicit(entries) => ResolvedEnv::Explicit(entries),
        }
    }
}

pub(crate) enum ResolvedEnv<'a> {
    Snapshot(Vec<CString>),
    Explicit(&'a [&'a CStr]),
}

impl ResolvedEnv<'_> {
    pub(crate) fn entries(&self) -> Vec<&CStr> {
        match self {
            Self::Snapshot(owned) => owned.iter().map(CString::as_c_str).collect(),
            Self::Explicit(entries) => entries.to_vec(),
        }
    }
}

/// Current process environment as `KEY=VALUE` C strings.
///
/// Entries that cannot be represented (a NUL inside a key or value) are
/// skipped; `execve` could not pass them anyway.
pub fn snapshot() -> Vec<CString> {
    std::env::vars_os()
        .filter_map(|(key, value)| {
            let mut entry = crate::platform::os_bytes(&key);
            entry.push(b'=');
            entry.extend(crate::platform::os_bytes(&value));
            CString::new(entry).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_environment_is_used_verbatim() {
        let a = CString::new("A=1").unwrap();
        let b = CString::new("B=2").unwrap();
        let entries = [a.as_c_str(), b.as_c_str()];

        let resolved = Environment::Explicit(&entries).resolve();
        assert_eq!(resolved.entries(), entries);
    }

    #[test]
    fn inherit_snapshots_process_environment() {
        let Some((key, _)) = std::env::vars_os().next() else {
            return;
        };

        let resolved = Environment::Inherit.resolve();
        let mut prefix = crate::platform::os_bytes(&key);
        prefix.push(b'=');
        assert!(resolved
            .entries()
            .iter()
            .any(|entry| entry.to_bytes().starts_with(&prefix)));
    }

    #[test]
    fn default_is_inherit() {
        assert!(matches!(Environment::default(), Environment::Inherit));
    }
}
