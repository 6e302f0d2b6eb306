use crate::error::ConfigError;

/// Max bytes read after the `#!` marker.
pub const DIRECTIVE_BUF_SIZE: usize = 1024;

/// Max words kept from a directive line. Words past this are dropped.
/// A line of exactly this many words keeps all of them; the next one is the
/// first to go.
pub const DIRECTIVE_MAX_WORDS: usize = 128;

/// Limits and dialect switches for the directive scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Capacity of the line buffer. A directive line must end (with `\n`)
    /// inside it or the file is not treated as a script.
    pub buf_size: usize,
    /// Word cap. Extra words are silently discarded.
    pub max_words: usize,
    /// Treat `\r` as a word separator, for scripts saved with CRLF endings.
    pub crlf: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            buf_size: DIRECTIVE_BUF_SIZE,
            max_words: DIRECTIVE_MAX_WORDS,
            crlf: false,
        }
    }
}

impl ScanConfig {
    pub fn with_buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    pub fn with_crlf(mut self, crlf: bool) -> Self {
        self.crlf = crlf;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buf_size == 0 {
            return Err(ConfigError::ZeroBufSize);
        }
        if self.max_words == 0 {
            return Err(ConfigError::ZeroMaxWords);
        }
        Ok(())
    }

    pub(crate) fn is_separator(&self, byte: u8) -> bool {
        matches!(byte, b' ' | b'\t') || (self.crlf && byte == b'\r')
    }
}
