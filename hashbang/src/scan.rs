//! Directive scanner.
//!
//! Reads the first line of a candidate executable and splits everything after
//! the `#!` marker into whitespace-separated words. Reading is bounded: one
//! two-byte read for the marker and one read of at most
//! [`ScanConfig::buf_size`] bytes for the rest. Anything unexpected turns
//! into [`NotADirective`]; the scan never surfaces an I/O error.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use log::{debug, trace};

use crate::config::ScanConfig;
use crate::error::{NotADirective, NotADirectiveReason};

const MARKER: [u8; 2] = *b"#!";

/// A successfully scanned directive line.
///
/// Owns the bytes read after the marker (up to, not including, the newline)
/// and the spans of the words found in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    line: Vec<u8>,
    words: Vec<Range<usize>>,
    truncated: usize,
}

impl Directive {
    fn parse(mut buf: Vec<u8>, config: &ScanConfig) -> Result<Self, NotADirective> {
        buf.truncate(config.buf_size);

        let mut words = Vec::new();
        let mut truncated = 0;
        let mut word_start: Option<usize> = None;
        let mut line_end = None;

        let mut save = |start: usize, end: usize| {
            if words.len() < config.max_words {
                words.push(start..end);
            } else {
                truncated += 1;
            }
        };

        for (pos, &byte) in buf.iter().enumerate() {
            match byte {
                b'\n' => {
                    if let Some(start) = word_start.take() {
                        save(start, pos);
                    }
                    line_end = Some(pos);
                    break;
                }
                0 => return Err(NotADirective::new(NotADirectiveReason::EmbeddedNul)),
                b if config.is_separator(b) => {
                    if let Some(start) = word_start.take() {
                        save(start, pos);
                    }
                }
                _ => {
                    if word_start.is_none() {
                        word_start = Some(pos);
                    }
                }
            }
        }

        let Some(line_end) = line_end else {
            return Err(NotADirective::new(NotADirectiveReason::LineTooLong));
        };
        buf.truncate(line_end);

        if truncated > 0 {
            debug!(
                "directive has {} words, dropped {} past the limit of {}",
                words.len() + truncated,
                truncated,
                config.max_words
            );
        }

        Ok(Self {
            line: buf,
            words,
            truncated,
        })
    }

    /// Words in the order they appear on the line.
    pub fn words(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.words.iter().map(move |span| &self.line[span.clone()])
    }

    pub fn word(&self, index: usize) -> Option<&[u8]> {
        self.words.get(index).map(|span| &self.line[span.clone()])
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The first word, if the line has any.
    pub fn interpreter(&self) -> Option<&[u8]> {
        self.word(0)
    }

    /// Number of words dropped because of [`ScanConfig::max_words`].
    pub fn truncated_words(&self) -> usize {
        self.truncated
    }

    /// The raw directive line, without the marker and the newline.
    #[cfg(test)]
    pub(crate) fn line(&self) -> &[u8] {
        &self.line
    }
}

/// Scan the file at `path` for an interpreter directive.
pub fn scan(path: impl AsRef<Path>, config: &ScanConfig) -> Result<Directive, NotADirective> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            trace!("{}: cannot open for directive scan: {}", path.display(), err);
            return Err(NotADirective::new(NotADirectiveReason::Unreadable));
        }
    };

    // The file is closed when it drops, on every return path.
    let result = scan_reader(file, config);
    match &result {
        Ok(directive) => trace!(
            "{}: directive with {} words",
            path.display(),
            directive.word_count()
        ),
        Err(err) => trace!("{}: {}", path.display(), err),
    }
    result
}

/// Scan an already opened source. Performs at most two reads.
pub fn scan_reader<R: Read>(
    mut reader: R,
    config: &ScanConfig,
) -> Result<Directive, NotADirective> {
    let mut marker = [0u8; 2];
    match reader.read(&mut marker) {
        Ok(2) => {}
        Ok(_) => return Err(NotADirective::new(NotADirectiveReason::MissingMarker)),
        Err(_) => return Err(NotADirective::new(NotADirectiveReason::Unreadable)),
    }
    if marker != MARKER {
        return Err(NotADirective::new(NotADirectiveReason::MissingMarker));
    }

    let mut buf = vec![0u8; config.buf_size];
    let len = match reader.read(&mut buf) {
        Ok(0) => return Err(NotADirective::new(NotADirectiveReason::Empty)),
        Ok(len) => len,
        Err(_) => return Err(NotADirective::new(NotADirectiveReason::Unreadable)),
    };
    buf.truncate(len);

    Directive::parse(buf, config)
}

/// Tokenize the bytes that follow a `#!` marker.
///
/// Only the first [`ScanConfig::buf_size`] bytes are considered, as if they
/// had been read from a file.
pub fn tokenize(bytes: &[u8], config: &ScanConfig) -> Result<Directive, NotADirective> {
    let len = bytes.len().min(config.buf_size);
    Directive::parse(bytes[..len].to_vec(), config)
}
