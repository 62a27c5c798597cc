use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::warn;

use crate::bridge::PullSession;
use crate::error::ParseError;
use crate::event::XmlEvent;
use crate::source::{ByteSource, IntoSource};
use crate::tokenizer::Tokenizer;

/// A blocking XML pull parser. See crate-level docs for basic usage.
///
/// Internally this bridges a push tokenizer running on a dedicated worker
/// thread onto the calling thread, one event per [`XmlPullParser::next_event`]
/// call. The worker is spawned lazily on the first call and is guaranteed not
/// to outlive the parser: dropping it mid-parse runs the same teardown as
/// [`XmlPullParser::abort_parsing`].
#[derive(Debug)]
pub struct XmlPullParser {
    session: PullSession,
    finished: bool,
}

impl XmlPullParser {
    /// Parse an XML document held in a string. The string is copied.
    pub fn from_str(input: &str) -> Self {
        XmlPullParser::from_source(input)
    }

    /// Parse an XML document held in an owned string.
    pub fn from_string(input: String) -> Self {
        XmlPullParser::from_source(input)
    }

    /// Parse an XML document held in a byte buffer.
    pub fn from_bytes(input: Vec<u8>) -> Self {
        XmlPullParser::from_source(input)
    }

    /// Parse an XML document read from `reader`.
    ///
    /// The reader is handed to the worker thread, hence `Send + 'static`. No
    /// extra I/O buffering is required; the parser maintains its own read
    /// buffer.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        XmlPullParser::from_source(ByteSource::new(reader))
    }

    /// Parse the XML document at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(XmlPullParser::from_source(File::open(path)?))
    }

    fn from_source<S: IntoSource>(input: S) -> Self {
        XmlPullParser {
            session: PullSession::new(Tokenizer::new(input)),
            finished: false,
        }
    }

    /// Whether element and attribute names are namespace-resolved.
    pub fn process_namespaces(&self) -> bool {
        self.session.process_namespaces()
    }

    /// Toggle namespace processing.
    ///
    /// Precondition: parsing has not started. Once the first
    /// [`XmlPullParser::next_event`] call has handed the tokenizer to the
    /// worker the flag is frozen; a late call is ignored with a warning.
    pub fn set_process_namespaces(&mut self, yes: bool) {
        if !self.session.set_process_namespaces(yes) {
            warn!("set_process_namespaces called after parsing started; ignored");
        }
    }

    /// Block until the next document event is available and return it.
    ///
    /// Events arrive in document order, one per call; the tokenizer does not
    /// advance past a returned event until the next call. After the document
    /// is exhausted, after an error, and after [`XmlPullParser::abort_parsing`],
    /// this keeps returning [`XmlEvent::EndDocument`].
    ///
    /// # Errors
    ///
    /// Fails with [`ParseError`] if the tokenizer hit a well-formedness
    /// violation or the byte source failed. An error is terminal for the
    /// session; to retry, build a new parser over a fresh source.
    pub fn next_event(&mut self) -> Result<XmlEvent, ParseError> {
        let result = self.session.request_event();
        match result {
            Ok(XmlEvent::EndDocument) | Err(_) => self.finished = true,
            Ok(_) => {}
        }
        result
    }

    /// Stop parsing.
    ///
    /// Blocks until the worker thread has acknowledged the abort and exited,
    /// so the byte source is safe to release as soon as this returns.
    /// Idempotent; a no-op if parsing is not currently in progress.
    /// Subsequent [`XmlPullParser::next_event`] calls return
    /// [`XmlEvent::EndDocument`]; cancellation is not an error.
    pub fn abort_parsing(&mut self) {
        self.session.abort();
    }

    /// Line of the most recently returned event or error, 1-based. 0 before
    /// parsing starts.
    pub fn line_number(&self) -> u64 {
        self.session.position().line
    }

    /// Column of the most recently returned event or error, 1-based, counted
    /// in characters. 0 before parsing starts.
    pub fn column_number(&self) -> u64 {
        self.session.position().column
    }

    /// Element nesting depth as observed at the most recently returned
    /// event: 0 at the document boundaries, and the deeper level for a
    /// start tag and its matching end tag alike.
    pub fn depth(&self) -> usize {
        self.session.depth()
    }
}

/// Iterate over document events.
///
/// Unlike [`XmlPullParser::next_event`], which keeps returning
/// [`XmlEvent::EndDocument`] forever, the iterator fuses: it yields the first
/// `EndDocument` (or the error) and then `None`.
impl Iterator for XmlPullParser {
    type Item = Result<XmlEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_event())
    }
}
