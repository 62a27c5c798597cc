use crate::source::Position;
use crate::XmlElement;

/// Flow-control answer returned from [`SaxHandler`] callbacks.
///
/// Returning [`Control::Stop`] is the only way to abort a running parse: it
/// can, by construction, only be issued from within a callback, and it
/// guarantees that no further callbacks are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep parsing.
    Continue,
    /// Stop parsing. [`crate::Tokenizer::parse`] returns `Ok(())` right away
    /// without delivering any further callback.
    Stop,
}

/// The callback contract between [`crate::Tokenizer`] and its consumer.
///
/// Callbacks are delivered synchronously on whatever thread drives
/// [`crate::Tokenizer::parse`], in document order. `pos` is the tokenizer's
/// cursor at the moment of delivery.
///
/// Text is pushed as it is scanned: a logical run of character data may
/// arrive as several `text`/`cdata` callbacks (entity expansion and CDATA
/// sections split runs). Consumers wanting one coalesced run per gap between
/// tags must buffer; [`crate::XmlPullParser`] does exactly that.
pub trait SaxHandler {
    /// The document has been opened. Delivered before anything is read.
    fn document_started(&mut self, pos: Position) -> Control;

    /// A start tag (or the start half of a self-closing tag) has been read.
    fn element_started(&mut self, element: XmlElement, pos: Position) -> Control;

    /// An end tag (or the end half of a self-closing tag) has been read.
    fn element_ended(&mut self, name: &str, namespace_uri: Option<&str>, pos: Position)
        -> Control;

    /// A chunk of literal character data, entities already expanded.
    fn text(&mut self, chunk: &str, pos: Position) -> Control;

    /// The contents of a CDATA section, delivered verbatim.
    fn cdata(&mut self, data: &str, pos: Position) -> Control;

    /// The document is exhausted. The final callback of a successful parse;
    /// not delivered after [`Control::Stop`] or an error.
    fn document_ended(&mut self, pos: Position);
}
