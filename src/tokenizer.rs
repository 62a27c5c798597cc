use std::collections::BTreeMap;

use crate::error::{ParseError, SyntaxError};
use crate::handler::{Control, SaxHandler};
use crate::source::{ByteSource, IntoSource, Position};
use crate::XmlElement;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// An element currently open on the tokenizer's stack, with its names
/// resolved once at the start tag so the end tag reports the same values.
#[derive(Debug)]
struct OpenElement {
    raw: String,
    name: String,
    namespace_uri: Option<String>,
}

/// A well-formedness-checking XML push tokenizer.
///
/// `parse` runs synchronously on the calling thread and drives a
/// [`SaxHandler`] until the document is exhausted, the handler returns
/// [`Control::Stop`], or a well-formedness violation is found. It recognizes
/// elements, attributes, character data, CDATA sections, entity and character
/// references, comments, processing instructions and the document type
/// declaration (the latter three are consumed without callbacks).
///
/// This is deliberately not a conforming XML processor: DTD content is
/// skipped rather than interpreted, and encodings other than UTF-8 are not
/// supported.
#[derive(Debug)]
pub struct Tokenizer {
    source: ByteSource,
    process_namespaces: bool,
    stack: Vec<OpenElement>,
    scopes: Vec<Vec<(String, String)>>,
    root_seen: bool,
}

impl Tokenizer {
    /// Create a tokenizer from some input.
    ///
    /// `input` can be a `&str`, `String`, `Vec<u8>`, `File` or a prebuilt
    /// [`ByteSource`]; see [`IntoSource`].
    pub fn new<S: IntoSource>(input: S) -> Self {
        Tokenizer {
            source: input.into_source(),
            process_namespaces: false,
            stack: Vec::new(),
            scopes: Vec::new(),
            root_seen: false,
        }
    }

    /// Whether element names are resolved against in-scope namespace
    /// declarations. Off by default.
    pub fn process_namespaces(&self) -> bool {
        self.process_namespaces
    }

    /// Toggle namespace processing. Must be called before [`Tokenizer::parse`].
    pub fn set_process_namespaces(&mut self, yes: bool) {
        self.process_namespaces = yes;
    }

    /// The position of the next unread character.
    pub fn position(&self) -> Position {
        self.source.position()
    }

    /// Tokenize the whole input, delivering callbacks to `handler`.
    ///
    /// Returns `Ok(())` when the document was exhausted or the handler asked
    /// to stop, `Err` on the first well-formedness violation or I/O failure.
    pub fn parse<H: SaxHandler>(&mut self, handler: &mut H) -> Result<(), ParseError> {
        if handler.document_started(self.position()) == Control::Stop {
            return Ok(());
        }

        loop {
            if self.stack.is_empty() {
                self.skip_whitespace()?;
            }
            match self.peek()? {
                None => {
                    let pos = self.position();
                    if !self.stack.is_empty() {
                        return Err(ParseError::syntax(SyntaxError::UnexpectedEof, pos));
                    }
                    if !self.root_seen {
                        return Err(ParseError::syntax(SyntaxError::DocumentEmpty, pos));
                    }
                    handler.document_ended(pos);
                    return Ok(());
                }
                Some(b'<') => {
                    if self.markup(handler)? == Control::Stop {
                        return Ok(());
                    }
                }
                Some(_) => {
                    if self.stack.is_empty() {
                        // whitespace was skipped above, so this is real content
                        let error = if self.root_seen {
                            SyntaxError::TrailingContentAfterRoot
                        } else {
                            SyntaxError::ContentOutsideRoot
                        };
                        return Err(ParseError::syntax(error, self.position()));
                    }
                    if self.text_run(handler)? == Control::Stop {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn markup<H: SaxHandler>(&mut self, handler: &mut H) -> Result<Control, ParseError> {
        self.next_byte()?; // the '<'
        match self.peek()? {
            Some(b'?') => {
                self.processing_instruction()?;
                Ok(Control::Continue)
            }
            Some(b'!') => {
                self.next_byte()?;
                if self.try_read(b"--")? {
                    self.comment()?;
                    Ok(Control::Continue)
                } else if self.try_read(b"[CDATA[")? {
                    self.cdata_section(handler)
                } else {
                    self.doctype()?;
                    Ok(Control::Continue)
                }
            }
            Some(b'/') => {
                self.next_byte()?;
                self.end_tag(handler)
            }
            Some(b) if is_name_start(b) => self.start_tag(handler),
            Some(_) => Err(ParseError::syntax(
                SyntaxError::InvalidFirstCharacterOfTagName,
                self.position(),
            )),
            None => Err(ParseError::syntax(SyntaxError::UnexpectedEof, self.position())),
        }
    }

    fn start_tag<H: SaxHandler>(&mut self, handler: &mut H) -> Result<Control, ParseError> {
        if self.stack.is_empty() && self.root_seen {
            return Err(ParseError::syntax(
                SyntaxError::TrailingContentAfterRoot,
                self.position(),
            ));
        }

        let raw = self.read_name()?;
        let mut attributes: BTreeMap<String, String> = BTreeMap::new();
        let self_closing;

        loop {
            self.skip_whitespace()?;
            match self.peek()? {
                Some(b'>') => {
                    self.next_byte()?;
                    self_closing = false;
                    break;
                }
                Some(b'/') => {
                    self.next_byte()?;
                    if !self.try_read(b">")? {
                        return Err(ParseError::syntax(
                            SyntaxError::InvalidAttributeName,
                            self.position(),
                        ));
                    }
                    self_closing = true;
                    break;
                }
                Some(b) if is_name_start(b) => {
                    let pos = self.position();
                    let name = self.read_name()?;
                    let value = self.attribute_value()?;
                    if attributes.insert(name, value).is_some() {
                        return Err(ParseError::syntax(SyntaxError::DuplicateAttribute, pos));
                    }
                }
                Some(_) => {
                    return Err(ParseError::syntax(
                        SyntaxError::InvalidAttributeName,
                        self.position(),
                    ))
                }
                None => {
                    return Err(ParseError::syntax(SyntaxError::UnexpectedEof, self.position()))
                }
            }
        }

        self.root_seen = true;

        let element = if self.process_namespaces {
            let decls = split_namespace_declarations(&mut attributes);
            self.scopes.push(decls);
            let (name, namespace_uri) = self.resolve(&raw)?;
            XmlElement {
                name,
                namespace_uri,
                qualified_name: Some(raw.clone()),
                attributes,
            }
        } else {
            XmlElement {
                name: raw.clone(),
                namespace_uri: None,
                qualified_name: None,
                attributes,
            }
        };

        let open = OpenElement {
            raw,
            name: element.name.clone(),
            namespace_uri: element.namespace_uri.clone(),
        };

        let control = handler.element_started(element, self.position());
        if control == Control::Stop {
            return Ok(Control::Stop);
        }

        if self_closing {
            let control =
                handler.element_ended(&open.name, open.namespace_uri.as_deref(), self.position());
            if self.process_namespaces {
                self.scopes.pop();
            }
            Ok(control)
        } else {
            self.stack.push(open);
            Ok(Control::Continue)
        }
    }

    fn end_tag<H: SaxHandler>(&mut self, handler: &mut H) -> Result<Control, ParseError> {
        let pos = self.position();
        match self.peek()? {
            Some(b) if is_name_start(b) => {}
            Some(_) => {
                return Err(ParseError::syntax(
                    SyntaxError::InvalidFirstCharacterOfTagName,
                    pos,
                ))
            }
            None => return Err(ParseError::syntax(SyntaxError::UnexpectedEof, pos)),
        }
        let raw = self.read_name()?;
        self.skip_whitespace()?;
        if !self.try_read(b">")? {
            return Err(ParseError::syntax(
                SyntaxError::MismatchedEndTag,
                self.position(),
            ));
        }

        let open = match self.stack.pop() {
            Some(open) if open.raw == raw => open,
            _ => return Err(ParseError::syntax(SyntaxError::MismatchedEndTag, pos)),
        };

        let control =
            handler.element_ended(&open.name, open.namespace_uri.as_deref(), self.position());
        if self.process_namespaces {
            self.scopes.pop();
        }
        Ok(control)
    }

    fn text_run<H: SaxHandler>(&mut self, handler: &mut H) -> Result<Control, ParseError> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek()? {
                None | Some(b'<') => break,
                Some(b'&') => {
                    let expanded = self.reference()?;
                    buf.extend_from_slice(expanded.as_bytes());
                }
                Some(_) => {
                    self.read_until(&[b'<', b'&'], &mut buf)?;
                }
            }
        }
        if buf.is_empty() {
            return Ok(Control::Continue);
        }
        Ok(handler.text(&String::from_utf8_lossy(&buf), self.position()))
    }

    fn cdata_section<H: SaxHandler>(&mut self, handler: &mut H) -> Result<Control, ParseError> {
        if self.stack.is_empty() {
            let error = if self.root_seen {
                SyntaxError::TrailingContentAfterRoot
            } else {
                SyntaxError::ContentOutsideRoot
            };
            return Err(ParseError::syntax(error, self.position()));
        }

        let mut buf: Vec<u8> = Vec::new();
        loop {
            if self.try_read(b"]]>")? {
                break;
            }
            match self.next_byte()? {
                Some(b) => buf.push(b),
                None => {
                    return Err(ParseError::syntax(SyntaxError::UnclosedCdata, self.position()))
                }
            }
        }
        Ok(handler.cdata(&String::from_utf8_lossy(&buf), self.position()))
    }

    fn attribute_value(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace()?;
        if !self.try_read(b"=")? {
            return Err(ParseError::syntax(
                SyntaxError::MissingAttributeValue,
                self.position(),
            ));
        }
        self.skip_whitespace()?;
        let quote = match self.peek()? {
            Some(q @ b'"') | Some(q @ b'\'') => q,
            _ => {
                return Err(ParseError::syntax(
                    SyntaxError::UnquotedAttributeValue,
                    self.position(),
                ))
            }
        };
        self.next_byte()?;

        let mut buf: Vec<u8> = Vec::new();
        loop {
            match self.peek()? {
                Some(q) if q == quote => {
                    self.next_byte()?;
                    break;
                }
                Some(b'&') => {
                    let expanded = self.reference()?;
                    buf.extend_from_slice(expanded.as_bytes());
                }
                Some(_) => {
                    self.read_until(&[quote, b'&'], &mut buf)?;
                }
                None => {
                    return Err(ParseError::syntax(SyntaxError::UnexpectedEof, self.position()))
                }
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Expand an entity or character reference starting at the current `&`.
    fn reference(&mut self) -> Result<String, ParseError> {
        let pos = self.position();
        self.next_byte()?; // the '&'

        let mut name: Vec<u8> = Vec::new();
        loop {
            match self.next_byte()? {
                Some(b';') => break,
                Some(b) if name.len() < 16 => name.push(b),
                Some(_) => {
                    return Err(ParseError::syntax(SyntaxError::UndefinedEntity, pos));
                }
                None => return Err(ParseError::syntax(SyntaxError::UnexpectedEof, pos)),
            }
        }

        if let Some(digits) = name.strip_prefix(b"#") {
            let code = match digits.strip_prefix(b"x") {
                Some(hex) => u32::from_str_radix(&String::from_utf8_lossy(hex), 16).ok(),
                None => String::from_utf8_lossy(digits).parse::<u32>().ok(),
            };
            return code
                .and_then(std::char::from_u32)
                .map(|c| c.to_string())
                .ok_or_else(|| ParseError::syntax(SyntaxError::InvalidCharacterReference, pos));
        }

        match name.as_slice() {
            b"amp" => Ok("&".to_owned()),
            b"lt" => Ok("<".to_owned()),
            b"gt" => Ok(">".to_owned()),
            b"apos" => Ok("'".to_owned()),
            b"quot" => Ok("\"".to_owned()),
            _ => Err(ParseError::syntax(SyntaxError::UndefinedEntity, pos)),
        }
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let mut name: Vec<u8> = Vec::new();
        while let Some(b) = self.peek()? {
            if !is_name_byte(b) {
                break;
            }
            self.next_byte()?;
            name.push(b);
        }
        Ok(String::from_utf8_lossy(&name).into_owned())
    }

    /// Resolve `prefix:local` against the in-scope namespace declarations.
    fn resolve(&self, raw: &str) -> Result<(String, Option<String>), ParseError> {
        match raw.split_once(':') {
            Some((prefix, local)) => {
                if prefix == "xml" {
                    return Ok((local.to_owned(), Some(XML_NAMESPACE.to_owned())));
                }
                match self.lookup(prefix) {
                    Some(uri) => Ok((local.to_owned(), Some(uri.to_owned()))),
                    None => Err(ParseError::syntax(
                        SyntaxError::UnboundNamespacePrefix,
                        self.position(),
                    )),
                }
            }
            None => {
                let default_uri = self.lookup("").filter(|uri| !uri.is_empty());
                Ok((raw.to_owned(), default_uri.map(str::to_owned)))
            }
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn comment(&mut self) -> Result<(), ParseError> {
        loop {
            if self.try_read(b"-->")? {
                return Ok(());
            }
            if self.next_byte()?.is_none() {
                return Err(ParseError::syntax(SyntaxError::InvalidComment, self.position()));
            }
        }
    }

    fn processing_instruction(&mut self) -> Result<(), ParseError> {
        self.next_byte()?; // the '?'
        loop {
            if self.try_read(b"?>")? {
                return Ok(());
            }
            if self.next_byte()?.is_none() {
                return Err(ParseError::syntax(SyntaxError::UnexpectedEof, self.position()));
            }
        }
    }

    /// Skip a `<!DOCTYPE ...>` declaration, including an internal subset.
    fn doctype(&mut self) -> Result<(), ParseError> {
        let mut brackets = 0u32;
        loop {
            match self.next_byte()? {
                Some(b'[') => brackets += 1,
                Some(b']') => brackets = brackets.saturating_sub(1),
                Some(b'>') if brackets == 0 => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(ParseError::syntax(SyntaxError::UnexpectedEof, self.position()))
                }
            }
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        while let Some(b) = self.peek()? {
            if !is_whitespace(b) {
                break;
            }
            self.next_byte()?;
        }
        Ok(())
    }

    // io::Error -> ParseError plumbing for the source primitives

    fn peek(&mut self) -> Result<Option<u8>, ParseError> {
        let pos = self.source.position();
        self.source.peek().map_err(|e| ParseError::io(e, pos))
    }

    fn next_byte(&mut self) -> Result<Option<u8>, ParseError> {
        let pos = self.source.position();
        self.source.next_byte().map_err(|e| ParseError::io(e, pos))
    }

    fn try_read(&mut self, s: &[u8]) -> Result<bool, ParseError> {
        let pos = self.source.position();
        self.source.try_read(s).map_err(|e| ParseError::io(e, pos))
    }

    fn read_until(&mut self, needle: &[u8], out: &mut Vec<u8>) -> Result<bool, ParseError> {
        let pos = self.source.position();
        self.source
            .read_until(needle, out)
            .map_err(|e| ParseError::io(e, pos))
    }
}

/// Strip `xmlns`/`xmlns:*` attributes out of `attributes`, returning them as
/// `(prefix, uri)` declarations. The default namespace uses an empty prefix.
fn split_namespace_declarations(
    attributes: &mut BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let keys: Vec<String> = attributes
        .keys()
        .filter(|k| k.as_str() == "xmlns" || k.starts_with("xmlns:"))
        .cloned()
        .collect();

    let mut decls = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(uri) = attributes.remove(&key) {
            let prefix = key.strip_prefix("xmlns:").unwrap_or("").to_owned();
            decls.push((prefix, uri));
        }
    }
    decls
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

fn is_name_byte(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit() || b == b'-' || b == b'.'
}
