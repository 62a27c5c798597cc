use std::collections::BTreeMap;

/// The element descriptor attached to [`XmlEvent::StartElement`].
///
/// Under namespace processing, `name` and `namespace_uri` are resolved and
/// `qualified_name` keeps the original prefixed form. With namespace
/// processing off, `name` is the raw (possibly prefixed) tag text and both
/// options are `None` -- absence is expressed as `None`, never as an empty
/// string.
#[derive(Debug, Default, Eq, PartialEq, Clone)]
pub struct XmlElement {
    /// The element's local name, such as `"rtl"` in `<w:rtl>`, or the raw tag
    /// text when namespace processing is off.
    pub name: String,

    /// The namespace URI the element's prefix (or the default namespace)
    /// resolves to. `None` when namespace processing is off.
    pub namespace_uri: Option<String>,

    /// The original prefixed name, such as `"w:rtl"`. `None` when namespace
    /// processing is off.
    pub qualified_name: Option<String>,

    /// A mapping of this element's attributes.
    ///
    /// Namespace declarations (`xmlns`, `xmlns:*`) are removed from the map
    /// when namespace processing is on. All other attributes keep their raw
    /// names as keys in both modes.
    pub attributes: BTreeMap<String, String>,
}

/// A single document token as handed out by [`crate::XmlPullParser`].
///
/// The variant set is closed: the tokenizer folds everything it reads into
/// one of these five shapes or a [`crate::ParseError`].
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum XmlEvent {
    /// The document has been opened. Always the first event.
    StartDocument,

    /// An element start tag, including the start half of a self-closing tag.
    StartElement(XmlElement),

    /// An element end tag, including the end half of a self-closing tag.
    EndElement {
        /// The element's local name, or raw tag text with namespaces off.
        name: String,
        /// The resolved namespace URI, `None` with namespaces off.
        namespace_uri: Option<String>,
    },

    /// A maximal run of character data.
    ///
    /// Consecutive text and CDATA callbacks are concatenated in arrival
    /// order: two `Characters` events never appear back to back, and a CDATA
    /// section adjacent to literal text is merged into the same event.
    Characters(String),

    /// The document is exhausted. Emitted exactly once by the stream; every
    /// pull after it returns `EndDocument` again.
    EndDocument,
}

impl XmlEvent {
    /// Shorthand for constructing an [`XmlEvent::EndElement`] in tests and
    /// pattern-heavy consumer code.
    pub fn end_element(name: impl Into<String>, namespace_uri: Option<&str>) -> Self {
        XmlEvent::EndElement {
            name: name.into(),
            namespace_uri: namespace_uri.map(str::to_owned),
        }
    }
}
