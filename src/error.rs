use std::fmt;
use std::io;

use crate::source::Position;

macro_rules! impl_syntax_error {
    ($(
        $string:literal <=> $variant:ident,
    )*) => {
        /// All well-formedness violations the tokenizer can report.
        #[derive(Debug, Eq, PartialEq, Clone, Copy)]
        pub enum SyntaxError {
            $(
                #[doc = "The `"]
                #[doc = $string]
                #[doc = "` error code."]
                $variant
            ),*
        }

        impl std::str::FromStr for SyntaxError {
            type Err = ();

            /// Parse a `kebab-case` error code into an enum variant.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $string => Ok(Self::$variant), )*
                    _ => Err(())
                }
            }
        }

        impl SyntaxError {
            /// Convert an enum variant back into its `kebab-case` error code.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match *self {
                    $( Self::$variant => $string, )*
                }
            }
        }
    }
}

impl_syntax_error! {
    "content-outside-root" <=> ContentOutsideRoot,
    "document-empty" <=> DocumentEmpty,
    "duplicate-attribute" <=> DuplicateAttribute,
    "invalid-attribute-name" <=> InvalidAttributeName,
    "invalid-character-reference" <=> InvalidCharacterReference,
    "invalid-comment" <=> InvalidComment,
    "invalid-first-character-of-tag-name" <=> InvalidFirstCharacterOfTagName,
    "mismatched-end-tag" <=> MismatchedEndTag,
    "missing-attribute-value" <=> MissingAttributeValue,
    "trailing-content-after-root" <=> TrailingContentAfterRoot,
    "unbound-namespace-prefix" <=> UnboundNamespacePrefix,
    "unclosed-cdata" <=> UnclosedCdata,
    "undefined-entity" <=> UndefinedEntity,
    "unexpected-eof" <=> UnexpectedEof,
    "unquoted-attribute-value" <=> UnquotedAttributeValue,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// What went wrong inside a [`ParseError`].
#[derive(Debug)]
pub enum ErrorKind {
    /// The document violates well-formedness.
    Syntax(SyntaxError),
    /// The byte source failed before the document was exhausted.
    Io(io::Error),
}

/// The single error type produced by a parse session.
///
/// `line` and `column` are 1-based and reflect the tokenizer's cursor at the
/// moment of failure. An error is terminal: once it has been returned, the
/// session only hands out [`crate::XmlEvent::EndDocument`].
#[derive(Debug)]
pub struct ParseError {
    /// Line of the offending input, 1-based.
    pub line: u64,
    /// Column of the offending input, 1-based, counted in characters.
    pub column: u64,
    /// The underlying cause.
    pub kind: ErrorKind,
}

impl ParseError {
    pub(crate) fn syntax(error: SyntaxError, pos: Position) -> Self {
        ParseError {
            line: pos.line,
            column: pos.column,
            kind: ErrorKind::Syntax(error),
        }
    }

    pub(crate) fn io(error: io::Error, pos: Position) -> Self {
        ParseError {
            line: pos.line,
            column: pos.column,
            kind: ErrorKind::Io(error),
        }
    }

    /// The position this error was reported at.
    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Syntax(ref e) => {
                write!(f, "{} at line {}, column {}", e, self.line, self.column)
            }
            ErrorKind::Io(ref e) => write!(
                f,
                "read error at line {}, column {}: {}",
                self.line, self.column, e
            ),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ErrorKind::Syntax(_) => None,
            ErrorKind::Io(ref e) => Some(e),
        }
    }
}
