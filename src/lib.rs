#![deny(missing_docs)]
// This is an XML parser. XML can be untrusted input from the internet.
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod bridge;
mod error;
mod event;
mod handler;
mod parser;
mod source;
mod tokenizer;

pub use error::{ErrorKind, ParseError, SyntaxError};
pub use event::{XmlElement, XmlEvent};
pub use handler::{Control, SaxHandler};
pub use parser::XmlPullParser;
pub use source::{ByteSource, IntoSource, Position};
pub use tokenizer::Tokenizer;
