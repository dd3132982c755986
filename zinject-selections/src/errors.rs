//! Errors!

use miette::Diagnostic;
use thiserror::Error;

/// Gotta love a newtyped Result
pub type Result<T> = std::result::Result<T, SelectionsError>;

/// An error from reading a selections document
#[derive(Debug, Error, Diagnostic)]
pub enum SelectionsError {
    /// The document is not well-formed XML
    #[error("selections document is not well-formed XML")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be decoded
    #[error("selections document has a malformed attribute")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The root element is not `<selections>`
    #[error("expected a <selections> document, found <{found}>")]
    #[diagnostic(help("is this a feed rather than a solver result?"))]
    UnexpectedRoot {
        /// Name of the root element we found instead
        found: String,
    },

    /// A required attribute is absent
    #[error("<{element}> is missing its {attribute} attribute")]
    MissingAttribute {
        /// Element the attribute belongs on
        element: &'static str,
        /// Name of the missing attribute
        attribute: &'static str,
    },

    /// An attribute has a value outside its enumeration
    #[error("{value:?} is not a valid value for {element} {attribute}")]
    InvalidAttributeValue {
        /// Element the attribute belongs on
        element: &'static str,
        /// Name of the attribute
        attribute: &'static str,
        /// The offending value
        value: String,
    },

    /// The document ended in the middle of an element
    #[error("selections document is truncated inside <{element}>")]
    Truncated {
        /// Element that was still open
        element: String,
    },
}

impl SelectionsError {
    /// The host exit code for this error: selections problems are all
    /// invalid-data.
    pub fn exit_code(&self) -> i32 {
        25
    }
}
