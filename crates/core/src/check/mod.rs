//! Check definitions and test results.
//!
//! All XML exchanged with the monitor daemon is decoded here, into
//! [`Check`] and [`CheckState`], so callers never walk raw documents.

mod model;
mod state;
mod xml;

pub use model::Check;
pub use state::{CheckState, MetricValue};
pub use xml::{collect_uuids, declared_timeout, parse_error_envelope};

use thiserror::Error;

/// Self-check used to ask the daemon for its version.
///
/// The target is a valid address that is never contacted, since `selfcheck`
/// is not a network check.
pub const VERSION_CHECK: &str = concat!(
    r#"<?xml version="1.0" encoding="utf8"?>"#,
    "<check>",
    "<attributes>",
    "<name>selfcheck</name>",
    "<module>selfcheck</module>",
    "<target>50.0.0.0</target>",
    "<period>60000</period>",
    "<timeout>5000</timeout>",
    "<filterset>default</filterset>",
    "</attributes>",
    "<config/>",
    "</check>"
);

/// Name of the metric carrying the daemon version in a self-check result.
pub const VERSION_METRIC: &str = "version";

/// Errors decoding check XML.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Missing element: {0}")]
    MissingElement(&'static str),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

impl From<roxmltree::Error> for CheckError {
    fn from(e: roxmltree::Error) -> Self {
        CheckError::Malformed(e.to_string())
    }
}
