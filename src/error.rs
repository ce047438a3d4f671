//! Classified assembly failures.
//!
//! Fallible operations return [`eyre::Result`]. Failures that callers may want to branch on are
//! raised as an [`AssemblyError`] wrapped in the report, so they can be recovered with
//! [`eyre::Report::downcast_ref`]. Errors raised by user form callbacks pass through unchanged.

use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssemblyError {
    /// Inconsistent inputs detected before any work is done, e.g. a space count that does not
    /// match the number of equations, or a block-weight table of the wrong size.
    Configuration(String),
    /// Mesh or space topology that the traversal or neighbor search cannot handle.
    Topology(String),
    /// A form or mesh function could not be evaluated, e.g. a quadrature order outside the
    /// available range or an external function that is not defined on the current mesh.
    Evaluation(String),
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::Topology(msg) => write!(f, "topology error: {}", msg),
            Self::Evaluation(msg) => write!(f, "evaluation error: {}", msg),
        }
    }
}

impl std::error::Error for AssemblyError {}

pub(crate) fn configuration_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(AssemblyError::Configuration(msg.into()))
}

pub(crate) fn topology_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(AssemblyError::Topology(msg.into()))
}

pub(crate) fn evaluation_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(AssemblyError::Evaluation(msg.into()))
}

/// Returns the classification of `report`, if it carries one.
pub fn classify(report: &eyre::Report) -> Option<&AssemblyError> {
    report.downcast_ref::<AssemblyError>()
}
