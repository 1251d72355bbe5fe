mod fault;

pub use fault::{Fault, FaultKind};

/// EmberError is the top-level error type for the interpreter.
#[derive(thiserror::Error, Debug)]
pub enum EmberError {
	/// Internal interpreter error, should never happen
	#[error("InternalError: {0}")]
	InternalError(#[from] anyhow::Error),
	/// A fatal script error
	#[error(transparent)]
	Fault(#[from] Fault),
}
