//! # An interpreter with no syntax tree
//!
//! Scripts are scanned into a flat token array once, and that array IS the
//! program. Execution keeps a cursor into it and materializes each statement
//! at the moment it is about to run; a loop body is re-parsed on every
//! iteration, a function body on every call. Compound statements capture the
//! token sub-ranges of their moving parts, and a call simply swaps the active
//! range for the callee's body.
//!
//! Two consequences shape everything else:
//!
//! - keywords are resolved at run time, so the scanner stays trivial and a
//!   word like `while` means nothing until a statement is materialized there;
//! - the extent of a brace-less body has no closing marker, so it is
//!   discovered by running it once in *neutral mode* -- the normal dispatch
//!   with every side effect suppressed, consuming exactly the tokens a real
//!   run would.
//!
//! The object model is deliberately small: classes with properties, methods
//! and statics; strings are ordinary instances of a builtin `string` class
//! over a char array; all numbers are `f64`. Script exceptions travel
//! through `try`/`catch`/`finally` and `section`, fatal faults abort the run
//! with a `name line:col` position.
//!
//! Hosts embed the engine through [`Ember`] and expose native types to
//! scripts through the [`HostBridge`] trait.

pub mod cli;
mod document;
mod ember;
mod environment;
mod error;
mod interpreter;
mod parser;
mod scanner;
mod utils;

pub use crate::{
	document::Document,
	ember::{Ember, FromValue, ScriptValue},
	error::{EmberError, Fault, FaultKind},
	interpreter::bridge::{HostArg, HostBridge, HostObject, NoBridge},
};
