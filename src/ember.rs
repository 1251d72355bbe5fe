//! The embedding surface: build an [`Ember`], feed it scripts.

use std::{cell::RefCell, fs::read_to_string, io::Write, path::Path, rc::Rc};

use anyhow::{anyhow, Context};

use crate::{
	document::Document,
	error::EmberError,
	interpreter::{
		bridge::{HostBridge, NoBridge},
		instance::string_text,
		value::Value,
		Interpreter,
	},
};

/// A value exported out of a script. Self-contained, so hosts never touch
/// interpreter internals.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
	Null,
	Num(f64),
	Bool(bool),
	Char(char),
	Text(String),
	/// Anything without a host-side shape, rendered to text.
	Opaque(String),
}

/// Conversion from an exported script value into a host type.
pub trait FromValue: Sized {
	fn from_value(value: &ScriptValue) -> Option<Self>;
}

impl FromValue for ScriptValue {
	fn from_value(value: &ScriptValue) -> Option<Self> { Some(value.clone()) }
}

impl FromValue for f64 {
	fn from_value(value: &ScriptValue) -> Option<Self> {
		match value {
			ScriptValue::Num(n) => Some(*n),
			_ => None,
		}
	}
}

impl FromValue for bool {
	fn from_value(value: &ScriptValue) -> Option<Self> {
		match value {
			ScriptValue::Bool(b) => Some(*b),
			_ => None,
		}
	}
}

impl FromValue for char {
	fn from_value(value: &ScriptValue) -> Option<Self> {
		match value {
			ScriptValue::Char(c) => Some(*c),
			_ => None,
		}
	}
}

impl FromValue for String {
	fn from_value(value: &ScriptValue) -> Option<Self> {
		match value {
			ScriptValue::Text(text) => Some(text.clone()),
			_ => None,
		}
	}
}

/// The scripting engine. Configure it with the builder methods, then run
/// whole scripts with [`Ember::run`] or single expressions with
/// [`Ember::eval`].
pub struct Ember {
	/// Documents loaded before the main one, for their definitions.
	imports: Vec<(String, String)>,
	bridge:  Rc<dyn HostBridge>,
	print:   Rc<RefCell<Box<dyn FnMut(&str)>>>,
}

impl Ember {
	pub fn new() -> Self {
		Self {
			imports: Vec::new(),
			bridge:  Rc::new(NoBridge),
			print:   Rc::new(RefCell::new(Box::new(|text: &str| print!("{text}")))),
		}
	}

	/// Redirect `print` output, line by line.
	pub fn with_print(mut self, print: impl FnMut(&str) + 'static) -> Self {
		self.print = Rc::new(RefCell::new(Box::new(print)));
		self
	}

	pub fn with_bridge(mut self, bridge: Rc<dyn HostBridge>) -> Self {
		self.bridge = bridge;
		self
	}

	/// Register a named document whose definitions are available to every
	/// later run. Its executable top level is not run.
	pub fn import(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
		self.imports.push((name.into(), source.into()));
		self
	}

	pub fn run_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EmberError> {
		let path = path.as_ref();
		let source = read_to_string(path).context("Failed open source file")?;
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("script");
		self.run(name, &source)
	}

	/// Run a whole script: load it, run static constructors, then its
	/// executable top level.
	pub fn run(&self, name: &str, source: &str) -> Result<(), EmberError> {
		let mut interp = self.interpreter()?;
		let doc = Document::new(name, source);
		let tokens = match interp.load(&doc) {
			Ok(tokens) => tokens,
			Err(interrupt) => return Err(interp.interrupt_to_fault(interrupt).into()),
		};
		if let Err(interrupt) = interp.run_static_ctors() {
			return Err(interp.interrupt_to_fault(interrupt).into());
		}
		if let Err(interrupt) = interp.run_program(tokens) {
			return Err(interp.interrupt_to_fault(interrupt).into());
		}
		Ok(())
	}

	/// Evaluate one expression against the imports and convert the result.
	pub fn eval<T: FromValue>(&self, fragment: &str) -> Result<T, EmberError> {
		let mut interp = self.interpreter()?;
		if let Err(interrupt) = interp.run_static_ctors() {
			return Err(interp.interrupt_to_fault(interrupt).into());
		}
		let value = match interp.eval_fragment_text("eval", fragment) {
			Ok(value) => value,
			Err(interrupt) => return Err(interp.interrupt_to_fault(interrupt).into()),
		};
		let exported = export(&interp, &value);
		T::from_value(&exported)
			.ok_or_else(|| anyhow!("eval result does not convert to the requested type").into())
	}

	/// Run the REPL prompt. One interpreter lives for the whole session, so
	/// definitions and globals persist across lines.
	pub fn run_prompt(&self) {
		let mut interp = match self.interpreter() {
			Ok(interp) => interp,
			Err(e) => {
				eprintln!("Failed start repl: {e}");
				return;
			}
		};
		let mut input = String::new();
		let stdin = std::io::stdin();
		loop {
			input.clear();
			print!("> ");
			if let Err(e) = std::io::stdout().flush() {
				eprintln!("Failed flush: {e}");
			}
			match stdin.read_line(&mut input) {
				Ok(0) => {
					println!("\nExited ember repl");
					break;
				}
				Ok(_) => {}
				Err(e) => {
					eprintln!("Failed read line: {e}");
					continue;
				}
			}
			let doc = Document::new("repl", input.trim());
			let outcome = match interp.load(&doc) {
				Ok(tokens) => interp.run_static_ctors().and(Ok(tokens)).and_then(|t| interp.run_program(t)),
				Err(interrupt) => Err(interrupt),
			};
			if let Err(interrupt) = outcome {
				let fault = interp.interrupt_to_fault(interrupt);
				eprintln!("Failed run prompt: {fault}");
			}
		}
	}

	fn interpreter(&self) -> Result<Interpreter, EmberError> {
		let sink = self.print.clone();
		let mut interp = Interpreter::new(Box::new(move |text| (*sink.borrow_mut())(text)), self.bridge.clone())?;
		for (name, source) in &self.imports {
			let doc = Document::new(name.clone(), source);
			if let Err(interrupt) = interp.load(&doc) {
				return Err(interp.interrupt_to_fault(interrupt).into());
			}
		}
		Ok(interp)
	}
}

impl Default for Ember {
	fn default() -> Self { Self::new() }
}

fn export(interp: &Interpreter, value: &Value) -> ScriptValue {
	if let Some(builtins) = &interp.builtins {
		if let Some(text) = string_text(builtins, value) {
			return ScriptValue::Text(text);
		}
	}
	match value {
		Value::Null => ScriptValue::Null,
		Value::Num(n) => ScriptValue::Num(*n),
		Value::Bool(b) => ScriptValue::Bool(*b),
		Value::Char(c) => ScriptValue::Char(*c),
		other => ScriptValue::Opaque(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn eval_number() {
		let value: f64 = Ember::new().eval("1 + 2 * 3").unwrap();
		assert_eq!(value, 7.0);
	}

	#[test]
	fn eval_uses_imports() {
		let ember = Ember::new().import("lib", "func twice(n) { return n * 2; }");
		let value: f64 = ember.eval("twice(21)").unwrap();
		assert_eq!(value, 42.0);
	}

	#[test]
	fn eval_wrong_type_is_an_error() {
		let result: Result<bool, _> = Ember::new().eval("1 + 2");
		assert!(result.is_err());
	}
}
