use std::{cell::RefCell, rc::Rc};

use crate::{
	environment::Variable,
	interpreter::callable::FuncDef,
	scanner::Token,
};

/// A declared property slot. Defaults are captured token ranges evaluated
/// once per construction.
#[derive(Debug)]
pub(crate) struct Property {
	pub name:      Rc<str>,
	pub private:   bool,
	pub constant:  bool,
	/// Marks the property `foreach` and indexing delegate to when the
	/// instance itself is not array backed.
	pub basearray: bool,
	pub default:   Option<Rc<[Token]>>,
}

/// A class definition, created once when its document is loaded. Enums
/// collapse into this type too: an enum is a class with no properties and
/// one const static per entry.
#[derive(Debug)]
pub(crate) struct ClassDef {
	pub name:      Rc<str>,
	pub namespace: Option<Rc<str>>,
	pub props:     Vec<Property>,
	pub funcs:     RefCell<Vec<Rc<FuncDef>>>,
	pub statics:   RefCell<Vec<Rc<Variable>>>,
}

impl ClassDef {
	pub fn full_name(&self) -> String {
		match &self.namespace {
			Some(ns) => format!("{ns}::{}", self.name),
			None => self.name.to_string(),
		}
	}

	pub fn basearray_index(&self) -> Option<usize> { self.props.iter().position(|p| p.basearray) }

	/// Non-constructor lookup by name and arity.
	pub fn find_func(&self, name: &str, arity: usize) -> Option<Rc<FuncDef>> {
		self
			.funcs
			.borrow()
			.iter()
			.find(|f| !f.is_ctor && f.name.as_deref() == Some(name) && f.params.len() == arity)
			.cloned()
	}

	/// Lookup by name alone, for taking a function reference without calling.
	pub fn find_func_named(&self, name: &str) -> Option<Rc<FuncDef>> {
		self.funcs.borrow().iter().find(|f| !f.is_ctor && f.name.as_deref() == Some(name)).cloned()
	}

	/// Constructor overloads are distinguished by arity only.
	pub fn find_ctor(&self, arity: usize) -> Option<Rc<FuncDef>> {
		self.funcs.borrow().iter().find(|f| f.is_ctor && !f.is_static && f.params.len() == arity).cloned()
	}

	pub fn find_static(&self, name: &str) -> Option<Rc<Variable>> {
		self.statics.borrow().iter().find(|v| &*v.name == name).cloned()
	}
}

/// The classes the interpreter must be able to name. All of them are defined
/// by the embedded prelude script and resolved here by identity once the
/// prelude document has loaded.
#[derive(Debug, Clone)]
pub(crate) struct Builtins {
	pub array:        Rc<ClassDef>,
	pub string:       Rc<ClassDef>,
	pub exception:    Rc<ClassDef>,
	pub r#type:       Rc<ClassDef>,
	pub extern_value: Rc<ClassDef>,
}
