//! Lexical scope chain.
//!
//! A scope owns its variables and links to its parent. The chain is purely
//! lexical: a loop, a catch body and a function call each get a fresh scope
//! that is dropped when the construct exits, so no binding ever leaks into
//! later lookups. A loop keeps one scope for all of its iterations. Control
//! state (which loop a `break` targets, whether a `return` is legal) lives
//! on the interpreter's frame stack instead.

use std::{cell::RefCell, rc::Rc};

use crate::{
	interpreter::{class::ClassDef, instance::Instance, value::Value},
	utils::RcCell,
};

/// A named slot. Properties of an instance and statics of a class are the
/// same type, so a scope lookup can hand out any of them uniformly.
#[derive(Debug)]
pub(crate) struct Variable {
	pub name:     Rc<str>,
	pub value:    RefCell<Value>,
	pub private:  bool,
	pub constant: bool,
}

impl Variable {
	pub fn new(name: Rc<str>, value: Value) -> Rc<Self> {
		Rc::new(Self { name, value: RefCell::new(value), private: false, constant: false })
	}

	pub fn with_flags(name: Rc<str>, value: Value, private: bool, constant: bool) -> Rc<Self> {
		Rc::new(Self { name, value: RefCell::new(value), private, constant })
	}
}

#[derive(Debug, Default)]
pub(crate) struct Scope {
	vars:         RefCell<Vec<Rc<Variable>>>,
	/// Set on a method's call scope: bare names resolve against the
	/// receiver's properties after the locals.
	pub instance: Option<RcCell<Instance>>,
	/// Set on a function's call scope: bare names fall back to the statics
	/// of the class the function is defined on.
	pub class:    Option<Rc<ClassDef>>,
	pub parent:   Option<Rc<Scope>>,
}

impl Scope {
	pub fn global() -> Rc<Self> { Rc::new(Self::default()) }

	pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
		Rc::new(Self { parent: Some(parent.clone()), ..Self::default() })
	}

	pub fn function(parent: Rc<Scope>, instance: Option<RcCell<Instance>>, class: Option<Rc<ClassDef>>) -> Rc<Self> {
		Rc::new(Self { vars: RefCell::new(Vec::new()), instance, class, parent: Some(parent) })
	}

	/// Always declares in THIS scope, shadowing any outer binding.
	pub fn declare(&self, var: Rc<Variable>) { self.vars.borrow_mut().push(var); }

	/// Innermost-first walk: locals, receiver properties, owning-class
	/// statics, then the parent chain.
	pub fn get(&self, name: &str) -> Option<Rc<Variable>> {
		if let Some(var) = self.get_local(name) {
			return Some(var);
		}
		if let Some(instance) = &self.instance {
			if let Some(var) = instance.borrow().find(name) {
				return Some(var);
			}
		}
		if let Some(class) = &self.class {
			if let Some(var) = class.find_static(name) {
				return Some(var);
			}
		}
		self.parent.as_ref().and_then(|parent| parent.get(name))
	}

	pub fn get_local(&self, name: &str) -> Option<Rc<Variable>> {
		// Newest binding wins, that is what makes shadowing work.
		self.vars.borrow().iter().rev().find(|v| &*v.name == name).cloned()
	}

	/// The nearest `this` up the chain.
	pub fn nearest_instance(&self) -> Option<RcCell<Instance>> {
		if let Some(instance) = &self.instance {
			return Some(instance.clone());
		}
		self.parent.as_ref().and_then(|parent| parent.nearest_instance())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn declare_and_get() {
		let global = Scope::global();
		global.declare(Variable::new("x".into(), Value::Num(1.0)));
		let inner = Scope::child(&global);
		assert!(inner.get("x").is_some());
		assert!(inner.get_local("x").is_none());
		assert!(inner.get("y").is_none());
	}

	#[test]
	fn shadowing_prefers_newest() {
		let scope = Scope::global();
		scope.declare(Variable::new("x".into(), Value::Num(1.0)));
		scope.declare(Variable::new("x".into(), Value::Num(2.0)));
		let var = scope.get("x").unwrap();
		assert!(matches!(*var.value.borrow(), Value::Num(n) if n == 2.0));
	}
}
