use std::{cell::RefCell, rc::Rc};

use crate::{
	environment::Variable,
	interpreter::{class::{Builtins, ClassDef}, value::Value},
	utils::RcCell,
};

/// A class instance: one variable per declared property, in declaration
/// order, plus an optional backing array when the class is the builtin
/// `Array`. Strings are ordinary instances of the builtin `string` class
/// whose single property holds a char array.
#[derive(Debug)]
pub(crate) struct Instance {
	pub def:   Rc<ClassDef>,
	pub vars:  Vec<Rc<Variable>>,
	pub array: Option<RefCell<Vec<Value>>>,
}

impl Instance {
	pub fn find(&self, name: &str) -> Option<Rc<Variable>> {
		self.vars.iter().find(|v| &*v.name == name).cloned()
	}
}

/// Build an array-backed instance around existing items.
pub(crate) fn make_array(builtins: &Builtins, items: Vec<Value>) -> Value {
	Value::Instance(RcCell::new(Instance {
		def:   builtins.array.clone(),
		vars:  Vec::new(),
		array: Some(RefCell::new(items)),
	}))
}

/// Build an instance of a builtin class with its properties filled
/// positionally, missing ones null.
pub(crate) fn make_builtin_instance(def: &Rc<ClassDef>, values: Vec<Value>) -> Value {
	let vars = def
		.props
		.iter()
		.zip(values.into_iter().chain(std::iter::repeat(Value::Null)))
		.map(|(prop, value)| Variable::with_flags(prop.name.clone(), value, prop.private, prop.constant))
		.collect();
	Value::Instance(RcCell::new(Instance { def: def.clone(), vars, array: None }))
}

/// Wrap Rust text into a `string` instance over a char array.
pub(crate) fn make_string(builtins: &Builtins, text: &str) -> Value {
	let chars = make_array(builtins, text.chars().map(Value::Char).collect());
	let var = Variable::new(builtins.string.props[0].name.clone(), chars);
	Value::Instance(RcCell::new(Instance { def: builtins.string.clone(), vars: vec![var], array: None }))
}

/// The text of a `string` instance, None for any other value.
pub(crate) fn string_text(builtins: &Builtins, value: &Value) -> Option<String> {
	let Value::Instance(instance) = value else { return None };
	if !Rc::ptr_eq(&instance.borrow().def, &builtins.string) {
		return None;
	}
	let backing = backing_array(value)?;
	let borrowed = backing.borrow();
	let items = borrowed.array.as_ref()?.borrow();
	let mut text = String::with_capacity(items.len());
	for item in items.iter() {
		match item {
			Value::Char(c) => text.push(*c),
			_ => return None,
		}
	}
	Some(text)
}

/// Resolve the array-backed instance behind a value, following the
/// `basearray` property chain. The depth cap breaks accidental cycles.
pub(crate) fn backing_array(value: &Value) -> Option<RcCell<Instance>> {
	let mut current = value.clone();
	for _ in 0..32 {
		let Value::Instance(instance) = &current else { return None };
		let next = {
			let borrowed = instance.borrow();
			if borrowed.array.is_some() {
				return Some(instance.clone());
			}
			let index = borrowed.def.basearray_index()?;
			let delegated = borrowed.vars.get(index)?.value.borrow().clone();
			delegated
		};
		current = next;
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::interpreter::{bridge::NoBridge, Interpreter};

	fn builtins() -> Builtins {
		Interpreter::new(Box::new(|_| {}), Rc::new(NoBridge)).unwrap().builtins.unwrap()
	}

	#[test]
	fn strings_delegate_to_their_char_array() {
		let b = builtins();
		let value = make_string(&b, "hi");
		let backing = backing_array(&value).unwrap();
		let borrowed = backing.borrow();
		let items = borrowed.array.as_ref().unwrap().borrow();
		assert_eq!(items.len(), 2);
		assert!(matches!(items[0], Value::Char('h')));
	}

	#[test]
	fn string_text_round_trips() {
		let b = builtins();
		let value = make_string(&b, "ember");
		assert_eq!(string_text(&b, &value).as_deref(), Some("ember"));
	}

	#[test]
	fn non_instances_have_no_backing_array() {
		assert!(backing_array(&Value::Num(1.0)).is_none());
		assert!(backing_array(&Value::Null).is_none());
	}
}
