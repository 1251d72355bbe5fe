use std::{cell::RefCell, rc::{Rc, Weak}};

use crate::{interpreter::class::ClassDef, scanner::Token};

#[derive(Debug)]
pub(crate) struct Param {
	pub name:     Rc<str>,
	/// Passing null for this parameter is a fatal fault.
	pub not_null: bool,
}

/// A function definition. The body is a captured token range that is
/// re-materialized on every call; nothing per-call lives here. Return values
/// travel in the call's control-flow outcome, so one definition can be on
/// the stack any number of times at once.
#[derive(Debug)]
pub(crate) struct FuncDef {
	/// None for constructors.
	pub name:      Option<Rc<str>>,
	pub params:    Vec<Param>,
	pub body:      Rc<[Token]>,
	/// Class the function is defined on, empty for free functions. Set
	/// after the owning class is allocated.
	pub owner:     RefCell<Weak<ClassDef>>,
	pub is_static: bool,
	pub private:   bool,
	pub is_ctor:   bool,
}

impl FuncDef {
	pub fn owner(&self) -> Option<Rc<ClassDef>> { self.owner.borrow().upgrade() }

	pub fn display_name(&self) -> String {
		let local = self.name.as_deref().unwrap_or("constructor");
		match self.owner() {
			Some(class) => format!("{}.{local}", class.name),
			None => local.to_string(),
		}
	}
}
