use std::{fmt::Display, rc::Rc};

use Value::*;

use crate::{
	interpreter::{bridge::HostObject, callable::FuncDef, class::ClassDef, instance::Instance},
	utils::RcCell,
};

/// A runtime value. This union is closed: every value the interpreter can
/// produce is one of these arms, including strings, which are instances of
/// the builtin `string` class rather than a separate arm.
#[derive(Debug, Clone)]
pub(crate) enum Value {
	Null,
	Num(f64),
	Bool(bool),
	Char(char),
	Instance(RcCell<Instance>),
	Func(Rc<FuncDef>),
	Class(Rc<ClassDef>),
	/// An opaque host value carried across the extern bridge.
	Boxed(HostObject),
}

impl Value {
	pub fn is_null(&self) -> bool { matches!(self, Null) }

	pub fn as_num(&self) -> Option<f64> {
		match self {
			Num(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Bool(b) => Some(*b),
			_ => None,
		}
	}

	/// The `typeof` name for everything that is not a class instance.
	pub fn builtin_type_name(&self) -> Option<&'static str> {
		match self {
			Null => Some("null"),
			Num(_) => Some("number"),
			Bool(_) => Some("bool"),
			Char(_) => Some("char"),
			Func(_) => Some("function"),
			Class(_) => Some("class"),
			Instance(_) | Boxed(_) => None,
		}
	}

	/// Equality for everything except strings, which the evaluator compares
	/// by content before falling back here. Null never equals a value,
	/// instances compare by identity, mismatched types compare unequal.
	pub fn shallow_equal(&self, other: &Self) -> bool {
		match (self, other) {
			(Null, Null) => true,
			(Num(l), Num(r)) => l == r,
			(Bool(l), Bool(r)) => l == r,
			(Char(l), Char(r)) => l == r,
			(Instance(l), Instance(r)) => l.ptr_eq(r),
			(Func(l), Func(r)) => Rc::ptr_eq(l, r),
			(Class(l), Class(r)) => Rc::ptr_eq(l, r),
			(Boxed(l), Boxed(r)) => Rc::ptr_eq(&l.value, &r.value),
			_ => false,
		}
	}

	/// `+` over the purely numeric arms. Char arithmetic goes through code
	/// points and always yields a number.
	pub fn plus(&self, other: &Self) -> Option<Value> {
		match (self.code_point(), other.code_point()) {
			(Some(l), Some(r)) => Some(Num(l + r)),
			_ => None,
		}
	}

	pub fn minus(&self, other: &Self) -> Option<Value> {
		match (self.code_point(), other.code_point()) {
			(Some(l), Some(r)) => Some(Num(l - r)),
			_ => None,
		}
	}

	pub fn times(&self, other: &Self) -> Option<Value> {
		match (self, other) {
			(Num(l), Num(r)) => Some(Num(l * r)),
			_ => None,
		}
	}

	/// None on a zero divisor, the caller turns that into a fatal fault.
	pub fn divide(&self, other: &Self) -> Option<Option<Value>> {
		match (self, other) {
			(Num(_), Num(r)) if *r == 0.0 => Some(None),
			(Num(l), Num(r)) => Some(Some(Num(l / r))),
			_ => None,
		}
	}

	pub fn modulo(&self, other: &Self) -> Option<Option<Value>> {
		match (self, other) {
			(Num(_), Num(r)) if *r == 0.0 => Some(None),
			(Num(l), Num(r)) => Some(Some(Num(l % r))),
			_ => None,
		}
	}

	/// Ordered comparison over numbers and chars.
	pub fn compare(&self, other: &Self) -> Option<std::cmp::Ordering> {
		let (l, r) = (self.code_point()?, other.code_point()?);
		l.partial_cmp(&r)
	}

	fn code_point(&self) -> Option<f64> {
		match self {
			Num(n) => Some(*n),
			Char(c) => Some(*c as u32 as f64),
			_ => None,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Null => write!(f, "NULL"),
			Bool(b) => write!(f, "{b}"),
			Char(c) => write!(f, "{c}"),
			Num(n) => {
				if n.is_finite() && n.fract() == 0.0 {
					write!(f, "{}", *n as i64)
				} else {
					write!(f, "{n}")
				}
			}
			Instance(instance) => write!(f, "{}", instance.borrow().def.name),
			Func(func) => write!(f, "{}", func.display_name()),
			Class(class) => write!(f, "{}", class.name),
			Boxed(host) => write!(f, "{}", host.type_name),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_integral_numbers() {
		assert_eq!(Num(3.0).to_string(), "3");
		assert_eq!(Num(3.5).to_string(), "3.5");
		assert_eq!(Num(-0.25).to_string(), "-0.25");
		assert_eq!(Null.to_string(), "NULL");
	}

	#[test]
	fn char_arithmetic_uses_code_points() {
		assert!(matches!(Char('b').minus(&Char('a')), Some(Num(n)) if n == 1.0));
		assert!(matches!(Char('a').plus(&Num(1.0)), Some(Num(n)) if n == 98.0));
		assert!(Num(1.0).plus(&Bool(true)).is_none());
	}

	#[test]
	fn divide_flags_zero() {
		assert!(matches!(Num(4.0).divide(&Num(2.0)), Some(Some(Num(n))) if n == 2.0));
		assert!(matches!(Num(4.0).divide(&Num(0.0)), Some(None)));
		assert!(Num(4.0).divide(&Bool(true)).is_none());
	}

	#[test]
	fn equality_is_null_safe() {
		assert!(Null.shallow_equal(&Null));
		assert!(!Null.shallow_equal(&Num(0.0)));
		assert!(!Num(1.0).shallow_equal(&Bool(true)));
	}
}
