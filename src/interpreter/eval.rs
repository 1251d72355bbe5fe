//! Expression evaluator.
//!
//! Expressions are evaluated in one pass over the tokens: operands and
//! operators are collected into two stacks, then reduced in fixed sweeps:
//! `* / %` first, `+ -` second, every remaining operator except `& |`
//! third (comparisons, equality and `??`), and `& |` last, left to right.
//! The final sweep never short-circuits: both sides of `&` and `|` are
//! always evaluated. `is` checks and the ternary bind tighter than any of
//! that: each applies to the single operand just read.
//!
//! In neutral mode the same code runs with every side effect suppressed.
//! Unknown names read as null, calls consume their arguments without being
//! invoked, writes vanish. The only purpose of a neutral pass is to consume
//! exactly the tokens a real evaluation would, so a caller can measure an
//! expression's extent.

use std::rc::Rc;

use crate::{
	environment::Variable,
	error::FaultKind,
	interpreter::{
		class::ClassDef,
		instance::{backing_array, make_array, make_builtin_instance, make_string, string_text, Instance},
		value::Value,
		Interpreter, Interrupt, Thrown,
	},
	scanner::{is_keyword, Token, TokenKind},
	utils::RcCell,
};

/// An assignable location produced by an identifier chain.
pub(crate) enum Place {
	Var(Rc<Variable>),
	/// Index into the backing array of an array-backed instance.
	Elem(RcCell<Instance>, usize),
	/// A name that resolved to nothing. Reads fault, assignment declares it
	/// in the innermost scope.
	Unresolved(Rc<str>),
}

/// What an identifier chain produced so far.
pub(crate) enum Chained {
	Place(Place),
	Value(Value),
	/// An `extern class` reference, only usable for static host calls.
	Extern(Rc<str>),
}

fn is_binary_op(text: &str) -> bool {
	matches!(text, "*" | "/" | "%" | "+" | "-" | ">" | "<" | ">=" | "<=" | "=" | "!=" | "&" | "|" | "??")
}

/// One collected operand. A `throw` on the right of `??` enters the stack
/// as a prebuilt exception, raised only if the coalesce selects it.
enum Operand {
	Value(Value),
	Raise(Thrown),
}

/// Numeric literal, including `-` lead, `0x` hex and consumed suffixes.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
	let (negative, rest) = match text.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, text),
	};
	let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
		let hex = hex.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));
		i64::from_str_radix(hex, 16).ok()? as f64
	} else {
		let rest = rest.trim_end_matches(|c| matches!(c, 'F' | 'f' | 'D' | 'd' | 'M' | 'm' | 'u' | 'U' | 'l' | 'L'));
		rest.parse::<f64>().ok()?
	};
	Some(if negative { -value } else { value })
}

/// Only `\n`, `\t` and pass-through of the escaped character itself are
/// processed.
pub(crate) fn unescape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut chars = text.chars();
	while let Some(c) = chars.next() {
		if c == '\\' {
			match chars.next() {
				Some(e) => out.push(unescape_char(e)),
				None => out.push('\\'),
			}
		} else {
			out.push(c);
		}
	}
	out
}

fn unescape_char(c: char) -> char {
	match c {
		'n' => '\n',
		't' => '\t',
		_ => c,
	}
}

impl Interpreter {
	/// Evaluate one expression starting at the cursor.
	pub(crate) fn read_value(&mut self) -> Result<Value, Interrupt> { self.read_value_from(None) }

	/// Same, but with the first operand already in hand. The expression
	/// statement executor uses this after it has resolved a leading chain.
	pub(crate) fn read_value_from(&mut self, seed: Option<Value>) -> Result<Value, Interrupt> {
		let mut vals = Vec::new();
		let mut ops: Vec<(Rc<str>, Token)> = Vec::new();
		match seed {
			Some(value) => vals.push(Operand::Value(self.operand_checks(value)?)),
			None => vals.push(Operand::Value(self.read_operand()?)),
		}
		loop {
			let Some(tok) = self.peek_token().cloned() else { break };
			if tok.kind == TokenKind::Symbol && is_binary_op(&tok.text) {
				self.cursor += 1;
				let coalesced_throw = &*tok.text == "??" && self.peek_is_word("throw");
				ops.push((tok.text.clone(), tok));
				if coalesced_throw {
					vals.push(self.read_throw_operand()?);
				} else {
					vals.push(Operand::Value(self.read_operand()?));
				}
				continue;
			}
			// `a -1` lexes the minus into the number; treat it as addition
			// of a negative operand.
			if tok.kind == TokenKind::Number && tok.text.starts_with('-') {
				ops.push(("+".into(), tok));
				vals.push(Operand::Value(self.read_operand()?));
				continue;
			}
			break;
		}
		self.reduce(vals, ops)
	}

	/// `?? throw <expr>`: the exception is built eagerly, even when the
	/// left side turns out non-null.
	fn read_throw_operand(&mut self) -> Result<Operand, Interrupt> {
		self.cursor += 1;
		let value = self.read_value()?;
		if self.neutral > 0 {
			return Ok(Operand::Value(Value::Null));
		}
		match self.throw_value(value)? {
			Interrupt::Throw(thrown) => Ok(Operand::Raise(thrown)),
			fault => Err(fault),
		}
	}

	fn reduce(&mut self, mut vals: Vec<Operand>, mut ops: Vec<(Rc<str>, Token)>) -> Result<Value, Interrupt> {
		if vals.len() != ops.len() + 1 {
			return Err(Interrupt::internal("operand and operator stacks out of step"));
		}
		for stage in 0..4u8 {
			let mut i = 0;
			while i < ops.len() {
				let hit = match stage {
					0 => matches!(&*ops[i].0, "*" | "/" | "%"),
					1 => matches!(&*ops[i].0, "+" | "-"),
					2 => !matches!(&*ops[i].0, "&" | "|"),
					_ => true,
				};
				if !hit {
					i += 1;
					continue;
				}
				let (op, at) = ops.remove(i);
				let right = vals.remove(i + 1);
				let left = std::mem::replace(&mut vals[i], Operand::Value(Value::Null));
				vals[i] = Operand::Value(self.apply_op(&op, &at, left, right)?);
			}
		}
		match vals.pop() {
			Some(Operand::Value(value)) => Ok(value),
			Some(Operand::Raise(_)) => Err(Interrupt::internal("unconsumed throw operand")),
			None => Err(Interrupt::internal("empty operand stack")),
		}
	}

	fn apply_op(&mut self, op: &str, at: &Token, left: Operand, right: Operand) -> Result<Value, Interrupt> {
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		if op == "??" {
			return match left {
				Operand::Value(value) if !value.is_null() => Ok(value),
				_ => match right {
					Operand::Value(value) => Ok(value),
					Operand::Raise(thrown) => Err(Interrupt::Throw(thrown)),
				},
			};
		}
		let (Operand::Value(left), Operand::Value(right)) = (left, right) else {
			return Err(self.fault_at(
				at,
				FaultKind::TypeMismatch("a 'throw' operand is only valid on the right of '??'".into()),
			));
		};
		match op {
			"=" => Ok(Value::Bool(self.values_equal(&left, &right)?)),
			"!=" => Ok(Value::Bool(!self.values_equal(&left, &right)?)),
			"&" | "|" => {
				let (Some(l), Some(r)) = (left.as_bool(), right.as_bool()) else {
					return Err(self.fault_at(at, FaultKind::TypeMismatch(format!(
						"'{op}' requires bool operands, got {} and {}",
						self.describe_type(&left),
						self.describe_type(&right)
					))));
				};
				Ok(Value::Bool(if op == "&" { l && r } else { l || r }))
			}
			"+" => self.add_values(at, left, right),
			"-" => left.minus(&right).ok_or_else(|| self.op_fault(at, op, &left, &right)),
			"*" => self.multiply_values(at, left, right),
			"/" => match left.divide(&right) {
				Some(Some(value)) => Ok(value),
				Some(None) => Err(self.fault_at(at, FaultKind::DivisionByZero)),
				None => Err(self.op_fault(at, op, &left, &right)),
			},
			"%" => match left.modulo(&right) {
				Some(Some(value)) => Ok(value),
				Some(None) => Err(self.fault_at(at, FaultKind::DivisionByZero)),
				None => Err(self.op_fault(at, op, &left, &right)),
			},
			">" | "<" | ">=" | "<=" => {
				let ordering = left.compare(&right).ok_or_else(|| self.op_fault(at, op, &left, &right))?;
				let hit = match op {
					">" => ordering.is_gt(),
					"<" => ordering.is_lt(),
					">=" => ordering.is_ge(),
					_ => ordering.is_le(),
				};
				Ok(Value::Bool(hit))
			}
			_ => Err(Interrupt::internal(format!("unknown operator '{op}'"))),
		}
	}

	fn op_fault(&self, at: &Token, op: &str, left: &Value, right: &Value) -> Interrupt {
		self.fault_at(at, FaultKind::TypeMismatch(format!(
			"cannot apply '{op}' to {} and {}",
			self.describe_type(left),
			self.describe_type(right)
		)))
	}

	/// `+` is numeric addition, char code-point arithmetic, or string
	/// concatenation with numbers, chars, bools and null ("NULL").
	fn add_values(&mut self, at: &Token, left: Value, right: Value) -> Result<Value, Interrupt> {
		let builtins = self.builtins()?.clone();
		let left_text = string_text(&builtins, &left);
		let right_text = string_text(&builtins, &right);
		if left_text.is_some() || right_text.is_some() {
			let mut out = String::new();
			for (value, text) in [(&left, left_text), (&right, right_text)] {
				match text {
					Some(text) => out.push_str(&text),
					None => match value {
						Value::Null | Value::Num(_) | Value::Bool(_) | Value::Char(_) => {
							out.push_str(&value.to_string())
						}
						_ => return Err(self.op_fault(at, "+", &left, &right)),
					},
				}
			}
			return Ok(make_string(&builtins, &out));
		}
		left.plus(&right).ok_or_else(|| self.op_fault(at, "+", &left, &right))
	}

	/// `*` is numeric, or string repetition with a floored non-negative
	/// count.
	fn multiply_values(&mut self, at: &Token, left: Value, right: Value) -> Result<Value, Interrupt> {
		let builtins = self.builtins()?.clone();
		if let (Some(text), Some(count)) = (string_text(&builtins, &left), right.as_num()) {
			let count = count.floor().max(0.0) as usize;
			return Ok(make_string(&builtins, &text.repeat(count)));
		}
		left.times(&right).ok_or_else(|| self.op_fault(at, "*", &left, &right))
	}

	/// Null-safe value equality: strings by content, instances by identity.
	pub(crate) fn values_equal(&mut self, left: &Value, right: &Value) -> Result<bool, Interrupt> {
		let builtins = self.builtins()?.clone();
		if let (Some(l), Some(r)) = (string_text(&builtins, left), string_text(&builtins, right)) {
			return Ok(l == r);
		}
		Ok(left.shallow_equal(right))
	}

	fn read_operand(&mut self) -> Result<Value, Interrupt> {
		let value = self.read_operand_core()?;
		self.operand_checks(value)
	}

	/// `is` and the ternary apply to the one operand just read, before it
	/// joins the binary sweeps. A live `?` fires only on a bool operand;
	/// anything else leaves the `?` unconsumed.
	fn operand_checks(&mut self, mut value: Value) -> Result<Value, Interrupt> {
		loop {
			if self.peek_is_word("is") {
				value = self.read_is(value)?;
			} else if self.peek_is_symbol("?") && (self.neutral > 0 || matches!(value, Value::Bool(_))) {
				value = self.read_ternary(value)?;
			} else {
				return Ok(value);
			}
		}
	}

	fn read_operand_core(&mut self) -> Result<Value, Interrupt> {
		let Some(tok) = self.peek_token().cloned() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		match tok.kind {
			TokenKind::Number => {
				self.cursor += 1;
				parse_number(&tok.text)
					.map(Value::Num)
					.ok_or_else(|| self.fault_at(&tok, FaultKind::InvalidNumber(tok.text.to_string())))
			}
			TokenKind::Str => {
				self.cursor += 1;
				self.make_string_value(&unescape(&tok.text))
			}
			TokenKind::VerbatimStr => {
				self.cursor += 1;
				self.make_string_value(&tok.text)
			}
			TokenKind::FormatStr => {
				self.cursor += 1;
				self.eval_format(&tok)
			}
			TokenKind::Char => {
				self.cursor += 1;
				let text = unescape(&tok.text);
				let mut chars = text.chars();
				match (chars.next(), chars.next()) {
					(Some(c), None) => Ok(Value::Char(c)),
					_ => Err(self.fault_at(&tok, FaultKind::InvalidCharLiteral(tok.text.to_string()))),
				}
			}
			TokenKind::Brace if &*tok.text == "(" => {
				self.cursor += 1;
				let value = self.read_value()?;
				self.expect_brace(")")?;
				Ok(value)
			}
			TokenKind::Brace if &*tok.text == "[" => self.read_array_literal(),
			TokenKind::Symbol if &*tok.text == "!" => {
				self.cursor += 1;
				let value = self.read_operand_core()?;
				if self.neutral > 0 {
					return Ok(Value::Null);
				}
				value.as_bool().map(|b| Value::Bool(!b)).ok_or_else(|| {
					self.fault_at(&tok, FaultKind::TypeMismatch(format!(
						"'!' requires a bool, got {}",
						self.describe_type(&value)
					)))
				})
			}
			TokenKind::Symbol if &*tok.text == "-" => {
				self.cursor += 1;
				let value = self.read_operand_core()?;
				if self.neutral > 0 {
					return Ok(Value::Null);
				}
				value.as_num().map(|n| Value::Num(-n)).ok_or_else(|| {
					self.fault_at(&tok, FaultKind::TypeMismatch(format!(
						"'-' requires a number, got {}",
						self.describe_type(&value)
					)))
				})
			}
			TokenKind::Symbol if matches!(&*tok.text, "++" | "--") => self.read_prefix_step(&tok),
			TokenKind::Word => self.read_word_operand(&tok),
			_ => Err(self.fault_at(&tok, FaultKind::UnexpectedToken(tok.text.to_string()))),
		}
	}

	fn read_word_operand(&mut self, tok: &Token) -> Result<Value, Interrupt> {
		match &*tok.text {
			"null" => {
				self.cursor += 1;
				Ok(Value::Null)
			}
			"true" => {
				self.cursor += 1;
				Ok(Value::Bool(true))
			}
			"false" => {
				self.cursor += 1;
				Ok(Value::Bool(false))
			}
			"new" => {
				let value = self.read_new()?;
				// `new X().m()` keeps chaining off the fresh instance.
				if self.peek_is_punct(".") || self.peek_is_brace("[") {
					let chained = self.continue_chain(Chained::Value(value))?;
					return self.finish_chain(chained);
				}
				Ok(value)
			}
			"lenof" => {
				self.cursor += 1;
				let value = self.read_operand_core()?;
				self.len_of(&value, tok)
			}
			"typeof" => {
				self.cursor += 1;
				let value = self.read_operand_core()?;
				self.type_of(&value)
			}
			"this" => self.read_chain_value(),
			word if !is_keyword(word) => self.read_chain_value(),
			word => Err(self.fault_at(tok, FaultKind::UnexpectedToken(word.to_string()))),
		}
	}

	fn read_array_literal(&mut self) -> Result<Value, Interrupt> {
		self.cursor += 1;
		let mut items = Vec::new();
		if !self.eat_brace("]") {
			loop {
				items.push(self.read_value()?);
				if self.eat_punct(",") {
					continue;
				}
				break;
			}
			self.expect_brace("]")?;
		}
		Ok(make_array(self.builtins()?, items))
	}

	/// Prefix `++`/`--` yields the value after the step.
	fn read_prefix_step(&mut self, tok: &Token) -> Result<Value, Interrupt> {
		let delta = if &*tok.text == "++" { 1.0 } else { -1.0 };
		self.cursor += 1;
		let chained = self.read_chain()?;
		let Chained::Place(place) = chained else {
			return Err(self.fault_at(tok, FaultKind::TypeMismatch(format!(
				"'{}' needs an assignable target",
				tok.text
			))));
		};
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let old = self.read_place(&place)?;
		let n = old.as_num().ok_or_else(|| {
			self.fault_at(tok, FaultKind::TypeMismatch(format!(
				"'{}' requires a number, got {}",
				tok.text,
				self.describe_type(&old)
			)))
		})?;
		let new = Value::Num(n + delta);
		self.write_place(&place, new.clone())?;
		Ok(new)
	}

	/// An identifier chain used as an expression, including the postfix
	/// step and compound-assignment forms.
	pub(crate) fn read_chain_value(&mut self) -> Result<Value, Interrupt> {
		let chained = self.read_chain()?;
		self.finish_chain(chained)
	}

	pub(crate) fn finish_chain(&mut self, chained: Chained) -> Result<Value, Interrupt> {
		match chained {
			Chained::Place(place) => {
				if self.peek_is_symbol("++") || self.peek_is_symbol("--") {
					return self.read_postfix_step(place);
				}
				if self.peek_is_symbol("+=") || self.peek_is_symbol("-=") {
					return self.read_compound_assign(place);
				}
				self.read_place(&place)
			}
			Chained::Value(value) => Ok(value),
			Chained::Extern(name) => Err(self.token_fault(FaultKind::TypeMismatch(format!(
				"'{name}' is a host type reference, not a value"
			)))),
		}
	}

	/// Postfix `++`/`--` yields the value from before the step.
	fn read_postfix_step(&mut self, place: Place) -> Result<Value, Interrupt> {
		let Some(tok) = self.next_token() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let delta = if &*tok.text == "++" { 1.0 } else { -1.0 };
		let old = self.read_place(&place)?;
		let n = old.as_num().ok_or_else(|| {
			self.fault_at(&tok, FaultKind::TypeMismatch(format!(
				"'{}' requires a number, got {}",
				tok.text,
				self.describe_type(&old)
			)))
		})?;
		self.write_place(&place, Value::Num(n + delta))?;
		Ok(old)
	}

	/// `+=`/`-=` yield the value after the assignment.
	fn read_compound_assign(&mut self, place: Place) -> Result<Value, Interrupt> {
		let Some(tok) = self.next_token() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		let rhs = self.read_value()?;
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let old = self.read_place(&place)?;
		let new = if &*tok.text == "+=" {
			self.add_values(&tok, old, rhs)?
		} else {
			old.minus(&rhs).ok_or_else(|| self.op_fault(&tok, "-=", &old, &rhs))?
		};
		self.write_place(&place, new.clone())?;
		Ok(new)
	}

	// ---- identifier chains ------------------------------------------------

	pub(crate) fn read_chain(&mut self) -> Result<Chained, Interrupt> {
		let Some(tok) = self.peek_token().cloned() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		let current = self.read_chain_base(&tok)?;
		self.continue_chain(current)
	}

	fn continue_chain(&mut self, mut current: Chained) -> Result<Chained, Interrupt> {
		loop {
			if self.peek_is_punct(".") {
				self.cursor += 1;
				let name = self.read_name()?;
				current = self.access_member(current, &name)?;
			} else if self.peek_is_brace("[") {
				self.cursor += 1;
				let index = self.read_value()?;
				self.expect_brace("]")?;
				current = self.index_chained(current, index)?;
			} else if self.peek_is_brace("(") {
				current = self.call_chained(current)?;
			} else {
				break;
			}
		}
		Ok(current)
	}

	fn read_chain_base(&mut self, tok: &Token) -> Result<Chained, Interrupt> {
		if tok.is_word("this") {
			self.cursor += 1;
			return match self.scope.nearest_instance() {
				Some(instance) => Ok(Chained::Value(Value::Instance(instance))),
				None if self.neutral > 0 => Ok(Chained::Value(Value::Null)),
				None => Err(self.fault_at(tok, FaultKind::UnknownIdentifier("this".into()))),
			};
		}
		if tok.kind != TokenKind::Word || is_keyword(&tok.text) {
			return Err(self.fault_at(tok, FaultKind::UnexpectedToken(tok.text.to_string())));
		}
		self.cursor += 1;
		if self.peek_is_punct("::") {
			self.cursor += 1;
			let name = self.read_name()?;
			let class = self.find_class(&name, Some(&tok.text)).ok_or_else(|| {
				self.fault_at(tok, FaultKind::UnknownClass(format!("{}::{name}", tok.text)))
			})?;
			return Ok(Chained::Value(Value::Class(class)));
		}
		if let Some(var) = self.scope.get(&tok.text) {
			return Ok(Chained::Place(Place::Var(var)));
		}
		// A bare call can hit a method of the enclosing receiver or class.
		if self.peek_is_brace("(") {
			if let Some((def, instance)) = self.scope_method(&tok.text) {
				let args = self.read_args()?;
				if self.neutral > 0 {
					return Ok(Chained::Value(Value::Null));
				}
				let func = self.arity_match(&def, &tok.text, args.len())?;
				return self.call_function(&func, instance, args).map(Chained::Value);
			}
		}
		if let Some(full) = self.find_extern(&tok.text) {
			return Ok(Chained::Extern(full));
		}
		if let Some(class) = self.find_class(&tok.text, None) {
			return Ok(Chained::Value(Value::Class(class)));
		}
		Ok(Chained::Place(Place::Unresolved(tok.text.clone())))
	}

	fn arity_match(&self, def: &Rc<ClassDef>, name: &str, arity: usize) -> Result<Rc<crate::interpreter::callable::FuncDef>, Interrupt> {
		if let Some(func) = def.find_func(name, arity) {
			return Ok(func);
		}
		match def.find_func_named(name) {
			Some(func) => Err(self.token_fault(FaultKind::WrongArgumentCount {
				name:     name.to_string(),
				expected: func.params.len(),
				got:      arity,
			})),
			None => Err(self.token_fault(FaultKind::UnknownMember(name.to_string()))),
		}
	}

	fn access_member(&mut self, current: Chained, name: &Rc<str>) -> Result<Chained, Interrupt> {
		if let Chained::Extern(full) = current {
			if self.peek_is_brace("(") {
				let args = self.read_args()?;
				return self.invoke_extern(&full, None, name, args).map(Chained::Value);
			}
			return Err(self.token_fault(FaultKind::UnknownMember(name.to_string())));
		}
		let value = self.resolve_chained(current)?;
		match value {
			Value::Class(class) => self.access_static(class, name),
			Value::Instance(instance) => self.access_instance(instance, name),
			Value::Boxed(host) => {
				if self.peek_is_brace("(") {
					let args = self.read_args()?;
					let type_name = host.type_name.clone();
					return self.invoke_extern(&type_name, Some(&host), name, args).map(Chained::Value);
				}
				Err(self.token_fault(FaultKind::UnknownMember(name.to_string())))
			}
			Value::Null => {
				if self.neutral > 0 {
					if self.peek_is_brace("(") {
						self.read_args()?;
					}
					return Ok(Chained::Value(Value::Null));
				}
				Err(self.token_fault(FaultKind::NullAccess(name.to_string())))
			}
			other => Err(self.token_fault(FaultKind::TypeMismatch(format!(
				"cannot access '{name}' on {}",
				self.describe_type(&other)
			)))),
		}
	}

	fn access_instance(&mut self, instance: RcCell<Instance>, name: &Rc<str>) -> Result<Chained, Interrupt> {
		let def = instance.borrow().def.clone();
		if self.peek_is_brace("(") {
			// Boxed host values surface as ExternValue instances and route
			// their calls across the bridge.
			if let Some(builtins) = self.builtins.clone() {
				if Rc::ptr_eq(&def, &builtins.extern_value) {
					return self.call_extern_instance(&instance, name);
				}
			}
			let args = self.read_args()?;
			if self.neutral > 0 {
				return Ok(Chained::Value(Value::Null));
			}
			let func = self.arity_match(&def, name, args.len())?;
			if func.private && !self.can_access(&def, Some(&instance)) {
				return Err(self.token_fault(FaultKind::PrivateAccess(name.to_string())));
			}
			return self.call_function(&func, Some(instance), args).map(Chained::Value);
		}
		let found = instance.borrow().find(name);
		match found {
			Some(var) => {
				if var.private && !self.can_access(&def, Some(&instance)) {
					return Err(self.token_fault(FaultKind::PrivateAccess(name.to_string())));
				}
				Ok(Chained::Place(Place::Var(var)))
			}
			None => match def.find_func_named(name) {
				Some(func) => Ok(Chained::Value(Value::Func(func))),
				None => Err(self.token_fault(FaultKind::UnknownMember(name.to_string()))),
			},
		}
	}

	fn access_static(&mut self, class: Rc<ClassDef>, name: &Rc<str>) -> Result<Chained, Interrupt> {
		if self.peek_is_brace("(") {
			let args = self.read_args()?;
			if self.neutral > 0 {
				return Ok(Chained::Value(Value::Null));
			}
			let func = self.arity_match(&class, name, args.len())?;
			if !func.is_static {
				return Err(self.token_fault(FaultKind::TypeMismatch(format!(
					"'{name}' is not static on {}",
					class.name
				))));
			}
			if func.private && !self.can_access(&class, None) {
				return Err(self.token_fault(FaultKind::PrivateAccess(name.to_string())));
			}
			return self.call_function(&func, None, args).map(Chained::Value);
		}
		match class.find_static(name) {
			Some(var) => {
				if var.private && !self.can_access(&class, None) {
					return Err(self.token_fault(FaultKind::PrivateAccess(name.to_string())));
				}
				Ok(Chained::Place(Place::Var(var)))
			}
			None => Err(self.token_fault(FaultKind::UnknownMember(name.to_string()))),
		}
	}

	fn index_chained(&mut self, current: Chained, index: Value) -> Result<Chained, Interrupt> {
		let value = self.resolve_chained(current)?;
		if self.neutral > 0 {
			return Ok(Chained::Value(Value::Null));
		}
		let backing = backing_array(&value)
			.ok_or_else(|| self.token_fault(FaultKind::NotAnArray(self.describe_type(&value))))?;
		let number = index.as_num().ok_or_else(|| {
			self.token_fault(FaultKind::TypeMismatch(format!(
				"index must be a number, got {}",
				self.describe_type(&index)
			)))
		})?;
		if number < 0.0 {
			return Err(self.token_fault(FaultKind::TypeMismatch("index must not be negative".into())));
		}
		let index = number.floor() as usize;
		let len = {
			let borrowed = backing.borrow();
			let items = borrowed
				.array
				.as_ref()
				.ok_or_else(|| Interrupt::internal("backing instance lost its array"))?
				.borrow();
			items.len()
		};
		if index >= len {
			return Err(self.token_fault(FaultKind::IndexOutOfRange { index, len }));
		}
		Ok(Chained::Place(Place::Elem(backing, index)))
	}

	fn call_chained(&mut self, current: Chained) -> Result<Chained, Interrupt> {
		let callee = self.resolve_chained(current)?;
		let args = self.read_args()?;
		if self.neutral > 0 {
			return Ok(Chained::Value(Value::Null));
		}
		match callee {
			Value::Func(func) => {
				// A function value called bare binds the nearest receiver,
				// when it has one and wants one.
				let this = if func.is_static || func.owner().is_none() {
					None
				} else {
					self.scope.nearest_instance()
				};
				self.call_function(&func, this, args).map(Chained::Value)
			}
			other => Err(self.token_fault(FaultKind::TypeMismatch(format!(
				"{} is not callable",
				self.describe_type(&other)
			)))),
		}
	}

	pub(crate) fn resolve_chained(&mut self, chained: Chained) -> Result<Value, Interrupt> {
		match chained {
			Chained::Value(value) => Ok(value),
			Chained::Place(place) => self.read_place(&place),
			Chained::Extern(name) => Err(self.token_fault(FaultKind::TypeMismatch(format!(
				"'{name}' is a host type reference, not a value"
			)))),
		}
	}

	pub(crate) fn read_args(&mut self) -> Result<Vec<Value>, Interrupt> {
		self.expect_brace("(")?;
		let mut args = Vec::new();
		if self.eat_brace(")") {
			return Ok(args);
		}
		loop {
			args.push(self.read_value()?);
			if self.eat_punct(",") {
				continue;
			}
			break;
		}
		self.expect_brace(")")?;
		Ok(args)
	}

	pub(crate) fn read_place(&mut self, place: &Place) -> Result<Value, Interrupt> {
		match place {
			Place::Var(var) => Ok(var.value.borrow().clone()),
			Place::Elem(backing, index) => {
				let borrowed = backing.borrow();
				let items = borrowed
					.array
					.as_ref()
					.ok_or_else(|| Interrupt::internal("backing instance lost its array"))?
					.borrow();
				items
					.get(*index)
					.cloned()
					.ok_or_else(|| self.token_fault(FaultKind::IndexOutOfRange { index: *index, len: items.len() }))
			}
			Place::Unresolved(name) => {
				if self.neutral > 0 {
					Ok(Value::Null)
				} else {
					Err(self.token_fault(FaultKind::UnknownIdentifier(name.to_string())))
				}
			}
		}
	}

	pub(crate) fn write_place(&mut self, place: &Place, value: Value) -> Result<(), Interrupt> {
		if self.neutral > 0 {
			return Ok(());
		}
		match place {
			Place::Var(var) => {
				if var.constant && !var.value.borrow().is_null() {
					return Err(self.token_fault(FaultKind::ConstReassigned(var.name.to_string())));
				}
				*var.value.borrow_mut() = value;
				Ok(())
			}
			Place::Elem(backing, index) => {
				let borrowed = backing.borrow();
				let mut items = borrowed
					.array
					.as_ref()
					.ok_or_else(|| Interrupt::internal("backing instance lost its array"))?
					.borrow_mut();
				let len = items.len();
				match items.get_mut(*index) {
					Some(slot) => {
						*slot = value;
						Ok(())
					}
					None => Err(self.token_fault(FaultKind::IndexOutOfRange { index: *index, len })),
				}
			}
			// Assignment to an unknown name declares it right here.
			Place::Unresolved(name) => {
				self.scope.declare(Variable::new(name.clone(), value));
				Ok(())
			}
		}
	}

	// ---- per-operand checks -----------------------------------------------

	fn read_is(&mut self, value: Value) -> Result<Value, Interrupt> {
		self.cursor += 1;
		let negate = self.eat_word("not");
		let first = self.read_word()?;
		let (name, ns) = if self.eat_punct("::") { (self.read_word()?, Some(first)) } else { (first, None) };
		if self.neutral > 0 {
			return Ok(Value::Bool(false));
		}
		let builtins = self.builtins()?.clone();
		let hit = match (&*name, &ns) {
			("number", None) => matches!(value, Value::Num(_)),
			("string", None) => string_text(&builtins, &value).is_some(),
			("char", None) => matches!(value, Value::Char(_)),
			("bool", None) => matches!(value, Value::Bool(_)),
			("function", None) => matches!(value, Value::Func(_)),
			_ => {
				let class = self.find_class(&name, ns.as_deref()).ok_or_else(|| {
					self.token_fault(FaultKind::UnknownType(name.to_string()))
				})?;
				matches!(&value, Value::Instance(i) if Rc::ptr_eq(&i.borrow().def, &class))
			}
		};
		Ok(Value::Bool(hit != negate))
	}

	/// Both arms are always parsed, only the selected one is evaluated. A
	/// `throw` arm throws only when selected.
	fn read_ternary(&mut self, test: Value) -> Result<Value, Interrupt> {
		self.cursor += 1;
		let chosen = if self.neutral > 0 {
			None
		} else {
			Some(test.as_bool().ok_or_else(|| {
				self.token_fault(FaultKind::TypeMismatch(format!(
					"ternary test must be a bool, got {}",
					self.describe_type(&test)
				)))
			})?)
		};
		let then_value = self.read_arm(chosen == Some(true))?;
		self.expect_punct(":")?;
		let else_value = self.read_arm(chosen == Some(false))?;
		Ok(match chosen {
			Some(true) => then_value.unwrap_or(Value::Null),
			Some(false) => else_value.unwrap_or(Value::Null),
			None => Value::Null,
		})
	}

	fn read_arm(&mut self, live: bool) -> Result<Option<Value>, Interrupt> {
		if self.peek_is_word("throw") {
			self.cursor += 1;
			if live {
				let value = self.read_value()?;
				return Err(self.throw_value(value)?);
			}
			self.neutrally(|s| s.read_value())?;
			return Ok(None);
		}
		if live {
			self.read_value().map(Some)
		} else {
			self.neutrally(|s| s.read_value()).map(Some)
		}
	}

	// ---- literals needing the interpreter ---------------------------------

	fn read_new(&mut self) -> Result<Value, Interrupt> {
		let Some(tok) = self.next_token() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		let first = self.read_name()?;
		let (name, ns) = if self.eat_punct("::") { (self.read_name()?, Some(first)) } else { (first, None) };
		if ns.is_none() {
			if let Some(full) = self.find_extern(&name) {
				let args = self.read_args()?;
				if self.neutral > 0 {
					return Ok(Value::Null);
				}
				return self.construct_extern(&full, args);
			}
		}
		let class = self
			.find_class(&name, ns.as_deref())
			.ok_or_else(|| self.fault_at(&tok, FaultKind::UnknownClass(name.to_string())))?;
		let args = self.read_args()?;
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		self.construct(&class, args)
	}

	fn len_of(&mut self, value: &Value, tok: &Token) -> Result<Value, Interrupt> {
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let backing = backing_array(value)
			.ok_or_else(|| self.fault_at(tok, FaultKind::NotAnArray(self.describe_type(value))))?;
		let len = {
			let borrowed = backing.borrow();
			let items = borrowed
				.array
				.as_ref()
				.ok_or_else(|| Interrupt::internal("backing instance lost its array"))?
				.borrow();
			items.len()
		};
		Ok(Value::Num(len as f64))
	}

	fn type_of(&mut self, value: &Value) -> Result<Value, Interrupt> {
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let builtins = self.builtins()?.clone();
		let (name, full) = if string_text(&builtins, value).is_some() {
			("string".to_string(), "string".to_string())
		} else {
			match value {
				Value::Instance(instance) => {
					let def = instance.borrow().def.clone();
					(def.name.to_string(), def.full_name())
				}
				Value::Boxed(host) => (host.type_name.to_string(), host.type_name.to_string()),
				other => {
					let name = other.builtin_type_name().unwrap_or("value").to_string();
					(name.clone(), name)
				}
			}
		};
		Ok(make_builtin_instance(&builtins.r#type, vec![
			make_string(&builtins, &name),
			make_string(&builtins, &full),
		]))
	}

	/// `$"..."`: literal pieces plus re-scanned, recursively evaluated
	/// holes.
	fn eval_format(&mut self, tok: &Token) -> Result<Value, Interrupt> {
		let text = &*tok.text;
		let idx: Vec<(usize, char)> = text.char_indices().collect();
		let count = idx.len();
		let mut out = String::new();
		let mut k = 0;
		while k < count {
			let (_, c) = idx[k];
			if c == '\\' && k + 1 < count {
				out.push(unescape_char(idx[k + 1].1));
				k += 2;
				continue;
			}
			if c == '{' {
				let mut depth = 1usize;
				let mut in_literal: Option<char> = None;
				let mut j = k + 1;
				while j < count {
					let ch = idx[j].1;
					if let Some(quote) = in_literal {
						if ch == '\\' {
							j += 2;
							continue;
						}
						if ch == quote {
							in_literal = None;
						}
					} else {
						match ch {
							'"' | '\'' => in_literal = Some(ch),
							'{' => depth += 1,
							'}' => {
								depth -= 1;
								if depth == 0 {
									break;
								}
							}
							_ => {}
						}
					}
					j += 1;
				}
				if depth != 0 || j >= count {
					return Err(self.fault_at(tok, FaultKind::UnterminatedBrace("}".into())));
				}
				let hole = &text[idx[k].0 + 1..idx[j].0];
				let value = self.eval_fragment_text(&tok.doc.name, hole)?;
				out.push_str(&self.render(&value)?);
				k = j + 1;
				continue;
			}
			out.push(c);
			k += 1;
		}
		self.make_string_value(&out)
	}

	// ---- rendering --------------------------------------------------------

	/// How a value looks in `print` output and interpolations.
	pub(crate) fn render(&mut self, value: &Value) -> Result<String, Interrupt> {
		let builtins = self.builtins()?.clone();
		if let Some(text) = string_text(&builtins, value) {
			return Ok(text);
		}
		Ok(value.to_string())
	}

	pub(crate) fn make_string_value(&mut self, text: &str) -> Result<Value, Interrupt> {
		Ok(make_string(self.builtins()?, text))
	}

	/// A short type name for error messages.
	pub(crate) fn describe_type(&self, value: &Value) -> String {
		match value {
			Value::Instance(instance) => instance.borrow().def.name.to_string(),
			Value::Boxed(host) => host.type_name.to_string(),
			other => other.builtin_type_name().unwrap_or("value").to_string(),
		}
	}
}
