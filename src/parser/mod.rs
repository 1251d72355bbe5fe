//! Statement materializer.
//!
//! There is no syntax tree. Execution walks the token array directly, and
//! `read_node` turns the tokens at the cursor into a [`Node`] every time a
//! statement is about to run, re-parsing on every encounter. Compound
//! statements capture the token sub-ranges of their moving parts so a loop
//! can re-enter its condition and body any number of times.
//!
//! Two capture techniques do all the work:
//!
//! - brace-delimited parts are sliced by matching the closing brace;
//! - a brace-less inline body or a condition has no closing marker, so its
//!   extent is discovered by running it once in neutral mode: the same
//!   dispatch with every side effect suppressed, consuming exactly the
//!   tokens the real run would.
//!
//! Keywords only gain meaning here. The scanner hands over plain words, and
//! whether `while` starts a loop is decided at the moment a statement is
//! materialized.

mod node;

use std::{cell::RefCell, rc::{Rc, Weak}};

pub(crate) use node::*;

use crate::{
	environment::Variable,
	error::{Fault, FaultKind},
	interpreter::{
		callable::{FuncDef, Param},
		class::ClassDef,
		eval::parse_number,
		value::Value,
		Interpreter, Interrupt,
	},
	scanner::{is_keyword, Token, TokenKind},
};

/// Everything a `class` block declares: the definition itself plus the
/// static work the loader must do exactly once.
pub(crate) struct ClassParse {
	pub def:          Rc<ClassDef>,
	/// Static fields with initializers, evaluated at load time.
	pub static_inits: Vec<(Rc<Variable>, Rc<[Token]>)>,
	/// Static constructors, run before the main program.
	pub static_ctors: Vec<Rc<FuncDef>>,
}

impl Interpreter {
	/// Materialize the next statement head, or None at the end of the range.
	pub(crate) fn read_node(&mut self) -> Result<Option<Node>, Interrupt> {
		let Some(tok) = self.peek_token().cloned() else { return Ok(None) };
		let node = match tok.kind {
			TokenKind::Brace if &*tok.text == "{" => Node::Block(self.capture_block()?),
			TokenKind::Punct if &*tok.text == ";" => {
				self.cursor += 1;
				Node::Empty
			}
			TokenKind::Word => return self.read_word_node(&tok).map(Some),
			_ => Node::Express,
		};
		Ok(Some(node))
	}

	fn read_word_node(&mut self, tok: &Token) -> Result<Node, Interrupt> {
		let node = match &*tok.text {
			"var" | "const" => {
				self.cursor += 1;
				let name = self.read_name()?;
				let has_init = self.eat_symbol("=");
				Node::Var { name, constant: &*tok.text == "const", has_init }
			}
			"if" => {
				self.cursor += 1;
				Node::If(self.read_conditional()?)
			}
			"while" => {
				self.cursor += 1;
				Node::While(self.read_conditional()?)
			}
			"else" => {
				self.cursor += 1;
				Node::Else(self.read_body(false)?)
			}
			"for" => self.read_for()?,
			"foreach" => self.read_foreach()?,
			"try" => self.read_try()?,
			"section" => {
				self.cursor += 1;
				Node::Section(self.capture_block()?)
			}
			"break" => {
				self.cursor += 1;
				Node::Break
			}
			"continue" => {
				self.cursor += 1;
				Node::Continue
			}
			"return" => {
				self.cursor += 1;
				Node::Return
			}
			"throw" => {
				self.cursor += 1;
				Node::Throw
			}
			"print" => {
				self.cursor += 1;
				Node::Print
			}
			"class" => {
				self.read_class_def()?;
				Node::Definition
			}
			"enum" => {
				self.read_enum_def()?;
				Node::Definition
			}
			"func" => {
				self.read_func_def(false, false)?;
				Node::Definition
			}
			"namespace" => {
				self.read_namespace()?;
				Node::Definition
			}
			"using" => {
				self.read_using()?;
				Node::Definition
			}
			"extern" => {
				self.read_extern()?;
				Node::Definition
			}
			"constructor" => return Err(self.token_fault(FaultKind::ConstructorOutsideClass)),
			"static" => return Err(self.token_fault(FaultKind::MisplacedDirective("static".into()))),
			"in" | "is" | "not" | "notnull" | "basearray" | "catch" | "finally" | "when" => {
				return Err(self.token_fault(FaultKind::UnexpectedToken(tok.text.to_string())));
			}
			// `this.x = 1`, `new C();`, literals and the rest.
			_ => Node::Express,
		};
		Ok(node)
	}

	// ---- compound statement parts ----------------------------------------

	fn read_conditional(&mut self) -> Result<Rc<Conditional>, Interrupt> {
		let condition = self.read_expr_extent()?;
		let attrs = self.read_attrs()?;
		let body = self.read_body(attrs.is_some())?;
		Ok(Rc::new(Conditional { condition, body, attrs: attrs.unwrap_or_default() }))
	}

	fn read_for(&mut self) -> Result<Node, Interrupt> {
		self.cursor += 1;
		let init = self.capture_until_semi()?;
		let condition = self.capture_until_semi()?;
		let step = if self.peek_is_brace("{") || self.peek_is_punct(":") {
			Rc::from(Vec::new())
		} else {
			self.read_inline_statement()?
		};
		let attrs = self.read_attrs()?;
		let body = self.read_body(attrs.is_some())?;
		Ok(Node::For(Rc::new(ForLoop { init, condition, step, body, attrs: attrs.unwrap_or_default() })))
	}

	fn read_foreach(&mut self) -> Result<Node, Interrupt> {
		self.cursor += 1;
		let bind = self.read_name()?;
		self.expect_word("in")?;
		let source = self.read_expr_extent()?;
		let attrs = self.read_attrs()?;
		let body = self.read_body(attrs.is_some())?;
		Ok(Node::Foreach(Rc::new(ForeachLoop { bind, source, body, attrs: attrs.unwrap_or_default() })))
	}

	fn read_try(&mut self) -> Result<Node, Interrupt> {
		self.cursor += 1;
		let body = self.capture_block()?;
		let catch = if self.peek_is_word("catch") {
			self.cursor += 1;
			let bind = match self.peek_token() {
				Some(t) if t.kind == TokenKind::Word && !is_keyword(&t.text) => Some(self.read_name()?),
				_ => None,
			};
			let guard = if self.peek_is_word("when") {
				self.cursor += 1;
				Some(self.read_expr_extent()?)
			} else {
				None
			};
			let body = self.capture_block()?;
			Some(Rc::new(CatchClause { bind, guard, body }))
		} else {
			None
		};
		let finally = if self.peek_is_word("finally") {
			self.cursor += 1;
			Some(self.capture_block()?)
		} else {
			None
		};
		Ok(Node::Try(Rc::new(TryBlock { body, catch, finally })))
	}

	fn read_attrs(&mut self) -> Result<Option<LoopAttrs>, Interrupt> {
		if !self.peek_is_punct(":") {
			return Ok(None);
		}
		self.cursor += 1;
		let mut attrs = LoopAttrs::default();
		loop {
			let word = self.read_word()?;
			match &*word {
				"id" => {
					if attrs.id.is_some() {
						return Err(self.token_fault(FaultKind::DuplicateAttribute("id".into())));
					}
					attrs.id = Some(self.read_name()?);
				}
				"counter" => {
					if attrs.counter.is_some() {
						return Err(self.token_fault(FaultKind::DuplicateAttribute("counter".into())));
					}
					attrs.counter = Some(self.read_name()?);
				}
				other => return Err(self.token_fault(FaultKind::UnexpectedToken(other.to_string()))),
			}
			if self.eat_punct(",") {
				continue;
			}
			break;
		}
		Ok(Some(attrs))
	}

	/// Body after a loop or conditional header. An attribute clause forces a
	/// brace block, since an inline body would make the clause ambiguous.
	fn read_body(&mut self, require_braces: bool) -> Result<Rc<[Token]>, Interrupt> {
		if self.peek_is_brace("{") {
			return self.capture_block();
		}
		if require_braces {
			return Err(self.token_fault(FaultKind::ExpectedToken("{".into())));
		}
		self.read_inline_statement()
	}

	/// The extent of one statement, discovered by a neutral dry-run. The
	/// cursor ends up past the statement, exactly as a real run would leave
	/// it.
	pub(crate) fn read_inline_statement(&mut self) -> Result<Rc<[Token]>, Interrupt> {
		let start = self.cursor;
		self.neutrally(|s| match s.read_node()? {
			Some(node) => s.run_statement(node).map(|_| ()),
			None => Err(s.token_fault(FaultKind::UnexpectedEnd)),
		})?;
		Ok(self.tokens[start..self.cursor].into())
	}

	/// The extent of one expression, discovered by a neutral evaluation.
	pub(crate) fn read_expr_extent(&mut self) -> Result<Rc<[Token]>, Interrupt> {
		let start = self.cursor;
		self.neutrally(|s| s.read_value())?;
		Ok(self.tokens[start..self.cursor].into())
	}

	// ---- definitions ------------------------------------------------------

	pub(crate) fn read_class_def(&mut self) -> Result<ClassParse, Interrupt> {
		self.cursor += 1;
		let name = self.read_name()?;
		let props = self.read_props()?;
		let def = Rc::new(ClassDef {
			name,
			namespace: self.current_ns.clone(),
			props,
			funcs: RefCell::new(Vec::new()),
			statics: RefCell::new(Vec::new()),
		});
		let mut static_inits = Vec::new();
		let mut static_ctors = Vec::new();
		self.expect_brace("{")?;
		loop {
			if self.eat_brace("}") {
				break;
			}
			if self.peek_token().is_none() {
				return Err(self.token_fault(FaultKind::UnterminatedBrace("}".into())));
			}
			let mut is_static = false;
			let mut private = false;
			let mut constant = false;
			loop {
				if !is_static && self.peek_is_word("static") {
					is_static = true;
				} else if !private && self.peek_is_word("private") {
					private = true;
				} else if !constant && self.peek_is_word("const") {
					constant = true;
				} else {
					break;
				}
				self.cursor += 1;
			}
			if self.peek_is_word("func") || self.peek_is_word("constructor") {
				let func = self.read_func_def(is_static, private)?;
				*func.owner.borrow_mut() = Rc::downgrade(&def);
				if func.is_ctor && func.is_static {
					if !func.params.is_empty() {
						return Err(self.token_fault(FaultKind::WrongArgumentCount {
							name:     "static constructor".into(),
							expected: 0,
							got:      func.params.len(),
						}));
					}
					static_ctors.push(func.clone());
				}
				def.funcs.borrow_mut().push(func);
				continue;
			}
			// Anything else in a class body is a static field.
			if !is_static {
				let text = self.peek_token().map(|t| t.text.to_string()).unwrap_or_default();
				return Err(self.token_fault(FaultKind::UnexpectedToken(text)));
			}
			let field = self.read_name()?;
			let var = Variable::with_flags(field, Value::Null, private, constant);
			if self.eat_symbol("=") {
				static_inits.push((var.clone(), self.read_expr_extent()?));
			}
			self.eat_semi();
			def.statics.borrow_mut().push(var);
		}
		Ok(ClassParse { def, static_inits, static_ctors })
	}

	fn read_props(&mut self) -> Result<Vec<crate::interpreter::class::Property>, Interrupt> {
		use crate::interpreter::class::Property;
		self.expect_brace("(")?;
		let mut props = Vec::new();
		if self.eat_brace(")") {
			return Ok(props);
		}
		loop {
			let mut private = false;
			let mut constant = false;
			loop {
				if !private && self.peek_is_word("private") {
					private = true;
				} else if !constant && self.peek_is_word("const") {
					constant = true;
				} else {
					break;
				}
				self.cursor += 1;
			}
			let name = self.read_name()?;
			let basearray = self.eat_word("basearray");
			if basearray && props.iter().any(|p: &Property| p.basearray) {
				return Err(self.token_fault(FaultKind::DuplicateAttribute("basearray".into())));
			}
			let default = if self.eat_symbol("=") { Some(self.read_expr_extent()?) } else { None };
			props.push(Property { name, private, constant, basearray, default });
			if self.eat_punct(",") {
				continue;
			}
			break;
		}
		self.expect_brace(")")?;
		Ok(props)
	}

	pub(crate) fn read_func_def(&mut self, is_static: bool, private: bool) -> Result<Rc<FuncDef>, Interrupt> {
		let keyword = self.read_word()?;
		let is_ctor = &*keyword == "constructor";
		let name = if is_ctor { None } else { Some(self.read_name()?) };
		let params = self.read_params()?;
		let body = self.capture_block()?;
		Ok(Rc::new(FuncDef {
			name,
			params,
			body,
			owner: RefCell::new(Weak::new()),
			is_static,
			private,
			is_ctor,
		}))
	}

	fn read_params(&mut self) -> Result<Vec<Param>, Interrupt> {
		self.expect_brace("(")?;
		let mut params = Vec::new();
		if self.eat_brace(")") {
			return Ok(params);
		}
		loop {
			let name = self.read_name()?;
			let not_null = self.eat_word("notnull");
			params.push(Param { name, not_null });
			if self.eat_punct(",") {
				continue;
			}
			break;
		}
		self.expect_brace(")")?;
		Ok(params)
	}

	pub(crate) fn read_enum_def(&mut self) -> Result<Rc<ClassDef>, Interrupt> {
		self.cursor += 1;
		let name = self.read_name()?;
		self.expect_brace("{")?;
		let mut used: Vec<f64> = Vec::new();
		let mut statics = Vec::new();
		loop {
			if self.eat_brace("}") {
				break;
			}
			let entry = self.read_name()?;
			let value = if self.eat_symbol("=") {
				let tok = self.next_token().ok_or_else(|| self.token_fault(FaultKind::UnexpectedEnd))?;
				if tok.kind != TokenKind::Number {
					return Err(self.fault_at(&tok, FaultKind::ExpectedToken("number".into())));
				}
				let value = parse_number(&tok.text)
					.ok_or_else(|| self.fault_at(&tok, FaultKind::InvalidNumber(tok.text.to_string())))?;
				if used.contains(&value) {
					return Err(self.fault_at(&tok, FaultKind::DuplicateEnumValue(entry.to_string())));
				}
				value
			} else {
				// First unused non-negative integer wins.
				let mut candidate = 0.0;
				while used.contains(&candidate) {
					candidate += 1.0;
				}
				candidate
			};
			used.push(value);
			statics.push(Variable::with_flags(entry, Value::Num(value), false, true));
			self.eat_punct(",");
		}
		Ok(Rc::new(ClassDef {
			name,
			namespace: self.current_ns.clone(),
			props: Vec::new(),
			funcs: RefCell::new(Vec::new()),
			statics: RefCell::new(statics),
		}))
	}

	pub(crate) fn read_namespace(&mut self) -> Result<Rc<str>, Interrupt> {
		self.cursor += 1;
		let name = self.read_name()?;
		self.expect_punct(":")?;
		Ok(name)
	}

	pub(crate) fn read_using(&mut self) -> Result<Rc<str>, Interrupt> {
		self.cursor += 1;
		let name = self.read_name()?;
		self.eat_semi();
		Ok(name)
	}

	/// `extern class Ref = "Full.Type.Name";`
	pub(crate) fn read_extern(&mut self) -> Result<(Rc<str>, Rc<str>), Interrupt> {
		self.cursor += 1;
		self.expect_word("class")?;
		let reference = self.read_name()?;
		self.expect_symbol("=")?;
		let tok = self.next_token().ok_or_else(|| self.token_fault(FaultKind::UnexpectedEnd))?;
		if tok.kind != TokenKind::Str {
			return Err(self.fault_at(&tok, FaultKind::ExpectedToken("type name string".into())));
		}
		self.eat_semi();
		Ok((reference, tok.text.clone()))
	}

	// ---- token cursor helpers ---------------------------------------------

	pub(crate) fn peek_token(&self) -> Option<&Token> { self.tokens.get(self.cursor) }

	pub(crate) fn next_token(&mut self) -> Option<Token> {
		let tok = self.tokens.get(self.cursor).cloned()?;
		self.cursor += 1;
		Some(tok)
	}

	pub(crate) fn peek_is_word(&self, word: &str) -> bool {
		self.peek_token().is_some_and(|t| t.is_word(word))
	}

	pub(crate) fn peek_is_symbol(&self, symbol: &str) -> bool {
		self.peek_token().is_some_and(|t| t.is_symbol(symbol))
	}

	pub(crate) fn peek_is_punct(&self, punct: &str) -> bool {
		self.peek_token().is_some_and(|t| t.is_punct(punct))
	}

	pub(crate) fn peek_is_brace(&self, brace: &str) -> bool {
		self.peek_token().is_some_and(|t| t.is_brace(brace))
	}

	pub(crate) fn eat_symbol(&mut self, symbol: &str) -> bool {
		let hit = self.peek_is_symbol(symbol);
		if hit {
			self.cursor += 1;
		}
		hit
	}

	pub(crate) fn eat_punct(&mut self, punct: &str) -> bool {
		let hit = self.peek_is_punct(punct);
		if hit {
			self.cursor += 1;
		}
		hit
	}

	pub(crate) fn eat_brace(&mut self, brace: &str) -> bool {
		let hit = self.peek_is_brace(brace);
		if hit {
			self.cursor += 1;
		}
		hit
	}

	pub(crate) fn eat_word(&mut self, word: &str) -> bool {
		let hit = self.peek_is_word(word);
		if hit {
			self.cursor += 1;
		}
		hit
	}

	/// Statement terminators are lenient: a `;` is consumed when present.
	pub(crate) fn eat_semi(&mut self) { self.eat_punct(";"); }

	/// Any word, keyword or not.
	pub(crate) fn read_word(&mut self) -> Result<Rc<str>, Interrupt> {
		match self.peek_token() {
			Some(t) if t.kind == TokenKind::Word => {
				let text = t.text.clone();
				self.cursor += 1;
				Ok(text)
			}
			Some(t) => Err(self.token_fault(FaultKind::UnexpectedToken(t.text.to_string()))),
			None => Err(self.token_fault(FaultKind::UnexpectedEnd)),
		}
	}

	/// A word usable as a name, keywords rejected.
	pub(crate) fn read_name(&mut self) -> Result<Rc<str>, Interrupt> {
		match self.peek_token() {
			Some(t) if t.kind == TokenKind::Word && !is_keyword(&t.text) => {
				let text = t.text.clone();
				self.cursor += 1;
				Ok(text)
			}
			Some(t) => Err(self.token_fault(FaultKind::UnexpectedToken(t.text.to_string()))),
			None => Err(self.token_fault(FaultKind::UnexpectedEnd)),
		}
	}

	pub(crate) fn expect_word(&mut self, word: &str) -> Result<(), Interrupt> {
		if self.eat_word(word) {
			Ok(())
		} else {
			Err(self.token_fault(FaultKind::ExpectedToken(word.into())))
		}
	}

	pub(crate) fn expect_symbol(&mut self, symbol: &str) -> Result<(), Interrupt> {
		if self.eat_symbol(symbol) {
			Ok(())
		} else {
			Err(self.token_fault(FaultKind::ExpectedToken(symbol.into())))
		}
	}

	pub(crate) fn expect_punct(&mut self, punct: &str) -> Result<(), Interrupt> {
		if self.eat_punct(punct) {
			Ok(())
		} else {
			Err(self.token_fault(FaultKind::ExpectedToken(punct.into())))
		}
	}

	pub(crate) fn expect_brace(&mut self, brace: &str) -> Result<(), Interrupt> {
		if self.eat_brace(brace) {
			Ok(())
		} else {
			Err(self.token_fault(FaultKind::ExpectedToken(brace.into())))
		}
	}

	/// Capture the inside of a `{ ... }` block, cursor past the closer.
	pub(crate) fn capture_block(&mut self) -> Result<Rc<[Token]>, Interrupt> {
		self.expect_brace("{")?;
		let start = self.cursor;
		let mut depth = 1usize;
		let mut i = self.cursor;
		while i < self.tokens.len() {
			let tok = &self.tokens[i];
			if tok.is_brace("{") {
				depth += 1;
			} else if tok.is_brace("}") {
				depth -= 1;
				if depth == 0 {
					let body = self.tokens[start..i].into();
					self.cursor = i + 1;
					return Ok(body);
				}
			}
			i += 1;
		}
		Err(self.token_fault(FaultKind::UnterminatedBrace("}".into())))
	}

	/// Capture tokens up to a `;` at bracket depth zero, cursor past the
	/// `;`. Used for the header regions of `for`.
	pub(crate) fn capture_until_semi(&mut self) -> Result<Rc<[Token]>, Interrupt> {
		let start = self.cursor;
		let mut depth = 0usize;
		let mut i = self.cursor;
		while i < self.tokens.len() {
			let tok = &self.tokens[i];
			match tok.kind {
				TokenKind::Brace if matches!(&*tok.text, "(" | "[" | "{") => depth += 1,
				TokenKind::Brace => depth = depth.saturating_sub(1),
				TokenKind::Punct if &*tok.text == ";" && depth == 0 => {
					let region = self.tokens[start..i].into();
					self.cursor = i + 1;
					return Ok(region);
				}
				_ => {}
			}
			i += 1;
		}
		Err(self.token_fault(FaultKind::ExpectedToken(";".into())))
	}

	/// Fault positioned at the token under the cursor, or the last token
	/// when the range is exhausted.
	pub(crate) fn token_fault(&self, kind: FaultKind) -> Interrupt {
		let index = self.cursor.min(self.tokens.len().saturating_sub(1));
		match self.tokens.get(index) {
			Some(tok) => self.fault_at(tok, kind),
			None => Interrupt::Fault(Fault::bare("ember", kind)),
		}
	}

	pub(crate) fn fault_at(&self, tok: &Token, kind: FaultKind) -> Interrupt {
		let (line, col) = tok.doc.locate(tok.offset);
		Interrupt::Fault(Fault::new(tok.doc.name.clone(), line, col, kind))
	}
}
