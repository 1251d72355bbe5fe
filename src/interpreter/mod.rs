//! The tree-less interpreter.
//!
//! Execution state is a token range plus a cursor. Statements are
//! materialized from the tokens each time they are about to run, compound
//! statements re-enter their captured sub-ranges, and function calls swap
//! the whole range for the callee's body. Control flow travels outward as
//! values: a statement yields a [`Flow`], and fatal faults and script
//! exceptions ride the error side of the same `Result` as an [`Interrupt`].

pub mod bridge;
pub(crate) mod callable;
pub(crate) mod class;
pub(crate) mod eval;
pub(crate) mod instance;
pub(crate) mod value;

use std::rc::Rc;

use crate::{
	document::Document,
	environment::{Scope, Variable},
	error::{Fault, FaultKind},
	interpreter::{
		bridge::{HostArg, HostBridge, HostObject},
		callable::FuncDef,
		class::{Builtins, ClassDef},
		eval::Chained,
		instance::{backing_array, make_array, make_builtin_instance, make_string, string_text, Instance},
		value::Value,
	},
	parser::{CatchClause, Conditional, ForLoop, ForeachLoop, LoopAttrs, Node, TryBlock},
	scanner::{is_keyword, scan, Token, TokenKind},
	utils::RcCell,
};

/// Classes every interpreter starts with, defined in script form so the
/// object model has exactly one construction path.
const PRELUDE: &str = "
class Exception(message) {
	constructor(msg) {
		message = msg;
	}
}

class Array() {
}

class string(chars basearray) {
}

class Type(name, fullName) {
}

class ExternValue(typeName, value) {
}
";

// Kept well below what the native stack can absorb: every script call
// costs a handful of native frames.
const RECURSION_LIMIT: usize = 64;

/// Why evaluation stopped early. Faults are fatal, throws are catchable.
#[derive(Debug)]
pub(crate) enum Interrupt {
	Fault(Fault),
	Throw(Thrown),
}

/// A propagating exception together with where it was raised, so an
/// uncaught one still points at its source.
#[derive(Debug, Clone)]
pub(crate) struct Thrown {
	pub(crate) exception: RcCell<Instance>,
	origin:               String,
	line:                 usize,
	col:                  usize,
}

impl Interrupt {
	pub fn internal(message: impl Into<String>) -> Self { Interrupt::Fault(Fault::internal(message)) }
}

impl From<Fault> for Interrupt {
	fn from(fault: Fault) -> Self { Interrupt::Fault(fault) }
}

/// How a statement finished. Anything but `Normal` unwinds until a construct
/// claims it: loops claim breaks and continues, calls claim returns.
#[derive(Debug)]
pub(crate) enum Flow {
	Normal,
	Break(Option<Rc<str>>),
	Continue(Option<Rc<str>>),
	Return(Option<Value>),
}

/// One entry of the transient control stack. Frames record what `break`,
/// `return` and `section` may legally target; they are pushed and popped
/// around execution and never survive it.
#[derive(Debug)]
enum Frame {
	Loop { id: Option<Rc<str>> },
	Func { is_ctor: bool },
	Try { catch: Option<Rc<CatchClause>> },
}

pub(crate) struct Interpreter {
	pub(crate) globals:    Rc<Scope>,
	pub(crate) scope:      Rc<Scope>,
	frames:                Vec<Frame>,
	pub(crate) tokens:     Rc<[Token]>,
	pub(crate) cursor:     usize,
	/// Depth of neutral (side-effect-free) execution. Zero means live.
	pub(crate) neutral:    u32,
	/// Whether the previous statement was a conditional and whether its
	/// condition was ever true. `else` keys off this.
	last_condition:        Option<bool>,
	classes:               Vec<Rc<ClassDef>>,
	/// `extern class` references: script name to full host type name.
	externs:               Vec<(Rc<str>, Rc<str>)>,
	usings:                Vec<Rc<str>>,
	pub(crate) current_ns: Option<Rc<str>>,
	/// None only while the prelude itself is loading.
	pub(crate) builtins:   Option<Builtins>,
	static_ctors:          Vec<Rc<FuncDef>>,
	print:                 Box<dyn FnMut(&str)>,
	bridge:                Rc<dyn HostBridge>,
}

impl Interpreter {
	pub(crate) fn new(print: Box<dyn FnMut(&str)>, bridge: Rc<dyn HostBridge>) -> Result<Self, Fault> {
		let globals = Scope::global();
		let mut interp = Self {
			globals: globals.clone(),
			scope: globals,
			frames: Vec::new(),
			tokens: Rc::from(Vec::new()),
			cursor: 0,
			neutral: 0,
			last_condition: None,
			classes: Vec::new(),
			externs: Vec::new(),
			usings: Vec::new(),
			current_ns: None,
			builtins: None,
			static_ctors: Vec::new(),
			print,
			bridge,
		};
		let prelude = Document::new("prelude", PRELUDE);
		interp.load(&prelude).map_err(|interrupt| match interrupt {
			Interrupt::Fault(fault) => fault,
			Interrupt::Throw(_) => Fault::internal("prelude raised an exception"),
		})?;
		interp.builtins = Some(Builtins {
			array:        interp.class_named("Array")?,
			string:       interp.class_named("string")?,
			exception:    interp.class_named("Exception")?,
			r#type:       interp.class_named("Type")?,
			extern_value: interp.class_named("ExternValue")?,
		});
		Ok(interp)
	}

	fn class_named(&self, name: &str) -> Result<Rc<ClassDef>, Fault> {
		self
			.classes
			.iter()
			.find(|c| &*c.name == name && c.namespace.is_none())
			.cloned()
			.ok_or_else(|| Fault::internal(format!("builtin class '{name}' missing")))
	}

	pub(crate) fn builtins(&self) -> Result<&Builtins, Interrupt> {
		self.builtins.as_ref().ok_or_else(|| Interrupt::internal("builtins not initialized"))
	}

	// ---- loading ----------------------------------------------------------

	/// Scan a document and register everything it defines. Directives must
	/// precede the first executable statement; executable statements are
	/// skipped here and run later by [`Self::run_program`].
	pub(crate) fn load(&mut self, doc: &Rc<Document>) -> Result<Rc<[Token]>, Interrupt> {
		let tokens: Rc<[Token]> = scan(doc)?.into();
		self.current_ns = None;
		self.with_tokens(tokens.clone(), |s| {
			let mut seen_code = false;
			let mut ns_declared = false;
			while let Some(tok) = s.peek_token().cloned() {
				if tok.is_word("namespace") {
					if seen_code {
						return Err(s.token_fault(FaultKind::MisplacedDirective("namespace".into())));
					}
					if ns_declared {
						return Err(s.token_fault(FaultKind::NamespaceRedeclared));
					}
					let name = s.read_namespace()?;
					s.current_ns = Some(name);
					ns_declared = true;
				} else if tok.is_word("using") {
					if seen_code {
						return Err(s.token_fault(FaultKind::MisplacedDirective("using".into())));
					}
					let name = s.read_using()?;
					if !s.usings.contains(&name) {
						s.usings.push(name);
					}
				} else if tok.is_word("extern") {
					if seen_code {
						return Err(s.token_fault(FaultKind::MisplacedDirective("extern".into())));
					}
					let (reference, full) = s.read_extern()?;
					if !s.bridge.resolve_type(&full) {
						return Err(s.fault_at(&tok, FaultKind::ExternUnresolved(full.to_string())));
					}
					s.externs.push((reference, full));
				} else if tok.is_word("class") {
					let parse = s.read_class_def()?;
					s.register_class(parse.def.clone())?;
					for (var, init) in parse.static_inits {
						let value = s.eval_in_class_scope(&parse.def, &init)?;
						*var.value.borrow_mut() = value;
					}
					s.static_ctors.extend(parse.static_ctors);
				} else if tok.is_word("enum") {
					let def = s.read_enum_def()?;
					s.register_class(def)?;
				} else if tok.is_word("func") {
					let func = s.read_func_def(false, false)?;
					let name = func
						.name
						.clone()
						.ok_or_else(|| Interrupt::internal("free function without a name"))?;
					s.globals.declare(Variable::new(name, Value::Func(func)));
				} else {
					seen_code = true;
					s.read_inline_statement()?;
				}
			}
			Ok(())
		})?;
		Ok(tokens)
	}

	fn register_class(&mut self, def: Rc<ClassDef>) -> Result<(), Interrupt> {
		if self.classes.iter().any(|c| c.name == def.name && c.namespace == def.namespace) {
			return Err(self.token_fault(FaultKind::DuplicateClass(def.full_name())));
		}
		self.classes.push(def);
		Ok(())
	}

	/// Evaluate a captured range with the class's statics in scope, the way
	/// property defaults and static initializers expect.
	fn eval_in_class_scope(&mut self, def: &Rc<ClassDef>, tokens: &Rc<[Token]>) -> Result<Value, Interrupt> {
		let scope = Scope::function(self.globals.clone(), None, Some(def.clone()));
		let saved = std::mem::replace(&mut self.scope, scope);
		let result = self.eval_tokens(tokens);
		self.scope = saved;
		result
	}

	pub(crate) fn run_static_ctors(&mut self) -> Result<(), Interrupt> {
		let ctors = std::mem::take(&mut self.static_ctors);
		for ctor in ctors {
			self.call_function(&ctor, None, Vec::new())?;
		}
		Ok(())
	}

	/// Run the executable top level of an already loaded document.
	pub(crate) fn run_program(&mut self, tokens: Rc<[Token]>) -> Result<(), Interrupt> {
		self.with_tokens(tokens, |s| loop {
			let Some(node) = s.read_node()? else { return Ok(()) };
			match s.run_statement(node)? {
				Flow::Normal => {}
				_ => return Err(Interrupt::internal("control flow escaped the program")),
			}
		})
	}

	// ---- execution plumbing -----------------------------------------------

	/// Run a closure against a different token range, restoring the previous
	/// range and cursor afterwards. This is the whole call mechanism.
	pub(crate) fn with_tokens<T>(
		&mut self,
		tokens: Rc<[Token]>,
		f: impl FnOnce(&mut Self) -> Result<T, Interrupt>,
	) -> Result<T, Interrupt> {
		let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
		let saved_cursor = std::mem::replace(&mut self.cursor, 0);
		let result = f(self);
		self.tokens = saved_tokens;
		self.cursor = saved_cursor;
		result
	}

	/// Run a closure with side effects suppressed. Used to discover how many
	/// tokens a statement or expression occupies.
	pub(crate) fn neutrally<T>(
		&mut self,
		f: impl FnOnce(&mut Self) -> Result<T, Interrupt>,
	) -> Result<T, Interrupt> {
		self.neutral += 1;
		let result = f(self);
		self.neutral -= 1;
		result
	}

	fn in_child_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
		let saved = self.scope.clone();
		self.scope = Scope::child(&saved);
		let result = f(self);
		self.scope = saved;
		result
	}

	pub(crate) fn eval_tokens(&mut self, tokens: &Rc<[Token]>) -> Result<Value, Interrupt> {
		self.with_tokens(tokens.clone(), |s| s.read_value())
	}

	fn eval_condition(&mut self, tokens: &Rc<[Token]>) -> Result<bool, Interrupt> {
		let value = self.eval_tokens(tokens)?;
		value.as_bool().ok_or_else(|| {
			self.token_fault(FaultKind::TypeMismatch(format!(
				"condition must be a bool, got {}",
				self.describe_type(&value)
			)))
		})
	}

	/// Re-scan and evaluate a source fragment in the current scope.
	pub(crate) fn eval_fragment_text(&mut self, origin: &str, source: &str) -> Result<Value, Interrupt> {
		let doc = Document::new(format!("{origin}#fragment"), source);
		let tokens: Rc<[Token]> = scan(&doc)?.into();
		self.with_tokens(tokens, |s| s.read_value())
	}

	// ---- statements -------------------------------------------------------

	/// Run statements from the cursor to the end of the range, stopping early
	/// when one of them produces non-normal flow.
	pub(crate) fn run_sequence(&mut self) -> Result<Flow, Interrupt> {
		loop {
			let Some(node) = self.read_node()? else { return Ok(Flow::Normal) };
			let flow = self.run_statement(node)?;
			if !matches!(flow, Flow::Normal) {
				return Ok(flow);
			}
		}
	}

	pub(crate) fn run_statement(&mut self, node: Node) -> Result<Flow, Interrupt> {
		// Each statement clears the conditional marker; `if` and `while` set
		// it again. Neutral runs leave it alone entirely.
		let previous = if self.neutral == 0 { self.last_condition.take() } else { self.last_condition };
		match node {
			Node::Empty | Node::Definition => Ok(Flow::Normal),
			Node::Block(body) => self.run_block(&body),
			Node::Var { name, constant, has_init } => self.run_var(name, constant, has_init),
			Node::If(cond) => self.run_if(&cond),
			Node::While(cond) => self.run_while(&cond),
			Node::Else(body) => self.run_else(&body, previous),
			Node::For(lp) => self.run_for(&lp),
			Node::Foreach(lp) => self.run_foreach(&lp),
			Node::Break => self.run_break(),
			Node::Continue => self.run_continue(),
			Node::Return => self.run_return(),
			Node::Throw => self.run_throw(),
			Node::Print => self.run_print(),
			Node::Try(block) => self.run_try(&block),
			Node::Section(body) => self.run_section(&body),
			Node::Express => self.run_express(),
		}
	}

	fn run_block(&mut self, body: &Rc<[Token]>) -> Result<Flow, Interrupt> {
		let body = body.clone();
		self.in_child_scope(|s| s.with_tokens(body, |s| s.run_sequence()))
	}

	/// `if` and `else` bodies are not binding contexts; what they declare
	/// lands in the enclosing scope.
	fn run_inline(&mut self, body: &Rc<[Token]>) -> Result<Flow, Interrupt> {
		self.with_tokens(body.clone(), |s| s.run_sequence())
	}

	fn run_var(&mut self, name: Rc<str>, constant: bool, has_init: bool) -> Result<Flow, Interrupt> {
		let value = if has_init { self.read_value()? } else { Value::Null };
		self.eat_semi();
		if self.neutral == 0 {
			self.scope.declare(Variable::with_flags(name, value, false, constant));
		}
		Ok(Flow::Normal)
	}

	fn run_if(&mut self, cond: &Conditional) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		let met = self.eval_condition(&cond.condition)?;
		// The marker is set after the body so the body's own statements
		// cannot clear it out from under a following `else`.
		let flow = if met { self.run_inline(&cond.body)? } else { Flow::Normal };
		self.last_condition = Some(met);
		Ok(flow)
	}

	fn run_while(&mut self, cond: &Conditional) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		self.frames.push(Frame::Loop { id: cond.attrs.id.clone() });
		// One scope for the whole loop: bindings made in any iteration stay
		// visible to the later ones and die when the loop exits.
		let saved = self.scope.clone();
		self.scope = Scope::child(&saved);
		let counter = self.declare_counter(&cond.attrs);
		let mut met_once = false;
		let result = self.drive_while(cond, counter.as_ref(), &mut met_once);
		self.scope = saved;
		self.frames.pop();
		self.last_condition = Some(met_once);
		result
	}

	fn drive_while(
		&mut self,
		cond: &Conditional,
		counter: Option<&Rc<Variable>>,
		met_once: &mut bool,
	) -> Result<Flow, Interrupt> {
		let mut count = 0.0;
		loop {
			if !self.eval_condition(&cond.condition)? {
				return Ok(Flow::Normal);
			}
			*met_once = true;
			let flow = self.run_loop_body(&cond.body, counter, count)?;
			count += 1.0;
			match flow {
				Flow::Normal => {}
				Flow::Continue(label) if label_hits(&cond.attrs.id, &label) => {}
				Flow::Break(label) if label_hits(&cond.attrs.id, &label) => return Ok(Flow::Normal),
				other => return Ok(other),
			}
		}
	}

	fn declare_counter(&mut self, attrs: &LoopAttrs) -> Option<Rc<Variable>> {
		let name = attrs.counter.clone()?;
		let var = Variable::new(name, Value::Num(0.0));
		self.scope.declare(var.clone());
		Some(var)
	}

	fn run_loop_body(
		&mut self,
		body: &Rc<[Token]>,
		counter: Option<&Rc<Variable>>,
		count: f64,
	) -> Result<Flow, Interrupt> {
		if let Some(var) = counter {
			*var.value.borrow_mut() = Value::Num(count);
		}
		self.with_tokens(body.clone(), |s| s.run_sequence())
	}

	fn run_else(&mut self, body: &Rc<[Token]>, previous: Option<bool>) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		let Some(met) = previous else {
			return Err(self.token_fault(FaultKind::ElseWithoutConditional));
		};
		if met {
			// Skipped, but the chain state survives for a following `else`.
			self.last_condition = Some(met);
			return Ok(Flow::Normal);
		}
		self.run_inline(body)
	}

	fn run_for(&mut self, lp: &ForLoop) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		// The loop scope holds the init bindings and everything the body
		// declares, across all iterations.
		let saved = self.scope.clone();
		self.scope = Scope::child(&saved);
		self.frames.push(Frame::Loop { id: lp.attrs.id.clone() });
		let counter = self.declare_counter(&lp.attrs);
		let result = self.drive_for(lp, counter.as_ref());
		self.frames.pop();
		self.scope = saved;
		result
	}

	fn drive_for(&mut self, lp: &ForLoop, counter: Option<&Rc<Variable>>) -> Result<Flow, Interrupt> {
		if !lp.init.is_empty() {
			let flow = self.with_tokens(lp.init.clone(), |s| s.run_sequence())?;
			if !matches!(flow, Flow::Normal) {
				return Ok(flow);
			}
		}
		let mut count = 0.0;
		loop {
			if !lp.condition.is_empty() && !self.eval_condition(&lp.condition)? {
				return Ok(Flow::Normal);
			}
			let flow = self.run_loop_body(&lp.body, counter, count)?;
			count += 1.0;
			match flow {
				Flow::Normal => {}
				Flow::Continue(label) if label_hits(&lp.attrs.id, &label) => {}
				Flow::Break(label) if label_hits(&lp.attrs.id, &label) => return Ok(Flow::Normal),
				other => return Ok(other),
			}
			// The step runs after normal iterations and after `continue`,
			// never after `break`.
			if !lp.step.is_empty() {
				let flow = self.with_tokens(lp.step.clone(), |s| s.run_sequence())?;
				if !matches!(flow, Flow::Normal) {
					return Ok(flow);
				}
			}
		}
	}

	fn run_foreach(&mut self, lp: &ForeachLoop) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		let source = self.eval_tokens(&lp.source)?;
		let backing = backing_array(&source)
			.ok_or_else(|| self.token_fault(FaultKind::NotAnArray(self.describe_type(&source))))?;
		self.frames.push(Frame::Loop { id: lp.attrs.id.clone() });
		let saved = self.scope.clone();
		self.scope = Scope::child(&saved);
		let bind = Variable::new(lp.bind.clone(), Value::Null);
		self.scope.declare(bind.clone());
		let counter = self.declare_counter(&lp.attrs);
		let result = self.drive_foreach(lp, &backing, &bind, counter.as_ref());
		self.scope = saved;
		self.frames.pop();
		result
	}

	fn drive_foreach(
		&mut self,
		lp: &ForeachLoop,
		backing: &RcCell<Instance>,
		bind: &Rc<Variable>,
		counter: Option<&Rc<Variable>>,
	) -> Result<Flow, Interrupt> {
		let mut index = 0usize;
		let mut count = 0.0;
		loop {
			// Length is rechecked each iteration; the body may grow or
			// shrink the array.
			let item = {
				let borrowed = backing.borrow();
				let items = borrowed
					.array
					.as_ref()
					.ok_or_else(|| Interrupt::internal("backing instance lost its array"))?
					.borrow();
				let Some(item) = items.get(index) else { return Ok(Flow::Normal) };
				item.clone()
			};
			*bind.value.borrow_mut() = item;
			let flow = self.run_loop_body(&lp.body, counter, count)?;
			index += 1;
			count += 1.0;
			match flow {
				Flow::Normal => {}
				Flow::Continue(label) if label_hits(&lp.attrs.id, &label) => {}
				Flow::Break(label) if label_hits(&lp.attrs.id, &label) => return Ok(Flow::Normal),
				other => return Ok(other),
			}
		}
	}

	fn run_break(&mut self) -> Result<Flow, Interrupt> {
		let label = self.read_loop_label();
		self.eat_semi();
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		if !self.has_loop_frame() {
			return Err(self.token_fault(FaultKind::BreakOutsideLoop));
		}
		Ok(Flow::Break(label))
	}

	fn run_continue(&mut self) -> Result<Flow, Interrupt> {
		let label = self.read_loop_label();
		self.eat_semi();
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		if !self.has_loop_frame() {
			return Err(self.token_fault(FaultKind::ContinueOutsideLoop));
		}
		Ok(Flow::Continue(label))
	}

	/// A trailing word is a label only when some enclosing loop carries a
	/// matching id. During a neutral run the enclosing loop's frame is not in
	/// place yet, so a word directly before a terminator is taken instead.
	fn read_loop_label(&mut self) -> Option<Rc<str>> {
		let tok = self.peek_token()?;
		if tok.kind != TokenKind::Word || is_keyword(&tok.text) {
			return None;
		}
		let name = tok.text.clone();
		let hit = if self.neutral > 0 {
			match self.tokens.get(self.cursor + 1) {
				None => true,
				Some(next) => next.is_punct(";"),
			}
		} else {
			self
				.frames
				.iter()
				.rev()
				.take_while(|f| !matches!(f, Frame::Func { .. }))
				.any(|f| matches!(f, Frame::Loop { id: Some(id) } if **id == *name))
		};
		if hit {
			self.cursor += 1;
			Some(name)
		} else {
			None
		}
	}

	fn has_loop_frame(&self) -> bool {
		for frame in self.frames.iter().rev() {
			match frame {
				Frame::Loop { .. } => return true,
				Frame::Func { .. } => return false,
				Frame::Try { .. } => {}
			}
		}
		false
	}

	fn run_return(&mut self) -> Result<Flow, Interrupt> {
		let func = self
			.frames
			.iter()
			.rev()
			.find_map(|f| match f {
				Frame::Func { is_ctor } => Some(*is_ctor),
				_ => None,
			});
		let has_value = match self.peek_token() {
			None => false,
			Some(tok) => !tok.is_punct(";"),
		};
		// Constructors return no value; their product is the instance.
		let value = if has_value && func != Some(true) { Some(self.read_value()?) } else { None };
		self.eat_semi();
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		if func.is_none() {
			return Err(self.token_fault(FaultKind::ReturnOutsideFunction));
		}
		Ok(Flow::Return(value))
	}

	fn run_throw(&mut self) -> Result<Flow, Interrupt> {
		let site = self.throw_site();
		let value = self.read_value()?;
		self.eat_semi();
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		Err(self.throw_value_at(value, site)?)
	}

	/// Validate a thrown value and turn it into the interrupt that unwinds,
	/// tagged with the cursor's current position.
	pub(crate) fn throw_value(&mut self, value: Value) -> Result<Interrupt, Interrupt> {
		let site = self.throw_site();
		self.throw_value_at(value, site)
	}

	fn throw_value_at(&mut self, value: Value, site: (String, usize, usize)) -> Result<Interrupt, Interrupt> {
		let builtins = self.builtins()?.clone();
		match value {
			Value::Instance(instance) if Rc::ptr_eq(&instance.borrow().def, &builtins.exception) => {
				let (origin, line, col) = site;
				Ok(Interrupt::Throw(Thrown { exception: instance, origin, line, col }))
			}
			_ => Err(self.token_fault(FaultKind::ThrowRequiresException)),
		}
	}

	fn throw_site(&self) -> (String, usize, usize) {
		let index = self.cursor.min(self.tokens.len().saturating_sub(1));
		match self.tokens.get(index) {
			Some(tok) => {
				let (line, col) = tok.doc.locate(tok.offset);
				(tok.doc.name.clone(), line, col)
			}
			None => ("ember".into(), 0, 0),
		}
	}

	fn run_print(&mut self) -> Result<Flow, Interrupt> {
		let value = self.read_value()?;
		self.eat_semi();
		if self.neutral == 0 {
			let line = format!("{}\n", self.render(&value)?);
			(self.print)(&line);
		}
		Ok(Flow::Normal)
	}

	fn run_try(&mut self, block: &TryBlock) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		self.frames.push(Frame::Try { catch: block.catch.clone() });
		let result = self.run_block(&block.body);
		self.frames.pop();
		let mut outcome = match result {
			Err(Interrupt::Throw(thrown)) => match &block.catch {
				Some(clause) => self.run_catch(clause, thrown),
				// A bare try swallows.
				None => Ok(Flow::Normal),
			},
			other => other,
		};
		if let Some(finally) = &block.finally {
			match &outcome {
				// An exception still propagating at this point is swallowed
				// before the finally body runs. Faults skip finally entirely.
				Err(Interrupt::Throw(_)) => outcome = Ok(Flow::Normal),
				Err(Interrupt::Fault(_)) => return outcome,
				Ok(_) => {}
			}
			let flow = self.run_block(finally)?;
			if !matches!(flow, Flow::Normal) {
				return Ok(flow);
			}
		}
		outcome
	}

	fn run_catch(&mut self, clause: &CatchClause, thrown: Thrown) -> Result<Flow, Interrupt> {
		let saved = self.scope.clone();
		self.scope = Scope::child(&saved);
		if let Some(bind) = &clause.bind {
			self.scope.declare(Variable::new(bind.clone(), Value::Instance(thrown.exception.clone())));
		}
		let result = self.drive_catch(clause, &thrown);
		self.scope = saved;
		result
	}

	fn drive_catch(&mut self, clause: &CatchClause, thrown: &Thrown) -> Result<Flow, Interrupt> {
		if let Some(guard) = &clause.guard {
			let value = self.eval_tokens(guard)?;
			let pass = value.as_bool().ok_or_else(|| {
				self.token_fault(FaultKind::TypeMismatch("'when' guard must be a bool".into()))
			})?;
			// A failed guard leaves the exception propagating, original
			// throw site intact.
			if !pass {
				return Err(Interrupt::Throw(thrown.clone()));
			}
		}
		self.with_tokens(clause.body.clone(), |s| s.run_sequence())
	}

	/// A section runs its block and, when it throws, hands the exception to
	/// the catch clause of the nearest enclosing try. With no such clause
	/// the exception is absorbed. Either way execution resumes after the
	/// section.
	fn run_section(&mut self, body: &Rc<[Token]>) -> Result<Flow, Interrupt> {
		if self.neutral > 0 {
			return Ok(Flow::Normal);
		}
		match self.run_block(body) {
			Err(Interrupt::Throw(thrown)) => {
				let clause = self
					.frames
					.iter()
					.rev()
					.take_while(|f| !matches!(f, Frame::Func { .. }))
					.find_map(|f| match f {
						Frame::Try { catch: Some(clause) } => Some(clause.clone()),
						_ => None,
					});
				match clause {
					Some(clause) => self.run_catch(&clause, thrown),
					None => Ok(Flow::Normal),
				}
			}
			other => other,
		}
	}

	fn run_express(&mut self) -> Result<Flow, Interrupt> {
		let Some(tok) = self.peek_token().cloned() else {
			return Err(self.token_fault(FaultKind::UnexpectedEnd));
		};
		let chainable = tok.is_word("this") || (tok.kind == TokenKind::Word && !is_keyword(&tok.text));
		if chainable {
			let chained = self.read_chain()?;
			match chained {
				// Statement-level `=` after an assignable chain is
				// assignment; everywhere else `=` compares.
				Chained::Place(place) if self.peek_is_symbol("=") => {
					self.cursor += 1;
					let value = self.read_value()?;
					self.eat_semi();
					self.write_place(&place, value)?;
				}
				other => {
					let first = self.finish_chain(other)?;
					self.read_value_from(Some(first))?;
					self.eat_semi();
				}
			}
			return Ok(Flow::Normal);
		}
		self.read_value()?;
		self.eat_semi();
		Ok(Flow::Normal)
	}

	// ---- calls and construction -------------------------------------------

	pub(crate) fn call_function(
		&mut self,
		func: &Rc<FuncDef>,
		this: Option<RcCell<Instance>>,
		args: Vec<Value>,
	) -> Result<Value, Interrupt> {
		if args.len() != func.params.len() {
			return Err(self.token_fault(FaultKind::WrongArgumentCount {
				name:     func.display_name(),
				expected: func.params.len(),
				got:      args.len(),
			}));
		}
		for (param, value) in func.params.iter().zip(&args) {
			if param.not_null && value.is_null() {
				return Err(self.token_fault(FaultKind::NullArgument(param.name.to_string())));
			}
		}
		let depth = self.frames.iter().filter(|f| matches!(f, Frame::Func { .. })).count();
		if depth >= RECURSION_LIMIT {
			return Err(self.token_fault(FaultKind::RecursionLimit));
		}
		let owner = func.owner();
		// Methods and statics close over the globals, free functions over
		// their caller.
		let scope = match &owner {
			Some(class) => Scope::function(self.globals.clone(), this, Some(class.clone())),
			None => Scope::function(self.scope.clone(), None, None),
		};
		for (param, value) in func.params.iter().zip(args) {
			scope.declare(Variable::new(param.name.clone(), value));
		}
		let saved_scope = std::mem::replace(&mut self.scope, scope);
		let saved_ns = owner
			.as_ref()
			.map(|class| std::mem::replace(&mut self.current_ns, class.namespace.clone()));
		self.frames.push(Frame::Func { is_ctor: func.is_ctor });
		let result = self.with_tokens(func.body.clone(), |s| s.run_sequence());
		self.frames.pop();
		if let Some(ns) = saved_ns {
			self.current_ns = ns;
		}
		self.scope = saved_scope;
		match result? {
			Flow::Return(value) => Ok(value.unwrap_or(Value::Null)),
			Flow::Normal => Ok(Value::Null),
			Flow::Break(_) => Err(self.token_fault(FaultKind::BreakOutsideLoop)),
			Flow::Continue(_) => Err(self.token_fault(FaultKind::ContinueOutsideLoop)),
		}
	}

	pub(crate) fn construct(&mut self, def: &Rc<ClassDef>, args: Vec<Value>) -> Result<Value, Interrupt> {
		let builtins = self.builtins()?.clone();
		// Array has its own construction: empty, or length-filled with null.
		if Rc::ptr_eq(def, &builtins.array) {
			return match args.as_slice() {
				[] => Ok(make_array(&builtins, Vec::new())),
				[len] => {
					let n = len.as_num().ok_or_else(|| {
						self.token_fault(FaultKind::TypeMismatch("Array length must be a number".into()))
					})?;
					if n < 0.0 {
						return Err(self.token_fault(FaultKind::TypeMismatch(
							"Array length must not be negative".into(),
						)));
					}
					Ok(make_array(&builtins, vec![Value::Null; n.floor() as usize]))
				}
				more => Err(self.token_fault(FaultKind::WrongArgumentCount {
					name:     "Array".into(),
					expected: 1,
					got:      more.len(),
				})),
			};
		}
		let mut vars = Vec::with_capacity(def.props.len());
		for prop in &def.props {
			let value = match &prop.default {
				Some(init) => self.eval_in_class_scope(def, init)?,
				None => Value::Null,
			};
			vars.push(Variable::with_flags(prop.name.clone(), value, prop.private, prop.constant));
		}
		let instance = RcCell::new(Instance { def: def.clone(), vars, array: None });
		match def.find_ctor(args.len()) {
			Some(ctor) => {
				if ctor.private && !self.can_access(def, None) {
					return Err(self.token_fault(FaultKind::PrivateAccess("constructor".into())));
				}
				self.call_function(&ctor, Some(instance.clone()), args)?;
			}
			None => {
				if !args.is_empty() {
					return Err(self.token_fault(FaultKind::WrongArgumentCount {
						name:     format!("new {}", def.name),
						expected: 0,
						got:      args.len(),
					}));
				}
			}
		}
		Ok(Value::Instance(instance))
	}

	/// Whether the executing code sits inside the given class, either its
	/// static context or one of its instances.
	pub(crate) fn can_access(&self, def: &Rc<ClassDef>, instance: Option<&RcCell<Instance>>) -> bool {
		let mut scope = Some(self.scope.clone());
		while let Some(s) = scope {
			if let Some(class) = &s.class {
				if Rc::ptr_eq(class, def) {
					return true;
				}
			}
			if let Some(inst) = &s.instance {
				if Rc::ptr_eq(&inst.borrow().def, def) {
					return true;
				}
				if let Some(target) = instance {
					if inst.ptr_eq(target) {
						return true;
					}
				}
			}
			scope = s.parent.clone();
		}
		false
	}

	// ---- name resolution --------------------------------------------------

	/// Unqualified lookup prefers the global namespace, then the current
	/// one, then anything brought in by `using`.
	pub(crate) fn find_class(&self, name: &str, explicit_ns: Option<&str>) -> Option<Rc<ClassDef>> {
		if let Some(ns) = explicit_ns {
			return self
				.classes
				.iter()
				.find(|c| &*c.name == name && c.namespace.as_deref() == Some(ns))
				.cloned();
		}
		self
			.classes
			.iter()
			.find(|c| &*c.name == name && c.namespace.is_none())
			.or_else(|| {
				self.classes.iter().find(|c| {
					&*c.name == name
						&& c.namespace.is_some() && c.namespace.as_deref() == self.current_ns.as_deref()
				})
			})
			.or_else(|| {
				self.classes.iter().find(|c| {
					&*c.name == name
						&& c.namespace.as_ref().is_some_and(|ns| self.usings.iter().any(|u| u == ns))
				})
			})
			.cloned()
	}

	pub(crate) fn find_extern(&self, name: &str) -> Option<Rc<str>> {
		self.externs.iter().find(|(reference, _)| &**reference == name).map(|(_, full)| full.clone())
	}

	/// A bare call may target a method of the enclosing receiver or class.
	pub(crate) fn scope_method(&self, name: &str) -> Option<(Rc<ClassDef>, Option<RcCell<Instance>>)> {
		let mut scope = Some(self.scope.clone());
		while let Some(s) = scope {
			if let Some(instance) = &s.instance {
				let def = instance.borrow().def.clone();
				if def.find_func_named(name).is_some() {
					return Some((def, Some(instance.clone())));
				}
			}
			if let Some(class) = &s.class {
				if class.find_func_named(name).is_some() {
					return Some((class.clone(), None));
				}
			}
			scope = s.parent.clone();
		}
		None
	}

	// ---- host bridge ------------------------------------------------------

	pub(crate) fn construct_extern(&mut self, full: &str, args: Vec<Value>) -> Result<Value, Interrupt> {
		let host_args = self.to_host_args(&args)?;
		match self.bridge.clone().construct(full, &host_args) {
			Ok(result) => self.from_host(result),
			Err(message) => self.host_throw(message),
		}
	}

	pub(crate) fn invoke_extern(
		&mut self,
		type_name: &str,
		target: Option<&HostObject>,
		member: &str,
		args: Vec<Value>,
	) -> Result<Value, Interrupt> {
		if self.neutral > 0 {
			return Ok(Value::Null);
		}
		let host_args = self.to_host_args(&args)?;
		let member = upcase_first(member);
		match self.bridge.clone().invoke(type_name, target, &member, &host_args) {
			Ok(result) => self.from_host(result),
			Err(message) => self.host_throw(message),
		}
	}

	/// An ExternValue wrapper routes its member calls to the boxed payload.
	pub(crate) fn call_extern_instance(
		&mut self,
		instance: &RcCell<Instance>,
		member: &Rc<str>,
	) -> Result<Chained, Interrupt> {
		let args = self.read_args()?;
		if self.neutral > 0 {
			return Ok(Chained::Value(Value::Null));
		}
		let boxed = instance.borrow().find("value").map(|var| var.value.borrow().clone());
		let Some(Value::Boxed(host)) = boxed else {
			return Err(self.token_fault(FaultKind::TypeMismatch("extern value lost its payload".into())));
		};
		let type_name = host.type_name.clone();
		self.invoke_extern(&type_name, Some(&host), member, args).map(Chained::Value)
	}

	fn to_host_args(&mut self, args: &[Value]) -> Result<Vec<HostArg>, Interrupt> {
		args.iter().map(|value| self.to_host(value)).collect()
	}

	fn to_host(&mut self, value: &Value) -> Result<HostArg, Interrupt> {
		let builtins = self.builtins()?.clone();
		if let Some(text) = string_text(&builtins, value) {
			return Ok(HostArg::Str(text));
		}
		match value {
			Value::Null => Ok(HostArg::Null),
			Value::Num(n) => Ok(HostArg::Num(*n)),
			Value::Bool(b) => Ok(HostArg::Bool(*b)),
			Value::Char(c) => Ok(HostArg::Char(*c)),
			Value::Boxed(host) => Ok(HostArg::Boxed(host.clone())),
			Value::Instance(instance) => {
				if Rc::ptr_eq(&instance.borrow().def, &builtins.extern_value) {
					let inner = instance.borrow().find("value").map(|var| var.value.borrow().clone());
					if let Some(Value::Boxed(host)) = inner {
						return Ok(HostArg::Boxed(host));
					}
				}
				let items = {
					let borrowed = instance.borrow();
					borrowed.array.as_ref().map(|items| items.borrow().clone())
				};
				match items {
					Some(items) => {
						let mut converted = Vec::with_capacity(items.len());
						for item in &items {
							converted.push(self.to_host(item)?);
						}
						Ok(HostArg::Array(converted))
					}
					None => Err(self.token_fault(FaultKind::TypeMismatch(format!(
						"cannot pass {} across the host bridge",
						self.describe_type(value)
					)))),
				}
			}
			Value::Func(_) | Value::Class(_) => Err(self.token_fault(FaultKind::TypeMismatch(format!(
				"cannot pass {} across the host bridge",
				self.describe_type(value)
			)))),
		}
	}

	fn from_host(&mut self, arg: HostArg) -> Result<Value, Interrupt> {
		let builtins = self.builtins()?.clone();
		Ok(match arg {
			HostArg::Null => Value::Null,
			HostArg::Num(n) => Value::Num(n),
			HostArg::Bool(b) => Value::Bool(b),
			HostArg::Char(c) => Value::Char(c),
			HostArg::Str(text) => make_string(&builtins, &text),
			HostArg::Array(items) => {
				let mut values = Vec::with_capacity(items.len());
				for item in items {
					values.push(self.from_host(item)?);
				}
				make_array(&builtins, values)
			}
			HostArg::Boxed(host) => make_builtin_instance(&builtins.extern_value, vec![
				make_string(&builtins, &host.type_name),
				Value::Boxed(host),
			]),
		})
	}

	/// A host error surfaces as a catchable script Exception raised at the
	/// call site.
	fn host_throw(&mut self, message: String) -> Result<Value, Interrupt> {
		let exception = self.make_exception(&message)?;
		let (origin, line, col) = self.throw_site();
		Err(Interrupt::Throw(Thrown { exception, origin, line, col }))
	}

	pub(crate) fn make_exception(&mut self, message: &str) -> Result<RcCell<Instance>, Interrupt> {
		let builtins = self.builtins()?.clone();
		let value = make_builtin_instance(&builtins.exception, vec![make_string(&builtins, message)]);
		match value {
			Value::Instance(instance) => Ok(instance),
			_ => Err(Interrupt::internal("exception construction produced a non-instance")),
		}
	}

	/// Terminal conversion for the embedding layer: an uncaught throw
	/// becomes a fault carrying the exception's message and throw site.
	pub(crate) fn interrupt_to_fault(&mut self, interrupt: Interrupt) -> Fault {
		match interrupt {
			Interrupt::Fault(fault) => fault,
			Interrupt::Throw(thrown) => {
				let value = thrown
					.exception
					.borrow()
					.find("message")
					.map(|var| var.value.borrow().clone())
					.unwrap_or(Value::Null);
				let message = match self.render(&value) {
					Ok(text) => text,
					Err(_) => value.to_string(),
				};
				Fault::new(thrown.origin, thrown.line, thrown.col, FaultKind::UncaughtException(message))
			}
		}
	}
}

fn label_hits(attr_id: &Option<Rc<str>>, label: &Option<Rc<str>>) -> bool {
	match label {
		None => true,
		Some(label) => attr_id.as_deref() == Some(&**label),
	}
}

fn upcase_first(name: &str) -> String {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
		None => String::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn interp() -> Interpreter { Interpreter::new(Box::new(|_| {}), Rc::new(bridge::NoBridge)).unwrap() }

	#[test]
	fn prelude_defines_builtins() {
		let interp = interp();
		let builtins = interp.builtins.as_ref().unwrap();
		assert_eq!(&*builtins.exception.name, "Exception");
		assert_eq!(builtins.string.basearray_index(), Some(0));
		assert!(builtins.exception.find_ctor(1).is_some());
	}

	#[test]
	fn load_registers_definitions() {
		let mut interp = interp();
		let doc = Document::new("test", "class Point(x, y) { }\nfunc origin() { return new Point(); }\n");
		interp.load(&doc).unwrap();
		assert!(interp.find_class("Point", None).is_some());
		assert!(interp.globals.get("origin").is_some());
	}

	#[test]
	fn namespace_directive_must_lead() {
		let mut interp = interp();
		let doc = Document::new("test", "var x = 1;\nnamespace late:\n");
		let err = interp.load(&doc);
		assert!(matches!(
			err,
			Err(Interrupt::Fault(f)) if matches!(f.kind(), FaultKind::MisplacedDirective(_))
		));
	}

	#[test]
	fn label_matching() {
		let outer: Option<Rc<str>> = Some("outer".into());
		assert!(label_hits(&outer, &None));
		assert!(label_hits(&outer, &outer.clone()));
		assert!(!label_hits(&None, &outer));
	}

	#[test]
	fn upcases_member_names() {
		assert_eq!(upcase_first("toString"), "ToString");
		assert_eq!(upcase_first(""), "");
	}
}
