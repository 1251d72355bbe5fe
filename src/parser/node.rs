use std::rc::Rc;

use crate::scanner::Token;

/// A materialized statement head.
///
/// Materialization is shallow on purpose: a node records what the statement
/// IS plus the token ranges its compound parts occupy, and everything inside
/// those ranges is parsed again each time it runs. Simple statements carry no
/// payload at all, their operands are read straight off the cursor by the
/// executor.
#[derive(Debug)]
pub(crate) enum Node {
	/// A bare `;`.
	Empty,
	/// `{ ... }` with its own scope.
	Block(Rc<[Token]>),
	/// `var`/`const` declaration, the initializer sits at the cursor.
	Var { name: Rc<str>, constant: bool, has_init: bool },
	If(Rc<Conditional>),
	While(Rc<Conditional>),
	/// Runs only when the previous conditional's test was never true.
	Else(Rc<[Token]>),
	For(Rc<ForLoop>),
	Foreach(Rc<ForeachLoop>),
	Break,
	Continue,
	Return,
	Throw,
	Print,
	Try(Rc<TryBlock>),
	Section(Rc<[Token]>),
	/// A definition already handled at load time, a no-op when executed.
	Definition,
	/// Assignment, call or other expression statement at the cursor.
	Express,
}

/// `: id <name>, counter <name>` after a loop header.
#[derive(Debug, Default)]
pub(crate) struct LoopAttrs {
	pub id:      Option<Rc<str>>,
	pub counter: Option<Rc<str>>,
}

/// `if` and `while` share one shape: a condition range and a body range.
#[derive(Debug)]
pub(crate) struct Conditional {
	pub condition: Rc<[Token]>,
	pub body:      Rc<[Token]>,
	pub attrs:     LoopAttrs,
}

#[derive(Debug)]
pub(crate) struct ForLoop {
	/// Statements run once when the loop is entered.
	pub init:      Rc<[Token]>,
	/// Empty means always true.
	pub condition: Rc<[Token]>,
	/// Runs after every iteration, including one ended by `continue`.
	pub step:      Rc<[Token]>,
	pub body:      Rc<[Token]>,
	pub attrs:     LoopAttrs,
}

#[derive(Debug)]
pub(crate) struct ForeachLoop {
	pub bind:   Rc<str>,
	/// Evaluated once when the loop is entered.
	pub source: Rc<[Token]>,
	pub body:   Rc<[Token]>,
	pub attrs:  LoopAttrs,
}

#[derive(Debug)]
pub(crate) struct TryBlock {
	pub body:    Rc<[Token]>,
	pub catch:   Option<Rc<CatchClause>>,
	pub finally: Option<Rc<[Token]>>,
}

#[derive(Debug)]
pub(crate) struct CatchClause {
	/// Name the exception binds to in the catch scope.
	pub bind:  Option<Rc<str>>,
	/// `when` guard, evaluated with the exception bound. A false guard
	/// leaves the exception propagating.
	pub guard: Option<Rc<[Token]>>,
	pub body:  Rc<[Token]>,
}
