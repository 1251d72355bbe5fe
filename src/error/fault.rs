/// A fatal script error with a source location.
///
/// Faults abort the run immediately. They are distinct from script
/// exceptions, which travel through `try`/`catch` and only become a fault
/// when they reach the top of the program uncaught.
#[derive(thiserror::Error, Debug)]
#[error("{origin} {line}:{col}: {kind}")]
pub struct Fault {
	/// Name of the document the failing token belongs to.
	origin: String,
	/// 1-based line of the failing token, 0 when unknown.
	line:   usize,
	/// 1-based column of the failing token, 0 when unknown.
	col:    usize,
	/// The kind of fault.
	kind:   FaultKind,
}

impl Fault {
	pub fn new(origin: impl Into<String>, line: usize, col: usize, kind: FaultKind) -> Self {
		Self { origin: origin.into(), line, col, kind }
	}

	/// A fault with no source position, for errors raised outside any token.
	pub fn bare(origin: impl Into<String>, kind: FaultKind) -> Self { Self::new(origin, 0, 0, kind) }

	/// An interpreter bug surfaced as a fault.
	pub fn internal(message: impl Into<String>) -> Self {
		Self::bare("ember", FaultKind::Internal(message.into()))
	}

	pub fn kind(&self) -> &FaultKind { &self.kind }
}

/// Types of fatal script errors.
#[derive(Debug)]
pub enum FaultKind {
	/// Interpreter invariant broken, should never happen.
	Internal(String),
	/// Character the scanner has no category for.
	UnexpectedCharacter(char),
	/// String literal not closed before newline or end of input.
	UnterminatedString,
	/// Char literal not closed before newline or end of input.
	UnterminatedChar,
	/// Block comment not closed before end of input.
	UnterminatedBlockComment,
	/// Bracket pair not closed before end of input.
	UnterminatedBrace(String),
	/// Token stream ended where more input was required.
	UnexpectedEnd,
	/// Token that cannot start or continue the current construct.
	UnexpectedToken(String),
	/// A specific token was required and something else was found.
	ExpectedToken(String),
	/// Name that resolves to nothing in the scope chain.
	UnknownIdentifier(String),
	/// Class name that resolves to no visible class.
	UnknownClass(String),
	/// Member name absent from the target class.
	UnknownMember(String),
	/// Type name used with `is` that is neither builtin nor a class.
	UnknownType(String),
	/// Two classes registered under the same name and namespace.
	DuplicateClass(String),
	/// Loop attribute given twice in one attribute clause.
	DuplicateAttribute(String),
	/// Enum entry assigned an already claimed value.
	DuplicateEnumValue(String),
	/// Assignment to a const variable that already holds a value.
	ConstReassigned(String),
	/// Private member accessed from outside its class.
	PrivateAccess(String),
	/// Operand types the operation does not accept.
	TypeMismatch(String),
	/// Division or remainder by zero.
	DivisionByZero,
	/// `break` with no enclosing loop.
	BreakOutsideLoop,
	/// `continue` with no enclosing loop.
	ContinueOutsideLoop,
	/// `return` with no enclosing function.
	ReturnOutsideFunction,
	/// `else` not preceded by an `if` or `while`.
	ElseWithoutConditional,
	/// `throw` of a value that is not an Exception instance.
	ThrowRequiresException,
	/// Exception that reached the top of the program.
	UncaughtException(String),
	/// Call with an arity no overload accepts.
	WrongArgumentCount { name: String, expected: usize, got: usize },
	/// Null passed for a parameter marked `notnull`.
	NullArgument(String),
	/// Array index outside the backing array.
	IndexOutOfRange { index: usize, len: usize },
	/// Value with no backing array where one is required.
	NotAnArray(String),
	/// Member access on a null value.
	NullAccess(String),
	/// `constructor` outside a class body.
	ConstructorOutsideClass,
	/// Second `namespace` declaration in one document.
	NamespaceRedeclared,
	/// Directive after the document's first executable code.
	MisplacedDirective(String),
	/// Extern reference the host bridge does not recognize.
	ExternUnresolved(String),
	/// Numeric literal that does not parse.
	InvalidNumber(String),
	/// Char literal that is empty or holds more than one character.
	InvalidCharLiteral(String),
	/// Call nesting exceeded the interpreter limit.
	RecursionLimit,
}

impl std::fmt::Display for FaultKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use FaultKind::*;
		match self {
			Internal(m) => write!(f, "internal error: {m}"),
			UnexpectedCharacter(c) => write!(f, "Unexpected character '{c}'"),
			UnterminatedString => write!(f, "Unterminated string"),
			UnterminatedChar => write!(f, "Unterminated char literal"),
			UnterminatedBlockComment => write!(f, "Unterminated block comment"),
			UnterminatedBrace(b) => write!(f, "Missing closing '{b}'"),
			UnexpectedEnd => write!(f, "Unexpected end of input"),
			UnexpectedToken(t) => write!(f, "Unexpected token '{t}'"),
			ExpectedToken(t) => write!(f, "Expected '{t}'"),
			UnknownIdentifier(n) => write!(f, "Unknown identifier '{n}'"),
			UnknownClass(n) => write!(f, "Unknown class '{n}'"),
			UnknownMember(n) => write!(f, "Unknown member '{n}'"),
			UnknownType(n) => write!(f, "Unknown type '{n}'"),
			DuplicateClass(n) => write!(f, "Class '{n}' is already defined"),
			DuplicateAttribute(a) => write!(f, "Duplicate loop attribute '{a}'"),
			DuplicateEnumValue(n) => write!(f, "Enum value for '{n}' is already claimed"),
			ConstReassigned(n) => write!(f, "Cannot reassign const '{n}'"),
			PrivateAccess(n) => write!(f, "'{n}' is private"),
			TypeMismatch(m) => write!(f, "{m}"),
			DivisionByZero => write!(f, "Division by zero"),
			BreakOutsideLoop => write!(f, "'break' outside of a loop"),
			ContinueOutsideLoop => write!(f, "'continue' outside of a loop"),
			ReturnOutsideFunction => write!(f, "'return' outside of a function"),
			ElseWithoutConditional => write!(f, "'else' without a matching 'if' or 'while'"),
			ThrowRequiresException => write!(f, "Only Exception instances can be thrown"),
			UncaughtException(m) => write!(f, "Uncaught exception: {m}"),
			WrongArgumentCount { name, expected, got } => {
				write!(f, "'{name}' expects {expected} argument(s), got {got}")
			}
			NullArgument(p) => write!(f, "Argument '{p}' is marked notnull but received null"),
			IndexOutOfRange { index, len } => {
				write!(f, "Index {index} out of range for array of length {len}")
			}
			NotAnArray(t) => write!(f, "Value of type {t} has no backing array"),
			NullAccess(n) => write!(f, "Cannot access '{n}' on null"),
			ConstructorOutsideClass => write!(f, "'constructor' outside of a class"),
			NamespaceRedeclared => write!(f, "Namespace is already declared for this document"),
			MisplacedDirective(d) => write!(f, "'{d}' must appear before any other code"),
			ExternUnresolved(n) => write!(f, "Host type '{n}' could not be resolved"),
			InvalidNumber(t) => write!(f, "Invalid number literal '{t}'"),
			InvalidCharLiteral(t) => write!(f, "Invalid char literal '{t}'"),
			RecursionLimit => write!(f, "Call nesting too deep"),
		}
	}
}
