use std::rc::Rc;

use crate::document::Document;

/// A token produced by the scanner.
///
/// Keywords are deliberately NOT classified here. The language only decides
/// whether a word is a keyword at the moment a statement is materialized, so
/// the scanner hands every word over as [`TokenKind::Word`] and the parser
/// asks [`is_keyword`] when it needs to know.
#[derive(Debug, Clone)]
pub(crate) struct Token {
	pub kind:   TokenKind,
	/// For string-like tokens this is the inner content with the quotes
	/// stripped, for everything else the raw lexeme.
	pub text:   Rc<str>,
	/// Byte offset of the lexeme start in the owning document.
	pub offset: usize,
	pub doc:    Rc<Document>,
}

impl Token {
	pub fn new(kind: TokenKind, text: &str, offset: usize, doc: Rc<Document>) -> Self {
		Self { kind, text: text.into(), offset, doc }
	}

	pub fn is_word(&self, word: &str) -> bool { self.kind == TokenKind::Word && &*self.text == word }

	pub fn is_symbol(&self, symbol: &str) -> bool {
		self.kind == TokenKind::Symbol && &*self.text == symbol
	}

	pub fn is_punct(&self, punct: &str) -> bool { self.kind == TokenKind::Punct && &*self.text == punct }

	pub fn is_brace(&self, brace: &str) -> bool { self.kind == TokenKind::Brace && &*self.text == brace }
}

/// The raw token categories. One category per continuation rule in the
/// scanner, nothing finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
	/// Whitespace run, dropped before storage.
	Space,
	/// `// ...`, dropped before storage.
	LineComment,
	/// `/* ... */`, dropped before storage.
	BlockComment,
	/// Identifier or keyword.
	Word,
	/// Numeric literal, including a leading `-`, `0x` hex and width suffixes.
	Number,
	/// `"..."` with escapes.
	Str,
	/// `@"..."`, no escape processing.
	VerbatimStr,
	/// `$"..."` with `{expression}` holes.
	FormatStr,
	/// `'x'`.
	Char,
	/// Operator run such as `+`, `??` or `>=`.
	Symbol,
	/// `.` `,` `;` `:` `::`.
	Punct,
	/// `(` `)` `{` `}` `[` `]`.
	Brace,
}

impl TokenKind {
	pub fn is_ignored(&self) -> bool {
		matches!(self, TokenKind::Space | TokenKind::LineComment | TokenKind::BlockComment)
	}
}

/// Reserved words that can never be used as identifiers.
pub(crate) fn is_keyword(word: &str) -> bool {
	matches!(
		word,
		"var"
			| "const" | "if"
			| "else" | "while"
			| "for" | "foreach"
			| "in" | "break"
			| "continue" | "return"
			| "func" | "constructor"
			| "class" | "enum"
			| "static" | "private"
			| "namespace" | "using"
			| "extern" | "new"
			| "is" | "not"
			| "notnull" | "basearray"
			| "this" | "null"
			| "true" | "false"
			| "try" | "catch"
			| "finally" | "section"
			| "when" | "throw"
			| "print" | "lenof"
			| "typeof"
	)
}
