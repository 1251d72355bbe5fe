//! Character-level scanner.
//!
//! The scanner only splits the source into raw, category-tagged lexemes. It
//! never decides what a token MEANS: `while` comes out as a plain word and
//! `::` as punctuation, and the statement materializer attaches meaning when
//! a statement is actually executed. The one structural job done here is
//! tracking brace depth inside `$"..."` strings so an interpolation hole can
//! itself contain strings and braces.

mod token;

use std::{iter::Peekable, rc::Rc, str::CharIndices};

use TokenKind::*;
pub(crate) use token::*;

use crate::{
	document::Document,
	error::{Fault, FaultKind},
};

/// Scan one document into its token array. Ignored categories (whitespace
/// and comments) are dropped before storage.
pub(crate) fn scan(doc: &Rc<Document>) -> Result<Vec<Token>, Fault> { Scanner::new(doc).scan_tokens() }

struct Scanner<'a> {
	doc:         &'a Rc<Document>,
	source:      &'a str,
	source_iter: Peekable<CharIndices<'a>>,
	/// Points at the beginning of the current lexeme
	start:       usize,
	/// Points past the character currently being considered
	cursor:      usize,
}

impl<'a> Scanner<'a> {
	fn new(doc: &'a Rc<Document>) -> Self {
		let source = doc.text.as_str();
		Self { doc, source, source_iter: source.char_indices().peekable(), start: 0, cursor: 0 }
	}

	fn scan_tokens(&mut self) -> Result<Vec<Token>, Fault> {
		let mut tokens = Vec::new();
		while let Some(&(index, _)) = self.source_iter.peek() {
			self.start = index;
			self.cursor = index;
			let kind = self.scan_token()?;
			if kind.is_ignored() {
				continue;
			}
			// String-like tokens store the inner content only.
			let text = match kind {
				Str | Char => &self.source[self.start + 1..self.cursor - 1],
				VerbatimStr | FormatStr => &self.source[self.start + 2..self.cursor - 1],
				_ => &self.source[self.start..self.cursor],
			};
			tokens.push(Token::new(kind, text, self.start, self.doc.clone()));
		}
		Ok(tokens)
	}

	fn scan_token(&mut self) -> Result<TokenKind, Fault> {
		let next_char = self.advance().ok_or_else(|| self.fault(FaultKind::UnexpectedEnd))?;
		let kind = match next_char {
			' ' | '\t' | '\r' | '\n' => Space,
			'(' | ')' | '{' | '}' | '[' | ']' => Brace,
			'.' | ',' | ';' => Punct,
			':' => {
				if self.peek() == Some(':') {
					self.advance();
				}
				Punct
			}
			'"' => self.string()?,
			'\'' => self.char_literal()?,
			'@' if self.peek() == Some('"') => {
				self.advance();
				self.verbatim_string()?
			}
			'$' if self.peek() == Some('"') => {
				self.advance();
				self.format_string()?
			}
			'/' => self.slash()?,
			'-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number('-')?,
			c if c.is_ascii_digit() => self.number(c)?,
			c if c.is_ascii_alphabetic() || c == '_' => self.word(),
			'+' | '-' | '*' | '%' | '=' | '!' | '<' | '>' | '?' | '&' | '|' | '^' | '~' => {
				self.symbol(next_char)
			}
			c => return Err(self.fault(FaultKind::UnexpectedCharacter(c))),
		};
		Ok(kind)
	}

	fn advance(&mut self) -> Option<char> {
		let (i, c) = self.source_iter.next()?;
		self.cursor = i + c.len_utf8();
		Some(c)
	}

	fn peek(&mut self) -> Option<char> { self.source_iter.peek().map(|&(_, c)| c) }

	fn peek_second(&mut self) -> Option<char> {
		let mut it = self.source_iter.clone();
		it.next()?;
		it.peek().map(|&(_, c)| c)
	}

	fn fault(&self, kind: FaultKind) -> Fault {
		let (line, col) = self.doc.locate(self.start);
		Fault::new(self.doc.name.clone(), line, col, kind)
	}

	/// `//` and `/* */` comments, otherwise a lone `/` operator.
	fn slash(&mut self) -> Result<TokenKind, Fault> {
		if self.peek() == Some('/') {
			while self.peek().is_some_and(|c| c != '\n') {
				self.advance();
			}
			return Ok(LineComment);
		}
		if self.peek() == Some('*') {
			self.advance();
			loop {
				match self.advance() {
					Some('*') if self.peek() == Some('/') => {
						self.advance();
						return Ok(BlockComment);
					}
					Some(_) => {}
					None => return Err(self.fault(FaultKind::UnterminatedBlockComment)),
				}
			}
		}
		Ok(Symbol)
	}

	/// A symbol run extends only while the text stays a valid operator.
	fn symbol(&mut self, first: char) -> TokenKind {
		if let Some(second) = self.peek() {
			let two = matches!(
				(first, second),
				('+', '+')
					| ('-', '-') | ('>', '=')
					| ('<', '=') | ('+', '=')
					| ('-', '=') | ('!', '=')
					| ('?', '?')
			);
			if two {
				self.advance();
			}
		}
		Symbol
	}

	fn word(&mut self) -> TokenKind {
		while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
			self.advance();
		}
		Word
	}

	/// Decimal with one fractional dot, `0x` hex, and consumed (but never
	/// distinguished) width suffixes.
	fn number(&mut self, first: char) -> Result<TokenKind, Fault> {
		let lead = if first == '-' {
			self.advance().ok_or_else(|| self.fault(FaultKind::UnexpectedEnd))?
		} else {
			first
		};
		if lead == '0' && matches!(self.peek(), Some('x' | 'X')) {
			self.advance();
			while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
				self.advance();
			}
			while matches!(self.peek(), Some('u' | 'U' | 'l' | 'L')) {
				self.advance();
			}
			return Ok(Number);
		}
		while self.peek().is_some_and(|c| c.is_ascii_digit()) {
			self.advance();
		}
		if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
			self.advance();
			while self.peek().is_some_and(|c| c.is_ascii_digit()) {
				self.advance();
			}
		}
		while matches!(self.peek(), Some('F' | 'f' | 'D' | 'd' | 'M' | 'm' | 'u' | 'U' | 'l' | 'L')) {
			self.advance();
		}
		Ok(Number)
	}

	/// Plain string, ends at the first non-escaped quote. A newline before
	/// the closing quote is an error.
	fn string(&mut self) -> Result<TokenKind, Fault> {
		loop {
			match self.advance() {
				Some('"') => return Ok(Str),
				Some('\\') => {
					self.advance().ok_or_else(|| self.fault(FaultKind::UnterminatedString))?;
				}
				Some('\n') | None => return Err(self.fault(FaultKind::UnterminatedString)),
				Some(_) => {}
			}
		}
	}

	fn char_literal(&mut self) -> Result<TokenKind, Fault> {
		loop {
			match self.advance() {
				Some('\'') => return Ok(Char),
				Some('\\') => {
					self.advance().ok_or_else(|| self.fault(FaultKind::UnterminatedChar))?;
				}
				Some('\n') | None => return Err(self.fault(FaultKind::UnterminatedChar)),
				Some(_) => {}
			}
		}
	}

	/// `@"..."` runs to the next quote with no escape processing at all.
	fn verbatim_string(&mut self) -> Result<TokenKind, Fault> {
		loop {
			match self.advance() {
				Some('"') => return Ok(VerbatimStr),
				Some(_) => {}
				None => return Err(self.fault(FaultKind::UnterminatedString)),
			}
		}
	}

	/// `$"..."` ends at a quote only at interpolation depth zero. Inside a
	/// hole, nested string and char literals are skipped whole so their
	/// quotes and braces cannot confuse the depth count.
	fn format_string(&mut self) -> Result<TokenKind, Fault> {
		let mut depth = 0usize;
		loop {
			match self.advance() {
				Some('"') if depth == 0 => return Ok(FormatStr),
				Some('\\') if depth == 0 => {
					self.advance().ok_or_else(|| self.fault(FaultKind::UnterminatedString))?;
				}
				Some('{') => depth += 1,
				Some('}') if depth > 0 => depth -= 1,
				Some(q @ ('"' | '\'')) => self.skip_nested_literal(q)?,
				Some(_) => {}
				None => return Err(self.fault(FaultKind::UnterminatedString)),
			}
		}
	}

	fn skip_nested_literal(&mut self, quote: char) -> Result<(), Fault> {
		loop {
			match self.advance() {
				Some('\\') => {
					self.advance().ok_or_else(|| self.fault(FaultKind::UnterminatedString))?;
				}
				Some(c) if c == quote => return Ok(()),
				Some(_) => {}
				None => return Err(self.fault(FaultKind::UnterminatedString)),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scan_src(input: &str) -> Result<Vec<Token>, Fault> { scan(&Document::new("test", input)) }

	fn check(input: &str, ok: bool) { assert_eq!(scan_src(input).is_ok(), ok, "input: {input}"); }

	fn kinds(input: &str) -> Vec<TokenKind> {
		scan_src(input).unwrap().iter().map(|t| t.kind).collect()
	}

	fn texts(input: &str) -> Vec<String> {
		scan_src(input).unwrap().iter().map(|t| t.text.to_string()).collect()
	}

	#[test]
	fn scan_tokens() {
		check("", true);
		check("(", true);
		check("(){}[]", true);
		check(" ( ) ", true);
		check("#", false);
		check(r#""hi""#, true);
		check("12345", true);
		check("// comment", true);
		check("/* multi\nline */", true);
		check("/* unterminated", false);
		check("\"unterminated", false);
		check("\"newline\nin string\"", false);
		check("'x'", true);
		check("'unterminated", false);
	}

	#[test]
	fn scan_symbols() {
		assert_eq!(texts("++ -- >= <= += -= != ??"), vec!["++", "--", ">=", "<=", "+=", "-=", "!=", "??"]);
		// `==` is not a single operator, equality is spelled `=`.
		assert_eq!(texts("=="), vec!["=", "="]);
		assert_eq!(texts("a::b"), vec!["a", "::", "b"]);
	}

	#[test]
	fn scan_numbers() {
		assert_eq!(kinds("0 42 3.14 -7 0x1F 10uL 2.5F"), vec![Number; 7]);
		// A minus directly before a digit is part of the number.
		assert_eq!(texts("-7"), vec!["-7"]);
		assert_eq!(texts("a -7"), vec!["a", "-7"]);
		assert_eq!(texts("a - 7"), vec!["a", "-", "7"]);
		// `1.` does not start a fraction without a following digit.
		assert_eq!(texts("1."), vec!["1", "."]);
	}

	#[test]
	fn scan_strings() {
		assert_eq!(texts(r#""hello""#), vec!["hello"]);
		assert_eq!(texts(r#""esc \" quote""#), vec![r#"esc \" quote"#]);
		assert_eq!(kinds(r#"@"no \ escapes""#), vec![VerbatimStr]);
		assert_eq!(texts(r#"@"c:\tmp""#), vec![r"c:\tmp"]);
	}

	#[test]
	fn scan_format_strings() {
		assert_eq!(kinds(r#"$"a{1 + 2}b""#), vec![FormatStr]);
		assert_eq!(texts(r#"$"a{1 + 2}b""#), vec!["a{1 + 2}b"]);
		// Holes may hold strings with braces and quotes.
		assert_eq!(kinds(r#"$"x{f("}")}y""#), vec![FormatStr]);
		check(r#"$"never closed{1}"#, false);
	}

	#[test]
	fn scan_words_are_not_classified() {
		assert_eq!(kinds("while this class foo"), vec![Word; 4]);
		assert!(is_keyword("while"));
		assert!(!is_keyword("foo"));
	}

	#[test]
	fn scan_offsets() {
		let tokens = scan_src("ab\ncd").unwrap();
		assert_eq!(tokens[0].offset, 0);
		assert_eq!(tokens[1].offset, 3);
		assert_eq!(tokens[1].doc.locate(tokens[1].offset), (2, 1));
	}
}
