//! A script source together with its name, used for error locations and for
//! the leading `#include` directives a host may want to inspect.

use std::rc::Rc;

/// One unit of script source. Tokens keep a handle back to their document so
/// any token can be turned into a `name line:col` position later.
#[derive(Debug)]
pub struct Document {
	/// Display name, usually the file name or "repl".
	pub name:     String,
	/// The source text with `#include` directives blanked out.
	pub text:     String,
	/// Names collected from leading `#include <name>` lines. Resolution is
	/// left to the host.
	pub includes: Vec<String>,
}

impl Document {
	pub fn new(name: impl Into<String>, source: &str) -> Rc<Self> {
		let (text, includes) = strip_includes(source);
		Rc::new(Self { name: name.into(), text, includes })
	}

	/// 1-based line and column of a byte offset into the text.
	pub fn locate(&self, offset: usize) -> (usize, usize) {
		let offset = offset.min(self.text.len());
		let before = &self.text[..offset];
		let line = before.matches('\n').count() + 1;
		let col = offset - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
		(line, col)
	}
}

/// Blank out leading `#include <name>` lines, keeping byte offsets intact so
/// token positions still line up with the original source.
fn strip_includes(source: &str) -> (String, Vec<String>) {
	let mut text = String::with_capacity(source.len());
	let mut includes = Vec::new();
	let mut heading = true;
	for line in source.split_inclusive('\n') {
		let trimmed = line.trim();
		if heading && trimmed.is_empty() {
			text.push_str(line);
			continue;
		}
		if heading && trimmed.starts_with("#include") {
			let rest = trimmed["#include".len()..].trim();
			let name = rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')).unwrap_or(rest);
			if !name.is_empty() {
				includes.push(name.to_string());
			}
			// Same byte length, all blanks.
			for c in line.chars() {
				text.push(if c == '\n' { '\n' } else { ' ' });
			}
			continue;
		}
		heading = false;
		text.push_str(line);
	}
	(text, includes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn locate_positions() {
		let doc = Document::new("t", "ab\ncd");
		assert_eq!(doc.locate(0), (1, 1));
		assert_eq!(doc.locate(1), (1, 2));
		assert_eq!(doc.locate(3), (2, 1));
		assert_eq!(doc.locate(4), (2, 2));
	}

	#[test]
	fn includes_are_stripped() {
		let doc = Document::new("t", "#include <math>\n#include <io>\nprint 1;");
		assert_eq!(doc.includes, vec!["math", "io"]);
		assert_eq!(doc.text.len(), "#include <math>\n#include <io>\nprint 1;".len());
		assert!(doc.text.starts_with("               \n"));
		assert!(doc.text.ends_with("print 1;"));
	}

	#[test]
	fn includes_only_lead() {
		let doc = Document::new("t", "print 1;\n#include <math>");
		assert!(doc.includes.is_empty());
		assert!(doc.text.contains("#include"));
	}
}
