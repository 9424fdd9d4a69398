//! Compiled JSON queries for interceptor transforms.
//!
//! A small jq-like subset: field paths (`.a.b`), object construction
//! (`{text: .t, who: .u}`), literals, and `select(expr == expr)` filters.
//! Queries are compiled once at engine start and evaluated per message.
//! A `select` that does not match emits nothing, which drops the message.

use serde_json::Value;

use crate::error::{Error, NhResult};

/// Maximum nesting depth to keep hostile expressions bounded.
const MAX_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
	Eq,
	Ne,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Query {
	/// `.`
	Identity,
	/// `.a.b`
	Path(Vec<Box<str>>),
	/// `{key: query, ...}`
	Object(Vec<(Box<str>, Query)>),
	/// A JSON literal.
	Literal(Value),
	/// `select(left op right)`
	Select(Box<Query>, CmpOp, Box<Query>),
}

impl Query {
	/// Evaluate against an input document. `Ok(None)` means the query
	/// emitted nothing (a filtered-out document).
	pub fn run(&self, input: &Value) -> NhResult<Option<Value>> {
		match self {
			Query::Identity => Ok(Some(input.clone())),
			Query::Path(path) => {
				let mut current = input;
				for key in path {
					match current {
						Value::Object(map) => {
							current = map.get(key.as_ref()).unwrap_or(&Value::Null);
						}
						Value::Null => return Ok(Some(Value::Null)),
						_ => {
							return Err(Error::ValidationFailed(format!(
								"cannot index non-object with .{}",
								key
							)))
						}
					}
				}
				Ok(Some(current.clone()))
			}
			Query::Object(entries) => {
				let mut out = serde_json::Map::with_capacity(entries.len());
				for (key, query) in entries {
					match query.run(input)? {
						Some(value) => {
							out.insert(key.to_string(), value);
						}
						None => return Ok(None),
					}
				}
				Ok(Some(Value::Object(out)))
			}
			Query::Literal(value) => Ok(Some(value.clone())),
			Query::Select(left, op, right) => {
				let l = left.run(input)?.unwrap_or(Value::Null);
				let r = right.run(input)?.unwrap_or(Value::Null);
				let matched = match op {
					CmpOp::Eq => l == r,
					CmpOp::Ne => l != r,
				};
				if matched {
					Ok(Some(input.clone()))
				} else {
					Ok(None)
				}
			}
		}
	}
}

/// Compile a query expression.
pub fn compile(src: &str) -> NhResult<Query> {
	let mut parser = Parser { chars: src.char_indices().peekable(), src, depth: 0 };
	let query = parser.parse_query()?;
	parser.skip_ws();
	if let Some((pos, c)) = parser.chars.peek().copied() {
		return Err(parser.error(pos, format!("unexpected trailing {:?}", c)));
	}
	Ok(query)
}

struct Parser<'a> {
	chars: std::iter::Peekable<std::str::CharIndices<'a>>,
	src: &'a str,
	depth: usize,
}

impl Parser<'_> {
	fn error(&self, pos: usize, message: String) -> Error {
		Error::ValidationFailed(format!("query parse error at {}: {}", pos, message))
	}

	fn skip_ws(&mut self) {
		while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
			self.chars.next();
		}
	}

	fn peek(&mut self) -> Option<char> {
		self.chars.peek().map(|(_, c)| *c)
	}

	fn pos(&mut self) -> usize {
		self.chars.peek().map_or(self.src.len(), |(pos, _)| *pos)
	}

	fn expect(&mut self, expected: char) -> NhResult<()> {
		self.skip_ws();
		let pos = self.pos();
		match self.chars.next() {
			Some((_, c)) if c == expected => Ok(()),
			other => Err(self.error(
				pos,
				format!("expected {:?}, got {:?}", expected, other.map(|(_, c)| c)),
			)),
		}
	}

	fn parse_query(&mut self) -> NhResult<Query> {
		self.depth += 1;
		if self.depth > MAX_DEPTH {
			return Err(Error::ValidationFailed("query nesting too deep".into()));
		}
		self.skip_ws();
		let pos = self.pos();
		let result = match self.peek() {
			Some('.') => self.parse_path(),
			Some('{') => self.parse_object(),
			Some('"') => self.parse_string().map(|s| Query::Literal(Value::String(s))),
			Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
			Some(c) if c.is_ascii_alphabetic() => self.parse_word(),
			other => Err(self.error(pos, format!("unexpected {:?}", other))),
		};
		self.depth -= 1;
		result
	}

	fn parse_path(&mut self) -> NhResult<Query> {
		let mut path = Vec::new();
		while self.peek() == Some('.') {
			self.chars.next();
			let ident = self.parse_ident_opt();
			match ident {
				Some(ident) => path.push(ident.into()),
				// A bare `.` is identity; `.a.` is an error.
				None if path.is_empty() => return Ok(Query::Identity),
				None => {
					let pos = self.pos();
					return Err(self.error(pos, "expected field name after '.'".into()));
				}
			}
		}
		Ok(Query::Path(path))
	}

	fn parse_ident_opt(&mut self) -> Option<String> {
		let mut ident = String::new();
		while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-') {
			if let Some((_, c)) = self.chars.next() {
				ident.push(c);
			}
		}
		if ident.is_empty() {
			None
		} else {
			Some(ident)
		}
	}

	fn parse_object(&mut self) -> NhResult<Query> {
		self.expect('{')?;
		let mut entries = Vec::new();
		loop {
			self.skip_ws();
			if self.peek() == Some('}') {
				self.chars.next();
				break;
			}
			let key = if self.peek() == Some('"') {
				self.parse_string()?
			} else {
				let pos = self.pos();
				self.parse_ident_opt().ok_or_else(|| self.error(pos, "expected object key".into()))?
			};
			self.expect(':')?;
			let value = self.parse_query()?;
			entries.push((key.into(), value));

			self.skip_ws();
			match self.peek() {
				Some(',') => {
					self.chars.next();
				}
				Some('}') => {}
				other => {
					let pos = self.pos();
					return Err(self.error(pos, format!("expected ',' or '}}', got {:?}", other)));
				}
			}
		}
		Ok(Query::Object(entries))
	}

	fn parse_string(&mut self) -> NhResult<String> {
		self.expect('"')?;
		let mut out = String::new();
		loop {
			let pos = self.pos();
			match self.chars.next() {
				None => return Err(self.error(pos, "unterminated string".into())),
				Some((_, '"')) => return Ok(out),
				Some((_, '\\')) => match self.chars.next() {
					Some((_, '"')) => out.push('"'),
					Some((_, '\\')) => out.push('\\'),
					Some((_, 'n')) => out.push('\n'),
					Some((_, 't')) => out.push('\t'),
					other => {
						return Err(self.error(pos, format!("invalid escape {:?}", other.map(|(_, c)| c))))
					}
				},
				Some((_, c)) => out.push(c),
			}
		}
	}

	fn parse_number(&mut self) -> NhResult<Query> {
		let start = self.pos();
		let mut text = String::new();
		while matches!(self.peek(), Some(c) if c.is_ascii_digit() || "+-.eE".contains(c)) {
			if let Some((_, c)) = self.chars.next() {
				text.push(c);
			}
		}
		let number: serde_json::Number = text
			.parse::<f64>()
			.ok()
			.and_then(serde_json::Number::from_f64)
			.ok_or_else(|| self.error(start, format!("invalid number {:?}", text)))?;
		Ok(Query::Literal(Value::Number(number)))
	}

	fn parse_word(&mut self) -> NhResult<Query> {
		let pos = self.pos();
		let word = self.parse_ident_opt().unwrap_or_default();
		match word.as_str() {
			"true" => Ok(Query::Literal(Value::Bool(true))),
			"false" => Ok(Query::Literal(Value::Bool(false))),
			"null" => Ok(Query::Literal(Value::Null)),
			"select" => {
				self.expect('(')?;
				let left = self.parse_query()?;
				self.skip_ws();
				let op_pos = self.pos();
				let op = match (self.chars.next(), self.chars.next()) {
					(Some((_, '=')), Some((_, '='))) => CmpOp::Eq,
					(Some((_, '!')), Some((_, '='))) => CmpOp::Ne,
					_ => return Err(self.error(op_pos, "expected '==' or '!='".into())),
				};
				let right = self.parse_query()?;
				self.expect(')')?;
				Ok(Query::Select(Box::new(left), op, Box::new(right)))
			}
			other => Err(self.error(pos, format!("unknown word {:?}", other))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn object_construction_projects_fields() {
		let query = compile("{text: .t, who: .u}").unwrap();
		let input = json!({"t": "hi", "u": "a", "extra": "x"});
		assert_eq!(query.run(&input).unwrap(), Some(json!({"text": "hi", "who": "a"})));
	}

	#[test]
	fn nested_paths_traverse_objects() {
		let query = compile(".a.b").unwrap();
		assert_eq!(query.run(&json!({"a": {"b": 7.0}})).unwrap(), Some(json!(7.0)));
		assert_eq!(query.run(&json!({"a": {}})).unwrap(), Some(Value::Null));
		assert_eq!(query.run(&json!({})).unwrap(), Some(Value::Null));
	}

	#[test]
	fn identity_passes_the_document_through() {
		let query = compile(".").unwrap();
		let input = json!({"k": [1, 2]});
		assert_eq!(query.run(&input).unwrap(), Some(input.clone()));
	}

	#[test]
	fn select_filters_non_matching_documents() {
		let query = compile(r#"select(.type == "order")"#).unwrap();
		let matching = json!({"type": "order", "id": 1});
		let other = json!({"type": "invoice"});
		assert_eq!(query.run(&matching).unwrap(), Some(matching.clone()));
		assert_eq!(query.run(&other).unwrap(), None);
	}

	#[test]
	fn select_supports_inequality() {
		let query = compile(r#"select(.env != "test")"#).unwrap();
		assert!(query.run(&json!({"env": "prod"})).unwrap().is_some());
		assert!(query.run(&json!({"env": "test"})).unwrap().is_none());
	}

	#[test]
	fn literals_and_quoted_keys() {
		let query = compile(r#"{"k v": 1, flag: true, none: null}"#).unwrap();
		assert_eq!(
			query.run(&json!({})).unwrap(),
			Some(json!({"k v": 1.0, "flag": true, "none": null}))
		);
	}

	#[test]
	fn indexing_a_scalar_is_an_error() {
		let query = compile(".a.b").unwrap();
		assert!(query.run(&json!({"a": 5})).is_err());
	}

	#[test]
	fn parse_errors_are_rejected() {
		assert!(compile("{text: }").is_err());
		assert!(compile("select(.a = 1)").is_err());
		assert!(compile("bogus").is_err());
		assert!(compile(".a.").is_err());
		assert!(compile("{a: .b} trailing").is_err());
	}
}

// vim: ts=4
