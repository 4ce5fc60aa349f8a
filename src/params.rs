/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::str::FromStr;

use crate::SimError;

/// Extra characters accepted inside unquoted values, on top of
/// alphanumerics. Covers classifier specs such as `dirname&dataset` and
/// multi-word tags.
const VALUE_WORD_CHARS: &str = "!$%&/()[]{}<>?_-.;:#+*";

/// Parsed `key=value` user arguments, e.g.
/// `mode=access_size,ghosts_factor=0.5`.
///
/// Values may be quoted (`'` or `"`) and may escape characters with a
/// backslash. Field names are restricted to alphanumerics and `_`.
#[derive(Debug, Default)]
pub struct UserArgs {
	pairs: Vec<(String, String)>,
}

impl UserArgs {
	pub fn get(&self, name: &str) -> Option<&str> {
		self.pairs
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	pub fn get_parsed<T>(&self, name: &str) -> Result<Option<T>, SimError>
	where
		T: FromStr,
	{
		let Some(value) = self.get(name) else {
			return Ok(None);
		};

		value
			.parse::<T>()
			.map(Some)
			.map_err(|_| SimError::config(format!("invalid value {value:?} for field {name:?}")))
	}

	/// Ensures only known field names were supplied.
	pub fn check_names(&self, names: &[&str]) -> Result<(), SimError> {
		for (key, _) in &self.pairs {
			if !names.contains(&key.as_str()) {
				return Err(SimError::config(format!("unknown field name {key:?}")));
			}
		}

		Ok(())
	}
}

impl FromStr for UserArgs {
	type Err = SimError;

	fn from_str(input: &str) -> Result<Self, SimError> {
		let mut lexer = Lexer::new(input);
		let mut pairs = Vec::<(String, String)>::new();

		loop {
			lexer.skip_whitespace();

			if lexer.at_end() {
				break;
			}

			let name = lexer.read_name()?;

			lexer.skip_whitespace();
			lexer.expect('=')?;

			let value = lexer.read_value()?;
			pairs.push((name, value));

			lexer.skip_whitespace();

			if lexer.at_end() {
				break;
			}

			lexer.expect(',')?;
		}

		Ok(UserArgs { pairs })
	}
}

struct Lexer<'a> {
	chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
	fn new(input: &'a str) -> Self {
		Lexer {
			chars: input.chars().peekable(),
		}
	}

	fn at_end(&mut self) -> bool {
		self.chars.peek().is_none()
	}

	fn skip_whitespace(&mut self) {
		while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
			self.chars.next();
		}
	}

	fn expect(&mut self, expected: char) -> Result<(), SimError> {
		match self.chars.next() {
			Some(c) if c == expected => Ok(()),
			Some(c) => Err(SimError::config(format!("expected {expected:?}, found {c:?}"))),
			None => Err(SimError::config(format!("expected {expected:?}, found end of input"))),
		}
	}

	fn read_name(&mut self) -> Result<String, SimError> {
		let mut name = String::new();

		while let Some(&c) = self.chars.peek() {
			if c.is_alphanumeric() || c == '_' {
				name.push(c);
				self.chars.next();
			} else {
				break;
			}
		}

		if name.is_empty() {
			let found = self.chars.peek().copied();
			return Err(SimError::config(format!("expected field name, found {found:?}")));
		}

		Ok(name)
	}

	/// Reads all characters until an unquoted, unescaped `,`. Quotes
	/// delimit verbatim spans and are stripped; a backslash escapes the
	/// following character.
	fn read_value(&mut self) -> Result<String, SimError> {
		let mut value = String::new();

		while let Some(&c) = self.chars.peek() {
			match c {
				',' => break,

				'\'' | '"' => {
					self.chars.next();
					self.read_quoted(&mut value, c)?;
				},

				'\\' => {
					self.chars.next();

					let escaped = self.chars
						.next()
						.ok_or_else(|| SimError::config("dangling escape in value"))?;

					value.push(escaped);
				},

				_ if c.is_alphanumeric()
					|| c.is_whitespace()
					|| VALUE_WORD_CHARS.contains(c) =>
				{
					value.push(c);
					self.chars.next();
				},

				_ => return Err(SimError::config(format!("unexpected character {c:?} in value"))),
			}
		}

		Ok(value.trim().to_string())
	}

	fn read_quoted(&mut self, value: &mut String, quote: char) -> Result<(), SimError> {
		loop {
			match self.chars.next() {
				Some(c) if c == quote => return Ok(()),

				Some('\\') if quote == '"' => {
					let escaped = self.chars
						.next()
						.ok_or_else(|| SimError::config("dangling escape in value"))?;

					value.push(escaped);
				},

				Some(c) => value.push(c),

				None => return Err(SimError::config("unterminated quote in value")),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(input: &str) -> UserArgs {
		input.parse::<UserArgs>().expect("could not parse user args")
	}

	#[test]
	fn it_parses_simple_fields() {
		let args = parse("d_factor=0.25,min_d=4");

		assert_eq!(args.get("d_factor"), Some("0.25"));
		assert_eq!(args.get_parsed::<usize>("min_d").unwrap(), Some(4));
		assert_eq!(args.get("max_d"), None);
	}

	#[test]
	fn it_parses_annotated_and_tag_values() {
		let args = parse("size=10 GiB, mode=total_size, classifier=dirname&dataset");

		assert_eq!(args.get("size"), Some("10 GiB"));
		assert_eq!(args.get("mode"), Some("total_size"));
		assert_eq!(args.get("classifier"), Some("dirname&dataset"));
	}

	#[test]
	fn it_parses_quoted_and_escaped_values() {
		let args = parse(r#"a="average, active",b=one\,two"#);

		assert_eq!(args.get("a"), Some("average, active"));
		assert_eq!(args.get("b"), Some("one,two"));
	}

	#[test]
	fn it_rejects_malformed_input() {
		assert!("=3".parse::<UserArgs>().is_err());
		assert!("a".parse::<UserArgs>().is_err());
		assert!("a=\"unterminated".parse::<UserArgs>().is_err());
	}

	#[test]
	fn it_checks_field_names() {
		let args = parse("ghosts_factor=1.5");

		assert!(args.check_names(&["ghosts_factor"]).is_ok());
		assert!(args.check_names(&["d_factor"]).is_err());
	}
}
