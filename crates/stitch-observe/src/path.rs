#![forbid(unsafe_code)]

//! Property paths into a model graph.
//!
//! A [`Path`] is a parsed accessor chain such as `user.name`, `items[0]`, or
//! `rows.length`. The empty path denotes the model itself.
//!
//! # Grammar
//!
//! ```text
//! path    := "" | segment ( "." segment | "[" index "]" | "[" quoted "]" )*
//! segment := ident | digits
//! ident   := [A-Za-z_$] [A-Za-z0-9_$]*
//! quoted  := "'" chars "'" | '"' chars '"'
//! ```
//!
//! # Failure Modes
//!
//! - Malformed text: [`Path::parse`] returns [`PathError`].
//! - Callers that must not fail use [`Path::invalid`], whose lookups always
//!   yield `Undefined`.
//! - Lookup through a scalar or a missing key yields `Undefined`.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::value::Value;

/// Error parsing a path expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("unexpected character {found:?} at offset {offset} in path {path:?}")]
    UnexpectedChar {
        path: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated bracket in path {0:?}")]
    Unterminated(String),
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
}

/// One accessor step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(Rc<str>),
    Index(usize),
}

/// A parsed, immutable accessor chain.
#[derive(Clone, PartialEq, Eq)]
pub struct Path {
    segments: SmallVec<[Segment; 4]>,
    valid: bool,
}

impl Path {
    /// The empty path (resolves to the model itself).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            segments: SmallVec::new(),
            valid: true,
        }
    }

    /// A path that never resolves to anything.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            segments: SmallVec::new(),
            valid: false,
        }
    }

    /// Parse a path expression. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let src = text.trim();
        let mut segments = SmallVec::new();
        if src.is_empty() {
            return Ok(Self {
                segments,
                valid: true,
            });
        }

        let chars: Vec<(usize, char)> = src.char_indices().collect();
        let mut i = 0;
        let mut expect_segment = true;
        while i < chars.len() {
            let (offset, c) = chars[i];
            if expect_segment {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i].1) {
                    i += 1;
                }
                if start == i {
                    return Err(if c == '.' {
                        PathError::EmptySegment(src.to_owned())
                    } else {
                        PathError::UnexpectedChar {
                            path: src.to_owned(),
                            offset,
                            found: c,
                        }
                    });
                }
                let word: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
                segments.push(word_segment(&word, src, chars[start].0)?);
                expect_segment = false;
                continue;
            }

            match c {
                '.' => {
                    i += 1;
                    expect_segment = true;
                    if i == chars.len() {
                        return Err(PathError::EmptySegment(src.to_owned()));
                    }
                }
                '[' => {
                    let close = chars[i + 1..]
                        .iter()
                        .position(|(_, ch)| *ch == ']')
                        .map(|p| p + i + 1)
                        .ok_or_else(|| PathError::Unterminated(src.to_owned()))?;
                    let inner: String = chars[i + 1..close].iter().map(|(_, ch)| *ch).collect();
                    segments.push(bracket_segment(inner.trim(), src, offset)?);
                    i = close + 1;
                }
                other => {
                    return Err(PathError::UnexpectedChar {
                        path: src.to_owned(),
                        offset,
                        found: other,
                    });
                }
            }
        }

        Ok(Self {
            segments,
            valid: true,
        })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// `true` for the empty (identity) path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valid && self.segments.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve this path against `model`.
    #[must_use]
    pub fn get_value_from(&self, model: &Value) -> Value {
        if !self.valid {
            return Value::Undefined;
        }
        let mut current = model.clone();
        for segment in &self.segments {
            current = match (&current, segment) {
                (Value::Object(o), Segment::Key(k)) => o.get(k),
                (Value::Object(o), Segment::Index(i)) => o.get(&i.to_string()),
                (Value::Array(a), Segment::Index(i)) => a.get(*i),
                (Value::Array(a), Segment::Key(k)) if &**k == "length" => Value::from(a.len()),
                (Value::String(s), Segment::Key(k)) if &**k == "length" => {
                    Value::from(s.encode_utf16().count())
                }
                _ => return Value::Undefined,
            };
        }
        current
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn word_segment(word: &str, src: &str, offset: usize) -> Result<Segment, PathError> {
    if word.bytes().all(|b| b.is_ascii_digit()) {
        return word
            .parse()
            .map(Segment::Index)
            .map_err(|_| PathError::UnexpectedChar {
                path: src.to_owned(),
                offset,
                found: word.chars().next().unwrap_or('0'),
            });
    }
    match word.chars().next() {
        Some(first) if first.is_ascii_digit() => Err(PathError::UnexpectedChar {
            path: src.to_owned(),
            offset,
            found: first,
        }),
        _ => Ok(Segment::Key(Rc::from(word))),
    }
}

fn bracket_segment(inner: &str, src: &str, offset: usize) -> Result<Segment, PathError> {
    let quoted = inner.len() >= 2
        && ((inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"')));
    if quoted {
        return Ok(Segment::Key(Rc::from(&inner[1..inner.len() - 1])));
    }
    if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(index) = inner.parse() {
            return Ok(Segment::Index(index));
        }
    }
    Err(PathError::UnexpectedChar {
        path: src.to_owned(),
        offset,
        found: '[',
    })
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return f.write_str("<invalid>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => f.write_str(k)?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Array, Object};

    #[test]
    fn parses_dotted_and_bracketed() {
        let path = Path::parse(" a.b[2]['c d'].e ").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c d".into()),
                Segment::Key("e".into()),
            ]
        );
        assert_eq!(path.to_string(), "a.b[2].c d.e");
    }

    #[test]
    fn empty_path_is_identity() {
        let path = Path::parse("").unwrap();
        assert!(path.is_empty());
        let model = Value::from(Object::new());
        assert!(path.get_value_from(&model).same(&model));
    }

    #[test]
    fn numeric_dot_segment_indexes() {
        let path = Path::parse("items.1").unwrap();
        let model = Object::from_pairs([("items", Array::from_values(["x", "y"]))]);
        assert_eq!(path.get_value_from(&model.into()).to_string(), "y");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            Path::parse("a..b"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(Path::parse("a."), Err(PathError::EmptySegment(_))));
        assert!(matches!(
            Path::parse("a[1"),
            Err(PathError::Unterminated(_))
        ));
        assert!(matches!(
            Path::parse("a b"),
            Err(PathError::UnexpectedChar { found: ' ', .. })
        ));
        assert!(Path::parse("1abc").is_err());
    }

    #[test]
    fn lookups_through_missing_or_scalar_are_undefined() {
        let model: Value = Object::from_pairs([("n", 3)]).into();
        assert!(Path::parse("n.x").unwrap().get_value_from(&model).is_undefined());
        assert!(Path::parse("missing.x").unwrap().get_value_from(&model).is_undefined());
        assert!(Path::invalid().get_value_from(&model).is_undefined());
    }

    #[test]
    fn length_of_arrays_and_strings() {
        let model: Value = Object::from_pairs([
            ("rows", Value::from(Array::from_values([1, 2, 3]))),
            ("name", Value::from("abcd")),
        ])
        .into();
        assert_eq!(
            Path::parse("rows.length").unwrap().get_value_from(&model).to_string(),
            "3"
        );
        assert_eq!(
            Path::parse("name.length").unwrap().get_value_from(&model).to_string(),
            "4"
        );
    }
}
