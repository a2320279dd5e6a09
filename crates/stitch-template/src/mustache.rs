#![forbid(unsafe_code)]

//! Mustache expression parsing.
//!
//! Attribute values and text are scanned for `{{ path }}` (live) and
//! `[[ path ]]` (one-time) delimiters. Text between delimiters becomes the
//! prefix of the following [`Expression`]; text after the last one is the
//! suffix.
//!
//! ```text
//! "Hello {{ user.name }}, you have [[ count ]] items"
//!   -> [("Hello ", live user.name), (", you have ", one-time count)] + " items"
//! ```
//!
//! # Failure Modes
//!
//! Parsing is total. Text without a complete delimiter pair yields `None`.
//! A malformed path inside delimiters becomes [`Path::invalid`] (always
//! `Undefined`) and logs a warning.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use stitch_observe::{
    CompoundObserver, Observer, ObserverTransform, Path, PathObserver, Scheduler, Value,
};

/// One bound path and the literal text preceding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub prefix: String,
    pub path: Path,
    /// Resolved once at instantiation (`[[ ]]`).
    pub one_time: bool,
}

/// A parsed, non-empty list of expressions plus trailing literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingExpression {
    expressions: SmallVec<[Expression; 2]>,
    suffix: String,
    only_one_time: bool,
}

/// The result of evaluating a [`BindingExpression`] against a model.
#[derive(Clone)]
pub enum BindingValue {
    /// An unopened observer producing the value.
    Live(Rc<dyn Observer>),
    /// A value resolved once; never re-evaluated.
    OneTime(Value),
}

impl fmt::Debug for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Live(observer) => {
                f.debug_tuple("Live").field(&observer.state()).finish()
            }
            BindingValue::OneTime(value) => f.debug_tuple("OneTime").field(value).finish(),
        }
    }
}

const LIVE: (&str, &str) = ("{{", "}}");
const ONE_TIME: (&str, &str) = ("[[", "]]");

impl BindingExpression {
    /// Parse `text`. Returns `None` when it contains no complete mustache.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }

        let mut expressions = SmallVec::new();
        let mut last = 0;
        loop {
            let rest = &text[last..];
            let live = rest.find(LIVE.0);
            let once = rest.find(ONE_TIME.0);
            let (start, (open, close), one_time) = match (live, once) {
                (Some(l), Some(o)) if o < l => (o, ONE_TIME, true),
                (Some(l), _) => (l, LIVE, false),
                (None, Some(o)) => (o, ONE_TIME, true),
                (None, None) => break,
            };
            let body_start = start + open.len();
            let Some(body_len) = rest[body_start..].find(close) else {
                break;
            };

            let source = rest[body_start..body_start + body_len].trim();
            expressions.push(Expression {
                prefix: rest[..start].to_owned(),
                path: parse_path(source),
                one_time,
            });
            last += body_start + body_len + close.len();
            if last >= text.len() {
                break;
            }
        }

        if expressions.is_empty() {
            return None;
        }
        let only_one_time = expressions.iter().all(|e: &Expression| e.one_time);
        Some(Self {
            expressions,
            suffix: text[last..].to_owned(),
            only_one_time,
        })
    }

    /// `{{}}`: the model itself.
    #[must_use]
    pub fn identity() -> Self {
        let mut expressions = SmallVec::new();
        expressions.push(Expression {
            prefix: String::new(),
            path: Path::empty(),
            one_time: false,
        });
        Self {
            expressions,
            suffix: String::new(),
            only_one_time: false,
        }
    }

    /// Parse a region attribute; an empty value means `{{}}`.
    #[must_use]
    pub fn parse_with_default(text: &str) -> Option<Self> {
        if text.is_empty() {
            Some(Self::identity())
        } else {
            Self::parse(text)
        }
    }

    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    #[must_use]
    pub fn has_one_path(&self) -> bool {
        self.expressions.len() == 1
    }

    /// A single expression with no surrounding text; its value is passed
    /// through untouched instead of being stringified.
    #[must_use]
    pub fn is_simple_path(&self) -> bool {
        self.has_one_path() && self.expressions[0].prefix.is_empty() && self.suffix.is_empty()
    }

    #[must_use]
    pub fn only_one_time(&self) -> bool {
        self.only_one_time
    }

    /// Concatenate literal text and `values` (one per expression).
    /// Nullish values contribute nothing.
    #[must_use]
    pub fn combine(&self, values: &[Value]) -> Value {
        let mut out = String::new();
        for (i, expression) in self.expressions.iter().enumerate() {
            out.push_str(&expression.prefix);
            if let Some(value) = values.get(i) {
                out.push_str(&value.to_text());
            }
        }
        out.push_str(&self.suffix);
        Value::from(out)
    }

    /// Evaluate against `model`: a one-time value if every expression is
    /// one-time, otherwise an unopened observer.
    #[must_use]
    pub fn create_observer(self: &Rc<Self>, scheduler: &Scheduler, model: &Value) -> BindingValue {
        if self.only_one_time {
            return BindingValue::OneTime(self.resolve_once(model));
        }

        if self.has_one_path() {
            let path = self.expressions[0].path.clone();
            let observer = PathObserver::new(scheduler, model.clone(), path);
            if self.is_simple_path() {
                return BindingValue::Live(observer);
            }
            let expression = Rc::clone(self);
            return BindingValue::Live(ObserverTransform::new(observer, move |value| {
                expression.combine(std::slice::from_ref(value))
            }));
        }

        let compound = CompoundObserver::new(scheduler);
        for expression in &self.expressions {
            if expression.one_time {
                compound.add_constant(expression.path.get_value_from(model));
            } else {
                compound.add_path(model.clone(), expression.path.clone());
            }
        }
        let expression = Rc::clone(self);
        BindingValue::Live(ObserverTransform::new(compound, move |values| {
            match values.as_array() {
                Some(array) => array.with(|values| expression.combine(values)),
                None => expression.combine(&[]),
            }
        }))
    }

    fn resolve_once(&self, model: &Value) -> Value {
        let values: SmallVec<[Value; 2]> = self
            .expressions
            .iter()
            .map(|e| e.path.get_value_from(model))
            .collect();
        if self.is_simple_path() {
            return values.into_iter().next().unwrap_or_default();
        }
        self.combine(&values)
    }
}

fn parse_path(source: &str) -> Path {
    Path::parse(source).unwrap_or_else(|err| {
        tracing::warn!(path = source, error = %err, "invalid path in binding expression");
        Path::invalid()
    })
}
