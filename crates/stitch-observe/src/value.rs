#![forbid(unsafe_code)]

//! Dynamic model values.
//!
//! A model graph is built from [`Value`]s. Scalars (`Undefined`, `Null`,
//! `Bool`, `Number`, `String`) compare by content. [`Object`] and [`Array`]
//! are shared, interior-mutable containers that compare by **reference
//! identity**: two objects with identical fields are different values.
//!
//! # Invariants
//!
//! 1. [`Value::same`] is script-host strict equality, except that `NaN` is
//!    the same as `NaN`.
//! 2. [`Value::identity_key`] agrees with [`Value::same`]: two values are the
//!    same iff their identity keys are equal, for as long as both are alive.
//! 3. Mutating an `Object` or `Array` never notifies anyone directly. Change
//!    detection happens when the owning [`Scheduler`](crate::Scheduler) flushes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

/// A dynamically-typed model value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Renders as empty text.
    #[default]
    Undefined,
    /// Explicit null. Renders as empty text.
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Strict sameness: content for scalars, reference identity for containers.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Hashable key that identifies this value for identity-keyed maps.
    #[must_use]
    pub fn identity_key(&self) -> IdentityKey {
        match self {
            Value::Undefined => IdentityKey::Undefined,
            Value::Null => IdentityKey::Null,
            Value::Bool(b) => IdentityKey::Bool(*b),
            Value::Number(n) => IdentityKey::Number(normalize_number_bits(*n)),
            Value::String(s) => IdentityKey::String(Rc::clone(s)),
            Value::Object(o) => IdentityKey::Ref(Rc::as_ptr(&o.0) as *const () as usize),
            Value::Array(a) => IdentityKey::Ref(Rc::as_ptr(&a.0) as *const () as usize),
        }
    }

    /// `true` for `Undefined` and `Null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Script-host truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Stringify for text output, mapping null and undefined to `""`.
    #[must_use]
    pub fn to_text(&self) -> String {
        if self.is_nullish() {
            String::new()
        } else {
            self.to_string()
        }
    }
}

/// Zero and negative zero are the same key; every NaN collapses to one key.
fn normalize_number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self, f, &mut SmallVec::new())
    }
}

/// Arrays currently being joined, innermost last.
type Visiting = SmallVec<[usize; 4]>;

fn write_value(value: &Value, f: &mut fmt::Formatter<'_>, visiting: &mut Visiting) -> fmt::Result {
    match value {
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => fmt_number(*n, f),
        Value::String(s) => f.write_str(s),
        Value::Object(_) => f.write_str("[object Object]"),
        Value::Array(a) => {
            // An array already being joined renders as nothing.
            let key = Rc::as_ptr(&a.0) as *const () as usize;
            if visiting.contains(&key) {
                return Ok(());
            }
            visiting.push(key);
            let items = a.0.borrow();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                if !item.is_nullish() {
                    write_value(item, f, visiting)?;
                }
            }
            visiting.pop();
            Ok(())
        }
    }
}

/// Host number formatting: plain decimals inside `[1e-6, 1e21)`, exponent
/// form (`1e+21`, `1.5e-7`) outside it.
fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if (1e-6..1e21).contains(&n.abs()) {
        write!(f, "{n}")
    } else {
        let exp = format!("{n:e}");
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                write!(f, "{mantissa}e+{power}")
            }
            _ => f.write_str(&exp),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Undefined, Into::into)
    }
}

/// Hashable identity of a [`Value`].
///
/// Container keys are addresses, so a key is only meaningful while the value
/// it was taken from is alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(Rc<str>),
    Ref(usize),
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Shared, mutable string-keyed record. Clones share the same storage.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<AHashMap<String, Value>>>);

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an object from `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Rc::new(RefCell::new(map)))
    }

    /// Field value, or `Undefined` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Value {
        self.0.borrow_mut().remove(key).unwrap_or_default()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Reference identity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut dbg = f.debug_map();
                for key in keys {
                    dbg.entry(key, &map[key]);
                }
                dbg.finish()
            }
            Err(_) => f.write_str("Object(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

/// Shared, mutable, index-addressable collection. Clones share the same storage.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self(Rc::new(RefCell::new(
            values.into_iter().map(Into::into).collect(),
        )))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Overwrite element `index`, growing with `Undefined` holes if needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    /// Insert at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        let index = index.min(items.len());
        items.insert(index, value.into());
    }

    /// Remove and return element `index`, or `None` when out of range.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    /// Replace `delete_count` elements at `index` with `items`, returning the
    /// removed elements. Both bounds are clamped.
    pub fn splice<I>(&self, index: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut current = self.0.borrow_mut();
        let start = index.min(current.len());
        let end = start.saturating_add(delete_count).min(current.len());
        current.splice(start..end, items).collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Rotate so the last element becomes the first.
    pub fn rotate_right(&self, by: usize) {
        let mut items = self.0.borrow_mut();
        if !items.is_empty() {
            let by = by % items.len();
            items.rotate_right(by);
        }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Run `f` with a borrowed view of the contents.
    pub fn with<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Reference identity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => f.write_str("Array(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
