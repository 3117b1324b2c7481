//! Null-tolerant navigation into a plain value tree.
//!
//! [`Getter`] walks a [`Value`] along a [`Path`] without ever failing: any
//! missing key, out-of-range index, or type mismatch yields the "no value"
//! sentinel (a getter whose [`value`](Getter::value) is `None`). Absent is
//! distinct from present-`null`.

use crate::path::{Path, Seg};
use serde_json::Value;

/// Resolve a path against a document, returning `None` on the first missing
/// or mismatched segment.
pub fn get_at_path<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path {
        current = match (current, seg) {
            (Value::Object(map), Seg::Key(key)) => map.get(key)?,
            (Value::Array(arr), Seg::Index(idx)) => arr.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// A chainable, total view into a value tree.
///
/// # Examples
///
/// ```
/// use arbor_reactive::Getter;
/// use serde_json::json;
///
/// let doc = json!({"clock": {"sec": 59}});
/// let getter = Getter::new(&doc);
///
/// assert_eq!(getter.get("clock.sec").value(), Some(&json!(59)));
/// assert_eq!(getter.get("clock").get("sec").value(), Some(&json!(59)));
/// assert_eq!(getter.get("does.not.exist").value(), None);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Getter<'a> {
    value: Option<&'a Value>,
}

impl<'a> Getter<'a> {
    /// Wrap a document root.
    #[inline]
    pub fn new(value: &'a Value) -> Self {
        Self { value: Some(value) }
    }

    /// Wrap an optional value; `None` yields the sentinel getter.
    #[inline]
    pub fn from_option(value: Option<&'a Value>) -> Self {
        Self { value }
    }

    /// The "no value" sentinel: every `get` returns itself, `value` is `None`.
    #[inline]
    pub fn none() -> Self {
        Self { value: None }
    }

    /// Navigate along `path`, returning a new getter.
    pub fn get(&self, path: impl Into<Path>) -> Getter<'a> {
        let path = path.into();
        Self {
            value: self.value.and_then(|v| get_at_path(v, &path)),
        }
    }

    /// Navigate one segment.
    #[inline]
    pub fn get_seg(&self, seg: &Seg) -> Getter<'a> {
        Self {
            value: self.value.and_then(|v| match (v, seg) {
                (Value::Object(map), Seg::Key(key)) => map.get(key),
                (Value::Array(arr), Seg::Index(idx)) => arr.get(*idx),
                _ => None,
            }),
        }
    }

    /// The resolved value, or `None` if any segment was missing.
    #[inline]
    pub fn value(&self) -> Option<&'a Value> {
        self.value
    }

    /// Whether the path resolved to a present value.
    #[inline]
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_nested_lookup() {
        let doc = json!({"foo": {"bar": {"baz": "foobarbaz"}}});
        let getter = Getter::new(&doc);

        assert_eq!(
            getter.get("foo.bar.baz").value(),
            Some(&json!("foobarbaz"))
        );
        assert_eq!(
            getter.get("foo").get("bar").get("baz").value(),
            Some(&json!("foobarbaz"))
        );
        assert_eq!(
            getter.get(path!("foo", "bar")).get("baz").value(),
            Some(&json!("foobarbaz"))
        );
    }

    #[test]
    fn test_missing_segment_yields_none() {
        let doc = json!({"foo": "bar"});
        let getter = Getter::new(&doc);

        assert_eq!(getter.get("does.not.exist").value(), None);
        // chaining off the sentinel stays total
        assert_eq!(getter.get("does").get("not").get("exist").value(), None);
        assert!(!getter.get("nope").exists());
    }

    #[test]
    fn test_null_is_present() {
        let doc = json!({"gone": null});
        let getter = Getter::new(&doc);

        assert_eq!(getter.get("gone").value(), Some(&Value::Null));
        assert_eq!(getter.get("gone.deeper").value(), None);
    }

    #[test]
    fn test_array_index() {
        let doc = json!({"items": [{"name": "first"}, {"name": "second"}]});
        let getter = Getter::new(&doc);

        assert_eq!(getter.get("items.1.name").value(), Some(&json!("second")));
        assert_eq!(getter.get(path!("items", 0, "name")).value(), Some(&json!("first")));
        assert_eq!(getter.get("items.2.name").value(), None);
    }

    #[test]
    fn test_scalar_traversal_is_total() {
        let doc = json!({"n": 42});
        let getter = Getter::new(&doc);

        assert_eq!(getter.get("n.deeper").value(), None);
    }

    #[test]
    fn test_get_at_path_root() {
        let doc = json!({"a": 1});
        assert_eq!(get_at_path(&doc, &Path::root()), Some(&doc));
    }
}
