use std::collections::BTreeMap;

use crate::error::{Result, TraversalError};
use crate::value::Value;

/// A value in flight plus the bookkeeping that travels with it.
///
/// `path` is `Some` only when path tracking is enabled; every step that
/// produces a new value appends it. `bindings` holds the value seen at each
/// named step (`as_`) the traverser has passed through.
#[derive(Clone, Debug, PartialEq)]
pub struct Traverser {
    value: Value,
    path: Option<Vec<Value>>,
    bindings: BTreeMap<String, Value>,
}

impl Traverser {
    pub fn new(value: Value, track_path: bool) -> Self {
        let path = track_path.then(|| vec![value.clone()]);
        Self {
            value,
            path,
            bindings: BTreeMap::new(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Derives a traverser carrying `value`, extending the path.
    pub fn split(&self, value: Value) -> Traverser {
        let path = self.path.as_ref().map(|path| {
            let mut path = path.clone();
            path.push(value.clone());
            path
        });
        Traverser {
            value,
            path,
            bindings: self.bindings.clone(),
        }
    }

    /// Sequence of values this traverser passed through, start first.
    pub fn path(&self) -> Result<&[Value]> {
        self.path.as_deref().ok_or(TraversalError::PathNotEnabled)
    }

    pub fn is_path_tracked(&self) -> bool {
        self.path.is_some()
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    pub(crate) fn bind(&mut self, name: &str) {
        self.bindings.insert(name.to_owned(), self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_extends_tracked_path() {
        let start = Traverser::new(Value::Int(1), true);
        let next = start.split(Value::Int(2)).split(Value::Int(3));
        assert_eq!(
            next.path().unwrap(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(start.path().unwrap(), &[Value::Int(1)]);
    }

    #[test]
    fn untracked_path_is_an_error() {
        let t = Traverser::new(Value::Int(1), false).split(Value::Int(2));
        assert_eq!(t.path(), Err(TraversalError::PathNotEnabled));
    }

    #[test]
    fn bindings_survive_splits() {
        let mut t = Traverser::new(Value::from("a"), false);
        t.bind("x");
        let next = t.split(Value::from("b"));
        assert_eq!(next.binding("x"), Some(&Value::from("a")));
        assert_eq!(next.value(), &Value::from("b"));
    }
}
