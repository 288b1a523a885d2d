use std::collections::BTreeMap;

use crate::error::{Result, TraversalError};
use crate::pipe::context::EvalContext;
use crate::pipe::step::{Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::steps::ValueFn;
use crate::value::Value;

/// Emits each traverser's path as a list, optionally mapping every entry
/// with the function at the same position.
pub struct PathStep {
    fns: Vec<ValueFn>,
}

impl PathStep {
    pub fn new(fns: Vec<ValueFn>) -> Self {
        Self { fns }
    }
}

impl Step for PathStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let path = traverser.path()?;
        let values = if self.fns.is_empty() {
            path.to_vec()
        } else {
            if self.fns.len() != path.len() {
                return Err(TraversalError::ArgumentMismatch {
                    step: "path",
                    expected: path.len(),
                    found: self.fns.len(),
                });
            }
            path.iter()
                .zip(self.fns.iter_mut())
                .map(|(value, f)| f(value))
                .collect()
        };
        Ok(Some(traverser.split(Value::List(values))))
    }

    fn name(&self) -> &'static str {
        "path"
    }
}

/// Emits a map of step name to the value bound there. Names and functions
/// are lined up when the step is built.
pub struct SelectStep {
    names: Vec<String>,
    fns: Vec<ValueFn>,
}

impl SelectStep {
    pub fn new(names: Vec<String>, fns: Vec<ValueFn>) -> Self {
        Self { names, fns }
    }
}

/// Values bound under `names`, each run through its function if any.
/// Names the traverser never passed read as null.
pub(crate) fn bound_row(traverser: &Traverser, names: &[String], fns: &mut [ValueFn]) -> Vec<Value> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let value = traverser.binding(name).cloned().unwrap_or(Value::Null);
            match fns.get_mut(idx) {
                Some(f) => f(&value),
                None => value,
            }
        })
        .collect()
}

impl Step for SelectStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.pull(ctx)? else {
            return Ok(None);
        };
        let row = bound_row(&traverser, &self.names, &mut self.fns);
        let map: BTreeMap<Value, Value> = self
            .names
            .iter()
            .map(|name| Value::from(name.as_str()))
            .zip(row)
            .collect();
        Ok(Some(traverser.split(Value::Map(map))))
    }

    fn name(&self) -> &'static str {
        "select"
    }
}
