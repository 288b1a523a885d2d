//! Steps that drive nested chains: conditional routing, mark/back, memoize.

use std::collections::{BTreeMap, VecDeque};

use crate::error::Result;
use crate::pipe::context::EvalContext;
use crate::pipe::step::{Chain, Step, Upstream};
use crate::pipe::traverser::Traverser;
use crate::value::Value;

pub type Test = Box<dyn FnMut(&Value) -> bool>;

/// Routes every input through `then` or `otherwise` and streams that
/// branch's output before pulling the next input.
pub struct IfThenElseStep {
    test: Test,
    then: Chain,
    otherwise: Chain,
    active: Option<bool>,
}

impl IfThenElseStep {
    pub fn new(test: Test, then: Chain, otherwise: Chain) -> Self {
        Self {
            test,
            then,
            otherwise,
            active: None,
        }
    }

    fn branch(&mut self, taken: bool) -> &mut Chain {
        if taken {
            &mut self.then
        } else {
            &mut self.otherwise
        }
    }
}

impl Step for IfThenElseStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(taken) = self.active {
                if let Some(out) = self.branch(taken).pull(ctx)? {
                    return Ok(Some(out));
                }
                self.active = None;
            }
            let Some(traverser) = upstream.pull(ctx)? else {
                return Ok(None);
            };
            let taken = (self.test)(traverser.value());
            self.branch(taken).reset(vec![traverser]);
            self.active = Some(taken);
        }
    }

    fn reset(&mut self) {
        self.active = None;
        self.then.reset(Vec::new());
        self.otherwise.reset(Vec::new());
    }

    fn name(&self) -> &'static str {
        "if_then_else"
    }
}

/// Closes a `mark()`: runs the steps appended since the mark for each
/// input, then emits the input itself. `back` emits only when the branch
/// produced something; `optional` always emits. The branch is drained
/// either way so its side effects happen.
pub struct BackStep {
    branch: Chain,
    optional: bool,
}

impl BackStep {
    pub fn new(branch: Chain, optional: bool) -> Self {
        Self { branch, optional }
    }
}

impl Step for BackStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.pull(ctx)? {
            self.branch.reset(vec![traverser.clone()]);
            let mut matched = false;
            while self.branch.pull(ctx)?.is_some() {
                matched = true;
            }
            if matched || self.optional {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.branch.reset(Vec::new());
    }

    fn name(&self) -> &'static str {
        if self.optional {
            "optional"
        } else {
            "back"
        }
    }
}

/// Caches the output of the steps after a named step, keyed by the value
/// entering them. Cached results extend the path with their final value only.
pub struct MemoizeStep {
    body: Chain,
    cache: BTreeMap<Value, Vec<Value>>,
    pending: VecDeque<Traverser>,
}

impl MemoizeStep {
    pub fn new(body: Chain) -> Self {
        Self {
            body,
            cache: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }
}

impl Step for MemoizeStep {
    fn try_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &mut EvalContext,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return Ok(Some(next));
            }
            let Some(traverser) = upstream.pull(ctx)? else {
                return Ok(None);
            };
            if let Some(hit) = self.cache.get(traverser.value()) {
                self.pending
                    .extend(hit.iter().map(|value| traverser.split(value.clone())));
                continue;
            }
            let key = traverser.value().clone();
            let outputs = self.body.run(traverser, ctx)?;
            self.cache
                .insert(key, outputs.iter().map(|t| t.value().clone()).collect());
            self.pending.extend(outputs);
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.body.reset(Vec::new());
    }

    fn name(&self) -> &'static str {
        "memoize"
    }
}
