//! Conditions: runtime predicates that temporarily block a source.
//!
//! A failing condition is not an error: the source is reported as
//! [`Blocked`](crate::sources::Resolvability::Blocked) and is re-evaluated on
//! every resolution. Conditions are either attached to a source directly or
//! discovered on its origin/backing object through the `dyn Condition` facet.

use std::cell::Cell;
use std::rc::Rc;

/// A predicate gating resolvability.
pub trait Condition {
    fn can_resolve(&self) -> bool;

    /// Why the condition currently fails, for diagnostics.
    fn reason(&self) -> Option<String> {
        None
    }
}

/// Condition backed by a closure.
pub struct FnCondition<F> {
    predicate: F,
    reason: String,
}

impl<F: Fn() -> bool> FnCondition<F> {
    pub fn new(reason: impl Into<String>, predicate: F) -> Self {
        Self {
            predicate,
            reason: reason.into(),
        }
    }
}

impl<F: Fn() -> bool> Condition for FnCondition<F> {
    fn can_resolve(&self) -> bool {
        (self.predicate)()
    }

    fn reason(&self) -> Option<String> {
        Some(self.reason.clone())
    }
}

/// A switch the host flips, e.g. "feature unlocked" or "network online".
#[derive(Debug)]
pub struct Toggle {
    passing: Cell<bool>,
    reason: String,
}

impl Toggle {
    pub fn new(passing: bool, reason: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            passing: Cell::new(passing),
            reason: reason.into(),
        })
    }

    pub fn set(&self, passing: bool) {
        self.passing.set(passing);
    }

    pub fn is_passing(&self) -> bool {
        self.passing.get()
    }
}

impl Condition for Toggle {
    fn can_resolve(&self) -> bool {
        self.passing.get()
    }

    fn reason(&self) -> Option<String> {
        Some(self.reason.clone())
    }
}

/// Reason of the first failing condition, `None` when all pass.
pub fn first_failure(conditions: &[Rc<dyn Condition>]) -> Option<String> {
    conditions
        .iter()
        .find(|condition| !condition.can_resolve())
        .map(|condition| {
            condition
                .reason()
                .unwrap_or_else(|| "condition not met".to_string())
        })
}
