use crate::model::{Model, MutableFields};
use std::fmt;

/// Decides which cached records a descriptor resolves to.
pub enum Matcher<'a, M> {
    /// The kind's equivalence rules against the descriptor's own record.
    Equivalent,
    Predicate(Box<dyn Fn(&M) -> bool + 'a>),
}

impl<M> fmt::Debug for Matcher<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equivalent => f.write_str("Equivalent"),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

type OnResolved<'a, M> = Box<dyn FnOnce(&M, &[M]) + 'a>;

/// Declared intent for one record within one call.
///
/// The descriptor borrows its record mutably: matching always sees that
/// record's own value and resolution writes identifiers back into it.
pub struct OperationModel<'a, M: Model> {
    pub(crate) model: &'a mut M,
    pub(crate) matcher: Matcher<'a, M>,
    pub(crate) mutable_fields: MutableFields,
    pub(crate) not_found_is_error: bool,
    pub(crate) bulk: bool,
    pub(crate) results: Vec<M>,
    pub(crate) on_resolved: Option<OnResolved<'a, M>>,
}

impl<'a, M: Model> OperationModel<'a, M> {
    pub fn new(model: &'a mut M) -> Self {
        Self {
            model,
            matcher: Matcher::Equivalent,
            mutable_fields: MutableFields::AllNonDefault,
            not_found_is_error: false,
            bulk: false,
            results: Vec::new(),
            on_resolved: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&M) -> bool + 'a) -> Self {
        self.matcher = Matcher::Predicate(Box::new(predicate));
        self
    }

    pub fn with_mutable_fields(mut self, fields: MutableFields) -> Self {
        self.mutable_fields = fields;
        self
    }

    pub fn not_found_is_error(mut self, not_found_is_error: bool) -> Self {
        self.not_found_is_error = not_found_is_error;
        self
    }

    pub fn bulk(mut self, bulk: bool) -> Self {
        self.bulk = bulk;
        self
    }

    /// Runs once the descriptor resolved to at least one cached record.
    pub fn on_resolved(mut self, f: impl FnOnce(&M, &[M]) + 'a) -> Self {
        self.on_resolved = Some(Box::new(f));
        self
    }

    pub fn model(&self) -> &M {
        &*self.model
    }

    /// Cached records this descriptor resolved to, in cache order.
    pub fn results(&self) -> &[M] {
        &self.results
    }

    pub fn into_results(self) -> Vec<M> {
        self.results
    }

    pub(crate) fn matches(&self, existing: &M) -> bool {
        match &self.matcher {
            Matcher::Equivalent => existing.is_equivalent(&*self.model),
            Matcher::Predicate(predicate) => predicate(existing),
        }
    }

    pub(crate) fn resolve(&mut self, cached: &[M]) {
        let results: Vec<M> = cached.iter().filter(|m| self.matches(m)).cloned().collect();
        self.results = results;
        if !self.results.is_empty()
            && let Some(callback) = self.on_resolved.take()
        {
            callback(&*self.model, &self.results);
        }
    }
}

impl<M: Model> fmt::Debug for OperationModel<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationModel")
            .field("model", &self.model)
            .field("matcher", &self.matcher)
            .field("mutable_fields", &self.mutable_fields)
            .field("not_found_is_error", &self.not_found_is_error)
            .field("bulk", &self.bulk)
            .field("results", &self.results.len())
            .finish()
    }
}
