use db_api::TableModel;
use model::Value;

/// Resolves a record's primary-key value. Supplied by the caller because
/// `M` is an opaque record type to the core — only the caller (or the
/// wrapped engines) knows how to project a field out of it.
pub trait KeyExtractor<M: TableModel>: Send + Sync {
    /// Returns `None` when the record has no id (spec §4.3 step 4d: "if
    /// null, raise per-row error").
    fn extract(&self, model: &M) -> Option<Value>;
}

/// A [`KeyExtractor`] built from a plain closure.
pub struct FnKeyExtractor<M, F> {
    f: F,
    _marker: std::marker::PhantomData<fn(&M)>,
}

impl<M, F: Clone> Clone for FnKeyExtractor<M, F> {
    fn clone(&self) -> Self {
        FnKeyExtractor {
            f: self.f.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<M, F> FnKeyExtractor<M, F>
where
    M: TableModel,
    F: Fn(&M) -> Option<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnKeyExtractor {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<M, F> KeyExtractor<M> for FnKeyExtractor<M, F>
where
    M: TableModel,
    F: Fn(&M) -> Option<Value> + Send + Sync,
{
    fn extract(&self, model: &M) -> Option<Value> {
        (self.f)(model)
    }
}
