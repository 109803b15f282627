use crate::connection::ContextExecutor;
use crate::core::{PersistenceError, Result, decode};
use crate::interface::{NativeQuery, PersistenceContext};
use crate::reactive::{AsyncResult, AsyncStream};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Captured query state, replayed onto a fresh provider query on every execution
#[derive(Debug, Clone)]
pub(crate) struct QuerySpec {
    ql: Arc<str>,
    /// In order of first assignment; re-setting a name overwrites in place
    parameters: Vec<(String, Value)>,
    first_result: Option<usize>,
    max_results: Option<usize>,
    /// First parameter that failed to serialize, reported on execution
    deferred_error: Option<PersistenceError>,
}

impl QuerySpec {
    fn new(ql: &str) -> Self {
        Self {
            ql: Arc::from(ql),
            parameters: Vec::new(),
            first_result: None,
            max_results: None,
            deferred_error: None,
        }
    }

    fn set_parameter<V: Serialize>(&mut self, name: &str, value: V) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                self.deferred_error.get_or_insert(PersistenceError::Serialization(format!(
                    "parameter :{}: {}",
                    name, err
                )));
                return;
            }
        };

        match self.parameters.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.parameters.push((name.to_string(), value)),
        }
    }

    /// Zero means "no paging", as for a query that never set it
    fn set_first_result(&mut self, start: usize) {
        self.first_result = (start > 0).then_some(start);
    }

    fn set_max_results(&mut self, max: usize) {
        self.max_results = (max > 0).then_some(max);
    }

    /// Create the provider query on `context` and apply parameters and paging
    fn prepare<'c>(
        &self,
        context: &'c mut dyn PersistenceContext,
    ) -> Result<Box<dyn NativeQuery + 'c>> {
        if let Some(err) = &self.deferred_error {
            return Err(err.clone());
        }

        let mut query = context.create_query(&self.ql)?;
        for (name, value) in &self.parameters {
            query.set_parameter(name, value.clone())?;
        }
        if let Some(start) = self.first_result {
            query.set_first_result(start)?;
        }
        if let Some(max) = self.max_results {
            query.set_max_results(max)?;
        }
        debug!(ql = %self.ql, parameters = self.parameters.len(), "prepared query");
        Ok(query)
    }

    fn result_list<T>(&self, executor: &ContextExecutor) -> AsyncStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let spec = self.clone();
        executor.execute_many(move |context| {
            spec.prepare(context)?
                .result_list()?
                .into_iter()
                .map(decode::<T>)
                .collect()
        })
    }

    fn single_result<T>(&self, executor: &ContextExecutor) -> AsyncResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let spec = self.clone();
        executor.execute(move |context| {
            spec.prepare(context)?
                .single_result()?
                .map(decode::<T>)
                .transpose()
        })
    }

    fn execute_update(&self, executor: &ContextExecutor) -> AsyncResult<u64> {
        let spec = self.clone();
        executor.execute(move |context| spec.prepare(context)?.execute_update().map(Some))
    }
}

/// A query whose results decode into `T`
///
/// Setters only record state. Each terminal operation returns a cold handle that executes the
/// query once per subscription on the bridge's blocking scheduler.
pub struct ReactiveTypedQuery<T> {
    executor: ContextExecutor,
    spec: QuerySpec,
    _result: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> ReactiveTypedQuery<T> {
    pub(crate) fn new(executor: ContextExecutor, ql: &str) -> Self {
        Self {
            executor,
            spec: QuerySpec::new(ql),
            _result: PhantomData,
        }
    }

    /// Bind a named parameter (`:name`). Setting a name again replaces its value.
    ///
    /// A value that cannot be serialized fails the terminal operation, not this call.
    pub fn set_parameter<V: Serialize>(mut self, name: &str, value: V) -> Self {
        self.spec.set_parameter(name, value);
        self
    }

    /// Skip the first `start` results
    pub fn set_first_result(mut self, start: usize) -> Self {
        self.spec.set_first_result(start);
        self
    }

    /// Return at most `max` results
    pub fn set_max_results(mut self, max: usize) -> Self {
        self.spec.set_max_results(max);
        self
    }

    /// Every result in provider order
    pub fn result_list(&self) -> AsyncStream<T> {
        self.spec.result_list(&self.executor)
    }

    /// The only result; empty when there is none, NonUniqueResult when there are several
    pub fn single_result(&self) -> AsyncResult<T> {
        self.spec.single_result(&self.executor)
    }
}

impl<T> Clone for ReactiveTypedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            spec: self.spec.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ReactiveTypedQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveTypedQuery")
            .field("ql", &self.spec.ql)
            .field("result", &std::any::type_name::<T>())
            .finish()
    }
}

/// A query whose result type is chosen at the terminal operation
///
/// Also the way to run bulk `update`/`delete` statements.
#[derive(Clone)]
pub struct ReactiveQuery {
    executor: ContextExecutor,
    spec: QuerySpec,
}

impl ReactiveQuery {
    pub(crate) fn new(executor: ContextExecutor, ql: &str) -> Self {
        Self {
            executor,
            spec: QuerySpec::new(ql),
        }
    }

    pub fn set_parameter<V: Serialize>(mut self, name: &str, value: V) -> Self {
        self.spec.set_parameter(name, value);
        self
    }

    pub fn set_first_result(mut self, start: usize) -> Self {
        self.spec.set_first_result(start);
        self
    }

    pub fn set_max_results(mut self, max: usize) -> Self {
        self.spec.set_max_results(max);
        self
    }

    pub fn get_result_list<T>(&self) -> AsyncStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.spec.result_list(&self.executor)
    }

    pub fn get_single_result<T>(&self) -> AsyncResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.spec.single_result(&self.executor)
    }

    /// Run an update or delete statement and emit the number of affected rows.
    ///
    /// Runs in the unit of work's transaction, so the change is committed before the count is
    /// delivered.
    pub fn execute_update(&self) -> AsyncResult<u64> {
        self.spec.execute_update(&self.executor)
    }

    /// Fix the result type, keeping parameters and paging
    pub fn typed<T: DeserializeOwned + Send + 'static>(self) -> ReactiveTypedQuery<T> {
        ReactiveTypedQuery {
            executor: self.executor,
            spec: self.spec,
            _result: PhantomData,
        }
    }
}

impl std::fmt::Debug for ReactiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveQuery")
            .field("ql", &self.spec.ql)
            .field("parameters", &self.spec.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameters_overwrite_in_place() {
        let mut spec = QuerySpec::new("select b from Book b where b.a = :a and b.b = :b");
        spec.set_parameter("a", 1);
        spec.set_parameter("b", "x");
        spec.set_parameter("a", 2);

        assert_eq!(
            spec.parameters,
            vec![("a".to_string(), json!(2)), ("b".to_string(), json!("x"))]
        );
    }

    #[test]
    fn test_zero_paging_is_unset() {
        let mut spec = QuerySpec::new("select b from Book b");
        spec.set_first_result(0);
        spec.set_max_results(0);
        assert_eq!(spec.first_result, None);
        assert_eq!(spec.max_results, None);

        spec.set_first_result(5);
        spec.set_max_results(10);
        assert_eq!(spec.first_result, Some(5));
        assert_eq!(spec.max_results, Some(10));
    }

    #[test]
    fn test_unserializable_parameter_is_deferred() {
        use std::collections::HashMap;

        // JSON object keys must be strings
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);

        let mut spec = QuerySpec::new("select b from Book b where b.a = :a");
        spec.set_parameter("a", bad);
        assert!(spec.parameters.is_empty());
        assert!(matches!(
            spec.deferred_error,
            Some(PersistenceError::Serialization(_))
        ));
    }
}
