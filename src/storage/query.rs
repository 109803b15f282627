use super::context::MemoryContext;
use super::memory::StoredRow;
use crate::core::value::{compare, set_path};
use crate::core::{PersistenceError, Result};
use crate::evaluator::{Evaluator, RowScope};
use crate::interface::{NativeQuery, PersistenceContext};
use crate::parser::ast::{
    Condition, DeleteStmt, EntityRef, OrderByExpr, Projection, SelectStmt, Statement, UpdateStmt,
};
use crate::transaction::Change;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A parsed statement bound to the context that created it
pub struct MemoryQuery<'c> {
    context: &'c mut MemoryContext,
    statement: Statement,
    declared: Vec<String>,
    parameters: HashMap<String, Value>,
    first_result: usize,
    max_results: Option<usize>,
}

impl<'c> MemoryQuery<'c> {
    pub(crate) fn new(context: &'c mut MemoryContext, statement: Statement) -> Self {
        let declared = statement.parameters();
        Self {
            context,
            statement,
            declared,
            parameters: HashMap::new(),
            first_result: 0,
            max_results: None,
        }
    }

    fn check_bound(&self) -> Result<()> {
        match self
            .declared
            .iter()
            .find(|name| !self.parameters.contains_key(*name))
        {
            Some(name) => Err(PersistenceError::QueryError(format!(
                "No value bound for parameter :{}",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Rows of the target entity that satisfy the filter, in storage order
    fn matching_rows(
        &self,
        from: &EntityRef,
        filter: Option<&Condition>,
    ) -> Result<Vec<StoredRow>> {
        let evaluator = Evaluator::new(&self.parameters);
        let mut matched = Vec::new();
        for row in self.context.rows(&from.entity)? {
            let keep = match filter {
                Some(condition) => evaluator.matches(condition, scope(from, &row.record))?,
                None => true,
            };
            if keep {
                matched.push(row);
            }
        }
        Ok(matched)
    }

    fn select(&self, stmt: &SelectStmt) -> Result<Vec<Value>> {
        let mut rows = self.matching_rows(&stmt.from, stmt.filter.as_ref())?;
        if !stmt.order_by.is_empty() {
            rows = self.sort(&stmt.from, &stmt.order_by, rows)?;
        }

        let evaluator = Evaluator::new(&self.parameters);
        let projected = match &stmt.projection {
            Projection::Count(alias) => {
                check_alias(&stmt.from, alias)?;
                vec![Value::from(rows.len() as u64)]
            }
            Projection::Entity(alias) => {
                check_alias(&stmt.from, alias)?;
                rows.into_iter().map(|row| row.record).collect()
            }
            Projection::Path(path) => rows
                .iter()
                .map(|row| evaluator.resolve(path, scope(&stmt.from, &row.record)).cloned())
                .collect::<Result<Vec<_>>>()?,
        };

        let page = projected.into_iter().skip(self.first_result);
        Ok(match self.max_results {
            Some(max) => page.take(max).collect(),
            None => page.collect(),
        })
    }

    fn sort(
        &self,
        from: &EntityRef,
        order_by: &[OrderByExpr],
        rows: Vec<StoredRow>,
    ) -> Result<Vec<StoredRow>> {
        let evaluator = Evaluator::new(&self.parameters);

        // Resolve sort keys up front so a bad path fails the query instead of the comparator.
        let mut keyed = rows
            .into_iter()
            .map(|row| -> Result<(Vec<Value>, StoredRow)> {
                let keys = order_by
                    .iter()
                    .map(|item| evaluator.resolve(&item.path, scope(from, &row.record)).cloned())
                    .collect::<Result<Vec<_>>>()?;
                Ok((keys, row))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut failure = None;
        keyed.sort_by(|(left, _), (right, _)| {
            for (index, item) in order_by.iter().enumerate() {
                let ordering = match compare(&left[index], &right[index]) {
                    Ok(ordering) => ordering,
                    Err(err) => {
                        failure.get_or_insert(err);
                        Ordering::Equal
                    }
                };
                let ordering = if item.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(keyed.into_iter().map(|(_, row)| row).collect()),
        }
    }

    fn update(&mut self, stmt: &UpdateStmt) -> Result<u64> {
        let rows = self.matching_rows(&stmt.from, stmt.filter.as_ref())?;

        let mut changes = Vec::with_capacity(rows.len());
        {
            let evaluator = Evaluator::new(&self.parameters);
            for row in rows {
                // Validate paths against the row now so a bad assignment fails the statement.
                let mut record = row.record.clone();
                let mut assignments = Vec::with_capacity(stmt.assignments.len());
                for assignment in &stmt.assignments {
                    check_alias(&stmt.from, &assignment.path.alias)?;
                    // Right-hand sides see the row as it was before the statement.
                    let value = evaluator.operand(&assignment.value, scope(&stmt.from, &row.record))?;
                    set_path(&mut record, &assignment.path.fields, value.clone())?;
                    assignments.push((assignment.path.fields.clone(), value));
                }
                changes.push(Change::Update {
                    entity: stmt.from.entity.clone(),
                    key: row.key,
                    assignments,
                });
            }
        }

        let affected = changes.len() as u64;
        for change in changes {
            self.context.record("update", change)?;
        }
        Ok(affected)
    }

    fn delete(&mut self, stmt: &DeleteStmt) -> Result<u64> {
        let rows = self.matching_rows(&stmt.from, stmt.filter.as_ref())?;
        let affected = rows.len() as u64;
        for row in rows {
            self.context.record(
                "delete",
                Change::Delete {
                    entity: stmt.from.entity.clone(),
                    key: row.key,
                },
            )?;
        }
        Ok(affected)
    }
}

impl NativeQuery for MemoryQuery<'_> {
    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()> {
        if !self.declared.iter().any(|declared| declared == name) {
            return Err(PersistenceError::QueryError(format!(
                "Query has no parameter named :{}",
                name
            )));
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn set_first_result(&mut self, start: usize) -> Result<()> {
        self.first_result = start;
        Ok(())
    }

    fn set_max_results(&mut self, max: usize) -> Result<()> {
        self.max_results = Some(max);
        Ok(())
    }

    fn result_list(&mut self) -> Result<Vec<Value>> {
        self.check_bound()?;
        match &self.statement {
            Statement::Select(stmt) => self.select(stmt),
            _ => Err(PersistenceError::QueryError(
                "result_list requires a select statement".into(),
            )),
        }
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.check_bound()?;
        if !self.context.is_transaction_active() {
            return Err(PersistenceError::TransactionRequired(
                "execute_update requires an active transaction".into(),
            ));
        }

        // The statement is cloned so the context can be borrowed mutably while applying it.
        match self.statement.clone() {
            Statement::Update(stmt) => self.update(&stmt),
            Statement::Delete(stmt) => self.delete(&stmt),
            Statement::Select(_) => Err(PersistenceError::QueryError(
                "execute_update requires an update or delete statement".into(),
            )),
        }
    }
}

fn scope<'a>(from: &'a EntityRef, record: &'a Value) -> RowScope<'a> {
    RowScope {
        alias: &from.alias,
        record,
    }
}

fn check_alias(from: &EntityRef, alias: &str) -> Result<()> {
    if from.alias == alias {
        Ok(())
    } else {
        Err(PersistenceError::QueryError(format!(
            "Unknown identification variable '{}'",
            alias
        )))
    }
}
