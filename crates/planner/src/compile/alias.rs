//! Collision-free aliases and parameter slots for one compiled query.

use crate::query::ast::expr::Expr;
use model::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexable {
    Column(usize),
    Table(usize),
}

/// Counter state scoped to a single compilation. Indices are handed out in
/// traversal order and never reused, so the same tree always yields the same
/// aliases.
#[derive(Debug, Default)]
pub struct IndexGenerator {
    columns: usize,
    tables: usize,
    parameters: Vec<Value>,
}

impl IndexGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_column_index(&mut self) -> usize {
        let index = self.columns;
        self.columns += 1;
        index
    }

    pub fn next_table_index(&mut self) -> usize {
        let index = self.tables;
        self.tables += 1;
        index
    }

    pub fn alias_for(indexable: Indexable) -> String {
        match indexable {
            Indexable::Column(index) => format!("c{index}"),
            Indexable::Table(index) => format!("t{index}"),
        }
    }

    pub fn column_alias(&mut self) -> String {
        Self::alias_for(Indexable::Column(self.next_column_index()))
    }

    pub fn table_alias(&mut self) -> String {
        Self::alias_for(Indexable::Table(self.next_table_index()))
    }

    /// Stores `value` in the next parameter slot and returns a reference to it.
    pub fn bind(&mut self, value: Value) -> Expr {
        self.parameters.push(value);
        Expr::Param(self.parameters.len() - 1)
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn into_parameters(self) -> Vec<Value> {
        self.parameters
    }
}
