//! Defines the core rendering trait and context for converting AST to SQL.

use model::core::value::Value;

use crate::query::dialect::Dialect;

pub mod expr;
pub mod select;

/// A trait for any AST node that can be rendered into a SQL string.
pub trait Render {
    fn render(&self, renderer: &mut Renderer);
}

/// A context that holds the state during the rendering process.
///
/// It accumulates the SQL string and the parameters in placeholder order,
/// resolving `Expr::Param` references against `bindings`.
pub struct Renderer<'a> {
    pub sql: String,
    pub params: Vec<Value>,
    pub dialect: &'a dyn Dialect,
    bindings: &'a [Value],
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self::with_bindings(dialect, &[])
    }

    pub fn with_bindings(dialect: &'a dyn Dialect, bindings: &'a [Value]) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            dialect,
            bindings,
        }
    }

    /// Consumes the renderer and returns the final SQL string and parameters.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    pub fn add_param(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.get_placeholder(self.params.len() - 1);
        self.sql.push_str(&placeholder);
    }

    pub fn add_binding(&mut self, index: usize) {
        let value = self.bindings.get(index).cloned().unwrap_or(Value::Null);
        self.add_param(value);
    }

    /// Renders `node` into a detached buffer, keeping parameter order.
    pub fn capture(&mut self, node: &dyn Render) -> String {
        let outer = std::mem::take(&mut self.sql);
        node.render(self);
        std::mem::replace(&mut self.sql, outer)
    }
}

/// Renders a whole statement into `(sql, params)`.
pub fn render_with(dialect: &dyn Dialect, bindings: &[Value], node: &dyn Render) -> (String, Vec<Value>) {
    let mut renderer = Renderer::with_bindings(dialect, bindings);
    node.render(&mut renderer);
    renderer.finish()
}
