use crate::query::{
    ast::expr::{BinaryOp, BinaryOperator, Expr, FunctionCall, Ident},
    renderer::{Render, Renderer},
};

impl Render for Expr {
    fn render(&self, r: &mut Renderer) {
        match self {
            Expr::Identifier(ident) => ident.render(r),
            Expr::Value(val) => r.add_param(val.clone()),
            Expr::Param(index) => r.add_binding(*index),
            Expr::Boolean(true) => r.sql.push_str("TRUE"),
            Expr::Boolean(false) => r.sql.push_str("FALSE"),
            Expr::BinaryOp(op) => op.render(r),
            Expr::FunctionCall(func) => func.render(r),
            Expr::Alias { expr, alias } => {
                expr.render(r);
                r.sql.push_str(" AS ");
                r.sql.push_str(&r.dialect.quote_identifier(alias));
            }
            Expr::Not(inner) => {
                r.sql.push_str("(NOT ");
                inner.render(r);
                r.sql.push(')');
            }
            Expr::IsNull { expr, negated } => {
                r.sql.push('(');
                expr.render(r);
                r.sql
                    .push_str(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                r.sql.push('(');
                expr.render(r);
                r.sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        r.sql.push_str(", ");
                    }
                    item.render(r);
                }
                r.sql.push_str("))");
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                r.sql.push('(');
                expr.render(r);
                r.sql
                    .push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                low.render(r);
                r.sql.push_str(" AND ");
                high.render(r);
                r.sql.push(')');
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => render_like(r, expr, pattern, *case_insensitive, *negated),
            Expr::JsonPath { expr, path } => {
                let inner = r.capture(&**expr);
                let sql = r.dialect.json_extract(&inner, path);
                r.sql.push_str(&sql);
            }
            Expr::JsonLength(expr) => {
                let inner = r.capture(&**expr);
                let sql = r.dialect.json_array_length(&inner);
                r.sql.push_str(&sql);
            }
            Expr::DatePart { part, expr } => {
                let inner = r.capture(&**expr);
                let sql = r.dialect.date_part(*part, &inner);
                r.sql.push_str(&sql);
            }
            Expr::Intersects {
                expr,
                geometry,
                bbox,
            } => {
                let inner = r.capture(&**expr);
                let geometry = r.capture(&**geometry);
                let sql = r.dialect.intersects(&inner, &geometry, *bbox);
                r.sql.push_str(&sql);
            }
            Expr::Flag(condition) => {
                r.sql.push_str("CASE WHEN ");
                condition.render(r);
                r.sql.push_str(" THEN TRUE ELSE FALSE END");
            }
            Expr::Exists { select, negated } => {
                if *negated {
                    r.sql.push_str("NOT ");
                }
                r.sql.push_str("EXISTS (");
                select.render(r);
                r.sql.push(')');
            }
        }
    }
}

fn render_like(r: &mut Renderer, expr: &Expr, pattern: &Expr, case_insensitive: bool, negated: bool) {
    let not = if negated { "NOT " } else { "" };
    r.sql.push('(');
    match (case_insensitive, r.dialect.ilike_keyword()) {
        (true, Some(keyword)) => {
            expr.render(r);
            r.sql.push_str(&format!(" {not}{keyword} "));
            pattern.render(r);
        }
        (true, None) => {
            r.sql.push_str("LOWER(");
            expr.render(r);
            r.sql.push_str(&format!(") {not}LIKE LOWER("));
            pattern.render(r);
            r.sql.push(')');
        }
        (false, _) => {
            expr.render(r);
            r.sql.push_str(&format!(" {not}LIKE "));
            pattern.render(r);
        }
    }
    r.sql.push_str(r.dialect.like_escape_clause());
    r.sql.push(')');
}

impl Render for Ident {
    fn render(&self, r: &mut Renderer) {
        if let Some(qualifier) = &self.qualifier {
            r.sql.push_str(&r.dialect.quote_identifier(qualifier));
            r.sql.push('.');
        }
        r.sql.push_str(&r.dialect.quote_identifier(&self.name));
    }
}

impl Render for BinaryOp {
    fn render(&self, r: &mut Renderer) {
        r.sql.push('(');
        self.left.render(r);

        let op_str = match self.op {
            BinaryOperator::Eq => " = ",
            BinaryOperator::NotEq => " <> ",
            BinaryOperator::Lt => " < ",
            BinaryOperator::LtEq => " <= ",
            BinaryOperator::Gt => " > ",
            BinaryOperator::GtEq => " >= ",
            BinaryOperator::And => " AND ",
            BinaryOperator::Or => " OR ",
        };
        r.sql.push_str(op_str);

        self.right.render(r);
        r.sql.push(')');
    }
}

impl Render for FunctionCall {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(&self.name);
        r.sql.push('(');
        if self.wildcard {
            r.sql.push('*');
        } else {
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    r.sql.push_str(", ");
                }
                arg.render(r);
            }
        }
        r.sql.push(')');
    }
}
