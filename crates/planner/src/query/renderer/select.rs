use crate::query::{
    ast::{
        common::{JoinKind, OrderDir, TableRef},
        select::{FromClause, JoinClause, OrderByExpr, Select},
    },
    renderer::{Render, Renderer},
};

impl Render for Select {
    fn render(&self, r: &mut Renderer) {
        // 1. SELECT clause
        r.sql.push_str("SELECT ");
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            col.render(r);
        }

        // 2. FROM
        if let Some(from) = &self.from {
            r.sql.push(' ');
            from.render(r);
        }

        // 3. JOIN
        for join in &self.joins {
            r.sql.push(' ');
            join.render(r);
        }

        // 4. WHERE
        if let Some(where_clause) = &self.where_clause {
            r.sql.push_str(" WHERE ");
            where_clause.render(r);
        }

        // 5. ORDER BY
        if !self.order_by.is_empty() {
            r.sql.push_str(" ORDER BY ");
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    r.sql.push_str(", ");
                }
                order.render(r);
            }
        }

        // 6. LIMIT
        if let Some(limit) = &self.limit {
            r.sql.push_str(" LIMIT ");
            limit.render(r);
        }

        // 7. OFFSET
        if let Some(offset) = &self.offset {
            r.sql.push_str(" OFFSET ");
            offset.render(r);
        }
    }
}

fn render_table(r: &mut Renderer, table: &TableRef, alias: &Option<String>) {
    if let Some(schema) = &table.schema {
        r.sql.push_str(&r.dialect.quote_identifier(schema));
        r.sql.push('.');
    }
    r.sql.push_str(&r.dialect.quote_identifier(&table.name));
    if let Some(alias) = alias {
        r.sql.push_str(" AS ");
        r.sql.push_str(&r.dialect.quote_identifier(alias));
    }
}

impl Render for FromClause {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("FROM ");
        render_table(r, &self.table, &self.alias);
    }
}

impl Render for JoinClause {
    fn render(&self, r: &mut Renderer) {
        let join_str = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        r.sql.push_str(&format!("{join_str} "));
        render_table(r, &self.table, &self.alias);
        r.sql.push_str(" ON ");
        self.on.render(r);
    }
}

impl Render for OrderByExpr {
    fn render(&self, r: &mut Renderer) {
        self.expr.render(r);
        if let Some(dir) = &self.direction {
            let dir_str = match dir {
                OrderDir::Asc => "ASC",
                OrderDir::Desc => "DESC",
            };
            r.sql.push(' ');
            r.sql.push_str(dir_str);
        }
    }
}

#[cfg(test)]
mod tests {
    use model::core::value::Value;

    use crate::{
        query::{
            ast::{
                common::{JoinKind, OrderDir},
                expr::{BinaryOperator, Expr},
                select::{FromClause, JoinClause, OrderByExpr, Select},
            },
            dialect::{MySql, Postgres},
            renderer::{Render, Renderer},
        },
        table_ref,
    };

    #[test]
    fn test_simple_select_mysql() {
        let ast = Select {
            columns: vec![Expr::column("t0", "id").aliased("c0")],
            from: Some(FromClause {
                table: table_ref!("users"),
                alias: Some("t0".to_string()),
            }),
            where_clause: Some(Expr::eq(
                Expr::column("t0", "name"),
                Expr::Value(Value::String("abc".to_string())),
            )),
            ..Default::default()
        };

        let dialect = MySql;
        let mut renderer = Renderer::new(&dialect);
        ast.render(&mut renderer);
        let (sql, params) = renderer.finish();

        assert_eq!(
            sql,
            "SELECT `t0`.`id` AS `c0` FROM `users` AS `t0` WHERE (`t0`.`name` = ?)"
        );
        assert_eq!(params, vec![Value::String("abc".to_string())]);
    }

    #[test]
    fn test_joined_select_postgres() {
        let bindings = vec![
            Value::String("hidden".to_string()),
            Value::Int(10),
            Value::Int(20),
        ];
        let ast = Select {
            columns: vec![
                Expr::column("t0", "id").aliased("c0"),
                Expr::column("t1", "name").aliased("c1"),
            ],
            from: Some(FromClause {
                table: table_ref!("articles"),
                alias: Some("t0".to_string()),
            }),
            joins: vec![JoinClause {
                kind: JoinKind::Left,
                table: table_ref!("authors"),
                alias: Some("t1".to_string()),
                on: Expr::eq(Expr::column("t0", "author_id"), Expr::column("t1", "id")),
            }],
            where_clause: Some(Expr::binary(
                Expr::column("t0", "status"),
                BinaryOperator::NotEq,
                Expr::Param(0),
            )),
            order_by: vec![OrderByExpr {
                expr: Expr::column("t0", "created_at"),
                direction: Some(OrderDir::Desc),
            }],
            limit: Some(Expr::Param(1)),
            offset: Some(Expr::Param(2)),
        };

        let dialect = Postgres;
        let mut renderer = Renderer::with_bindings(&dialect, &bindings);
        ast.render(&mut renderer);
        let (sql, params) = renderer.finish();

        let expected_sql = r#"SELECT "t0"."id" AS "c0", "t1"."name" AS "c1" FROM "articles" AS "t0" LEFT JOIN "authors" AS "t1" ON ("t0"."author_id" = "t1"."id") WHERE ("t0"."status" <> $1) ORDER BY "t0"."created_at" DESC LIMIT $2 OFFSET $3"#;
        assert_eq!(sql, expected_sql);
        assert_eq!(params, bindings);
    }
}
