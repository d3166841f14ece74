//! Apply the resource graph to the database: schema, one table per resource type, and join tables.
//! Idempotent (IF NOT EXISTS everywhere); existing tables are left as they are.

use crate::config::{ForeignKey, IdType, ResourceGraph, ResourceType};
use crate::error::AppError;
use crate::sql::{id_cast, qualified_table, quoted};
use sqlx::PgPool;
use std::collections::BTreeMap;

fn id_column_def(resource_type: &ResourceType) -> String {
    let ty = match resource_type.id_type {
        IdType::Int => "BIGSERIAL",
        IdType::Uuid => "UUID DEFAULT gen_random_uuid()",
        IdType::Text => "TEXT",
    };
    format!("{} {} PRIMARY KEY", quoted(&resource_type.id_column), ty)
}

/// Column definitions per table, keyed by table name. Foreign-key columns are added to whichever
/// table stores them; a column declared twice (e.g. by both sides of a relationship) is defined once.
fn table_columns(graph: &ResourceGraph) -> Result<BTreeMap<String, Vec<(String, String)>>, AppError> {
    let mut tables: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    let mut push = |table: &str, column: &str, def: String| {
        let cols = tables.entry(table.to_string()).or_default();
        if !cols.iter().any(|(c, _)| c == column) {
            cols.push((column.to_string(), def));
        }
    };
    for r in &graph.resources {
        push(&r.table_name, &r.id_column, id_column_def(r));
        for a in &r.attributes {
            let mut def = format!("{} {}", quoted(&a.column), a.pg_type.as_deref().unwrap_or("TEXT"));
            if !a.nullable {
                def.push_str(" NOT NULL");
            }
            push(&r.table_name, &a.column, def);
        }
    }
    for r in &graph.resources {
        for rel in &r.relationships {
            let right = graph.require(&rel.right)?;
            match &rel.foreign_key {
                ForeignKey::Local(col) => push(&r.table_name, col, format!("{} {}", quoted(col), id_cast(right.id_type))),
                ForeignKey::Remote(col) => push(&right.table_name, col, format!("{} {}", quoted(col), id_cast(r.id_type))),
                ForeignKey::Join { .. } => {}
            }
        }
    }
    Ok(tables)
}

/// CREATE SCHEMA and CREATE TABLE for every declared resource and join table.
pub async fn ensure_tables(pool: &PgPool, graph: &ResourceGraph) -> Result<(), AppError> {
    let Some(schema) = graph.resources.first().map(|r| r.schema_name.clone()) else {
        return Ok(());
    };
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&schema)))
        .execute(pool)
        .await?;

    for (table, cols) in table_columns(graph)? {
        let mut col_defs: Vec<String> = cols.into_iter().map(|(_, def)| def).collect();
        for (name, def_suffix) in [
            ("created_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
            ("updated_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
        ] {
            col_defs.push(format!("{} {}", quoted(name), def_suffix));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            qualified_table(&schema, &table),
            col_defs.join(",\n  ")
        );
        tracing::debug!(sql = %sql, "ensure table");
        sqlx::query(&sql).execute(pool).await?;
    }

    for r in &graph.resources {
        for rel in &r.relationships {
            let ForeignKey::Join {
                table,
                left_column,
                right_column,
            } = &rel.foreign_key
            else {
                continue;
            };
            let right = graph.require(&rel.right)?;
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} {} NOT NULL,\n  {} {} NOT NULL,\n  PRIMARY KEY ({}, {})\n)",
                qualified_table(&schema, table),
                quoted(left_column),
                id_cast(r.id_type),
                quoted(right_column),
                id_cast(right.id_type),
                quoted(left_column),
                quoted(right_column)
            );
            tracing::debug!(sql = %sql, "ensure join table");
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    tracing::info!(resources = graph.resources.len(), schema = %schema, "database tables ensured");
    Ok(())
}
