//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for resolved resource types.

use crate::config::{IdType, ResourceType};
use serde_json::Value;

/// Alias of the extra link column selected by [`select_where_in`].
pub const LINK_ALIAS: &str = "__link";

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// SQL type used to compare and bind ids of this kind.
pub fn id_cast(id_type: IdType) -> &'static str {
    match id_type {
        IdType::Int => "bigint",
        IdType::Uuid => "uuid",
        IdType::Text => "text",
    }
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Placeholder for `v`, cast when the column type is known. Untyped nulls are inlined.
    fn placeholder(&mut self, v: Value, cast: Option<&str>) -> String {
        if v.is_null() && cast.is_none() {
            return "NULL".to_string();
        }
        let n = self.push_param(v);
        match cast {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

/// Column to write and its value, with the SQL type to cast to.
pub struct ColumnValue<'a> {
    pub column: &'a str,
    pub value: Value,
    pub cast: Option<&'a str>,
}

fn column_expr(name: &str, pg_type: Option<&str>) -> String {
    let q = quoted(name);
    let pg_type = pg_type.unwrap_or("");
    if pg_type.contains('.') || pg_type == "numeric" {
        format!("{}::text AS {}", q, q)
    } else {
        q
    }
}

/// SELECT list: id, attributes, and foreign-key columns stored on this table.
/// Custom enum (schema.typename) and numeric columns are read as text.
pub fn select_column_list(resource_type: &ResourceType) -> String {
    let mut cols = vec![format!("{}::text AS {}", quoted(&resource_type.id_column), quoted(&resource_type.id_column))];
    cols.extend(
        resource_type
            .attributes
            .iter()
            .map(|a| column_expr(&a.column, a.pg_type.as_deref())),
    );
    for column in local_key_columns(resource_type) {
        cols.push(format!("{}::text AS {}", quoted(column), quoted(column)));
    }
    cols.join(", ")
}

/// Foreign-key columns declared on this resource's own table.
pub fn local_key_columns(resource_type: &ResourceType) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for rel in &resource_type.relationships {
        if let crate::config::ForeignKey::Local(col) = &rel.foreign_key {
            if !out.contains(&col.as_str()) {
                out.push(col);
            }
        }
    }
    out
}

/// SELECT all rows ordered by id.
pub fn select_list(resource_type: &ResourceType) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&resource_type.schema_name, &resource_type.table_name);
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {}.{}",
        select_column_list(resource_type),
        table,
        table,
        quoted(&resource_type.id_column)
    );
    q
}

/// SELECT rows where `column IN (values)`, ordered by id. With `link`, that column is also
/// selected as [`LINK_ALIAS`] (for foreign keys this resource does not declare itself).
pub fn select_where_in(
    resource_type: &ResourceType,
    column: &str,
    cast: &str,
    values: &[String],
    link: bool,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&resource_type.schema_name, &resource_type.table_name);
    let mut cols = select_column_list(resource_type);
    if link {
        cols.push_str(&format!(", {}::text AS {}", quoted(column), quoted(LINK_ALIAS)));
    }
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, table);
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| q.placeholder(Value::String(v.clone()), Some(cast)))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}.{} IN ({}) ORDER BY {}.{}",
        cols,
        table,
        table,
        quoted(column),
        placeholders.join(", "),
        table,
        quoted(&resource_type.id_column)
    );
    q
}

/// SELECT DISTINCT `select_column` (as text) FROM any table WHERE `where_column IN (values)`.
pub fn select_column_where_in(
    schema: &str,
    table: &str,
    select_column: &str,
    where_column: &str,
    cast: &str,
    values: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, table);
    if values.is_empty() {
        q.sql = format!("SELECT NULL::text AS {} WHERE 1 = 0", quoted(LINK_ALIAS));
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| q.placeholder(Value::String(v.clone()), Some(cast)))
        .collect();
    q.sql = format!(
        "SELECT DISTINCT {}::text AS {} FROM {} WHERE {} IN ({}) AND {} IS NOT NULL",
        quoted(select_column),
        quoted(LINK_ALIAS),
        table,
        quoted(where_column),
        placeholders.join(", "),
        quoted(select_column)
    );
    q
}

/// SELECT both columns of a join table for rows whose `where_column` is in `values`.
pub fn select_join_rows(
    schema: &str,
    table: &str,
    left_column: &str,
    right_column: &str,
    cast: &str,
    values: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| q.placeholder(Value::String(v.clone()), Some(cast)))
        .collect();
    let filter = if placeholders.is_empty() {
        "1 = 0".to_string()
    } else {
        format!("{} IN ({})", quoted(left_column), placeholders.join(", "))
    };
    q.sql = format!(
        "SELECT {}::text AS \"left\", {}::text AS \"right\" FROM {} WHERE {}",
        quoted(left_column),
        quoted(right_column),
        qualified_table(schema, table),
        filter
    );
    q
}

/// INSERT: id (when given) plus the given columns. Casts by column type so string values bind correctly.
pub fn insert(resource_type: &ResourceType, id: Option<&str>, values: Vec<ColumnValue<'_>>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&resource_type.schema_name, &resource_type.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    if let Some(id) = id {
        cols.push(quoted(&resource_type.id_column));
        placeholders.push(q.placeholder(Value::String(id.to_string()), Some(id_cast(resource_type.id_type))));
    }
    for cv in values {
        cols.push(quoted(cv.column));
        placeholders.push(q.placeholder(cv.value, cv.cast));
    }
    let returning = select_column_list(resource_type);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only the given columns. With nothing to set, selects the row instead.
pub fn update(resource_type: &ResourceType, id: &str, values: Vec<ColumnValue<'_>>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&resource_type.schema_name, &resource_type.table_name);
    let id_col = quoted(&resource_type.id_column);
    let cast = id_cast(resource_type.id_type);
    let returning = select_column_list(resource_type);
    let mut sets = Vec::new();
    for cv in values {
        let rhs = q.placeholder(cv.value, cv.cast);
        sets.push(format!("{} = {}", quoted(cv.column), rhs));
    }
    if sets.is_empty() {
        let ph = q.placeholder(Value::String(id.to_string()), Some(cast));
        q.sql = format!("SELECT {} FROM {} WHERE {} = {}", returning, table, id_col, ph);
        return q;
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let ph = q.placeholder(Value::String(id.to_string()), Some(cast));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        table,
        sets.join(", "),
        id_col,
        ph,
        returning
    );
    q
}

/// DELETE by id.
pub fn delete(resource_type: &ResourceType, id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&resource_type.schema_name, &resource_type.table_name);
    let ph = q.placeholder(Value::String(id.to_string()), Some(id_cast(resource_type.id_type)));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}::text",
        table,
        quoted(&resource_type.id_column),
        ph,
        quoted(&resource_type.id_column)
    );
    q
}

/// UPDATE `table SET column = value WHERE key_column IN (keys)`. A `value` of `None` writes NULL.
pub fn set_column_where_in(
    schema: &str,
    table: &str,
    (column, value_cast, value): (&str, &str, Option<&str>),
    (key_column, key_cast, keys): (&str, &str, &[String]),
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let rhs = match value {
        Some(v) => q.placeholder(Value::String(v.to_string()), Some(value_cast)),
        None => "NULL".to_string(),
    };
    let placeholders: Vec<String> = keys
        .iter()
        .map(|k| q.placeholder(Value::String(k.clone()), Some(key_cast)))
        .collect();
    let filter = if placeholders.is_empty() {
        "1 = 0".to_string()
    } else {
        format!("{} IN ({})", quoted(key_column), placeholders.join(", "))
    };
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {}",
        qualified_table(schema, table),
        quoted(column),
        rhs,
        filter
    );
    q
}

/// DELETE join rows whose `column` equals `value`.
pub fn delete_join_rows(schema: &str, table: &str, column: &str, cast: &str, value: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(Value::String(value.to_string()), Some(cast));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", qualified_table(schema, table), quoted(column), ph);
    q
}

/// INSERT one join row.
pub fn insert_join_row(
    schema: &str,
    table: &str,
    (left_column, left_cast, left): (&str, &str, &str),
    (right_column, right_cast, right): (&str, &str, &str),
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let l = q.placeholder(Value::String(left.to_string()), Some(left_cast));
    let r = q.placeholder(Value::String(right.to_string()), Some(right_cast));
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
        qualified_table(schema, table),
        quoted(left_column),
        quoted(right_column),
        l,
        r
    );
    q
}
