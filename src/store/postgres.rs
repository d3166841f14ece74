//! PostgreSQL repository: resources stored one table per type, links as foreign-key columns or join tables.

use super::ResourceRepository;
use crate::config::{ForeignKey, Relationship, ResourceGraph, ResourceType};
use crate::error::AppError;
use crate::resource::{RelationshipData, Resource};
use crate::sql::{
    delete, delete_join_rows, id_cast, insert, insert_join_row, select_column_where_in, select_join_rows, select_list,
    select_where_in, set_column_where_in, update, ColumnValue, PgBindValue, QueryBuf, LINK_ALIAS,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

pub struct PgRepository {
    pool: PgPool,
    graph: Arc<ResourceGraph>,
}

impl PgRepository {
    pub fn new(pool: PgPool, graph: Arc<ResourceGraph>) -> Self {
        PgRepository { pool, graph }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn target(&self, rel: &Relationship) -> Result<Arc<ResourceType>, AppError> {
        Ok(Arc::clone(self.graph.require(&rel.right)?))
    }

    /// (owner id, related resource) pairs for `rel`, in storage order.
    async fn related_links(
        &self,
        rel: &Relationship,
        owner_rows: &[Value],
        owner_ids: &[String],
        owner_cast: &str,
    ) -> Result<Vec<(String, Resource)>, AppError> {
        let right = self.target(rel)?;
        let right_cast = id_cast(right.id_type);
        let pairs: Vec<(String, String)> = match &rel.foreign_key {
            ForeignKey::Remote(col) => {
                let q = select_where_in(&right, col, owner_cast, owner_ids, true);
                let rows = fetch_all(&self.pool, &q).await?;
                return Ok(rows
                    .iter()
                    .filter_map(|row| {
                        let owner = text(row, LINK_ALIAS)?;
                        Some((owner, row_to_resource(&right, row)))
                    })
                    .collect());
            }
            ForeignKey::Local(col) => {
                let owner_id_column = &self.graph.require(&rel.left)?.id_column;
                owner_rows
                    .iter()
                    .filter_map(|row| Some((text(row, owner_id_column)?, text(row, col)?)))
                    .collect()
            }
            ForeignKey::Join {
                table,
                left_column,
                right_column,
            } => {
                let q = select_join_rows(&right.schema_name, table, left_column, right_column, owner_cast, owner_ids);
                fetch_all(&self.pool, &q)
                    .await?
                    .iter()
                    .filter_map(|row| Some((text(row, "left")?, text(row, "right")?)))
                    .collect()
            }
        };
        let target_ids: Vec<String> = pairs
            .iter()
            .map(|(_, t)| t.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let q = select_where_in(&right, &right.id_column, right_cast, &target_ids, false);
        let targets: HashMap<String, Resource> = fetch_all(&self.pool, &q)
            .await?
            .iter()
            .map(|row| row_to_resource(&right, row))
            .filter_map(|r| Some((r.id.clone()?, r)))
            .collect();
        Ok(pairs
            .into_iter()
            .filter_map(|(owner, target)| Some((owner, targets.get(&target)?.clone())))
            .collect())
    }

    async fn check_targets(&self, conn: &mut PgConnection, rel: &Relationship, data: &RelationshipData) -> Result<(), AppError> {
        let targets: Vec<String> = data.ids().into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if targets.is_empty() {
            return Ok(());
        }
        let right = self.target(rel)?;
        let q = select_where_in(&right, &right.id_column, id_cast(right.id_type), &targets, false);
        let found: BTreeSet<String> = fetch_all(&mut *conn, &q)
            .await?
            .iter()
            .filter_map(|row| text(row, &right.id_column))
            .collect();
        match targets.iter().find(|t| !found.contains(*t)) {
            Some(missing) => Err(AppError::NotFound(format!("{}:{}", rel.right, missing))),
            None => Ok(()),
        }
    }

    /// Replace the full value of `rel` for `id`. Local keys are written by the row insert/update.
    async fn write_link(
        &self,
        conn: &mut PgConnection,
        owner: &ResourceType,
        rel: &Relationship,
        id: &str,
        data: &RelationshipData,
    ) -> Result<(), AppError> {
        self.check_targets(&mut *conn, rel, data).await?;
        let right = self.target(rel)?;
        let left_cast = id_cast(owner.id_type);
        let right_cast = id_cast(right.id_type);
        let targets = data.ids();
        let owner_id = [id.to_string()];
        match &rel.foreign_key {
            ForeignKey::Local(col) => {
                let q = set_column_where_in(
                    &owner.schema_name,
                    &owner.table_name,
                    (col, right_cast, targets.first().map(String::as_str)),
                    (&owner.id_column, left_cast, &owner_id),
                );
                execute(&mut *conn, &q).await?;
            }
            ForeignKey::Remote(col) => {
                let detach = set_column_where_in(
                    &right.schema_name,
                    &right.table_name,
                    (col, left_cast, None),
                    (col, left_cast, &owner_id),
                );
                execute(&mut *conn, &detach).await?;
                let attach = set_column_where_in(
                    &right.schema_name,
                    &right.table_name,
                    (col, left_cast, Some(id)),
                    (&right.id_column, right_cast, &targets),
                );
                execute(&mut *conn, &attach).await?;
            }
            ForeignKey::Join {
                table,
                left_column,
                right_column,
            } => {
                execute(&mut *conn, &delete_join_rows(&owner.schema_name, table, left_column, left_cast, id)).await?;
                for target in &targets {
                    let q = insert_join_row(
                        &owner.schema_name,
                        table,
                        (left_column, left_cast, id),
                        (right_column, right_cast, target),
                    );
                    execute(&mut *conn, &q).await?;
                }
            }
        }
        Ok(())
    }

    /// Null out or remove every stored link that points at the row about to be deleted.
    async fn unlink(&self, conn: &mut PgConnection, deleted: &ResourceType, id: &str) -> Result<(), AppError> {
        let ids = [id.to_string()];
        let cast = id_cast(deleted.id_type);
        for resource_type in &self.graph.resources {
            for rel in &resource_type.relationships {
                let q = match &rel.foreign_key {
                    ForeignKey::Local(col) if rel.right == deleted.name => set_column_where_in(
                        &resource_type.schema_name,
                        &resource_type.table_name,
                        (col, cast, None),
                        (col, cast, &ids),
                    ),
                    ForeignKey::Remote(col) if rel.left == deleted.name => {
                        let right = self.target(rel)?;
                        set_column_where_in(&right.schema_name, &right.table_name, (col, cast, None), (col, cast, &ids))
                    }
                    ForeignKey::Join {
                        table,
                        left_column,
                        right_column,
                    } if rel.left == deleted.name || rel.right == deleted.name => {
                        let column = if rel.left == deleted.name { left_column } else { right_column };
                        delete_join_rows(&resource_type.schema_name, table, column, cast, id)
                    }
                    _ => continue,
                };
                execute(&mut *conn, &q).await?;
            }
        }
        Ok(())
    }

    /// Columns the row insert/update writes: targeted attributes plus targeted local keys.
    fn column_values<'a>(&self, resource_type: &'a ResourceType, resource: &Resource) -> Result<Vec<ColumnValue<'a>>, AppError> {
        let mut values = Vec::new();
        for attr in &resource_type.attributes {
            if let Some(v) = resource.attributes.get(&attr.property) {
                values.push(ColumnValue {
                    column: &attr.column,
                    value: v.clone(),
                    cast: attr.pg_type.as_deref(),
                });
            }
        }
        for rel in &resource_type.relationships {
            let (ForeignKey::Local(col), Some(data)) = (&rel.foreign_key, resource.related(&rel.property)) else {
                continue;
            };
            let right = self.target(rel)?;
            values.push(ColumnValue {
                column: col,
                value: data.ids().into_iter().next().map(Value::String).unwrap_or(Value::Null),
                cast: Some(id_cast(right.id_type)),
            });
        }
        Ok(values)
    }

    async fn write_links(
        &self,
        conn: &mut PgConnection,
        resource_type: &ResourceType,
        resource: &Resource,
        id: &str,
    ) -> Result<(), AppError> {
        for (property, data) in &resource.relationships {
            let rel = resource_type
                .relationship(property)
                .ok_or_else(|| AppError::BadRequest(format!("'{}' has no relationship '{}'", resource_type.name, property)))?;
            match rel.foreign_key {
                ForeignKey::Local(_) => self.check_targets(&mut *conn, rel, data).await?,
                _ => self.write_link(&mut *conn, resource_type, rel, id, data).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for PgRepository {
    async fn find_by_ids(
        &self,
        resource_type: &ResourceType,
        ids: &[String],
        include: &[&Relationship],
    ) -> Result<Vec<Resource>, AppError> {
        let cast = id_cast(resource_type.id_type);
        let q = select_where_in(resource_type, &resource_type.id_column, cast, ids, false);
        let rows = fetch_all(&self.pool, &q).await?;
        let mut by_id: HashMap<String, Resource> = rows
            .iter()
            .map(|row| row_to_resource(resource_type, row))
            .filter_map(|r| Some((r.id.clone()?, r)))
            .collect();
        let found: Vec<String> = ids.iter().filter(|id| by_id.contains_key(*id)).cloned().collect();
        for rel in include {
            for r in by_id.values_mut() {
                r.relationships
                    .insert(rel.property.clone(), RelationshipData::empty_for(rel.kind));
            }
            for (owner, related) in self.related_links(rel, &rows, &found, cast).await? {
                let Some(r) = by_id.get_mut(&owner) else { continue };
                match r.relationships.get_mut(&rel.property) {
                    Some(RelationshipData::ToMany(v)) => v.push(related),
                    Some(RelationshipData::ToOne(slot)) if slot.is_none() => *slot = Some(Box::new(related)),
                    _ => {}
                }
            }
        }
        Ok(found.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn find_referencing(&self, relationship: &Relationship, target_ids: &[String]) -> Result<Vec<Resource>, AppError> {
        let owner = Arc::clone(self.graph.require(&relationship.left)?);
        let right = self.target(relationship)?;
        let right_cast = id_cast(right.id_type);
        let q = match &relationship.foreign_key {
            ForeignKey::Local(col) => select_column_where_in(
                &owner.schema_name,
                &owner.table_name,
                &owner.id_column,
                col,
                right_cast,
                target_ids,
            ),
            ForeignKey::Remote(col) => select_column_where_in(
                &right.schema_name,
                &right.table_name,
                col,
                &right.id_column,
                right_cast,
                target_ids,
            ),
            ForeignKey::Join {
                table,
                left_column,
                right_column,
            } => select_column_where_in(&owner.schema_name, table, left_column, right_column, right_cast, target_ids),
        };
        let owner_ids: Vec<String> = fetch_all(&self.pool, &q)
            .await?
            .iter()
            .filter_map(|row| text(row, LINK_ALIAS))
            .collect();
        self.find_by_ids(&owner, &owner_ids, &[relationship]).await
    }

    async fn list(&self, resource_type: &ResourceType) -> Result<Vec<Resource>, AppError> {
        let rows = fetch_all(&self.pool, &select_list(resource_type)).await?;
        Ok(rows.iter().map(|row| row_to_resource(resource_type, row)).collect())
    }

    async fn create(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Resource, AppError> {
        let mut tx = self.pool.begin().await?;
        let q = insert(resource_type, resource.id.as_deref(), self.column_values(resource_type, resource)?);
        let created = fetch_all(&mut *tx, &q)
            .await?
            .first()
            .map(|row| row_to_resource(resource_type, row))
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))?;
        let id = created
            .id
            .clone()
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))?;
        self.write_links(&mut tx, resource_type, resource, &id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Option<Resource>, AppError> {
        let id = resource
            .id
            .clone()
            .ok_or_else(|| AppError::BadRequest("update requires an id".into()))?;
        let mut tx = self.pool.begin().await?;
        let q = update(resource_type, &id, self.column_values(resource_type, resource)?);
        let Some(updated) = fetch_all(&mut *tx, &q)
            .await?
            .first()
            .map(|row| row_to_resource(resource_type, row))
        else {
            return Ok(None);
        };
        self.write_links(&mut tx, resource_type, resource, &id).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, resource_type: &ResourceType, id: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        self.unlink(&mut tx, resource_type, id).await?;
        let deleted = fetch_all(&mut *tx, &delete(resource_type, id)).await?;
        tx.commit().await?;
        Ok(!deleted.is_empty())
    }

    async fn replace_relationship(
        &self,
        resource_type: &ResourceType,
        id: &str,
        relationship: &Relationship,
        data: &RelationshipData,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let q = select_where_in(resource_type, &resource_type.id_column, id_cast(resource_type.id_type), &[id.to_string()], false);
        if fetch_all(&mut *tx, &q).await?.is_empty() {
            return Ok(false);
        }
        self.write_link(&mut tx, resource_type, relationship, id, data).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn fetch_all<'e, E>(executor: E, q: &QueryBuf) -> Result<Vec<Value>, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let rows = query.fetch_all(executor).await.map_err(map_db_error)?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn execute<'e, E>(executor: E, q: &QueryBuf) -> Result<u64, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let done = query.execute(executor).await.map_err(map_db_error)?;
    Ok(done.rows_affected())
}

/// Unique violations become conflicts; everything else stays a database error.
fn map_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return AppError::Conflict(db.message().to_string());
        }
    }
    AppError::Db(e)
}

fn text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_to_resource(resource_type: &ResourceType, row: &Value) -> Resource {
    let mut resource = Resource {
        type_name: resource_type.name.clone(),
        id: text(row, &resource_type.id_column),
        ..Default::default()
    };
    for attr in &resource_type.attributes {
        if let Some(v) = row.get(&attr.column) {
            resource.attributes.insert(attr.property.clone(), v.clone());
        }
    }
    resource
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Create the database named in `database_url` if it does not exist (connects to `postgres` to do so).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(AppError::Db)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", crate::sql::quoted(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}
