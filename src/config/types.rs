//! Raw config types matching the resource graph JSON declaration.

use crate::naming::NamingConvention;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdTypeConfig {
    Uuid,
    #[default]
    Int,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub public_name: Option<String>,
    /// Backing column; defaults to `name`.
    #[serde(default)]
    pub column: Option<String>,
    /// PostgreSQL type used for casts and DDL (e.g. "text", "timestamptz").
    #[serde(default)]
    pub pg_type: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKindConfig {
    HasOne,
    HasMany,
    HasManyThrough,
}

/// Which table holds the foreign key of a has_one relationship.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySide {
    #[default]
    Local,
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThroughConfig {
    pub table: String,
    /// Join column referencing the declaring resource.
    pub left_column: String,
    /// Join column referencing the target resource.
    pub right_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    #[serde(default)]
    pub public_name: Option<String>,
    pub kind: RelationshipKindConfig,
    /// Target resource name.
    pub target: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub foreign_key_on: KeySide,
    /// Relationship name on the target that navigates back.
    #[serde(default)]
    pub inverse: Option<String>,
    #[serde(default)]
    pub through: Option<ThroughConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// JSON:API type name (e.g. "todoItems").
    pub name: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default)]
    pub id_type: IdTypeConfig,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    /// Per-attribute rules keyed by attribute name.
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

fn default_id_column() -> String {
    "id".into()
}

/// Whole resource graph declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub naming: NamingConvention,
    pub resources: Vec<ResourceConfig>,
}

fn default_schema() -> String {
    "public".into()
}

/// Runtime options. Read from the environment by [`JsonApiOptions::from_env`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonApiOptions {
    /// Route prefix for resource endpoints.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Default for hooks whose handler does not say whether it wants database state.
    #[serde(default)]
    pub load_database_values: bool,
    /// Maximum request body size in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_namespace() -> String {
    "/api/v1".into()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for JsonApiOptions {
    fn default() -> Self {
        JsonApiOptions {
            namespace: default_namespace(),
            load_database_values: false,
            body_limit: default_body_limit(),
        }
    }
}

impl JsonApiOptions {
    /// `JSONAPI_NAMESPACE`, `JSONAPI_LOAD_DATABASE_VALUES`, `JSONAPI_BODY_LIMIT`; `.env` is read first when present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = JsonApiOptions::default();
        JsonApiOptions {
            namespace: std::env::var("JSONAPI_NAMESPACE").unwrap_or(defaults.namespace),
            load_database_values: std::env::var("JSONAPI_LOAD_DATABASE_VALUES")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.load_database_values),
            body_limit: std::env::var("JSONAPI_BODY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.body_limit),
        }
    }
}
