//! Load the graph declaration from JSON and resolve it into a [`ResourceGraph`].

use crate::config::resolved::{Attribute, ForeignKey, IdType, Relationship, RelationshipKind, ResourceGraph, ResourceType};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::path::Path;

/// Build the resolved graph from config (validates first).
pub fn resolve(config: &GraphConfig) -> Result<ResourceGraph, ConfigError> {
    validate(config)?;
    let naming = config.naming;

    let mut resources = Vec::with_capacity(config.resources.len());
    for r in &config.resources {
        let attributes = r
            .attributes
            .iter()
            .map(|a| Attribute {
                property: a.name.clone(),
                public_name: a.public_name.clone().unwrap_or_else(|| naming.public_name(&a.name)),
                column: a.column.clone().unwrap_or_else(|| a.name.clone()),
                pg_type: a.pg_type.clone(),
                nullable: a.nullable,
            })
            .collect();

        let mut relationships = Vec::with_capacity(r.relationships.len());
        for rel in &r.relationships {
            relationships.push(Relationship {
                property: rel.name.clone(),
                public_name: rel.public_name.clone().unwrap_or_else(|| naming.public_name(&rel.name)),
                kind: match rel.kind {
                    RelationshipKindConfig::HasOne => RelationshipKind::HasOne,
                    RelationshipKindConfig::HasMany => RelationshipKind::HasMany,
                    RelationshipKindConfig::HasManyThrough => RelationshipKind::HasManyThrough,
                },
                left: r.name.clone(),
                right: rel.target.clone(),
                foreign_key: foreign_key_for(&r.name, rel)?,
                inverse: rel.inverse.clone(),
            });
        }

        resources.push(ResourceType {
            name: r.name.clone(),
            schema_name: config.schema.clone(),
            table_name: r.table.clone(),
            id_column: r.id_column.clone(),
            id_type: match r.id_type {
                IdTypeConfig::Uuid => IdType::Uuid,
                IdTypeConfig::Int => IdType::Int,
                IdTypeConfig::Text => IdType::Text,
            },
            attributes,
            relationships,
            validation: r.validation.clone(),
        });
    }

    tracing::debug!(resources = resources.len(), "resolved resource graph");
    Ok(ResourceGraph::new(naming, resources))
}

fn foreign_key_for(owner: &str, rel: &RelationshipConfig) -> Result<ForeignKey, ConfigError> {
    let missing = || ConfigError::Validation(format!("{}.{}: foreign_key is required", owner, rel.name));
    Ok(match rel.kind {
        RelationshipKindConfig::HasOne => {
            let column = rel.foreign_key.clone().ok_or_else(missing)?;
            match rel.foreign_key_on {
                KeySide::Local => ForeignKey::Local(column),
                KeySide::Remote => ForeignKey::Remote(column),
            }
        }
        RelationshipKindConfig::HasMany => ForeignKey::Remote(rel.foreign_key.clone().ok_or_else(missing)?),
        RelationshipKindConfig::HasManyThrough => {
            let through = rel
                .through
                .as_ref()
                .ok_or_else(|| ConfigError::Validation(format!("{}.{}: 'through' is required", owner, rel.name)))?;
            ForeignKey::Join {
                table: through.table.clone(),
                left_column: through.left_column.clone(),
                right_column: through.right_column.clone(),
            }
        }
    })
}

/// Parse a graph declaration from a JSON string.
pub fn parse_graph(json: &str) -> Result<GraphConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read and parse a graph declaration file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<GraphConfig, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse_graph(&text)
}
