//! Config validation: referential integrity of the resource graph declaration.

use crate::config::{GraphConfig, RelationshipConfig, RelationshipKindConfig, ResourceConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &GraphConfig) -> Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &ResourceConfig> = HashMap::new();
    for r in &config.resources {
        if by_name.insert(r.name.as_str(), r).is_some() {
            return Err(ConfigError::DuplicateName {
                kind: "resource",
                name: r.name.clone(),
            });
        }
    }

    for r in &config.resources {
        let mut members = HashSet::new();
        for a in &r.attributes {
            if !members.insert(a.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "member",
                    name: format!("{}.{}", r.name, a.name),
                });
            }
        }
        for rel in &r.relationships {
            if !members.insert(rel.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "member",
                    name: format!("{}.{}", r.name, rel.name),
                });
            }
            let target = by_name.get(rel.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "resource",
                id: rel.target.clone(),
            })?;
            validate_storage(r, rel)?;
            if let Some(inverse) = &rel.inverse {
                validate_inverse(r, rel, target, inverse)?;
            }
        }
        for field in r.validation.keys() {
            if !r.attributes.iter().any(|a| &a.name == field) {
                return Err(ConfigError::MissingReference {
                    kind: "attribute",
                    id: format!("{}.{}", r.name, field),
                });
            }
        }
    }

    Ok(())
}

fn validate_storage(owner: &ResourceConfig, rel: &RelationshipConfig) -> Result<(), ConfigError> {
    match rel.kind {
        RelationshipKindConfig::HasOne | RelationshipKindConfig::HasMany => {
            if rel.foreign_key.as_deref().map(str::is_empty).unwrap_or(true) {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: foreign_key is required",
                    owner.name, rel.name
                )));
            }
        }
        RelationshipKindConfig::HasManyThrough => {
            if rel.through.is_none() {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: has_many_through requires 'through'",
                    owner.name, rel.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_inverse(
    owner: &ResourceConfig,
    rel: &RelationshipConfig,
    target: &ResourceConfig,
    inverse: &str,
) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidInverse {
        resource: owner.name.clone(),
        relationship: rel.name.clone(),
        inverse: inverse.to_string(),
    };
    let back = target.relationships.iter().find(|r| r.name == inverse).ok_or_else(invalid)?;
    if back.target != owner.name {
        return Err(invalid());
    }
    if let Some(back_inverse) = &back.inverse {
        if back_inverse != &rel.name {
            return Err(invalid());
        }
    }
    Ok(())
}
