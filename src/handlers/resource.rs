//! Resource handlers: list, create, read, update, delete, and relationship read/replace.

use crate::config::{IdType, ResourceType};
use crate::document::{
    collection_document, relationship_document, relationship_from_document, resource_from_document, single_document, JsonApi,
};
use crate::error::AppError;
use crate::extractors::JsonApiBody;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

fn resource_type(state: &AppState, name: &str) -> Result<Arc<ResourceType>, AppError> {
    state
        .graph()
        .resource_context(name)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("resource type '{}'", name)))
}

/// Normalize a path id for the type's id kind.
fn parse_id(id_str: &str, id_type: IdType) -> Result<String, AppError> {
    Ok(match id_type {
        IdType::Uuid => uuid::Uuid::parse_str(id_str)
            .map_err(|_| AppError::BadRequest("invalid uuid".into()))?
            .to_string(),
        IdType::Int => id_str
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest("invalid id".into()))?
            .to_string(),
        IdType::Text => id_str.to_string(),
    })
}

pub async fn list_resources(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
) -> Result<JsonApi, AppError> {
    let resources = state.service.list(&type_name).await?;
    Ok(JsonApi(StatusCode::OK, collection_document(state.graph(), &resources)))
}

pub async fn create_resource(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    JsonApiBody(body): JsonApiBody,
) -> Result<JsonApi, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let mut resource = resource_from_document(&rt, &body)?;
    if let Some(id) = &resource.id {
        resource.id = Some(parse_id(id, rt.id_type)?);
    }
    let created = state.service.create(resource).await?;
    Ok(JsonApi(StatusCode::CREATED, single_document(state.graph(), &created)))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path((type_name, id_str)): Path<(String, String)>,
) -> Result<JsonApi, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let id = parse_id(&id_str, rt.id_type)?;
    let resource = state.service.get(&rt.name, &id).await?;
    Ok(JsonApi(StatusCode::OK, single_document(state.graph(), &resource)))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path((type_name, id_str)): Path<(String, String)>,
    JsonApiBody(body): JsonApiBody,
) -> Result<JsonApi, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let id = parse_id(&id_str, rt.id_type)?;
    let mut resource = resource_from_document(&rt, &body)?;
    if let Some(body_id) = &resource.id {
        resource.id = Some(parse_id(body_id, rt.id_type)?);
    }
    let updated = state.service.update(&rt.name, &id, resource).await?;
    Ok(JsonApi(StatusCode::OK, single_document(state.graph(), &updated)))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path((type_name, id_str)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let id = parse_id(&id_str, rt.id_type)?;
    state.service.delete(&rt.name, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_relationship(
    State(state): State<AppState>,
    Path((type_name, id_str, relationship)): Path<(String, String, String)>,
) -> Result<JsonApi, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let id = parse_id(&id_str, rt.id_type)?;
    let data = state.service.get_relationship(&rt.name, &id, &relationship).await?;
    Ok(JsonApi(StatusCode::OK, relationship_document(&data)))
}

pub async fn update_relationship(
    State(state): State<AppState>,
    Path((type_name, id_str, relationship)): Path<(String, String, String)>,
    JsonApiBody(body): JsonApiBody,
) -> Result<JsonApi, AppError> {
    let rt = resource_type(&state, &type_name)?;
    let id = parse_id(&id_str, rt.id_type)?;
    let rel = rt
        .relationship_by_public_name(&relationship)
        .ok_or_else(|| AppError::NotFound(format!("relationship '{}' on '{}'", relationship, rt.name)))?;
    let data = relationship_from_document(rel, &body)?;
    let written = state
        .service
        .update_relationship(&rt.name, &id, &rel.property, data)
        .await?;
    Ok(JsonApi(StatusCode::OK, relationship_document(&written)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_normalized_per_type() {
        assert_eq!(parse_id("007", IdType::Int).unwrap(), "7");
        assert!(parse_id("abc", IdType::Int).is_err());
        assert_eq!(
            parse_id("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11", IdType::Uuid).unwrap(),
            "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"
        );
        assert_eq!(parse_id("abc", IdType::Text).unwrap(), "abc");
    }
}
