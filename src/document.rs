//! JSON:API resource objects to and from [`Resource`], mapping public names to property names.

use crate::config::{Relationship, ResourceGraph, ResourceType};
use crate::error::AppError;
use crate::resource::{RelationshipData, Resource};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Response body sent with the JSON:API media type.
pub struct JsonApi(pub StatusCode, pub Value);

impl IntoResponse for JsonApi {
    fn into_response(self) -> Response {
        let mut response = (self.0, Json(self.1)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
        response
    }
}

fn data_of(body: &Value) -> Result<&Value, AppError> {
    body.get("data")
        .ok_or_else(|| AppError::BadRequest("request body must contain 'data'".into()))
}

fn string_member(object: &Value, member: &str) -> Result<Option<String>, AppError> {
    match object.get(member) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(AppError::BadRequest(format!("'{}' must be a string", member))),
    }
}

/// A resource identifier object of the relationship's target type.
fn identifier(rel: &Relationship, object: &Value) -> Result<Resource, AppError> {
    let type_name = string_member(object, "type")?
        .ok_or_else(|| AppError::BadRequest(format!("'{}' linkage is missing 'type'", rel.public_name)))?;
    if type_name != rel.right {
        return Err(AppError::Conflict(format!(
            "relationship '{}' expects type '{}', got '{}'",
            rel.public_name, rel.right, type_name
        )));
    }
    let id = string_member(object, "id")?;
    let local_id = string_member(object, "lid")?;
    if id.is_none() && local_id.is_none() {
        return Err(AppError::BadRequest(format!("'{}' linkage needs 'id' or 'lid'", rel.public_name)));
    }
    Ok(Resource {
        type_name,
        id,
        local_id,
        ..Default::default()
    })
}

/// Linkage (`data` member) of one relationship.
pub fn relationship_data(rel: &Relationship, data: &Value) -> Result<RelationshipData, AppError> {
    match (rel.is_to_one(), data) {
        (true, Value::Null) => Ok(RelationshipData::ToOne(None)),
        (true, Value::Object(_)) => Ok(RelationshipData::ToOne(Some(Box::new(identifier(rel, data)?)))),
        (false, Value::Array(items)) => Ok(RelationshipData::ToMany(
            items.iter().map(|item| identifier(rel, item)).collect::<Result<_, _>>()?,
        )),
        (true, _) => Err(AppError::BadRequest(format!("'{}' expects a single identifier or null", rel.public_name))),
        (false, _) => Err(AppError::BadRequest(format!("'{}' expects an array of identifiers", rel.public_name))),
    }
}

/// Body of a relationship endpoint request: `{ "data": linkage }`.
pub fn relationship_from_document(rel: &Relationship, body: &Value) -> Result<RelationshipData, AppError> {
    relationship_data(rel, data_of(body)?)
}

/// Body of a create or update request: `{ "data": resource object }` of `rt`.
///
/// Resources without `id` or `lid` get a generated local id.
pub fn resource_from_document(rt: &ResourceType, body: &Value) -> Result<Resource, AppError> {
    let data = data_of(body)?;
    if !data.is_object() {
        return Err(AppError::BadRequest("'data' must be a resource object".into()));
    }
    let type_name = string_member(data, "type")?.ok_or_else(|| AppError::BadRequest("resource object is missing 'type'".into()))?;
    if type_name != rt.name {
        return Err(AppError::Conflict(format!(
            "resource type '{}' does not match endpoint type '{}'",
            type_name, rt.name
        )));
    }
    let mut resource = Resource::transient(type_name);
    resource.id = string_member(data, "id")?;
    if let Some(lid) = string_member(data, "lid")? {
        resource.local_id = Some(lid);
    } else if resource.id.is_some() {
        resource.local_id = None;
    }

    if let Some(attributes) = data.get("attributes") {
        let attributes = attributes
            .as_object()
            .ok_or_else(|| AppError::BadRequest("'attributes' must be an object".into()))?;
        for (name, value) in attributes {
            let attribute = rt
                .attribute_by_public_name(name)
                .ok_or_else(|| AppError::BadRequest(format!("unknown attribute '{}' on '{}'", name, rt.name)))?;
            resource.attributes.insert(attribute.property.clone(), value.clone());
        }
    }

    if let Some(relationships) = data.get("relationships") {
        let relationships = relationships
            .as_object()
            .ok_or_else(|| AppError::BadRequest("'relationships' must be an object".into()))?;
        for (name, member) in relationships {
            let rel = rt
                .relationship_by_public_name(name)
                .ok_or_else(|| AppError::BadRequest(format!("unknown relationship '{}' on '{}'", name, rt.name)))?;
            let linkage = member
                .get("data")
                .ok_or_else(|| AppError::BadRequest(format!("relationship '{}' is missing 'data'", name)))?;
            resource
                .relationships
                .insert(rel.property.clone(), relationship_data(rel, linkage)?);
        }
    }
    Ok(resource)
}

fn identifier_object(resource: &Resource) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), Value::String(resource.type_name.clone()));
    match (&resource.id, &resource.local_id) {
        (Some(id), _) => object.insert("id".into(), Value::String(id.clone())),
        (None, Some(lid)) => object.insert("lid".into(), Value::String(lid.clone())),
        (None, None) => None,
    };
    Value::Object(object)
}

/// `data` member for a relationship value.
pub fn linkage(data: &RelationshipData) -> Value {
    match data {
        RelationshipData::ToOne(None) => Value::Null,
        RelationshipData::ToOne(Some(r)) => identifier_object(r),
        RelationshipData::ToMany(items) => Value::Array(items.iter().map(identifier_object).collect()),
    }
}

/// Resource object with public member names. Members unknown to the graph are left out.
pub fn resource_object(graph: &ResourceGraph, resource: &Resource) -> Value {
    let mut object = identifier_object(resource);
    let Some(rt) = graph.resource_context(&resource.type_name) else {
        return object;
    };
    let attributes: Map<String, Value> = rt
        .attributes
        .iter()
        .filter_map(|a| Some((a.public_name.clone(), resource.attribute(&a.property)?.clone())))
        .collect();
    let relationships: Map<String, Value> = rt
        .relationships
        .iter()
        .filter_map(|r| Some((r.public_name.clone(), json!({ "data": linkage(resource.related(&r.property)?) }))))
        .collect();
    if let Some(map) = object.as_object_mut() {
        map.insert("attributes".into(), Value::Object(attributes));
        if !relationships.is_empty() {
            map.insert("relationships".into(), Value::Object(relationships));
        }
    }
    object
}

pub fn single_document(graph: &ResourceGraph, resource: &Resource) -> Value {
    json!({ "data": resource_object(graph, resource) })
}

pub fn collection_document(graph: &ResourceGraph, resources: &[Resource]) -> Value {
    json!({
        "data": resources.iter().map(|r| resource_object(graph, r)).collect::<Vec<_>>(),
        "meta": { "count": resources.len() }
    })
}

pub fn relationship_document(data: &RelationshipData) -> Value {
    json!({ "data": linkage(data) })
}
