//! Request validation from config rules, with the required-field gate for partial updates.

use crate::config::{ResourceGraph, ResourceType, ValidationRule};
use crate::error::{FieldError, ValidationFailure};
use crate::request::{EndpointKind, RequestContext};
use crate::resource::{Resource, ResourceKey};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const MAX_DEPTH: usize = 64;

/// Per-call state of one validation walk. Remembers self-referencing resources already validated,
/// so later occurrences of the same identity in the payload are not held to required checks again.
#[derive(Debug, Default)]
pub struct ValidationPass {
    self_referencing: HashSet<ResourceKey>,
}

impl ValidationPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, key: &ResourceKey) -> bool {
        self.self_referencing.contains(key)
    }
}

/// Decides whether an object in the request payload is subject to required checks.
pub struct RequiredGate;

impl RequiredGate {
    /// `true` when required rules apply to `owner`. On primary endpoints nested payloads of other types,
    /// other identities, and repeated self-referencing identities are exempt.
    pub fn evaluate(owner: &Resource, request: &RequestContext, pass: &mut ValidationPass, graph: &ResourceGraph) -> bool {
        if request.kind != EndpointKind::Primary {
            return true;
        }
        if owner.type_name != request.primary_type {
            return false;
        }
        if owner.id != request.primary_id {
            return false;
        }
        let key = owner.key();
        let self_referencing = graph
            .resource_context(&owner.type_name)
            .map(|rt| owner.is_self_referencing(rt))
            .unwrap_or(false);
        if self_referencing {
            pass.self_referencing.insert(key);
            return true;
        }
        !pass.has_seen(&key)
    }
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate every request resource and its nested relationship payloads. All failures are collected.
    pub fn validate_resources(resources: &[Resource], graph: &ResourceGraph, request: &RequestContext) -> Result<(), ValidationFailure> {
        let mut pass = ValidationPass::new();
        let mut errors = Vec::new();
        for resource in resources {
            visit(resource, graph, request, &mut pass, &mut errors, 0);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(count = errors.len(), resource_type = %request.primary_type, "validation failed");
            Err(ValidationFailure { errors })
        }
    }
}

fn visit(
    resource: &Resource,
    graph: &ResourceGraph,
    request: &RequestContext,
    pass: &mut ValidationPass,
    errors: &mut Vec<FieldError>,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    if let Some(rt) = graph.resource_context(&resource.type_name) {
        let required_applies = RequiredGate::evaluate(resource, request, pass, graph);
        validate_object(resource, rt, request, required_applies, errors);
    }
    for data in resource.relationships.values() {
        for nested in data.resources() {
            visit(nested, graph, request, pass, errors, depth + 1);
        }
    }
}

fn validate_object(resource: &Resource, rt: &ResourceType, request: &RequestContext, required_applies: bool, errors: &mut Vec<FieldError>) {
    for (property, rule) in &rt.validation {
        let field = rt
            .attribute(property)
            .map(|a| a.public_name.as_str())
            .unwrap_or(property.as_str());
        let mut fail = |message: String| {
            errors.push(FieldError {
                resource_type: rt.name.clone(),
                field: field.to_string(),
                message,
            })
        };
        let value = resource.attribute(property);
        if rule.required == Some(true)
            && required_applies
            && !request.is_required_validator_disabled(property, &rt.name)
            && is_missing(value)
        {
            fail("is required".to_string());
            continue;
        }
        if let Some(v) = value {
            if let Err(message) = validate_field(v, rule) {
                fail(message);
            }
        }
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn validate_field(v: &Value, rule: &ValidationRule) -> Result<(), String> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| "has an invalid pattern rule".to_string())?;
            if !re.is_match(s) {
                return Err("does not match required pattern".to_string());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(format!("must be at most {}", max));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err("must be a valid email".to_string());
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err("must be a valid UUID".to_string());
            }
        }
        _ => {}
    }
    Ok(())
}
