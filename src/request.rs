//! Per-request context: what the URL addresses, plus the required-validator disable channel.

use std::collections::HashSet;

/// Which kind of endpoint the request hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    /// `/{type}` or `/{type}/{id}`
    Primary,
    /// `/{type}/{id}/relationships/{relationship}`
    Relationship,
}

/// Fields whose required check is switched off for this request, keyed by (member name, declaring type name).
#[derive(Clone, Debug, Default)]
pub struct DisabledRequiredFields {
    fields: HashSet<(String, String)>,
}

impl DisabledRequiredFields {
    pub fn disable(&mut self, member: &str, declaring_type: &str) {
        self.fields.insert((member.to_string(), declaring_type.to_string()));
    }

    pub fn is_disabled(&self, member: &str, declaring_type: &str) -> bool {
        self.fields
            .contains(&(member.to_string(), declaring_type.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Created fresh for every request; never shared between requests.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub kind: EndpointKind,
    pub primary_type: String,
    /// `None` for collection endpoints; on POST, the client-supplied id if the body has one.
    pub primary_id: Option<String>,
    /// Relationship property for relationship endpoints.
    pub relationship: Option<String>,
    pub disabled_required: DisabledRequiredFields,
}

impl RequestContext {
    pub fn primary(primary_type: impl Into<String>, primary_id: Option<String>) -> Self {
        RequestContext {
            kind: EndpointKind::Primary,
            primary_type: primary_type.into(),
            primary_id,
            relationship: None,
            disabled_required: DisabledRequiredFields::default(),
        }
    }

    pub fn relationship(primary_type: impl Into<String>, primary_id: impl Into<String>, relationship: impl Into<String>) -> Self {
        RequestContext {
            kind: EndpointKind::Relationship,
            primary_type: primary_type.into(),
            primary_id: Some(primary_id.into()),
            relationship: Some(relationship.into()),
            disabled_required: DisabledRequiredFields::default(),
        }
    }

    pub fn disable_required_validator(&mut self, member: &str, declaring_type: &str) {
        self.disabled_required.disable(member, declaring_type);
    }

    pub fn is_required_validator_disabled(&self, member: &str, declaring_type: &str) -> bool {
        self.disabled_required.is_disabled(member, declaring_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_flag_is_scoped_to_member_and_type() {
        let mut ctx = RequestContext::primary("people", Some("1".into()));
        ctx.disable_required_validator("last_name", "people");
        assert!(ctx.is_required_validator_disabled("last_name", "people"));
        assert!(!ctx.is_required_validator_disabled("last_name", "todoItems"));
        assert!(!ctx.is_required_validator_disabled("first_name", "people"));
    }

    #[test]
    fn fresh_contexts_share_nothing() {
        let mut a = RequestContext::primary("people", None);
        a.disable_required_validator("last_name", "people");
        let b = RequestContext::primary("people", None);
        assert!(b.disabled_required.is_empty());
    }
}
