//! Public-name derivation: property names (snake_case) -> JSON:API member names.

use serde::{Deserialize, Serialize};

/// How property names are exposed as public (wire) names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// "to_one_person" -> "to-one-person"
    #[default]
    KebabCase,
    /// "to_one_person" -> "toOnePerson"
    CamelCase,
    /// Names are exposed as declared.
    AsDeclared,
}

impl NamingConvention {
    pub fn public_name(&self, property: &str) -> String {
        match self {
            NamingConvention::KebabCase => to_kebab_case(property),
            NamingConvention::CamelCase => to_camel_case(property),
            NamingConvention::AsDeclared => property.to_string(),
        }
    }
}

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "user_id" -> "userId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' || c == '-' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from snake_case or camelCase to kebab-case.
/// e.g. "to_one_person" -> "to-one-person", "lastName" -> "last-name"
pub fn to_kebab_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c == '_' {
            out.push('-');
        } else if c.is_uppercase() {
            if i > 0 && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase or kebab-case to snake_case.
/// e.g. "userId" -> "user_id", "to-one-person" -> "to_one_person"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c == '-' {
            out.push('_');
        } else if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
