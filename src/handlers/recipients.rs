//! Approver and recipient alias resolution.
//!
//! | Spec              | Resolves to                                              |
//! |-------------------|----------------------------------------------------------|
//! | `requester`       | the actor who triggered the run                          |
//! | `domain_owners`   | entity `domain_owners`, else the configured fallback     |
//! | `project_owners`  | entity `project_owners`, else the configured fallback    |
//! | `owner`           | entity `owner` (notifications only)                      |
//! | `a@x.com, b@x.com`| the listed addresses                                     |
//! | anything else     | a group name, passed through unchanged                   |

use serde_json::Value;

use crate::config::ApprovalConfig;
use crate::execution::context::ExecutionContext;

/// Who the resolved addresses are for; only notifications know `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Approvers,
    Recipients,
}

/// Strings held by an entity attribute (a string, a comma list, or an array).
fn entity_people(ctx: &ExecutionContext, key: &str) -> Vec<String> {
    match ctx.entity.get(key) {
        Some(Value::String(s)) => split_addresses(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn split_addresses(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_one(
    spec: &str,
    ctx: &ExecutionContext,
    fallbacks: &ApprovalConfig,
    audience: Audience,
) -> Vec<String> {
    let owners_or = |key: &str, fallback: &str| {
        let found = entity_people(ctx, key);
        if found.is_empty() {
            vec![fallback.to_string()]
        } else {
            found
        }
    };

    match spec.trim() {
        "" => Vec::new(),
        "requester" => ctx.actor_email.iter().cloned().collect(),
        "domain_owners" => owners_or("domain_owners", &fallbacks.domain_owner_fallback),
        "project_owners" => owners_or("project_owners", &fallbacks.project_owner_fallback),
        "owner" if audience == Audience::Recipients => entity_people(ctx, "owner"),
        s if s.contains('@') => split_addresses(s),
        group => vec![group.to_string()],
    }
}

/// Resolves a config value (a string or a list of strings) to addresses,
/// preserving order and dropping duplicates.
pub fn resolve(
    spec: &Value,
    ctx: &ExecutionContext,
    fallbacks: &ApprovalConfig,
    audience: Audience,
) -> Vec<String> {
    let specs: Vec<&str> = match spec {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let mut resolved: Vec<String> = Vec::new();
    for s in specs {
        for person in resolve_one(s, ctx, fallbacks, audience) {
            if !resolved.contains(&person) {
                resolved.push(person);
            }
        }
    }
    resolved
}

/// True when the config value carries at least one non-blank spec.
pub fn is_configured(spec: Option<&Value>) -> bool {
    match spec {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| !s.trim().is_empty()),
        _ => false,
    }
}
