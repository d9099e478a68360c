//! Publication eligibility of a parent record

use core_library::LocalRecord;

/// A parent is eligible to host published children unless its audience
/// scope is one of the reserved scopes.
pub fn is_publication_eligible(parent: &LocalRecord, reserved_scopes: &[String]) -> bool {
    match parent.audience_scope.as_deref() {
        Some(scope) => !reserved_scopes.iter().any(|reserved| reserved == scope),
        None => true,
    }
}
