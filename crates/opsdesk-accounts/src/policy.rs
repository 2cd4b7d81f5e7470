//! Role and visibility policy.
//!
//! Pure functions, no I/O. `effective_role` turns a token's role claims into
//! the single role this system stores; `visible_groups` is the allow-list
//! deciding which relation fields a viewer sees. Both are total: unknown
//! claims degrade to the least-privileged role, and a role outside the
//! allow-list sees nothing.

use opsdesk_core::Role;

/// Compute the single effective role from a set of token role claims.
///
/// Claims are normalized to lowercase, intersected with the known
/// enumeration, and the highest-priority match wins (admin > manager >
/// engineer > user). No matching claim means plain `user`.
#[must_use]
pub fn effective_role(claims: &[String]) -> Role {
    let mut matched = [false; Role::PRIORITY.len()];
    for claim in claims {
        if let Some(role) = Role::from_claim(claim) {
            if let Some(pos) = Role::PRIORITY.iter().position(|r| *r == role) {
                matched[pos] = true;
            }
        }
    }
    Role::PRIORITY
        .iter()
        .zip(matched)
        .find_map(|(role, hit)| hit.then_some(*role))
        .unwrap_or(Role::User)
}

/// The visibility groups a viewer role belongs to.
///
/// This is an allow-list, never a deny-list: relation fields (department,
/// reporting manager) appear in a shaped response only for viewers whose
/// group set is non-empty, so newly added sensitive fields default to hidden.
#[must_use]
pub fn visible_groups(viewer: Role) -> &'static [Role] {
    match viewer {
        Role::Admin => &[Role::Admin, Role::Manager, Role::Engineer],
        Role::Manager => &[Role::Manager, Role::Engineer],
        Role::Engineer => &[Role::Engineer],
        Role::User => &[],
    }
}

/// Whether relation fields are populated for this viewer.
#[must_use]
pub fn relations_visible(viewer: Role) -> bool {
    !visible_groups(viewer).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_highest_priority_claim_wins() {
        assert_eq!(effective_role(&claims(&["admin", "engineer"])), Role::Admin);
        assert_eq!(effective_role(&claims(&["engineer", "manager"])), Role::Manager);
        assert_eq!(effective_role(&claims(&["manager"])), Role::Manager);
    }

    #[test]
    fn test_no_claims_defaults_to_user() {
        assert_eq!(effective_role(&[]), Role::User);
    }

    #[test]
    fn test_unknown_claims_default_to_user() {
        assert_eq!(
            effective_role(&claims(&["bogus", "uma_authorization"])),
            Role::User
        );
    }

    #[test]
    fn test_claims_are_case_insensitive() {
        assert_eq!(effective_role(&claims(&["ADMIN"])), Role::Admin);
        assert_eq!(effective_role(&claims(&["Engineer"])), Role::Engineer);
    }

    #[test]
    fn test_visible_groups_allow_list() {
        assert_eq!(
            visible_groups(Role::Admin),
            &[Role::Admin, Role::Manager, Role::Engineer]
        );
        assert_eq!(visible_groups(Role::Manager), &[Role::Manager, Role::Engineer]);
        assert_eq!(visible_groups(Role::Engineer), &[Role::Engineer]);
        assert!(visible_groups(Role::User).is_empty());
    }

    #[test]
    fn test_relations_visible() {
        assert!(relations_visible(Role::Admin));
        assert!(relations_visible(Role::Manager));
        assert!(relations_visible(Role::Engineer));
        assert!(!relations_visible(Role::User));
    }
}
