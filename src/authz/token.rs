//! String form of a [`RoleRequirement`], used where a requirement has to
//! travel as a lookup key: the policy-check HTTP API and log lines.
//! In-process callers pass the typed requirement directly and never
//! round-trip through here.

use crate::authz::hierarchy::RoleHierarchy;
use crate::authz::requirement::RoleRequirement;

/// Leading segment that marks a token as belonging to this evaluator.
pub const POLICY_PREFIX: &str = "role";

/// `role.<roleName>.<orAbove>`, e.g. `role.teacher.true`.
pub fn encode(hierarchy: &RoleHierarchy, requirement: RoleRequirement) -> String {
    format!(
        "{POLICY_PREFIX}.{}.{}",
        hierarchy.name_of(requirement.rank()),
        requirement.or_above()
    )
}

/// Decode a policy token. `None` means "not a token for this evaluator"
/// (wrong prefix, wrong segment count, a role outside the hierarchy, or a
/// malformed flag), so the caller can fall back to other policy sources.
/// Decoding never errors.
pub fn decode(hierarchy: &RoleHierarchy, token: &str) -> Option<RoleRequirement> {
    let mut segments = token.split('.');
    let prefix = segments.next()?;
    let role = segments.next()?;
    let flag = segments.next()?;
    if segments.next().is_some() || prefix != POLICY_PREFIX {
        return None;
    }

    let rank = hierarchy.rank_of(role)?;
    let or_above = flag.parse::<bool>().ok()?;
    Some(RoleRequirement { rank, or_above })
}
