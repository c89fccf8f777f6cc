use crate::authz::errors::AuthzError;
use crate::authz::hierarchy::{ClaimSet, RoleHierarchy, RoleRank};

/// Declarative access rule for one protected operation: a required role
/// plus whether more-privileged roles also qualify. Stateless and reusable;
/// built once where the operation is declared, not per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRequirement {
    pub(crate) rank: RoleRank,
    pub(crate) or_above: bool,
}

impl RoleRequirement {
    pub fn rank(&self) -> RoleRank {
        self.rank
    }

    pub fn or_above(&self) -> bool {
        self.or_above
    }
}

/// Owns the immutable role hierarchy and answers grant/deny decisions.
///
/// Requirement construction resolves role names against the hierarchy, so
/// an unknown role surfaces where the rule is declared (startup), never
/// during evaluation. Evaluation itself cannot fail.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    hierarchy: RoleHierarchy,
}

impl PolicyEvaluator {
    pub fn new(hierarchy: RoleHierarchy) -> Self {
        Self { hierarchy }
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Requirement satisfied only by the named role itself.
    pub fn exactly(&self, role: &str) -> Result<RoleRequirement, AuthzError> {
        self.requirement(role, false)
    }

    /// Requirement satisfied by the named role or any role above it.
    pub fn at_least(&self, role: &str) -> Result<RoleRequirement, AuthzError> {
        self.requirement(role, true)
    }

    fn requirement(&self, role: &str, or_above: bool) -> Result<RoleRequirement, AuthzError> {
        let rank = self
            .hierarchy
            .rank_of(role)
            .ok_or_else(|| AuthzError::UnknownRole(role.to_string()))?;
        Ok(RoleRequirement { rank, or_above })
    }

    /// Pure grant/deny decision: true iff some claimed role's rank equals
    /// the required rank, or `or_above` is set and some claimed role ranks
    /// strictly higher. Claims outside the hierarchy contribute nothing, so
    /// an empty or entirely-unknown claim set always denies.
    pub fn evaluate(&self, claims: &ClaimSet, requirement: RoleRequirement) -> bool {
        claims
            .roles()
            .iter()
            .filter_map(|name| self.hierarchy.rank_of(name))
            .any(|rank| rank == requirement.rank || (requirement.or_above && rank > requirement.rank))
    }
}
