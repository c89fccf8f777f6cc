use crate::authz::errors::AuthzError;

/// Position of a role in the hierarchy. A greater rank means more privilege.
///
/// Ranks are only handed out by [`RoleHierarchy`], so a rank in circulation
/// is always a valid index into the hierarchy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleRank(pub(crate) usize);

impl RoleRank {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered role names, index 0 = lowest privilege. Built once at startup
/// from configuration; immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHierarchy {
    names: Vec<String>,
}

impl RoleHierarchy {
    /// Validates the configured ordering: non-empty, each role exactly once.
    /// Violations are configuration errors and fatal at startup.
    pub fn new<I, S>(names: I) -> Result<Self, AuthzError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(AuthzError::EmptyHierarchy);
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(AuthzError::DuplicateRole(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Rank of a role name; `None` for names outside the hierarchy.
    pub fn rank_of(&self, name: &str) -> Option<RoleRank> {
        self.names.iter().position(|n| n == name).map(RoleRank)
    }

    /// Name at the given rank. Ranks come from this hierarchy, so the
    /// lookup cannot miss.
    pub fn name_of(&self, rank: RoleRank) -> &str {
        &self.names[rank.0]
    }

    /// Rank of the least-privileged role.
    pub fn lowest(&self) -> RoleRank {
        RoleRank(0)
    }

    /// Rank of the most-privileged role.
    pub fn highest(&self) -> RoleRank {
        RoleRank(self.names.len() - 1)
    }

    /// Role names, lowest privilege first.
    pub fn roles(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Never true: construction rejects an empty hierarchy.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Role names asserted for the current request's principal.
///
/// Produced fresh per request by the authentication step and discarded when
/// the request completes. Empty for unauthenticated principals; names not
/// present in the hierarchy never match a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    roles: Vec<String>,
}

impl ClaimSet {
    /// The unauthenticated (role-less) claim set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_role(role: impl Into<String>) -> Self {
        Self {
            roles: vec![role.into()],
        }
    }

    pub fn from_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
