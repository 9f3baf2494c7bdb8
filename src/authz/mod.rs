use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles recognized by the platform, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Teacher,
    Principal,
    Admin,
    SuperAdmin,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::Parent => 0,
            Role::Teacher => 1,
            Role::Principal => 2,
            Role::Admin => 3,
            Role::SuperAdmin => 4,
        }
    }

    /// Role hierarchy: a higher role satisfies any lower role's requirement.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Teacher => "teacher",
            Role::Principal => "principal",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "parent" => Some(Role::Parent),
            "teacher" => Some(Role::Teacher),
            "principal" => Some(Role::Principal),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
}

/// Authenticated identity attached to a request after token verification.
/// Rebuilt on every request; never persisted by this core.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub permissions: HashSet<String>,
    pub status: AccountStatus,
    pub kindergarten_id: Option<Uuid>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Declarative requirement attached to a protected operation.
#[derive(Debug, Clone)]
pub enum Requirement {
    /// Principal must hold this role, or a higher one in the hierarchy.
    Role(Role),
    /// Principal must have been granted this permission code.
    Permission(&'static str),
    /// Principal must own the target resource, or hold the overriding
    /// administrative permission.
    ResourceOwner { owner_id: Uuid, admin_override: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AccountDisabled,
    MissingRole,
    MissingPermission,
    NotResourceOwner,
}

impl DenyReason {
    /// Client-facing message. Deliberately generic so denials never reveal
    /// whether the target resource exists.
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::AccountDisabled => "Account is disabled",
            DenyReason::MissingRole => "Insufficient role",
            DenyReason::MissingPermission => "Insufficient permissions",
            DenyReason::NotResourceOwner => "Access to this resource is not permitted",
        }
    }
}

/// Evaluate requirements against a principal. Requirements AND together;
/// the first failing check short-circuits and its reason is reported.
pub fn authorize(principal: &Principal, requirements: &[Requirement]) -> Decision {
    // A disabled account is denied unconditionally, regardless of role.
    if !principal.is_active() {
        return Decision::Denied(DenyReason::AccountDisabled);
    }

    for requirement in requirements {
        match requirement {
            Requirement::Role(required) => {
                if !principal.role.satisfies(*required) {
                    return Decision::Denied(DenyReason::MissingRole);
                }
            }
            Requirement::Permission(code) => {
                if !principal.permissions.contains(*code) {
                    return Decision::Denied(DenyReason::MissingPermission);
                }
            }
            Requirement::ResourceOwner { owner_id, admin_override } => {
                let owns = principal.id == *owner_id;
                let overridden = principal.permissions.contains(*admin_override)
                    || principal.role.is_admin();
                if !owns && !overridden {
                    return Decision::Denied(DenyReason::NotResourceOwner);
                }
            }
        }
    }

    Decision::Allowed
}
