//! Roles, actions and the single authorization check.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Finance,
    Hr,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Finance => "finance",
            Self::Hr => "hr",
            Self::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "finance" => Some(Self::Finance),
            "hr" => Some(Self::Hr),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Generate,
    Regenerate,
    EditEntry,
    SubmitForReview,
    Approve,
    Lock,
    Delete,
    View,
    Export,
    SubmitDeclaration,
    ReviewDeclaration,
    ManageCompensation,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Regenerate => "regenerate",
            Self::EditEntry => "edit_entry",
            Self::SubmitForReview => "submit_for_review",
            Self::Approve => "approve",
            Self::Lock => "lock",
            Self::Delete => "delete",
            Self::View => "view",
            Self::Export => "export",
            Self::SubmitDeclaration => "submit_declaration",
            Self::ReviewDeclaration => "review_declaration",
            Self::ManageCompensation => "manage_compensation",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may perform `action`.
///
/// Approving, locking and exporting payroll need a finance-scoped role;
/// preparing a run is open to HR as well.
pub fn can(
    role: Role,
    action: Action,
) -> bool {
    use Action::*;
    use Role::*;

    match action {
        Approve | Lock | Export => matches!(role, Admin | Finance),
        Generate | Regenerate | EditEntry | SubmitForReview | Delete | View => {
            matches!(role, Admin | Finance | Hr)
        }
        ReviewDeclaration => matches!(role, Admin | Finance | Hr),
        ManageCompensation => matches!(role, Admin | Hr),
        SubmitDeclaration => true,
    }
}

/// An authenticated user acting with a resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

/// Identity lookup supplied by the host application.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// The user's current role, or `None` for unknown users.
    async fn current_role(
        &self,
        user_id: &str,
    ) -> Option<Role>;
}

/// Fixed user-to-role table, as read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleResolver {
    roles: HashMap<String, Role>,
}

impl StaticRoleResolver {
    pub fn new(roles: HashMap<String, Role>) -> Self {
        Self { roles }
    }

    pub fn with_user(
        mut self,
        user_id: impl Into<String>,
        role: Role,
    ) -> Self {
        self.roles.insert(user_id.into(), role);
        self
    }
}

#[async_trait]
impl RoleResolver for StaticRoleResolver {
    async fn current_role(
        &self,
        user_id: &str,
    ) -> Option<Role> {
        self.roles.get(user_id).copied()
    }
}
