//! Closed role taxonomy and the permission matrix.
//!
//! The stored profile carries a free-form role string upstream; here it is a
//! closed enum so gating logic never string-compares. Roles are exclusive:
//! `master` does not imply `admin`, each row of the matrix stands on its own.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
    Master,
}

/// Capabilities gated anywhere in the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    /// Create, update, and delete other accounts.
    ManageUsers,
    /// Approve or deny pending registrations.
    ApproveAccounts,
    /// Mutate application content.
    EditContent,
    /// Read application content.
    ViewContent,
}

impl Role {
    /// Permission matrix. Only `admin` and `master` gate behavior today, but
    /// every role has an explicit row so a new check never falls through to a
    /// default.
    #[must_use]
    pub const fn allows(self, permission: Permission) -> bool {
        match self {
            Self::Admin => matches!(
                permission,
                Permission::ManageUsers | Permission::EditContent | Permission::ViewContent
            ),
            Self::Editor => matches!(
                permission,
                Permission::EditContent | Permission::ViewContent
            ),
            Self::Viewer => matches!(permission, Permission::ViewContent),
            Self::Master => matches!(
                permission,
                Permission::ManageUsers | Permission::ApproveAccounts | Permission::ViewContent
            ),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
            Self::Master => "master",
        }
    }
}
