//! Single access table consulted before every mutating or scoped read.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::model::{Account, ApprovalStatus, Role};

/// Snapshot of the calling account, re-read from the store per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub role: Role,
    pub email_verified: bool,
    pub approval_status: ApprovalStatus,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            role: account.role,
            email_verified: account.email_verified,
            approval_status: account.approval_status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Account(Principal),
}

impl Actor {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Actor::Anonymous => None,
            Actor::Account(principal) => Some(principal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadPublic,
    SubmitApplication,
    ViewOwnAccount,
    UploadDocument,
    ReadOwnDocuments,
    ReviewAccount,
    ModerateDocument,
    ManageTaxonomy,
}

impl Action {
    fn admin_only(&self) -> bool {
        matches!(
            self,
            Action::ReviewAccount | Action::ModerateDocument | Action::ManageTaxonomy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Any,
    OwnedBy(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotAuthenticated,
    NotApproved,
    WrongRole,
    NotOwner,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotAuthenticated => "not_authenticated",
            DenyReason::NotApproved => "not_approved",
            DenyReason::WrongRole => "wrong_role",
            DenyReason::NotOwner => "not_owner",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

pub fn authorize(actor: &Actor, action: Action, resource: Resource) -> Decision {
    if action == Action::ReadPublic {
        return Decision::Allow;
    }

    let Actor::Account(principal) = actor else {
        return Decision::Deny(DenyReason::NotAuthenticated);
    };

    if principal.is_admin() {
        // Applications are a student workflow; admins are implicitly approved.
        if action == Action::SubmitApplication {
            return Decision::Deny(DenyReason::WrongRole);
        }
        return Decision::Allow;
    }

    if action.admin_only() {
        return Decision::Deny(DenyReason::WrongRole);
    }

    match action {
        Action::SubmitApplication | Action::ViewOwnAccount => Decision::Allow,
        Action::UploadDocument => {
            if principal.approval_status == ApprovalStatus::Approved {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotApproved)
            }
        }
        Action::ReadOwnDocuments => match resource {
            Resource::OwnedBy(owner) if owner != principal.account_id => {
                Decision::Deny(DenyReason::NotOwner)
            }
            _ => Decision::Allow,
        },
        Action::ReadPublic
        | Action::ReviewAccount
        | Action::ModerateDocument
        | Action::ManageTaxonomy => Decision::Deny(DenyReason::WrongRole),
    }
}
