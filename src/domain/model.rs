use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::objects::StorageRef;

pub const MIN_SEMESTER: i32 = 1;
pub const MAX_SEMESTER: i32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub number: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A fully resolved taxonomy leaf.
#[derive(Debug, Clone)]
pub struct TaxonomyPath {
    pub branch: Branch,
    pub semester: Semester,
    pub subject: Subject,
}

/// Identifies one node of the taxonomy tree for dependent checks and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyNode {
    Branch(Uuid),
    Semester(Uuid),
    Subject(Uuid),
}

impl TaxonomyNode {
    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyNode::Branch(_) => "branch",
            TaxonomyNode::Semester(_) => "semester",
            TaxonomyNode::Subject(_) => "subject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an account, derived from verification and approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Unverified,
    PendingReview,
    Approved,
    Rejected,
}

impl AccountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Unverified => "unverified",
            AccountState::PendingReview => "pending_review",
            AccountState::Approved => "approved",
            AccountState::Rejected => "rejected",
        }
    }
}

/// Admin decision on a pending account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target(&self) -> ApprovalStatus {
        match self {
            ReviewDecision::Approve => ApprovalStatus::Approved,
            ReviewDecision::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    /// Always set for students; admins are not tied to a branch.
    pub branch_id: Option<Uuid>,
    pub college: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub approval_status: ApprovalStatus,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn state(&self) -> AccountState {
        if self.is_admin() {
            return AccountState::Approved;
        }
        if !self.email_verified {
            return AccountState::Unverified;
        }
        match self.approval_status {
            ApprovalStatus::Pending => AccountState::PendingReview,
            ApprovalStatus::Approved => AccountState::Approved,
            ApprovalStatus::Rejected => AccountState::Rejected,
        }
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            branch_id: self.branch_id,
            college: self.college.clone(),
            role: self.role,
            email_verified: self.email_verified,
            approval_status: self.approval_status,
            state: self.state(),
            review_comment: self.review_comment.clone(),
            created_at: self.created_at,
        }
    }
}

/// Account data safe to hand back to callers (no credential digest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub branch_id: Option<Uuid>,
    pub college: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub approval_status: ApprovalStatus,
    pub state: AccountState,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub account_id: Uuid,
    pub full_name: String,
    pub college: String,
    pub branch_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub account: AccountView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Handbook")]
    Handbook,
    #[serde(rename = "GATE-PYQ")]
    GatePyq,
    #[serde(rename = "University-PYQ")]
    UniversityPyq,
    #[serde(rename = "PYQ-Solutions")]
    PyqSolutions,
    #[serde(rename = "Handwritten-Notes")]
    HandwrittenNotes,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Handbook,
        DocumentType::GatePyq,
        DocumentType::UniversityPyq,
        DocumentType::PyqSolutions,
        DocumentType::HandwrittenNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Handbook => "Handbook",
            DocumentType::GatePyq => "GATE-PYQ",
            DocumentType::UniversityPyq => "University-PYQ",
            DocumentType::PyqSolutions => "PYQ-Solutions",
            DocumentType::HandwrittenNotes => "Handwritten-Notes",
        }
    }

    /// Accepts the canonical hyphenated labels as well as the space separated
    /// spelling older clients send ("GATE PYQ").
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().replace(' ', "-");
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Featured,
}

impl ModerationStatus {
    pub const PUBLIC: [ModerationStatus; 2] = [ModerationStatus::Approved, ModerationStatus::Featured];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Featured => "featured",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ModerationStatus::Pending),
            "approved" => Some(ModerationStatus::Approved),
            "rejected" => Some(ModerationStatus::Rejected),
            "featured" => Some(ModerationStatus::Featured),
            _ => None,
        }
    }

    pub fn is_public(&self) -> bool {
        Self::PUBLIC.contains(self)
    }

    /// Legal moderation edges. `rejected` is terminal and no status moves to itself.
    pub fn can_transition_to(&self, target: ModerationStatus) -> bool {
        use ModerationStatus::*;
        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Featured)
                | (Approved, Featured)
                | (Featured, Approved)
        )
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub subject_id: Uuid,
    pub doc_type: DocumentType,
    pub title: String,
    pub storage_ref: StorageRef,
    pub moderation_status: ModerationStatus,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub subject_id: Uuid,
    /// `None` when the uploader account is gone.
    pub uploader_name: Option<String>,
    /// Only filled for moderation views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_email: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub title: String,
    pub storage_ref: StorageRef,
    pub url: String,
    pub moderation_status: ModerationStatus,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller supplied listing filter. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFilter {
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub semester_id: Option<Uuid>,
    #[serde(default)]
    pub subject_id: Option<Uuid>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<DocumentType>,
    #[serde(default)]
    pub status: Option<ModerationStatus>,
}
