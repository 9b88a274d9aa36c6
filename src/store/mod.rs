//! Record store boundary. Every durable read and write of the domain goes through
//! [`RecordStore`]; status changes use compare-and-set so concurrent admin
//! actions never overwrite each other.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::model::{
    Account, Application, ApprovalStatus, Branch, Document, DocumentType, ModerationStatus,
    Semester, Subject, TaxonomyNode,
};

pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// A delete was blocked because other records still point at the row.
    #[error("{0} is still referenced")]
    Referenced(&'static str),

    /// An insert pointed at a parent row that does not exist.
    #[error("missing referenced {0}")]
    MissingReference(&'static str),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("stored record could not be decoded: {0}")]
    Corrupt(String),
}

/// Resolved document query. The registry derives it from the caller's filter
/// and audience, so the store never decides visibility on its own.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub uploader_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub semester_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub doc_type: Option<DocumentType>,
    /// `None` means any status.
    pub statuses: Option<Vec<ModerationStatus>>,
}

pub trait RecordStore: Send + Sync + 'static {
    // Taxonomy
    fn insert_branch(&self, branch: &Branch) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_branch(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Branch>>> + Send;
    fn list_branches(&self) -> impl Future<Output = StoreResult<Vec<Branch>>> + Send;

    fn insert_semester(&self, semester: &Semester) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_semester(&self, id: Uuid)
    -> impl Future<Output = StoreResult<Option<Semester>>> + Send;
    fn list_semesters(
        &self,
        branch_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<Semester>>> + Send;

    fn insert_subject(&self, subject: &Subject) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_subject(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Subject>>> + Send;
    fn list_subjects(
        &self,
        branch_id: Uuid,
        semester_id: Option<Uuid>,
    ) -> impl Future<Output = StoreResult<Vec<Subject>>> + Send;

    /// Number of records (lower taxonomy levels, documents, accounts,
    /// applications) that reference the node.
    fn count_dependents(&self, node: TaxonomyNode)
    -> impl Future<Output = StoreResult<u64>> + Send;

    /// Hard delete without cascade. Returns `false` when the node did not exist
    /// and `StoreError::Referenced` when a dependent appeared concurrently.
    fn delete_node(&self, node: TaxonomyNode) -> impl Future<Output = StoreResult<bool>> + Send;

    // Accounts
    fn insert_account(&self, account: &Account) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_account(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Account>>> + Send;
    fn find_account_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<Account>>> + Send;
    fn list_accounts(
        &self,
        status: Option<ApprovalStatus>,
    ) -> impl Future<Output = StoreResult<Vec<Account>>> + Send;
    fn admin_exists(&self) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Flips `email_verified` if it is still false. Returns whether a row changed.
    fn mark_email_verified(&self, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Moves `approval_status` from `expected` to `next`. Returns `false`
    /// without writing when the stored status is no longer `expected`.
    fn compare_and_set_approval(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        next: ApprovalStatus,
        comment: Option<&str>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn update_credential(
        &self,
        id: Uuid,
        credential_hash: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    // Applications
    fn insert_application(
        &self,
        application: &Application,
    ) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_application(
        &self,
        account_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Application>>> + Send;
    fn list_applications(&self) -> impl Future<Output = StoreResult<Vec<Application>>> + Send;

    // Documents
    fn insert_document(&self, document: &Document) -> impl Future<Output = StoreResult<()>> + Send;
    fn get_document(&self, id: Uuid)
    -> impl Future<Output = StoreResult<Option<Document>>> + Send;
    /// Newest first.
    fn find_documents(
        &self,
        query: &DocumentQuery,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Moves `moderation_status` from `expected` to `next`; see
    /// [`RecordStore::compare_and_set_approval`].
    fn compare_and_set_moderation(
        &self,
        id: Uuid,
        expected: ModerationStatus,
        next: ModerationStatus,
        comment: Option<&str>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}
