use std::{collections::HashMap, sync::Mutex};

use uuid::Uuid;

use crate::domain::model::{
    Account, Application, ApprovalStatus, Branch, Document, ModerationStatus, Role, Semester,
    Subject, TaxonomyNode,
};

use super::{DocumentQuery, RecordStore, StoreError, StoreResult};

/// In-process record store mirroring the Postgres constraints. Every call
/// holds the lock for its whole read-modify-write, which gives the same
/// per-record atomicity as a conditional `UPDATE`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: Mutex<bool>,
    interleaved: Mutex<Vec<InterleavedWrite>>,
    reject_document_inserts: Mutex<bool>,
}

/// A status write from another caller that lands between the engine's read
/// and its compare-and-set.
enum InterleavedWrite {
    Approval(Uuid, ApprovalStatus),
    Moderation(Uuid, ModerationStatus),
}

#[derive(Default)]
struct Tables {
    branches: HashMap<Uuid, Branch>,
    semesters: HashMap<Uuid, Semester>,
    subjects: HashMap<Uuid, Subject>,
    accounts: HashMap<Uuid, Account>,
    applications: HashMap<Uuid, Application>,
    documents: HashMap<Uuid, Document>,
}

impl Tables {
    fn dependents(&self, node: TaxonomyNode) -> u64 {
        let count = match node {
            TaxonomyNode::Branch(id) => {
                self.semesters.values().filter(|s| s.branch_id == id).count()
                    + self.subjects.values().filter(|s| s.branch_id == id).count()
                    + self.documents.values().filter(|d| d.branch_id == id).count()
                    + self
                        .accounts
                        .values()
                        .filter(|a| a.branch_id == Some(id))
                        .count()
                    + self
                        .applications
                        .values()
                        .filter(|a| a.branch_id == id)
                        .count()
            }
            TaxonomyNode::Semester(id) => {
                self.subjects
                    .values()
                    .filter(|s| s.semester_id == id)
                    .count()
                    + self
                        .documents
                        .values()
                        .filter(|d| d.semester_id == id)
                        .count()
            }
            TaxonomyNode::Subject(id) => self
                .documents
                .values()
                .filter(|d| d.subject_id == id)
                .count(),
        };
        count as u64
    }
}

fn matches(query: &DocumentQuery, document: &Document) -> bool {
    query.uploader_id.is_none_or(|id| document.uploader_id == id)
        && query.branch_id.is_none_or(|id| document.branch_id == id)
        && query.semester_id.is_none_or(|id| document.semester_id == id)
        && query.subject_id.is_none_or(|id| document.subject_id == id)
        && query.doc_type.is_none_or(|kind| document.doc_type == kind)
        && query
            .statuses
            .as_ref()
            .is_none_or(|set| set.contains(&document.moderation_status))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the backing database going away.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().expect("offline flag poisoned") = offline;
    }

    /// Makes `status` land on the account right before the next
    /// compare-and-set, as if another admin decided first.
    pub fn interleave_approval(&self, id: Uuid, status: ApprovalStatus) {
        self.interleaved
            .lock()
            .expect("interleave queue poisoned")
            .push(InterleavedWrite::Approval(id, status));
    }

    pub fn interleave_moderation(&self, id: Uuid, status: ModerationStatus) {
        self.interleaved
            .lock()
            .expect("interleave queue poisoned")
            .push(InterleavedWrite::Moderation(id, status));
    }

    /// Fails every `insert_document` while set; other writes are unaffected.
    pub fn set_rejecting_document_inserts(&self, reject: bool) {
        *self
            .reject_document_inserts
            .lock()
            .expect("insert flag poisoned") = reject;
    }

    fn apply_interleaved(&self, t: &mut Tables) {
        let pending = std::mem::take(
            &mut *self.interleaved.lock().expect("interleave queue poisoned"),
        );
        for write in pending {
            match write {
                InterleavedWrite::Approval(id, status) => {
                    if let Some(account) = t.accounts.get_mut(&id) {
                        account.approval_status = status;
                    }
                }
                InterleavedWrite::Moderation(id, status) => {
                    if let Some(document) = t.documents.get_mut(&id) {
                        document.moderation_status = status;
                    }
                }
            }
        }
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        if *self.offline.lock().expect("offline flag poisoned") {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        f(&mut tables)
    }

    pub fn document_count(&self) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.documents.len())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    async fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        self.with_tables(|t| {
            if t.branches.values().any(|b| b.name == branch.name) {
                return Err(StoreError::Duplicate("branch"));
            }
            t.branches.insert(branch.id, branch.clone());
            Ok(())
        })
    }

    async fn get_branch(&self, id: Uuid) -> StoreResult<Option<Branch>> {
        self.with_tables(|t| Ok(t.branches.get(&id).cloned()))
    }

    async fn list_branches(&self) -> StoreResult<Vec<Branch>> {
        self.with_tables(|t| {
            let mut branches: Vec<Branch> = t.branches.values().cloned().collect();
            branches.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(branches)
        })
    }

    async fn insert_semester(&self, semester: &Semester) -> StoreResult<()> {
        self.with_tables(|t| {
            if !t.branches.contains_key(&semester.branch_id) {
                return Err(StoreError::MissingReference("branch"));
            }
            if t.semesters
                .values()
                .any(|s| s.branch_id == semester.branch_id && s.number == semester.number)
            {
                return Err(StoreError::Duplicate("semester"));
            }
            t.semesters.insert(semester.id, semester.clone());
            Ok(())
        })
    }

    async fn get_semester(&self, id: Uuid) -> StoreResult<Option<Semester>> {
        self.with_tables(|t| Ok(t.semesters.get(&id).cloned()))
    }

    async fn list_semesters(&self, branch_id: Uuid) -> StoreResult<Vec<Semester>> {
        self.with_tables(|t| {
            let mut semesters: Vec<Semester> = t
                .semesters
                .values()
                .filter(|s| s.branch_id == branch_id)
                .cloned()
                .collect();
            semesters.sort_by_key(|s| s.number);
            Ok(semesters)
        })
    }

    async fn insert_subject(&self, subject: &Subject) -> StoreResult<()> {
        self.with_tables(|t| {
            let connected = t
                .semesters
                .get(&subject.semester_id)
                .is_some_and(|s| s.branch_id == subject.branch_id);
            if !connected {
                return Err(StoreError::MissingReference("semester"));
            }
            if t.subjects.values().any(|s| {
                s.branch_id == subject.branch_id
                    && s.semester_id == subject.semester_id
                    && s.name == subject.name
            }) {
                return Err(StoreError::Duplicate("subject"));
            }
            t.subjects.insert(subject.id, subject.clone());
            Ok(())
        })
    }

    async fn get_subject(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        self.with_tables(|t| Ok(t.subjects.get(&id).cloned()))
    }

    async fn list_subjects(
        &self,
        branch_id: Uuid,
        semester_id: Option<Uuid>,
    ) -> StoreResult<Vec<Subject>> {
        self.with_tables(|t| {
            let mut subjects: Vec<Subject> = t
                .subjects
                .values()
                .filter(|s| s.branch_id == branch_id)
                .filter(|s| semester_id.is_none_or(|id| s.semester_id == id))
                .cloned()
                .collect();
            subjects.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(subjects)
        })
    }

    async fn count_dependents(&self, node: TaxonomyNode) -> StoreResult<u64> {
        self.with_tables(|t| Ok(t.dependents(node)))
    }

    async fn delete_node(&self, node: TaxonomyNode) -> StoreResult<bool> {
        self.with_tables(|t| {
            if t.dependents(node) > 0 {
                return Err(StoreError::Referenced(node.label()));
            }
            let removed = match node {
                TaxonomyNode::Branch(id) => t.branches.remove(&id).is_some(),
                TaxonomyNode::Semester(id) => t.semesters.remove(&id).is_some(),
                TaxonomyNode::Subject(id) => t.subjects.remove(&id).is_some(),
            };
            Ok(removed)
        })
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        self.with_tables(|t| {
            if account
                .branch_id
                .is_some_and(|id| !t.branches.contains_key(&id))
            {
                return Err(StoreError::MissingReference("branch"));
            }
            if t.accounts.values().any(|a| a.email == account.email) {
                return Err(StoreError::Duplicate("email"));
            }
            t.accounts.insert(account.id, account.clone());
            Ok(())
        })
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        self.with_tables(|t| Ok(t.accounts.get(&id).cloned()))
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.with_tables(|t| Ok(t.accounts.values().find(|a| a.email == email).cloned()))
    }

    async fn list_accounts(&self, status: Option<ApprovalStatus>) -> StoreResult<Vec<Account>> {
        self.with_tables(|t| {
            let mut accounts: Vec<Account> = t
                .accounts
                .values()
                .filter(|a| status.is_none_or(|s| a.approval_status == s))
                .cloned()
                .collect();
            accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(accounts)
        })
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        self.with_tables(|t| Ok(t.accounts.values().any(|a| a.role == Role::Admin)))
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<bool> {
        self.with_tables(|t| match t.accounts.get_mut(&id) {
            Some(account) if !account.email_verified => {
                account.email_verified = true;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn compare_and_set_approval(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        next: ApprovalStatus,
        comment: Option<&str>,
    ) -> StoreResult<bool> {
        self.with_tables(|t| {
            self.apply_interleaved(t);
            match t.accounts.get_mut(&id) {
                Some(account) if account.approval_status == expected => {
                    account.approval_status = next;
                    account.review_comment = comment.map(str::to_string);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    async fn update_credential(&self, id: Uuid, credential_hash: &str) -> StoreResult<bool> {
        self.with_tables(|t| match t.accounts.get_mut(&id) {
            Some(account) => {
                account.credential_hash = credential_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn insert_application(&self, application: &Application) -> StoreResult<()> {
        self.with_tables(|t| {
            if !t.accounts.contains_key(&application.account_id) {
                return Err(StoreError::MissingReference("account"));
            }
            if !t.branches.contains_key(&application.branch_id) {
                return Err(StoreError::MissingReference("branch"));
            }
            if t.applications.contains_key(&application.account_id) {
                return Err(StoreError::Duplicate("application"));
            }
            t.applications
                .insert(application.account_id, application.clone());
            Ok(())
        })
    }

    async fn get_application(&self, account_id: Uuid) -> StoreResult<Option<Application>> {
        self.with_tables(|t| Ok(t.applications.get(&account_id).cloned()))
    }

    async fn list_applications(&self) -> StoreResult<Vec<Application>> {
        self.with_tables(|t| {
            let mut applications: Vec<Application> = t.applications.values().cloned().collect();
            applications.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(applications)
        })
    }

    async fn insert_document(&self, document: &Document) -> StoreResult<()> {
        if *self
            .reject_document_inserts
            .lock()
            .expect("insert flag poisoned")
        {
            return Err(StoreError::Unavailable("document insert rejected".to_string()));
        }
        self.with_tables(|t| {
            let connected = t.subjects.get(&document.subject_id).is_some_and(|s| {
                s.semester_id == document.semester_id && s.branch_id == document.branch_id
            });
            if !connected {
                return Err(StoreError::MissingReference("subject"));
            }
            if !t.accounts.contains_key(&document.uploader_id) {
                return Err(StoreError::MissingReference("account"));
            }
            t.documents.insert(document.id, document.clone());
            Ok(())
        })
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        self.with_tables(|t| Ok(t.documents.get(&id).cloned()))
    }

    async fn find_documents(&self, query: &DocumentQuery) -> StoreResult<Vec<Document>> {
        self.with_tables(|t| {
            let mut documents: Vec<Document> = t
                .documents
                .values()
                .filter(|d| matches(query, d))
                .cloned()
                .collect();
            documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(documents)
        })
    }

    async fn compare_and_set_moderation(
        &self,
        id: Uuid,
        expected: ModerationStatus,
        next: ModerationStatus,
        comment: Option<&str>,
    ) -> StoreResult<bool> {
        self.with_tables(|t| {
            self.apply_interleaved(t);
            match t.documents.get_mut(&id) {
                Some(document) if document.moderation_status == expected => {
                    document.moderation_status = next;
                    document.review_comment = comment.map(str::to_string);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}
