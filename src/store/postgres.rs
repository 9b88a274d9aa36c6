use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::error;
use uuid::Uuid;

use crate::{
    domain::model::{
        Account, Application, ApprovalStatus, Branch, Document, DocumentType, ModerationStatus,
        Role, Semester, Subject, TaxonomyNode,
    },
    objects::StorageRef,
};

use super::{DocumentQuery, RecordStore, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps constraint violations to their store-level meaning; everything else
/// is an infrastructure failure.
fn classify(err: sqlx::Error, entity: &'static str, on_delete: bool) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Duplicate(entity),
            Some(FOREIGN_KEY_VIOLATION) if on_delete => return StoreError::Referenced(entity),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::MissingReference(entity),
            _ => {}
        }
    }
    error!(?err, entity, "record store query failed");
    StoreError::Unavailable(err.to_string())
}

fn unavailable(err: sqlx::Error) -> StoreError {
    error!(?err, "record store query failed");
    StoreError::Unavailable(err.to_string())
}

#[derive(sqlx::FromRow)]
struct BranchRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SemesterRow {
    id: Uuid,
    branch_id: Uuid,
    number: i16,
    created_at: DateTime<Utc>,
}

impl From<SemesterRow> for Semester {
    fn from(row: SemesterRow) -> Self {
        Semester {
            id: row.id,
            branch_id: row.branch_id,
            number: row.number,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: Uuid,
    branch_id: Uuid,
    semester_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            branch_id: row.branch_id,
            semester_id: row.semester_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    email: String,
    credential_hash: String,
    branch_id: Option<Uuid>,
    college: Option<String>,
    role: String,
    email_verified: bool,
    approval_status: String,
    review_comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role `{}`", row.role)))?;
        let approval_status = ApprovalStatus::parse(&row.approval_status).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown approval status `{}`", row.approval_status))
        })?;
        Ok(Account {
            id: row.id,
            name: row.name,
            email: row.email,
            credential_hash: row.credential_hash,
            branch_id: row.branch_id,
            college: row.college,
            role,
            email_verified: row.email_verified,
            approval_status,
            review_comment: row.review_comment,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    account_id: Uuid,
    full_name: String,
    college: String,
    branch_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Application {
            account_id: row.account_id,
            full_name: row.full_name,
            college: row.college,
            branch_id: row.branch_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    uploader_id: Uuid,
    branch_id: Uuid,
    semester_id: Uuid,
    subject_id: Uuid,
    doc_type: String,
    title: String,
    storage_ref: String,
    moderation_status: String,
    review_comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let doc_type = DocumentType::parse(&row.doc_type).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown document type `{}`", row.doc_type))
        })?;
        let moderation_status = ModerationStatus::parse(&row.moderation_status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "unknown moderation status `{}`",
                row.moderation_status
            ))
        })?;
        Ok(Document {
            id: row.id,
            uploader_id: row.uploader_id,
            branch_id: row.branch_id,
            semester_id: row.semester_id,
            subject_id: row.subject_id,
            doc_type,
            title: row.title,
            storage_ref: StorageRef::new(row.storage_ref),
            moderation_status,
            review_comment: row.review_comment,
            created_at: row.created_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, credential_hash, branch_id, college, role, email_verified, approval_status, review_comment, created_at";
const DOCUMENT_COLUMNS: &str = "id, uploader_id, branch_id, semester_id, subject_id, doc_type, title, storage_ref, moderation_status, review_comment, created_at";

impl RecordStore for PgStore {
    async fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        sqlx::query("INSERT INTO branches (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(branch.id)
            .bind(&branch.name)
            .bind(branch.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, "branch", false))?;
        Ok(())
    }

    async fn get_branch(&self, id: Uuid) -> StoreResult<Option<Branch>> {
        let row = sqlx::query_as::<_, BranchRow>(
            "SELECT id, name, created_at FROM branches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row.map(Branch::from))
    }

    async fn list_branches(&self) -> StoreResult<Vec<Branch>> {
        let rows = sqlx::query_as::<_, BranchRow>(
            "SELECT id, name, created_at FROM branches ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(rows.into_iter().map(Branch::from).collect())
    }

    async fn insert_semester(&self, semester: &Semester) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO semesters (id, branch_id, number, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(semester.id)
        .bind(semester.branch_id)
        .bind(semester.number)
        .bind(semester.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, "semester", false))?;
        Ok(())
    }

    async fn get_semester(&self, id: Uuid) -> StoreResult<Option<Semester>> {
        let row = sqlx::query_as::<_, SemesterRow>(
            "SELECT id, branch_id, number, created_at FROM semesters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row.map(Semester::from))
    }

    async fn list_semesters(&self, branch_id: Uuid) -> StoreResult<Vec<Semester>> {
        let rows = sqlx::query_as::<_, SemesterRow>(
            "SELECT id, branch_id, number, created_at FROM semesters WHERE branch_id = $1 ORDER BY number",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(rows.into_iter().map(Semester::from).collect())
    }

    async fn insert_subject(&self, subject: &Subject) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO subjects (id, branch_id, semester_id, name, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(subject.id)
        .bind(subject.branch_id)
        .bind(subject.semester_id)
        .bind(&subject.name)
        .bind(subject.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, "subject", false))?;
        Ok(())
    }

    async fn get_subject(&self, id: Uuid) -> StoreResult<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, branch_id, semester_id, name, created_at FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row.map(Subject::from))
    }

    async fn list_subjects(
        &self,
        branch_id: Uuid,
        semester_id: Option<Uuid>,
    ) -> StoreResult<Vec<Subject>> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, branch_id, semester_id, name, created_at FROM subjects
             WHERE branch_id = $1 AND ($2::uuid IS NULL OR semester_id = $2)
             ORDER BY name",
        )
        .bind(branch_id)
        .bind(semester_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(rows.into_iter().map(Subject::from).collect())
    }

    async fn count_dependents(&self, node: TaxonomyNode) -> StoreResult<u64> {
        let (sql, id) = match node {
            TaxonomyNode::Branch(id) => (
                "SELECT (SELECT COUNT(*) FROM semesters WHERE branch_id = $1)
                      + (SELECT COUNT(*) FROM subjects WHERE branch_id = $1)
                      + (SELECT COUNT(*) FROM documents WHERE branch_id = $1)
                      + (SELECT COUNT(*) FROM accounts WHERE branch_id = $1)
                      + (SELECT COUNT(*) FROM applications WHERE branch_id = $1)",
                id,
            ),
            TaxonomyNode::Semester(id) => (
                "SELECT (SELECT COUNT(*) FROM subjects WHERE semester_id = $1)
                      + (SELECT COUNT(*) FROM documents WHERE semester_id = $1)",
                id,
            ),
            TaxonomyNode::Subject(id) => {
                ("SELECT COUNT(*) FROM documents WHERE subject_id = $1", id)
            }
        };

        let count: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(count.max(0) as u64)
    }

    async fn delete_node(&self, node: TaxonomyNode) -> StoreResult<bool> {
        let (sql, id) = match node {
            TaxonomyNode::Branch(id) => ("DELETE FROM branches WHERE id = $1", id),
            TaxonomyNode::Semester(id) => ("DELETE FROM semesters WHERE id = $1", id),
            TaxonomyNode::Subject(id) => ("DELETE FROM subjects WHERE id = $1", id),
        };

        let result = sqlx::query(sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, node.label(), true))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, email, credential_hash, branch_id, college, role, email_verified, approval_status, review_comment, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.credential_hash)
        .bind(account.branch_id)
        .bind(account.college.as_deref())
        .bind(account.role.as_str())
        .bind(account.email_verified)
        .bind(account.approval_status.as_str())
        .bind(account.review_comment.as_deref())
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match classify(err, "email", false) {
            StoreError::MissingReference(_) => StoreError::MissingReference("branch"),
            other => other,
        })?;
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(Account::try_from).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(Account::try_from).transpose()
    }

    async fn list_accounts(&self, status: Option<ApprovalStatus>) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE ($1::text IS NULL OR approval_status = $1)
             ORDER BY created_at"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.into_iter().map(Account::try_from).collect()
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE role = 'admin')")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET email_verified = TRUE WHERE id = $1 AND email_verified = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_approval(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        next: ApprovalStatus,
        comment: Option<&str>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET approval_status = $3, review_comment = $4, updated_at = NOW()
             WHERE id = $1 AND approval_status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(comment)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_credential(&self, id: Uuid, credential_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET credential_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(credential_hash)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_application(&self, application: &Application) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO applications (account_id, full_name, college, branch_id, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(application.account_id)
        .bind(&application.full_name)
        .bind(&application.college)
        .bind(application.branch_id)
        .bind(application.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, "application", false))?;
        Ok(())
    }

    async fn get_application(&self, account_id: Uuid) -> StoreResult<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT account_id, full_name, college, branch_id, created_at FROM applications WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row.map(Application::from))
    }

    async fn list_applications(&self) -> StoreResult<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "SELECT account_id, full_name, college, branch_id, created_at FROM applications ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(rows.into_iter().map(Application::from).collect())
    }

    async fn insert_document(&self, document: &Document) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO documents (id, uploader_id, branch_id, semester_id, subject_id, doc_type, title, storage_ref, moderation_status, review_comment, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(document.id)
        .bind(document.uploader_id)
        .bind(document.branch_id)
        .bind(document.semester_id)
        .bind(document.subject_id)
        .bind(document.doc_type.as_str())
        .bind(&document.title)
        .bind(document.storage_ref.as_str())
        .bind(document.moderation_status.as_str())
        .bind(document.review_comment.as_deref())
        .bind(document.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, "subject", false))?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(Document::try_from).transpose()
    }

    async fn find_documents(&self, query: &DocumentQuery) -> StoreResult<Vec<Document>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE TRUE"
        ));

        if let Some(uploader_id) = query.uploader_id {
            builder.push(" AND uploader_id = ").push_bind(uploader_id);
        }
        if let Some(branch_id) = query.branch_id {
            builder.push(" AND branch_id = ").push_bind(branch_id);
        }
        if let Some(semester_id) = query.semester_id {
            builder.push(" AND semester_id = ").push_bind(semester_id);
        }
        if let Some(subject_id) = query.subject_id {
            builder.push(" AND subject_id = ").push_bind(subject_id);
        }
        if let Some(doc_type) = query.doc_type {
            builder.push(" AND doc_type = ").push_bind(doc_type.as_str());
        }
        if let Some(statuses) = &query.statuses {
            let values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder
                .push(" AND moderation_status = ANY(")
                .push_bind(values)
                .push(")");
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn compare_and_set_moderation(
        &self,
        id: Uuid,
        expected: ModerationStatus,
        next: ModerationStatus,
        comment: Option<&str>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET moderation_status = $3, review_comment = $4, updated_at = NOW()
             WHERE id = $1 AND moderation_status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(comment)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}
