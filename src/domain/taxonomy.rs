use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::store::RecordStore;

use super::{
    Engine,
    error::{CoreError, CoreResult},
    model::{Branch, MAX_SEMESTER, MIN_SEMESTER, Semester, Subject, TaxonomyNode, TaxonomyPath},
    policy::{Action, Actor, Resource},
};

fn required_name(value: &str, field: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

impl<S: RecordStore> Engine<S> {
    pub async fn create_branch(&self, actor: &Actor, name: &str) -> CoreResult<Branch> {
        self.require(actor, Action::ManageTaxonomy, Resource::Any)?;
        let branch = Branch {
            id: Uuid::new_v4(),
            name: required_name(name, "branch name")?,
            created_at: Utc::now(),
        };
        self.store.insert_branch(&branch).await?;
        info!(branch_id = %branch.id, name = %branch.name, "created branch");
        Ok(branch)
    }

    pub async fn create_semester(
        &self,
        actor: &Actor,
        branch_id: Uuid,
        number: i32,
    ) -> CoreResult<Semester> {
        self.require(actor, Action::ManageTaxonomy, Resource::Any)?;
        if !(MIN_SEMESTER..=MAX_SEMESTER).contains(&number) {
            return Err(CoreError::OutOfRange(number));
        }
        if self.store.get_branch(branch_id).await?.is_none() {
            return Err(CoreError::InvalidReference("branch"));
        }

        let semester = Semester {
            id: Uuid::new_v4(),
            branch_id,
            number: number as i16,
            created_at: Utc::now(),
        };
        self.store.insert_semester(&semester).await?;
        info!(semester_id = %semester.id, %branch_id, number, "created semester");
        Ok(semester)
    }

    pub async fn create_subject(
        &self,
        actor: &Actor,
        branch_id: Uuid,
        semester_id: Uuid,
        name: &str,
    ) -> CoreResult<Subject> {
        self.require(actor, Action::ManageTaxonomy, Resource::Any)?;
        let name = required_name(name, "subject name")?;
        if self.store.get_branch(branch_id).await?.is_none() {
            return Err(CoreError::InvalidReference("branch"));
        }
        let semester_in_branch = self
            .store
            .get_semester(semester_id)
            .await?
            .is_some_and(|semester| semester.branch_id == branch_id);
        if !semester_in_branch {
            return Err(CoreError::InvalidReference("semester"));
        }

        let subject = Subject {
            id: Uuid::new_v4(),
            branch_id,
            semester_id,
            name,
            created_at: Utc::now(),
        };
        self.store.insert_subject(&subject).await?;
        info!(subject_id = %subject.id, %semester_id, name = %subject.name, "created subject");
        Ok(subject)
    }

    pub async fn list_branches(&self) -> CoreResult<Vec<Branch>> {
        Ok(self.store.list_branches().await?)
    }

    pub async fn list_semesters(&self, branch_id: Uuid) -> CoreResult<Vec<Semester>> {
        Ok(self.store.list_semesters(branch_id).await?)
    }

    pub async fn list_subjects(
        &self,
        branch_id: Uuid,
        semester_id: Option<Uuid>,
    ) -> CoreResult<Vec<Subject>> {
        Ok(self.store.list_subjects(branch_id, semester_id).await?)
    }

    pub async fn delete_branch(&self, actor: &Actor, id: Uuid) -> CoreResult<()> {
        self.delete_node(actor, TaxonomyNode::Branch(id)).await
    }

    pub async fn delete_semester(&self, actor: &Actor, id: Uuid) -> CoreResult<()> {
        self.delete_node(actor, TaxonomyNode::Semester(id)).await
    }

    pub async fn delete_subject(&self, actor: &Actor, id: Uuid) -> CoreResult<()> {
        self.delete_node(actor, TaxonomyNode::Subject(id)).await
    }

    async fn delete_node(&self, actor: &Actor, node: TaxonomyNode) -> CoreResult<()> {
        self.require(actor, Action::ManageTaxonomy, Resource::Any)?;

        let exists = match node {
            TaxonomyNode::Branch(id) => self.store.get_branch(id).await?.is_some(),
            TaxonomyNode::Semester(id) => self.store.get_semester(id).await?.is_some(),
            TaxonomyNode::Subject(id) => self.store.get_subject(id).await?.is_some(),
        };
        if !exists {
            return Err(CoreError::NotFound(node.label()));
        }

        let dependents = self.store.count_dependents(node).await?;
        if dependents > 0 {
            return Err(CoreError::Conflict(node.label()));
        }

        // The store refuses the delete itself if a dependent slipped in after the count.
        if !self.store.delete_node(node).await? {
            return Err(CoreError::NotFound(node.label()));
        }
        info!(?node, "deleted taxonomy node");
        Ok(())
    }

    /// Resolves a (branch, semester, subject) triple to a connected leaf.
    pub async fn resolve_path(
        &self,
        branch_id: Uuid,
        semester_id: Uuid,
        subject_id: Uuid,
    ) -> CoreResult<TaxonomyPath> {
        let branch = self
            .store
            .get_branch(branch_id)
            .await?
            .ok_or(CoreError::InvalidReference("branch"))?;
        let semester = self
            .store
            .get_semester(semester_id)
            .await?
            .filter(|semester| semester.branch_id == branch.id)
            .ok_or(CoreError::InvalidReference("semester"))?;
        let subject = self
            .store
            .get_subject(subject_id)
            .await?
            .filter(|subject| subject.semester_id == semester.id && subject.branch_id == branch.id)
            .ok_or(CoreError::InvalidReference("subject"))?;

        Ok(TaxonomyPath {
            branch,
            semester,
            subject,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        ErrorKind,
        policy::{Actor, DenyReason},
        testkit::Harness,
    };

    use super::*;

    #[tokio::test]
    async fn duplicate_and_dangling_creates_are_rejected() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let ece = h.branch(&admin, "ECE").await;

        let err = h.engine.create_branch(&admin, "CSE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);

        let sem3 = h.engine.create_semester(&admin, cse.id, 3).await.unwrap();
        let err = h.engine.create_semester(&admin, cse.id, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);

        let err = h
            .engine
            .create_semester(&admin, Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);

        // Semester exists but belongs to another branch.
        let err = h
            .engine
            .create_subject(&admin, ece.id, sem3.id, "DSA")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);

        h.engine
            .create_subject(&admin, cse.id, sem3.id, "DSA")
            .await
            .unwrap();
        let err = h
            .engine
            .create_subject(&admin, cse.id, sem3.id, "DSA")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    }

    #[tokio::test]
    async fn semester_number_must_be_in_range() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;

        for number in [0, 9, -1] {
            let err = h
                .engine
                .create_semester(&admin, cse.id, number)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::OutOfRange(n) if n == number));
        }
        assert!(h.engine.create_semester(&admin, cse.id, 8).await.is_ok());
    }

    #[tokio::test]
    async fn listings_stay_inside_their_parent() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let ece = h.branch(&admin, "ECE").await;
        let cse3 = h.engine.create_semester(&admin, cse.id, 3).await.unwrap();
        let cse4 = h.engine.create_semester(&admin, cse.id, 4).await.unwrap();
        let ece3 = h.engine.create_semester(&admin, ece.id, 3).await.unwrap();
        h.engine
            .create_subject(&admin, cse.id, cse3.id, "DSA")
            .await
            .unwrap();
        h.engine
            .create_subject(&admin, cse.id, cse4.id, "DBMS")
            .await
            .unwrap();
        h.engine
            .create_subject(&admin, ece.id, ece3.id, "Signals")
            .await
            .unwrap();

        let semesters = h.engine.list_semesters(cse.id).await.unwrap();
        assert_eq!(
            semesters.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![3, 4]
        );

        let subjects = h.engine.list_subjects(cse.id, Some(cse3.id)).await.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "DSA");

        let all_cse = h.engine.list_subjects(cse.id, None).await.unwrap();
        assert_eq!(all_cse.len(), 2);

        // ECE's semester id under the CSE branch matches nothing.
        assert!(
            h.engine
                .list_subjects(cse.id, Some(ece3.id))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_with_dependents_conflicts_and_without_succeeds() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let sem = h.engine.create_semester(&admin, cse.id, 1).await.unwrap();
        let subject = h
            .engine
            .create_subject(&admin, cse.id, sem.id, "Maths")
            .await
            .unwrap();

        let err = h.engine.delete_branch(&admin, cse.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = h.engine.delete_semester(&admin, sem.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        h.engine.delete_subject(&admin, subject.id).await.unwrap();
        h.engine.delete_semester(&admin, sem.id).await.unwrap();
        h.engine.delete_branch(&admin, cse.id).await.unwrap();

        let err = h.engine.delete_branch(&admin, cse.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn branch_with_registered_students_cannot_be_deleted() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        h.verified_user(&cse, "a@x.com").await;

        let err = h.engine.delete_branch(&admin, cse.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn taxonomy_changes_require_admin() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let student = h.approved_user(&admin, &cse, "s@x.com").await;

        let err = h.engine.create_branch(&student, "ME").await.unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::WrongRole));

        let err = h
            .engine
            .delete_branch(&Actor::Anonymous, cse.id)
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotAuthenticated));

        assert_eq!(h.engine.list_branches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_path_requires_connected_leaf() {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let ece = h.branch(&admin, "ECE").await;
        let sem = h.engine.create_semester(&admin, cse.id, 3).await.unwrap();
        let subject = h
            .engine
            .create_subject(&admin, cse.id, sem.id, "DSA")
            .await
            .unwrap();

        let path = h
            .engine
            .resolve_path(cse.id, sem.id, subject.id)
            .await
            .unwrap();
        assert_eq!(path.subject.name, "DSA");

        let err = h
            .engine
            .resolve_path(ece.id, sem.id, subject.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference("semester")));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_unavailable() {
        let h = Harness::new();
        h.engine.store().set_offline(true);
        let err = h.engine.list_branches().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let h = Harness::new();
        let admin = h.admin().await;
        let err = h.engine.create_branch(&admin, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
