//! Document registry: uploads, audience-scoped listings and moderation.

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    notify::{Notification, Template, dispatch},
    objects::{ObjectStoreError, StorageRef},
    store::{DocumentQuery, RecordStore},
};

use super::{
    Engine,
    error::{CoreError, CoreResult},
    model::{Account, Document, DocumentFilter, DocumentType, DocumentView, ModerationStatus},
    policy::{Action, Actor, DenyReason, Resource},
};

/// File received from the caller, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    fn is_pdf(&self) -> bool {
        let by_mime = self
            .content_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .is_some_and(|parsed| parsed.essence_str() == mime::APPLICATION_PDF.essence_str());
        let by_extension = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        by_mime || by_extension
    }
}

#[derive(Debug, Clone)]
pub struct DocumentSubmission {
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub subject_id: Uuid,
    /// Raw type label as sent by the client.
    pub doc_type: String,
    pub file: UploadedFile,
}

/// Who a listing is for; decides which documents are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    Own,
    All,
}

impl<S: RecordStore> Engine<S> {
    pub async fn submit_document(
        &self,
        actor: &Actor,
        submission: DocumentSubmission,
    ) -> CoreResult<DocumentView> {
        self.require(actor, Action::UploadDocument, Resource::Any)?;
        let Some(principal) = actor.principal() else {
            return Err(CoreError::Forbidden(DenyReason::NotAuthenticated));
        };
        let uploader = self
            .store
            .get_account(principal.account_id)
            .await?
            .ok_or(CoreError::NotFound("account"))?;

        let doc_type = DocumentType::parse(&submission.doc_type)
            .ok_or_else(|| CoreError::UnsupportedType(submission.doc_type.clone()))?;
        let path = self
            .resolve_path(
                submission.branch_id,
                submission.semester_id,
                submission.subject_id,
            )
            .await?;

        let file = submission.file;
        if file.bytes.is_empty() {
            return Err(CoreError::validation("uploaded file is empty"));
        }
        if !file.is_pdf() {
            return Err(CoreError::validation("only PDF files are accepted"));
        }

        let title = {
            let sanitized = sanitize_filename::sanitize(&file.file_name);
            if sanitized.is_empty() {
                "document.pdf".to_string()
            } else {
                sanitized
            }
        };

        let storage_ref = self
            .objects
            .put(&title, &file.bytes)
            .await
            .map_err(|err| {
                error!(?err, "failed to store uploaded document");
                CoreError::Unavailable(err.to_string())
            })?;

        let document = Document {
            id: Uuid::new_v4(),
            uploader_id: principal.account_id,
            branch_id: path.branch.id,
            semester_id: path.semester.id,
            subject_id: path.subject.id,
            doc_type,
            title,
            storage_ref,
            moderation_status: ModerationStatus::Pending,
            review_comment: None,
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.insert_document(&document).await {
            if let Err(cleanup) = self.objects.delete(&document.storage_ref).await {
                warn!(?cleanup, storage_ref = %document.storage_ref, "failed to remove orphaned object");
            }
            return Err(err.into());
        }

        info!(
            document_id = %document.id,
            uploader_id = %document.uploader_id,
            doc_type = %document.doc_type,
            "document submitted"
        );
        Ok(self.document_view(document, Some(&uploader), false))
    }

    pub async fn list_documents(
        &self,
        actor: &Actor,
        audience: Audience,
        filter: &DocumentFilter,
    ) -> CoreResult<Vec<DocumentView>> {
        let mut query = DocumentQuery {
            uploader_id: None,
            branch_id: filter.branch_id,
            semester_id: filter.semester_id,
            subject_id: filter.subject_id,
            doc_type: filter.doc_type,
            statuses: filter.status.map(|status| vec![status]),
        };

        match audience {
            Audience::Public => {
                self.require(actor, Action::ReadPublic, Resource::Any)?;
                query.statuses = match filter.status {
                    Some(status) if !status.is_public() => return Ok(Vec::new()),
                    Some(status) => Some(vec![status]),
                    None => Some(ModerationStatus::PUBLIC.to_vec()),
                };
            }
            Audience::Own => {
                let owner = actor
                    .principal()
                    .map(|principal| principal.account_id)
                    .ok_or(CoreError::Forbidden(DenyReason::NotAuthenticated))?;
                self.require(actor, Action::ReadOwnDocuments, Resource::OwnedBy(owner))?;
                query.uploader_id = Some(owner);
            }
            Audience::All => {
                self.require(actor, Action::ModerateDocument, Resource::Any)?;
            }
        }

        let documents = self.store.find_documents(&query).await?;
        self.document_views(documents, audience == Audience::All).await
    }

    /// Moves a document along a moderation edge and notifies the uploader.
    pub async fn set_document_status(
        &self,
        actor: &Actor,
        document_id: Uuid,
        target: ModerationStatus,
        comment: Option<String>,
    ) -> CoreResult<DocumentView> {
        self.require(actor, Action::ModerateDocument, Resource::Any)?;
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or(CoreError::NotFound("document"))?;
        let from = document.moderation_status;

        if !from.can_transition_to(target) {
            return Err(CoreError::transition("document", from, target));
        }

        let swapped = self
            .store
            .compare_and_set_moderation(document_id, from, target, comment.as_deref())
            .await?;
        if !swapped {
            let current = self
                .store
                .get_document(document_id)
                .await?
                .map(|d| d.moderation_status)
                .unwrap_or(from);
            return Err(CoreError::transition("document", current, target));
        }

        document.moderation_status = target;
        document.review_comment = comment;
        info!(%document_id, %from, to = %target, "document moderated");

        // Already committed; a failed lookup only skips the mail.
        let uploader = match self.store.get_account(document.uploader_id).await {
            Ok(account) => account,
            Err(err) => {
                warn!(?err, %document_id, "could not load uploader after moderation");
                None
            }
        };
        self.notify_uploader(&document, uploader.as_ref(), moderation_template(from, target));
        Ok(self.document_view(document, uploader.as_ref(), true))
    }

    /// Reads a stored file back for download.
    pub async fn fetch_file(&self, reference: &StorageRef) -> CoreResult<Vec<u8>> {
        self.objects.get(reference).await.map_err(|err| match err {
            ObjectStoreError::InvalidReference(_) | ObjectStoreError::NotFound(_) => {
                CoreError::NotFound("file")
            }
            ObjectStoreError::Io(err) => {
                error!(?err, %reference, "failed to read stored file");
                CoreError::Unavailable(err.to_string())
            }
        })
    }

    fn document_view(
        &self,
        document: Document,
        uploader: Option<&Account>,
        with_email: bool,
    ) -> DocumentView {
        DocumentView {
            url: self.objects.url_for(&document.storage_ref),
            id: document.id,
            uploader_id: document.uploader_id,
            branch_id: document.branch_id,
            semester_id: document.semester_id,
            subject_id: document.subject_id,
            uploader_name: uploader.map(|account| account.name.clone()),
            uploader_email: uploader
                .filter(|_| with_email)
                .map(|account| account.email.clone()),
            doc_type: document.doc_type,
            title: document.title,
            storage_ref: document.storage_ref,
            moderation_status: document.moderation_status,
            review_comment: document.review_comment,
            created_at: document.created_at,
        }
    }

    /// Builds views for a listing, loading each uploader once.
    async fn document_views(
        &self,
        documents: Vec<Document>,
        with_email: bool,
    ) -> CoreResult<Vec<DocumentView>> {
        let mut uploaders: HashMap<Uuid, Option<Account>> = HashMap::new();
        let mut views = Vec::with_capacity(documents.len());
        for document in documents {
            if !uploaders.contains_key(&document.uploader_id) {
                let account = self.store.get_account(document.uploader_id).await?;
                uploaders.insert(document.uploader_id, account);
            }
            let uploader = uploaders.get(&document.uploader_id).and_then(Option::as_ref);
            views.push(self.document_view(document, uploader, with_email));
        }
        Ok(views)
    }

    fn notify_uploader(&self, document: &Document, uploader: Option<&Account>, template: Template) {
        let Some(uploader) = uploader else {
            warn!(document_id = %document.id, "uploader missing; skipping notification");
            return;
        };

        dispatch(
            self.notifier.as_ref(),
            Notification::new(
                uploader.email.clone(),
                template,
                json!({
                    "name": uploader.name,
                    "title": document.title,
                    "comment": document.review_comment,
                }),
            ),
        );
    }
}

fn moderation_template(from: ModerationStatus, to: ModerationStatus) -> Template {
    match (from, to) {
        (ModerationStatus::Featured, ModerationStatus::Approved) => Template::DocumentUnfeatured,
        (_, ModerationStatus::Approved) => Template::DocumentApproved,
        (_, ModerationStatus::Featured) => Template::DocumentFeatured,
        _ => Template::DocumentRejected,
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        ErrorKind,
        model::{Branch, ReviewDecision, Semester, Subject},
        testkit::Harness,
    };

    use super::*;

    struct Fixture {
        h: Harness,
        admin: Actor,
        cse: Branch,
        sem3: Semester,
        dsa: Subject,
    }

    async fn fixture() -> Fixture {
        let h = Harness::new();
        let admin = h.admin().await;
        let cse = h.branch(&admin, "CSE").await;
        let sem3 = h.engine.create_semester(&admin, cse.id, 3).await.unwrap();
        let dsa = h
            .engine
            .create_subject(&admin, cse.id, sem3.id, "DSA")
            .await
            .unwrap();
        Fixture {
            h,
            admin,
            cse,
            sem3,
            dsa,
        }
    }

    impl Fixture {
        fn submission(&self, doc_type: &str) -> DocumentSubmission {
            DocumentSubmission {
                branch_id: self.cse.id,
                semester_id: self.sem3.id,
                subject_id: self.dsa.id,
                doc_type: doc_type.to_string(),
                file: UploadedFile {
                    file_name: "trees.pdf".into(),
                    content_type: Some(mime::APPLICATION_PDF.to_string()),
                    bytes: b"%PDF-1.7 trees".to_vec(),
                },
            }
        }

        async fn pending_document(&self, uploader: &Actor) -> DocumentView {
            self.h
                .engine
                .submit_document(uploader, self.submission("Handbook"))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn onboarding_to_public_listing() {
        let f = fixture().await;
        let engine = &f.h.engine;

        let registered = engine
            .register(crate::domain::identity::Registration {
                name: "A".into(),
                email: "a@x.com".into(),
                password: "pw-123456".into(),
                branch_id: f.cse.id,
                college: None,
            })
            .await
            .unwrap();
        let token = f.h.last_token("a@x.com");
        engine.verify_email(&token).await.unwrap();
        engine
            .review_account(&f.admin, registered.id, ReviewDecision::Approve, None)
            .await
            .unwrap();

        let session = engine.login("a@x.com", "pw-123456").await.unwrap();
        let student = Actor::Account(engine.authenticate(&session.token).await.unwrap());

        let doc = f.pending_document(&student).await;
        assert_eq!(doc.moderation_status, ModerationStatus::Pending);
        assert!(doc.url.starts_with("http://files.test/files/"));

        let by_branch = DocumentFilter {
            branch_id: Some(f.cse.id),
            ..DocumentFilter::default()
        };
        let public = engine
            .list_documents(&Actor::Anonymous, Audience::Public, &by_branch)
            .await
            .unwrap();
        assert!(public.is_empty());

        engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Approved, None)
            .await
            .unwrap();
        let public = engine
            .list_documents(&Actor::Anonymous, Audience::Public, &by_branch)
            .await
            .unwrap();
        assert_eq!(public.iter().map(|d| d.id).collect::<Vec<_>>(), vec![doc.id]);
        assert_eq!(
            f.h.notifier.templates().last(),
            Some(&Template::DocumentApproved)
        );
    }

    #[tokio::test]
    async fn moderation_overtaken_by_another_admin_is_rejected() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let doc = f.pending_document(&student).await;
        let sent_before = f.h.notifier.sent().len();

        // The document still reads as pending, but a rejection lands before the swap.
        f.h.engine
            .store()
            .interleave_moderation(doc.id, ModerationStatus::Rejected);
        let err = f
            .h
            .engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Approved, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.to_string().contains("rejected"));

        let stored = f.h.engine.store().get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.moderation_status, ModerationStatus::Rejected);
        assert_eq!(f.h.notifier.sent().len(), sent_before);
    }

    #[tokio::test]
    async fn failed_insert_removes_the_stored_file() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let stored_files = || std::fs::read_dir(f.h.storage_dir()).unwrap().count();

        f.h.engine.store().set_rejecting_document_inserts(true);
        let err = f
            .h
            .engine
            .submit_document(&student, f.submission("Handbook"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(stored_files(), 0);
        assert_eq!(f.h.engine.store().document_count(), 0);

        f.h.engine.store().set_rejecting_document_inserts(false);
        f.pending_document(&student).await;
        assert_eq!(stored_files(), 1);
    }

    #[tokio::test]
    async fn listings_carry_uploader_details_by_audience() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let doc = f.pending_document(&student).await;
        assert_eq!(doc.uploader_name.as_deref(), Some("Student"));
        assert_eq!(doc.uploader_email, None);

        let moderated = f
            .h
            .engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(moderated.uploader_email.as_deref(), Some("s@x.com"));

        let public = f
            .h
            .engine
            .list_documents(&Actor::Anonymous, Audience::Public, &DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(public[0].uploader_name.as_deref(), Some("Student"));
        assert_eq!(public[0].uploader_email, None);

        let all = f
            .h
            .engine
            .list_documents(&f.admin, Audience::All, &DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(all[0].uploader_email.as_deref(), Some("s@x.com"));
    }

    #[tokio::test]
    async fn moderation_follows_legal_edges_only() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let engine = &f.h.engine;

        let doc = f.pending_document(&student).await;
        let err = engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Pending, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Featured, None)
            .await
            .unwrap();
        engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Approved, None)
            .await
            .unwrap();
        let err = engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Approved, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        let err = engine
            .set_document_status(&f.admin, doc.id, ModerationStatus::Rejected, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let rejected = f.pending_document(&student).await;
        engine
            .set_document_status(
                &f.admin,
                rejected.id,
                ModerationStatus::Rejected,
                Some("blurry".into()),
            )
            .await
            .unwrap();
        for target in [ModerationStatus::Approved, ModerationStatus::Featured] {
            let err = engine
                .set_document_status(&f.admin, rejected.id, target, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        }

        let doc_templates: Vec<Template> = f
            .h
            .notifier
            .templates()
            .into_iter()
            .filter(|t| t.as_str().starts_with("document_"))
            .collect();
        assert_eq!(
            doc_templates,
            vec![
                Template::DocumentFeatured,
                Template::DocumentUnfeatured,
                Template::DocumentRejected,
            ]
        );

        let err = engine
            .set_document_status(&f.admin, Uuid::new_v4(), ModerationStatus::Approved, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unapproved_upload_is_forbidden_and_writes_nothing() {
        let f = fixture().await;
        f.h.verified_user(&f.cse, "p@x.com").await;
        let pending = f.h.actor_for("p@x.com").await;

        let err = f
            .h
            .engine
            .submit_document(&pending, f.submission("Handbook"))
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotApproved));

        let err = f
            .h
            .engine
            .submit_document(&Actor::Anonymous, f.submission("Handbook"))
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotAuthenticated));

        assert_eq!(f.h.engine.store().document_count(), 0);
    }

    #[tokio::test]
    async fn submit_validates_type_path_and_file() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let engine = &f.h.engine;

        let err = engine
            .submit_document(&student, f.submission("Lecture Slides"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);

        let mut wrong_path = f.submission("GATE PYQ");
        wrong_path.subject_id = Uuid::new_v4();
        let err = engine
            .submit_document(&student, wrong_path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);

        let mut not_pdf = f.submission("GATE-PYQ");
        not_pdf.file.file_name = "notes.docx".into();
        not_pdf.file.content_type = Some("application/msword".into());
        let err = engine.submit_document(&student, not_pdf).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut empty = f.submission("GATE-PYQ");
        empty.file.bytes.clear();
        let err = engine.submit_document(&student, empty).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(engine.store().document_count(), 0);

        let doc = engine
            .submit_document(&student, f.submission("GATE PYQ"))
            .await
            .unwrap();
        assert_eq!(doc.doc_type, DocumentType::GatePyq);
        let bytes = engine.fetch_file(&doc.storage_ref).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7 trees");
    }

    #[tokio::test]
    async fn public_listing_never_leaks_unmoderated_documents() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        let engine = &f.h.engine;

        let pending = f.pending_document(&student).await;
        let approved = f.pending_document(&student).await;
        let featured = f.pending_document(&student).await;
        let rejected = f.pending_document(&student).await;
        for (doc, status) in [
            (&approved, ModerationStatus::Approved),
            (&featured, ModerationStatus::Featured),
            (&rejected, ModerationStatus::Rejected),
        ] {
            engine
                .set_document_status(&f.admin, doc.id, status, None)
                .await
                .unwrap();
        }

        let statuses = [
            None,
            Some(ModerationStatus::Pending),
            Some(ModerationStatus::Approved),
            Some(ModerationStatus::Rejected),
            Some(ModerationStatus::Featured),
        ];
        for status in statuses {
            for branch_id in [None, Some(f.cse.id)] {
                let filter = DocumentFilter {
                    branch_id,
                    status,
                    ..DocumentFilter::default()
                };
                let listed = engine
                    .list_documents(&Actor::Anonymous, Audience::Public, &filter)
                    .await
                    .unwrap();
                assert!(listed.iter().all(|d| d.moderation_status.is_public()));
                assert!(listed.iter().all(|d| d.id != pending.id && d.id != rejected.id));
            }
        }

        let all = engine
            .list_documents(&f.admin, Audience::All, &DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);

        let err = engine
            .list_documents(&student, Audience::All, &DocumentFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::WrongRole));
    }

    #[tokio::test]
    async fn own_listing_is_scoped_to_uploader() {
        let f = fixture().await;
        let alice = f.h.approved_user(&f.admin, &f.cse, "alice@x.com").await;
        let bob = f.h.approved_user(&f.admin, &f.cse, "bob@x.com").await;
        let engine = &f.h.engine;

        let alice_doc = f.pending_document(&alice).await;
        f.pending_document(&bob).await;

        let mine = engine
            .list_documents(&alice, Audience::Own, &DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(mine.iter().map(|d| d.id).collect::<Vec<_>>(), vec![alice_doc.id]);

        let err = engine
            .list_documents(&Actor::Anonymous, Audience::Own, &DocumentFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotAuthenticated));
    }

    #[tokio::test]
    async fn subject_with_documents_cannot_be_deleted() {
        let f = fixture().await;
        let student = f.h.approved_user(&f.admin, &f.cse, "s@x.com").await;
        f.pending_document(&student).await;

        let err = f
            .h
            .engine
            .delete_subject(&f.admin, f.dsa.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
