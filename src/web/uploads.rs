use std::collections::HashMap;

use axum::extract::Multipart;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::documents::{DocumentSubmission, UploadedFile};

pub const FILE_FIELD: &str = "file";
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Error returned when parsing the multipart upload form.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Raw multipart contents: text fields plus at most one file.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub file: Option<UploadedFile>,
    pub text_fields: HashMap<String, String>,
}

impl UploadOutcome {
    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn uuid_field(&self, field_name: &str) -> UploadResult<Uuid> {
        let raw = self
            .first_text(field_name)
            .ok_or_else(|| UploadError::new(format!("missing field `{field_name}`")))?;
        Uuid::parse_str(raw)
            .map_err(|_| UploadError::new(format!("field `{field_name}` is not a valid id")))
    }

    /// Builds the registry submission. Type validation stays in the domain layer so
    /// an unknown label surfaces as `unsupported_type`.
    pub fn into_submission(self) -> UploadResult<DocumentSubmission> {
        let branch_id = self.uuid_field("branchId")?;
        let semester_id = self.uuid_field("semesterId")?;
        let subject_id = self.uuid_field("subjectId")?;
        let doc_type = self
            .first_text("type")
            .ok_or_else(|| UploadError::new("missing field `type`"))?
            .to_string();
        let file = self
            .file
            .ok_or_else(|| UploadError::new(format!("missing file field `{FILE_FIELD}`")))?;

        Ok(DocumentSubmission {
            branch_id,
            semester_id,
            subject_id,
            doc_type,
            file,
        })
    }
}

/// Buffers the upload form in memory. Files are only written to storage
/// after the registry has accepted the submission.
pub async fn read_upload_form(mut multipart: Multipart) -> UploadResult<UploadOutcome> {
    let mut outcome = UploadOutcome::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("failed to parse upload form: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if field.file_name().is_none() {
            let value = field
                .text()
                .await
                .map_err(|err| UploadError::new(format!("failed to read field `{field_name}`: {err}")))?;
            outcome.text_fields.insert(field_name, value);
            continue;
        }

        if field_name != FILE_FIELD {
            return Err(UploadError::new(format!(
                "unsupported file field `{field_name}`"
            )));
        }
        if outcome.file.is_some() {
            return Err(UploadError::new("only one file may be uploaded at a time"));
        }

        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| UploadError::new(format!("failed to read upload data: {err}")))?
        {
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(UploadError::new(format!(
                    "file exceeds the {} MB limit",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        outcome.file = Some(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }

    Ok(outcome)
}
