mod documents;
mod taxonomy;
mod users;

pub use documents::{approve_document, feature_document, list_documents, reject_document};
pub use taxonomy::{
    create_branch, create_semester, create_subject, delete_branch, delete_semester,
    delete_subject, list_branches, list_semesters, list_subjects,
};
pub use users::{approve_user, list_applications, list_users, reject_user};
