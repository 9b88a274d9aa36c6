pub mod admin;
pub mod auth;
pub mod documents;
pub mod public;
pub mod responses;
pub mod router;
pub mod state;
pub mod storage;
pub mod uploads;

pub use state::AppState;
