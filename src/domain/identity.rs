//! Account lifecycle: registration, email verification, admin review,
//! sessions and password resets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    notify::{Notification, Template, dispatch},
    security::{TokenError, TokenPurpose},
    store::RecordStore,
};

use super::{
    Engine,
    error::{CoreError, CoreResult},
    model::{
        Account, AccountState, AccountView, Application, ApplicationView, ApprovalStatus,
        ReviewDecision, Role,
    },
    policy::{Action, Actor, Principal, Resource},
};

pub const SESSION_TTL_DAYS: i64 = 7;
pub const VERIFY_EMAIL_TTL_HOURS: i64 = 24;
pub const PASSWORD_RESET_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub branch_id: Uuid,
    #[serde(default)]
    pub college: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationForm {
    pub full_name: String,
    pub college: String,
    pub branch_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountView,
}

/// Public answer to "where is my application?".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    pub email: String,
    pub approval_status: ApprovalStatus,
    pub state: AccountState,
    pub review_comment: Option<String>,
    pub application_submitted: bool,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn require_field(value: &str, field: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl<S: RecordStore> Engine<S> {
    pub async fn register(&self, input: Registration) -> CoreResult<AccountView> {
        require_field(&input.name, "name")?;
        require_field(&input.email, "email")?;
        require_field(&input.password, "password")?;
        let email = normalize_email(&input.email);
        if !email.contains('@') {
            return Err(CoreError::validation("email address is malformed"));
        }

        if self.store.get_branch(input.branch_id).await?.is_none() {
            return Err(CoreError::InvalidReference("branch"));
        }
        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(CoreError::DuplicateKey("email"));
        }

        let credential_hash = self.credentials.hash(&input.password).map_err(|err| {
            error!(?err, "failed to hash password during registration");
            CoreError::Unavailable(err.to_string())
        })?;

        let account = Account {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email,
            credential_hash,
            branch_id: Some(input.branch_id),
            college: input
                .college
                .as_deref()
                .map(str::trim)
                .filter(|college| !college.is_empty())
                .map(str::to_string),
            role: Role::User,
            email_verified: false,
            approval_status: ApprovalStatus::Pending,
            review_comment: None,
            created_at: Utc::now(),
        };

        let verify = self
            .tokens
            .issue(
                account.id,
                TokenPurpose::VerifyEmail,
                Duration::hours(VERIFY_EMAIL_TTL_HOURS),
            )
            .map_err(token_failure)?;

        self.store.insert_account(&account).await?;
        info!(account_id = %account.id, email = %account.email, "registered account");

        dispatch(
            self.notifier.as_ref(),
            Notification::new(
                account.email.clone(),
                Template::VerifyEmail,
                json!({
                    "name": account.name,
                    "link": self.client_link("/verify-email", &verify.token),
                }),
            ),
        );

        Ok(account.view())
    }

    pub async fn verify_email(&self, token: &str) -> CoreResult<AccountView> {
        let account = self.account_for_token(token, TokenPurpose::VerifyEmail).await?;
        if account.email_verified {
            return Ok(account.view());
        }

        self.store.mark_email_verified(account.id).await?;
        info!(account_id = %account.id, "email verified");

        let mut account = account;
        account.email_verified = true;
        Ok(account.view())
    }

    pub async fn login(&self, email: &str, password: &str) -> CoreResult<Session> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or(CoreError::InvalidCredentials)?;

        if !self.credentials.verify(password, &account.credential_hash) {
            return Err(CoreError::InvalidCredentials);
        }
        if account.state() == AccountState::Unverified {
            return Err(CoreError::EmailNotVerified);
        }

        let issued = self
            .tokens
            .issue(
                account.id,
                TokenPurpose::Session,
                Duration::days(SESSION_TTL_DAYS),
            )
            .map_err(token_failure)?;

        info!(account_id = %account.id, "login succeeded");
        Ok(Session {
            token: issued.token,
            expires_at: issued.expires_at,
            account: account.view(),
        })
    }

    /// Resolves a session token to a principal read fresh from the store, so
    /// approval changes apply to the very next request.
    pub async fn authenticate(&self, token: &str) -> CoreResult<Principal> {
        let account = self.account_for_token(token, TokenPurpose::Session).await?;
        Ok(Principal::from(&account))
    }

    pub async fn review_account(
        &self,
        actor: &Actor,
        account_id: Uuid,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> CoreResult<AccountView> {
        self.require(actor, Action::ReviewAccount, Resource::Any)?;
        let target = decision.target();
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(CoreError::NotFound("account"))?;

        if account.is_admin() {
            return Err(CoreError::transition("account", "admin", target));
        }
        match account.state() {
            AccountState::Unverified => {
                return Err(CoreError::transition("account", AccountState::Unverified.as_str(), target));
            }
            AccountState::Approved | AccountState::Rejected => {
                return if account.approval_status == target {
                    Ok(account.view())
                } else {
                    Err(CoreError::transition("account", account.approval_status, target))
                };
            }
            AccountState::PendingReview => {}
        }

        let swapped = self
            .store
            .compare_and_set_approval(
                account_id,
                ApprovalStatus::Pending,
                target,
                comment.as_deref(),
            )
            .await?;

        if !swapped {
            // Another admin decided first.
            let current = self
                .store
                .get_account(account_id)
                .await?
                .ok_or(CoreError::NotFound("account"))?;
            if current.approval_status == target {
                return Ok(current.view());
            }
            return Err(CoreError::transition("account", current.approval_status, target));
        }

        account.approval_status = target;
        account.review_comment = comment;
        info!(%account_id, status = %target, "account reviewed");

        let template = match decision {
            ReviewDecision::Approve => Template::AccountApproved,
            ReviewDecision::Reject => Template::AccountRejected,
        };
        dispatch(
            self.notifier.as_ref(),
            Notification::new(
                account.email.clone(),
                template,
                json!({ "name": account.name, "comment": account.review_comment }),
            ),
        );

        Ok(account.view())
    }

    pub async fn submit_application(
        &self,
        actor: &Actor,
        form: ApplicationForm,
    ) -> CoreResult<ApplicationView> {
        self.require(actor, Action::SubmitApplication, Resource::Any)?;
        let Some(principal) = actor.principal() else {
            return Err(CoreError::Forbidden(super::DenyReason::NotAuthenticated));
        };
        require_field(&form.full_name, "full name")?;
        require_field(&form.college, "college")?;

        let account = self
            .store
            .get_account(principal.account_id)
            .await?
            .ok_or(CoreError::NotFound("account"))?;
        if !account.email_verified {
            return Err(CoreError::EmailNotVerified);
        }

        if self.store.get_application(account.id).await?.is_some() {
            return Err(CoreError::DuplicateKey("application"));
        }
        if account.approval_status != ApprovalStatus::Pending {
            return Err(CoreError::transition(
                "application",
                account.approval_status,
                ApprovalStatus::Pending,
            ));
        }
        if self.store.get_branch(form.branch_id).await?.is_none() {
            return Err(CoreError::InvalidReference("branch"));
        }

        let application = Application {
            account_id: account.id,
            full_name: form.full_name.trim().to_string(),
            college: form.college.trim().to_string(),
            branch_id: form.branch_id,
            created_at: Utc::now(),
        };
        self.store.insert_application(&application).await?;
        info!(account_id = %account.id, "application submitted");

        Ok(ApplicationView {
            application,
            account: account.view(),
        })
    }

    pub async fn request_password_reset(&self, email: &str) -> CoreResult<()> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or(CoreError::NotFound("account"))?;

        let reset = self
            .tokens
            .issue(
                account.id,
                TokenPurpose::PasswordReset,
                Duration::minutes(PASSWORD_RESET_TTL_MINUTES),
            )
            .map_err(token_failure)?;

        info!(account_id = %account.id, "password reset requested");
        dispatch(
            self.notifier.as_ref(),
            Notification::new(
                account.email.clone(),
                Template::PasswordReset,
                json!({
                    "name": account.name,
                    "link": self.client_link("/reset-password", &reset.token),
                }),
            ),
        );
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> CoreResult<()> {
        require_field(new_password, "password")?;
        let account = self
            .account_for_token(token, TokenPurpose::PasswordReset)
            .await?;

        let credential_hash = self.credentials.hash(new_password).map_err(|err| {
            error!(?err, "failed to hash password during reset");
            CoreError::Unavailable(err.to_string())
        })?;
        if !self
            .store
            .update_credential(account.id, &credential_hash)
            .await?
        {
            return Err(CoreError::InvalidToken);
        }
        info!(account_id = %account.id, "password reset");
        Ok(())
    }

    pub async fn application_status(&self, email: &str) -> CoreResult<ApplicationStatus> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or(CoreError::NotFound("account"))?;
        let application_submitted = self.store.get_application(account.id).await?.is_some();

        Ok(ApplicationStatus {
            state: account.state(),
            email: account.email,
            approval_status: account.approval_status,
            review_comment: account.review_comment,
            application_submitted,
        })
    }

    pub async fn me(&self, actor: &Actor) -> CoreResult<AccountView> {
        self.require(actor, Action::ViewOwnAccount, Resource::Any)?;
        let Some(principal) = actor.principal() else {
            return Err(CoreError::Forbidden(super::DenyReason::NotAuthenticated));
        };
        let account = self
            .store
            .get_account(principal.account_id)
            .await?
            .ok_or(CoreError::NotFound("account"))?;
        Ok(account.view())
    }

    pub async fn list_accounts(
        &self,
        actor: &Actor,
        status: Option<ApprovalStatus>,
    ) -> CoreResult<Vec<AccountView>> {
        self.require(actor, Action::ReviewAccount, Resource::Any)?;
        let accounts = self.store.list_accounts(status).await?;
        Ok(accounts
            .iter()
            .filter(|account| !account.is_admin())
            .map(Account::view)
            .collect())
    }

    pub async fn list_applications(&self, actor: &Actor) -> CoreResult<Vec<ApplicationView>> {
        self.require(actor, Action::ReviewAccount, Resource::Any)?;
        let applications = self.store.list_applications().await?;

        let mut views = Vec::with_capacity(applications.len());
        for application in applications {
            match self.store.get_account(application.account_id).await? {
                Some(account) => views.push(ApplicationView {
                    application,
                    account: account.view(),
                }),
                None => warn!(account_id = %application.account_id, "application without account"),
            }
        }
        Ok(views)
    }

    /// Creates the bootstrap admin when no admin exists. Returns whether one
    /// was created.
    pub async fn ensure_seed_admin(&self, email: &str, password: &str) -> CoreResult<bool> {
        if self.store.admin_exists().await? {
            return Ok(false);
        }
        require_field(password, "seed admin password")?;

        let credential_hash = self
            .credentials
            .hash(password)
            .map_err(|err| CoreError::Unavailable(err.to_string()))?;
        let account = Account {
            id: Uuid::new_v4(),
            name: "Administrator".to_string(),
            email: normalize_email(email),
            credential_hash,
            branch_id: None,
            college: None,
            role: Role::Admin,
            email_verified: true,
            approval_status: ApprovalStatus::Approved,
            review_comment: None,
            created_at: Utc::now(),
        };
        self.store.insert_account(&account).await?;
        info!(
            email = %account.email,
            "Seeded default admin account. Change its password promptly."
        );
        Ok(true)
    }

    async fn account_for_token(&self, token: &str, purpose: TokenPurpose) -> CoreResult<Account> {
        let claims = self.tokens.verify(token).map_err(|err| {
            if let TokenError::Signing(message) = &err {
                error!(%message, "token verification could not run");
            }
            CoreError::InvalidToken
        })?;
        if claims.purpose != purpose {
            return Err(CoreError::InvalidToken);
        }
        self.store
            .get_account(claims.sub)
            .await?
            .ok_or(CoreError::InvalidToken)
    }
}

fn token_failure(err: TokenError) -> CoreError {
    error!(?err, "failed to issue token");
    CoreError::Unavailable(err.to_string())
}
