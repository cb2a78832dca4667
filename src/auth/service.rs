use std::sync::Arc;

use chrono::Duration;

use crate::auth::mailer::{Mailer, password_reset_email, verification_email};
use crate::auth::password::check_strength;
use crate::auth::rate_limit::LoginThrottle;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{NewUser, Session, User};
use crate::store::{SessionStore, UserStore};
use crate::utils::{
    generate_token, hash_password, is_valid_email, normalize_email, token_digest, verify_password,
};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub user: User,
    pub email_sent: bool,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    /// Raw session token; only ever handed to the cookie.
    pub token: String,
}

/// Registration, login, sessions, password reset and email verification.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    throttle: LoginThrottle,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    /// Verified against when the email is unknown so both paths cost the same.
    dummy_hash: Arc<str>,
}

async fn hash_blocking(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

async fn verify_blocking(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        throttle: LoginThrottle,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        let dummy_hash = hash_password(&generate_token(), config.bcrypt_cost).unwrap_or_default();
        Self {
            users,
            sessions,
            throttle,
            mailer,
            clock,
            config,
            dummy_hash: dummy_hash.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> AppResult<RegisterOutcome> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput(
                "Name, email and password are required".into(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::InvalidInput(format!(
                "Name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if !is_valid_email(&email) {
            return Err(AppError::InvalidInput("Invalid email address".into()));
        }
        if !self.config.is_allowed_domain(&email) {
            return Err(AppError::DomainNotAllowed);
        }
        check_strength(password)?;
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::EmailTaken);
        }

        let token = generate_token();
        let password_hash = hash_blocking(password.to_string(), self.config.bcrypt_cost).await?;
        let is_admin = self.config.is_admin_email(&email);
        let new_user = NewUser {
            name: name.to_string(),
            email: email.clone(),
            password_hash,
            is_admin,
            verification_token_digest: token_digest(&token),
            verification_expires: self.clock.now()
                + Duration::seconds(self.config.verification_token_ttl_secs as i64),
        };
        let user = match self.users.create(new_user).await {
            Ok(user) => user,
            // Lost a race against a concurrent registration of the same email.
            Err(StoreError::Duplicate(_)) => return Err(AppError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        let mail = verification_email(&self.config, &user.name, &user.email, &token);
        let email_sent = match self.mailer.send(&mail).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send verification email to user {}: {}", user.id, e);
                false
            }
        };

        tracing::info!(
            target: "security",
            event = "user_registered",
            user_id = user.id,
            admin = user.is_admin,
            email_sent,
        );
        Ok(RegisterOutcome { user, email_sent })
    }

    pub async fn login(&self, email: &str, password: &str, client_ip: &str) -> AppResult<LoginOutcome> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput("Email and password are required".into()));
        }
        let attempts = self.throttle.acquire(client_ip, &email).await?;

        let user = self.users.find_by_email(&email).await?;
        let verified = match &user {
            Some(u) => verify_blocking(password.to_string(), u.password_hash.clone()).await,
            None => {
                verify_blocking(password.to_string(), self.dummy_hash.to_string()).await;
                false
            }
        };
        let user = match user {
            Some(u) if verified && u.active => u,
            _ => {
                tracing::warn!(
                    target: "security",
                    event = "login_failed",
                    email = %email,
                    ip = %client_ip,
                    attempts,
                );
                return Err(AppError::InvalidCredentials);
            }
        };

        self.throttle.release(client_ip, &email).await?;

        if !user.email_verified && !user.is_admin && !self.config.is_development() {
            tracing::info!(
                target: "security",
                event = "login_unverified",
                user_id = user.id,
                ip = %client_ip,
            );
            return Err(AppError::EmailNotVerified);
        }

        let now = self.clock.now();
        self.users.touch_last_login(user.id, now).await?;

        let token = generate_token();
        let ttl = self.config.session_ttl();
        let session = Session {
            user_id: user.id,
            created_at: now,
            expires_at: now + Duration::seconds(ttl.as_secs() as i64),
        };
        self.sessions.create(&token, &session, ttl).await?;

        tracing::info!(
            target: "security",
            event = if user.is_admin { "admin_login" } else { "login" },
            user_id = user.id,
            ip = %client_ip,
        );
        Ok(LoginOutcome {
            user: User {
                last_login: Some(now),
                ..user
            },
            token,
        })
    }

    /// Resolve a session token to its user and slide the expiry forward.
    pub async fn validate_session(&self, token: &str) -> AppResult<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        let Some(session) = self.sessions.get(token).await? else {
            return Ok(None);
        };
        let user = match self.users.find_by_id(session.user_id).await? {
            Some(user) if user.active => user,
            _ => return Ok(None),
        };

        if let Err(e) = self.sessions.renew(token, self.config.session_ttl()).await {
            tracing::warn!("Failed to renew session of user {}: {}", user.id, e);
        }
        Ok(Some(user))
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        if token.is_empty() {
            return Ok(());
        }
        if let Some(session) = self.sessions.get(token).await? {
            tracing::info!(target: "security", event = "logout", user_id = session.user_id);
        }
        self.sessions.delete(token).await?;
        Ok(())
    }

    /// Never fails and never tells whether the account exists.
    pub async fn forgot_password(&self, email: &str) {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return;
        }
        let user = match self.users.find_by_email(&email).await {
            Ok(Some(user)) if user.active => user,
            Ok(_) => {
                tracing::info!(target: "security", event = "password_reset_unknown_email");
                return;
            }
            Err(e) => {
                tracing::error!("Password reset lookup failed: {}", e);
                return;
            }
        };

        let token = generate_token();
        let expires_at =
            self.clock.now() + Duration::seconds(self.config.reset_token_ttl_secs as i64);
        if let Err(e) = self
            .users
            .replace_reset_token(user.id, &token_digest(&token), expires_at)
            .await
        {
            tracing::error!("Failed to store reset token for user {}: {}", user.id, e);
            return;
        }
        tracing::info!(target: "security", event = "password_reset_requested", user_id = user.id);

        let mail = password_reset_email(&self.config, &user.name, &user.email, &token);
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&mail).await {
                tracing::warn!("Failed to send password reset email to user {}: {}", user.id, e);
            }
        });
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        check_strength(new_password)?;
        if token.trim().is_empty() {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let digest = token_digest(token.trim());
        let record = self
            .users
            .find_reset_token(&digest)
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;
        if record.expires_at <= self.clock.now() {
            return Err(AppError::TokenExpired);
        }
        let user = match self.users.find_by_id(record.user_id).await? {
            Some(user) if user.active => user,
            _ => return Err(AppError::InvalidOrExpiredToken),
        };

        let password_hash = hash_blocking(new_password.to_string(), self.config.bcrypt_cost).await?;
        if !self
            .users
            .complete_password_reset(user.id, &digest, &password_hash)
            .await?
        {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let revoked = self.sessions.delete_all_for_user(user.id).await?;
        tracing::info!(
            target: "security",
            event = "password_reset",
            user_id = user.id,
            sessions_revoked = revoked,
        );
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AppResult<User> {
        if token.trim().is_empty() {
            return Err(AppError::InvalidToken);
        }
        let digest = token_digest(token.trim());
        let user = self
            .users
            .find_by_verification_token(&digest)
            .await?
            .ok_or(AppError::InvalidToken)?;

        match user.email_verification_expires {
            Some(expires) if expires > self.clock.now() => {}
            _ => return Err(AppError::TokenExpired),
        }
        if !self.users.mark_email_verified(user.id, &digest).await? {
            return Err(AppError::InvalidToken);
        }

        tracing::info!(target: "security", event = "email_verified", user_id = user.id);
        Ok(User {
            email_verified: true,
            email_verification_token: None,
            email_verification_expires: None,
            ..user
        })
    }

    /// Returns whether a new verification email went out. Unknown and
    /// already-verified addresses get `false` and no error.
    pub async fn resend_verification(&self, email: &str) -> AppResult<bool> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::InvalidInput("Email is required".into()));
        }
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.active && !user.email_verified => user,
            _ => return Ok(false),
        };

        let token = generate_token();
        let expires_at =
            self.clock.now() + Duration::seconds(self.config.verification_token_ttl_secs as i64);
        if !self
            .users
            .replace_verification_token(user.id, &token_digest(&token), expires_at)
            .await?
        {
            return Ok(false);
        }

        let mail = verification_email(&self.config, &user.name, &user.email, &token);
        let sent = match self.mailer.send(&mail).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to resend verification email to user {}: {}", user.id, e);
                false
            }
        };
        tracing::info!(
            target: "security",
            event = "verification_resent",
            user_id = user.id,
            email_sent = sent,
        );
        Ok(sent)
    }

    /// Explicit admin provisioning.
    pub async fn set_admin(&self, actor: &User, user_id: i64, is_admin: bool) -> AppResult<User> {
        if !actor.is_admin {
            return Err(AppError::Forbidden);
        }
        if actor.id == user_id && !is_admin {
            return Err(AppError::InvalidInput(
                "Admins cannot revoke their own privileges".into(),
            ));
        }
        let user = self
            .users
            .set_admin(user_id, is_admin)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        tracing::info!(
            target: "security",
            event = "admin_flag_changed",
            actor_id = actor.id,
            user_id = user.id,
            admin = user.is_admin,
        );
        Ok(user)
    }
}
