//! Account management: registration, verification by an admin, and sign-in.
//!
//! New accounts start out unverified. Registering sends a verification
//! request to the site admins (not to the user) containing a signed,
//! short-lived token; following it marks the account verified.

use crate::config::Config;
use crate::notify::{self, Mailer};
use crate::store::{self, Store};
use crate::user::{NewUser, User, UserId, UserLevel};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long a verification token stays valid by default.
pub const TOKEN_LIFETIME_SECS: i64 = 600;

const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

/// A registration form as submitted.
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,

    /// Must repeat `password`.
    pub password2: String,
}

/// The outcome of [`verify_account`].
#[derive(Clone, Debug, PartialEq)]
pub enum Verification {
    Verified(User),
    AlreadyVerified(User),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The ID of the user to verify.
    verify: u64,
    exp: i64,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::Invalid {
        field,
        reason: reason.into(),
    }
}

fn validate_username<S: Store + ?Sized>(
    store: &S,
    username: &str,
) -> Result<()> {
    if username.trim().is_empty() {
        return Err(invalid("username", "this field is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(invalid(
            "username",
            format!("must be at most {} characters", MAX_USERNAME_LEN),
        ));
    }
    if store.find_user_by_username(username)?.is_some() {
        return Err(invalid("username", "please use a different username"));
    }
    Ok(())
}

fn validate_email<S: Store + ?Sized>(store: &S, email: &str) -> Result<()> {
    let shaped = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !shaped {
        return Err(invalid("email", "invalid email address"));
    }
    if store.find_user_by_email(email)?.is_some() {
        return Err(invalid("email", "please use a different email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Hashes `password` into a PHC string with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::Hash(err.to_string()))
}

/// Whether `password` matches the PHC string `hash`.
pub fn check_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn insert<S: Store + ?Sized>(store: &S, user: NewUser) -> Result<User> {
    store.insert_user(user).map_err(|err| match err {
        // lost a race against a concurrent registration
        store::Error::Conflict { field, .. } => invalid(field, "already taken"),
        err => Error::Store(err),
    })
}

/// Registers an unverified account and asks the admins to verify it.
///
/// The account is created even if the verification request can't be sent;
/// the failure is only logged.
pub fn register<S: Store + ?Sized>(
    store: &S,
    mailer: &dyn Mailer,
    config: &Config,
    registration: Registration,
) -> Result<User> {
    validate_username(store, &registration.username)?;
    validate_email(store, &registration.email)?;
    validate_password(&registration.password)?;
    if registration.password != registration.password2 {
        return Err(invalid("password2", "passwords must match"));
    }

    let user = insert(
        store,
        NewUser {
            username: registration.username,
            email: registration.email,
            password_hash: hash_password(&registration.password)?,
            level: UserLevel::Normal,
            is_verified: false,
        },
    )?;
    tracing::info!(user = %user.username, id = %user.id, "registered account");

    let lifetime = Duration::seconds(TOKEN_LIFETIME_SECS);
    let sent = issue_token(&config.secret, user.id, lifetime)
        .and_then(|token| {
            Ok(notify::verification_message(
                config,
                &user,
                &token,
                lifetime.num_minutes(),
            )?)
        })
        .and_then(|message| Ok(mailer.send(&message)?));
    if let Err(err) = sent {
        tracing::warn!(
            user = %user.username,
            "sending verification request failed: {}",
            err
        );
    }
    Ok(user)
}

/// Issues a token that verifies `user` when passed to [`verify_account`]
/// within `lifetime`.
pub fn issue_token(
    secret: &str,
    user: UserId,
    lifetime: Duration,
) -> Result<String> {
    let claims = Claims {
        verify: user.0,
        exp: (Utc::now() + lifetime).timestamp(),
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Marks the user named by `token` verified.
pub fn verify_account<S: Store + ?Sized>(
    store: &S,
    secret: &str,
    token: &str,
) -> Result<Verification> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(Error::InvalidToken)?
    .claims;

    let id = UserId(claims.verify);
    let mut user = store.find_user(id)?.ok_or(Error::UnknownUser(id))?;
    if user.is_verified {
        return Ok(Verification::AlreadyVerified(user));
    }
    user.is_verified = true;
    let user = store.update_user(user)?;
    tracing::info!(user = %user.username, id = %user.id, "verified account");
    Ok(Verification::Verified(user))
}

/// Checks a username and password. Only verified accounts may sign in.
pub fn login<S: Store + ?Sized>(
    store: &S,
    username: &str,
    password: &str,
) -> Result<User> {
    let user = match store.find_user_by_username(username)? {
        Some(user) if check_password(password, &user.password_hash) => user,
        _ => return Err(Error::InvalidCredentials),
    };
    if !user.is_verified {
        return Err(Error::NotVerified(user.username));
    }
    Ok(user)
}

/// Creates a verified admin account, for bootstrapping a new site.
pub fn create_admin<S: Store + ?Sized>(
    store: &S,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User> {
    validate_username(store, username)?;
    validate_email(store, email)?;
    validate_password(password)?;
    let user = insert(
        store,
        NewUser {
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: hash_password(password)?,
            level: UserLevel::Admin,
            is_verified: true,
        },
    )?;
    tracing::info!(
        user = %user.username,
        id = %user.id,
        "created admin account"
    );
    Ok(user)
}

/// The result of an account operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in an account operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("the verification link is invalid or has expired")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account `{0}` has not been verified yet")]
    NotVerified(String),

    #[error("hashing password: {0}")]
    Hash(String),

    #[error("issuing token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("sending verification request: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Store(#[from] store::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notify::test::{test_config, RecordingMailer};
    use crate::store::MemoryStore;

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_owned(),
            email: format!("{}@example.org", username),
            password: "correct horse".to_owned(),
            password2: "correct horse".to_owned(),
        }
    }

    #[test]
    fn test_register_sends_request_to_admins() -> Result<()> {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let config = test_config();
        let user = register(&store, &mailer, &config, registration("ann"))?;

        assert!(!user.is_verified);
        assert_eq!(UserLevel::Normal, user.level);
        assert_ne!("correct horse", user.password_hash);
        let sent = mailer.sent.lock();
        assert_eq!(1, sent.len());
        assert_eq!(vec!["root@example.org".to_owned()], sent[0].recipients);
        assert!(sent[0].text_body.contains("/cms/verify_account/"));
        Ok(())
    }

    #[test]
    fn test_register_survives_mail_failure() -> Result<()> {
        let store = MemoryStore::new();
        let mailer = RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        };
        register(&store, &mailer, &test_config(), registration("ann"))?;
        assert!(store.find_user_by_username("ann")?.is_some());
        Ok(())
    }

    #[test]
    fn test_register_validation() -> Result<()> {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::default();
        let config = test_config();
        register(&store, &mailer, &config, registration("ann"))?;

        let cases: Vec<(&str, Registration)> = vec![
            ("username", registration("ann")),
            ("username", registration(&"x".repeat(65))),
            ("email", Registration {
                email: "ann@example.org".to_owned(),
                ..registration("bob")
            }),
            ("email", Registration {
                email: "not-an-address".to_owned(),
                ..registration("bob")
            }),
            ("password", Registration {
                password: "short".to_owned(),
                password2: "short".to_owned(),
                ..registration("bob")
            }),
            ("password2", Registration {
                password2: "something else".to_owned(),
                ..registration("bob")
            }),
        ];
        for (wanted, case) in cases {
            match register(&store, &mailer, &config, case) {
                Err(Error::Invalid { field, .. }) => assert_eq!(wanted, field),
                other => panic!("wanted invalid {}; found {:?}", wanted, other),
            }
        }
        Ok(())
    }

    #[test]
    fn test_verify_then_login() -> Result<()> {
        let store = MemoryStore::new();
        let config = test_config();
        let mailer = RecordingMailer::default();
        let user = register(&store, &mailer, &config, registration("ann"))?;
        assert!(matches!(
            login(&store, "ann", "correct horse"),
            Err(Error::NotVerified(_))
        ));

        let token =
            issue_token(&config.secret, user.id, Duration::seconds(60))?;
        assert!(matches!(
            verify_account(&store, &config.secret, &token)?,
            Verification::Verified(_)
        ));
        assert!(matches!(
            verify_account(&store, &config.secret, &token)?,
            Verification::AlreadyVerified(_)
        ));
        assert_eq!(user.id, login(&store, "ann", "correct horse")?.id);
        Ok(())
    }

    #[test]
    fn test_bad_tokens_are_rejected() -> Result<()> {
        let store = MemoryStore::new();
        let config = test_config();
        let mailer = RecordingMailer::default();
        let user = register(&store, &mailer, &config, registration("ann"))?;

        let expired =
            issue_token(&config.secret, user.id, Duration::seconds(-30))?;
        let foreign =
            issue_token("another secret", user.id, Duration::seconds(60))?;
        for token in [expired.as_str(), foreign.as_str(), "not-a-token"] {
            assert!(matches!(
                verify_account(&store, &config.secret, token),
                Err(Error::InvalidToken(_))
            ));
        }
        assert!(!store.find_user(user.id)?.unwrap().is_verified);
        Ok(())
    }

    #[test]
    fn test_unknown_user_token() -> Result<()> {
        let store = MemoryStore::new();
        let token = issue_token("s3cret", UserId(42), Duration::seconds(60))?;
        assert!(matches!(
            verify_account(&store, "s3cret", &token),
            Err(Error::UnknownUser(UserId(42)))
        ));
        Ok(())
    }

    #[test]
    fn test_login_rejects_bad_credentials() -> Result<()> {
        let store = MemoryStore::new();
        create_admin(&store, "root", "root@example.org", "correct horse")?;
        assert!(matches!(
            login(&store, "root", "wrong password"),
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            login(&store, "nobody", "correct horse"),
            Err(Error::InvalidCredentials)
        ));
        let root = login(&store, "root", "correct horse")?;
        assert_eq!(UserLevel::Admin, root.level);
        Ok(())
    }
}
