use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json, async_trait,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::AdminSeed;
use crate::error::AppError;

/// Name of the session cookie set on login
pub const TOKEN_COOKIE: &str = "token";

const MIN_PASSWORD_LEN: usize = 6;

/// User data structure representing an administrator account
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    /// Username (unique identifier for login)
    pub username: String,

    /// Display name
    pub name: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// User as returned by the API, without the password hash
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a user with a fresh id, hashing `password` with Argon2
    pub fn new(username: &str, name: &str, password: &str) -> Result<Self, UserError> {
        Ok(User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            name: name.to_string(),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        })
    }
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User {0} already exists")]
    AlreadyExists(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Failed to access users file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse users data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("User store lock poisoned")]
    Poisoned,
}

/// Registered users, optionally persisted to a JSON file
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
    path: Option<PathBuf>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load users from `path`, creating the file (and its directory) if missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, UserError> {
        let path = path.into();
        let users = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, b"{}")?;
            HashMap::new()
        };

        Ok(UserStore {
            users: RwLock::new(users),
            path: Some(path),
        })
    }

    fn save(&self, users: &HashMap<String, User>) -> Result<(), UserError> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(users)?;
            write_file(path, &json)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, UserError> {
        Ok(self.users.read().map_err(|_| UserError::Poisoned)?.is_empty())
    }

    /// All users, newest first
    pub fn list(&self) -> Result<Vec<PublicUser>, UserError> {
        let users = self.users.read().map_err(|_| UserError::Poisoned)?;
        let mut list: Vec<PublicUser> = users.values().map(PublicUser::from).collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    pub fn find(&self, username: &str) -> Result<Option<User>, UserError> {
        let users = self.users.read().map_err(|_| UserError::Poisoned)?;
        Ok(users.get(username).cloned())
    }

    /// Register a new user
    ///
    /// The password is hashed before the store lock is taken; usernames are
    /// unique.
    pub fn create(&self, username: &str, name: &str, password: &str) -> Result<User, UserError> {
        if self.find(username)?.is_some() {
            return Err(UserError::AlreadyExists(username.to_string()));
        }
        let user = User::new(username, name, password)?;
        self.insert(user.clone())?;
        Ok(user)
    }

    /// Add an already-hashed user, persisting the file
    pub fn insert(&self, user: User) -> Result<(), UserError> {
        let mut users = self.users.write().map_err(|_| UserError::Poisoned)?;
        if users.contains_key(&user.username) {
            return Err(UserError::AlreadyExists(user.username));
        }

        let username = user.username.clone();
        users.insert(username.clone(), user);
        if let Err(e) = self.save(&users) {
            users.remove(&username);
            return Err(e);
        }
        Ok(())
    }

    /// Check credentials, returning the user when they match
    pub fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        match self.find(username)? {
            Some(user) if verify_password(password, &user.password_hash)? => Ok(Some(user)),
            _ => Ok(None),
        }
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Create the configured administrator when no user exists yet
pub fn seed_admin(users: &UserStore, seed: &AdminSeed) -> Result<(), UserError> {
    if users.is_empty()? {
        users.create(&seed.username, &seed.name, &seed.password)?;
        info!("Created initial administrator {}", seed.username);
    }
    Ok(())
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::Hash(e.to_string()))
}

/// Verify a password against a stored hash
fn verify_password(password: &str, hash: &str) -> Result<bool, UserError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| UserError::Hash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Session token payload
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies signed session tokens (HS256)
pub struct AuthGate {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl AuthGate {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        AuthGate {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

/// Pull the session token from `Authorization: Bearer` or the token cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Extractor for handlers that require a signed-in user.
///
/// Rejects with 401 before the request body is read, so mutating handlers
/// never reach the store without a valid token.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let claims = state.auth.verify(&token).map_err(|e| {
            warn!("Rejected session token: {:?}", e);
            e
        })?;
        Ok(AuthUser(claims))
    }
}

/// Credential data for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn validate_login(request: &LoginRequest) -> Result<(), AppError> {
    if request.username.trim().is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Handle user login requests
///
/// Verifies the credentials, issues a token and stores it in an http-only
/// cookie. The token is also returned in the body for API clients.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|_| AppError::Validation("Username and password are required".into()))?;
    validate_login(&request)?;

    let users_state = Arc::clone(&state);
    let username = request.username.trim().to_string();
    let user = tokio::task::spawn_blocking(move || {
        users_state
            .users
            .verify_credentials(&username, &request.password)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??
    .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let token = state.auth.issue(&user)?;
    let max_age = time::Duration::seconds(state.auth.ttl().as_secs() as i64);
    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .http_only(true)
        .secure(state.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .path("/")
        .build();

    info!("User {} logged in", user.username);
    Ok((
        jar.add(cookie),
        Json(json!({
            "success": true,
            "message": "Login successful",
            "token": token,
            "user": PublicUser::from(&user),
        })),
    ))
}

/// Handle user logout
///
/// Clears the session cookie. Tokens are stateless, so a copy held elsewhere
/// stays valid until it expires.
pub async fn handle_logout(jar: CookieJar) -> impl IntoResponse {
    let mut cookie = Cookie::from(TOKEN_COOKIE);
    cookie.set_path("/");

    (
        jar.remove(cookie),
        Json(json!({ "success": true, "message": "Logged out" })),
    )
}

/// Return the identity behind the presented token
pub async fn handle_verify(AuthUser(claims): AuthUser) -> impl IntoResponse {
    Json(json!({ "success": true, "user": claims }))
}

pub async fn list_users(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list()?;
    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn create_user(
    AuthUser(creator): AuthUser,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|_| AppError::Validation("Missing required fields".to_string()))?;

    let username = request.username.trim();
    let name = request.name.trim();
    if username.is_empty() || name.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if state.users.find(username)?.is_some() {
        return Err(UserError::AlreadyExists(username.to_string()).into());
    }

    // Hash off the async workers and outside the store lock
    let (username, name, password) = (username.to_string(), name.to_string(), request.password);
    let user = tokio::task::spawn_blocking(move || User::new(&username, &name, &password))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    state.users.insert(user.clone())?;
    info!("User {} created by {}", user.username, creator.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User created successfully",
            "user": PublicUser::from(&user),
        })),
    ))
}
