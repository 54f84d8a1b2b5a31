use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::{
    auth::{self, AuthUser, TokenKeys},
    error::AppError,
    models::{
        Contact, ContactPatch, CurrentUser, HealthResponse, LoginResponse, RegisteredUser,
        UserData,
    },
    store::{self, Db},
};

const FIELDS_MANDATORY: &str = "All fields are mandatory!";

pub struct AppState {
    pub conn: Db,
    pub tokens: TokenKeys,
}

pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

// ────────────────────────────────────────────────────────────────────────────
// Request logging (nginx-style)
// ────────────────────────────────────────────────────────────────────────────

fn log_request(method: &Method, uri: &Uri, headers: &HeaderMap, status: StatusCode) {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    info!(
        "{} {} {} {} \"{}\" \"{}\"",
        method.as_str(),
        uri.path(),
        uri.query().unwrap_or(""),
        status.as_u16(),
        user_agent,
        referer
    );
}

pub async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    let response = next.run(request).await;
    log_request(&method, &uri, &headers, response.status());
    response
}

// ────────────────────────────────────────────────────────────────────────────
// Users
// ────────────────────────────────────────────────────────────────────────────

pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UserData>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let form = json_body(body)?;
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation(FIELDS_MANDATORY.to_string()));
    }

    let conn = state.conn.clone();
    let created = run_blocking(move || {
        let hash = auth::hash_password(&form.password)?;
        store::create_user(&conn, &username, &email, &hash)
    })
    .await?;

    let Some(user) = created else {
        return Err(AppError::Conflict("User already registered!"));
    };
    info!(user_id = %user.id, "registered user");

    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            id: user.id,
            email: user.email,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UserData>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let form = json_body(body)?;
    let email = form.email.trim().to_string();
    if email.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation(FIELDS_MANDATORY.to_string()));
    }

    let conn = state.conn.clone();
    let user = run_blocking(move || {
        let Some(user) = store::find_user_by_email(&conn, &email)? else {
            auth::burn_verification(&form.password);
            return Ok(None);
        };
        let valid = auth::verify_password(&form.password, &user.password_hash)?;
        Ok(valid.then_some(user))
    })
    .await?;

    let Some(user) = user else {
        return Err(AppError::Unauthorized("email or password is not valid"));
    };

    let access_token = state
        .tokens
        .issue(&user)
        .map_err(|e| AppError::Internal(e.into()))?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse { access_token }))
}

pub async fn current_user(user: AuthUser) -> Json<CurrentUser> {
    Json(CurrentUser {
        id: user.id,
        username: user.username,
        email: user.email,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Contacts
// ────────────────────────────────────────────────────────────────────────────

/// Loads a contact and checks that `user` owns it.
async fn owned_contact(state: &AppState, user: &AuthUser, id: String) -> Result<Contact, AppError> {
    let conn = state.conn.clone();
    let contact = run_blocking(move || store::get_contact(&conn, &id))
        .await?
        .ok_or(AppError::NotFound("Contact not found"))?;

    if contact.user_id != user.id {
        return Err(AppError::Forbidden(
            "User don't have permission to access other user contacts",
        ));
    }
    Ok(contact)
}

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Contact>>, AppError> {
    let conn = state.conn.clone();
    let contacts = run_blocking(move || store::list_contacts(&conn, &user.id)).await?;
    Ok(Json(contacts))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<ContactPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = json_body(body)?
        .into_complete()
        .ok_or_else(|| AppError::Validation(FIELDS_MANDATORY.to_string()))?;

    let conn = state.conn.clone();
    let contact = run_blocking(move || store::create_contact(&conn, &user.id, &input)).await?;
    info!(contact_id = %contact.id, "created contact");

    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Contact>, AppError> {
    let contact = owned_contact(&state, &user, id).await?;
    Ok(Json(contact))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<ContactPatch>, JsonRejection>,
) -> Result<Json<Contact>, AppError> {
    let patch = json_body(body)?;
    if patch.is_empty() || patch.has_blank_field() {
        return Err(AppError::Validation(
            "name, email or phone must be provided and not blank".to_string(),
        ));
    }

    owned_contact(&state, &user, id.clone()).await?;

    let conn = state.conn.clone();
    let updated = run_blocking(move || store::update_contact(&conn, &id, &patch))
        .await?
        .ok_or(AppError::NotFound("Contact not found"))?;
    info!(contact_id = %updated.id, "updated contact");

    Ok(Json(updated))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Contact>, AppError> {
    owned_contact(&state, &user, id.clone()).await?;

    let conn = state.conn.clone();
    let deleted = run_blocking(move || store::delete_contact(&conn, &id))
        .await?
        .ok_or(AppError::NotFound("Contact not found"))?;
    info!(contact_id = %deleted.id, "deleted contact");

    Ok(Json(deleted))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conn = state.conn.clone();
    let db_ok = tokio::task::spawn_blocking(move || store::ping(&conn))
        .await
        .unwrap_or(false);

    let resp = HealthResponse {
        status: "ok".to_string(),
        db: if db_ok { "ok".to_string() } else { "error".to_string() },
    };
    (StatusCode::OK, Json(resp))
}
