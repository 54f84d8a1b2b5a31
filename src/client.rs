//! Thin HTTP client for the contacts API.
//!
//! One request per call: no retry, backoff or caching. Every contacts call takes the caller's
//! [`Session`] and sends its token as `Authorization: Bearer`.

use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
    models::{
        BaseContact, Contact, ContactPatch, CurrentUser, ErrorBody, LoginResponse,
        RegisteredUser, UserData,
    },
    session::Session,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    /// The credential was missing, invalid or expired; the user should log in again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Url(e.to_string()))
    }

    fn contact_url(&self, id: &str) -> Result<Url, ClientError> {
        let mut url = self.url("api/contacts/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        decode(response).await
    }

    pub async fn register(&self, user: &UserData) -> Result<RegisteredUser, ClientError> {
        let request = self.http.post(self.url("api/users/register")?).json(user);
        Self::send(request).await
    }

    /// Exchanges credentials for a bearer token.
    pub async fn login(&self, user: &UserData) -> Result<String, ClientError> {
        let body = json!({ "email": user.email, "password": user.password });
        let request = self.http.post(self.url("api/users/login")?).json(&body);
        let response: LoginResponse = Self::send(request).await?;
        Ok(response.access_token)
    }

    pub async fn current_user(&self, session: &Session) -> Result<CurrentUser, ClientError> {
        let request = self
            .http
            .get(self.url("api/users/current")?)
            .bearer_auth(session.token());
        Self::send(request).await
    }

    pub async fn list_contacts(&self, session: &Session) -> Result<Vec<Contact>, ClientError> {
        let request = self
            .http
            .get(self.url("api/contacts/")?)
            .bearer_auth(session.token());
        Self::send(request).await
    }

    pub async fn get_contact(&self, session: &Session, id: &str) -> Result<Contact, ClientError> {
        let request = self
            .http
            .get(self.contact_url(id)?)
            .bearer_auth(session.token());
        Self::send(request).await
    }

    pub async fn create_contact(
        &self,
        session: &Session,
        contact: &BaseContact,
    ) -> Result<Contact, ClientError> {
        let request = self
            .http
            .post(self.url("api/contacts/")?)
            .bearer_auth(session.token())
            .json(contact);
        Self::send(request).await
    }

    pub async fn update_contact(
        &self,
        session: &Session,
        id: &str,
        patch: &ContactPatch,
    ) -> Result<Contact, ClientError> {
        let request = self
            .http
            .put(self.contact_url(id)?)
            .bearer_auth(session.token())
            .json(patch);
        Self::send(request).await
    }

    pub async fn delete_contact(&self, session: &Session, id: &str) -> Result<Contact, ClientError> {
        let request = self
            .http
            .delete(self.contact_url(id)?)
            .bearer_auth(session.token());
        Self::send(request).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    debug!(status = status.as_u16(), %message, "request rejected");

    Err(match status {
        StatusCode::BAD_REQUEST => ClientError::Validation(message),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        other => ClientError::Server {
            status: other.as_u16(),
            message,
        },
    })
}
