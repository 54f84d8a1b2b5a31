//! Client-side authentication state.
//!
//! A [`Session`] is the bearer credential; it exists from a successful login until logout and is
//! handed explicitly to every API call. [`AuthContext`] owns the current session together with
//! the login form's error and loading state.

use std::fmt;

use tracing::{info, warn};

use crate::{
    client::{ApiClient, ClientError},
    models::{FormError, FormState, RegisteredUser, UserData},
};

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Merges one changed input into a form by its field name.
pub fn handle_form_change<F: FormState>(
    form: &mut F,
    name: &str,
    value: &str,
) -> Result<(), FormError> {
    form.set_field(name, value)
}

pub struct AuthContext {
    client: ApiClient,
    session: Option<Session>,
    error_state: Option<String>,
    is_loading: bool,
}

impl AuthContext {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            session: None,
            error_state: None,
            is_loading: false,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn error_state(&self) -> Option<&str> {
        self.error_state.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Logs in and keeps the resulting session. A failure replaces any previous session.
    pub async fn login(&mut self, user: &UserData) -> Result<Session, ClientError> {
        self.is_loading = true;
        self.error_state = None;
        let result = self.client.login(user).await;
        self.is_loading = false;

        match result {
            Ok(token) => {
                let session = Session::new(token);
                self.session = Some(session.clone());
                info!(email = %user.email, "logged in");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                self.session = None;
                self.error_state = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn register(&mut self, user: &UserData) -> Result<RegisteredUser, ClientError> {
        self.is_loading = true;
        self.error_state = None;
        let result = self.client.register(user).await;
        self.is_loading = false;

        if let Err(e) = &result {
            self.error_state = Some(e.to_string());
        }
        result
    }

    /// Drops the session, returning it if there was one.
    pub fn logout(&mut self) -> Option<Session> {
        self.error_state = None;
        self.session.take()
    }

    pub fn handle_form_change<F: FormState>(
        &self,
        form: &mut F,
        name: &str,
        value: &str,
    ) -> Result<(), FormError> {
        handle_form_change(form, name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn login_then_logout() {
        let base = test_utils::spawn_server().await;
        let mut auth = AuthContext::new(ApiClient::new(&base).unwrap());

        let mut form = UserData::default();
        auth.handle_form_change(&mut form, "username", "ada").unwrap();
        auth.handle_form_change(&mut form, "email", "ada@x.com").unwrap();
        auth.handle_form_change(&mut form, "password", "pw").unwrap();

        auth.register(&form).await.unwrap();
        let session = auth.login(&form).await.unwrap();
        assert!(!auth.is_loading());
        assert_eq!(auth.error_state(), None);
        assert_eq!(auth.session(), Some(&session));

        let me = auth.client().current_user(&session).await.unwrap();
        assert_eq!(me.email, "ada@x.com");

        assert_eq!(auth.logout(), Some(session));
        assert!(auth.session().is_none());
        assert_eq!(auth.logout(), None);
    }

    #[tokio::test]
    async fn failed_login_sets_error_state() {
        let base = test_utils::spawn_server().await;
        let mut auth = AuthContext::new(ApiClient::new(&base).unwrap());

        let form = test_utils::user_data("ghost");
        let err = auth.login(&form).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(auth.error_state(), Some("email or password is not valid"));
        assert!(auth.session().is_none());
        assert!(!auth.is_loading());

        auth.register(&form).await.unwrap();
        auth.login(&form).await.unwrap();
        assert_eq!(auth.error_state(), None);
    }

    #[test]
    fn session_debug_hides_token() {
        let session = Session::new("secret-token");
        assert!(!format!("{session:?}").contains("secret-token"));
    }
}
