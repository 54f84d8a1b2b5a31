use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// The fields a client supplies when creating a contact.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct BaseContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<&Contact> for BaseContact {
    fn from(contact: &Contact) -> Self {
        Self {
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
        }
    }
}

/// Request body for both `POST` and `PUT` on contacts.
///
/// Creation requires every field; an update only touches the fields present.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ContactPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactPatch {
    /// Every field present and non-blank, or `None`. Values are kept as sent.
    pub fn into_complete(self) -> Option<BaseContact> {
        Some(BaseContact {
            name: non_blank(self.name)?,
            email: non_blank(self.email)?,
            phone: non_blank(self.phone)?,
        })
    }

    /// True if a field was sent but left blank.
    pub fn has_blank_field(&self) -> bool {
        [&self.name, &self.email, &self.phone]
            .into_iter()
            .flatten()
            .any(|v| v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }

    pub fn apply_to(&self, contact: &mut Contact) {
        if let Some(name) = &self.name {
            contact.name.clone_from(name);
        }
        if let Some(email) = &self.email {
            contact.email.clone_from(email);
        }
        if let Some(phone) = &self.phone {
            contact.phone.clone_from(phone);
        }
    }
}

impl From<BaseContact> for ContactPatch {
    fn from(base: BaseContact) -> Self {
        Self {
            name: Some(base.name),
            email: Some(base.email),
            phone: Some(base.phone),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Login and registration form. `username` is only read on registration.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Form state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown form field `{0}`")]
    UnknownField(String),

    #[error("form is read-only")]
    ReadOnly,
}

/// A form whose fields can be set by input name.
pub trait FormState {
    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError>;
}

impl FormState for UserData {
    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let slot = match name {
            "username" => &mut self.username,
            "email" => &mut self.email,
            "password" => &mut self.password,
            other => return Err(FormError::UnknownField(other.to_string())),
        };
        *slot = value.to_string();
        Ok(())
    }
}

impl FormState for BaseContact {
    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let slot = match name {
            "name" => &mut self.name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            other => return Err(FormError::UnknownField(other.to_string())),
        };
        *slot = value.to_string();
        Ok(())
    }
}

impl FormState for Contact {
    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let slot = match name {
            "name" => &mut self.name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            other => return Err(FormError::UnknownField(other.to_string())),
        };
        *slot = value.to_string();
        Ok(())
    }
}
