//! The contacts page: list query, selection, and create/update/delete flows.
//!
//! Every mutation awaits the server and then re-fetches the whole list; nothing is patched
//! locally. Failures are kept as a user-visible notice and leave the windows where they were so
//! the user can retry.

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    client::{ApiClient, ClientError},
    models::{BaseContact, Contact, ContactPatch, FormError, FormState},
    session::{AuthContext, Session},
};

pub const REAUTH_PROMPT: &str = "An error has occurred. Try logging in again";
pub const CALL_UNAVAILABLE: &str = "Calling is not available yet";

#[derive(Debug, Error)]
pub enum PageError {
    #[error("no contact is selected")]
    NoSelection,

    #[error("the add contact window is not open")]
    AddWindowClosed,

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    Loading,
    Ready(Vec<Contact>),
    Failed(String),
}

/// Inline message shown in place of the list when fetching fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner<'a> {
    pub headline: &'static str,
    pub detail: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowLabel {
    Loading,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRow {
    pub id: String,
    pub initial: Option<char>,
    pub label: RowLabel,
}

// ────────────────────────────────────────────────────────────────────────────
// Windows
// ────────────────────────────────────────────────────────────────────────────

/// Detail view of the selected contact. Read-only until editing is toggled on.
#[derive(Debug, Clone)]
pub struct ContactWindow {
    draft: Contact,
    edit_disabled: bool,
}

impl ContactWindow {
    pub fn new(contact: Contact) -> Self {
        Self {
            draft: contact,
            edit_disabled: true,
        }
    }

    pub fn contact(&self) -> &Contact {
        &self.draft
    }

    pub fn is_edit_disabled(&self) -> bool {
        self.edit_disabled
    }

    pub fn toggle_edit(&mut self) {
        self.edit_disabled = !self.edit_disabled;
    }

    pub fn handle_change(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        if self.edit_disabled {
            return Err(FormError::ReadOnly);
        }
        self.draft.set_field(name, value)
    }

    fn patch(&self) -> ContactPatch {
        BaseContact::from(&self.draft).into()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddContactWindow {
    draft: BaseContact,
}

impl AddContactWindow {
    pub fn draft(&self) -> &BaseContact {
        &self.draft
    }

    pub fn handle_change(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        self.draft.set_field(name, value)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page
// ────────────────────────────────────────────────────────────────────────────

pub struct ContactsPage {
    client: ApiClient,
    list: ListState,
    selected: Option<ContactWindow>,
    add_window: Option<AddContactWindow>,
    edit_in_flight: bool,
    refetching: bool,
    notice: Option<String>,
}

impl ContactsPage {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            list: ListState::Loading,
            selected: None,
            add_window: None,
            edit_in_flight: false,
            refetching: false,
            notice: None,
        }
    }

    pub fn list(&self) -> &ListState {
        &self.list
    }

    pub fn banner(&self) -> Option<ErrorBanner<'_>> {
        match &self.list {
            ListState::Failed(detail) => Some(ErrorBanner {
                headline: REAUTH_PROMPT,
                detail,
            }),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Rows to render. While an edit or re-fetch is in flight each row shows a loading
    /// indicator instead of the name.
    pub fn rows(&self) -> Vec<ContactRow> {
        let ListState::Ready(contacts) = &self.list else {
            return Vec::new();
        };
        let busy = self.edit_in_flight || self.refetching;
        contacts
            .iter()
            .map(|contact| ContactRow {
                id: contact.id.clone(),
                initial: contact.name.chars().next().and_then(|c| c.to_uppercase().next()),
                label: if busy {
                    RowLabel::Loading
                } else {
                    RowLabel::Name(contact.name.clone())
                },
            })
            .collect()
    }

    /// Runs the list query. The first load shows `Loading`; later ones keep the current rows
    /// and mark them as refetching.
    pub async fn refetch(&mut self, session: &Session) -> Result<(), ClientError> {
        if matches!(self.list, ListState::Ready(_)) {
            self.refetching = true;
        } else {
            self.list = ListState::Loading;
        }

        let result = self.client.list_contacts(session).await;
        self.refetching = false;

        match result {
            Ok(contacts) => {
                debug!(count = contacts.len(), "contacts fetched");
                self.list = ListState::Ready(contacts);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "fetching contacts failed");
                self.list = ListState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Re-fetch following a successful mutation. A failure already shows as `ListState::Failed`.
    async fn refetch_after_mutation(&mut self, session: &Session) {
        if let Err(e) = self.refetch(session).await {
            debug!(error = %e, "re-fetch after mutation failed");
        }
    }

    /// Forgets everything shown for the previous session.
    pub fn reset(&mut self) {
        self.list = ListState::Loading;
        self.selected = None;
        self.add_window = None;
        self.edit_in_flight = false;
        self.refetching = false;
        self.notice = None;
    }

    /// Logs out of `auth` and resets the page, returning the ended session.
    pub fn logout(&mut self, auth: &mut AuthContext) -> Option<Session> {
        self.reset();
        auth.logout()
    }

    // ── selection ───────────────────────────────────────────────────────────

    /// Opens the detail window for a listed contact. Returns false if it is not in the list.
    pub fn open_contact(&mut self, id: &str) -> bool {
        let ListState::Ready(contacts) = &self.list else {
            return false;
        };
        match contacts.iter().find(|c| c.id == id) {
            Some(contact) => {
                self.selected = Some(ContactWindow::new(contact.clone()));
                true
            }
            None => false,
        }
    }

    pub fn close_contact(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&ContactWindow> {
        self.selected.as_ref()
    }

    pub fn selected_mut(&mut self) -> Option<&mut ContactWindow> {
        self.selected.as_mut()
    }

    /// Row action without backing behavior; only tells the user so.
    pub fn call_contact(&mut self, _id: &str) {
        self.notice = Some(CALL_UNAVAILABLE.to_string());
    }

    // ── add window ──────────────────────────────────────────────────────────

    pub fn open_add_window(&mut self) {
        self.add_window.get_or_insert_with(AddContactWindow::default);
    }

    pub fn close_add_window(&mut self) {
        self.add_window = None;
    }

    pub fn add_window(&self) -> Option<&AddContactWindow> {
        self.add_window.as_ref()
    }

    pub fn add_window_mut(&mut self) -> Option<&mut AddContactWindow> {
        self.add_window.as_mut()
    }

    // ── mutations ───────────────────────────────────────────────────────────

    /// Creates the contact drafted in the add window. The window closes only on success.
    pub async fn submit_add(&mut self, session: &Session) -> Result<Contact, PageError> {
        let draft = self
            .add_window
            .as_ref()
            .ok_or(PageError::AddWindowClosed)?
            .draft
            .clone();

        match self.client.create_contact(session, &draft).await {
            Ok(contact) => {
                self.add_window = None;
                self.notice = None;
                self.refetch_after_mutation(session).await;
                Ok(contact)
            }
            Err(e) => {
                warn!(error = %e, "creating contact failed");
                self.notice = Some(format!("Could not add contact: {e}"));
                Err(e.into())
            }
        }
    }

    /// Saves the selected contact's edits. On success the window goes back to read-only.
    pub async fn save_selected(&mut self, session: &Session) -> Result<Contact, PageError> {
        let window = self.selected.as_ref().ok_or(PageError::NoSelection)?;
        let id = window.draft.id.clone();
        let patch = window.patch();

        self.edit_in_flight = true;
        let result = self.client.update_contact(session, &id, &patch).await;
        self.edit_in_flight = false;

        match result {
            Ok(contact) => {
                if let Some(window) = self.selected.as_mut().filter(|w| w.draft.id == id) {
                    window.draft = contact.clone();
                    window.edit_disabled = true;
                }
                self.notice = None;
                self.refetch_after_mutation(session).await;
                Ok(contact)
            }
            Err(e) => {
                warn!(error = %e, contact_id = %id, "updating contact failed");
                self.notice = Some(format!("Could not update contact: {e}"));
                Err(e.into())
            }
        }
    }

    /// Deletes a contact. Closes the detail window if it was showing that contact.
    pub async fn delete_contact(&mut self, session: &Session, id: &str) -> Result<Contact, PageError> {
        match self.client.delete_contact(session, id).await {
            Ok(contact) => {
                if self.selected.as_ref().is_some_and(|w| w.draft.id == id) {
                    self.selected = None;
                }
                self.notice = None;
                self.refetch_after_mutation(session).await;
                Ok(contact)
            }
            Err(e) => {
                warn!(error = %e, contact_id = id, "deleting contact failed");
                self.notice = Some(format!("Could not delete contact: {e}"));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    async fn loaded_page(name: &str) -> (ContactsPage, ApiClient, Session) {
        let base = test_utils::spawn_server().await;
        let (client, session) = test_utils::logged_in(&base, name).await;
        let mut page = ContactsPage::new(client.clone());
        assert_eq!(page.list(), &ListState::Loading);
        page.refetch(&session).await.unwrap();
        assert_eq!(page.list(), &ListState::Ready(Vec::new()));
        (page, client, session)
    }

    async fn add(page: &mut ContactsPage, session: &Session, name: &str, phone: &str) -> Contact {
        page.open_add_window();
        let window = page.add_window_mut().unwrap();
        window.handle_change("name", name).unwrap();
        window
            .handle_change("email", &format!("{}@x.com", name.to_lowercase()))
            .unwrap();
        window.handle_change("phone", phone).unwrap();
        page.submit_add(session).await.unwrap()
    }

    #[tokio::test]
    async fn add_closes_window_and_refetches() {
        let (mut page, _, session) = loaded_page("alice").await;

        let created = add(&mut page, &session, "ada", "555-0100").await;
        assert!(page.add_window().is_none());
        assert_eq!(page.notice(), None);
        assert_eq!(
            page.rows(),
            vec![ContactRow {
                id: created.id.clone(),
                initial: Some('A'),
                label: RowLabel::Name("ada".into()),
            }]
        );
    }

    #[tokio::test]
    async fn failed_add_keeps_window_and_draft() {
        let (mut page, _, session) = loaded_page("alice").await;

        page.open_add_window();
        page.add_window_mut()
            .unwrap()
            .handle_change("name", "Ada")
            .unwrap();
        let err = page.submit_add(&session).await.unwrap_err();
        assert!(matches!(err, PageError::Client(ClientError::Validation(_))));

        let window = page.add_window().unwrap();
        assert_eq!(window.draft().name, "Ada");
        assert!(page.notice().unwrap().starts_with("Could not add contact"));
        assert!(page.rows().is_empty());

        page.close_add_window();
        assert!(matches!(
            page.submit_add(&session).await,
            Err(PageError::AddWindowClosed)
        ));
    }

    #[tokio::test]
    async fn edit_selected_contact() {
        let (mut page, client, session) = loaded_page("alice").await;
        let created = add(&mut page, &session, "Ada", "555-0100").await;

        assert!(!page.open_contact("missing"));
        assert!(page.open_contact(&created.id));

        let window = page.selected_mut().unwrap();
        assert_eq!(window.handle_change("phone", "x"), Err(FormError::ReadOnly));
        window.toggle_edit();
        window.handle_change("phone", "555-0200").unwrap();

        let saved = page.save_selected(&session).await.unwrap();
        assert_eq!(saved.phone, "555-0200");

        let window = page.selected().unwrap();
        assert!(window.is_edit_disabled());
        assert_eq!(window.contact().phone, "555-0200");

        let ListState::Ready(contacts) = page.list() else {
            panic!("list should be ready");
        };
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].phone, "555-0200");
        assert_eq!(contacts[0].name, "Ada");
        assert_eq!(contacts[0].email, "ada@x.com");

        client.delete_contact(&session, &created.id).await.unwrap();
        let err = page.save_selected(&session).await.unwrap_err();
        assert!(matches!(err, PageError::Client(ClientError::NotFound(_))));
        assert!(page.selected().is_some());
        assert!(page.notice().unwrap().starts_with("Could not update contact"));
        assert!(!page.edit_in_flight);
        assert!(!page.refetching);
        assert!(page.rows().iter().all(|r| r.label == RowLabel::Name("Ada".into())));
    }

    #[tokio::test]
    async fn delete_clears_selection_and_list() {
        let (mut page, _, session) = loaded_page("alice").await;
        let created = add(&mut page, &session, "Ada", "555-0100").await;
        page.open_contact(&created.id);

        page.delete_contact(&session, &created.id).await.unwrap();
        assert!(page.selected().is_none());
        assert!(page.rows().is_empty());

        let err = page.delete_contact(&session, &created.id).await.unwrap_err();
        assert!(matches!(err, PageError::Client(ClientError::NotFound(_))));
        assert!(page.notice().is_some());

        page.close_contact();
        assert!(matches!(
            page.save_selected(&session).await,
            Err(PageError::NoSelection)
        ));
    }

    #[tokio::test]
    async fn list_failure_shows_banner() {
        let (mut page, _, _) = loaded_page("alice").await;

        let expired = Session::new("expired");
        assert!(page.refetch(&expired).await.is_err());
        let banner = page.banner().unwrap();
        assert_eq!(banner.headline, REAUTH_PROMPT);
        assert_eq!(banner.detail, "User is not authorized");
        assert!(page.rows().is_empty());
        assert!(!page.refetching);
    }

    #[tokio::test]
    async fn failed_refetch_of_ready_list_clears_refetching() {
        let (mut page, _, session) = loaded_page("alice").await;
        add(&mut page, &session, "Ada", "555-0100").await;

        assert!(page.refetch(&Session::new("expired")).await.is_err());
        assert!(!page.refetching);

        page.refetch(&session).await.unwrap();
        assert_eq!(page.rows()[0].label, RowLabel::Name("Ada".into()));
    }

    #[tokio::test]
    async fn logout_resets_the_page() {
        let base = test_utils::spawn_server().await;
        let client = ApiClient::new(&base).unwrap();
        let mut auth = AuthContext::new(client.clone());
        let form = test_utils::user_data("alice");
        auth.register(&form).await.unwrap();
        let session = auth.login(&form).await.unwrap();

        let mut page = ContactsPage::new(client);
        page.refetch(&session).await.unwrap();
        let created = add(&mut page, &session, "Ada", "555-0100").await;
        assert!(page.open_contact(&created.id));
        page.open_add_window();
        page.call_contact(&created.id);

        assert_eq!(page.logout(&mut auth), Some(session));
        assert!(auth.session().is_none());
        assert_eq!(page.list(), &ListState::Loading);
        assert!(page.rows().is_empty());
        assert!(page.selected().is_none());
        assert!(page.add_window().is_none());
        assert_eq!(page.notice(), None);
    }

    #[tokio::test]
    async fn rows_show_loading_while_busy() {
        let (mut page, _, session) = loaded_page("alice").await;
        add(&mut page, &session, "grace", "555-0100").await;

        page.refetching = true;
        assert!(page.rows().iter().all(|r| r.label == RowLabel::Loading));
        page.refetching = false;
        page.edit_in_flight = true;
        assert!(page.rows().iter().all(|r| r.label == RowLabel::Loading));
        page.edit_in_flight = false;
        assert_eq!(page.rows()[0].label, RowLabel::Name("grace".into()));
        assert_eq!(page.rows()[0].initial, Some('G'));
    }

    #[tokio::test]
    async fn call_is_a_notice_only() {
        let (mut page, _, _) = loaded_page("alice").await;
        page.call_contact("anything");
        assert_eq!(page.notice(), Some(CALL_UNAVAILABLE));
        page.dismiss_notice();
        assert_eq!(page.notice(), None);
    }
}
