use std::sync::Arc;

use axum::Router;
use chrono::TimeDelta;

use crate::{
    auth::TokenKeys,
    client::ApiClient,
    handlers::AppState,
    models::UserData,
    session::{AuthContext, Session},
    store,
};

pub fn state() -> Arc<AppState> {
    Arc::new(AppState {
        conn: store::open(":memory:").unwrap(),
        tokens: TokenKeys::new(b"test-secret", TimeDelta::minutes(10)),
    })
}

pub fn app() -> Router {
    crate::router(state())
}

/// Serves a fresh app on an ephemeral port and returns its base URL.
pub async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app()).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn user_data(name: &str) -> UserData {
    UserData {
        username: name.to_string(),
        email: format!("{name}@x.com"),
        password: "pw".to_string(),
    }
}

/// Registers `name` against `base_url` and logs in.
pub async fn logged_in(base_url: &str, name: &str) -> (ApiClient, Session) {
    let client = ApiClient::new(base_url).unwrap();
    let mut auth = AuthContext::new(client.clone());
    auth.register(&user_data(name)).await.unwrap();
    let session = auth.login(&user_data(name)).await.unwrap();
    (client, session)
}
