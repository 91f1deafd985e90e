use std::collections::BTreeMap;
use std::sync::Arc;

use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::client::ApiClient;
use crate::http_client::HttpClient;
use crate::store::{CredentialStore, StoredSession};
use crate::token::{AccessToken, RefreshToken, TokenPair, UserIdentity};
use crate::{ApiError, ValidationErrors};

const LOGIN_PATH: &str = "auth/login/";
const REGISTER_PATH: &str = "auth/register/";
const ME_PATH: &str = "auth/me/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: AccessToken,
    refresh: RefreshToken,
    user: UserIdentity,
}

/// Registration fields accepted by `POST /auth/register/`.
#[derive(Serialize, Clone, Debug, Default)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub is_farmer: bool,
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[allow(dead_code)]
    message: String,
    user: UserIdentity,
}

/// Orchestrates login, logout and current-user resolution on top of the
/// request pipeline. This is the only component that reacts to a terminal
/// `Unauthenticated` by forcing the session away.
pub struct SessionManager<C, S> {
    api: ApiClient<C, S>,
    store: Arc<S>,
}

impl<C, S> SessionManager<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(http: Arc<C>, base_url: Url, store: Arc<S>) -> Result<Self, ApiError> {
        let api = ApiClient::new(http, base_url, store.clone())?;
        Ok(Self { api, store })
    }

    /// Exchanges credentials for a token pair and identity, populating the
    /// store atomically: either the full session is persisted or nothing is.
    pub fn login(&self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        let response = self
            .api
            .post_json_anonymous(LOGIN_PATH, &LoginRequest { email, password })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                debug!(email, "login rejected");
                return Err(ApiError::InvalidCredentials);
            }
            status => return Err(ApiError::UnexpectedStatus(status.as_u16())),
        }

        let login: LoginResponse = serde_json::from_slice(response.body())
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;

        let session = StoredSession::new(
            TokenPair::new(login.access, login.refresh),
            login.user.clone(),
        );
        self.store.set(&session)?;
        debug!(email, "session established");
        Ok(login.user)
    }

    /// Registers a new account. Field-level rejections come back as
    /// [`ApiError::Validation`] for the caller to show inline; no session is
    /// created.
    pub fn register(&self, registration: &Registration) -> Result<UserIdentity, ApiError> {
        let response = self.api.post_json_anonymous(REGISTER_PATH, registration)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let created: RegisterResponse = serde_json::from_slice(response.body())
                    .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
                Ok(created.user)
            }
            StatusCode::BAD_REQUEST => Err(ApiError::Validation(parse_field_errors(&response))),
            status => Err(ApiError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Resolves the identity behind the current session, renewing the access
    /// token once if it has expired. A terminal authorization failure clears
    /// the session before the error is returned.
    pub fn current_user(&self) -> Result<UserIdentity, ApiError> {
        let response = match self.api.get(ME_PATH) {
            Ok(response) => response,
            Err(ApiError::Unauthenticated) => {
                self.logout();
                return Err(ApiError::Unauthenticated);
            }
            Err(err) => return Err(err),
        };

        match response.status() {
            StatusCode::OK => serde_json::from_slice(response.body())
                .map_err(|err| ApiError::InvalidResponse(err.to_string())),
            StatusCode::UNAUTHORIZED => {
                // No bearer was attached (empty store); nothing to renew.
                self.logout();
                Err(ApiError::Unauthenticated)
            }
            status => Err(ApiError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Clears the session unconditionally. Idempotent and infallible:
    /// storage failures are logged, not returned. The renewal generation is
    /// invalidated first so a renewal in flight cannot undo the logout.
    pub fn logout(&self) {
        if let Err(err) = self.api.invalidate_session() {
            warn!(error = %err, "unable to invalidate renewal state");
        }
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "unable to clear credential store");
        }
        debug!("session cleared");
    }

    /// The identity persisted with the current session, if any. Does not
    /// touch the network.
    pub fn stored_user(&self) -> Result<Option<UserIdentity>, ApiError> {
        Ok(self.store.get()?.map(|session| session.user().clone()))
    }
}

/// Pulls `{field: [messages]}` out of a registration failure body. The
/// server wraps them as `{"message": ..., "error": {...}}`; single strings
/// and lists both occur.
fn parse_field_errors(response: &Response<Vec<u8>>) -> ValidationErrors {
    #[derive(Deserialize)]
    struct Failure {
        #[serde(default)]
        error: serde_json::Value,
    }

    let mut fields = BTreeMap::new();
    if let Ok(Failure {
        error: serde_json::Value::Object(map),
    }) = serde_json::from_slice::<Failure>(response.body())
    {
        for (field, value) in map {
            let messages = match value {
                serde_json::Value::String(message) => vec![message],
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                other => vec![other.to_string()],
            };
            fields.insert(field, messages);
        }
    }
    ValidationErrors::new(fields)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use rstest::rstest;
    use url::Url;

    use super::{Registration, SessionManager};
    use crate::ApiError;
    use crate::http::client::HttpClient;
    use crate::store::test::fake_session;
    use crate::store::{CredentialStore, InMemoryCredentialStore};

    fn manager_for(
        server: &MockServer,
    ) -> (
        SessionManager<HttpClient, InMemoryCredentialStore>,
        Arc<InMemoryCredentialStore>,
    ) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let base_url = Url::parse(&server.url("/api/")).unwrap();
        let manager = SessionManager::new(
            Arc::new(HttpClient::new().unwrap()),
            base_url,
            store.clone(),
        )
        .unwrap();
        (manager, store)
    }

    fn user_body() -> serde_json::Value {
        serde_json::json!({
            "id": 7,
            "email": "farmer@example.com",
            "username": "farmer",
            "phone_number": null,
            "address": "Route 9",
            "is_farmer": true
        })
    }

    #[test]
    fn login_populates_the_store_and_returns_the_identity() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/auth/login/")
                .json_body(serde_json::json!({
                    "email": "farmer@example.com",
                    "password": "secret123"
                }));
            then.status(200).json_body(serde_json::json!({
                "access": "access-1",
                "refresh": "refresh-1",
                "user": user_body()
            }));
        });

        let (manager, store) = manager_for(&server);
        let user = manager.login("farmer@example.com", "secret123").unwrap();

        assert_eq!(user.email, "farmer@example.com");
        let session = store.get().unwrap().unwrap();
        assert!(!session.tokens().access().is_empty());
        assert!(!session.tokens().refresh().is_empty());
        assert_eq!(session.user(), &user);
        mock.assert();
    }

    #[test]
    fn current_user_after_login_does_not_touch_the_refresh_endpoint() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/login/");
            then.status(200).json_body(serde_json::json!({
                "access": "access-1",
                "refresh": "refresh-1",
                "user": user_body()
            }));
        });
        let me = server.mock(|when, then| {
            when.method(GET)
                .path("/api/auth/me/")
                .header("authorization", "Bearer access-1");
            then.status(200).json_body(user_body());
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/api/auth/token/refresh/");
            then.status(200);
        });

        let (manager, _store) = manager_for(&server);
        let logged_in = manager.login("farmer@example.com", "secret123").unwrap();
        let current = manager.current_user().unwrap();

        assert_eq!(logged_in, current);
        me.assert();
        refresh.assert_hits(0);
    }

    #[rstest]
    #[case(401)]
    #[case(400)]
    fn login_rejection_is_invalid_credentials(#[case] status: u16) {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/login/");
            then.status(status).json_body(serde_json::json!({
                "detail": "No active account found with the given credentials"
            }));
        });

        let (manager, store) = manager_for(&server);
        let error = manager.login("farmer@example.com", "wrong").unwrap_err();

        assert_matches!(error, ApiError::InvalidCredentials);
        assert!(store.get().unwrap().is_none(), "no partial session on failure");
    }

    #[test]
    fn register_surfaces_field_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/register/");
            then.status(400).json_body(serde_json::json!({
                "message": "Registration failed",
                "error": {
                    "email": ["user with this email already exists."],
                    "password": ["This password is too common."]
                }
            }));
        });

        let (manager, _store) = manager_for(&server);
        let registration = Registration {
            email: "farmer@example.com".to_string(),
            username: "farmer".to_string(),
            password: "password".to_string(),
            password2: "password".to_string(),
            is_farmer: true,
            ..Registration::default()
        };

        let error = manager.register(&registration).unwrap_err();
        let ApiError::Validation(errors) = error else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors.fields().get("email").unwrap(),
            &vec!["user with this email already exists.".to_string()]
        );
        assert_eq!(
            errors.fields().get("password").unwrap(),
            &vec!["This password is too common.".to_string()]
        );
    }

    #[test]
    fn register_returns_the_created_identity() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/register/");
            then.status(201).json_body(serde_json::json!({
                "message": "User registered successfully",
                "user": user_body()
            }));
        });

        let (manager, store) = manager_for(&server);
        let registration = Registration {
            email: "farmer@example.com".to_string(),
            username: "farmer".to_string(),
            password: "secret123".to_string(),
            password2: "secret123".to_string(),
            is_farmer: true,
            ..Registration::default()
        };

        let user = manager.register(&registration).unwrap();
        assert_eq!(user.username, "farmer");
        assert!(
            store.get().unwrap().is_none(),
            "registration does not create a session"
        );
    }

    #[test]
    fn expired_access_token_is_renewed_before_current_user_gives_up() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/auth/me/")
                .header("authorization", "Bearer stale-access");
            then.status(401)
                .json_body(serde_json::json!({"detail": "token expired"}));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST)
                .path("/api/auth/token/refresh/")
                .json_body(serde_json::json!({"refresh": "refresh-1"}));
            then.status(200)
                .json_body(serde_json::json!({"access": "fresh-access"}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/auth/me/")
                .header("authorization", "Bearer fresh-access");
            then.status(200).json_body(user_body());
        });

        let (manager, store) = manager_for(&server);
        store.set(&fake_session("stale-access", "refresh-1")).unwrap();

        let user = manager.current_user().unwrap();

        assert_eq!(user.email, "farmer@example.com");
        refresh.assert();
        let session = store.get().unwrap().unwrap();
        assert_eq!(session.tokens().access().as_str(), "fresh-access");
    }

    #[test]
    fn rejected_renewal_forces_a_clean_logout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/auth/me/");
            then.status(401)
                .json_body(serde_json::json!({"detail": "token expired"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/token/refresh/");
            then.status(401)
                .json_body(serde_json::json!({"detail": "Token is invalid or expired"}));
        });

        let (manager, store) = manager_for(&server);
        store.set(&fake_session("stale-access", "refresh-1")).unwrap();

        let error = manager.current_user().unwrap_err();

        assert_matches!(error, ApiError::Unauthenticated);
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn current_user_without_a_session_is_unauthenticated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/auth/me/");
            then.status(401)
                .json_body(serde_json::json!({"detail": "Authentication credentials were not provided."}));
        });

        let (manager, _store) = manager_for(&server);
        let error = manager.current_user().unwrap_err();

        assert_matches!(error, ApiError::Unauthenticated);
    }

    #[test]
    fn logout_clears_the_store_and_is_idempotent() {
        let server = MockServer::start();
        let (manager, store) = manager_for(&server);
        store.set(&fake_session("access-1", "refresh-1")).unwrap();

        manager.logout();
        assert!(store.get().unwrap().is_none());

        manager.logout();
        assert!(store.get().unwrap().is_none());
    }
}
