//! Authentication Service
//!
//! Sign-in, registration, sign-out and identity lookup on top of the
//! request dispatcher.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::dispatch::{ApiRequest, RequestDispatcher};
use crate::error::{AuthenticationError, SessionError};
use crate::token::CredentialStore;
use crate::types::{
    AccessToken, AuthEndpoints, AuthResponse, CredentialPair, Identity, RefreshToken, Session,
};

/// Registration form.
#[derive(Clone, Debug)]
pub struct RegisterParams {
    pub username: String,
    pub password: SecretString,
    pub email: Option<String>,
}

impl RegisterParams {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
            email: None,
        }
    }

    /// Set the email address.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

/// Session lifecycle operations.
pub struct AuthService {
    dispatcher: Arc<RequestDispatcher>,
    store: Arc<dyn CredentialStore>,
    endpoints: AuthEndpoints,
}

impl AuthService {
    /// Create new service.
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        store: Arc<dyn CredentialStore>,
        endpoints: AuthEndpoints,
    ) -> Self {
        Self {
            dispatcher,
            store,
            endpoints,
        }
    }

    /// Sign in with username and password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let request = ApiRequest::post(self.endpoints.login.as_str())
            .json(&LoginBody { username, password })?
            .without_refresh();
        self.establish(request).await
    }

    /// Create an account and sign in.
    #[instrument(skip_all, fields(username = %params.username))]
    pub async fn register(&self, params: RegisterParams) -> Result<Session, SessionError> {
        let request = ApiRequest::post(self.endpoints.register.as_str())
            .json(&RegisterBody {
                username: &params.username,
                password: params.password.expose_secret(),
                email: params.email.as_deref(),
            })?
            .without_refresh();
        self.establish(request).await
    }

    /// Sign out. Clears the store without notifying the session sink.
    pub fn logout(&self) {
        self.store.clear();
        info!("signed out");
    }

    /// Adopt a saved identity and access credential.
    ///
    /// Without a refresh credential, the first rejected request ends the
    /// session instead of renewing it.
    pub fn restore(&self, identity: Identity, access: AccessToken, refresh: Option<RefreshToken>) {
        info!(
            user_id = identity.id,
            refreshable = refresh.is_some(),
            "session restored"
        );
        self.store.restore(identity, access, refresh);
    }

    /// Adopt a previously saved full session.
    pub fn restore_session(&self, session: Session) {
        let CredentialPair { access, refresh } = session.credentials;
        self.restore(session.identity, access, Some(refresh));
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn session(&self) -> Option<Session> {
        self.store.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Load the signed-in user's identity and store it.
    pub async fn fetch_identity(&self) -> Result<Identity, SessionError> {
        let identity: Identity = self
            .dispatcher
            .send_json(ApiRequest::get(self.endpoints.identity.as_str()))
            .await?;
        self.store.set_identity(identity.clone());
        Ok(identity)
    }

    async fn establish(&self, request: ApiRequest) -> Result<Session, SessionError> {
        let response = match self.dispatcher.send(request).await {
            Ok(response) => response,
            Err(SessionError::Api(e)) => {
                warn!(status = e.status, "sign-in rejected");
                return Err(AuthenticationError::LoginRejected {
                    status: e.status,
                    detail: e.detail(),
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        let (credentials, identity) = response.parse_json::<AuthResponse>()?.into_parts();
        self.store.set_session(credentials.clone(), identity.clone());
        info!(user_id = identity.id, "session established");

        Ok(Session::new(identity, credentials))
    }
}
