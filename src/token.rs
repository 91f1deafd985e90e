use std::fmt;

use serde::{Deserialize, Serialize};

/// Short-lived bearer token attached to individual requests.
///
/// Kept distinct from [`RefreshToken`] so the two can never be swapped at a
/// call site.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct AccessToken(String);

/// Longer-lived token used solely to mint new access tokens.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl RefreshToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<&str> for RefreshToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

// Tokens are credentials; keep them out of debug output.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(***)")
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken(***)")
    }
}

/// The access/refresh credential pair held by an authenticated session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

impl TokenPair {
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn access(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn refresh(&self) -> &RefreshToken {
        &self.refresh_token
    }

    /// Replaces the access token after a successful renewal. The refresh
    /// token is kept unless the server rotated it.
    pub fn renew(&mut self, access: AccessToken, rotated_refresh: Option<RefreshToken>) {
        self.access_token = access;
        if let Some(refresh) = rotated_refresh {
            self.refresh_token = refresh;
        }
    }
}

/// The user record returned by the Agri-Trek accounts API.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub is_farmer: bool,
}
