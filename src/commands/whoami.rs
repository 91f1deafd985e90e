use crate::ApiError;
use crate::http_client::HttpClient;
use crate::session::SessionManager;
use crate::store::CredentialStore;
use crate::token::UserIdentity;

pub struct WhoamiCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    session: SessionManager<C, S>,
}

impl<C, S> WhoamiCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(session: SessionManager<C, S>) -> Self {
        Self { session }
    }

    /// Resolves the current identity. `remote` asks the server (renewing the
    /// access token if needed); otherwise the persisted copy is used.
    pub fn run(self, remote: bool) -> Result<UserIdentity, ApiError> {
        if remote {
            return self.session.current_user();
        }
        self.session
            .stored_user()?
            .ok_or(ApiError::Unauthenticated)
    }
}
