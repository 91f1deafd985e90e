use crate::ApiError;
use crate::http_client::HttpClient;
use crate::session::SessionManager;
use crate::store::CredentialStore;
use crate::token::UserIdentity;

pub struct LoginCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    session: SessionManager<C, S>,
}

impl<C, S> LoginCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(session: SessionManager<C, S>) -> Self {
        Self { session }
    }

    pub fn run(self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        self.session.login(email, password)
    }
}
