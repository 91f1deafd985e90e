use crate::ApiError;
use crate::http_client::HttpClient;
use crate::session::{Registration, SessionManager};
use crate::store::CredentialStore;
use crate::token::UserIdentity;

pub struct RegisterCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    session: SessionManager<C, S>,
}

impl<C, S> RegisterCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(session: SessionManager<C, S>) -> Self {
        Self { session }
    }

    pub fn run(self, registration: Registration) -> Result<UserIdentity, ApiError> {
        self.session.register(&registration)
    }
}
