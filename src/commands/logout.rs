use crate::http_client::HttpClient;
use crate::session::SessionManager;
use crate::store::CredentialStore;

pub struct LogoutCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    session: SessionManager<C, S>,
}

impl<C, S> LogoutCommand<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(session: SessionManager<C, S>) -> Self {
        Self { session }
    }

    /// Logout never fails; a missing session is already logged out.
    pub fn run(self) {
        self.session.logout()
    }
}
