use std::sync::{Arc, Condvar, Mutex};

use http::{Request, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::http_client::{HttpClient, HttpClientError};
use crate::store::{CredentialStore, StoreError};
use crate::token::{AccessToken, RefreshToken};

/// Errors produced while renewing the access credential.
///
/// These never reach a pipeline caller directly: the pipeline reports any
/// renewal failure as `ApiError::Unauthenticated` (or `RenewalTimeout`), and
/// the cause is logged here.
#[derive(thiserror::Error, Debug)]
pub enum RenewalError {
    /// The server rejected the refresh token.
    #[error("refresh credential rejected by the server")]
    Rejected,
    /// There is no refresh token to renew with.
    #[error("no refresh credential available")]
    MissingRefreshToken,
    /// The renewal call exceeded the transport's bounded timeout.
    #[error("renewal request timed out")]
    Timeout,
    /// Transport failure while talking to the refresh endpoint.
    #[error("transport failure during renewal: `{0}`")]
    Transport(String),
    /// The refresh endpoint answered with something unintelligible.
    #[error("malformed renewal response: `{0}`")]
    MalformedResponse(String),
    /// The session was invalidated while the renewal was in flight, so the
    /// result was discarded.
    #[error("session invalidated while renewal was in flight")]
    Superseded,
    /// A renewal already settled this epoch and left no usable session.
    #[error("session cleared by a failed renewal")]
    SessionCleared,
    #[error("acquiring renewal state lock")]
    Poisoned,
    #[error("credential store failure: `{0}`")]
    Store(#[from] StoreError),
}

/// Renewal state machine: `Idle -> Renewing -> Idle` on success, with a
/// failed renewal clearing the session on the way back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalState {
    Idle,
    Renewing,
}

#[derive(Debug)]
struct Inner {
    state: RenewalState,
    /// Advances every time a renewal settles (and on invalidation), so a
    /// caller whose failure was observed under an older epoch consumes the
    /// settled outcome instead of starting a fresh renewal.
    epoch: u64,
    /// Advances on logout. A renewal only persists its token if the
    /// generation it captured at start is still current, which is how a
    /// logout wins over a racing successful renewal.
    generation: u64,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a RefreshToken,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: AccessToken,
    #[serde(default)]
    refresh: Option<RefreshToken>,
}

/// Serializes access-token renewal so that any wave of concurrent
/// authorization failures issues exactly one refresh call.
///
/// Callers that observe a 401 while a renewal is already in flight park on
/// the shared outcome instead of renewing themselves. On success the new
/// access token is written back to the store; on any failure the store is
/// cleared and every waiter fails terminally.
pub struct RenewalCoordinator<C, S> {
    http: Arc<C>,
    refresh_url: Url,
    store: Arc<S>,
    inner: Mutex<Inner>,
    settled: Condvar,
}

impl<C, S> RenewalCoordinator<C, S>
where
    C: HttpClient,
    S: CredentialStore,
{
    pub fn new(http: Arc<C>, refresh_url: Url, store: Arc<S>) -> Self {
        Self {
            http,
            refresh_url,
            store,
            inner: Mutex::new(Inner {
                state: RenewalState::Idle,
                epoch: 0,
                generation: 0,
            }),
            settled: Condvar::new(),
        }
    }

    /// The current renewal epoch. The pipeline snapshots this before sending
    /// a request and hands it back on failure, so the coordinator can tell a
    /// stale failure from a fresh one.
    pub fn epoch(&self) -> Result<u64, RenewalError> {
        let inner = self.inner.lock().map_err(|_| RenewalError::Poisoned)?;
        Ok(inner.epoch)
    }

    /// Invalidates the current session generation. Called on logout, before
    /// the store is cleared, so a renewal still in flight cannot repopulate
    /// the session when it settles.
    pub fn invalidate(&self) -> Result<(), RenewalError> {
        let mut inner = self.inner.lock().map_err(|_| RenewalError::Poisoned)?;
        inner.generation += 1;
        if inner.state == RenewalState::Idle {
            inner.epoch += 1;
        }
        Ok(())
    }

    /// Exchanges the stored refresh token for a new access token, at most
    /// once per renewal epoch.
    ///
    /// `observed_epoch` is the epoch under which the caller's request went
    /// out. If a renewal has settled since, the caller is serviced from that
    /// outcome: the store either holds a fresh token or was cleared.
    pub fn renew(&self, observed_epoch: u64) -> Result<AccessToken, RenewalError> {
        let mut inner = self.inner.lock().map_err(|_| RenewalError::Poisoned)?;
        loop {
            if inner.epoch != observed_epoch {
                drop(inner);
                return self.settled_outcome();
            }
            match inner.state {
                RenewalState::Renewing => {
                    debug!("renewal already in flight, waiting on its outcome");
                    inner = self
                        .settled
                        .wait(inner)
                        .map_err(|_| RenewalError::Poisoned)?;
                }
                RenewalState::Idle => break,
            }
        }

        inner.state = RenewalState::Renewing;
        let generation = inner.generation;
        drop(inner);

        // Network I/O happens outside the lock so that concurrent failures
        // can observe the Renewing state and park instead of piling up.
        let result = self.execute_refresh();

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return Err(RenewalError::Poisoned),
        };
        inner.state = RenewalState::Idle;
        inner.epoch += 1;

        let outcome = match result {
            Ok(response) if inner.generation == generation => {
                match self.persist_renewed(&response) {
                    Ok(access) => {
                        debug!("access credential renewed");
                        Ok(access)
                    }
                    Err(err) => {
                        warn!(error = %err, "renewed credential could not be stored, clearing session");
                        self.clear_session(&mut inner);
                        Err(err)
                    }
                }
            }
            Ok(_) => {
                debug!("session invalidated during renewal, discarding result");
                Err(RenewalError::Superseded)
            }
            Err(err) => {
                warn!(error = %err, "credential renewal failed, clearing session");
                self.clear_session(&mut inner);
                Err(err)
            }
        };

        drop(inner);
        self.settled.notify_all();
        outcome
    }

    /// Outcome for a caller whose renewal epoch already settled: either the
    /// store holds a usable token, or the settling renewal cleared it.
    fn settled_outcome(&self) -> Result<AccessToken, RenewalError> {
        match self.store.get()? {
            Some(session) => Ok(session.tokens().access().clone()),
            None => Err(RenewalError::SessionCleared),
        }
    }

    fn clear_session(&self, inner: &mut Inner) {
        inner.generation += 1;
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "unable to clear credential store");
        }
    }

    fn execute_refresh(&self) -> Result<RefreshResponse, RenewalError> {
        let refresh = match self.store.get()? {
            Some(session) => session.tokens().refresh().clone(),
            None => return Err(RenewalError::MissingRefreshToken),
        };

        let body = serde_json::to_vec(&RefreshRequest { refresh: &refresh })
            .map_err(|err| RenewalError::MalformedResponse(err.to_string()))?;

        let request = Request::builder()
            .method(http::Method::POST)
            .uri(self.refresh_url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(|err| RenewalError::Transport(err.to_string()))?;

        let response = self.http.send(request).map_err(|err| match err {
            HttpClientError::Timeout(msg) => {
                debug!(cause = %msg, "renewal exceeded the bounded timeout");
                RenewalError::Timeout
            }
            HttpClientError::TransportError(msg) => RenewalError::Transport(msg),
            HttpClientError::InvalidResponse(msg) => RenewalError::MalformedResponse(msg),
        })?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(RenewalError::Rejected);
        }
        if !response.status().is_success() {
            return Err(RenewalError::MalformedResponse(format!(
                "unexpected status `{}` from refresh endpoint",
                response.status()
            )));
        }

        serde_json::from_slice(response.body())
            .map_err(|err| RenewalError::MalformedResponse(err.to_string()))
    }

    fn persist_renewed(&self, response: &RefreshResponse) -> Result<AccessToken, RenewalError> {
        let mut session = match self.store.get()? {
            Some(session) => session,
            None => return Err(RenewalError::Superseded),
        };
        session
            .tokens_mut()
            .renew(response.access.clone(), response.refresh.clone());
        self.store.set(&session)?;
        Ok(response.access.clone())
    }
}
