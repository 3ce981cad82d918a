//! Single-flight token refresh coordination.
//!
//! At most one refresh exchange is in flight for the whole client. The first
//! operation to observe an expired token becomes the leader and performs the
//! exchange; operations that fail while it runs are queued and resumed, in
//! arrival order, once the exchange settles.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthStateSignal, TokenPair, TokenStore};
use crate::endpoint::EndpointUrl;
use crate::error::AuthError;
use crate::graphql::{GraphQlResponse, Operation, RefreshData, REFRESH_TOKEN_MUTATION};
use crate::transport::HttpTransport;

type Outcome = Result<(), AuthError>;

/// Coordinates the refresh exchange across all concurrent operations.
///
/// One instance exists per client; it owns the refresh half of the shared
/// state (the `IDLE`/`REFRESHING` flag, the waiter queue, and the
/// re-authentication signal).
pub(crate) struct RefreshCoordinator {
    transport: HttpTransport,
    store: Arc<dyn TokenStore>,
    auth_endpoint: EndpointUrl,
    exchange_timeout: Duration,
    signal: AuthStateSignal,
    state: Mutex<RefreshState>,
}

enum RefreshState {
    Idle,
    Refreshing {
        // FIFO: waiters are resumed in arrival order when the exchange settles.
        waiters: Vec<oneshot::Sender<Outcome>>,
    },
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Outcome>),
}

impl RefreshCoordinator {
    pub(crate) fn new(
        transport: HttpTransport,
        store: Arc<dyn TokenStore>,
        auth_endpoint: EndpointUrl,
        exchange_timeout: Duration,
        signal: AuthStateSignal,
    ) -> Self {
        Self {
            transport,
            store,
            auth_endpoint,
            exchange_timeout,
            signal,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Ensure the stored credentials are fresh.
    ///
    /// Called after an operation fails with the expiry code. Returns `Ok` when
    /// a refresh exchange (ours or one already in flight) has produced new
    /// credentials; the caller then re-reads the store and replays its
    /// operation. Any error is terminal: the store has been cleared and the
    /// caller must not retry.
    #[instrument(skip(self))]
    pub(crate) async fn ensure_fresh(&self) -> Outcome {
        match self.begin() {
            Role::Waiter(rx) => {
                debug!("refresh already in flight, queueing");
                rx.await.unwrap_or(Err(AuthError::RefreshRejected {
                    reason: "refresh aborted before completion".to_string(),
                }))
            }
            Role::Leader => {
                info!("access token expired, starting refresh exchange");
                self.signal.set(true);
                // If this future is dropped mid-exchange the guard settles the
                // state back to idle and fails the queued waiters, so a later
                // expiry can start a new exchange.
                let mut guard = SettleGuard { coordinator: self, armed: true };
                let outcome = self.exchange().await;
                self.settle(outcome.clone());
                guard.armed = false;
                match &outcome {
                    Ok(()) => info!("refresh exchange succeeded"),
                    Err(e) => warn!(error = %e, "refresh exchange failed, logging out"),
                }
                outcome
            }
        }
    }

    /// Enter the state machine: become the leader or join the queue.
    fn begin(&self) -> Role {
        let mut state = self.lock_state();
        match &mut *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: Vec::new(),
                };
                Role::Leader
            }
            RefreshState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Waiter(rx)
            }
        }
    }

    /// Return to idle and resume every queued waiter with the outcome.
    ///
    /// The queue is drained exactly once, after the signal has been cleared,
    /// so subscribers observe the `false` transition before any replay runs.
    fn settle(&self, outcome: Outcome) {
        let waiters = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };
        self.signal.set(false);
        debug!(waiters = waiters.len(), "refresh settled, draining queue");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Perform the refresh exchange itself.
    async fn exchange(&self) -> Outcome {
        // A store read failure is treated as "no refresh token".
        let tokens = self.store.tokens().await.unwrap_or_else(|e| {
            warn!(error = %e, "token store read failed during refresh");
            TokenPair::empty()
        });

        let Some(refresh_token) = tokens.refresh else {
            // Unrecoverable: never issue an exchange call without a token.
            self.logout().await;
            return Err(AuthError::MissingRefreshToken);
        };

        let operation = Operation::new(REFRESH_TOKEN_MUTATION)
            .operation_name("RefreshToken")
            .variable("refreshToken", json!(refresh_token.as_str()))
            .unauthenticated();

        let response = tokio::time::timeout(
            self.exchange_timeout,
            self.transport.send(&self.auth_endpoint, &operation, None),
        )
        .await;

        let response = match response {
            Err(_) => {
                return self
                    .reject(format!(
                        "exchange timed out after {}ms",
                        self.exchange_timeout.as_millis()
                    ))
                    .await;
            }
            Ok(Err(e)) => return self.reject(e.to_string()).await,
            Ok(Ok(response)) => response,
        };

        self.accept(response).await
    }

    /// Validate the exchange response and persist the new credential pair.
    async fn accept(&self, response: GraphQlResponse<Value>) -> Outcome {
        // The exchange call never triggers another refresh, even when the
        // server answers it with the expiry code.
        if response.is_token_expired() {
            return self.reject("refresh token expired".to_string()).await;
        }
        if !response.errors.is_empty() {
            let reasons: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            return self.reject(reasons.join("; ")).await;
        }

        let Some(data) = response.data else {
            return self.reject("exchange response carried no data".to_string()).await;
        };
        let payload = match serde_json::from_value::<RefreshData>(data) {
            Ok(data) => data.refresh_token,
            Err(e) => return self.reject(format!("malformed exchange response: {e}")).await,
        };

        let (token, refresh_token) = match (&payload.token, &payload.refresh_token) {
            (Some(token), Some(refresh)) if payload.success && !token.is_empty() && !refresh.is_empty() => {
                (token.clone(), refresh.clone())
            }
            _ => {
                let reason = payload
                    .errors
                    .filter(|errors| !errors.is_empty())
                    .map(|errors| errors.join("; "))
                    .unwrap_or_else(|| "exchange rejected".to_string());
                return self.reject(reason).await;
            }
        };

        if let Err(e) = self.store.save(TokenPair::new(token, refresh_token)).await {
            return self.reject(format!("failed to persist tokens: {e}")).await;
        }

        debug!("new credential pair persisted");
        Ok(())
    }

    /// Terminal failure path: clear credentials and report the reason.
    async fn reject(&self, reason: String) -> Outcome {
        self.logout().await;
        Err(AuthError::RefreshRejected { reason })
    }

    async fn logout(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear token store during logout");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Settles the coordinator if the leader future is dropped mid-exchange.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.settle(Err(AuthError::RefreshRejected {
                reason: "refresh aborted before completion".to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn coordinator(
        server: &MockServer,
        store: Arc<MemoryTokenStore>,
        timeout: Duration,
    ) -> Arc<RefreshCoordinator> {
        let endpoint =
            EndpointUrl::new(format!("http://127.0.0.1:{}/auth", server.address().port())).unwrap();
        Arc::new(RefreshCoordinator::new(
            HttpTransport::new().unwrap(),
            store,
            endpoint,
            timeout,
            AuthStateSignal::new(),
        ))
    }

    #[tokio::test]
    async fn successful_exchange_persists_new_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_partial_json(serde_json::json!({
                "variables": { "refreshToken": "R1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "refreshToken": {
                    "success": true, "token": "T2", "refreshToken": "R2", "errors": null
                }}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("T1", "R1")));
        let coordinator = coordinator(&server, Arc::clone(&store), Duration::from_secs(5));

        coordinator.ensure_fresh().await.unwrap();

        let tokens = store.tokens().await.unwrap();
        assert_eq!(tokens.access.unwrap().as_str(), "T2");
        assert_eq!(tokens.refresh.unwrap().as_str(), "R2");
    }

    #[tokio::test]
    async fn missing_refresh_token_skips_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair {
            access: Some(crate::auth::AccessToken::new("T1")),
            refresh: None,
        }));
        let coordinator = coordinator(&server, Arc::clone(&store), Duration::from_secs(5));

        let err = coordinator.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingRefreshToken));
        // Logout cleared the stale access token too
        assert!(store.tokens().await.unwrap().access.is_none());
    }

    #[tokio::test]
    async fn exchange_timeout_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({ "data": null })),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("T1", "R1")));
        let coordinator = coordinator(&server, Arc::clone(&store), Duration::from_millis(50));

        let err = coordinator.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshRejected { .. }));
        assert!(store.tokens().await.unwrap().refresh.is_none());
    }

    #[tokio::test]
    async fn dropped_leader_fails_waiters_and_resets_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({
                        "data": { "refreshToken": {
                            "success": true, "token": "T2", "refreshToken": "R2", "errors": null
                        }}
                    })),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("T1", "R1")));
        let coordinator = coordinator(&server, store, Duration::from_secs(5));

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.ensure_fresh().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.ensure_fresh().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        leader.abort();
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Err(AuthError::RefreshRejected { .. })));

        // The machine is idle again: a new caller becomes leader, not a waiter
        assert!(matches!(*coordinator.lock_state(), RefreshState::Idle));
    }

    #[tokio::test]
    async fn waiters_resume_in_arrival_order() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("T1", "R1")));
        let coordinator = coordinator(&server, store, Duration::from_secs(5));

        // Take the leader slot so every later caller queues
        assert!(matches!(coordinator.begin(), Role::Leader));

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for i in 1..=3 {
            let rx = match coordinator.begin() {
                Role::Waiter(rx) => rx,
                Role::Leader => panic!("second leader while a refresh is in flight"),
            };
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                rx.await.unwrap().unwrap();
                order.lock().unwrap().push(i);
            }));
        }

        // Let every waiter park on its channel before the exchange settles
        tokio::task::yield_now().await;

        coordinator.settle(Ok(()));
        for waiter in waiters {
            waiter.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert!(matches!(*coordinator.lock_state(), RefreshState::Idle));
    }
}
