//! Credential state shared between concurrent callers
//!
//! A [`CredentialStore`] owns one credential. Reads and writes go through a
//! `tokio` `RwLock`; refreshes additionally pass a single gate so that at
//! most one refresh per store is in flight. Callers that queue behind a
//! running refresh take its outcome instead of issuing their own request.
//!
//! Nothing here refreshes on a timer. Expiry is recorded in unix seconds
//! and checked when a caller asks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::crypto::EncodingAesKey;
use crate::error::WechatError;
use crate::types::{AccessToken, AppId, AppSecret};
use crate::utils::unix_now;

#[derive(Debug, Default)]
struct RefreshGate {
    generation: u64,
    failure: Option<String>,
}

/// Atomic read/update cell with single-flight refresh.
#[derive(Debug)]
pub struct CredentialStore<T> {
    state: RwLock<T>,
    gate: Mutex<RefreshGate>,
    generation: AtomicU64,
}

impl<T: Clone> CredentialStore<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: RwLock::new(value),
            gate: Mutex::new(RefreshGate::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Clone of the current value.
    pub async fn snapshot(&self) -> T {
        self.state.read().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.state.read().await)
    }

    /// Mutate in place under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.state.write().await)
    }

    /// Swap in a new value, returning the old one.
    pub async fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.state.write().await, value)
    }

    /// Number of refreshes completed through [`refresh`](Self::refresh).
    pub fn refresh_count(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Run `fetch` and merge its output with `apply`, unless another caller
    /// completed a refresh while this one was waiting for the gate.
    ///
    /// - If a refresh finished while waiting, its outcome is returned: the
    ///   current value on success, [`WechatError::Token`] on failure.
    /// - Otherwise `is_stale` decides whether a fetch is needed at all.
    ///
    /// `fetch` receives a snapshot and runs without holding the state lock,
    /// so concurrent readers and unrelated updates are not blocked.
    pub async fn refresh<U, S, F, Fut, A>(
        &self,
        is_stale: S,
        fetch: F,
        apply: A,
    ) -> Result<T, WechatError>
    where
        S: FnOnce(&T) -> bool,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<U, WechatError>>,
        A: FnOnce(&mut T, U),
    {
        let observed = self.generation.load(Ordering::Acquire);
        let mut gate = self.gate.lock().await;

        if gate.generation != observed {
            if let Some(message) = &gate.failure {
                return Err(WechatError::Token(format!(
                    "concurrent refresh failed: {}",
                    message
                )));
            }
            return Ok(self.snapshot().await);
        }

        let current = self.snapshot().await;
        if !is_stale(&current) {
            return Ok(current);
        }

        let result = fetch(current).await;

        gate.generation += 1;
        let outcome = match result {
            Ok(update) => {
                gate.failure = None;
                let mut state = self.state.write().await;
                apply(&mut *state, update);
                Ok(state.clone())
            }
            Err(e) => {
                gate.failure = Some(e.to_string());
                Err(e)
            }
        };
        self.generation.store(gate.generation, Ordering::Release);
        outcome
    }
}

/// The component's own credentials and token state.
#[derive(Clone)]
pub struct ComponentCredential {
    pub appid: AppId,
    pub secret: AppSecret,
    /// Token configured for push-signature verification.
    pub message_token: String,
    pub aes_key: EncodingAesKey,
    /// Latest `component_verify_ticket` pushed by WeChat.
    pub verify_ticket: Option<String>,
    pub access_token: Option<AccessToken>,
    /// Unix seconds; the token is invalid at or after this instant.
    pub access_token_expires_at: i64,
}

impl ComponentCredential {
    pub fn new(
        appid: AppId,
        secret: AppSecret,
        message_token: impl Into<String>,
        aes_key: EncodingAesKey,
    ) -> Self {
        Self {
            appid,
            secret,
            message_token: message_token.into(),
            aes_key,
            verify_ticket: None,
            access_token: None,
            access_token_expires_at: 0,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.access_token.is_none() || now >= self.access_token_expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// The access token if it is still valid at `now`.
    pub fn valid_access_token_at(&self, now: i64) -> Option<&AccessToken> {
        if self.is_expired_at(now) {
            return None;
        }
        self.access_token.as_ref()
    }
}

impl std::fmt::Debug for ComponentCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCredential")
            .field("appid", &self.appid)
            .field("secret", &self.secret)
            .field("aes_key", &self.aes_key)
            .field("has_verify_ticket", &self.verify_ticket.is_some())
            .field("access_token", &self.access_token)
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish_non_exhaustive()
    }
}

/// Tokens held on behalf of one authorized account.
///
/// Serializable so callers can persist it and restore it across restarts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerCredential {
    pub authorizer_appid: String,
    pub access_token: AccessToken,
    pub refresh_token: String,
    /// Unix seconds; the token is invalid at or after this instant.
    pub access_token_expires_at: i64,
    /// The component this authorization was granted to.
    pub component_appid: AppId,
}

impl AuthorizerCredential {
    /// Rebuild a credential from values the caller persisted.
    pub fn restore(
        component_appid: AppId,
        authorizer_appid: impl Into<String>,
        access_token: AccessToken,
        refresh_token: impl Into<String>,
        access_token_expires_at: i64,
    ) -> Self {
        Self {
            authorizer_appid: authorizer_appid.into(),
            access_token,
            refresh_token: refresh_token.into(),
            access_token_expires_at,
            component_appid,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.access_token_expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

impl std::fmt::Debug for AuthorizerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerCredential")
            .field("authorizer_appid", &self.authorizer_appid)
            .field("access_token", &self.access_token)
            .field("refresh_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("component_appid", &self.component_appid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_update_and_snapshot() {
        let store = CredentialStore::new(1u32);
        store.update(|v| *v += 1).await;
        assert_eq!(store.snapshot().await, 2);
        assert_eq!(store.replace(7).await, 2);
        assert_eq!(store.read(|v| *v * 2).await, 14);
    }

    #[tokio::test]
    async fn test_refresh_skips_fresh_value() {
        let store = CredentialStore::new(5u32);
        let value = store
            .refresh(
                |_| false,
                |_| async { Err::<u32, _>(WechatError::Token("unreachable".into())) },
                |v, u| *v = u,
            )
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(store.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let store = Arc::new(CredentialStore::new(0u32));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            async move {
                store
                    .refresh(
                        |v| *v == 0,
                        |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(42u32)
                        },
                        |v, u| *v = u,
                    )
                    .await
            }
        });

        let results = futures::future::join_all(tasks).await;
        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_waiters_observe_failure() {
        let store = Arc::new(CredentialStore::new(0u32));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..4).map(|_| {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            async move {
                store
                    .refresh(
                        |_| true,
                        |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Err::<u32, _>(WechatError::Token("boom".into()))
                        },
                        |v, u| *v = u,
                    )
                    .await
            }
        });

        let results = futures::future::join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Err(WechatError::Token(_)))));
    }

    #[tokio::test]
    async fn test_update_during_refresh_is_kept() {
        #[derive(Clone, Default)]
        struct Pair {
            token: u32,
            ticket: u32,
        }

        let store = Arc::new(CredentialStore::new(Pair::default()));
        let refresh = {
            let store = Arc::clone(&store);
            async move {
                store
                    .refresh(
                        |_| true,
                        |_| async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(9u32)
                        },
                        |p, u| p.token = u,
                    )
                    .await
            }
        };
        let push = {
            let store = Arc::clone(&store);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                store.update(|p| p.ticket = 3).await;
            }
        };
        let (result, _) = tokio::join!(refresh, push);
        let pair = result.unwrap();
        assert_eq!((pair.token, pair.ticket), (9, 3));
    }

    #[test]
    fn test_authorizer_expiry_boundary() {
        let cred = AuthorizerCredential::restore(
            AppId::new("wx1234567890abcdef").unwrap(),
            "wxaaaaaaaaaaaaaaaa",
            AccessToken::new("at").unwrap(),
            "rt",
            1_000,
        );
        assert!(!cred.is_expired_at(999));
        assert!(cred.is_expired_at(1_000));
        assert!(!format!("{:?}", cred).contains("rt\""));
    }

    #[test]
    fn test_authorizer_credential_persists_as_json() {
        let cred = AuthorizerCredential::restore(
            AppId::new("wx1234567890abcdef").unwrap(),
            "wxaaaaaaaaaaaaaaaa",
            AccessToken::new("at").unwrap(),
            "rt",
            1_000,
        );
        let json = serde_json::to_string(&cred).unwrap();
        let back: AuthorizerCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cred);
    }

    #[test]
    fn test_component_token_validity() {
        let mut cred = ComponentCredential::new(
            AppId::new("wx1234567890abcdef").unwrap(),
            AppSecret::new("secret").unwrap(),
            "bjwonder",
            EncodingAesKey::from_bytes([7u8; 32]),
        );
        assert!(cred.is_expired_at(0));
        cred.access_token = Some(AccessToken::new("AT1").unwrap());
        cred.access_token_expires_at = 100;
        assert!(cred.valid_access_token_at(99).is_some());
        assert!(cred.valid_access_token_at(100).is_none());
    }
}
