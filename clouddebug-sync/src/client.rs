//! Per-credential client cache
//!
//! Transports are created lazily per `(user email, timeout class)` and reused until
//! the user logs out. A user without credentials gets no client, which callers treat
//! as "not logged in" rather than as a failure.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use clouddebug_core::DebuggerConfig;

use crate::http::HttpTransport;
use crate::transport::DebuggerTransport;

/// Supplies bearer tokens. Storage and refresh of credentials happen elsewhere.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self, user_email: &str) -> Option<String>;
}

/// In-memory token table
#[derive(Debug, Default)]
pub struct StaticCredentials {
    tokens: DashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, user_email: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(user_email.into(), token.into());
        self
    }

    pub fn set_token(&self, user_email: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(user_email.into(), token.into());
    }

    pub fn remove(&self, user_email: &str) {
        self.tokens.remove(user_email);
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self, user_email: &str) -> Option<String> {
        self.tokens.get(user_email).map(|t| t.value().clone())
    }
}

/// Which client timeout a call needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Hanging list calls
    Long,
    /// Set, get, delete
    Short,
}

/// Builds transports for a user. `None` when the user has no credentials.
pub trait TransportFactory: Send + Sync {
    fn create(&self, user_email: &str, class: TimeoutClass) -> Option<Arc<dyn DebuggerTransport>>;
}

/// Factory for [`HttpTransport`]s
pub struct HttpTransportFactory {
    root_url: String,
    client_version: String,
    user_agent: String,
    long_timeout: Duration,
    short_timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransportFactory {
    pub fn new(config: &DebuggerConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            root_url: config.root_url.clone(),
            client_version: config.client_version.clone(),
            user_agent: config.user_agent.clone(),
            long_timeout: Duration::from_secs(config.long_timeout_secs),
            short_timeout: Duration::from_secs(config.short_timeout_secs),
            credentials,
        }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self, user_email: &str, class: TimeoutClass) -> Option<Arc<dyn DebuggerTransport>> {
        self.credentials.access_token(user_email)?;

        let timeout = match class {
            TimeoutClass::Long => self.long_timeout,
            TimeoutClass::Short => self.short_timeout,
        };
        match HttpTransport::new(
            &self.root_url,
            &self.client_version,
            &self.user_agent,
            timeout,
            user_email,
            self.credentials.clone(),
        ) {
            Ok(transport) => Some(Arc::new(transport)),
            Err(e) => {
                tracing::warn!("Failed to build debugger client for {}: {}", user_email, e);
                None
            }
        }
    }
}

/// Cache of transports keyed by user and timeout class
pub struct ClientCache {
    factory: Arc<dyn TransportFactory>,
    clients: DashMap<(String, TimeoutClass), Arc<dyn DebuggerTransport>>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    pub fn long_timeout_client(&self, user_email: Option<&str>) -> Option<Arc<dyn DebuggerTransport>> {
        self.client_for(user_email, TimeoutClass::Long)
    }

    pub fn short_timeout_client(&self, user_email: Option<&str>) -> Option<Arc<dyn DebuggerTransport>> {
        self.client_for(user_email, TimeoutClass::Short)
    }

    pub fn client_for(
        &self,
        user_email: Option<&str>,
        class: TimeoutClass,
    ) -> Option<Arc<dyn DebuggerTransport>> {
        let email = user_email.filter(|e| !e.is_empty())?;
        let key = (email.to_string(), class);

        if let Some(client) = self.clients.get(&key) {
            return Some(client.value().clone());
        }

        let Some(client) = self.factory.create(email, class) else {
            tracing::debug!("No debugger credentials for {}", email);
            return None;
        };
        Some(self.clients.entry(key).or_insert(client).value().clone())
    }

    /// Pre-populate a client. Used for injected transports.
    pub fn insert(&self, user_email: &str, class: TimeoutClass, client: Arc<dyn DebuggerTransport>) {
        self.clients.insert((user_email.to_string(), class), client);
    }

    /// Drop every cached client of a user (logout).
    pub fn invalidate_user(&self, user_email: &str) {
        self.clients.retain(|(email, _), _| email != user_email);
        tracing::debug!("Invalidated debugger clients for {}", user_email);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        known_user: &'static str,
        created: AtomicUsize,
    }

    impl TransportFactory for CountingFactory {
        fn create(&self, user_email: &str, _class: TimeoutClass) -> Option<Arc<dyn DebuggerTransport>> {
            if user_email != self.known_user {
                return None;
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(MockTransport::new()))
        }
    }

    fn cache() -> (ClientCache, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            known_user: "dev@example.com",
            created: AtomicUsize::new(0),
        });
        (ClientCache::new(factory.clone()), factory)
    }

    #[test]
    fn test_clients_cached_per_user_and_class() {
        let (cache, factory) = cache();
        let a = cache.long_timeout_client(Some("dev@example.com")).unwrap();
        let b = cache.long_timeout_client(Some("dev@example.com")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        cache.short_timeout_client(Some("dev@example.com")).unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_missing_user_or_credentials_yield_none() {
        let (cache, _) = cache();
        assert!(cache.long_timeout_client(None).is_none());
        assert!(cache.long_timeout_client(Some("")).is_none());
        assert!(cache.long_timeout_client(Some("stranger@example.com")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_user_forces_rebuild() {
        let (cache, factory) = cache();
        cache.long_timeout_client(Some("dev@example.com")).unwrap();
        cache.short_timeout_client(Some("dev@example.com")).unwrap();
        cache.invalidate_user("dev@example.com");
        assert!(cache.is_empty());

        cache.long_timeout_client(Some("dev@example.com")).unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_http_factory_requires_token() {
        let credentials = Arc::new(StaticCredentials::new().with_token("dev@example.com", "tok"));
        let factory = HttpTransportFactory::new(&DebuggerConfig::default(), credentials.clone());
        assert!(factory.create("dev@example.com", TimeoutClass::Short).is_some());
        assert!(factory.create("other@example.com", TimeoutClass::Short).is_none());

        credentials.remove("dev@example.com");
        assert!(factory.create("dev@example.com", TimeoutClass::Short).is_none());
    }
}
