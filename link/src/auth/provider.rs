//! Lazily resolved credentials.
//!
//! Use [`DynamicAuthProvider`] to supply credentials on every handshake,
//! so that each reconnect presents fresh authorization:
//!
//! ```rust,no_run
//! use realtime_link::{AuthProvider, DynamicAuthProvider};
//!
//! struct TokenStore;
//!
//! #[async_trait::async_trait]
//! impl DynamicAuthProvider for TokenStore {
//!     async fn get_auth(&self) -> realtime_link::Result<AuthProvider> {
//!         Ok(AuthProvider::bearer_token("fresh-token"))
//!     }
//! }
//! ```

use super::AuthProvider;
use crate::error::Result;
use std::sync::Arc;

/// Async credential source called before every handshake.
#[async_trait::async_trait]
pub trait DynamicAuthProvider: Send + Sync + 'static {
    /// Return the current (or freshly refreshed) credentials.
    async fn get_auth(&self) -> Result<AuthProvider>;
}

/// A reference-counted [`DynamicAuthProvider`].
pub type ArcDynAuthProvider = Arc<dyn DynamicAuthProvider>;

/// Either static credentials or a dynamic source.
///
/// Call [`resolve`](ResolvedAuth::resolve) before each handshake.
#[derive(Clone)]
pub enum ResolvedAuth {
    /// Static credentials set at construction time.
    Static(AuthProvider),
    /// Dynamic provider called on every handshake.
    Dynamic(ArcDynAuthProvider),
}

impl ResolvedAuth {
    /// Obtain effective credentials, calling the dynamic provider if present.
    pub async fn resolve(&self) -> Result<AuthProvider> {
        match self {
            Self::Static(p) => Ok(p.clone()),
            Self::Dynamic(provider) => provider.get_auth().await,
        }
    }
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(p) => write!(f, "ResolvedAuth::Static({:?})", p),
            Self::Dynamic(_) => write!(f, "ResolvedAuth::Dynamic(<fn>)"),
        }
    }
}

impl Default for ResolvedAuth {
    fn default() -> Self {
        Self::Static(AuthProvider::None)
    }
}

impl From<AuthProvider> for ResolvedAuth {
    fn from(p: AuthProvider) -> Self {
        Self::Static(p)
    }
}

impl From<ArcDynAuthProvider> for ResolvedAuth {
    fn from(p: ArcDynAuthProvider) -> Self {
        Self::Dynamic(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    #[async_trait::async_trait]
    impl DynamicAuthProvider for Counting {
        async fn get_auth(&self) -> Result<AuthProvider> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(AuthProvider::bearer_token(format!("token-{}", n)))
        }
    }

    #[tokio::test]
    async fn test_dynamic_provider_called_on_every_resolve() {
        let provider: ArcDynAuthProvider = Arc::new(Counting(AtomicU32::new(0)));
        let resolved = ResolvedAuth::from(provider);

        let first = resolved.resolve().await.unwrap();
        let second = resolved.resolve().await.unwrap();

        assert_eq!(first.headers().get("Authorization").unwrap(), "Bearer token-0");
        assert_eq!(second.headers().get("Authorization").unwrap(), "Bearer token-1");
    }

    #[tokio::test]
    async fn test_default_is_unauthenticated() {
        let resolved = ResolvedAuth::default();
        assert!(!resolved.resolve().await.unwrap().is_authenticated());
    }
}
