use async_trait::async_trait;
use parking_lot::RwLock;
use vigil_schema::TokenPair;

/// Holder of the current session tokens. The storage medium is up to the implementor.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn read(&self) -> Option<TokenPair>;

    /// Replaces the stored pair atomically.
    async fn write(&self, tokens: TokenPair);

    async fn clear(&self);
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new(tokens: Option<TokenPair>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }

    pub fn snapshot(&self) -> Option<TokenPair> {
        self.tokens.read().clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn read(&self) -> Option<TokenPair> {
        self.snapshot()
    }

    async fn write(&self, tokens: TokenPair) {
        *self.tokens.write() = Some(tokens);
    }

    async fn clear(&self) {
        *self.tokens.write() = None;
    }
}
