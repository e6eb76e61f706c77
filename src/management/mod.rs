mod cache;
mod store;

pub use cache::CacheMode;
pub use cache::RateLimitedCache;
pub use store::FileTokenStore;
pub use store::KEY_AUTH_TOKEN;
pub use store::MemoryTokenStore;
pub use store::TokenStore;
pub use store::load_json;
pub use store::pkce_session_key;
pub use store::pkce_session_states;
pub use store::store_json;
pub use store::take_pkce_session;
