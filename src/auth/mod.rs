//! Single-flight access token refresh.
//!
//! [`RefreshCoordinator`] sits on the request-dispatch path: it attaches the current
//! access token to governed requests, recognizes expiry failures through an
//! [`ExpiryPolicy`], runs at most one refresh at a time and replays every request that
//! failed during that refresh with the token it produced.

mod coordinator;
mod http;
mod policy;
mod request;
mod store;

pub use coordinator::{
    RefreshCall, RefreshCoordinator, RefreshCoordinatorBuilder, RequestExecutor, SessionListener,
};
pub use http::{HttpExecutor, HttpRefreshCall, build_http_client};
pub use policy::{DefaultExpiryPolicy, ExpiryPolicy};
pub use request::{ApiRequest, ApiResponse, FailureSignal, TransportError};
pub use store::{MemoryTokenStore, TokenStore};
