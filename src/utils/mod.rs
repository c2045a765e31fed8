pub(crate) mod endpoint;
pub(crate) mod logging;
pub(crate) mod retry_after;
