mod error_handler;
mod rate_limit;
mod response_cache;
mod routing;

pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, rate_limit};
pub use response_cache::{ResponseCache, is_cacheable_request, response_cache};
pub use routing::{ResolvedTarget, RouteTarget, resolve_target};
