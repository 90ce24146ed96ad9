//! Fixed-window rate limiting domain

mod store;

pub use store::{Admission, RateLimitError, RateLimitStore};
