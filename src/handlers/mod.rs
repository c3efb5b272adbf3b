pub mod admin;
pub mod announce;
pub mod fallback;
pub mod metrics;
