//! Activity sync pipeline and CSV projection

pub mod activity;
pub mod aggregate;
pub mod config;
pub mod export;
pub mod filter;
pub mod format;
pub mod log;
pub mod pagination;
pub mod provider;
pub mod staleness;

pub use activity::{ItemBundle, Stream};
pub use provider::{ActivityProvider, ProviderError};
