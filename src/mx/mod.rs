//! Mail-exchanger resolution.
//!
//! [`MxResolver`] wraps a DNS collaborator implementing [`LookupMx`] and adds
//! the ordering and failure policy the probe relies on: candidates come back
//! sorted by ascending priority, and an empty answer is an error.

mod error;
mod resolver;
mod types;

pub use error::MxError;
pub use resolver::{LookupMx, MxResolver, normalize_domain, normalize_exchange, resolve_with};
pub use types::MxCandidate;
