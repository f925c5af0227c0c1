#![forbid(unsafe_code)]
//! mailprobe_lib: SMTP deliverability probing without sending mail.
//!
//! Addresses are grouped by domain, each domain's mail exchangers are
//! resolved and tried in priority order, and every address is checked with a
//! short `HELO` / `MAIL FROM` / `RCPT TO` dialogue. The outcome per address is
//! valid, rejected, or explicitly undetermined.

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod mx;
pub mod options;
pub mod session;
pub mod transport;
pub mod triage;
pub mod types;
pub mod verifier;

pub use classify::{Classification, ProbeOutcome, classify};
pub use coordinator::{VerificationCoordinator, validate_all};
pub use error::VerifyError;
pub use mx::{LookupMx, MxCandidate, MxError, MxResolver};
pub use options::ProbeOptions;
pub use session::{ProbeSession, SessionFailure, SessionState};
pub use transport::{Connector, TcpConnector, Transport};
pub use triage::{TriageMap, triage};
pub use types::{ErrorKind, ResultMap, VerificationResult};
pub use verifier::DomainVerifier;
