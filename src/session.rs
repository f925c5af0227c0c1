//! Single-use SMTP probe session against one mail exchanger.
//!
//! A session walks `Disconnected → Connecting → Connected → HeloAcked →
//! RcptChecking → Closed`. One deadline covers the whole session: it starts
//! before the connect and is never reset per command. Whatever happens, the
//! transport is closed exactly once and the session ends in `Closed`.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::classify::ProbeOutcome;
use crate::mx::MxCandidate;
use crate::options::ProbeOptions;
use crate::transport::{Connector, ReplyTooLong, Transport};
use crate::types::{ErrorKind, VerificationResult};

/// How long a graceful close waits on `QUIT`. The verdict is already known
/// by then, so a server ignoring `QUIT` must not hold the session.
const QUIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    HeloAcked,
    RcptChecking,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::HeloAcked => "helo-acked",
            Self::RcptChecking => "rcpt-checking",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session could not reach `HeloAcked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub exchange: String,
    /// `ConnectionTimeout` or `ConnectionError`.
    pub kind: ErrorKind,
    pub detail: String,
    pub transcript: Vec<String>,
}

impl SessionFailure {
    /// Verdict for an address whose check could not even start.
    pub fn to_result(&self, email: &str) -> VerificationResult {
        VerificationResult::invalid(email, self.kind, Some(self.detail.clone()))
            .with_exchange(self.exchange.clone())
            .with_transcript(self.transcript.clone())
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.exchange, self.kind, self.detail)
    }
}

enum StepError {
    Timeout,
    Io(io::Error),
    /// The server answered, but not with anything that fits a reply.
    Malformed(io::Error),
}

impl StepError {
    fn from_io(err: io::Error) -> Self {
        if ReplyTooLong::is_cause_of(&err) {
            Self::Malformed(err)
        } else {
            Self::Io(err)
        }
    }

    /// Kind reported against a recipient once the session is established.
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::ConnectionTimeout,
            Self::Io(_) => ErrorKind::ConnectionError,
            Self::Malformed(_) => ErrorKind::ProtocolUndetermined,
        }
    }

    /// Kind reported for a candidate that never reached `HeloAcked`.
    fn establish_kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::ConnectionTimeout,
            Self::Io(_) | Self::Malformed(_) => ErrorKind::ConnectionError,
        }
    }

    fn detail(&self, exchange: &str, stage: &str) -> String {
        match self {
            Self::Timeout => format!("{exchange} timed out during {stage}"),
            Self::Io(err) => format!("{exchange} failed during {stage}: {err}"),
            Self::Malformed(err) => format!("{exchange} sent an unusable reply to {stage}: {err}"),
        }
    }
}

pub struct ProbeSession<T> {
    exchange: String,
    state: SessionState,
    transport: Option<T>,
    deadline: Instant,
    transcript: Vec<String>,
}

impl<T: Transport> ProbeSession<T> {
    /// Connects to `candidate`, waits for the greeting and sends `HELO`.
    ///
    /// On success the session is in `HeloAcked` and ready for exactly one
    /// [`verify_recipient`](Self::verify_recipient) call. On failure the
    /// transport, if any, has already been closed.
    pub async fn establish<C>(
        connector: &C,
        candidate: &MxCandidate,
        options: &ProbeOptions,
    ) -> Result<Self, SessionFailure>
    where
        C: Connector<Transport = T> + ?Sized,
    {
        let mut session = Self {
            exchange: candidate.exchange.clone(),
            state: SessionState::Disconnected,
            transport: None,
            deadline: Instant::now() + options.timeout,
            transcript: Vec::new(),
        };

        session.transition(SessionState::Connecting);
        let connected = timeout_at(
            session.deadline,
            connector.connect(&candidate.exchange, options.port),
        )
        .await;
        match connected {
            Ok(Ok(transport)) => session.transport = Some(transport),
            Ok(Err(err)) => return Err(session.abort(StepError::Io(err), "connect").await),
            Err(_) => return Err(session.abort(StepError::Timeout, "connect").await),
        }
        session.transition(SessionState::Connected);

        let greeting = match session.receive().await {
            Ok(raw) => raw,
            Err(err) => return Err(session.abort(err, "greeting").await),
        };
        if let Some(failure) = session.refuse_unless_accepted(&greeting, "greeting").await {
            return Err(failure);
        }

        let helo = format!("HELO {}", options.helo_name());
        let reply = match session.command(&helo).await {
            Ok(raw) => raw,
            Err(err) => return Err(session.abort(err, "HELO").await),
        };
        if let Some(failure) = session.refuse_unless_accepted(&reply, "HELO").await {
            return Err(failure);
        }
        session.transition(SessionState::HeloAcked);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Runs `MAIL FROM` then `RCPT TO` for `recipient` and closes the session.
    ///
    /// Accept → valid; 550 → `ProtocolReject`; anything else unrecognised →
    /// `ProtocolUndetermined`; deadline → `ConnectionTimeout`; transport
    /// failure → `ConnectionError`. A rejected `MAIL FROM` ends the check the
    /// same way.
    pub async fn verify_recipient(mut self, mail_from: &str, recipient: &str) -> VerificationResult {
        let mail = format!("MAIL FROM:<{mail_from}>");
        match self.command(&mail).await {
            Ok(raw) => {
                let outcome = ProbeOutcome::from_response(&raw);
                if !outcome.is_accept() {
                    return self.conclude(recipient, outcome).await;
                }
            }
            Err(err) => return self.fail_recipient(recipient, err, "MAIL FROM").await,
        }

        self.transition(SessionState::RcptChecking);
        let rcpt = format!("RCPT TO:<{recipient}>");
        match self.command(&rcpt).await {
            Ok(raw) => {
                let outcome = ProbeOutcome::from_response(&raw);
                self.conclude(recipient, outcome).await
            }
            Err(err) => self.fail_recipient(recipient, err, "RCPT TO").await,
        }
    }

    async fn conclude(mut self, recipient: &str, outcome: ProbeOutcome) -> VerificationResult {
        self.close(true).await;
        let result = match outcome {
            ProbeOutcome::Accept => VerificationResult::valid(recipient),
            ProbeOutcome::Reject { raw, .. } => {
                VerificationResult::invalid(recipient, ErrorKind::ProtocolReject, Some(raw))
            }
            ProbeOutcome::Undetermined { raw } => {
                VerificationResult::invalid(recipient, ErrorKind::ProtocolUndetermined, Some(raw))
            }
        };
        result
            .with_exchange(self.exchange.clone())
            .with_transcript(std::mem::take(&mut self.transcript))
    }

    async fn fail_recipient(
        mut self,
        recipient: &str,
        err: StepError,
        stage: &str,
    ) -> VerificationResult {
        let detail = err.detail(&self.exchange, stage);
        self.record("!", &detail);
        self.close(false).await;
        VerificationResult::invalid(recipient, err.kind(), Some(detail))
            .with_exchange(self.exchange.clone())
            .with_transcript(std::mem::take(&mut self.transcript))
    }

    /// Closes the session with a `ConnectionError` unless `raw` classifies as
    /// an acceptance.
    async fn refuse_unless_accepted(&mut self, raw: &str, stage: &str) -> Option<SessionFailure> {
        let outcome = ProbeOutcome::from_response(raw);
        if outcome.is_accept() {
            return None;
        }
        let detail = format!("{} {stage} not accepted: {}", self.exchange, raw.trim_end());
        self.close(true).await;
        Some(self.failure(ErrorKind::ConnectionError, detail))
    }

    async fn abort(&mut self, err: StepError, stage: &str) -> SessionFailure {
        let detail = err.detail(&self.exchange, stage);
        self.record("!", &detail);
        self.close(false).await;
        self.failure(err.establish_kind(), detail)
    }

    fn failure(&mut self, kind: ErrorKind, detail: String) -> SessionFailure {
        SessionFailure {
            exchange: self.exchange.clone(),
            kind,
            detail,
            transcript: std::mem::take(&mut self.transcript),
        }
    }

    async fn command(&mut self, command: &str) -> Result<String, StepError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| StepError::Io(not_connected()))?;
        self.transcript.push(format!("[{}] C: {command}", self.exchange));
        debug!(exchange = %self.exchange, state = %self.state, %command, "sending SMTP command");
        match timeout_at(self.deadline, transport.write_line(command)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(StepError::Io(err)),
            Err(_) => return Err(StepError::Timeout),
        }
        self.receive().await
    }

    async fn receive(&mut self) -> Result<String, StepError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| StepError::Io(not_connected()))?;
        let raw = match timeout_at(self.deadline, transport.read_payload()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(StepError::from_io(err)),
            Err(_) => return Err(StepError::Timeout),
        };
        for line in raw.lines() {
            self.record("S", line);
        }
        debug!(exchange = %self.exchange, state = %self.state, reply = %raw.trim_end(), "received SMTP reply");
        Ok(raw)
    }

    /// Takes the transport out of the session and closes it. A graceful close
    /// sends `QUIT` first, bounded by [`QUIT_GRACE`] and the session deadline.
    async fn close(&mut self, graceful: bool) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if graceful {
            self.transcript.push(format!("[{}] C: QUIT", self.exchange));
            let quit = async {
                transport.write_line("QUIT").await?;
                transport.read_payload().await
            };
            let quit_deadline = self.deadline.min(Instant::now() + QUIT_GRACE);
            if let Ok(Ok(reply)) = timeout_at(quit_deadline, quit).await {
                for line in reply.lines() {
                    self.transcript.push(format!("[{}] S: {line}", self.exchange));
                }
            }
        }
        if let Err(err) = transport.close().await {
            debug!(exchange = %self.exchange, error = %err, "closing transport failed");
        }
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(exchange = %self.exchange, from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    fn record(&mut self, direction: &str, message: &str) {
        self.transcript
            .push(format!("[{}] {direction}: {message}", self.exchange));
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session has no open transport")
}
