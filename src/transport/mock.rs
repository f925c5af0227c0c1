//! Scripted transports for tests. Every connect, written line and close is
//! recorded so tests can assert on what a session did on the wire.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Connector, Transport};

type ReplyFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// How a scripted host behaves. `None` replies mean the host stays silent.
#[derive(Clone)]
pub(crate) enum HostScript {
    Refuse,
    Respond {
        greeting: Option<String>,
        reply: Arc<ReplyFn>,
    },
}

impl HostScript {
    pub(crate) fn respond<F>(greeting: Option<&str>, reply: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::Respond {
            greeting: greeting.map(str::to_string),
            reply: Arc::new(reply),
        }
    }

    pub(crate) fn accept_all() -> Self {
        Self::respond(Some("220 mock.smtp.test ESMTP\r\n"), |_| {
            Some("250 ok\r\n".to_string())
        })
    }

    /// Accepts everything except `RCPT TO` for the listed addresses.
    pub(crate) fn reject_recipients(rejected: &[&str]) -> Self {
        let rejected: Vec<String> = rejected.iter().map(|r| format!("RCPT TO:<{r}>")).collect();
        Self::respond(Some("220 mock.smtp.test ESMTP\r\n"), move |command| {
            if rejected.iter().any(|r| r == command) {
                Some("550 5.1.1 no such user\r\n".to_string())
            } else {
                Some("250 ok\r\n".to_string())
            }
        })
    }

    /// Connects but never sends anything.
    pub(crate) fn silent() -> Self {
        Self::respond(None, |_| None)
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub connects: Vec<String>,
    pub written: Vec<(String, String)>,
    pub closes: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    hosts: HashMap<String, HostScript>,
    fallback: Option<HostScript>,
    log: Arc<Mutex<MockLog>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every host, known or not, accepts every command.
    pub(crate) fn always_accepting() -> Self {
        Self {
            fallback: Some(HostScript::accept_all()),
            ..Self::default()
        }
    }

    pub(crate) fn host(mut self, name: &str, script: HostScript) -> Self {
        self.hosts.insert(name.to_string(), script);
        self
    }

    pub(crate) fn connects(&self) -> Vec<String> {
        self.log.lock().unwrap().connects.clone()
    }

    pub(crate) fn written(&self, host: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .written
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub(crate) fn closes(&self, host: &str) -> usize {
        self.log.lock().unwrap().closes.get(host).copied().unwrap_or(0)
    }

    pub(crate) fn total_closes(&self) -> usize {
        self.log.lock().unwrap().closes.values().sum()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, host: &str, _port: u16) -> io::Result<MockTransport> {
        self.log.lock().unwrap().connects.push(host.to_string());
        let script = self.hosts.get(host).or(self.fallback.as_ref()).cloned();
        match script {
            None | Some(HostScript::Refuse) => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{host} refused the connection"),
            )),
            Some(HostScript::Respond { greeting, reply }) => Ok(MockTransport {
                host: host.to_string(),
                pending: VecDeque::from([greeting]),
                reply,
                closed: false,
                log: Arc::clone(&self.log),
            }),
        }
    }
}

pub(crate) struct MockTransport {
    host: String,
    pending: VecDeque<Option<String>>,
    reply: Arc<ReplyFn>,
    closed: bool,
    log: Arc<Mutex<MockLog>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        self.log
            .lock()
            .unwrap()
            .written
            .push((self.host.clone(), line.to_string()));
        self.pending.push_back((self.reply)(line));
        Ok(())
    }

    async fn read_payload(&mut self) -> io::Result<String> {
        match self.pending.pop_front().flatten() {
            Some(payload) => Ok(payload),
            None => std::future::pending::<io::Result<String>>().await,
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        *self
            .log
            .lock()
            .unwrap()
            .closes
            .entry(self.host.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}
