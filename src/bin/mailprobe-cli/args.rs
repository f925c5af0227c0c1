use clap::Parser;
use mailprobe_lib::ProbeOptions;

#[derive(Parser, Debug)]
#[command(name = "mailprobe-cli", version, about = "Probe mailbox deliverability over SMTP without sending mail")]
pub struct Cli {
    /// addresses to check
    pub emails: Vec<String>,

    /// read addresses from stdin (one per line)
    #[arg(long)]
    pub stdin: bool,

    /// envelope sender used in MAIL FROM
    #[arg(long = "from", env = "MAILPROBE_FROM")]
    pub from_address: String,

    /// name announced in HELO (defaults to the sender's domain)
    #[arg(long)]
    pub helo: Option<String>,

    /// session timeout in milliseconds, covering connect to last reply
    #[arg(long = "timeout", default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// SMTP port
    #[arg(long, default_value_t = 25)]
    pub port: u16,

    /// maximum number of MX hosts tried per domain
    #[arg(long = "max-mx", default_value_t = 5)]
    pub max_mx: usize,

    /// maximum number of domains probed at once (unbounded when omitted)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// write report to file instead of stdout
    #[arg(long)]
    pub out: Option<String>,

    /// include the SMTP transcript in the report
    #[arg(long)]
    pub transcript: bool,

    /// debug logs on stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn probe_options(&self) -> ProbeOptions {
        let mut options = ProbeOptions::new(self.from_address.clone())
            .with_timeout_ms(self.timeout_ms)
            .with_port(self.port)
            .with_max_candidates(self.max_mx);
        if let Some(helo) = &self.helo {
            options = options.with_helo_name(helo.clone());
        }
        if let Some(limit) = self.concurrency {
            options = options.with_max_concurrent_domains(limit);
        }
        options
    }
}
