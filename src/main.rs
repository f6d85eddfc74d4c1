use anyhow::Context;
use clap::Parser;
use dns_iterate::config::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_ITERATIONS, DEFAULT_PORT};
use dns_iterate::{Resolver, ResolverConfig, UdpTransport};
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dns-iterate")]
#[command(version)]
#[command(about = "Resolve a domain by walking referrals from the root servers")]
struct Cli {
    /// Domain name to resolve
    domain: String,

    /// Record types to ask for, comma separated (A, AAAA, NS, CNAME, MX, ...)
    #[arg(short = 't', long = "type", default_value = "A")]
    record_type: String,

    /// Log every reply along the way
    #[arg(short, long)]
    verbose: bool,

    /// Start from this server instead of the root hints (repeatable)
    #[arg(short = 's', long = "server", value_name = "IP")]
    servers: Vec<IpAddr>,

    /// Recursive resolver used to find nameservers that came without glue
    #[arg(long, value_name = "IP")]
    fallback: Option<IpAddr>,

    /// Destination port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Per-exchange timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    timeout: u64,

    /// Exchanges allowed per resolution
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Nested glue resolutions allowed
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::default()
            .with_port(self.port)
            .with_timeout(Duration::from_millis(self.timeout))
            .with_max_iterations(self.max_iterations)
            .with_max_depth(self.max_depth);

        if !self.servers.is_empty() {
            config = config.with_root_hints(self.servers.clone());
        }
        if let Some(fallback) = self.fallback {
            config = config.with_fallback(fallback);
        }
        config
    }
}

fn init_logging(cli: &Cli) {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = cli.config();
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping at the next step");
            on_interrupt.cancel();
        }
    });

    let resolver = Resolver::new(UdpTransport::new(config.timeout), config)
        .with_cancellation(cancel);

    let reply = resolver
        .lookup(&cli.domain, &cli.record_type)
        .await
        .with_context(|| format!("failed to resolve {}", cli.domain))?;

    println!(";; ANSWER SECTION:");
    for answer in &reply.answers {
        println!("{answer}");
    }
    if let Some(first) = reply.answers.first() {
        println!("\n{}", first.rdata);
    }

    Ok(())
}
