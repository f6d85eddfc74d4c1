use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// IPv4 addresses of the thirteen root servers (a through m).
pub const ROOT_HINTS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

/// Public recursive resolver asked for nameserver addresses that came
/// without glue.
pub const FALLBACK_RESOLVER: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ITERATIONS: usize = 16;
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Knobs for a [`crate::resolver::Resolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Servers the first query goes to.
    pub root_hints: Vec<IpAddr>,
    /// Recursive resolver used for glue-less nameservers.
    pub fallback: IpAddr,
    /// Destination port for every exchange.
    pub port: u16,
    /// Upper bound on a single query/reply exchange.
    pub timeout: Duration,
    /// Exchanges allowed per resolution before giving up.
    pub max_iterations: usize,
    /// Nesting allowed for glue resolution.
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root_hints: ROOT_HINTS.iter().copied().map(IpAddr::V4).collect(),
            fallback: IpAddr::V4(FALLBACK_RESOLVER),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ResolverConfig {
    pub fn with_root_hints(mut self, hints: Vec<IpAddr>) -> Self {
        self.root_hints = hints;
        self
    }

    pub fn with_fallback(mut self, fallback: IpAddr) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
