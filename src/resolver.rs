use crate::{
    config::ResolverConfig,
    contact::Transport,
    dns::next_id,
    types::{Dns, DnsError, ResourceRecord, ResponseCode, Type},
};
use async_recursion::async_recursion;
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where an iterative resolution stands after a reply has been inspected.
#[derive(Debug)]
pub enum State {
    /// Keep going with these candidates, the head being the next target.
    Querying(Vec<IpAddr>),
    /// The reply carries at least one answer record.
    Answered(Dns),
    /// Glue addresses of the servers the reply delegated to.
    Referred(Vec<IpAddr>),
    /// The reply named a nameserver but gave no address for it.
    NeedsGlueResolution(String),
    /// Nothing more can be done.
    Failed(DnsError),
}

impl State {
    /// Decides the next state from the reply of `servers[0]`.
    ///
    /// Checks run in a fixed order: error RCODE, answers, A glue in the
    /// additional section, remaining candidates, then an NS record in
    /// the authority section.
    pub fn next(servers: &[IpAddr], reply: Dns) -> State {
        if let Some(code) = ResponseCode::from_rcode(reply.header.flags.rcode) {
            return State::Failed(DnsError::Protocol(code));
        }

        if !reply.answers.is_empty() {
            return State::Answered(reply);
        }

        let glue: Vec<IpAddr> = reply
            .additionals
            .iter()
            .filter_map(|add| add.rdata.as_a())
            .map(IpAddr::V4)
            .collect();
        if !glue.is_empty() {
            return State::Referred(glue);
        }

        // The current server was no help; try its siblings first
        if servers.len() > 1 {
            return State::Querying(servers[1..].to_vec());
        }

        if let Some(ns) = reply.authorities.iter().find_map(|auth| auth.rdata.as_ns()) {
            return State::NeedsGlueResolution(ns.to_string());
        }

        let name = reply
            .questions
            .first()
            .map_or_else(|| "query".to_string(), |q| q.qname.clone());
        State::Failed(DnsError::Unresolvable(name))
    }
}

/// Iterative resolver: walks referrals from the root hints down to an
/// authoritative answer.
pub struct Resolver<T> {
    transport: T,
    config:    ResolverConfig,
    cancel:    CancellationToken,
}

impl<T: Transport> Resolver<T> {
    pub fn new(transport: T, config: ResolverConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts the resolution at the next step boundary once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves `domain` and returns the first answer record.
    ///
    /// `types` is a comma-separated list of record type mnemonics; an
    /// unknown one fails before any packet is sent.
    pub async fn resolve(&self, domain: &str, types: &str) -> Result<ResourceRecord, DnsError> {
        let reply = self.lookup(domain, types).await?;
        reply
            .answers
            .into_iter()
            .next()
            .ok_or_else(|| DnsError::Unresolvable(domain.to_string()))
    }

    /// Resolves `domain` and returns the whole answering message.
    pub async fn lookup(&self, domain: &str, types: &str) -> Result<Dns, DnsError> {
        let query = Dns::query(domain, types)?;
        self.iterate(&query, self.config.root_hints.clone(), 0).await
    }

    /// Sends `query` down the referral chain starting at `servers`.
    ///
    /// The same encoded query goes to every server. `depth` counts the
    /// glue resolutions this call is nested in.
    #[async_recursion]
    async fn iterate(
        &self,
        query:   &Dns,
        servers: Vec<IpAddr>,
        depth:   usize,
    ) -> Result<Dns, DnsError> {
        let packet = query.encode()?;
        let domain = query.questions.first().map_or("", |q| q.qname.as_str());
        let mut servers = servers;

        for iteration in 0..self.config.max_iterations {
            if self.cancel.is_cancelled() {
                return Err(DnsError::Cancelled);
            }

            let server = *servers
                .first()
                .ok_or_else(|| DnsError::Unresolvable(domain.to_string()))?;

            info!(%server, domain, iteration, depth, "querying");
            let reply = self.exchange(server, &packet, query.header.id).await?;
            debug!("reply from {server}\n{reply}");

            match State::next(&servers, reply) {
                State::Answered(reply) => return Ok(reply),
                State::Failed(err) => {
                    warn!(%server, domain, error = %err, "resolution failed");
                    return Err(err);
                }
                State::Referred(glue) => {
                    debug!(domain, candidates = glue.len(), "referred");
                    servers = glue;
                }
                State::Querying(rest) => {
                    debug!(%server, domain, "no usable referral, trying next candidate");
                    servers = rest;
                }
                State::NeedsGlueResolution(ns) => {
                    let address = self.resolve_glue(&ns, depth).await?;
                    servers = vec![address];
                }
            }
        }

        Err(DnsError::IterationLimit(self.config.max_iterations))
    }

    /// Finds an address for a nameserver the referral gave no glue for,
    /// by asking the fallback recursive resolver.
    async fn resolve_glue(&self, ns: &str, depth: usize) -> Result<IpAddr, DnsError> {
        if depth >= self.config.max_depth {
            return Err(DnsError::DepthLimit(self.config.max_depth));
        }

        info!(nameserver = ns, depth = depth + 1, "resolving nameserver without glue");
        let query = Dns::query_with_id(ns, &[Type::A], next_id());
        let reply = self
            .iterate(&query, vec![self.config.fallback], depth + 1)
            .await?;

        reply
            .answers
            .iter()
            .find_map(|answer| answer.rdata.as_a())
            .map(IpAddr::V4)
            .ok_or_else(|| DnsError::Unresolvable(ns.to_string()))
    }

    /// One bounded query/reply exchange with `server`.
    async fn exchange(&self, server: IpAddr, packet: &[u8], id: u16) -> Result<Dns, DnsError> {
        let addr = SocketAddr::new(server, self.config.port);

        let raw = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DnsError::Cancelled),
            sent = tokio::time::timeout(self.config.timeout, self.transport.send(addr, packet)) => {
                sent.map_err(|_| DnsError::Timeout(addr))??
            }
        };

        let reply = Dns::from_bytes(&raw)?;
        if reply.header.id != id {
            return Err(DnsError::MalformedMessage(format!(
                "reply id 0x{:04X} does not match query id 0x{id:04X}",
                reply.header.id
            )));
        }
        if reply.header.flags.tc {
            warn!(server = %addr, "reply truncated, using the partial reply");
        }
        Ok(reply)
    }
}
