#![allow(dead_code)]
use async_trait::async_trait;
use dns_iterate::{Dns, DnsError, RData, ResourceRecord, Transport};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&Dns) -> Vec<u8> + Send + Sync>;

/// One exchange seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Call {
    pub server: SocketAddr,
    pub query: Dns,
}

/// In-memory transport answering from per-server scripts and
/// recording every query it is handed.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<IpAddr, Responder>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(self, server: &str, reply: F) -> Self
    where
        F: Fn(&Dns) -> Dns + Send + Sync + 'static,
    {
        self.route_raw(server, move |query| {
            reply(query).encode().expect("scripted reply encodes").into_vec()
        })
    }

    pub fn route_raw<F>(mut self, server: &str, reply: F) -> Self
    where
        F: Fn(&Dns) -> Vec<u8> + Send + Sync + 'static,
    {
        self.routes.insert(server.parse().unwrap(), Box::new(reply));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, DnsError> {
        let query = Dns::from_bytes(query)?;
        self.calls.lock().unwrap().push(Call {
            server,
            query: query.clone(),
        });

        let reply = self
            .routes
            .get(&server.ip())
            .ok_or_else(|| DnsError::Transport(format!("no route to {server}")))?;
        Ok(reply(&query))
    }
}

/// Transport that never answers.
pub struct SilentTransport;

#[async_trait]
impl Transport for SilentTransport {
    async fn send(&self, _server: SocketAddr, _query: &[u8]) -> Result<Vec<u8>, DnsError> {
        std::future::pending().await
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn v4(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

/// Reply skeleton: the query echoed back with QR set.
pub fn reply_to(query: &Dns) -> Dns {
    let mut reply = query.clone();
    reply.header.flags.qr = true;
    reply
}

pub fn with_rcode(query: &Dns, rcode: u8) -> Dns {
    let mut reply = reply_to(query);
    reply.header.flags.rcode = rcode;
    reply
}

pub fn answer(query: &Dns, rdata: RData) -> Dns {
    let mut reply = reply_to(query);
    let name = query.questions[0].qname.clone();
    reply.add_answer(ResourceRecord::new(&name, 300, rdata));
    reply
}

/// Delegation to `zone` naming each nameserver, with A glue where given.
pub fn referral(query: &Dns, zone: &str, servers: &[(&str, Option<&str>)]) -> Dns {
    let mut reply = reply_to(query);
    for (ns, _) in servers {
        reply.add_authority(ResourceRecord::new(zone, 172800, RData::NS(ns.to_string())));
    }
    for (ns, glue) in servers {
        if let Some(addr) = glue {
            reply.add_additional(ResourceRecord::new(ns, 172800, RData::A(v4(addr))));
        }
    }
    reply
}
