//! Iterative DNS resolution over UDP.
//!
//! Queries are built and replies parsed in-crate ([`buffer`], [`dns`]);
//! [`resolver::Resolver`] walks referrals from the root hints down to an
//! authoritative answer through an injected [`contact::Transport`].

pub mod buffer;
pub mod config;
pub mod contact;
pub mod dns;
pub mod resolver;
pub mod types;

pub use config::ResolverConfig;
pub use contact::{Transport, UdpTransport};
pub use resolver::{Resolver, State};
pub use types::{
    Class, Dns, DnsBufferError, DnsError, ErrorKind, Flags, Header, Question, RData,
    ResourceRecord, ResponseCode, Type,
};
