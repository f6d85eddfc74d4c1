use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// DNS message header.
///
/// Contains fields identifying the message and counts of question,
/// answer, authority, and additional records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Transaction identifier, echoed back by the server.
    pub id: u16,
    /// DNS header flags.
    pub flags: Flags,
    /// Number of entries in the question section.
    pub qd_count: u16,
    /// Number of resource records in the answer section.
    pub an_count: u16,
    /// Number of name server resource records in the authority section.
    pub ns_count: u16,
    /// Number of resource records in the additional section.
    pub ar_count: u16,
}

/// Bitfield flags in a DNS header.
///
/// Includes standard DNS header flags such as QR, Opcode, AA, TC, RD, RA, Z, and RCODE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    /// Query/Response flag: `false` = query, `true` = response.
    pub qr: bool,
    /// Operation code: usually 0 (standard query).
    pub opcode: u8,
    /// Authoritative Answer.
    pub aa: bool,
    /// Truncation: the reply did not fit the datagram.
    pub tc: bool,
    /// Recursion Desired.
    pub rd: bool,
    /// Recursion Available.
    pub ra: bool,
    /// Reserved, 3 bits.
    pub z: u8,
    /// Response code, 4 bits.
    pub rcode: u8,
}

/// A DNS question entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Domain name being queried (e.g., "example.com").
    pub qname: String,
    /// Query type code (e.g., 1 for A).
    pub qtype: u16,
    /// Query class code (almost always 1 for IN).
    pub qclass: u16,
}

/// Resource data variants.
///
/// Only the payloads the resolver acts on are decoded; everything
/// else is carried as the raw RDATA bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    Opaque(Vec<u8>),
}

impl RData {
    /// Returns the contained IPv4 address if the record is an `A` record.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        if let RData::A(ip) = self {
            Some(*ip)
        } else {
            None
        }
    }

    /// Returns the contained IPv6 address if the record is an `AAAA` record.
    pub fn as_aaaa(&self) -> Option<Ipv6Addr> {
        if let RData::AAAA(ip) = self {
            Some(*ip)
        } else {
            None
        }
    }

    /// Returns the contained domain name if the record is an `NS` record.
    pub fn as_ns(&self) -> Option<&str> {
        if let RData::NS(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// Returns the contained domain name if the record is a `CNAME` record.
    pub fn as_cname(&self) -> Option<&str> {
        if let RData::CNAME(name) = self {
            Some(name)
        } else {
            None
        }
    }
}

/// Record types the resolver knows by name.
///
/// This is the single static mapping between mnemonics and wire codes;
/// it is consulted in both directions and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Type {
    A     = 1,
    NS    = 2,
    CNAME = 5,
    SOA   = 6,
    PTR   = 12,
    MX    = 15,
    TXT   = 16,
    AAAA  = 28,
    SRV   = 33,
    OPT   = 41,
}

impl Type {
    pub const ALL: [Type; 10] = [
        Type::A,
        Type::NS,
        Type::CNAME,
        Type::SOA,
        Type::PTR,
        Type::MX,
        Type::TXT,
        Type::AAAA,
        Type::SRV,
        Type::OPT,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Type> {
        Self::ALL.into_iter().find(|t| t.code() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::A     => "A",
            Type::NS    => "NS",
            Type::CNAME => "CNAME",
            Type::SOA   => "SOA",
            Type::PTR   => "PTR",
            Type::MX    => "MX",
            Type::TXT   => "TXT",
            Type::AAAA  => "AAAA",
            Type::SRV   => "SRV",
            Type::OPT   => "OPT",
        }
    }

    /// Renders a wire type code, falling back to `TYPE<n>` for codes
    /// outside the table.
    pub fn describe(code: u16) -> String {
        match Type::from_u16(code) {
            Some(t) => t.name().to_string(),
            None    => format!("TYPE{code}"),
        }
    }
}

impl FromStr for Type {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DnsError::UnknownRecordType(wanted.to_string()))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record classes. Only IN is ever queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Class {
    IN = 1,
    CS = 2,
    CH = 3,
    HS = 4,
}

impl Class {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Class> {
        match value {
            1 => Some(Class::IN),
            2 => Some(Class::CS),
            3 => Some(Class::CH),
            4 => Some(Class::HS),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Class::IN => "IN",
            Class::CS => "CS",
            Class::CH => "CH",
            Class::HS => "HS",
        }
    }

    pub fn describe(code: u16) -> &'static str {
        Class::from_u16(code).map_or("UNKNOWN", Class::name)
    }
}

/// Non-zero RCODE values reported by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(u8),
}

impl ResponseCode {
    /// Maps a header RCODE; `None` for 0 (no error).
    pub fn from_rcode(rcode: u8) -> Option<ResponseCode> {
        match rcode {
            0 => None,
            1 => Some(ResponseCode::FormatError),
            2 => Some(ResponseCode::ServerFailure),
            3 => Some(ResponseCode::NameError),
            4 => Some(ResponseCode::NotImplemented),
            5 => Some(ResponseCode::Refused),
            n => Some(ResponseCode::Reserved(n)),
        }
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::FormatError    => write!(f, "format error: the name server was unable to interpret the query"),
            ResponseCode::ServerFailure  => write!(f, "server failure: the name server was unable to process the query"),
            ResponseCode::NameError      => write!(f, "name error: the queried domain name does not exist"),
            ResponseCode::NotImplemented => write!(f, "not implemented: the name server does not support this kind of query"),
            ResponseCode::Refused        => write!(f, "refused: the name server refuses to answer for policy reasons"),
            ResponseCode::Reserved(n)    => write!(f, "reserved response code {n}"),
        }
    }
}

/// A DNS resource record.
///
/// Used for the answer, authority, and additional sections alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name of the record.
    pub name: String,
    /// Type code of the record.
    pub rtype: u16,
    /// Class code of the record.
    pub rclass: u16,
    /// Time to live (in seconds).
    pub ttl: u32,
    /// RDLENGTH as declared on the wire.
    pub length: u16,
    /// Resource data payload.
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn is_type(&self, t: Type) -> bool {
        self.rtype == t.code()
    }
}

/// A parsed DNS message.
///
/// Contains the header, question, answer, authority, and additional sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns {
    /// DNS message header.
    pub header: Header,
    /// Vector of question records.
    pub questions: Vec<Question>,
    /// Vector of answer records.
    pub answers: Vec<ResourceRecord>,
    /// Vector of authority records.
    pub authorities: Vec<ResourceRecord>,
    /// Vector of additional records.
    pub additionals: Vec<ResourceRecord>,
}

/// Errors raised while reading or writing wire-format bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsBufferError {
    /// A fixed-size field or RDLENGTH region reads past the end.
    #[error("message truncated: read past end of buffer at offset {offset}")]
    Truncated { offset: usize },
    /// A label is longer than 63 bytes.
    #[error("label `{0}` exceeds 63 bytes")]
    LabelTooLong(String),
    /// An encoded name is longer than 255 bytes.
    #[error("domain name exceeds 255 bytes")]
    NameTooLong,
    /// A label length or pointer is not valid at this offset.
    #[error("malformed domain name at offset {offset}")]
    MalformedName { offset: usize },
    /// A compression pointer leads back to a target already followed.
    #[error("compression pointer cycle at offset {offset}")]
    PointerCycle { offset: usize },
}

/// Taxonomy classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    MalformedMessage,
    Protocol,
    Unresolvable,
    Configuration,
    Cancelled,
}

/// Errors surfaced by encoding, decoding, and resolution.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no reply from {0} before the deadline")]
    Timeout(SocketAddr),
    #[error(transparent)]
    Malformed(#[from] DnsBufferError),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown record type `{0}`")]
    UnknownRecordType(String),
    #[error("{0}")]
    Protocol(ResponseCode),
    #[error("unable to resolve {0}")]
    Unresolvable(String),
    #[error("gave up after {0} iterations")]
    IterationLimit(usize),
    #[error("glue resolution nested deeper than {0}")]
    DepthLimit(usize),
    #[error("resolution cancelled")]
    Cancelled,
}

impl DnsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DnsError::Transport(_) | DnsError::Timeout(_) => ErrorKind::Transport,
            DnsError::Malformed(_) | DnsError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            DnsError::UnknownRecordType(_) => ErrorKind::Configuration,
            DnsError::Protocol(_) => ErrorKind::Protocol,
            DnsError::Unresolvable(_)
            | DnsError::IterationLimit(_)
            | DnsError::DepthLimit(_) => ErrorKind::Unresolvable,
            DnsError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// A read-only cursor over a received DNS message.
///
/// Name decoding resolves compression pointers against the whole
/// message, so the reader always keeps the full slice.
#[derive(Debug)]
pub struct DnsReadBuffer<'a> {
    /// Underlying data slice to read from.
    pub data: &'a [u8],
    /// Current read offset index into `data`.
    pub index: usize,
}

/// An append-only builder for outgoing messages.
#[derive(Debug, Default)]
pub struct DnsWriteBuffer {
    pub(crate) data: Vec<u8>,
}

impl DnsWriteBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for Flags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut set = Vec::new();
        if self.qr { set.push("qr"); }
        if self.aa { set.push("aa"); }
        if self.tc { set.push("tc"); }
        if self.rd { set.push("rd"); }
        if self.ra { set.push("ra"); }
        write!(f, "opcode={} rcode={} flags=[{}]", self.opcode, self.rcode, set.join(" "))
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, ";; id=0x{:04X} {}", self.id, self.flags)?;
        writeln!(
            f,
            ";; QUERY: {}, ANSWER: {}, AUTHORITY: {}, ADDITIONAL: {}",
            self.qd_count, self.an_count, self.ns_count, self.ar_count
        )
    }
}

impl Display for Question {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<30} {:<4} {}",
            self.qname,
            Class::describe(self.qclass),
            Type::describe(self.qtype)
        )
    }
}

impl Display for RData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(ip) => write!(f, "{ip}"),
            // Full groups, no zero compression.
            RData::AAAA(ip) => {
                let groups: Vec<String> = ip.segments().iter().map(|s| format!("{s:04x}")).collect();
                f.write_str(&groups.join(":"))
            }
            RData::NS(name) | RData::CNAME(name) => f.write_str(name),
            RData::Opaque(raw) => {
                write!(f, "\\# {}", raw.len())?;
                if !raw.is_empty() {
                    f.write_str(" ")?;
                    for byte in raw {
                        write!(f, "{byte:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl Display for ResourceRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<30} {:<7} {:<4} {:<6} {}",
            self.name,
            self.ttl,
            Class::describe(self.rclass),
            Type::describe(self.rtype),
            self.rdata
        )
    }
}

impl Display for Dns {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;

        writeln!(f, ";; QUESTION SECTION:")?;
        for q in &self.questions {
            writeln!(f, ";{q}")?;
        }

        let sections = [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authorities),
            ("ADDITIONAL", &self.additionals),
        ];
        for (title, records) in sections {
            if records.is_empty() {
                continue;
            }
            writeln!(f, "\n;; {title} SECTION:")?;
            for r in records {
                writeln!(f, "{r}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_is_bidirectional() {
        for t in Type::ALL {
            assert_eq!(Type::from_u16(t.code()), Some(t));
            assert_eq!(t.name().parse::<Type>().unwrap(), t);
        }
        assert_eq!(Type::from_u16(99), None);
        assert_eq!(Type::describe(99), "TYPE99");
    }

    #[test]
    fn type_names_parse_case_insensitively() {
        assert_eq!(" aaaa ".parse::<Type>().unwrap(), Type::AAAA);
        let err = "BOGUS".parse::<Type>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn rcode_mapping() {
        assert_eq!(ResponseCode::from_rcode(0), None);
        assert_eq!(ResponseCode::from_rcode(3), Some(ResponseCode::NameError));
        assert_eq!(ResponseCode::from_rcode(5), Some(ResponseCode::Refused));
        assert_eq!(ResponseCode::from_rcode(9), Some(ResponseCode::Reserved(9)));
    }

    #[test]
    fn aaaa_renders_eight_full_groups() {
        let ip = Ipv6Addr::new(0x2606, 0x2800, 0x220, 0x1, 0x248, 0x1893, 0x25c8, 0x1946);
        assert_eq!(
            RData::AAAA(ip).to_string(),
            "2606:2800:0220:0001:0248:1893:25c8:1946"
        );
    }

    #[test]
    fn opaque_renders_generic_form() {
        assert_eq!(RData::Opaque(vec![0x01, 0xab]).to_string(), "\\# 2 01ab");
        assert_eq!(RData::Opaque(Vec::new()).to_string(), "\\# 0");
    }

    #[test]
    fn class_names() {
        assert_eq!(Class::describe(1), "IN");
        assert_eq!(Class::describe(254), "UNKNOWN");
        assert_eq!(Class::CH.code(), 3);
    }
}
