use crate::types::{
    Class,
    Dns,
    DnsBufferError,
    DnsError,
    DnsReadBuffer,
    DnsWriteBuffer,
    Flags,
    Header,
    Question,
    RData,
    ResourceRecord,
    Type,
};
use random::{Source, Xorshift128Plus};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Draws a transaction id from the process-wide random source.
///
/// The source is seeded once from the clock and shared behind a mutex,
/// so concurrent resolutions can draw ids safely.
pub fn next_id() -> u16 {
    static SOURCE: OnceLock<Mutex<Xorshift128Plus>> = OnceLock::new();

    let source = SOURCE.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed);
        // xorshift state must not be all zeros
        Mutex::new(Xorshift128Plus::new([seed | 1, seed.rotate_left(32) ^ 0x9E37_79B9_7F4A_7C15]))
    });

    let mut source = source.lock().unwrap_or_else(PoisonError::into_inner);
    (source.read_u64() >> 48) as u16
}

/// Splits a comma-separated list of type mnemonics (`"A,AAAA"`).
///
/// Fails on the first unknown mnemonic, before anything is sent.
pub fn parse_types(list: &str) -> Result<Vec<Type>, DnsError> {
    list.split(',').map(str::parse).collect()
}

impl Flags {
    /// Encodes DNS flags into a 16-bit integer.
    pub fn to_u16(&self) -> u16 {
        ((self.qr as u16) << 15)
            | (((self.opcode & 0x0F) as u16) << 11)
            | ((self.aa as u16) << 10)
            | ((self.tc as u16) << 9)
            | ((self.rd as u16) << 8)
            | ((self.ra as u16) << 7)
            | (((self.z & 0x07) as u16) << 4)
            | ((self.rcode & 0x0F) as u16)
    }

    /// Decodes a 16-bit integer into DNS flags.
    pub fn from_u16(raw: u16) -> Flags {
        Flags {
            qr:     (raw & 0x8000) != 0,
            opcode: ((raw & 0x7800) >> 11) as u8,
            aa:     (raw & 0x0400) != 0,
            tc:     (raw & 0x0200) != 0,
            rd:     (raw & 0x0100) != 0,
            ra:     (raw & 0x0080) != 0,
            z:      ((raw & 0x0070) >> 4) as u8,
            rcode:  (raw & 0x000F) as u8,
        }
    }
}

impl Dns {
    /// Builds a query for `domain` with one question per requested type.
    ///
    /// `types` is a comma-separated list of mnemonics such as `"A"` or
    /// `"A,AAAA"`. The id comes from the process-wide random source and
    /// the RD bit is set.
    pub fn query(domain: &str, types: &str) -> Result<Dns, DnsError> {
        let types = parse_types(types)?;
        Ok(Self::query_with_id(domain, &types, next_id()))
    }

    /// Same as [`Dns::query`] with an explicit id and already-parsed types.
    pub fn query_with_id(domain: &str, types: &[Type], id: u16) -> Dns {
        let questions: Vec<Question> = types
            .iter()
            .map(|t| Question::new(domain.to_string(), t.code(), Class::IN.code()))
            .collect();

        Dns {
            header: Header {
                id,
                flags: Flags {
                    rd: true,
                    ..Flags::default()
                },
                qd_count: questions.len() as u16,
                an_count: 0,
                ns_count: 0,
                ar_count: 0,
            },
            questions,
            answers:     Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Decodes a resource data section based on type and length.
    fn decode_rdata(
        buf:    &mut DnsReadBuffer,
        rtype:  u16,
        length: u16)
    -> Result<RData, DnsError> {
        let start = buf.get_index();
        let end = start + length as usize;

        if buf.remaining() < length as usize {
            return Err(DnsBufferError::Truncated { offset: start }.into());
        }

        match Type::from_u16(rtype) {
            Some(Type::A) => {
                let raw = buf.read_n_bytes(length as usize)?;
                let octets: [u8; 4] = raw.try_into().map_err(|_| {
                    DnsError::MalformedMessage(format!("A record with RDLENGTH {length}"))
                })?;
                Ok(RData::A(Ipv4Addr::from(octets)))
            }
            Some(Type::AAAA) => {
                let raw = buf.read_n_bytes(length as usize)?;
                let octets: [u8; 16] = raw.try_into().map_err(|_| {
                    DnsError::MalformedMessage(format!("AAAA record with RDLENGTH {length}"))
                })?;
                Ok(RData::AAAA(Ipv6Addr::from(octets)))
            }
            Some(t @ (Type::NS | Type::CNAME)) => {
                let name = buf.read_str()?;
                if buf.get_index() > end {
                    return Err(DnsError::MalformedMessage(format!(
                        "{t} name overruns RDLENGTH {length}"
                    )));
                }
                // Skip any padding up to the declared end
                buf.index = end;
                Ok(match t {
                    Type::NS => RData::NS(name),
                    _        => RData::CNAME(name),
                })
            }
            _ => Ok(RData::Opaque(buf.read_n_bytes(length as usize)?.to_vec())),
        }
    }

    /// Decodes a list of question records from the buffer.
    fn decode_questions(
        buf:   &mut DnsReadBuffer,
        count: u16)
    -> Result<Vec<Question>, DnsError> {
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let qname  = buf.read_str()?;
            let qtype  = buf.read_u16()?;
            let qclass = buf.read_u16()?;
            records.push(Question { qname, qtype, qclass });
        }
        Ok(records)
    }

    /// Decodes a list of answer, authority or additional records.
    fn decode_records(
        buf:   &mut DnsReadBuffer,
        count: u16)
    -> Result<Vec<ResourceRecord>, DnsError> {
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name   = buf.read_str()?;
            let rtype  = buf.read_u16()?;
            let rclass = buf.read_u16()?;
            let ttl    = buf.read_u32()?;
            let length = buf.read_u16()?;
            let rdata  = Self::decode_rdata(buf, rtype, length)?;

            records.push(ResourceRecord {
                name, rtype, rclass, ttl, length, rdata,
            });
        }
        Ok(records)
    }

    /// Encodes a list of answer, authority, or additional records.
    fn encode_records(
        buffer:  &mut DnsWriteBuffer,
        records: &[ResourceRecord],
    ) -> Result<(), DnsError> {
        for r in records {
            buffer.write_str(&r.name)?;
            buffer.write_u16(r.rtype);
            buffer.write_u16(r.rclass);
            buffer.write_u32(r.ttl);

            let raw = Self::encode_rdata(&r.rdata)?;
            let length = u16::try_from(raw.len()).map_err(|_| {
                DnsError::MalformedMessage(format!("RDATA of {} bytes", raw.len()))
            })?;
            buffer.write_u16(length);
            buffer.write_bytes(&raw);
        }
        Ok(())
    }

    /// Encodes a single RData into bytes for writing.
    fn encode_rdata(rdata: &RData) -> Result<Box<[u8]>, DnsError> {
        let mut buf = DnsWriteBuffer::new();

        match rdata {
            RData::A(ipv4) => buf.write_bytes(&ipv4.octets()),
            RData::AAAA(ipv6) => buf.write_bytes(&ipv6.octets()),
            RData::NS(name) | RData::CNAME(name) => buf.write_str(name)?,
            RData::Opaque(data) => buf.write_bytes(data),
        }

        Ok(buf.finish())
    }

    /// Decodes a full DNS message from the given buffer.
    ///
    /// Each section is read exactly as many times as its header count
    /// says; running out of bytes first is an error.
    pub fn decode(buf: &mut DnsReadBuffer) -> Result<Dns, DnsError> {
        let id        = buf.read_u16()?;
        let flags_raw = buf.read_u16()?;
        let qd_count  = buf.read_u16()?;
        let an_count  = buf.read_u16()?;
        let ns_count  = buf.read_u16()?;
        let ar_count  = buf.read_u16()?;

        let flags       = Flags::from_u16(flags_raw);
        let questions   = Self::decode_questions(buf, qd_count)?;
        let answers     = Self::decode_records(buf, an_count)?;
        let authorities = Self::decode_records(buf, ns_count)?;
        let additionals = Self::decode_records(buf, ar_count)?;

        Ok(Dns {
            header: Header {
                id,
                flags,
                qd_count,
                an_count,
                ns_count,
                ar_count,
            },
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// Decodes a complete datagram, rejecting bytes left over after the
    /// last declared record.
    pub fn from_bytes(data: &[u8]) -> Result<Dns, DnsError> {
        let mut buf = DnsReadBuffer::new(data);
        let dns = Self::decode(&mut buf)?;
        if buf.remaining() > 0 {
            return Err(DnsError::MalformedMessage(format!(
                "{} bytes after the last record",
                buf.remaining()
            )));
        }
        Ok(dns)
    }

    /// Encodes this message for transmission.
    ///
    /// Header counts are written as stored; the builders in this module
    /// keep them in step with the sections.
    pub fn encode(&self) -> Result<Box<[u8]>, DnsError> {
        let mut buffer = DnsWriteBuffer::new();

        buffer.write_u16(self.header.id);
        buffer.write_u16(self.header.flags.to_u16());
        buffer.write_u16(self.header.qd_count);
        buffer.write_u16(self.header.an_count);
        buffer.write_u16(self.header.ns_count);
        buffer.write_u16(self.header.ar_count);

        for q in &self.questions {
            buffer.write_str(&q.qname)?;
            buffer.write_u16(q.qtype);
            buffer.write_u16(q.qclass);
        }

        Self::encode_records(&mut buffer, &self.answers)?;
        Self::encode_records(&mut buffer, &self.authorities)?;
        Self::encode_records(&mut buffer, &self.additionals)?;

        Ok(buffer.finish())
    }

    /// Add an answer record, updating the header count.
    pub fn add_answer(&mut self, answer: ResourceRecord) {
        self.answers.push(answer);
        self.header.an_count = self.answers.len() as u16;
    }

    /// Add an authority record, updating the header count.
    pub fn add_authority(&mut self, authority: ResourceRecord) {
        self.authorities.push(authority);
        self.header.ns_count = self.authorities.len() as u16;
    }

    /// Add an additional record, updating the header count.
    pub fn add_additional(&mut self, additional: ResourceRecord) {
        self.additionals.push(additional);
        self.header.ar_count = self.additionals.len() as u16;
    }
}

impl Question {
    /// Creates a new query record with the given name, type, and class.
    pub fn new(qname: String, qtype: u16, qclass: u16) -> Self {
        Question { qname, qtype, qclass }
    }
}

impl ResourceRecord {
    /// Creates an IN-class record whose type follows from the rdata.
    ///
    /// Opaque payloads carry no type of their own; use [`ResourceRecord::opaque`].
    pub fn new(name: &str, ttl: u32, rdata: RData) -> Self {
        let rtype = match &rdata {
            RData::A(_)      => Type::A.code(),
            RData::AAAA(_)   => Type::AAAA.code(),
            RData::CNAME(_)  => Type::CNAME.code(),
            RData::NS(_)     => Type::NS.code(),
            RData::Opaque(_) => 0,
        };
        Self::with_type(name, rtype, ttl, rdata)
    }

    /// Creates an IN-class record of `rtype` carrying raw bytes.
    pub fn opaque(name: &str, rtype: u16, ttl: u32, raw: Vec<u8>) -> Self {
        Self::with_type(name, rtype, ttl, RData::Opaque(raw))
    }

    fn with_type(name: &str, rtype: u16, ttl: u32, rdata: RData) -> Self {
        let length = match &rdata {
            RData::A(_) => 4,
            RData::AAAA(_) => 16,
            RData::NS(n) | RData::CNAME(n) => {
                let trimmed = n.trim_end_matches('.');
                if trimmed.is_empty() { 1 } else { trimmed.len() as u16 + 2 }
            }
            RData::Opaque(raw) => raw.len() as u16,
        };

        ResourceRecord {
            name:   name.to_string(),
            rtype,
            rclass: Class::IN.code(),
            ttl,
            length,
            rdata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::encode_name;
    use crate::types::ErrorKind;

    fn header_bytes(id: u16, flags: u16, counts: [u16; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&flags.to_be_bytes());
        for c in counts {
            out.extend_from_slice(&c.to_be_bytes());
        }
        out
    }

    #[test]
    fn flags_bit_layout() {
        let flags = Flags {
            qr: true,
            opcode: 2,
            aa: true,
            tc: false,
            rd: true,
            ra: true,
            z: 0,
            rcode: 3,
        };
        assert_eq!(flags.to_u16(), 0b1_0010_1_0_1_1_000_0011);
        assert_eq!(Flags::from_u16(flags.to_u16()), flags);
        assert_eq!(Flags::from_u16(0x8180).rcode, 0);
    }

    #[test]
    fn query_layout() {
        let dns = Dns::query_with_id("example.com", &[Type::A], 0xBEEF);
        let bytes = dns.encode().unwrap();

        let mut expected = header_bytes(0xBEEF, 0x0100, [1, 0, 0, 0]);
        expected.extend_from_slice(&encode_name("example.com").unwrap());
        expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        assert_eq!(&*bytes, expected.as_slice());
    }

    #[test]
    fn one_question_per_requested_type() {
        let dns = Dns::query("example.com", "A,AAAA,mx").unwrap();
        assert_eq!(dns.header.qd_count, 3);
        let codes: Vec<u16> = dns.questions.iter().map(|q| q.qtype).collect();
        assert_eq!(codes, vec![1, 28, 15]);
        assert!(dns.questions.iter().all(|q| q.qname == "example.com" && q.qclass == 1));
        assert!(dns.header.flags.rd);
        assert!(!dns.header.flags.qr);
    }

    #[test]
    fn unknown_type_is_configuration_error() {
        let err = Dns::query("example.com", "A,BOGUS").unwrap_err();
        assert!(matches!(err, DnsError::UnknownRecordType(ref t) if t == "BOGUS"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn label_too_long_fails_encoding() {
        let dns = Dns::query_with_id(&"x".repeat(64), &[Type::A], 1);
        assert!(matches!(
            dns.encode().unwrap_err(),
            DnsError::Malformed(DnsBufferError::LabelTooLong(_))
        ));
    }

    #[test]
    fn decodes_a_answer_behind_pointer() {
        let mut data = header_bytes(0x1234, 0x8180, [1, 1, 0, 0]);
        data.extend_from_slice(&encode_name("example.com").unwrap());
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        data.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
        data.extend_from_slice(&300u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]);

        let dns = Dns::from_bytes(&data).unwrap();
        assert_eq!(dns.header.id, 0x1234);
        assert!(dns.header.flags.qr);
        assert_eq!(dns.questions[0].qname, "example.com");
        let answer = &dns.answers[0];
        assert_eq!(answer.name, "example.com");
        assert_eq!(answer.ttl, 300);
        assert_eq!(answer.rdata.to_string(), "93.184.216.34");
    }

    #[test]
    fn decodes_ns_and_glue_sections() {
        let mut reply = Dns::query_with_id("example.com", &[Type::A], 7);
        reply.header.flags.qr = true;
        reply.add_authority(ResourceRecord::new("com", 172800, RData::NS("a.gtld-servers.net".into())));
        reply.add_additional(ResourceRecord::new(
            "a.gtld-servers.net",
            172800,
            RData::A(Ipv4Addr::new(192, 5, 6, 30)),
        ));
        reply.add_additional(ResourceRecord::new(
            "a.gtld-servers.net",
            172800,
            RData::AAAA(Ipv6Addr::new(0x2001, 0x503, 0xa83e, 0, 0, 0, 0x2, 0x30)),
        ));

        let decoded = Dns::from_bytes(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded, reply);
        assert_eq!(decoded.authorities[0].rdata.as_ns(), Some("a.gtld-servers.net"));
        assert_eq!(
            decoded.additionals[1].rdata.to_string(),
            "2001:0503:a83e:0000:0000:0000:0002:0030"
        );
    }

    #[test]
    fn compressed_ns_rdata_is_expanded() {
        // Authority: "example.com" NS -> "ns1" + pointer to the question name.
        let mut data = header_bytes(1, 0x8000, [1, 0, 1, 0]);
        data.extend_from_slice(&encode_name("example.com").unwrap());
        data.extend_from_slice(&[0x00, 0x02, 0x00, 0x01]);
        data.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x02, 0x00, 0x01]);
        data.extend_from_slice(&3600u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x06]);
        data.extend_from_slice(b"\x03ns1\xc0\x0c");

        let dns = Dns::from_bytes(&data).unwrap();
        assert_eq!(dns.authorities[0].rdata, RData::NS("ns1.example.com".into()));
        assert_eq!(dns.authorities[0].length, 6);
    }

    #[test]
    fn other_types_stay_opaque() {
        let mut reply = Dns::query_with_id("example.com", &[Type::MX], 9);
        reply.add_answer(ResourceRecord::opaque("example.com", Type::MX.code(), 60, vec![0, 10, 0]));
        let decoded = Dns::from_bytes(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded.answers[0].rdata, RData::Opaque(vec![0, 10, 0]));
    }

    #[test]
    fn short_header_is_truncated() {
        let err = Dns::from_bytes(&[0x12, 0x34, 0x81]).unwrap_err();
        assert!(matches!(err, DnsError::Malformed(DnsBufferError::Truncated { offset: 2 })));
        assert_eq!(err.kind(), ErrorKind::MalformedMessage);
    }

    #[test]
    fn missing_records_fail_decoding() {
        // Header promises one answer, none follows.
        let data = header_bytes(1, 0x8180, [0, 1, 0, 0]);
        assert!(matches!(
            Dns::from_bytes(&data).unwrap_err(),
            DnsError::Malformed(DnsBufferError::MalformedName { offset: 12 })
        ));
    }

    #[test]
    fn rdlength_past_end_is_truncated() {
        let mut data = header_bytes(1, 0x8180, [0, 1, 0, 0]);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x01]);
        data.extend_from_slice(&60u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x04, 1, 2]);
        assert!(matches!(
            Dns::from_bytes(&data).unwrap_err(),
            DnsError::Malformed(DnsBufferError::Truncated { offset: 23 })
        ));
    }

    #[test]
    fn a_record_with_wrong_length_is_malformed() {
        let mut data = header_bytes(1, 0x8180, [0, 1, 0, 0]);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x01]);
        data.extend_from_slice(&60u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x03, 1, 2, 3]);
        assert!(matches!(
            Dns::from_bytes(&data).unwrap_err(),
            DnsError::MalformedMessage(_)
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut data = header_bytes(1, 0x8180, [0, 0, 0, 0]);
        data.push(0);
        assert!(matches!(
            Dns::from_bytes(&data).unwrap_err(),
            DnsError::MalformedMessage(_)
        ));
    }

    #[test]
    fn self_referencing_question_name_is_a_cycle() {
        let mut data = header_bytes(1, 0x8180, [1, 0, 0, 0]);
        data.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
        let err = Dns::from_bytes(&data).unwrap_err();
        assert!(matches!(err, DnsError::Malformed(DnsBufferError::PointerCycle { offset: 12 })));
        assert_eq!(err.kind(), ErrorKind::MalformedMessage);
    }

    #[test]
    fn ids_vary() {
        let ids: std::collections::HashSet<u16> = (0..32).map(|_| next_id()).collect();
        assert!(ids.len() > 1);
    }
}
