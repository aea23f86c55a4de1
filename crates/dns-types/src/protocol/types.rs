use bytes::Bytes;
use std::fmt;
use std::net::Ipv4Addr;

#[cfg(any(feature = "test-util", test))]
use bytes::{BufMut, BytesMut};

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// Largest datagram which will be parsed, and largest response which
/// will be built.
pub const DATAGRAM_MAX_LEN: usize = 512;

/// Largest encoded domain name: every length octet plus every label
/// octet, including the final empty label.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Largest single label.
pub const LABEL_MAX_LEN: usize = 63;

/// Index of the first flags octet within the header.
pub const HEADER_INDEX_FLAGS: usize = 2;

/// Index of the ANCOUNT field within the header.
pub const HEADER_INDEX_ANCOUNT: usize = 6;

/// QR bit of the first flags octet: set on responses.
pub const HEADER_MASK_QR: u8 = 0b1000_0000;

/// TC bit of the first flags octet: set on truncated messages.
pub const HEADER_MASK_TC: u8 = 0b0000_0010;

/// RD bit of the first flags octet: set by stub resolvers.
pub const HEADER_MASK_RD: u8 = 0b0000_0001;

/// Top two bits of a length octet which mark a compression pointer.
pub const LABEL_MASK_POINTER: u8 = 0b1100_0000;

/// Class carried by URI answers.  This is not a real class: captive
/// portal clients which ask for URI records expect it.
pub const URI_RECORD_CLASS: u16 = 256;

/// The parts of the 12-octet header (RFC 1035 section 4.1.1) which
/// decide whether a datagram is answered.  Everything else in the
/// header is echoed back untouched, so it is never decoded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    /// Transaction id, echoed in the response.
    pub id: u16,

    /// TC: the sender cut the message short.
    pub is_truncated: bool,
}

/// A `Header` with the four section counts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl WireHeader {
    /// A message with any records in it was produced by a nameserver,
    /// not by a client.
    pub fn has_records(&self) -> bool {
        self.ancount != 0 || self.nscount != 0 || self.arcount != 0
    }
}

/// One entry of the question section: QNAME, then a 2-octet QTYPE and
/// 2-octet QCLASS (RFC 1035 section 4.1.2).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// An answer to append to a response: NAME, TYPE, CLASS, TTL, then
/// RDLENGTH octets of RDATA (RFC 1035 section 4.1.3).  Records are
/// only ever built, never parsed.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,

    /// Seconds the answer may be cached for.  Zero means not at all.
    pub ttl: u32,
}

/// The record types this responder answers with, and their RDATA.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeWithData {
    /// RDATA is the 4-octet address.
    A { address: Ipv4Addr },

    /// RDATA is an uncompressed domain name.
    NS { nsdname: DomainName },

    /// RDATA is a 2-octet priority, a 2-octet weight, and then the URI
    /// itself with no length prefix (RFC 7553 section 4.5).
    URI {
        priority: u16,
        weight: u16,
        target: Bytes,
    },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::NS { .. } => RecordType::NS,
            RecordTypeWithData::URI { .. } => RecordType::URI,
        }
    }
}

/// A sequence of labels, the last of which is empty.
///
/// Label octets are kept exactly as received: answers echo the name
/// in the case it was asked in.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct DomainName {
    pub labels: Vec<Label>,
    // INVARIANT: len == len(labels) + sum(map(len, labels)) <= DOMAINNAME_MAX_LEN
    pub len: usize,
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            labels: vec![Label::new()],
            len: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1
    }

    /// Dot-separated labels, without the trailing dot.  The root
    /// domain is ".".
    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        self.labels
            .iter()
            .filter(|label| !label.is_empty())
            .map(|label| label.octets().iter().map(|o| char::from(*o)).collect::<String>())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Parse dot-separated labels.  The trailing dot is optional.
    /// Returns `None` on an empty label, a label over 63 octets, or a
    /// name over 255 octets.
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s.is_empty() || s == "." {
            return Some(Self::root_domain());
        }

        let mut labels = s
            .strip_suffix('.')
            .unwrap_or(s)
            .split('.')
            .map(|chunk| {
                if chunk.is_empty() {
                    None
                } else {
                    Label::try_from(chunk.as_bytes()).ok()
                }
            })
            .collect::<Option<Vec<_>>>()?;

        labels.push(Label::new());
        Self::from_labels(labels)
    }

    /// Returns `None` unless exactly the last label is empty and the
    /// encoded length is within bounds.
    pub fn from_labels(labels: Vec<Label>) -> Option<Self> {
        let (last, init) = labels.split_last()?;
        if !last.is_empty() || init.iter().any(Label::is_empty) {
            return None;
        }

        let len = labels.len() + labels.iter().map(|l| usize::from(l.len())).sum::<usize>();
        if len > DOMAINNAME_MAX_LEN {
            return None;
        }

        Some(Self { labels, len })
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_dotted_string())
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for DomainName {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_labels = u.int_in_range::<usize>(0..=10)?;
        let mut labels = Vec::with_capacity(num_labels + 1);
        for _ in 0..num_labels {
            labels.push(u.arbitrary()?);
        }
        labels.push(Label::new());
        Ok(DomainName::from_labels(labels).unwrap())
    }
}

/// Up to 63 octets.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Label {
    /// Private so that an overlong `Label` cannot be built.
    octets: Bytes,
}

impl Label {
    pub fn new() -> Self {
        Self {
            octets: Bytes::new(),
        }
    }

    #[allow(clippy::missing_panics_doc)]
    pub fn len(&self) -> u8 {
        // safe as the `TryFrom` ensures a label is <= 63 bytes
        self.octets.len().try_into().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn octets(&self) -> &Bytes {
        &self.octets
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = LabelTryFromOctetsError;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > LABEL_MAX_LEN {
            return Err(LabelTryFromOctetsError::TooLong);
        }

        Ok(Self {
            octets: Bytes::copy_from_slice(octets),
        })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Label {
    // only generates non-empty labels
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Label> {
        let label_len = u.int_in_range::<u8>(1..=20)?;
        let mut octets = BytesMut::with_capacity(label_len.into());
        for b in u.bytes(label_len.into())? {
            // printable ascii, never a dot
            let printable = b'!' + b % (b'~' - b'!' + 1);
            octets.put_u8(if printable == b'.' { b'x' } else { printable });
        }
        Ok(Self {
            octets: octets.freeze(),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LabelTryFromOctetsError {
    TooLong,
}

/// A QTYPE: a record type, or one of the types only valid in
/// questions.  Only the record types are ever answered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryType {
    Record(RecordType),
    Wildcard,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryType::Record(rtype) => rtype.fmt(f),
            QueryType::Wildcard => write!(f, "ANY"),
        }
    }
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryType::Wildcard,
            _ => QueryType::Record(RecordType::from(value)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Wildcard => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

/// A QCLASS: a record class or the wildcard.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    Wildcard,
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryClass::Record(rclass) => rclass.fmt(f),
            QueryClass::Wildcard => write!(f, "ANY"),
        }
    }
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Wildcard,
            _ => QueryClass::Record(RecordClass::from(value)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Wildcard => 255,
            QueryClass::Record(rclass) => rclass.into(),
        }
    }
}

/// The record types a captive portal deals with.  AAAA is never
/// answered, but clients ask for it alongside A so it is named in logs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    AAAA,
    URI,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RecordTypeUnknown(u16);

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::URI => write!(f, "URI"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "TYPE{n}"),
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            28 => RecordType::AAAA,
            256 => RecordType::URI,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::AAAA => 28,
            RecordType::URI => 256,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

/// Record classes.  Only IN is named; URI answers use an unnamed one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClass {
    IN,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid
/// `RecordClass`es cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RecordClassUnknown(u16);

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "CLASS{n}"),
        }
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}


#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use super::*;

    pub fn domain(name: &str) -> DomainName {
        DomainName::from_dotted_string(name).unwrap()
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::A { address },
            rclass: RecordClass::IN,
            ttl: 0,
        }
    }

    pub fn ns_record(name: &str, nameserver_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::NS {
                nsdname: domain(nameserver_name),
            },
            rclass: RecordClass::IN,
            ttl: 0,
        }
    }

    pub fn uri_record(name: &str, target: &'static [u8]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::URI {
                priority: 10,
                weight: 1,
                target: Bytes::from_static(target),
            },
            rclass: RecordClass::from(URI_RECORD_CLASS),
            ttl: 0,
        }
    }

    /// Build a query datagram with the given id and questions, in the
    /// way a stub resolver would.
    pub fn query_octets(id: u16, questions: &[(&str, u16)]) -> Vec<u8> {
        let mut octets = Vec::with_capacity(HEADER_LEN + 32 * questions.len());
        octets.extend_from_slice(&id.to_be_bytes());
        octets.push(HEADER_MASK_RD);
        octets.push(0);
        octets.extend_from_slice(&u16::try_from(questions.len()).unwrap().to_be_bytes());
        octets.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        for (name, qtype) in questions {
            for label in &domain(name).labels {
                octets.push(label.len());
                octets.extend_from_slice(label.octets());
            }
            octets.extend_from_slice(&qtype.to_be_bytes());
            octets.extend_from_slice(&1u16.to_be_bytes());
        }
        octets
    }
}
