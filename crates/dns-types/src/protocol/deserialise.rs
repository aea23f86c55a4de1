//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.
//!
//! Only the parts of a message which a query carries are decoded: the
//! header and the question section.

use crate::protocol::types::*;

impl WireHeader {
    /// # Errors
    ///
    /// If the buffer holds fewer than `HEADER_LEN` octets.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        // RA, Z and RCODE are echoed back, never read
        buffer.take(1).ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_truncated: flags & HEADER_MASK_TC != 0,
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the name is malformed, or the type and class footer is cut
    /// short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = QueryType::deserialise(id, buffer)?;
        let qclass = QueryClass::deserialise(id, buffer)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl DomainName {
    /// Decode the name starting at `offset` of a whole datagram,
    /// returning it along with the offset just past the name as it
    /// appears at `offset` (so just past the first pointer, if there
    /// is one).
    ///
    /// # Errors
    ///
    /// See `DomainName::deserialise`.
    pub fn from_octets_at(octets: &[u8], offset: usize) -> Result<(Self, usize), Error> {
        let mut buffer = ConsumableBuffer::new(octets).at_offset(offset);
        let name = Self::deserialise(0, &mut buffer)?;
        Ok((name, buffer.position()))
    }

    /// Decode a name, following compression pointers anywhere in the
    /// buffer.  The buffer is left just past the name as it appears
    /// at the current position.
    ///
    /// Every pointer must target an offset inside the datagram, and
    /// the total number of octets read (across all pointer jumps) may
    /// not exceed the length of the datagram, which bounds the work
    /// done on a pointer cycle.
    ///
    /// # Errors
    ///
    /// If the name runs off the end of the datagram, contains a
    /// reserved label type, has a bad or cyclic pointer, or is longer
    /// than 255 octets.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let budget = buffer.len();
        let mut cursor = buffer.at_offset(buffer.position());
        let mut resume_at = None;
        let mut consumed = 0;
        let mut labels = Vec::<Label>::with_capacity(5);
        let mut len = 0;

        loop {
            let size = cursor.next_u8().ok_or(Error::DomainTooShort(id))?;
            consumed += 1;

            if size & LABEL_MASK_POINTER == LABEL_MASK_POINTER {
                let lo = cursor.next_u8().ok_or(Error::DomainTooShort(id))?;
                consumed += 1;

                let ptr = usize::from(u16::from_be_bytes([size & !LABEL_MASK_POINTER, lo]));
                if ptr >= budget {
                    return Err(Error::DomainPointerInvalid(id));
                }

                if resume_at.is_none() {
                    resume_at = Some(cursor.position());
                }
                cursor = cursor.at_offset(ptr);
            } else if size & LABEL_MASK_POINTER != 0 {
                return Err(Error::DomainLabelInvalid(id));
            } else if size == 0 {
                labels.push(Label::new());
                len += 1;

                if len > DOMAINNAME_MAX_LEN {
                    return Err(Error::DomainTooLong(id));
                }

                break;
            } else {
                let os = cursor
                    .take(usize::from(size))
                    .ok_or(Error::DomainTooShort(id))?;
                consumed += os.len();
                len += 1 + os.len();

                if len > DOMAINNAME_MAX_LEN {
                    return Err(Error::DomainTooLong(id));
                }

                let label = Label::try_from(os).map_err(|_| Error::DomainLabelInvalid(id))?;
                labels.push(label);
            }

            if consumed > budget {
                return Err(Error::DomainPointerLoop(id));
            }
        }

        buffer.position = resume_at.unwrap_or(cursor.position());

        Ok(DomainName { labels, len })
    }
}

impl QueryType {
    /// # Errors
    ///
    /// If the buffer is exhausted.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl QueryClass {
    /// # Errors
    ///
    /// If the buffer is exhausted.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

/// Errors encountered when parsing a datagram.  In all cases where
/// there is an ID, it is the transaction ID of the query.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A domain ends with an incomplete label.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points outside the datagram.
    DomainPointerInvalid(u16),

    /// Following the domain pointers reads more octets than the
    /// datagram holds, so they must loop.
    DomainPointerLoop(u16),

    /// A label uses one of the reserved `01` / `10` length prefixes.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainPointerLoop(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "datagram too short to hold an id"),
            Error::HeaderTooShort(id) => write!(f, "header too short (id {id})"),
            Error::QuestionTooShort(id) => write!(f, "question too short (id {id})"),
            Error::DomainTooShort(id) => write!(f, "domain name runs past end of datagram (id {id})"),
            Error::DomainTooLong(id) => write!(f, "domain name over 255 octets (id {id})"),
            Error::DomainPointerInvalid(id) => {
                write!(f, "domain pointer outside datagram (id {id})")
            }
            Error::DomainPointerLoop(id) => write!(f, "domain pointers loop (id {id})"),
            Error::DomainLabelInvalid(id) => write!(f, "reserved label type (id {id})"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which will be consumed by the parsing process.  All reads
/// go through `take`, which is the only place bounds are checked.
#[derive(Debug, Copy, Clone)]
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    /// Length of the whole underlying datagram, consumed or not.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let [a] = self.take(1)? else { return None };
        Some(*a)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let [a, b] = self.take(2)? else { return None };
        Some(u16::from_be_bytes([*a, *b]))
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(size)?;
        let slice = self.octets.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn decodes_literal_labels() {
        let octets = [
            3, b'w', b'w', b'w',
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            0xff,
        ];

        let (name, next) = DomainName::from_octets_at(&octets, 0).unwrap();
        assert_eq!(domain("www.example.com."), name);
        assert_eq!(17, next);
        assert_eq!(17, name.len);
    }

    #[test]
    fn decodes_root() {
        let (name, next) = DomainName::from_octets_at(&[0], 0).unwrap();
        assert!(name.is_root());
        assert_eq!(1, next);
    }

    #[test]
    #[rustfmt::skip]
    fn pointer_resumes_after_first_pointer() {
        let octets = [
            // 0: "example.com"
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            // 13: "www" + pointer to 0
            3, b'w', b'w', b'w', 0b1100_0000, 0,
            // 19: trailing
            0xab, 0xcd,
        ];

        let (name, next) = DomainName::from_octets_at(&octets, 13).unwrap();
        assert_eq!(domain("www.example.com."), name);
        assert_eq!(19, next);
    }

    #[test]
    #[rustfmt::skip]
    fn pointer_to_pointer_is_followed() {
        let octets = [
            // 0: "com"
            3, b'c', b'o', b'm', 0,
            // 5: "example" + pointer to 0
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0b1100_0000, 0,
            // 15: pointer to 5
            0b1100_0000, 5,
        ];

        let (name, next) = DomainName::from_octets_at(&octets, 15).unwrap();
        assert_eq!(domain("example.com."), name);
        assert_eq!(17, next);
    }

    #[test]
    fn pointer_past_end_is_rejected() {
        let octets = [0b1100_0000, 2];
        assert_eq!(
            Err(Error::DomainPointerInvalid(0)),
            DomainName::from_octets_at(&octets, 0)
        );

        let octets = [0b1111_1111, 0b1111_1111];
        assert_eq!(
            Err(Error::DomainPointerInvalid(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    fn pointer_to_self_terminates() {
        let octets = [0b1100_0000, 0];
        assert_eq!(
            Err(Error::DomainPointerLoop(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    #[rustfmt::skip]
    fn pointer_cycle_through_labels_terminates() {
        let octets = [
            // 0: "a" + pointer to 4
            1, b'a', 0b1100_0000, 4,
            // 4: "b" + pointer to 0
            1, b'b', 0b1100_0000, 0,
        ];
        assert_eq!(
            Err(Error::DomainPointerLoop(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    fn random_pointer_soup_terminates() {
        use rand::Rng;

        let mut rng = rand::rng();
        for _ in 0..1000 {
            // every pointer targets another pointer
            let pointers = rng.random_range(1..32);
            let octets: Vec<u8> = (0..pointers)
                .flat_map(|_| [0b1100_0000, 2 * rng.random_range(0..pointers)])
                .collect();
            assert!(DomainName::from_octets_at(&octets, 0).is_err());
        }
    }

    #[test]
    fn reserved_label_types_are_rejected() {
        for size in [64, 0b0111_1111, 0b1000_0000, 0b1011_1111] {
            let mut octets = vec![size];
            octets.resize(300, b'x');
            assert_eq!(
                Err(Error::DomainLabelInvalid(0)),
                DomainName::from_octets_at(&octets, 0)
            );
        }
    }

    #[test]
    fn label_past_end_is_rejected() {
        let octets = [5, b'a', b'b'];
        assert_eq!(
            Err(Error::DomainTooShort(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let octets = [1, b'a'];
        assert_eq!(
            Err(Error::DomainTooShort(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    fn overlong_name_is_rejected() {
        let mut octets = Vec::new();
        for _ in 0..5 {
            octets.push(63);
            octets.extend_from_slice(&[b'x'; 63]);
        }
        octets.push(0);

        assert_eq!(
            Err(Error::DomainTooLong(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    fn name_with_last_label(last: usize) -> Vec<u8> {
        let mut octets = Vec::new();
        for _ in 0..3 {
            octets.push(63);
            octets.extend_from_slice(&[b'x'; 63]);
        }
        octets.push(u8::try_from(last).unwrap());
        octets.extend_from_slice(&vec![b'y'; last]);
        octets.push(0);
        octets
    }

    #[test]
    fn name_of_255_octets_is_accepted() {
        let octets = name_with_last_label(61);
        assert_eq!(255, octets.len());

        let (name, next) = DomainName::from_octets_at(&octets, 0).unwrap();
        assert_eq!(255, name.len);
        assert_eq!(255, next);
    }

    #[test]
    fn name_of_256_octets_is_rejected() {
        // only the root octet takes it over the limit
        let octets = name_with_last_label(62);
        assert_eq!(256, octets.len());

        assert_eq!(
            Err(Error::DomainTooLong(0)),
            DomainName::from_octets_at(&octets, 0)
        );
    }

    #[test]
    fn overlong_name_via_pointers_is_rejected() {
        // 63-octet label, pointer back to it: the loop guard or the
        // length check must fire, whichever comes first
        let mut octets = vec![63];
        octets.extend_from_slice(&[b'x'; 63]);
        octets.extend_from_slice(&[0b1100_0000, 0]);

        assert!(DomainName::from_octets_at(&octets, 0).is_err());
    }

    #[test]
    fn question_carries_id_in_errors() {
        let octets = [1, b'a', 0, 0, 1];
        let mut buffer = ConsumableBuffer::new(&octets);
        assert_eq!(
            Err(Error::QuestionTooShort(42)),
            Question::deserialise(42, &mut buffer)
        );
    }

    #[test]
    fn header_flags() {
        let octets = [0x12, 0x34, 0b1000_0011, 0b1000_0101, 0, 1, 0, 2, 0, 3, 0, 4];
        let wire = WireHeader::deserialise(&mut ConsumableBuffer::new(&octets)).unwrap();

        assert_eq!(0x1234, wire.header.id);
        assert!(wire.header.is_truncated);
        assert_eq!((1, 2, 3, 4), (wire.qdcount, wire.ancount, wire.nscount, wire.arcount));
        assert!(wire.has_records());

        let octets = [0, 7, HEADER_MASK_QR | HEADER_MASK_RD, 0xff, 0, 1, 0, 0, 0, 0, 0, 0];
        let wire = WireHeader::deserialise(&mut ConsumableBuffer::new(&octets)).unwrap();
        assert!(!wire.header.is_truncated);
        assert!(!wire.has_records());
    }

    #[test]
    fn header_missing_second_flags_octet() {
        let octets = [0, 9, 0];
        assert_eq!(
            Err(Error::HeaderTooShort(9)),
            WireHeader::deserialise(&mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    fn take_is_bounds_checked() {
        let octets = [1, 2, 3];
        let mut buffer = ConsumableBuffer::new(&octets);
        assert_eq!(None, buffer.take(4));
        assert_eq!(0, buffer.position());
        assert_eq!(Some(&[1, 2][..]), buffer.take(2));
        assert_eq!(None, buffer.next_u16());
        assert_eq!(Some(3), buffer.next_u8());
        assert_eq!(None, buffer.next_u8());

        let mut far = buffer.at_offset(usize::MAX);
        assert_eq!(None, far.take(1));
    }
}
