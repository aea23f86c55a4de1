//! Validation of an inbound datagram as a query, and lazy iteration
//! over its questions.

use std::fmt;

use crate::protocol::deserialise::{ConsumableBuffer, Error};
use crate::protocol::types::*;

/// A datagram which has passed the structural checks for a query.
/// Questions are decoded on demand by `questions`.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    octets: &'a [u8],
    header: WireHeader,
}

impl<'a> Request<'a> {
    /// Check that a datagram is something we should answer.  The
    /// checks are made in this order:
    ///
    /// 1. between `HEADER_LEN` and `DATAGRAM_MAX_LEN` octets
    /// 2. no answer, authority, or additional records
    /// 3. the TC flag is clear
    ///
    /// # Errors
    ///
    /// The first check which fails.
    pub fn parse(octets: &'a [u8]) -> Result<Self, Rejection> {
        if octets.len() < HEADER_LEN {
            return Err(Rejection::TooShort { len: octets.len() });
        }
        if octets.len() > DATAGRAM_MAX_LEN {
            return Err(Rejection::TooLong { len: octets.len() });
        }

        let header = WireHeader::deserialise(&mut ConsumableBuffer::new(octets))
            .map_err(|_| Rejection::TooShort { len: octets.len() })?;

        if header.has_records() {
            return Err(Rejection::NotAQuery {
                id: header.header.id,
            });
        }
        if header.header.is_truncated {
            return Err(Rejection::Truncated {
                id: header.header.id,
            });
        }

        Ok(Self { octets, header })
    }

    pub fn id(&self) -> u16 {
        self.header.header.id
    }

    pub fn header(&self) -> &WireHeader {
        &self.header
    }

    /// The datagram exactly as received.
    pub fn octets(&self) -> &'a [u8] {
        self.octets
    }

    /// Decode the `qdcount` questions in order.  Iteration stops after
    /// the first malformed question, since the rest of the section
    /// cannot be located.
    pub fn questions(&self) -> Questions<'a> {
        Questions {
            buffer: ConsumableBuffer::new(self.octets).at_offset(HEADER_LEN),
            id: self.id(),
            remaining: self.header.qdcount,
            failed: false,
        }
    }
}

/// Iterator over the question section of a `Request`.
#[derive(Debug, Clone)]
pub struct Questions<'a> {
    buffer: ConsumableBuffer<'a>,
    id: u16,
    remaining: u16,
    failed: bool,
}

impl Iterator for Questions<'_> {
    type Item = Result<Question, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let question = Question::deserialise(self.id, &mut self.buffer);
        self.failed = question.is_err();
        Some(question)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining.into()))
        }
    }
}

/// Why a datagram was not treated as a query.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rejection {
    /// Shorter than a header.
    TooShort { len: usize },

    /// Longer than the largest supported datagram.
    TooLong { len: usize },

    /// Carries records, so it is a response (or nonsense).
    NotAQuery { id: u16 },

    /// The TC flag is set.
    Truncated { id: u16 },
}

impl Rejection {
    pub fn id(self) -> Option<u16> {
        match self {
            Rejection::TooShort { .. } | Rejection::TooLong { .. } => None,
            Rejection::NotAQuery { id } | Rejection::Truncated { id } => Some(id),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rejection::TooShort { len } => write!(f, "datagram of {len} octets is too short"),
            Rejection::TooLong { len } => write!(f, "datagram of {len} octets is too long"),
            Rejection::NotAQuery { id } => write!(f, "datagram {id} carries records"),
            Rejection::Truncated { id } => write!(f, "datagram {id} is truncated"),
        }
    }
}

impl std::error::Error for Rejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    fn rejects_short() {
        for len in 0..HEADER_LEN {
            let octets = vec![0; len];
            assert_eq!(
                Rejection::TooShort { len },
                Request::parse(&octets).unwrap_err()
            );
        }
    }

    #[test]
    fn rejects_long() {
        let mut octets = query_octets(1, &[("example.com.", 1)]);
        octets.resize(DATAGRAM_MAX_LEN, 0);
        assert!(Request::parse(&octets).is_ok());

        octets.push(0);
        assert_eq!(
            Rejection::TooLong {
                len: DATAGRAM_MAX_LEN + 1
            },
            Request::parse(&octets).unwrap_err()
        );
    }

    #[test]
    fn rejects_records() {
        for index in [7, 9, 11] {
            let mut octets = query_octets(7, &[("example.com.", 1)]);
            octets[index] = 1;
            assert_eq!(
                Rejection::NotAQuery { id: 7 },
                Request::parse(&octets).unwrap_err()
            );
        }
    }

    #[test]
    fn rejects_truncated() {
        let mut octets = query_octets(7, &[("example.com.", 1)]);
        octets[2] |= HEADER_MASK_TC;
        assert_eq!(
            Rejection::Truncated { id: 7 },
            Request::parse(&octets).unwrap_err()
        );
    }

    #[test]
    fn records_checked_before_truncation() {
        let mut octets = query_octets(7, &[("example.com.", 1)]);
        octets[2] |= HEADER_MASK_TC;
        octets[7] = 1;
        assert_eq!(
            Rejection::NotAQuery { id: 7 },
            Request::parse(&octets).unwrap_err()
        );
    }

    #[test]
    fn yields_questions_in_order() {
        let octets = query_octets(9, &[("a.example.com.", 1), ("B.example.", 256)]);
        let request = Request::parse(&octets).unwrap();

        assert_eq!(9, request.id());
        assert_eq!(
            vec![
                Ok(Question {
                    name: domain("a.example.com."),
                    qtype: QueryType::Record(RecordType::A),
                    qclass: QueryClass::Record(RecordClass::IN),
                }),
                Ok(Question {
                    name: domain("B.example."),
                    qtype: QueryType::Record(RecordType::URI),
                    qclass: QueryClass::Record(RecordClass::IN),
                }),
            ],
            request.questions().collect::<Vec<_>>()
        );
    }

    #[test]
    fn stops_after_first_bad_question() {
        let mut octets = query_octets(3, &[("a.", 1)]);
        // claim three questions, but only one is present
        octets[5] = 3;
        let request = Request::parse(&octets).unwrap();

        let questions = request.questions().collect::<Vec<_>>();
        assert_eq!(2, questions.len());
        assert!(questions[0].is_ok());
        assert_eq!(Err(Error::DomainTooShort(3)), questions[1]);
    }

    #[test]
    fn header_only_query_has_no_questions() {
        let mut octets = query_octets(3, &[]);
        octets[5] = 0;
        let request = Request::parse(&octets).unwrap();
        assert_eq!(0, request.questions().count());
    }
}
