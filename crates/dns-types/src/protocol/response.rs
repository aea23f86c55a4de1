//! Building a response by appending answers to a copy of the query.

use bytes::BytesMut;

use crate::protocol::request::Request;
use crate::protocol::serialise::{Error, WritableBuffer};
use crate::protocol::types::*;

/// A response under construction.  It starts as the request's octets
/// with the QR flag set, so the id, flags, and question section are
/// echoed as received.
#[derive(Debug, Clone)]
pub struct Response {
    buffer: WritableBuffer,
    answers: u16,
}

impl Response {
    pub fn for_request(request: &Request) -> Self {
        let mut octets = BytesMut::with_capacity(DATAGRAM_MAX_LEN);
        octets.extend_from_slice(request.octets());
        octets[HEADER_INDEX_FLAGS] |= HEADER_MASK_QR;

        Self {
            buffer: WritableBuffer::new(octets, DATAGRAM_MAX_LEN),
            answers: 0,
        }
    }

    /// Append one answer.  On failure nothing is appended.
    ///
    /// # Errors
    ///
    /// If the record does not fit, or there are already `u16::MAX`
    /// answers.
    pub fn push(&mut self, rr: &ResourceRecord) -> Result<(), Error> {
        let answers = self.answers.checked_add(1).ok_or(Error::CounterTooLarge {
            counter: usize::from(self.answers) + 1,
            bits: u16::BITS,
        })?;

        let mark = self.buffer.index();
        if let Err(error) = rr.serialise(&mut self.buffer) {
            self.buffer.truncate(mark);
            return Err(error);
        }

        self.answers = answers;
        Ok(())
    }

    /// Number of answers appended so far.
    pub fn answers(&self) -> u16 {
        self.answers
    }

    /// Write ANCOUNT and return the finished datagram.
    pub fn finish(mut self) -> BytesMut {
        self.buffer
            .overwrite_u16(HEADER_INDEX_ANCOUNT, self.answers);
        self.buffer.into_octets()
    }
}
