//! Serialisation of DNS records to the wire format.  See the `types`
//! module for details of the format.
//!
//! Every write is checked against the buffer's limit, so nothing this
//! module produces can exceed `DATAGRAM_MAX_LEN` octets.

use bytes::{BufMut, BytesMut};

use crate::protocol::types::*;

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record does not fit in the buffer.  The buffer may hold
    /// a partial record afterwards: callers which want to keep going
    /// must truncate it back.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer)?;
        self.rtype_with_data.rtype().serialise(buffer)?;
        self.rclass.serialise(buffer)?;
        buffer.write_u32(self.ttl)?;

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0)?;

        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets())?,
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer)?,
            RecordTypeWithData::URI {
                priority,
                weight,
                target,
            } => {
                buffer.write_u16(*priority)?;
                buffer.write_u16(*weight)?;
                buffer.write_octets(target)?;
            }
        }

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        buffer.overwrite_u16(rdlength_index, rdlength);

        Ok(())
    }
}

impl DomainName {
    /// Write the name as length-prefixed labels.  Names are never
    /// compressed.
    ///
    /// # Errors
    ///
    /// If the name does not fit in the buffer.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        for label in &self.labels {
            buffer.write_u8(label.len())?;
            buffer.write_octets(label.octets())?;
        }
        Ok(())
    }
}

impl RecordType {
    /// # Errors
    ///
    /// If the buffer is full.
    pub fn serialise(self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        buffer.write_u16(self.into())
    }
}

impl RecordClass {
    /// # Errors
    ///
    /// If the buffer is full.
    pub fn serialise(self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        buffer.write_u16(self.into())
    }
}

/// Errors encountered when serialising.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// Writing would take the message over its size limit.
    MessageTooLong { limit: usize },

    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MessageTooLong { limit } => {
                write!(f, "message would exceed {limit} octets")
            }
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which refuses to grow past a fixed limit.
#[derive(Debug, Clone)]
pub struct WritableBuffer {
    octets: BytesMut,
    limit: usize,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self::new(BytesMut::with_capacity(DATAGRAM_MAX_LEN), DATAGRAM_MAX_LEN)
    }
}

impl WritableBuffer {
    /// Continue writing after `octets`.  If `octets` is already over
    /// the limit, every write will fail.
    pub fn new(octets: BytesMut, limit: usize) -> Self {
        Self { octets, limit }
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    pub fn into_octets(self) -> BytesMut {
        self.octets
    }

    /// Discard everything written from `index` onwards.
    pub fn truncate(&mut self, index: usize) {
        self.octets.truncate(index);
    }

    /// Replace two already-written octets.
    ///
    /// # Panics
    ///
    /// If `index + 1` has not been written yet.
    pub fn overwrite_u16(&mut self, index: usize, value: u16) {
        self.octets[index..index + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// # Errors
    ///
    /// If the buffer is full.
    pub fn write_u8(&mut self, octet: u8) -> Result<(), Error> {
        self.write_octets(&[octet])
    }

    /// # Errors
    ///
    /// If the buffer is full.
    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write_octets(&value.to_be_bytes())
    }

    /// # Errors
    ///
    /// If the buffer is full.
    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_octets(&value.to_be_bytes())
    }

    /// # Errors
    ///
    /// If the octets do not fit.
    pub fn write_octets(&mut self, octets: &[u8]) -> Result<(), Error> {
        if self.octets.len() + octets.len() > self.limit {
            return Err(Error::MessageTooLong { limit: self.limit });
        }
        self.octets.put_slice(octets);
        Ok(())
    }
}

/// # Errors
///
/// If the counter is over `u16::MAX`.
pub fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn names_are_not_compressed() {
        let mut buf = WritableBuffer::default();
        buf.write_octets(&[1, 2, 3, 4]).unwrap();
        domain("www.example.com.").serialise(&mut buf).unwrap();
        domain("www.example.com.").serialise(&mut buf).unwrap();

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // domain 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // domain 2
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            buf.octets(),
        );
    }

    #[test]
    fn name_case_is_preserved() {
        let mut buf = WritableBuffer::default();
        domain("WwW.").serialise(&mut buf).unwrap();
        assert_eq!(&[3, b'W', b'w', b'W', 0][..], buf.octets());
    }

    #[test]
    #[rustfmt::skip]
    fn serialise_a_record() {
        let mut buf = WritableBuffer::default();
        a_record("a.", Ipv4Addr::new(192, 168, 4, 1)).serialise(&mut buf).unwrap();

        assert_eq!(
            vec![
                // NAME
                1, b'a', 0,
                // TYPE
                0, 1,
                // CLASS
                0, 1,
                // TTL
                0, 0, 0, 0,
                // RDLENGTH
                0, 4,
                // RDATA
                192, 168, 4, 1,
            ],
            buf.octets(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn serialise_ns_record() {
        let mut buf = WritableBuffer::default();
        ns_record("a.", "ns.").serialise(&mut buf).unwrap();

        assert_eq!(
            vec![
                // NAME
                1, b'a', 0,
                // TYPE
                0, 2,
                // CLASS
                0, 1,
                // TTL
                0, 0, 0, 0,
                // RDLENGTH
                0, 4,
                // RDATA
                2, b'n', b's', 0,
            ],
            buf.octets(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn serialise_uri_record() {
        let mut buf = WritableBuffer::default();
        uri_record("a.", b"http://esp.nonet").serialise(&mut buf).unwrap();

        let mut expected = vec![
            // NAME
            1, b'a', 0,
            // TYPE
            1, 0,
            // CLASS
            1, 0,
            // TTL
            0, 0, 0, 0,
            // RDLENGTH
            0, 20,
            // RDATA
            0, 10, // priority
            0, 1, // weight
        ];
        expected.extend_from_slice(b"http://esp.nonet");

        assert_eq!(expected, buf.octets());
    }

    #[test]
    fn writes_stop_at_limit() {
        let mut buf = WritableBuffer::new(BytesMut::new(), 3);
        assert_eq!(Ok(()), buf.write_u16(1));
        assert_eq!(
            Err(Error::MessageTooLong { limit: 3 }),
            buf.write_u16(2)
        );
        assert_eq!(Ok(()), buf.write_u8(3));
        assert_eq!(Err(Error::MessageTooLong { limit: 3 }), buf.write_u8(4));
        assert_eq!(&[0, 1, 3][..], buf.octets());
    }

    #[test]
    fn oversized_record_fails() {
        let mut buf = WritableBuffer::new(BytesMut::new(), 10);
        assert_eq!(
            Err(Error::MessageTooLong { limit: 10 }),
            a_record("www.example.com.", Ipv4Addr::LOCALHOST).serialise(&mut buf)
        );
    }

    #[test]
    fn truncate_rolls_back() {
        let mut buf = WritableBuffer::default();
        buf.write_u32(0xdead_beef).unwrap();
        let mark = buf.index();
        buf.write_u16(7).unwrap();
        buf.truncate(mark);
        assert_eq!(&[0xde, 0xad, 0xbe, 0xef][..], buf.octets());
    }

    #[test]
    fn usize_to_u16_bounds() {
        assert_eq!(Ok(u16::MAX), usize_to_u16(usize::from(u16::MAX)));
        assert_eq!(
            Err(Error::CounterTooLarge {
                counter: 65536,
                bits: 16
            }),
            usize_to_u16(65536)
        );
    }
}
