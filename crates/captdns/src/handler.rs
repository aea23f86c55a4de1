//! The captive answer policy: every A question resolves to the portal,
//! NS and URI questions get fixed answers, everything else is echoed
//! unanswered.

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use dns_types::protocol::deserialise;
use dns_types::protocol::request::{Rejection, Request};
use dns_types::protocol::response::Response;
use dns_types::protocol::serialise;
use dns_types::protocol::types::*;

use crate::scope::InterfaceInfo;

/// Name given in answers to NS questions.
pub const NAMESERVER_NAME: &str = "ns.";

/// Target of answers to URI questions.
pub const PORTAL_URI: &[u8] = b"http://esp.nonet";

pub const PORTAL_URI_PRIORITY: u16 = 10;

pub const PORTAL_URI_WEIGHT: u16 = 1;

/// The answer to a question, if there is one.  The question's class is
/// not considered.
pub fn answer(address: Ipv4Addr, question: &Question) -> Option<ResourceRecord> {
    let (rtype_with_data, rclass) = match question.qtype {
        QueryType::Record(RecordType::A) => (RecordTypeWithData::A { address }, RecordClass::IN),
        QueryType::Record(RecordType::NS) => (
            RecordTypeWithData::NS {
                nsdname: DomainName::from_dotted_string(NAMESERVER_NAME)?,
            },
            RecordClass::IN,
        ),
        QueryType::Record(RecordType::URI) => (
            RecordTypeWithData::URI {
                priority: PORTAL_URI_PRIORITY,
                weight: PORTAL_URI_WEIGHT,
                target: Bytes::from_static(PORTAL_URI),
            },
            RecordClass::from(URI_RECORD_CLASS),
        ),
        _ => return None,
    };

    Some(ResourceRecord {
        name: question.name.clone(),
        rtype_with_data,
        rclass,
        ttl: 0,
    })
}

/// Build the response to a datagram, answering each question in turn.
///
/// # Errors
///
/// If the datagram is not a query, any question is malformed, or the
/// answers do not fit in one datagram.  No partial response is ever
/// returned.
pub fn respond(address: Ipv4Addr, datagram: &[u8]) -> Result<BytesMut, Dropped> {
    let request = Request::parse(datagram)?;
    let mut response = Response::for_request(&request);

    for question in request.questions() {
        let question = question?;
        tracing::debug!(
            id = request.id(),
            name = %question.name,
            qtype = %question.qtype,
            qclass = %question.qclass,
            "question"
        );

        if let Some(rr) = answer(address, &question) {
            response.push(&rr)?;
        }
    }

    Ok(response.finish())
}

/// Like `respond`, but first checks that the peer is on the
/// interface's subnet, and logs why nothing is sent back.
pub fn reply_to(interface: &InterfaceInfo, peer: SocketAddr, datagram: &[u8]) -> Option<BytesMut> {
    if !interface.contains(peer.ip()) {
        tracing::info!(%peer, %interface, "ignoring datagram from outside interface subnet");
        return None;
    }

    match respond(interface.address, datagram) {
        Ok(octets) => Some(octets),
        Err(error) => {
            tracing::debug!(%peer, %error, "dropping datagram");
            None
        }
    }
}

/// Why no response was produced.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Dropped {
    Rejected(Rejection),
    Malformed(deserialise::Error),
    Overflow(serialise::Error),
}

impl From<Rejection> for Dropped {
    fn from(error: Rejection) -> Self {
        Dropped::Rejected(error)
    }
}

impl From<deserialise::Error> for Dropped {
    fn from(error: deserialise::Error) -> Self {
        Dropped::Malformed(error)
    }
}

impl From<serialise::Error> for Dropped {
    fn from(error: serialise::Error) -> Self {
        Dropped::Overflow(error)
    }
}

impl fmt::Display for Dropped {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dropped::Rejected(error) => write!(f, "rejected: {error}"),
            Dropped::Malformed(error) => write!(f, "malformed question: {error}"),
            Dropped::Overflow(error) => write!(f, "response overflow: {error}"),
        }
    }
}

impl std::error::Error for Dropped {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Dropped::Rejected(error) => Some(error),
            Dropped::Malformed(error) => Some(error),
            Dropped::Overflow(error) => Some(error),
        }
    }
}
