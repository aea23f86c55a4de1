#![no_main]
use libfuzzer_sys::fuzz_target;
use std::net::Ipv4Addr;

use dns_types::protocol::request::Request;
use dns_types::protocol::response::Response;
use dns_types::protocol::types::*;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = Request::parse(data) {
        let mut response = Response::for_request(&request);
        for question in request.questions() {
            let Ok(question) = question else { return };
            let _ = response.push(&ResourceRecord {
                name: question.name,
                rtype_with_data: RecordTypeWithData::A {
                    address: Ipv4Addr::new(192, 168, 4, 1),
                },
                rclass: RecordClass::IN,
                ttl: 0,
            });
        }

        let answers = response.answers();
        let octets = response.finish();
        assert!(octets.len() <= DATAGRAM_MAX_LEN);
        assert_eq!(answers.to_be_bytes(), octets[6..8]);
        assert_eq!(data[12..], octets[12..data.len()]);
    }
});
