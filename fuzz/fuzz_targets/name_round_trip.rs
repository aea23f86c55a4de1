#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::serialise::WritableBuffer;
use dns_types::protocol::types::DomainName;

fuzz_target!(|name: DomainName| {
    let mut buffer = WritableBuffer::default();
    name.serialise(&mut buffer).unwrap();
    let (deserialised, next) = DomainName::from_octets_at(buffer.octets(), 0).unwrap();
    assert_eq!(name, deserialised);
    assert_eq!(buffer.index(), next);
});
