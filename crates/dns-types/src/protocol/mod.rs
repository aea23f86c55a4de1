pub mod deserialise;
pub mod request;
pub mod response;
pub mod serialise;
pub mod types;
