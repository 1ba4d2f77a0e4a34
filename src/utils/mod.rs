pub mod crypto;
pub mod header_processor;
pub mod redirect;
pub mod request;
