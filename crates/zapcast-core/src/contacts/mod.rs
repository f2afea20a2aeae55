//! Contact list import
//!
//! Uploaded lists are parsed leniently: lines without anything that looks
//! like a phone number are dropped without being counted, while numbers
//! with an unacceptable length are kept and reported as invalid.

mod parser;
mod vcard;

pub use parser::{process_contact_file, ContactListParser, ContactParseReport, ParsedContact};
