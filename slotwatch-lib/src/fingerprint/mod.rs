//! Content fingerprints for grouping requests into tasks.
//!
//! A fingerprint is a 64-bit SimHash over the whitespace-separated tokens of a
//! request payload. Payloads whose token multisets overlap heavily produce
//! fingerprints that differ in only a few bits, so "same task" becomes a
//! Hamming-distance check against a small threshold.
//!
//! Token hashes are keyed with a random salt drawn once per [`Fingerprinter`].
//! The binary builds a single fingerprinter at startup, so fingerprints are
//! stable for the process lifetime and meaningless across restarts.

mod simhash;

pub use simhash::{distance, Fingerprint, Fingerprinter, DEFAULT_SIMILARITY_THRESHOLD, SALT_LEN};
