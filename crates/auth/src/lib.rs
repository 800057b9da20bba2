//! `cybertrain-auth`: credential claims and decoding (pure, no IO).
//!
//! This crate is intentionally decoupled from HTTP and storage. Decoding is a
//! local parse of the credential, not a verification; see [`codec`].

pub mod claims;
pub mod codec;
pub mod roles;

pub use claims::{ClaimSet, SubjectId};
pub use codec::{CredentialError, Segment, decode};
pub use roles::Role;
