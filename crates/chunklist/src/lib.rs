#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Chunklist manifests
//!
//! A chunklist authenticates a large image as an ordered list of
//! `(length, sha256)` windows plus a signature over the header and the
//! window table. This crate decodes the binary format, checks the
//! signature and streams payload bytes against the window digests.

pub mod builder;
pub mod format;
pub mod parser;
pub mod verify;

pub use builder::ChunklistBuilder;
pub use format::{Header, SignatureMethod};
pub use parser::{parse, parse_for_payload, ChunkDescriptor, Chunklist, MAX_CHUNKLIST_SIZE};
pub use verify::{
    accept_signature, check_signature, verify_file, verify_payload, verify_prefix,
    verify_signature, ChunkVerifier, FileReport, PrefixReport, VerifyReport,
};
