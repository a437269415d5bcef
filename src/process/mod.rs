// src/process/mod.rs
//! Parse → validate → transform for one day's posting.

pub mod columns;
pub mod date_parser;
pub mod parse;
pub mod transform;
pub mod utils;
pub mod validate;

pub use parse::{parse, ParsedFeed, RawRow};
pub use transform::{transform, CapacityRecord, NaturalKey};
pub use validate::{validate, RejectReason, Rejection, ValidatedRow, Verdict};
