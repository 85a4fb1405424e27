//! Grammar-side collaborators for the kuule decoder.
//!
//! This crate holds everything the search engine consumes but does not own:
//!
//! - [`model`] -- Weighted finite-state grammars over words, with unique
//!   null transitions and a precomputed null-transition closure
//! - [`parse`] -- Line-oriented grammar file format
//! - [`dict`] -- Pronunciation dictionary and CI-phone symbol table,
//!   with filler flags and alternate-pronunciation chains
//! - [`logmath`] -- The shared integer log-score domain

pub mod dict;
pub mod logmath;
pub mod model;
pub mod parse;

pub use dict::{Dict, DictWordId, PhoneId, PhoneSet};
pub use logmath::{LogMath, WORST_SCORE};
pub use model::{FsgLink, FsgModel, WordId};
pub use parse::{parse_fsg, read_fsg_file};

/// Error type for grammar and dictionary loading.
#[derive(Debug, thiserror::Error)]
pub enum FsgError {
    #[error("i/o error reading grammar: {0}")]
    Io(#[from] std::io::Error),

    #[error("grammar parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("state {state} out of range (grammar has {n_state} states)")]
    StateOutOfRange { state: usize, n_state: usize },

    #[error("unknown word `{0}`")]
    UnknownWord(String),

    #[error("duplicate word `{0}`")]
    DuplicateWord(String),

    #[error("unknown phone: {0}")]
    UnknownPhone(String),
}
