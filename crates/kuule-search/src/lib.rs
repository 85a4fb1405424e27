//! FSM-constrained Viterbi beam-search decoder core.
//!
//! Given a finite-state grammar over words, a pronunciation dictionary and
//! a per-frame stream of senone scores, the search produces the best word
//! sequence accepted by the grammar, a word lattice over the utterance, and
//! a per-word segmentation.
//!
//! # Architecture
//!
//! - [`config`] -- Decoder options
//! - [`acmod`] -- Acoustic scorer contract and a table-driven implementation
//! - [`hmm`] -- Per-phone HMM state and the Viterbi evaluation step
//! - [`ctxt`] -- Phone context bit-sets
//! - [`lextree`] -- Phonetic prefix structures over a grammar's vocabulary
//! - [`history`] -- Append-only backpointer table
//! - [`set`] -- Named grammar collection with one selected grammar
//! - [`search`] -- The frame engine: `start` / `step` / `finish`
//! - [`output`] -- Hypothesis string and segmentation extraction
//! - [`lattice`] -- Word-graph construction and lattice algorithms
//!
//! The engine is single-threaded and cooperative: the caller invokes
//! [`search::FsgSearch::step`] once per available acoustic frame and reads
//! results between calls.

pub mod acmod;
pub mod config;
pub mod ctxt;
pub mod history;
pub mod hmm;
pub mod lattice;
pub mod lextree;
pub mod output;
pub mod search;
pub mod set;

pub use acmod::{AcousticScorer, FrameScores, TableScorer};
pub use config::DecoderConfig;
pub use hmm::{Hmm, HmmContext};
pub use kuule_fsg::WORST_SCORE;
pub use lattice::Lattice;
pub use output::Segment;
pub use search::FsgSearch;

/// Error type for decoder construction and grammar management.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Grammar(#[from] kuule_fsg::FsgError),

    #[error("no grammar named `{0}` in the set")]
    UnknownFsg(String),

    #[error("a grammar named `{0}` is already in the set")]
    DuplicateFsg(String),

    #[error("no grammar selected")]
    NoFsgSelected,

    #[error("grammar not compiled; call reinit() after selecting a grammar")]
    NotCompiled,

    #[error("word `{0}` has no pronunciation in the dictionary")]
    MissingPronunciation(String),
}
