// Decoder options.
//
// Probabilities (beams, insertion penalties, self-loop probabilities) are
// stored linear here and converted to the integer log domain once, when the
// search is created. Beam widths stay raw; insertion penalties are
// pre-multiplied by the language weight.

use std::path::PathBuf;

/// Options consumed by [`crate::search::FsgSearch::new`].
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Main HMM pruning beam (linear probability, becomes a non-positive
    /// log offset from the frame's best score).
    pub beam: f64,
    /// Phone-exit pruning beam.
    pub pbeam: f64,
    /// Word-exit pruning beam.
    pub wbeam: f64,
    /// Absolute cap on active HMMs per frame; exceeding it narrows the
    /// beams dynamically. `-1` disables the cap.
    pub maxhmmpf: i32,
    /// Language weight applied to grammar log probabilities.
    pub lw: f64,
    /// Phone insertion penalty (linear).
    pub pip: f64,
    /// Word insertion penalty (linear).
    pub wip: f64,
    /// Self-loop probability for the `<sil>` word when grammars are
    /// augmented with fillers.
    pub silprob: f64,
    /// Self-loop probability for the remaining filler words.
    pub fillprob: f64,
    /// Acoustic score scale (divisor) for posterior computation.
    pub ascale: f64,
    /// Run the lattice best-path search for final hypotheses.
    pub bestpath: bool,
    /// Add silence/filler self-loops to grammars as they are added.
    pub fsg_use_filler: bool,
    /// Register dictionary alternate pronunciations on grammars as they
    /// are added.
    pub fsg_use_altpron: bool,
    /// Grammar file to load and select at construction time.
    pub fsg_path: Option<PathBuf>,
    /// Base of the integer log domain.
    pub log_base: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam: 1e-48,
            pbeam: 1e-48,
            wbeam: 7e-29,
            maxhmmpf: -1,
            lw: 6.5,
            pip: 1.0,
            wip: 0.65,
            silprob: 0.005,
            fillprob: 1e-8,
            ascale: 20.0,
            bestpath: true,
            fsg_use_filler: true,
            fsg_use_altpron: true,
            fsg_path: None,
            log_base: kuule_fsg::LogMath::DEFAULT_BASE,
        }
    }
}
