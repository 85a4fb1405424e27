// Acoustic scorer contract.
//
// The search never computes acoustic scores itself; it asks a scorer for
// one senone score vector per frame. When the scorer does not compute all
// senones, the search marks the senones of every active HMM before asking
// for the frame.

use std::collections::VecDeque;

use crate::hmm::{Hmm, HmmContext, SenoneId};

/// Senone scores for one frame.
#[derive(Debug, Clone)]
pub struct FrameScores {
    /// Index of the scored frame within the utterance.
    pub frame_idx: i32,
    /// Score per senone id.
    pub senscr: Vec<i32>,
    /// Best senone score in the frame.
    pub best_score: i32,
    /// Senone id achieving the best score.
    pub best_senid: SenoneId,
}

/// What the frame engine needs from an acoustic front end.
pub trait AcousticScorer {
    /// Number of feature frames buffered and ready to score.
    fn n_feat_frame(&self) -> usize;

    /// Whether every senone is scored regardless of activation.
    fn compute_all_senones(&self) -> bool;

    /// Forget all senone activations for the coming frame.
    fn clear_active(&mut self);

    /// Mark the senones of an active HMM for scoring.
    fn activate_hmm(&mut self, hmm: &Hmm, ctx: &HmmContext);

    /// Number of senones activated for the coming frame.
    fn n_senone_active(&self) -> usize;

    /// Score the next buffered frame, consuming it. `None` when no frame
    /// is buffered.
    fn score(&mut self) -> Option<FrameScores>;
}

/// A buffered, table-driven scorer: the caller pushes precomputed senone
/// score vectors and the search consumes them one frame at a time. Used by
/// the test suite and by embeddings that score senones offline.
pub struct TableScorer {
    n_senones: usize,
    frames: VecDeque<Vec<i32>>,
    next_frame_idx: i32,
    active: Vec<bool>,
    n_active: usize,
    compallsen: bool,
}

impl TableScorer {
    pub fn new(n_senones: usize) -> Self {
        Self {
            n_senones,
            frames: VecDeque::new(),
            next_frame_idx: 0,
            active: vec![false; n_senones],
            n_active: 0,
            compallsen: false,
        }
    }

    /// Score every senone instead of tracking activations.
    pub fn set_compute_all_senones(&mut self, on: bool) {
        self.compallsen = on;
    }

    /// Buffer one frame of senone scores.
    ///
    /// # Panics
    ///
    /// Panics if the vector length does not match the senone count.
    pub fn push_frame(&mut self, senscr: Vec<i32>) {
        assert_eq!(senscr.len(), self.n_senones, "senone score vector length");
        self.frames.push_back(senscr);
    }

    pub fn n_senones(&self) -> usize {
        self.n_senones
    }
}

impl AcousticScorer for TableScorer {
    fn n_feat_frame(&self) -> usize {
        self.frames.len()
    }

    fn compute_all_senones(&self) -> bool {
        self.compallsen
    }

    fn clear_active(&mut self) {
        self.active.fill(false);
        self.n_active = 0;
    }

    fn activate_hmm(&mut self, hmm: &Hmm, ctx: &HmmContext) {
        for &senone in ctx.senones(hmm.phone()) {
            if let Some(slot) = self.active.get_mut(senone) {
                if !*slot {
                    *slot = true;
                    self.n_active += 1;
                }
            }
        }
    }

    fn n_senone_active(&self) -> usize {
        if self.compallsen {
            self.n_senones
        } else {
            self.n_active
        }
    }

    fn score(&mut self) -> Option<FrameScores> {
        let senscr = self.frames.pop_front()?;
        let frame_idx = self.next_frame_idx;
        self.next_frame_idx += 1;

        let (best_senid, best_score) = senscr
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(_, s)| s)
            .unwrap_or((0, 0));

        Some(FrameScores {
            frame_idx,
            senscr,
            best_score,
            best_senid,
        })
    }
}
