// Per-phone HMM state and the single-frame Viterbi evaluation step.
//
// Topology is left-to-right with self-loops: state `j` is reached from
// itself or from `j - 1`, and the HMM is exited from the last emitting
// state. Scores are integer log values; `WORST_SCORE` marks an inactive
// state and is never degraded further by arithmetic.

use kuule_fsg::dict::PhoneId;
use kuule_fsg::WORST_SCORE;

/// Senone (tied acoustic state) identifier.
pub type SenoneId = usize;

/// Shared evaluation context: transition matrix, senone sequences per CI
/// phone, and the senone scores of the frame being evaluated.
pub struct HmmContext {
    n_emit_state: usize,
    /// `tp[i][j]` is the log probability of moving from emitting state `i`
    /// to state `j`; column `n_emit_state` is the exit.
    tp: Vec<Vec<i32>>,
    /// Senone id of each emitting state, per CI phone.
    sseq: Vec<Vec<SenoneId>>,
    /// Senone scores for the current frame.
    senscr: Vec<i32>,
}

impl HmmContext {
    /// Create a context for `n_emit_state`-state HMMs.
    ///
    /// # Panics
    ///
    /// Panics if the transition matrix or a senone sequence has the wrong
    /// shape.
    pub fn new(n_emit_state: usize, tp: Vec<Vec<i32>>, sseq: Vec<Vec<SenoneId>>) -> Self {
        assert!(n_emit_state > 0, "HMM needs at least one emitting state");
        assert_eq!(tp.len(), n_emit_state, "transition matrix row count");
        for row in &tp {
            assert_eq!(row.len(), n_emit_state + 1, "transition matrix row width");
        }
        for seq in &sseq {
            assert_eq!(seq.len(), n_emit_state, "senone sequence length");
        }
        Self {
            n_emit_state,
            tp,
            sseq,
            senscr: Vec::new(),
        }
    }

    pub fn n_emit_state(&self) -> usize {
        self.n_emit_state
    }

    /// Senone ids used by a phone's emitting states.
    pub fn senones(&self, phone: PhoneId) -> &[SenoneId] {
        &self.sseq[phone]
    }

    /// Bind the senone scores of the frame about to be evaluated.
    pub fn set_senscore(&mut self, scores: &[i32]) {
        self.senscr.clear();
        self.senscr.extend_from_slice(scores);
    }

    fn senscore(&self, senone: SenoneId) -> i32 {
        self.senscr.get(senone).copied().unwrap_or(WORST_SCORE)
    }
}

/// One HMM instance: the live Viterbi state of a single phone occurrence.
#[derive(Debug, Clone)]
pub struct Hmm {
    phone: PhoneId,
    /// Per-state path score; `score[0]` is also the entry score.
    score: Box<[i32]>,
    /// Per-state backpointer id (history entry index), -1 when none.
    hist: Box<[i32]>,
    out_score: i32,
    out_hist: i32,
    best: i32,
    /// Frame stamp: the frame this HMM is active in, -1 when inactive.
    frame: i32,
}

/// `WORST_SCORE` plus a log value, without drifting below the sentinel.
#[inline]
fn path_score(score: i32, tp: i32) -> i32 {
    if score <= WORST_SCORE {
        WORST_SCORE
    } else {
        score + tp
    }
}

impl Hmm {
    pub fn new(n_emit_state: usize, phone: PhoneId) -> Self {
        Self {
            phone,
            score: vec![WORST_SCORE; n_emit_state].into_boxed_slice(),
            hist: vec![-1; n_emit_state].into_boxed_slice(),
            out_score: WORST_SCORE,
            out_hist: -1,
            best: WORST_SCORE,
            frame: -1,
        }
    }

    pub fn phone(&self) -> PhoneId {
        self.phone
    }

    /// Entry score for the frame the HMM is stamped with.
    pub fn in_score(&self) -> i32 {
        self.score[0]
    }

    /// Score leaving the last emitting state, as of the last evaluation.
    pub fn out_score(&self) -> i32 {
        self.out_score
    }

    /// Backpointer id carried out of the last emitting state.
    pub fn out_history(&self) -> i32 {
        self.out_hist
    }

    pub fn bestscore(&self) -> i32 {
        self.best
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    /// Enter the HMM at its first state for frame `frame`.
    pub fn enter(&mut self, score: i32, hist: i32, frame: i32) {
        self.score[0] = score;
        self.hist[0] = hist;
        self.frame = frame;
    }

    /// One Viterbi step over the bound senone scores. Returns the HMM's
    /// best state score after the update.
    pub fn vit_eval(&mut self, ctx: &HmmContext) -> i32 {
        let n = self.score.len();
        let sseq = ctx.senones(self.phone);

        // Update from the last state down so each state still sees its
        // predecessor's previous-frame score.
        for j in (0..n).rev() {
            let mut best = path_score(self.score[j], ctx.tp[j][j]);
            let mut hist = self.hist[j];
            if j > 0 {
                let from_prev = path_score(self.score[j - 1], ctx.tp[j - 1][j]);
                if from_prev > best {
                    best = from_prev;
                    hist = self.hist[j - 1];
                }
            }
            self.score[j] = path_score(best, ctx.senscore(sseq[j]));
            self.hist[j] = hist;
        }

        self.out_score = path_score(self.score[n - 1], ctx.tp[n - 1][n]);
        self.out_hist = self.hist[n - 1];
        self.best = self.score.iter().copied().max().unwrap_or(WORST_SCORE);
        self.best
    }

    /// Reset to the inactive state.
    pub fn deactivate(&mut self) {
        self.score.fill(WORST_SCORE);
        self.hist.fill(-1);
        self.out_score = WORST_SCORE;
        self.out_hist = -1;
        self.best = WORST_SCORE;
        self.frame = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3-state Bakis topology with uniform log costs.
    fn ctx(n_phone: usize) -> HmmContext {
        let tp = vec![
            vec![-100, -120, WORST_SCORE, WORST_SCORE],
            vec![WORST_SCORE, -100, -120, WORST_SCORE],
            vec![WORST_SCORE, WORST_SCORE, -100, -120],
        ];
        let sseq = (0..n_phone).map(|p| vec![p, p, p]).collect();
        HmmContext::new(3, tp, sseq)
    }

    #[test]
    fn new_hmm_is_inactive() {
        let h = Hmm::new(3, 0);
        assert_eq!(h.frame(), -1);
        assert_eq!(h.bestscore(), WORST_SCORE);
        assert_eq!(h.in_score(), WORST_SCORE);
        assert_eq!(h.out_history(), -1);
    }

    #[test]
    fn enter_sets_entry_state_only() {
        let mut h = Hmm::new(3, 0);
        h.enter(-500, 7, 4);
        assert_eq!(h.in_score(), -500);
        assert_eq!(h.frame(), 4);
        assert_eq!(h.out_score(), WORST_SCORE);
    }

    #[test]
    fn eval_advances_through_states() {
        let mut c = ctx(1);
        c.set_senscore(&[-10]);
        let mut h = Hmm::new(3, 0);
        h.enter(0, 3, 0);

        // First frame: states 0 and 1 become occupied, no exit yet.
        let best = h.vit_eval(&c);
        assert_eq!(best, -110); // 0 + self-loop(-100) + senone(-10)
        assert_eq!(h.out_score(), WORST_SCORE);

        // Second frame: the straight-through path reaches the last state,
        // so the HMM has an exit score: two advances, two senones, exit.
        h.vit_eval(&c);
        assert_eq!(h.out_score(), -120 - 10 - 120 - 10 - 120);
        assert_eq!(h.out_history(), 3);
    }

    #[test]
    fn best_path_wins_per_state() {
        let mut c = ctx(1);
        c.set_senscore(&[0]);
        let mut h = Hmm::new(3, 0);
        h.enter(0, 1, 0);
        h.vit_eval(&c);
        // Re-enter with a better score and a different backpointer; the new
        // entry should dominate state 0.
        h.enter(1000, 2, 1);
        h.vit_eval(&c);
        assert_eq!(h.hist[0], 2);
        assert_eq!(h.score[0], 1000 - 100);
        // State 2 was reached along the original entry's path.
        assert_eq!(h.hist[2], 1);
    }

    #[test]
    fn worst_score_does_not_drift() {
        let mut c = ctx(1);
        c.set_senscore(&[-10]);
        let mut h = Hmm::new(3, 0);
        h.vit_eval(&c);
        assert_eq!(h.bestscore(), WORST_SCORE);
        assert_eq!(h.in_score(), WORST_SCORE);
        assert_eq!(h.out_score(), WORST_SCORE);
    }

    #[test]
    fn deactivate_resets_everything() {
        let mut c = ctx(1);
        c.set_senscore(&[0]);
        let mut h = Hmm::new(3, 0);
        h.enter(0, 5, 2);
        h.vit_eval(&c);
        h.deactivate();
        assert_eq!(h.frame(), -1);
        assert_eq!(h.in_score(), WORST_SCORE);
        assert_eq!(h.out_history(), -1);
        assert_eq!(h.bestscore(), WORST_SCORE);
    }

    #[test]
    #[should_panic(expected = "transition matrix")]
    fn context_rejects_bad_shapes() {
        HmmContext::new(3, vec![vec![0; 4]; 2], vec![]);
    }
}
