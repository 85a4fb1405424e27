// Weighted finite-state grammar over words.
//
// States are dense indices `0..n_state`; transitions carry a word id (or
// none, for a null transition) and an integer log probability with the
// language weight already folded in. Null transitions are unique per state
// pair and the transitive closure over them is precomputed, so the decoder
// only ever needs to look one null hop ahead.

use hashbrown::HashMap;

use crate::logmath::LogMath;
use crate::FsgError;

/// Word identifier within one grammar's vocabulary.
pub type WordId = u32;

/// A single grammar transition.
///
/// `wid == None` marks a null (epsilon) transition that consumes no word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsgLink {
    pub from_state: usize,
    pub to_state: usize,
    /// Log probability of taking this transition, language weight applied.
    pub logs2prob: i32,
    pub wid: Option<WordId>,
}

/// A weighted finite-state grammar.
pub struct FsgModel {
    name: String,
    n_state: usize,
    start_state: usize,
    final_state: usize,
    lmath: LogMath,
    /// Language weight; applied to every probability entering the model.
    lw: f64,

    vocab: Vec<String>,
    word_index: HashMap<String, WordId>,

    /// Word transitions grouped by (from, to) state pair.
    trans: HashMap<(usize, usize), Vec<FsgLink>>,
    /// Unique null transition per (from, to) state pair.
    null_trans: HashMap<(usize, usize), FsgLink>,

    /// Per-word silence/filler flag.
    silwords: Vec<bool>,
    /// Per-word alternate-pronunciation flag.
    altwords: Vec<bool>,

    has_sil: bool,
    has_alt: bool,
}

const NO_LINKS: &[FsgLink] = &[];

impl FsgModel {
    /// Create an empty grammar with the given state count.
    pub fn new(
        name: &str,
        n_state: usize,
        start_state: usize,
        final_state: usize,
        lmath: LogMath,
        lw: f64,
    ) -> Result<Self, FsgError> {
        if start_state >= n_state {
            return Err(FsgError::StateOutOfRange {
                state: start_state,
                n_state,
            });
        }
        if final_state >= n_state {
            return Err(FsgError::StateOutOfRange {
                state: final_state,
                n_state,
            });
        }
        Ok(Self {
            name: name.to_string(),
            n_state,
            start_state,
            final_state,
            lmath,
            lw,
            vocab: Vec::new(),
            word_index: HashMap::new(),
            trans: HashMap::new(),
            null_trans: HashMap::new(),
            silwords: Vec::new(),
            altwords: Vec::new(),
            has_sil: false,
            has_alt: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_state(&self) -> usize {
        self.n_state
    }

    pub fn start_state(&self) -> usize {
        self.start_state
    }

    pub fn final_state(&self) -> usize {
        self.final_state
    }

    pub fn lmath(&self) -> &LogMath {
        &self.lmath
    }

    pub fn lw(&self) -> f64 {
        self.lw
    }

    pub fn has_sil(&self) -> bool {
        self.has_sil
    }

    pub fn has_alt(&self) -> bool {
        self.has_alt
    }

    // -------------------------------------------------------------------
    // Vocabulary
    // -------------------------------------------------------------------

    pub fn n_word(&self) -> usize {
        self.vocab.len()
    }

    /// Look up a word id by string.
    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.word_index.get(word).copied()
    }

    /// Look up a word id, adding the word to the vocabulary if missing.
    pub fn word_add(&mut self, word: &str) -> WordId {
        if let Some(&wid) = self.word_index.get(word) {
            return wid;
        }
        let wid = self.vocab.len() as WordId;
        self.vocab.push(word.to_string());
        self.silwords.push(false);
        self.altwords.push(false);
        self.word_index.insert(word.to_string(), wid);
        wid
    }

    pub fn word_str(&self, wid: WordId) -> Option<&str> {
        self.vocab.get(wid as usize).map(String::as_str)
    }

    /// Is this word a silence/filler word in this grammar?
    pub fn is_filler(&self, wid: WordId) -> bool {
        self.silwords.get(wid as usize).copied().unwrap_or(false)
    }

    /// Mark an existing word as a silence/filler word.
    pub fn mark_filler(&mut self, wid: WordId) {
        if let Some(slot) = self.silwords.get_mut(wid as usize) {
            *slot = true;
        }
    }

    // -------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------

    /// Word transitions from `from` to `to`.
    pub fn trans(&self, from: usize, to: usize) -> &[FsgLink] {
        self.trans
            .get(&(from, to))
            .map(Vec::as_slice)
            .unwrap_or(NO_LINKS)
    }

    /// The unique null transition from `from` to `to`, if any.
    pub fn null_trans(&self, from: usize, to: usize) -> Option<&FsgLink> {
        self.null_trans.get(&(from, to))
    }

    /// Add a word transition with a linear probability.
    pub fn add_trans(
        &mut self,
        from: usize,
        to: usize,
        prob: f64,
        word: &str,
    ) -> Result<(), FsgError> {
        self.check_state(from)?;
        self.check_state(to)?;
        let wid = self.word_add(word);
        let logs2prob = self.scaled_log(prob);
        self.push_link(FsgLink {
            from_state: from,
            to_state: to,
            logs2prob,
            wid: Some(wid),
        });
        Ok(())
    }

    /// Add a null transition with a linear probability.
    ///
    /// If a null transition already exists for the state pair, the better
    /// log probability wins.
    pub fn add_null_trans(&mut self, from: usize, to: usize, prob: f64) -> Result<(), FsgError> {
        self.check_state(from)?;
        self.check_state(to)?;
        let logs2prob = self.scaled_log(prob);
        self.merge_null(FsgLink {
            from_state: from,
            to_state: to,
            logs2prob,
            wid: None,
        });
        Ok(())
    }

    /// Compute the transitive closure of the null transitions, keeping the
    /// best score per state pair. Must run before the model is handed to
    /// the decoder; the search propagates null transitions one hop only.
    pub fn null_trans_closure(&mut self) {
        loop {
            let pairs: Vec<FsgLink> = self.null_trans.values().copied().collect();
            let mut changed = false;
            for a in &pairs {
                for b in &pairs {
                    if a.to_state != b.from_state {
                        continue;
                    }
                    let composed = FsgLink {
                        from_state: a.from_state,
                        to_state: b.to_state,
                        logs2prob: a.logs2prob + b.logs2prob,
                        wid: None,
                    };
                    if self.merge_null(composed) {
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    // -------------------------------------------------------------------
    // Augmentation
    // -------------------------------------------------------------------

    /// Add a self-loop carrying a silence/filler word.
    ///
    /// `state == None` adds the loop on every state of the grammar.
    pub fn add_silence(&mut self, word: &str, state: Option<usize>, prob: f64) {
        let wid = self.word_add(word);
        self.silwords[wid as usize] = true;
        self.has_sil = true;
        let logs2prob = self.scaled_log(prob);
        let states: Vec<usize> = match state {
            Some(s) => vec![s],
            None => (0..self.n_state).collect(),
        };
        for s in states {
            self.push_link(FsgLink {
                from_state: s,
                to_state: s,
                logs2prob,
                wid: Some(wid),
            });
        }
    }

    /// Register `alt` as an alternate pronunciation of `base`: every
    /// transition carrying the base word gets a parallel transition with
    /// the alternate, at the same probability. Returns the number of
    /// transitions added.
    pub fn add_alt(&mut self, base: &str, alt: &str) -> Result<usize, FsgError> {
        let base_wid = self
            .word_id(base)
            .ok_or_else(|| FsgError::UnknownWord(base.to_string()))?;
        let alt_wid = self.word_add(alt);
        self.altwords[alt_wid as usize] = true;
        self.has_alt = true;

        let mut added = Vec::new();
        for links in self.trans.values() {
            for link in links {
                if link.wid == Some(base_wid) {
                    added.push(FsgLink {
                        wid: Some(alt_wid),
                        ..*link
                    });
                }
            }
        }
        let n = added.len();
        for link in added {
            self.push_link(link);
        }
        Ok(n)
    }

    // -------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------

    /// Log-scale a probability with the language weight folded in.
    fn scaled_log(&self, prob: f64) -> i32 {
        (self.lmath.log(prob) as f64 * self.lw) as i32
    }

    fn check_state(&self, state: usize) -> Result<(), FsgError> {
        if state >= self.n_state {
            Err(FsgError::StateOutOfRange {
                state,
                n_state: self.n_state,
            })
        } else {
            Ok(())
        }
    }

    fn push_link(&mut self, link: FsgLink) {
        self.trans
            .entry((link.from_state, link.to_state))
            .or_default()
            .push(link);
    }

    /// Insert a null link, keeping the better score on conflict. Returns
    /// whether the table changed.
    fn merge_null(&mut self, link: FsgLink) -> bool {
        let key = (link.from_state, link.to_state);
        match self.null_trans.get_mut(&key) {
            Some(existing) => {
                if link.logs2prob > existing.logs2prob {
                    existing.logs2prob = link.logs2prob;
                    true
                } else {
                    false
                }
            }
            None => {
                self.null_trans.insert(key, link);
                true
            }
        }
    }
}

impl std::fmt::Debug for FsgModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsgModel")
            .field("name", &self.name)
            .field("n_state", &self.n_state)
            .field("start_state", &self.start_state)
            .field("final_state", &self.final_state)
            .field("n_word", &self.vocab.len())
            .field("n_trans", &self.trans.values().map(Vec::len).sum::<usize>())
            .field("n_null_trans", &self.null_trans.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(n_state: usize) -> FsgModel {
        FsgModel::new("test", n_state, 0, n_state - 1, LogMath::default(), 1.0).unwrap()
    }

    #[test]
    fn rejects_out_of_range_states() {
        let err = FsgModel::new("bad", 3, 3, 2, LogMath::default(), 1.0).unwrap_err();
        assert!(matches!(err, FsgError::StateOutOfRange { state: 3, .. }));

        let mut m = model(3);
        assert!(m.add_trans(0, 7, 1.0, "x").is_err());
    }

    #[test]
    fn word_add_is_idempotent() {
        let mut m = model(2);
        let a = m.word_add("hello");
        let b = m.word_add("hello");
        assert_eq!(a, b);
        assert_eq!(m.n_word(), 1);
        assert_eq!(m.word_str(a), Some("hello"));
        assert_eq!(m.word_id("hello"), Some(a));
        assert_eq!(m.word_id("unknown"), None);
    }

    #[test]
    fn transitions_are_grouped_by_state_pair() {
        let mut m = model(3);
        m.add_trans(0, 1, 0.5, "a").unwrap();
        m.add_trans(0, 1, 0.5, "b").unwrap();
        m.add_trans(1, 2, 1.0, "c").unwrap();

        assert_eq!(m.trans(0, 1).len(), 2);
        assert_eq!(m.trans(1, 2).len(), 1);
        assert!(m.trans(2, 0).is_empty());
    }

    #[test]
    fn null_trans_keeps_best_score() {
        let mut m = model(2);
        m.add_null_trans(0, 1, 0.25).unwrap();
        m.add_null_trans(0, 1, 0.5).unwrap();
        let l = m.null_trans(0, 1).unwrap();
        assert_eq!(l.logs2prob, m.lmath().log(0.5));
        m.add_null_trans(0, 1, 0.1).unwrap();
        assert_eq!(m.null_trans(0, 1).unwrap().logs2prob, m.lmath().log(0.5));
    }

    #[test]
    fn null_closure_composes_chains() {
        let mut m = model(4);
        m.add_null_trans(0, 1, 1.0).unwrap();
        m.add_null_trans(1, 2, 0.5).unwrap();
        m.add_null_trans(2, 3, 0.5).unwrap();
        m.null_trans_closure();

        // One-hop lookups now cover the whole chain.
        assert!(m.null_trans(0, 2).is_some());
        assert!(m.null_trans(0, 3).is_some());
        assert!(m.null_trans(1, 3).is_some());
        let direct = m.null_trans(0, 3).unwrap().logs2prob;
        let expected = m.lmath().log(0.25);
        assert!((direct - expected).abs() <= 2);
    }

    #[test]
    fn null_closure_prefers_better_path() {
        let mut m = model(3);
        m.add_null_trans(0, 1, 1.0).unwrap();
        m.add_null_trans(1, 2, 0.9).unwrap();
        m.add_null_trans(0, 2, 0.1).unwrap();
        m.null_trans_closure();
        // 1.0 * 0.9 beats the direct 0.1 link.
        let l = m.null_trans(0, 2).unwrap();
        assert!((l.logs2prob - m.lmath().log(0.9)).abs() <= 2);
    }

    #[test]
    fn add_silence_loops_every_state() {
        let mut m = model(3);
        m.add_silence("<sil>", None, 0.1);
        assert!(m.has_sil());
        let wid = m.word_id("<sil>").unwrap();
        assert!(m.is_filler(wid));
        for s in 0..3 {
            let loops = m.trans(s, s);
            assert_eq!(loops.len(), 1);
            assert_eq!(loops[0].wid, Some(wid));
        }
    }

    #[test]
    fn add_alt_duplicates_base_transitions() {
        let mut m = model(3);
        m.add_trans(0, 1, 1.0, "read").unwrap();
        m.add_trans(1, 2, 1.0, "read").unwrap();
        m.add_trans(0, 2, 1.0, "write").unwrap();

        let n = m.add_alt("read", "read(2)").unwrap();
        assert_eq!(n, 2);
        assert!(m.has_alt());

        let alt_wid = m.word_id("read(2)").unwrap();
        assert_eq!(m.trans(0, 1).len(), 2);
        assert!(m.trans(0, 1).iter().any(|l| l.wid == Some(alt_wid)));
        assert_eq!(m.trans(0, 2).len(), 1);

        assert!(m.add_alt("missing", "missing(2)").is_err());
    }
}
