// The frame engine.
//
// One `FsgSearch` owns the HMM context, the history table, the compiled
// lextree and both active-node sets, and drives them one acoustic frame at
// a time: activate -> score -> evaluate -> prune/propagate -> word exits ->
// null closure -> cross-word transitions -> active-set rotation. The stage
// order is load-bearing: null closure must observe the frame's word exits,
// and cross-word transitions must observe the null-propagated entries.
//
// The engine is single-threaded and cooperative; `step` is the only
// suspension point and returns `false` when no frame is buffered.

use std::rc::Rc;

use kuule_fsg::{read_fsg_file, Dict, FsgModel, LogMath, WORST_SCORE};

use crate::acmod::AcousticScorer;
use crate::config::DecoderConfig;
use crate::ctxt::PhoneCtxt;
use crate::history::HistoryTable;
use crate::hmm::HmmContext;
use crate::lattice::Lattice;
use crate::lextree::{Lextree, PNodeId};
use crate::set::{FsgSet, SharedFsg};
use crate::SearchError;

/// Floor for the dynamic beam-narrowing factor.
const BEAM_FACTOR_FLOOR: f32 = 0.1;
/// Per-frame shrink applied to the beam factor while over the HMM cap.
const BEAM_FACTOR_SHRINK: f32 = 0.9;

/// The FSM-constrained Viterbi beam search.
pub struct FsgSearch<A: AcousticScorer> {
    config: DecoderConfig,
    lmath: LogMath,
    acmod: A,
    dict: Rc<Dict>,
    hmmctx: HmmContext,

    pub(crate) fsgs: FsgSet,
    lextree: Option<Lextree>,
    pub(crate) history: HistoryTable,

    active_cur: Vec<PNodeId>,
    active_next: Vec<PNodeId>,

    pub(crate) frame: i32,
    bestscore: i32,
    bpidx_start: usize,
    pub(crate) final_utt: bool,

    beam: i32,
    pbeam: i32,
    wbeam: i32,
    beam_orig: i32,
    pbeam_orig: i32,
    wbeam_orig: i32,
    beam_factor: f32,

    /// Word/phone insertion penalties, log domain, language weight applied.
    pub(crate) wip: i32,
    pub(crate) pip: i32,
    /// Inverse acoustic scale for posteriors.
    pub(crate) ascale: f64,
    pub(crate) bestpath: bool,

    n_hmm_eval: u64,
    n_sen_eval: u64,
    n_lattice_built: u32,

    pub(crate) dag: Option<Lattice>,
    pub(crate) last_link: Option<usize>,
    pub(crate) post: i32,
}

impl<A: AcousticScorer> FsgSearch<A> {
    /// Create a search over the given scorer, HMM context and dictionary.
    ///
    /// If the configuration names a grammar file, it is read, added,
    /// selected and compiled before this returns.
    pub fn new(
        config: DecoderConfig,
        acmod: A,
        hmmctx: HmmContext,
        dict: Rc<Dict>,
    ) -> Result<Self, SearchError> {
        let lmath = LogMath::new(config.log_base);

        let beam = lmath.log(config.beam);
        let pbeam = lmath.log(config.pbeam);
        let wbeam = lmath.log(config.wbeam);
        let wip = (lmath.log(config.wip) as f64 * config.lw) as i32;
        let pip = (lmath.log(config.pip) as f64 * config.lw) as i32;
        log::info!(
            "fsg search: beam {beam}, pbeam {pbeam}, wbeam {wbeam}; wip {wip}, pip {pip}"
        );

        let ascale = 1.0 / config.ascale;
        let bestpath = config.bestpath;
        let fsg_path = config.fsg_path.clone();
        let lw = config.lw;

        let mut search = Self {
            config,
            lmath,
            acmod,
            dict,
            hmmctx,
            fsgs: FsgSet::new(),
            lextree: None,
            history: HistoryTable::new(),
            active_cur: Vec::new(),
            active_next: Vec::new(),
            frame: -1,
            bestscore: 0,
            bpidx_start: 0,
            final_utt: false,
            beam,
            pbeam,
            wbeam,
            beam_orig: beam,
            pbeam_orig: pbeam,
            wbeam_orig: wbeam,
            beam_factor: 1.0,
            wip,
            pip,
            ascale,
            bestpath,
            n_hmm_eval: 0,
            n_sen_eval: 0,
            n_lattice_built: 0,
            dag: None,
            last_link: None,
            post: 0,
        };

        if let Some(path) = fsg_path {
            let fsg = read_fsg_file(&path, lmath, lw)?;
            let name = fsg.name().to_string();
            search.add_fsg(None, fsg)?;
            search.select_fsg(&name)?;
            search.reinit()?;
        }

        Ok(search)
    }

    // -------------------------------------------------------------------
    // Grammar set management
    // -------------------------------------------------------------------

    /// Add a grammar under `name` (or under its own name). Depending on
    /// configuration the grammar is augmented with silence/filler
    /// self-loops and with dictionary alternate pronunciations first.
    pub fn add_fsg(
        &mut self,
        name: Option<&str>,
        mut fsg: FsgModel,
    ) -> Result<SharedFsg, SearchError> {
        if self.config.fsg_use_filler && !fsg.has_sil() {
            self.add_silences(&mut fsg);
        }
        if self.config.fsg_use_altpron && !fsg.has_alt() {
            self.add_altpron(&mut fsg)?;
        }
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| fsg.name().to_string());
        self.fsgs.insert(&name, fsg)
    }

    /// Remove a grammar by name. Removing the selected grammar tears down
    /// the compiled lextree and detaches the history first.
    pub fn remove_fsg(&mut self, name: &str) -> Option<SharedFsg> {
        let was_selected = match (self.fsgs.get(name), self.fsgs.selected()) {
            (Some(named), Some(cur)) => Rc::ptr_eq(&named, &cur),
            _ => false,
        };
        let removed = self.fsgs.remove(name);
        if removed.is_none() {
            log::error!("grammar `{name}` to be removed not found");
            return None;
        }
        if was_selected {
            self.lextree = None;
            self.history.set_fsg(None, None);
            self.dag = None;
            self.last_link = None;
            self.post = 0;
        }
        removed
    }

    /// Make the named grammar current. Switching invalidates the compiled
    /// lextree and the history's grammar binding; call [`Self::reinit`]
    /// before the next utterance.
    pub fn select_fsg(&mut self, name: &str) -> Result<(), SearchError> {
        if let Err(e) = self.fsgs.select(name) {
            log::error!("cannot select grammar: {e}");
            return Err(e);
        }
        self.lextree = None;
        self.history.set_fsg(None, None);
        self.dag = None;
        self.last_link = None;
        self.post = 0;
        Ok(())
    }

    /// Compile the selected grammar: build the lextree and bind the
    /// history to the (grammar, dictionary) pair.
    pub fn reinit(&mut self) -> Result<(), SearchError> {
        let fsg = self.fsgs.selected().ok_or(SearchError::NoFsgSelected)?;
        let tree = Lextree::build(
            &fsg.borrow(),
            &self.dict,
            &self.hmmctx,
            self.wip,
            self.pip,
        )?;
        log::info!(
            "compiled grammar `{}`: {} pnodes",
            fsg.borrow().name(),
            tree.n_pnode()
        );
        self.lextree = Some(tree);
        self.history.set_fsg(Some(fsg), Some(self.dict.clone()));
        Ok(())
    }

    /// Silence/filler augmentation: a `<sil>` self-loop on every state,
    /// then one self-loop per filler word. Fillers are the dictionary
    /// words after `<sil>`, except the sentence delimiters.
    fn add_silences(&self, fsg: &mut FsgModel) -> usize {
        fsg.add_silence("<sil>", None, self.config.silprob);
        let Some(sil_wid) = self.dict.to_id("<sil>") else {
            log::warn!("dictionary has no <sil> word; filler self-loops skipped");
            return 0;
        };
        let mut n = 0;
        for wid in (sil_wid + 1)..self.dict.n_words() as u32 {
            let Some(word) = self.dict.word_str(wid) else {
                continue;
            };
            if word == "<s>" || word == "</s>" {
                log::warn!("sentence delimiter `{word}` found after <sil>; not a filler");
                continue;
            }
            let word = word.to_string();
            fsg.add_silence(&word, None, self.config.fillprob);
            n += 1;
        }
        n
    }

    /// Alternate-pronunciation augmentation: every grammar word with
    /// dictionary alternates gets each alternate registered as an alias on
    /// its transitions.
    fn add_altpron(&self, fsg: &mut FsgModel) -> Result<usize, SearchError> {
        let words: Vec<String> = (0..fsg.n_word() as u32)
            .filter_map(|wid| fsg.word_str(wid).map(String::from))
            .collect();
        let mut n = 0;
        for word in words {
            let Some(mut wid) = self.dict.to_id(&word) else {
                continue;
            };
            while let Some(alt) = self.dict.next_alt(wid) {
                if let Some(alt_str) = self.dict.word_str(alt) {
                    fsg.add_alt(&word, alt_str)?;
                    n += 1;
                }
                wid = alt;
            }
        }
        Ok(n)
    }

    // -------------------------------------------------------------------
    // Utterance processing
    // -------------------------------------------------------------------

    /// Begin an utterance: reset beams and history, seed the sentinel
    /// entry, and expand null and cross-word transitions out of the
    /// grammar's start state.
    ///
    /// # Panics
    ///
    /// Panics if the previous utterance was not closed with
    /// [`Self::finish`].
    pub fn start(&mut self) -> Result<(), SearchError> {
        let fsg = self.fsgs.selected().ok_or(SearchError::NoFsgSelected)?;
        let Some(mut lextree) = self.lextree.take() else {
            return Err(SearchError::NotCompiled);
        };

        self.beam_factor = 1.0;
        self.beam = self.beam_orig;
        self.pbeam = self.pbeam_orig;
        self.wbeam = self.wbeam_orig;

        assert!(
            self.active_cur.is_empty() && self.active_next.is_empty(),
            "start() while an utterance is in progress"
        );

        self.history.reset();
        self.history.utt_start();
        self.final_utt = false;

        self.frame = -1;
        self.bestscore = 0;
        self.bpidx_start = 0;

        // Sentinel entry leading out of the start state: silence left
        // context, all right contexts.
        let silphone = self.dict.phones().silence();
        let all_ctxt = PhoneCtxt::all(self.dict.phones().len());
        self.history.add(None, -1, 0, -1, silphone, all_ctxt);

        {
            let fsg = fsg.borrow();
            self.null_prop(&fsg);
            self.word_trans(&mut lextree, &fsg);
        }
        self.lextree = Some(lextree);

        self.active_cur = std::mem::take(&mut self.active_next);
        self.frame += 1;

        self.n_hmm_eval = 0;
        self.n_sen_eval = 0;
        Ok(())
    }

    /// Decode one acoustic frame. Returns `false` when no frame is
    /// buffered (no state changes in that case).
    pub fn step(&mut self) -> bool {
        if self.acmod.n_feat_frame() == 0 {
            return false;
        }
        let Some(fsg) = self.fsgs.selected() else {
            log::error!("step() with no grammar selected");
            return false;
        };
        let Some(mut lextree) = self.lextree.take() else {
            log::error!("step() with no compiled grammar");
            return false;
        };

        // a. Senone activation.
        if !self.acmod.compute_all_senones() {
            self.sen_active(&lextree);
        }

        // b. Acoustic scoring.
        let Some(frame_scores) = self.acmod.score() else {
            self.lextree = Some(lextree);
            return false;
        };
        self.n_sen_eval += self.acmod.n_senone_active() as u64;
        self.hmmctx.set_senscore(&frame_scores.senscr);

        self.bpidx_start = self.history.n_entries();

        // c. HMM evaluation and dynamic beam adaptation.
        self.hmm_eval(&mut lextree);

        {
            let fsg = fsg.borrow();
            // d. Prune survivors, propagate into children, record word
            // exits. Exits are tentative until the frame is closed.
            self.prune_prop(&mut lextree, &fsg);
            self.history.end_frame();

            // e. Propagate the frame's entries through null transitions.
            self.null_prop(&fsg);
            self.history.end_frame();

            // f. Cross-word transitions into lextree roots.
            self.word_trans(&mut lextree, &fsg);
        }

        // g. Deactivate HMMs that did not survive, rotate active sets.
        let cur = std::mem::take(&mut self.active_cur);
        for &id in &cur {
            if lextree.pnode(id).hmm.frame() == self.frame {
                lextree.deactivate(id);
            } else {
                debug_assert_eq!(lextree.pnode(id).hmm.frame(), self.frame + 1);
            }
        }
        self.active_cur = std::mem::take(&mut self.active_next);
        self.frame += 1;

        self.lextree = Some(lextree);
        true
    }

    /// Close the utterance: deactivate everything and log statistics.
    pub fn finish(&mut self) {
        if let Some(lextree) = self.lextree.as_mut() {
            for &id in &self.active_cur {
                lextree.deactivate(id);
            }
            for &id in &self.active_next {
                lextree.deactivate(id);
            }
        }
        self.active_cur.clear();
        self.active_next.clear();
        self.final_utt = true;

        let frames = self.frame.max(0) as u64;
        let per_frame = |n: u64| if frames > 0 { n / frames } else { 0 };
        log::info!(
            "{} frames, {} HMMs ({}/fr), {} senones ({}/fr), {} history entries",
            self.frame,
            self.n_hmm_eval,
            per_frame(self.n_hmm_eval),
            self.n_sen_eval,
            per_frame(self.n_sen_eval),
            self.history.n_entries()
        );

        if let Some(lextree) = &self.lextree {
            let ceiling = lextree.n_pnode() as u64 * frames;
            if self.n_hmm_eval > ceiling {
                log::error!(
                    "HMM evaluation count {} exceeds {} pnodes x {} frames",
                    self.n_hmm_eval,
                    lextree.n_pnode(),
                    frames
                );
            }
        }
    }

    // -------------------------------------------------------------------
    // Frame sub-stages
    // -------------------------------------------------------------------

    /// Mark the senones of every active HMM for the acoustic scorer.
    fn sen_active(&mut self, lextree: &Lextree) {
        self.acmod.clear_active();
        let ctx = &self.hmmctx;
        for &id in &self.active_cur {
            let hmm = &lextree.pnode(id).hmm;
            debug_assert_eq!(hmm.frame(), self.frame);
            self.acmod.activate_hmm(hmm, ctx);
        }
    }

    /// Run Viterbi on every active HMM, track the frame's best score, and
    /// adapt the beams when the active count exceeds the configured cap.
    ///
    /// # Panics
    ///
    /// Panics if more HMMs are active than the lextree holds; the active
    /// sets are corrupt at that point.
    fn hmm_eval(&mut self, lextree: &mut Lextree) {
        if self.active_cur.is_empty() {
            log::error!("frame {}: no active HMM", self.frame);
            return;
        }

        let mut best = WORST_SCORE;
        let ctx = &self.hmmctx;
        for &id in &self.active_cur {
            let hmm = &mut lextree.pnode_mut(id).hmm;
            debug_assert_eq!(hmm.frame(), self.frame);
            let score = hmm.vit_eval(ctx);
            if score > best {
                best = score;
            }
        }
        let n = self.active_cur.len();
        self.n_hmm_eval += n as u64;

        let maxhmmpf = self.config.maxhmmpf;
        if maxhmmpf != -1 && n as i32 > maxhmmpf {
            // Over the cap: narrow all beams, down to a floor.
            if self.beam_factor > BEAM_FACTOR_FLOOR {
                self.beam_factor *= BEAM_FACTOR_SHRINK;
                self.beam = (self.beam_orig as f32 * self.beam_factor) as i32;
                self.pbeam = (self.pbeam_orig as f32 * self.beam_factor) as i32;
                self.wbeam = (self.wbeam_orig as f32 * self.beam_factor) as i32;
            }
        } else {
            self.beam_factor = 1.0;
            self.beam = self.beam_orig;
            self.pbeam = self.pbeam_orig;
            self.wbeam = self.wbeam_orig;
        }

        if n > lextree.n_pnode() {
            panic!(
                "frame {}: {} HMMs evaluated exceeds the {} pnodes in the lextree",
                self.frame,
                n,
                lextree.n_pnode()
            );
        }

        self.bestscore = best;
    }

    /// Beam-prune the evaluated HMMs; survivors stay active, non-leaves
    /// propagate into their children, leaves record word exits.
    fn prune_prop(&mut self, lextree: &mut Lextree, fsg: &FsgModel) {
        debug_assert!(self.active_next.is_empty());
        let thresh = self.bestscore + self.beam;
        let phone_thresh = self.bestscore + self.pbeam;
        let word_thresh = self.bestscore + self.wbeam;

        let cur = std::mem::take(&mut self.active_cur);
        for &id in &cur {
            let (best, frame, leaf, out_score) = {
                let p = lextree.pnode(id);
                (p.hmm.bestscore(), p.hmm.frame(), p.leaf, p.hmm.out_score())
            };
            if best < thresh {
                continue;
            }
            if frame == self.frame {
                lextree.pnode_mut(id).hmm.set_frame(self.frame + 1);
                self.active_next.push(id);
            } else {
                debug_assert_eq!(frame, self.frame + 1);
            }
            if !leaf {
                if out_score >= phone_thresh {
                    self.pnode_trans(lextree, id);
                }
            } else if out_score >= word_thresh {
                self.pnode_exit(lextree, fsg, id);
            }
        }
        self.active_cur = cur;
    }

    /// Transition out of a phone into its children within the word.
    fn pnode_trans(&mut self, lextree: &mut Lextree, id: PNodeId) {
        let nf = self.frame + 1;
        let thresh = self.bestscore + self.beam;
        let (out_score, out_hist) = {
            let hmm = &lextree.pnode(id).hmm;
            (hmm.out_score(), hmm.out_history())
        };

        let mut child = lextree.pnode(id).first_child;
        while let Some(c) = child {
            child = lextree.pnode(c).sibling;
            let newscore = out_score + lextree.pnode(c).logs2prob;
            let hmm = &mut lextree.pnode_mut(c).hmm;
            if newscore >= thresh && newscore > hmm.in_score() {
                if hmm.frame() < nf {
                    self.active_next.push(c);
                }
                hmm.enter(newscore, out_hist, nf);
            }
        }
    }

    /// Record a word exit from a leaf into the history table.
    fn pnode_exit(&mut self, lextree: &Lextree, fsg: &FsgModel, id: PNodeId) {
        let p = lextree.pnode(id);
        debug_assert!(p.leaf);
        let Some(link) = p.fsglink else {
            return;
        };
        let Some(wid) = link.wid else {
            return;
        };

        // Filler and single-phone words do not model right context; their
        // exit score applies to every right context.
        let single_phone = fsg
            .word_str(wid)
            .and_then(|w| self.dict.to_id(w))
            .map(|dw| self.dict.pronlen(dw) == 1)
            .unwrap_or(false);
        let rc = if fsg.is_filler(wid) || single_phone {
            PhoneCtxt::all(self.dict.phones().len())
        } else {
            p.ctxt.clone()
        };

        self.history.add(
            Some(link),
            self.frame,
            p.hmm.out_score(),
            p.hmm.out_history(),
            p.ci_ext,
            rc,
        );
    }

    /// Propagate the frame's new history entries through null transitions.
    /// One hop suffices: the grammar's null closure is precomputed.
    fn null_prop(&mut self, fsg: &FsgModel) {
        let thresh = self.bestscore + self.wbeam; // which beam, really?
        let n_entries = self.history.n_entries();

        for bpidx in self.bpidx_start..n_entries {
            let (frame, score, lc, rc, src) = {
                let e = self.history.entry(bpidx);
                let src = e
                    .link
                    .as_ref()
                    .map(|l| l.to_state)
                    .unwrap_or(fsg.start_state());
                (e.frame, e.score, e.lc, e.rc.clone(), src)
            };
            for d in 0..fsg.n_state() {
                if let Some(&null_link) = fsg.null_trans(src, d) {
                    let newscore = score + null_link.logs2prob;
                    if newscore >= thresh {
                        self.history.add(
                            Some(null_link),
                            frame,
                            newscore,
                            bpidx as i32,
                            lc,
                            rc.clone(),
                        );
                    }
                }
            }
        }
    }

    /// Cross-word transitions: propagate each of the frame's history
    /// entries into the lextree roots attached to its destination state,
    /// subject to left/right context admission.
    fn word_trans(&mut self, lextree: &mut Lextree, fsg: &FsgModel) {
        let thresh = self.bestscore + self.beam;
        let nf = self.frame + 1;
        let n_entries = self.history.n_entries();

        for bpidx in self.bpidx_start..n_entries {
            let (score, lc, rc, dest) = {
                let e = self.history.entry(bpidx);
                debug_assert_eq!(e.frame, self.frame);
                let dest = e
                    .link
                    .as_ref()
                    .map(|l| l.to_state)
                    .unwrap_or(fsg.start_state());
                (e.score, e.lc, e.rc.clone(), dest)
            };

            let mut root = lextree.root_head(dest);
            while let Some(r) = root {
                root = lextree.pnode(r).sibling;
                let admitted = {
                    let p = lextree.pnode(r);
                    p.ctxt.contains(lc) && rc.contains(p.ci_ext)
                };
                if !admitted {
                    continue;
                }
                let newscore = score + lextree.pnode(r).logs2prob;
                let hmm = &mut lextree.pnode_mut(r).hmm;
                if newscore >= thresh && newscore > hmm.in_score() {
                    if hmm.frame() < nf {
                        self.active_next.push(r);
                    }
                    hmm.enter(newscore, bpidx as i32, nf);
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Lattice access
    // -------------------------------------------------------------------

    /// Build (or reuse) the word lattice over the frames decoded so far.
    ///
    /// The lattice is memoised per frame count: repeated calls without an
    /// intervening `step` return the cached graph. Returns `None` when a
    /// start or end node cannot be constructed.
    pub fn lattice(&mut self) -> Option<&Lattice> {
        if self
            .dag
            .as_ref()
            .is_some_and(|d| d.n_frames() == self.frame)
        {
            return self.dag.as_ref();
        }
        self.dag = None;
        self.last_link = None;
        self.post = 0;

        let fsg = self.fsgs.selected()?;
        let silpen = (self.lmath.log(self.config.silprob) as f64 * self.config.lw) as i32;
        let fillpen = (self.lmath.log(self.config.fillprob) as f64 * self.config.lw) as i32;
        let dag = Lattice::build(
            &self.history,
            &mut fsg.borrow_mut(),
            &self.dict,
            self.frame,
            silpen,
            fillpen,
        )?;
        self.n_lattice_built += 1;
        self.dag = Some(dag);
        self.dag.as_ref()
    }

    // -------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn is_final(&self) -> bool {
        self.final_utt
    }

    pub fn bestscore(&self) -> i32 {
        self.bestscore
    }

    pub fn beam_factor(&self) -> f32 {
        self.beam_factor
    }

    /// Current (possibly narrowed) beam widths: (beam, pbeam, wbeam).
    pub fn beams(&self) -> (i32, i32, i32) {
        (self.beam, self.pbeam, self.wbeam)
    }

    pub fn n_hmm_eval(&self) -> u64 {
        self.n_hmm_eval
    }

    /// Number of lattices built so far (memoised reuses do not count).
    pub fn n_lattice_built(&self) -> u32 {
        self.n_lattice_built
    }

    pub fn history(&self) -> &HistoryTable {
        &self.history
    }

    pub fn lextree(&self) -> Option<&Lextree> {
        self.lextree.as_ref()
    }

    pub fn fsg_set(&self) -> &FsgSet {
        &self.fsgs
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub fn lmath(&self) -> &LogMath {
        &self.lmath
    }

    /// The active pnodes of the current frame.
    pub fn active_pnodes(&self) -> &[PNodeId] {
        &self.active_cur
    }

    pub fn acmod(&self) -> &A {
        &self.acmod
    }

    pub fn acmod_mut(&mut self) -> &mut A {
        &mut self.acmod
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acmod::TableScorer;
    use kuule_fsg::dict::PhoneSet;

    fn search() -> FsgSearch<TableScorer> {
        let mut phones = PhoneSet::new();
        let y = phones.add("Y");
        let sil = phones.silence();
        let mut dict = Dict::new(phones);
        dict.add_word("YES", &[y], false).unwrap();
        dict.add_word("<sil>", &[sil], true).unwrap();

        let n_phone = dict.phones().len();
        let tp = vec![
            vec![-100, -120, WORST_SCORE, WORST_SCORE],
            vec![WORST_SCORE, -100, -120, WORST_SCORE],
            vec![WORST_SCORE, WORST_SCORE, -100, -120],
        ];
        let sseq = (0..n_phone).map(|p| vec![p, p, p]).collect();
        let ctx = HmmContext::new(3, tp, sseq);
        let scorer = TableScorer::new(n_phone);

        FsgSearch::new(DecoderConfig::default(), scorer, ctx, Rc::new(dict)).unwrap()
    }

    fn grammar(search: &FsgSearch<TableScorer>) -> FsgModel {
        let mut fsg =
            FsgModel::new("g", 2, 0, 1, *search.lmath(), search.config.lw).unwrap();
        fsg.add_trans(0, 1, 1.0, "YES").unwrap();
        fsg
    }

    #[test]
    fn start_requires_a_selected_grammar() {
        let mut s = search();
        assert!(matches!(s.start(), Err(SearchError::NoFsgSelected)));

        let fsg = grammar(&s);
        s.add_fsg(Some("g"), fsg).unwrap();
        assert!(matches!(s.start(), Err(SearchError::NoFsgSelected)));

        s.select_fsg("g").unwrap();
        assert!(matches!(s.start(), Err(SearchError::NotCompiled)));

        s.reinit().unwrap();
        s.start().unwrap();
        assert_eq!(s.frame(), 0);
        assert!(!s.active_pnodes().is_empty());
        s.finish();
    }

    #[test]
    fn add_fsg_augments_with_fillers() {
        let mut s = search();
        let fsg = grammar(&s);
        let shared = s.add_fsg(Some("g"), fsg).unwrap();
        let fsg = shared.borrow();
        assert!(fsg.has_sil());
        let sil = fsg.word_id("<sil>").unwrap();
        assert!(fsg.is_filler(sil));
        assert_eq!(fsg.trans(0, 0).len(), 1);
        assert_eq!(fsg.trans(1, 1).len(), 1);
    }

    #[test]
    fn select_invalidates_compiled_state() {
        let mut s = search();
        let fsg = grammar(&s);
        s.add_fsg(Some("g"), fsg).unwrap();
        s.select_fsg("g").unwrap();
        s.reinit().unwrap();
        assert!(s.lextree().is_some());

        s.select_fsg("g").unwrap();
        assert!(s.lextree().is_none());
        assert!(matches!(s.start(), Err(SearchError::NotCompiled)));
    }

    #[test]
    fn remove_selected_tears_down() {
        let mut s = search();
        let fsg = grammar(&s);
        s.add_fsg(Some("g"), fsg).unwrap();
        s.select_fsg("g").unwrap();
        s.reinit().unwrap();

        assert!(s.remove_fsg("g").is_some());
        assert!(s.lextree().is_none());
        assert!(s.fsg_set().selected().is_none());
        assert!(s.remove_fsg("g").is_none());
    }

    #[test]
    fn step_without_frames_is_a_no_op() {
        let mut s = search();
        let fsg = grammar(&s);
        s.add_fsg(Some("g"), fsg).unwrap();
        s.select_fsg("g").unwrap();
        s.reinit().unwrap();
        s.start().unwrap();
        let entries = s.history().n_entries();
        assert!(!s.step());
        assert_eq!(s.frame(), 0);
        assert_eq!(s.history().n_entries(), entries);
        s.finish();
    }
}
