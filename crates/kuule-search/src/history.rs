// Append-only backpointer table.
//
// Every word exit (and every null-transition propagation of one) is
// recorded as an entry pointing at its predecessor; the chain of entries is
// the decoded word sequence, and the whole table is the raw material for
// lattice construction.
//
// Entries are added in non-decreasing frame order. `end_frame` closes the
// current stage: entries added afterwards may point at entries added before
// it, and duplicate suppression never crosses a stage boundary. Indices are
// stable for the lifetime of the utterance; a better duplicate overwrites
// its victim in place instead of appending.

use std::cell::RefCell;
use std::rc::Rc;

use kuule_fsg::dict::PhoneId;
use kuule_fsg::{Dict, FsgLink, FsgModel};

use crate::ctxt::PhoneCtxt;

/// One backpointer record.
#[derive(Debug, Clone)]
pub struct HistEntry {
    /// Grammar link taken at this word exit; the utterance-start sentinel
    /// has none.
    pub link: Option<FsgLink>,
    /// Frame in which the word ended.
    pub frame: i32,
    /// Accumulated path score at the exit.
    pub score: i32,
    /// Index of the predecessor entry, -1 for the sentinel.
    pub pred: i32,
    /// Last CI phone of the exiting word.
    pub lc: PhoneId,
    /// Right contexts this exit supports.
    pub rc: PhoneCtxt,
}

/// The backpointer table plus its grammar binding.
pub struct HistoryTable {
    entries: Vec<HistEntry>,
    /// Index of the first entry of the still-open stage.
    stage_start: usize,
    fsg: Option<Rc<RefCell<FsgModel>>>,
    dict: Option<Rc<Dict>>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            stage_start: 0,
            fsg: None,
            dict: None,
        }
    }

    /// Record a word exit (or a null propagation of one). Returns the index
    /// of the stored entry.
    ///
    /// Within the open stage, entries sharing (frame, destination state,
    /// last phone, right-context set) are coalesced: the better score wins
    /// and keeps the index of the first arrival.
    pub fn add(
        &mut self,
        link: Option<FsgLink>,
        frame: i32,
        score: i32,
        pred: i32,
        lc: PhoneId,
        rc: PhoneCtxt,
    ) -> usize {
        let dest = link.as_ref().map(|l| l.to_state);
        for i in self.stage_start..self.entries.len() {
            let e = &self.entries[i];
            if e.frame == frame
                && e.link.as_ref().map(|l| l.to_state) == dest
                && e.lc == lc
                && e.rc == rc
            {
                if score > e.score {
                    self.entries[i] = HistEntry {
                        link,
                        frame,
                        score,
                        pred,
                        lc,
                        rc,
                    };
                }
                return i;
            }
        }
        self.entries.push(HistEntry {
            link,
            frame,
            score,
            pred,
            lc,
            rc,
        });
        self.entries.len() - 1
    }

    pub fn entry(&self, idx: usize) -> &HistEntry {
        &self.entries[idx]
    }

    pub fn n_entries(&self) -> usize {
        self.entries.len()
    }

    /// Close the open stage. Idempotent; never invalidates indices.
    pub fn end_frame(&mut self) {
        self.stage_start = self.entries.len();
    }

    /// Discard all entries.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.stage_start = 0;
    }

    /// Mark the start of a new utterance.
    pub fn utt_start(&mut self) {
        debug_assert!(self.entries.is_empty(), "utt_start on a non-empty table");
        self.stage_start = self.entries.len();
    }

    /// Bind the table to a grammar/dictionary pair (or detach it with
    /// `None`). Rebinding discards all entries.
    pub fn set_fsg(&mut self, fsg: Option<Rc<RefCell<FsgModel>>>, dict: Option<Rc<Dict>>) {
        self.reset();
        self.fsg = fsg;
        self.dict = dict;
    }

    pub fn fsg(&self) -> Option<&Rc<RefCell<FsgModel>>> {
        self.fsg.as_ref()
    }

    pub fn dict(&self) -> Option<&Rc<Dict>> {
        self.dict.as_ref()
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self::new()
    }
}
