// Result extraction: hypothesis strings, segmentations and posteriors.
//
// A hypothesis is the predecessor chain of the best word exit in the last
// produced frame (restricted to exits reaching the grammar's final state
// once the utterance is complete). With best-path enabled and a finished
// utterance, extraction defers to the lattice instead.

use crate::acmod::AcousticScorer;
use crate::lattice::LatLinkId;
use crate::search::FsgSearch;

/// One word of a segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub word: String,
    /// Start frame.
    pub sf: i32,
    /// End frame.
    pub ef: i32,
    /// Acoustic span score.
    pub ascr: i32,
    /// Grammar transition score.
    pub lscr: i32,
    /// Language backoff marker; a grammar transition is always "order 1".
    pub lback: i32,
    /// Log posterior, when computed (0 otherwise).
    pub prob: i32,
}

impl<A: AcousticScorer> FsgSearch<A> {
    /// Best word exit in `frame_cap` (or the last produced frame when
    /// `frame_cap == -1`). With `require_final`, only exits whose link
    /// reaches the grammar's final state qualify. Returns the history
    /// index and its score.
    fn find_exit(&self, frame_cap: i32, require_final: bool) -> Option<(usize, i32)> {
        let n = self.history.n_entries();
        if n <= 1 {
            return None;
        }
        let cap = if frame_cap == -1 {
            self.frame - 1
        } else {
            frame_cap
        };

        // Scan back to the last frame at or below the cap.
        let mut bpidx = n - 1;
        while bpidx > 0 && self.history.entry(bpidx).frame > cap {
            bpidx -= 1;
        }
        if bpidx == 0 {
            return None;
        }
        let target = self.history.entry(bpidx).frame;

        let fsg = self.fsgs.selected()?;
        let fsg = fsg.borrow();
        let mut best: Option<(usize, i32)> = None;
        while bpidx > 0 {
            let e = self.history.entry(bpidx);
            if e.frame != target {
                break;
            }
            let qualifies = !require_final
                || e.link
                    .as_ref()
                    .is_some_and(|l| l.to_state == fsg.final_state());
            if qualifies && best.map_or(true, |(_, s)| e.score > s) {
                best = Some((bpidx, e.score));
            }
            bpidx -= 1;
        }

        if best.is_none() {
            log::info!("no word exit reaches the final state in frame {target}");
        }
        best
    }

    /// The current hypothesis string and its score. `None` when nothing
    /// qualifying has been decoded (yet).
    ///
    /// Fillers and null transitions are omitted; a grammar whose best path
    /// is null transitions only yields an empty string.
    pub fn hyp(&mut self) -> Option<(String, i32)> {
        let (bpidx, score) = self.find_exit(self.frame, self.final_utt)?;

        if self.bestpath && self.final_utt {
            let (link, path_score) = self.bestpath_link()?;
            let dag = self.dag.as_ref()?;
            return Some((dag.hyp(link), path_score));
        }

        let fsg = self.fsgs.selected()?;
        let fsg = fsg.borrow();
        let dict = self.dict();
        let mut words: Vec<String> = Vec::new();
        let mut bp = bpidx as i32;
        while bp > 0 {
            let e = self.history.entry(bp as usize);
            bp = e.pred;
            let Some(wid) = e.link.as_ref().and_then(|l| l.wid) else {
                continue;
            };
            if fsg.is_filler(wid) {
                continue;
            }
            let Some(word) = fsg.word_str(wid) else {
                continue;
            };
            // Alternate pronunciations report their base word.
            let base = dict
                .to_id(word)
                .map(|dw| dict.base_wid(dw))
                .and_then(|bw| dict.word_str(bw))
                .unwrap_or(word);
            words.push(base.to_string());
        }
        words.reverse();
        Some((words.join(" "), score))
    }

    /// Per-word segmentation of the current hypothesis, in time order.
    /// Null-transition entries appear with their span collapsed to the
    /// end frame.
    pub fn seg_iter(&mut self) -> Option<std::vec::IntoIter<Segment>> {
        let (bpidx, _) = self.find_exit(self.frame, self.final_utt)?;

        if self.bestpath && self.final_utt {
            let (link, _) = self.bestpath_link()?;
            let dag = self.dag.as_ref()?;
            return Some(dag.seg_iter(link).into_iter());
        }

        let mut chain = Vec::new();
        let mut bp = bpidx as i32;
        while bp > 0 {
            chain.push(bp as usize);
            bp = self.history.entry(bp as usize).pred;
        }
        chain.reverse();
        if chain.is_empty() {
            return None;
        }

        let fsg = self.fsgs.selected()?;
        let fsg = fsg.borrow();
        let mut segs = Vec::with_capacity(chain.len());
        for idx in chain {
            let e = self.history.entry(idx);
            let Some(link) = e.link.as_ref() else {
                continue;
            };
            let (pred_score, pred_frame) = if e.pred >= 0 {
                let p = self.history.entry(e.pred as usize);
                (p.score, p.frame)
            } else {
                (0, -1)
            };
            let word = link
                .wid
                .and_then(|w| fsg.word_str(w))
                .unwrap_or_default()
                .to_string();
            let lscr = link.logs2prob;
            let ef = e.frame;
            // FIXME: cross-word triphone attribution in this span score
            // is approximate.
            let ascr = e.score - pred_score - lscr;
            let sf = (pred_frame + 1).min(ef);
            segs.push(Segment {
                word,
                sf,
                ef,
                ascr,
                lscr,
                lback: 1,
                prob: 0,
            });
        }
        Some(segs.into_iter())
    }

    /// Log posterior of the final hypothesis; 0 unless best-path runs.
    pub fn prob(&mut self) -> i32 {
        if self.bestpath && self.final_utt {
            if self.bestpath_link().is_none() {
                return 0;
            }
            self.post
        } else {
            0
        }
    }

    /// Run (or reuse) the lattice best-path search; also fills in the
    /// posterior so segmentations can report probabilities.
    fn bestpath_link(&mut self) -> Option<(LatLinkId, i32)> {
        self.lattice()?;
        if self.last_link.is_none() {
            let lmath = *self.lmath();
            let ascale = self.ascale;
            let dag = self.dag.as_mut()?;
            let link = dag.bestpath()?;
            self.last_link = Some(link);
            if self.post == 0 {
                self.post = dag.posterior(&lmath, ascale, link);
            }
        }
        let link = self.last_link?;
        let dag = self.dag.as_ref()?;
        let score = dag.link(link).path_scr + dag.final_node_ascr();
        Some((link, score))
    }
}
