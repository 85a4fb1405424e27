// Word-lattice construction and algorithms.
//
// Every history entry is one link in the word graph; nodes are the unique
// (start-frame, word) pairs. The lattice is acyclic: word links always
// advance in time, and the only same-frame links are the epsilon links out
// of a synthesised start node, which has no entries of its own.
//
// Construction synthesises start/end nodes where the grammar produces more
// than one candidate, prunes nodes unreachable from the end, translates
// grammar word ids to dictionary ids, and adds filler-bypass links. The
// best-path and posterior passes run over the finished graph in
// topological order.

use hashbrown::HashMap;

use kuule_fsg::dict::DictWordId;
use kuule_fsg::{Dict, FsgModel, LogMath, WORST_SCORE};

use crate::history::HistoryTable;
use crate::output::Segment;

pub type LatNodeId = usize;
pub type LatLinkId = usize;

/// A lattice node: one word starting at one frame.
#[derive(Debug)]
pub struct LatNode {
    pub sf: i32,
    /// First (smallest) end frame over this node's exits.
    pub fef: i32,
    /// Last (largest) end frame.
    pub lef: i32,
    pub word: String,
    pub dict_wid: Option<DictWordId>,
    pub basewid: Option<DictWordId>,
    pub filler: bool,
    /// Best exit acoustic score; used when linking into a synthesised end.
    pub best_exit: i32,
    pub reachable: bool,
    pub entries: Vec<LatLinkId>,
    pub exits: Vec<LatLinkId>,
}

/// A lattice link with its best-path bookkeeping.
#[derive(Debug, Clone)]
pub struct LatLink {
    pub from: LatNodeId,
    pub to: LatNodeId,
    /// Acoustic score of the source word span (transition score folded in).
    pub ascr: i32,
    /// Frame in which the source word ends.
    pub ef: i32,
    pub path_scr: i32,
    pub best_prev: Option<LatLinkId>,
}

/// An acyclic word graph over one utterance.
pub struct Lattice {
    n_frames: i32,
    nodes: Vec<LatNode>,
    links: Vec<LatLink>,
    start: LatNodeId,
    end: LatNodeId,
    /// Acoustic score attributed to the final node itself (none so far;
    /// kept separate so best-path totals stay explicit).
    final_node_ascr: i32,
}

impl Lattice {
    // -------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------

    /// Build the lattice for `n_frames` decoded frames.
    ///
    /// Returns `None` (after logging) when no usable start or end node can
    /// be constructed, e.g. on an empty utterance.
    pub(crate) fn build(
        history: &HistoryTable,
        fsg: &mut FsgModel,
        dict: &Dict,
        n_frames: i32,
        silpen: i32,
        fillpen: i32,
    ) -> Option<Self> {
        let mut b = Builder {
            nodes: Vec::new(),
            links: Vec::new(),
            fsg_wids: Vec::new(),
            key: HashMap::new(),
        };

        // Pass 1: one node per unique (start-frame, word).
        for i in 0..history.n_entries() {
            let Some((wid, sf, ef, ascr)) = entry_span(history, i) else {
                continue;
            };
            b.upsert_node(sf, ef, wid, ascr);
        }

        // Pass 2: links, following each word's destination grammar state
        // one word (and at most one precomputed null hop) forward.
        for i in 0..history.n_entries() {
            let e = history.entry(i);
            let Some((wid, sf, ef, ascr)) = entry_span(history, i) else {
                continue;
            };
            let src = b.key[&(sf, wid)];
            let to_state = e.link.as_ref().map(|l| l.to_state).unwrap_or(0);
            let dest_sf = ef + 1;

            for j in 0..fsg.n_state() {
                for t in fsg.trans(to_state, j) {
                    if let Some(w2) = t.wid {
                        b.try_link(src, dest_sf, w2, ascr, ef);
                    }
                }
                if fsg.null_trans(to_state, j).is_some() {
                    for k in 0..fsg.n_state() {
                        for t in fsg.trans(j, k) {
                            if let Some(w2) = t.wid {
                                b.try_link(src, dest_sf, w2, ascr, ef);
                            }
                        }
                    }
                }
            }
        }

        // Start and end synthesis.
        let start = b.find_start_node(fsg);
        let end = b.find_end_node(fsg, n_frames);
        log::info!(
            "lattice start node {}.{} end node {}.{}",
            fsg.word_str(b.fsg_wids[start]).unwrap_or("?"),
            b.nodes[start].sf,
            fsg.word_str(b.fsg_wids[end]).unwrap_or("?"),
            b.nodes[end].sf
        );

        // Translate grammar word ids into dictionary ids; nodes carry the
        // base word, so alternate pronunciations collapse in the output.
        for (node, &wid) in b.nodes.iter_mut().zip(&b.fsg_wids) {
            let word = fsg.word_str(wid).unwrap_or_default();
            node.filler = fsg.is_filler(wid);
            node.dict_wid = dict.to_id(word);
            node.basewid = node.dict_wid.map(|w| dict.base_wid(w));
            node.word = node
                .basewid
                .and_then(|bw| dict.word_str(bw))
                .unwrap_or(word)
                .to_string();
        }

        // Reachability from the end node, then pruning.
        b.mark_reachable(end);
        if !b.nodes[start].reachable {
            log::error!("lattice start node does not reach the end node");
            return None;
        }
        let (nodes, links, start, end) = b.delete_unreachable(start, end);

        let mut dag = Self {
            n_frames,
            nodes,
            links,
            start,
            end,
            final_node_ascr: 0,
        };
        dag.bypass_fillers(silpen, fillpen);
        Some(dag)
    }

    /// Add bypass links around every filler node: each way into the filler
    /// is linked directly to each way out, at the entry score plus the
    /// silence/filler penalty.
    fn bypass_fillers(&mut self, silpen: i32, fillpen: i32) {
        for id in 0..self.nodes.len() {
            if !self.nodes[id].filler || id == self.end {
                continue;
            }
            let pen = if self.nodes[id].word == "<sil>" {
                silpen
            } else {
                fillpen
            };
            let entries = self.nodes[id].entries.clone();
            let exits = self.nodes[id].exits.clone();
            for &e in &entries {
                for &x in &exits {
                    let (from, ascr, ef) = {
                        let le = &self.links[e];
                        (le.from, le.ascr, le.ef)
                    };
                    let to = self.links[x].to;
                    if from != to {
                        self.add_link(from, to, ascr + pen, ef);
                    }
                }
            }
        }
    }

    /// Insert or improve a link; at most one link exists per (from, to).
    fn add_link(&mut self, from: LatNodeId, to: LatNodeId, ascr: i32, ef: i32) {
        link_nodes(&mut self.nodes, &mut self.links, from, to, ascr, ef);
    }

    // -------------------------------------------------------------------
    // Best path and posterior
    // -------------------------------------------------------------------

    /// Viterbi over the DAG. Returns the best link entering the end node
    /// and leaves per-link path scores and backpointers behind.
    pub fn bestpath(&mut self) -> Option<LatLinkId> {
        for l in &mut self.links {
            l.path_scr = WORST_SCORE;
            l.best_prev = None;
        }
        for &u in &self.topo_nodes() {
            let (base, prev) = if u == self.start {
                (0, None)
            } else {
                let mut best = WORST_SCORE;
                let mut prev = None;
                for &e in &self.nodes[u].entries {
                    if self.links[e].path_scr > best {
                        best = self.links[e].path_scr;
                        prev = Some(e);
                    }
                }
                (best, prev)
            };
            if base <= WORST_SCORE && u != self.start {
                continue;
            }
            for i in 0..self.nodes[u].exits.len() {
                let l = self.nodes[u].exits[i];
                let scr = base + self.links[l].ascr;
                if scr > self.links[l].path_scr {
                    self.links[l].path_scr = scr;
                    self.links[l].best_prev = prev;
                }
            }
        }

        let mut best = WORST_SCORE;
        let mut best_link = None;
        for &e in &self.nodes[self.end].entries {
            if self.links[e].path_scr > best {
                best = self.links[e].path_scr;
                best_link = Some(e);
            }
        }
        if best_link.is_none() {
            log::error!("no path through the lattice reaches the end node");
        }
        best_link
    }

    /// Log posterior of the best path: its scaled score against the
    /// log-sum over all paths, computed forward in natural-log space.
    pub fn posterior(&self, lmath: &LogMath, inv_ascale: f64, final_link: LatLinkId) -> i32 {
        let scaled = |ascr: i32| lmath.log_to_ln(ascr) * inv_ascale;

        let mut alpha = vec![f64::NEG_INFINITY; self.links.len()];
        for &u in &self.topo_nodes() {
            let base: f64 = if u == self.start {
                0.0
            } else {
                ln_sum_exp(self.nodes[u].entries.iter().map(|&e| alpha[e]))
            };
            if base == f64::NEG_INFINITY {
                continue;
            }
            for &l in &self.nodes[u].exits {
                let a = base + scaled(self.links[l].ascr);
                alpha[l] = ln_sum_exp([alpha[l], a].into_iter());
            }
        }
        let norm = ln_sum_exp(self.nodes[self.end].entries.iter().map(|&e| alpha[e]));

        // Scaled score of the chosen path.
        let mut best = 0.0;
        let mut cur = Some(final_link);
        while let Some(l) = cur {
            best += scaled(self.links[l].ascr);
            cur = self.links[l].best_prev;
        }

        if norm == f64::NEG_INFINITY {
            return 0;
        }
        lmath.ln_to_log(best - norm)
    }

    /// Word string along a best-path backtrace, fillers skipped.
    pub fn hyp(&self, final_link: LatLinkId) -> String {
        let mut words: Vec<&str> = Vec::new();
        let terminal = self.links[final_link].to;
        if !self.nodes[terminal].filler {
            words.push(&self.nodes[terminal].word);
        }
        let mut cur = Some(final_link);
        while let Some(l) = cur {
            let node = &self.nodes[self.links[l].from];
            if !node.filler {
                words.push(&node.word);
            }
            cur = self.links[l].best_prev;
        }
        words.reverse();
        words.join(" ")
    }

    /// Segmentation along a best-path backtrace: one segment per node on
    /// the path, fillers included.
    pub fn seg_iter(&self, final_link: LatLinkId) -> Vec<Segment> {
        let mut chain = Vec::new();
        let mut cur = Some(final_link);
        while let Some(l) = cur {
            chain.push(l);
            cur = self.links[l].best_prev;
        }
        chain.reverse();

        let mut segs = Vec::with_capacity(chain.len() + 1);
        for &l in &chain {
            let link = &self.links[l];
            let node = &self.nodes[link.from];
            segs.push(Segment {
                word: node.word.clone(),
                sf: node.sf,
                ef: link.ef,
                ascr: link.ascr,
                lscr: 0,
                lback: 1,
                prob: 0,
            });
        }
        let terminal = &self.nodes[self.links[final_link].to];
        if !terminal.filler {
            segs.push(Segment {
                word: terminal.word.clone(),
                sf: terminal.sf,
                ef: terminal.lef,
                ascr: 0,
                lscr: 0,
                lback: 1,
                prob: 0,
            });
        }
        segs
    }

    /// Nodes in an order where every link goes forward.
    fn topo_nodes(&self) -> Vec<LatNodeId> {
        let mut indeg: Vec<usize> = self.nodes.iter().map(|n| n.entries.len()).collect();
        let mut queue: Vec<LatNodeId> = (0..self.nodes.len()).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(u) = queue.pop() {
            order.push(u);
            for &l in &self.nodes[u].exits {
                let v = self.links[l].to;
                indeg[v] -= 1;
                if indeg[v] == 0 {
                    queue.push(v);
                }
            }
        }
        debug_assert_eq!(order.len(), self.nodes.len(), "lattice has a cycle");
        order
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn n_frames(&self) -> i32 {
        self.n_frames
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    pub fn start(&self) -> LatNodeId {
        self.start
    }

    pub fn end(&self) -> LatNodeId {
        self.end
    }

    pub fn node(&self, id: LatNodeId) -> &LatNode {
        &self.nodes[id]
    }

    pub fn link(&self, id: LatLinkId) -> &LatLink {
        &self.links[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LatNode> {
        self.nodes.iter()
    }

    pub fn final_node_ascr(&self) -> i32 {
        self.final_node_ascr
    }
}

/// Word id, start frame, end frame and span score of a history entry, or
/// `None` for the sentinel and null-transition entries.
fn entry_span(history: &HistoryTable, idx: usize) -> Option<(u32, i32, i32, i32)> {
    let e = history.entry(idx);
    let wid = e.link.as_ref()?.wid?;
    let (ascr, sf) = if e.pred > 0 {
        let p = history.entry(e.pred as usize);
        (e.score - p.score, p.frame + 1)
    } else {
        (e.score, 0)
    };
    Some((wid, sf, e.frame, ascr))
}

/// Insert or improve a link between two nodes; at most one link exists per
/// (from, to), the better span score wins.
fn link_nodes(
    nodes: &mut [LatNode],
    links: &mut Vec<LatLink>,
    from: LatNodeId,
    to: LatNodeId,
    ascr: i32,
    ef: i32,
) {
    for &l in &nodes[from].exits {
        if links[l].to == to {
            if ascr > links[l].ascr {
                links[l].ascr = ascr;
                links[l].ef = ef;
            }
            return;
        }
    }
    let id = links.len();
    links.push(LatLink {
        from,
        to,
        ascr,
        ef,
        path_scr: WORST_SCORE,
        best_prev: None,
    });
    nodes[from].exits.push(id);
    nodes[to].entries.push(id);
}

fn ln_sum_exp(vals: impl Iterator<Item = f64>) -> f64 {
    let vals: Vec<f64> = vals.filter(|v| *v > f64::NEG_INFINITY).collect();
    let Some(max) = vals.iter().copied().reduce(f64::max) else {
        return f64::NEG_INFINITY;
    };
    max + vals.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Scratch state for lattice construction, before pruning fixes the arena.
struct Builder {
    nodes: Vec<LatNode>,
    links: Vec<LatLink>,
    /// Grammar word id per node, translated away after construction.
    fsg_wids: Vec<u32>,
    key: HashMap<(i32, u32), LatNodeId>,
}

impl Builder {
    fn upsert_node(&mut self, sf: i32, ef: i32, wid: u32, ascr: i32) -> LatNodeId {
        if let Some(&id) = self.key.get(&(sf, wid)) {
            let node = &mut self.nodes[id];
            if node.lef < ef {
                node.lef = ef;
            }
            if node.fef > ef {
                node.fef = ef;
            }
            if node.best_exit < ascr {
                node.best_exit = ascr;
            }
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(LatNode {
            sf,
            fef: ef,
            lef: ef,
            word: String::new(),
            dict_wid: None,
            basewid: None,
            filler: false,
            best_exit: ascr,
            reachable: false,
            entries: Vec::new(),
            exits: Vec::new(),
        });
        self.fsg_wids.push(wid);
        self.key.insert((sf, wid), id);
        id
    }

    fn try_link(&mut self, src: LatNodeId, sf: i32, wid: u32, ascr: i32, ef: i32) {
        if let Some(&dest) = self.key.get(&(sf, wid)) {
            self.link(src, dest, ascr, ef);
        }
    }

    fn link(&mut self, from: LatNodeId, to: LatNodeId, ascr: i32, ef: i32) {
        link_nodes(&mut self.nodes, &mut self.links, from, to, ascr, ef);
    }

    /// The unique node starting at frame zero with exits, or a synthesised
    /// `<s>` node epsilon-linked to every candidate.
    fn find_start_node(&mut self, fsg: &mut FsgModel) -> LatNodeId {
        let candidates: Vec<LatNodeId> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].sf == 0 && !self.nodes[i].exits.is_empty())
            .collect();
        for &c in &candidates {
            log::info!(
                "start node candidate {}.{}:{}:{}",
                fsg.word_str(self.fsg_wids[c]).unwrap_or("?"),
                self.nodes[c].sf,
                self.nodes[c].fef,
                self.nodes[c].lef
            );
        }
        if candidates.len() == 1 {
            return candidates[0];
        }
        let wid = fsg.word_add("<s>");
        fsg.mark_filler(wid);
        let node = self.upsert_node(0, 0, wid, 0);
        for c in candidates {
            self.link(node, c, 0, 0);
        }
        node
    }

    /// The unique node ending at the last frame with entries, or a
    /// synthesised `</s>` node fed by every candidate at its best exit
    /// score.
    fn find_end_node(&mut self, fsg: &mut FsgModel, n_frames: i32) -> LatNodeId {
        let candidates: Vec<LatNodeId> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].lef == n_frames - 1 && !self.nodes[i].entries.is_empty())
            .collect();
        for &c in &candidates {
            log::info!(
                "end node candidate {}.{}:{}:{} ({})",
                fsg.word_str(self.fsg_wids[c]).unwrap_or("?"),
                self.nodes[c].sf,
                self.nodes[c].fef,
                self.nodes[c].lef,
                self.nodes[c].best_exit
            );
        }
        if candidates.len() == 1 {
            return candidates[0];
        }
        let wid = fsg.word_add("</s>");
        fsg.mark_filler(wid);
        let node = self.upsert_node(n_frames, n_frames, wid, 0);
        for c in candidates {
            let best_exit = self.nodes[c].best_exit;
            self.link(c, node, best_exit, n_frames);
        }
        node
    }

    /// Mark every node from which the end node can be reached.
    fn mark_reachable(&mut self, end: LatNodeId) {
        self.nodes[end].reachable = true;
        let mut stack = vec![end];
        while let Some(u) = stack.pop() {
            for i in 0..self.nodes[u].entries.len() {
                let pred = self.links[self.nodes[u].entries[i]].from;
                if !self.nodes[pred].reachable {
                    self.nodes[pred].reachable = true;
                    stack.push(pred);
                }
            }
        }
    }

    /// Drop unreachable nodes and their links, compacting both arenas.
    fn delete_unreachable(
        self,
        start: LatNodeId,
        end: LatNodeId,
    ) -> (Vec<LatNode>, Vec<LatLink>, LatNodeId, LatNodeId) {
        let mut node_map: Vec<Option<LatNodeId>> = vec![None; self.nodes.len()];
        let mut nodes = Vec::new();
        for (old, node) in self.nodes.into_iter().enumerate() {
            if node.reachable {
                node_map[old] = Some(nodes.len());
                nodes.push(node);
            }
        }
        for node in &mut nodes {
            node.entries.clear();
            node.exits.clear();
        }

        let mut links = Vec::new();
        for link in self.links {
            let (Some(from), Some(to)) = (node_map[link.from], node_map[link.to]) else {
                continue;
            };
            let id = links.len();
            links.push(LatLink { from, to, ..link });
            nodes[from].exits.push(id);
            nodes[to].entries.push(id);
        }

        // Start and end are reachable when this runs.
        let start = node_map[start].expect("start node survived pruning");
        let end = node_map[end].expect("end node survived pruning");
        (nodes, links, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctxt::PhoneCtxt;

    /// A two-word grammar (A then B) and a history describing one path:
    /// sentinel -> A ending at frame 4 -> B ending at frame 9.
    fn fixtures() -> (FsgModel, Dict, HistoryTable) {
        let mut phones = kuule_fsg::PhoneSet::new();
        let a = phones.add("AA");
        let b = phones.add("BB");
        let mut dict = Dict::new(phones);
        dict.add_word("alpha", &[a], false).unwrap();
        dict.add_word("bravo", &[b], false).unwrap();
        dict.add_word("<sil>", &[0], true).unwrap();

        let mut fsg = FsgModel::new("g", 3, 0, 2, LogMath::default(), 1.0).unwrap();
        fsg.add_trans(0, 1, 1.0, "alpha").unwrap();
        fsg.add_trans(1, 2, 1.0, "bravo").unwrap();

        let mut history = HistoryTable::new();
        let rc = PhoneCtxt::all(3);
        history.add(None, -1, 0, -1, 0, rc.clone());
        history.end_frame();
        let alpha_link = fsg.trans(0, 1)[0];
        let idx = history.add(Some(alpha_link), 4, -400, 0, a, rc.clone());
        history.end_frame();
        let bravo_link = fsg.trans(1, 2)[0];
        history.add(Some(bravo_link), 9, -900, idx as i32, b, rc);
        history.end_frame();

        (fsg, dict, history)
    }

    fn build(fsg: &mut FsgModel, dict: &Dict, history: &HistoryTable) -> Lattice {
        Lattice::build(history, fsg, dict, 10, -500, -1000).unwrap()
    }

    #[test]
    fn builds_nodes_per_start_frame_and_word() {
        let (mut fsg, dict, history) = fixtures();
        let dag = build(&mut fsg, &dict, &history);

        assert_eq!(dag.n_frames(), 10);
        // alpha@0 and bravo@5; both ends unique, so no synthesis.
        assert_eq!(dag.n_nodes(), 2);
        assert_eq!(dag.n_links(), 1);
        let start = dag.node(dag.start());
        assert_eq!(start.word, "alpha");
        assert_eq!(start.sf, 0);
        assert_eq!(start.lef, 4);
        let end = dag.node(dag.end());
        assert_eq!(end.word, "bravo");
        assert_eq!(end.sf, 5);
        // Link carries the span score of alpha.
        let l = dag.link(start.exits[0]);
        assert_eq!(l.ascr, -400);
        assert_eq!(l.ef, 4);
    }

    #[test]
    fn node_key_merges_repeated_exits() {
        // Alpha exits twice, at frames 4 and 5; bravo follows the first.
        let (mut fsg, dict, _) = fixtures();
        let alpha_link = fsg.trans(0, 1)[0];
        let bravo_link = fsg.trans(1, 2)[0];
        let rc = PhoneCtxt::all(3);
        let mut history = HistoryTable::new();
        history.add(None, -1, 0, -1, 0, rc.clone());
        history.end_frame();
        let a = history.add(Some(alpha_link), 4, -400, 0, 1, rc.clone());
        history.end_frame();
        history.add(Some(alpha_link), 5, -600, 0, 1, rc.clone());
        history.end_frame();
        history.add(Some(bravo_link), 9, -900, a as i32, 2, rc);
        history.end_frame();

        let dag = build(&mut fsg, &dict, &history);
        // Still two nodes; the alpha node absorbed the second exit.
        let alpha = dag
            .nodes()
            .find(|n| n.word == "alpha")
            .unwrap();
        assert_eq!(alpha.fef, 4);
        assert_eq!(alpha.lef, 5);
        assert_eq!(alpha.best_exit, -400);
    }

    #[test]
    fn dict_ids_are_translated() {
        let (mut fsg, dict, history) = fixtures();
        let dag = build(&mut fsg, &dict, &history);
        let alpha = dag.nodes().find(|n| n.word == "alpha").unwrap();
        assert_eq!(alpha.dict_wid, dict.to_id("alpha"));
        assert_eq!(alpha.basewid, dict.to_id("alpha"));
        assert!(!alpha.filler);
    }

    #[test]
    fn bestpath_and_hyp_walk_the_chain() {
        let (mut fsg, dict, history) = fixtures();
        let mut dag = build(&mut fsg, &dict, &history);
        let link = dag.bestpath().unwrap();
        assert_eq!(dag.link(link).path_scr, -400);
        assert_eq!(dag.hyp(link), "alpha bravo");

        let segs = dag.seg_iter(link);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].word, "alpha");
        assert_eq!(segs[0].sf, 0);
        assert_eq!(segs[0].ef, 4);
        assert_eq!(segs[1].word, "bravo");
        assert_eq!(segs[1].sf, 5);
    }

    #[test]
    fn posterior_of_single_path_is_certainty() {
        let (mut fsg, dict, history) = fixtures();
        let mut dag = build(&mut fsg, &dict, &history);
        let link = dag.bestpath().unwrap();
        let lmath = LogMath::default();
        let post = dag.posterior(&lmath, 1.0 / 20.0, link);
        // Only one path exists, so its posterior is ~log(1).
        assert!(post.abs() < 5, "post = {post}");
    }

    #[test]
    fn empty_history_fails_cleanly() {
        let (mut fsg, dict, _) = fixtures();
        let history = HistoryTable::new();
        assert!(Lattice::build(&history, &mut fsg, &dict, 0, -500, -1000).is_none());
    }

    #[test]
    fn filler_bypass_links_around_silence() {
        // alpha ends at 4, a silence spans 5..6, bravo spans 7..9.
        let (mut fsg, dict, _) = fixtures();
        fsg.add_silence("<sil>", Some(1), 0.1);
        let sil_link = fsg.trans(1, 1).last().copied().unwrap();
        let alpha_link = fsg.trans(0, 1)[0];
        let bravo_link = fsg.trans(1, 2)[0];

        let rc = PhoneCtxt::all(3);
        let mut history = HistoryTable::new();
        history.add(None, -1, 0, -1, 0, rc.clone());
        history.end_frame();
        let a = history.add(Some(alpha_link), 4, -400, 0, 1, rc.clone());
        history.end_frame();
        let s = history.add(Some(sil_link), 6, -550, a as i32, 0, rc.clone());
        history.end_frame();
        history.add(Some(bravo_link), 9, -950, s as i32, 2, rc);
        history.end_frame();

        let dag = build(&mut fsg, &dict, &history);
        // The silence node must have been bypassed with a direct
        // alpha -> bravo@7 link at the entry score plus the silence
        // penalty.
        let alpha = dag.nodes().position(|n| n.word == "alpha").unwrap();
        let bypass = dag.node(alpha).exits.iter().copied().find(|&l| {
            let to = dag.link(l).to;
            dag.node(to).word == "bravo" && dag.node(to).sf == 7
        });
        let bypass = bypass.expect("bypass link missing");
        assert_eq!(dag.link(bypass).ascr, -400 + -500);
    }
}
