// Phonetic prefix structures over a grammar's vocabulary.
//
// For every grammar state, each outgoing word transition is expanded into a
// chain of pnodes, one per pronunciation phone. The first pnode of each
// chain is a root, attached to the state and sibling-linked to the other
// roots of the same state; the last pnode is a leaf and carries the grammar
// link for the word exit. Node topology is fixed after construction; only
// the embedded HMM state mutates during decoding.
//
// The acoustic models are context independent, so every node is built to
// admit all left and right contexts; the admission tests in the frame
// engine stay bit-exact for models that narrow them.

use kuule_fsg::dict::PhoneId;
use kuule_fsg::{Dict, FsgLink, FsgModel};

use crate::ctxt::PhoneCtxt;
use crate::hmm::{Hmm, HmmContext};
use crate::SearchError;

/// Index of a pnode within the lextree arena.
pub type PNodeId = usize;

/// One phonetic HMM node.
#[derive(Debug)]
pub struct PNode {
    pub hmm: Hmm,
    /// Log probability of entering this node from its parent (or, for a
    /// root, of entering the word from its source grammar state).
    pub logs2prob: i32,
    /// The CI phone this node's HMM models.
    pub ci_ext: PhoneId,
    /// Context admission set: left contexts for a root, right contexts for
    /// a leaf.
    pub ctxt: PhoneCtxt,
    pub sibling: Option<PNodeId>,
    pub first_child: Option<PNodeId>,
    pub leaf: bool,
    /// Grammar link taken when this leaf exits; roots and interior nodes
    /// carry none.
    pub fsglink: Option<FsgLink>,
}

/// The phonetic network for one grammar.
#[derive(Debug)]
pub struct Lextree {
    pnodes: Vec<PNode>,
    /// Head of the root sibling chain per grammar state.
    roots: Vec<Option<PNodeId>>,
}

impl Lextree {
    /// Expand a grammar's word transitions against the dictionary.
    ///
    /// `wip` and `pip` are the word/phone insertion penalties, already in
    /// the log domain with the language weight applied.
    pub fn build(
        fsg: &FsgModel,
        dict: &Dict,
        ctx: &HmmContext,
        wip: i32,
        pip: i32,
    ) -> Result<Self, SearchError> {
        let n_phones = dict.phones().len();
        let n_emit = ctx.n_emit_state();
        let mut pnodes: Vec<PNode> = Vec::new();
        let mut roots: Vec<Option<PNodeId>> = vec![None; fsg.n_state()];

        for from in 0..fsg.n_state() {
            for to in 0..fsg.n_state() {
                for link in fsg.trans(from, to) {
                    let wid = match link.wid {
                        Some(wid) => wid,
                        None => continue,
                    };
                    let word = fsg
                        .word_str(wid)
                        .ok_or_else(|| SearchError::MissingPronunciation(format!("#{wid}")))?;
                    let dict_wid = dict
                        .to_id(word)
                        .ok_or_else(|| SearchError::MissingPronunciation(word.to_string()))?;
                    let pron = dict.pron(dict_wid);
                    debug_assert!(!pron.is_empty());

                    let mut prev: Option<PNodeId> = None;
                    for (i, &phone) in pron.iter().enumerate() {
                        let last = i == pron.len() - 1;
                        let id = pnodes.len();
                        pnodes.push(PNode {
                            hmm: Hmm::new(n_emit, phone),
                            logs2prob: if i == 0 {
                                link.logs2prob + wip + pip
                            } else {
                                pip
                            },
                            ci_ext: phone,
                            ctxt: PhoneCtxt::all(n_phones),
                            sibling: None,
                            first_child: None,
                            leaf: last,
                            fsglink: last.then_some(*link),
                        });
                        match prev {
                            None => {
                                pnodes[id].sibling = roots[from];
                                roots[from] = Some(id);
                            }
                            Some(p) => {
                                pnodes[p].first_child = Some(id);
                            }
                        }
                        prev = Some(id);
                    }
                }
            }
        }

        Ok(Self { pnodes, roots })
    }

    /// Total pnode count; the hard ceiling on active HMMs per frame.
    pub fn n_pnode(&self) -> usize {
        self.pnodes.len()
    }

    pub fn pnode(&self, id: PNodeId) -> &PNode {
        &self.pnodes[id]
    }

    pub fn pnode_mut(&mut self, id: PNodeId) -> &mut PNode {
        &mut self.pnodes[id]
    }

    /// Head of the root sibling chain for a grammar state. Callers that
    /// mutate node HMMs while walking the chain follow the sibling links
    /// themselves.
    pub fn root_head(&self, state: usize) -> Option<PNodeId> {
        self.roots.get(state).copied().flatten()
    }

    /// Roots attached to a grammar state, in sibling-chain order.
    pub fn roots(&self, state: usize) -> SiblingIter<'_> {
        SiblingIter {
            tree: self,
            next: self.roots.get(state).copied().flatten(),
        }
    }

    /// Reset a pnode's HMM to the inactive state.
    pub fn deactivate(&mut self, id: PNodeId) {
        self.pnodes[id].hmm.deactivate();
    }
}

/// Iterator over a sibling chain, yielding pnode ids.
pub struct SiblingIter<'a> {
    tree: &'a Lextree,
    next: Option<PNodeId>,
}

impl Iterator for SiblingIter<'_> {
    type Item = PNodeId;

    fn next(&mut self) -> Option<PNodeId> {
        let id = self.next?;
        self.next = self.tree.pnodes[id].sibling;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuule_fsg::dict::PhoneSet;
    use kuule_fsg::LogMath;

    fn fixtures() -> (FsgModel, Dict, HmmContext) {
        let mut phones = PhoneSet::new();
        let hh = phones.add("HH");
        let ah = phones.add("AH");
        let l = phones.add("L");
        let ow = phones.add("OW");
        let n = phones.add("N");
        let sil = phones.silence();

        let mut dict = Dict::new(phones);
        dict.add_word("<sil>", &[sil], true).unwrap();
        dict.add_word("HELLO", &[hh, ah, l, ow], false).unwrap();
        dict.add_word("NO", &[n, ow], false).unwrap();
        dict.add_word("OH", &[ow], false).unwrap();

        let mut fsg = FsgModel::new("g", 3, 0, 2, LogMath::default(), 1.0).unwrap();
        fsg.add_trans(0, 1, 0.5, "HELLO").unwrap();
        fsg.add_trans(0, 1, 0.5, "NO").unwrap();
        fsg.add_trans(1, 2, 1.0, "OH").unwrap();

        let n_phone = dict.phones().len();
        let tp = vec![
            vec![-100, -120, kuule_fsg::WORST_SCORE, kuule_fsg::WORST_SCORE],
            vec![kuule_fsg::WORST_SCORE, -100, -120, kuule_fsg::WORST_SCORE],
            vec![kuule_fsg::WORST_SCORE, kuule_fsg::WORST_SCORE, -100, -120],
        ];
        let sseq = (0..n_phone).map(|p| vec![p, p, p]).collect();
        let ctx = HmmContext::new(3, tp, sseq);
        (fsg, dict, ctx)
    }

    #[test]
    fn builds_chains_per_transition() {
        let (fsg, dict, ctx) = fixtures();
        let tree = Lextree::build(&fsg, &dict, &ctx, -10, -5).unwrap();

        // HELLO (4 phones) + NO (2) + OH (1).
        assert_eq!(tree.n_pnode(), 7);

        let state0_roots: Vec<_> = tree.roots(0).collect();
        assert_eq!(state0_roots.len(), 2);
        let state1_roots: Vec<_> = tree.roots(1).collect();
        assert_eq!(state1_roots.len(), 1);
        assert_eq!(tree.roots(2).count(), 0);
    }

    #[test]
    fn root_carries_transition_and_penalties() {
        let (fsg, dict, ctx) = fixtures();
        let wip = -10;
        let pip = -5;
        let tree = Lextree::build(&fsg, &dict, &ctx, wip, pip).unwrap();

        let hello_link = fsg.trans(0, 1)[0];
        let root = tree
            .roots(0)
            .map(|id| tree.pnode(id))
            .find(|p| p.ci_ext == dict.phones().id("HH").unwrap())
            .unwrap();
        assert_eq!(root.logs2prob, hello_link.logs2prob + wip + pip);
        assert!(!root.leaf);
        assert!(root.fsglink.is_none());

        // Interior nodes carry the phone insertion penalty only.
        let second = tree.pnode(root.first_child.unwrap());
        assert_eq!(second.logs2prob, pip);
    }

    #[test]
    fn leaf_carries_grammar_link() {
        let (fsg, dict, ctx) = fixtures();
        let tree = Lextree::build(&fsg, &dict, &ctx, 0, 0).unwrap();

        // Walk the HELLO chain to its leaf.
        let mut id = tree
            .roots(0)
            .find(|&id| tree.pnode(id).ci_ext == dict.phones().id("HH").unwrap())
            .unwrap();
        let mut depth = 1;
        while let Some(child) = tree.pnode(id).first_child {
            id = child;
            depth += 1;
        }
        assert_eq!(depth, 4);
        let leaf = tree.pnode(id);
        assert!(leaf.leaf);
        let link = leaf.fsglink.unwrap();
        assert_eq!(link.to_state, 1);
        assert_eq!(fsg.word_str(link.wid.unwrap()), Some("HELLO"));
        assert_eq!(leaf.ci_ext, dict.phones().id("OW").unwrap());
    }

    #[test]
    fn single_phone_word_is_root_and_leaf() {
        let (fsg, dict, ctx) = fixtures();
        let tree = Lextree::build(&fsg, &dict, &ctx, 0, 0).unwrap();
        let oh = tree.roots(1).next().unwrap();
        let p = tree.pnode(oh);
        assert!(p.leaf);
        assert!(p.fsglink.is_some());
        assert!(p.first_child.is_none());
    }

    #[test]
    fn missing_pronunciation_is_an_error() {
        let (mut fsg, dict, ctx) = fixtures();
        fsg.add_trans(1, 2, 1.0, "UNKNOWN").unwrap();
        let err = Lextree::build(&fsg, &dict, &ctx, 0, 0).unwrap_err();
        assert!(matches!(err, SearchError::MissingPronunciation(w) if w == "UNKNOWN"));
    }

    #[test]
    fn null_transitions_produce_no_nodes() {
        let (fsg, dict, ctx) = fixtures();
        let before = Lextree::build(&fsg, &dict, &ctx, 0, 0).unwrap().n_pnode();

        let mut fsg2 = fsg;
        fsg2.add_null_trans(0, 2, 1.0).unwrap();
        let after = Lextree::build(&fsg2, &dict, &ctx, 0, 0).unwrap().n_pnode();
        assert_eq!(before, after);
    }
}
