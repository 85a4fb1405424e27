// Criterion benchmarks for the frame engine.
//
// Decodes a synthetic two-word utterance over a small command grammar;
// senone scores are table-driven, so the numbers isolate the search itself
// (activation, Viterbi evaluation, pruning, history bookkeeping).
//
// Run:
//   cargo bench -p kuule-search

use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use kuule_fsg::dict::PhoneSet;
use kuule_fsg::{Dict, FsgModel, WORST_SCORE};
use kuule_search::{DecoderConfig, FsgSearch, HmmContext, TableScorer};

const N_FRAMES: usize = 200;

fn build_dict() -> Rc<Dict> {
    let mut phones = PhoneSet::new();
    let ids: Vec<_> = (0..20).map(|i| phones.add(&format!("P{i}"))).collect();
    let mut dict = Dict::new(phones);
    for (i, chunk) in ids.chunks(2).enumerate() {
        dict.add_word(&format!("WORD{i}"), chunk, false).unwrap();
    }
    let sil = dict.phones().silence();
    dict.add_word("<sil>", &[sil], true).unwrap();
    Rc::new(dict)
}

fn build_search(dict: Rc<Dict>) -> FsgSearch<TableScorer> {
    let n_phones = dict.phones().len();
    let tp = vec![
        vec![-100, -120, WORST_SCORE, WORST_SCORE],
        vec![WORST_SCORE, -100, -120, WORST_SCORE],
        vec![WORST_SCORE, WORST_SCORE, -100, -120],
    ];
    let sseq = (0..n_phones).map(|p| vec![p, p, p]).collect();
    let ctx = HmmContext::new(3, tp, sseq);

    let config = DecoderConfig {
        bestpath: false,
        fsg_use_altpron: false,
        ..DecoderConfig::default()
    };
    let mut search =
        FsgSearch::new(config, TableScorer::new(n_phones), ctx, dict).unwrap();

    // A loop grammar over ten words.
    let mut fsg = FsgModel::new("bench", 2, 0, 1, *search.lmath(), 6.5).unwrap();
    for i in 0..10 {
        let word = format!("WORD{i}");
        fsg.add_trans(0, 1, 0.05, &word).unwrap();
        fsg.add_trans(1, 0, 0.05, &word).unwrap();
    }
    search.add_fsg(None, fsg).unwrap();
    search.select_fsg("bench").unwrap();
    search.reinit().unwrap();
    search
}

fn push_utterance(search: &mut FsgSearch<TableScorer>) {
    let n_phones = search.dict().phones().len();
    for f in 0..N_FRAMES {
        let hot = 1 + (f / 10) % (n_phones - 1);
        let senscr = (0..n_phones)
            .map(|p| if p == hot { 0 } else { -4_000 })
            .collect();
        search.acmod_mut().push_frame(senscr);
    }
}

fn bench_decode_utterance(c: &mut Criterion) {
    let dict = build_dict();
    let mut search = build_search(dict);

    c.bench_function("decode_200_frames", |b| {
        b.iter(|| {
            push_utterance(&mut search);
            search.start().unwrap();
            while search.step() {}
            search.finish();
            search.hyp()
        })
    });
}

fn bench_hypothesis_extraction(c: &mut Criterion) {
    let dict = build_dict();
    let mut search = build_search(dict);
    push_utterance(&mut search);
    search.start().unwrap();
    while search.step() {}
    search.finish();

    // The backtrace is recomputed on every call.
    c.bench_function("hyp_200_frames", |b| {
        b.iter(|| {
            let seg_count = search.seg_iter().map(|it| it.count());
            (search.hyp(), seg_count)
        })
    });
}

criterion_group!(benches, bench_decode_utterance, bench_hypothesis_extraction);
criterion_main!(benches);
