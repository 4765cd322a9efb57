//! Component tests: stop detection, stream assembly, benchmark pairing,
//! processed-token ledger, and sampling.

use edgelm::{
    BenchmarkInfo, BenchmarkParams, DecodedText, ProcessedTokens, Sampler, StopTokenDetector,
    TokenStreamAssembler, TopKTopPSampler,
};

// ---- stop detector ----

#[test]
fn detector_single_token_stop() {
    let mut detector = StopTokenDetector::new(1, vec![vec![2]]).unwrap();
    detector.process(&[7]).unwrap();
    assert!(!detector.done(0));
    detector.process(&[2]).unwrap();
    assert!(detector.done(0));
    assert!(detector.all_done());
}

#[test]
fn detector_tracks_partial_match_length() {
    let mut detector = StopTokenDetector::new(1, vec![vec![8, 9, 4]]).unwrap();
    detector.process(&[8]).unwrap();
    assert_eq!(detector.max_partial_stop_len(0), 1);
    detector.process(&[9]).unwrap();
    assert_eq!(detector.max_partial_stop_len(0), 2);
    detector.process(&[4]).unwrap();
    assert!(detector.done(0));
    assert_eq!(detector.max_partial_stop_len(0), 0);
}

#[test]
fn detector_falls_back_on_mismatch() {
    let mut detector = StopTokenDetector::new(1, vec![vec![8, 9]]).unwrap();
    detector.process(&[8]).unwrap();
    assert_eq!(detector.max_partial_stop_len(0), 1);
    detector.process(&[7]).unwrap();
    assert_eq!(detector.max_partial_stop_len(0), 0);
    assert!(!detector.done(0));
}

#[test]
fn detector_fallback_keeps_overlapping_prefix() {
    // A mismatch can still leave a shorter prefix alive: after 1 2 1 2 the
    // longest live prefix of [1, 2, 1, 3] is [1, 2].
    let mut detector = StopTokenDetector::new(1, vec![vec![1, 2, 1, 3]]).unwrap();
    for &token in &[1, 2, 1, 2] {
        detector.process(&[token]).unwrap();
    }
    assert_eq!(detector.max_partial_stop_len(0), 2);
    detector.process(&[1]).unwrap();
    assert_eq!(detector.max_partial_stop_len(0), 3);
    detector.process(&[3]).unwrap();
    assert!(detector.done(0));
}

#[test]
fn detector_repeated_prefix_token() {
    let mut detector = StopTokenDetector::new(1, vec![vec![8, 9]]).unwrap();
    detector.process(&[8]).unwrap();
    detector.process(&[8]).unwrap();
    // The second 8 fails [8, 9] but starts a fresh one-token match.
    assert_eq!(detector.max_partial_stop_len(0), 1);
    detector.process(&[9]).unwrap();
    assert!(detector.done(0));
}

#[test]
fn detector_candidates_are_independent() {
    let mut detector = StopTokenDetector::new(2, vec![vec![2]]).unwrap();
    detector.process(&[2, 7]).unwrap();
    assert!(detector.done(0));
    assert!(!detector.done(1));
    assert!(!detector.all_done());
    detector.process(&[5, 2]).unwrap();
    assert!(detector.all_done());
}

#[test]
fn detector_frozen_candidate_ignores_tokens() {
    let mut detector = StopTokenDetector::new(1, vec![vec![2], vec![8, 9]]).unwrap();
    detector.process(&[2]).unwrap();
    assert!(detector.done(0));
    detector.process(&[8]).unwrap();
    assert!(detector.done(0));
    assert_eq!(detector.max_partial_stop_len(0), 0);
}

#[test]
fn detector_rejects_bad_configuration() {
    assert!(StopTokenDetector::new(0, vec![vec![2]]).is_err());
    assert!(StopTokenDetector::new(1, vec![vec![]]).is_err());
}

#[test]
fn detector_rejects_token_count_mismatch() {
    let mut detector = StopTokenDetector::new(2, vec![vec![2]]).unwrap();
    assert!(detector.process(&[1]).is_err());
}

// ---- stream assembler ----

fn complete(text: &str) -> DecodedText {
    DecodedText {
        text: text.to_string(),
        incomplete: false,
    }
}

fn incomplete(text: &str) -> DecodedText {
    DecodedText {
        text: text.to_string(),
        incomplete: true,
    }
}

#[test]
fn assembler_passes_through_plain_fragments() {
    let mut assembler = TokenStreamAssembler::new(1);
    assert_eq!(assembler.assemble(0, &[7], &complete("Hi"), false, 0), "Hi");
    assert_eq!(
        assembler.assemble(0, &[8], &complete(" there"), false, 0),
        " there"
    );
}

#[test]
fn assembler_buffers_incomplete_chain() {
    let mut assembler = TokenStreamAssembler::new(1);
    assert_eq!(assembler.assemble(0, &[8], &incomplete("\u{fffd}"), false, 0), "");
    assert_eq!(assembler.pending()[0], vec![8]);
    // The merged chain decodes cleanly; pending clears.
    assert_eq!(
        assembler.assemble(0, &[8, 9], &complete("é."), false, 0),
        "é."
    );
    assert!(assembler.pending()[0].is_empty());
}

#[test]
fn assembler_defers_fragments_during_partial_match() {
    let mut assembler = TokenStreamAssembler::new(1);
    // One fragment deferred while a one-token prefix is live.
    assert_eq!(assembler.assemble(0, &[8], &complete(" there"), false, 1), "");
    // Match fails: the deferred fragment is released ahead of the new one.
    assert_eq!(
        assembler.assemble(0, &[7], &complete("!"), false, 0),
        " there!"
    );
}

#[test]
fn assembler_deferred_queue_respects_bound() {
    let mut assembler = TokenStreamAssembler::new(1);
    assert_eq!(assembler.assemble(0, &[8], &complete("a"), false, 1), "");
    // Still only one fragment may stay deferred; the oldest is released.
    assert_eq!(assembler.assemble(0, &[8], &complete("b"), false, 1), "a");
    assert_eq!(assembler.assemble(0, &[8], &complete("c"), false, 1), "b");
}

#[test]
fn assembler_suppresses_stopped_candidate() {
    let mut assembler = TokenStreamAssembler::new(1);
    assert_eq!(assembler.assemble(0, &[9], &complete("tail"), true, 0), "");
}

#[test]
fn assembler_normalizes_metaspace_in_released_text_only() {
    let mut assembler = TokenStreamAssembler::new(1);
    assert_eq!(
        assembler.assemble(0, &[5], &complete("\u{2581}word"), false, 0),
        " word"
    );
    // Deferred fragments are normalized when released, not when queued.
    assert_eq!(assembler.assemble(0, &[8], &complete("\u{2581}maybe"), false, 1), "");
    assert_eq!(
        assembler.assemble(0, &[7], &complete("\u{2581}no"), false, 0),
        " maybe no"
    );
}

#[test]
fn assembler_candidates_do_not_share_state() {
    let mut assembler = TokenStreamAssembler::new(2);
    assert_eq!(assembler.assemble(0, &[8], &incomplete("x"), false, 0), "");
    assert_eq!(assembler.assemble(1, &[7], &complete("ok"), false, 0), "ok");
    assert_eq!(assembler.pending()[0], vec![8]);
    assert!(assembler.pending()[1].is_empty());
}

// ---- benchmark info ----

#[test]
fn benchmark_pairs_named_deltas() {
    let mut benchmark = BenchmarkInfo::new(BenchmarkParams::default());
    for _ in 0..3 {
        benchmark.time_mark_delta("sampling").unwrap();
        benchmark.time_mark_delta("sampling").unwrap();
    }
    let report = benchmark.report().unwrap();
    let span = report.spans.iter().find(|s| s.name == "sampling").unwrap();
    assert_eq!(span.count, 3);
    assert!(span.total_ms >= 0.0);
}

#[test]
fn benchmark_rejects_unpaired_report() {
    let mut benchmark = BenchmarkInfo::new(BenchmarkParams::default());
    benchmark.time_mark_delta("executor_decode").unwrap();
    assert!(benchmark.report().is_err());
}

#[test]
fn benchmark_rejects_inconsistent_turns() {
    let mut benchmark = BenchmarkInfo::new(BenchmarkParams::default());
    assert!(benchmark.time_decode_turn_end(10).is_err());
    benchmark.time_decode_turn_start().unwrap();
    assert!(benchmark.time_decode_turn_start().is_err());
    benchmark.time_decode_turn_end(10).unwrap();

    assert!(benchmark.time_prefill_turn_end(3).is_err());
    benchmark.time_prefill_turn_start().unwrap();
    benchmark.time_prefill_turn_end(3).unwrap();

    let report = benchmark.report().unwrap();
    assert_eq!(report.decode_turns[0].num_tokens, 10);
    assert_eq!(report.prefill_turns[0].num_tokens, 3);
}

#[test]
fn benchmark_report_serializes() {
    let mut benchmark = BenchmarkInfo::new(BenchmarkParams {
        num_decode_tokens: 4,
    });
    benchmark.time_mark_delta("executor_decode").unwrap();
    benchmark.time_mark_delta("executor_decode").unwrap();
    let json = serde_json::to_value(benchmark.report().unwrap()).unwrap();
    assert_eq!(json["spans"][0]["name"], "executor_decode");
    assert_eq!(json["spans"][0]["count"], 1);
}

// ---- processed tokens ----

#[test]
fn processed_tokens_counts_pending_input() {
    let mut tokens = ProcessedTokens::new();
    tokens.add_processed_tokens(&[1, 2, 3]);
    assert_eq!(tokens.token_count(), 3);
    assert_eq!(tokens.next_unprocessed_step(), 3);

    tokens.set_pending_input_token(4).unwrap();
    assert_eq!(tokens.token_count(), 4);
    assert_eq!(tokens.next_unprocessed_step(), 3);
    assert_eq!(tokens.token_at_step(3), Some(4));

    // Only one pending token may exist at a time.
    assert!(tokens.set_pending_input_token(5).is_err());

    tokens.mark_pending_input_processed().unwrap();
    assert_eq!(tokens.next_unprocessed_step(), 4);
    assert_eq!(tokens.copy_of_tokens(), vec![1, 2, 3, 4]);
    assert!(tokens.mark_pending_input_processed().is_err());
}

#[test]
fn processed_tokens_rolls_back() {
    let mut tokens = ProcessedTokens::new();
    tokens.add_processed_tokens(&[1, 2, 3, 4]);
    tokens.set_pending_input_token(5).unwrap();

    tokens.roll_back_to(2).unwrap();
    assert_eq!(tokens.token_count(), 2);
    assert_eq!(tokens.pending_input_token(), None);
    assert_eq!(tokens.copy_of_tokens(), vec![1, 2]);

    // Rolling back to the current length is a no-op.
    tokens.roll_back_to(2).unwrap();
    assert_eq!(tokens.token_count(), 2);

    assert!(tokens.roll_back_to(9).is_err());
}

#[test]
fn processed_tokens_step_lookup() {
    let mut tokens = ProcessedTokens::new();
    tokens.add_processed_tokens(&[10, 11]);
    assert_eq!(tokens.token_at_step(0), Some(10));
    assert_eq!(tokens.token_at_step(1), Some(11));
    assert_eq!(tokens.token_at_step(2), None);
}

// ---- sampler ----

#[test]
fn sampler_greedy_picks_argmax() {
    let mut sampler = TopKTopPSampler::with_seed(0.0, 0, 1.0, 7);
    let logits = vec![vec![0.1, 2.5, -1.0, 0.3]];
    let mut ids = vec![0];
    let mut scores = vec![0.0];
    sampler.sample(&logits, &mut ids, &mut scores).unwrap();
    assert_eq!(ids, vec![1]);
    // Log-probability of the winner is negative but dominant.
    assert!(scores[0] < 0.0 && scores[0] > -1.0);
}

#[test]
fn sampler_is_deterministic_for_a_seed() {
    let logits = vec![vec![0.5, 0.4, 0.3, 0.2, 0.1]; 2];
    let mut run = |seed: u64| {
        let mut sampler = TopKTopPSampler::with_seed(0.9, 3, 0.95, seed);
        let mut ids = vec![0, 0];
        let mut scores = vec![0.0, 0.0];
        for _ in 0..8 {
            sampler.sample(&logits, &mut ids, &mut scores).unwrap();
        }
        (ids, scores)
    };
    assert_eq!(run(42), run(42));
}

#[test]
fn sampler_top_k_restricts_support() {
    let mut sampler = TopKTopPSampler::with_seed(1.0, 2, 1.0, 3);
    let logits = vec![vec![5.0, 4.0, -50.0, -50.0]];
    let mut ids = vec![0];
    let mut scores = vec![0.0];
    for _ in 0..32 {
        sampler.sample(&logits, &mut ids, &mut scores).unwrap();
        assert!(ids[0] <= 1, "sampled outside top-k: {}", ids[0]);
        assert!(scores[0] <= 0.0);
    }
}

#[test]
fn sampler_rejects_shape_mismatch() {
    let mut sampler = TopKTopPSampler::with_seed(1.0, 0, 1.0, 0);
    let logits = vec![vec![0.0; 4]; 2];
    let mut ids = vec![0];
    let mut scores = vec![0.0, 0.0];
    assert!(sampler.sample(&logits, &mut ids, &mut scores).is_err());
}
