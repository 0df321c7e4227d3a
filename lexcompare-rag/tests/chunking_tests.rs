//! Property tests for overlapping chunking.

use lexcompare_rag::{Chunk, Chunker, Document, OverlappingChunker, chunk_text};
use proptest::prelude::*;

/// Text mixing letters, sentence ends, paragraph breaks and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-z §é.!?\n]{0,400}"
}

/// Text with no paragraph or sentence boundaries.
fn arb_plain_text() -> impl Strategy<Value = String> {
    "[a-z]{1,400}"
}

/// A valid `(chunk_size, chunk_overlap)` pair.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..120).prop_flat_map(|size| (Just(size), 0..size))
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end - start).collect()
}

fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        out.extend(chunk.text.chars().skip(skip));
    }
    out
}

/// **Property 1: Coverage**
/// *For any* non-empty text, the first chunk starts at 0, the last ends at
/// the text length, and consecutive chunks leave no gap.
mod prop_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_the_whole_text(text in arb_text(), (size, overlap) in arb_params()) {
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            let len = text.chars().count();

            if len == 0 {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            prop_assert_eq!(chunks.first().unwrap().start_offset, 0);
            prop_assert_eq!(chunks.last().unwrap().end_offset, len);
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].start_offset <= pair[0].end_offset);
                prop_assert!(pair[1].start_offset > pair[0].start_offset);
            }
        }
    }
}

/// **Property 2: Overlap exactness and chunk bounds**
/// *For any* text, consecutive chunks share exactly `chunk_overlap`
/// characters, no chunk exceeds `chunk_size`, and each chunk's text is the
/// source slice at its offsets.
mod prop_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn consecutive_chunks_share_exact_overlap(text in arb_text(), (size, overlap) in arb_params()) {
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
                prop_assert!(chunk.end_offset - chunk.start_offset <= size);
                prop_assert_eq!(&chunk.text, &char_slice(&text, chunk.start_offset, chunk.end_offset));
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].start_offset, pair[0].end_offset - overlap);
            }
        }
    }
}

/// **Property 3: Chunk count**
/// *For any* text without natural boundaries of length `L > C`, the number of
/// chunks is `ceil((L - O) / (C - O))`; shorter text yields one chunk.
mod prop_count {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn count_matches_formula(text in arb_plain_text(), (size, overlap) in arb_params()) {
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            let len = text.chars().count();
            let expected = if len <= size {
                1
            } else {
                (len - overlap).div_ceil(size - overlap)
            };
            prop_assert_eq!(chunks.len(), expected);
        }
    }
}

/// **Property 4: Reconstruction**
/// *For any* text, concatenating the chunks after dropping each later
/// chunk's leading overlap reproduces the original text exactly.
mod prop_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reconstruct_the_source(text in arb_text(), (size, overlap) in arb_params()) {
            let chunks = chunk_text("doc", &text, size, overlap).unwrap();
            prop_assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }
}

#[test]
fn reference_scenario_produces_three_windows() {
    let chunker = OverlappingChunker::new(1000, 200).unwrap();
    let chunks = chunker.chunk(&Document::new("law", "x".repeat(2500)));
    let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_offset, c.end_offset)).collect();
    assert_eq!(spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);
    assert!(chunks.iter().all(|c| c.source_id == "law"));
    assert_eq!(chunks[2].id(), "law_2");
}

#[test]
fn cuts_prefer_paragraph_breaks() {
    let text = format!("{}\n\n{}", "a".repeat(95), "b".repeat(100));
    let chunks = chunk_text("doc", &text, 100, 10).unwrap();
    assert_eq!(chunks[0].end_offset, 97);
    assert!(chunks[0].text.ends_with("\n\n"));
}
