//! Property tests for paragraph-then-sentence chunking.

use paper_rag::chunking::{Chunker, ParagraphChunker, split_text_into_chunks};
use proptest::prelude::*;

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Text built from words, sentence breaks and paragraph breaks.
fn arb_document() -> impl Strategy<Value = String> {
    let token = prop_oneof![
        6 => "[a-zA-Z가-힣]{1,12}".prop_map(|w| format!("{w} ")),
        2 => Just(". ".to_string()),
        1 => Just("\n\n".to_string()),
    ];
    proptest::collection::vec(token, 0..200).prop_map(|tokens| tokens.concat())
}

/// **Property: chunking preserves content**
/// *For any* text and budget, every chunk SHALL be non-empty and trimmed,
/// the chunks SHALL contain every non-whitespace character of the input in
/// order, and a chunk over budget SHALL hold exactly one sentence.
mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_nonempty_and_preserve_content(
            text in arb_document(),
            chunk_size in 10usize..300,
        ) {
            let chunks = split_text_into_chunks(&text, chunk_size);

            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert_eq!(chunk.trim(), chunk.as_str());
                prop_assert!(
                    chunk.chars().count() <= chunk_size || !chunk.contains(". "),
                    "oversized chunk holds more than one sentence: {:?}",
                    chunk
                );
            }
            prop_assert_eq!(without_whitespace(&chunks.concat()), without_whitespace(&text));
        }

        #[test]
        fn text_within_budget_is_a_single_chunk(
            text in arb_document(),
        ) {
            let trimmed = text.trim();
            let chunk_size = trimmed.chars().count().max(1);
            let chunks = split_text_into_chunks(&text, chunk_size);
            if trimmed.is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks, vec![trimmed.to_string()]);
            }
        }
    }
}

#[test]
fn long_middle_paragraph_is_split_at_sentences() {
    let intro = "Graph neural networks generalise convolution to irregular domains.";
    let sentence = "Message passing aggregates features from each node's neighbourhood";
    let middle = (0..20).map(|i| format!("{sentence} in round {i:02}.")).collect::<Vec<_>>().join(" ");
    let outro = "We release code and data.";
    assert!(middle.chars().count() >= 1200);

    let chunker = ParagraphChunker::new(500);
    let chunks = chunker.chunk(&format!("{intro}\n\n{middle}\n\n{outro}"));

    assert!(chunks.len() >= 4);
    assert_eq!(chunks.first().map(String::as_str), Some(intro));
    assert_eq!(chunks.last().map(String::as_str), Some(outro));

    let middle_chunks = &chunks[1..chunks.len() - 1];
    assert!(middle_chunks.len() >= 2);
    for chunk in middle_chunks {
        assert!(chunk.chars().count() <= 500);
        assert!(chunk.ends_with('.'));
    }
    assert_eq!(without_whitespace(&middle_chunks.concat()), without_whitespace(&middle));
}

#[test]
fn whitespace_only_pages_produce_no_chunks() {
    let chunker = ParagraphChunker::new(100);
    assert!(chunker.chunk_pages(&["  ".to_string(), "\n\n".to_string()]).is_empty());
}
