//! Okapi BM25 over a small, per-request corpus. Built once from the
//! tokenized candidate set, scored against the tokenized query.

use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

pub struct Bm25Index {
    term_frequencies: Vec<HashMap<String, usize>>,
    doc_lengths: Vec<usize>,
    doc_frequencies: HashMap<String, usize>,
    avg_doc_length: f32,
}

impl Bm25Index {
    pub fn new(corpus: &[Vec<String>]) -> Self {
        let mut term_frequencies = Vec::with_capacity(corpus.len());
        let mut doc_lengths = Vec::with_capacity(corpus.len());
        let mut doc_frequencies: HashMap<String, usize> = HashMap::new();

        for tokens in corpus {
            let mut frequencies: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token.clone()).or_insert(0) += 1;
            }
            for term in frequencies.keys() {
                *doc_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lengths.push(tokens.len());
            term_frequencies.push(frequencies);
        }

        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f32 / doc_lengths.len() as f32
        };

        Self {
            term_frequencies,
            doc_lengths,
            doc_frequencies,
            avg_doc_length,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.term_frequencies.len() as f32;
        let df = self.doc_frequencies.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of every document against the query, in corpus order.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.term_frequencies.len()];
        if self.avg_doc_length <= 0.0 {
            return scores;
        }

        for term in query_tokens {
            let idf = self.idf(term);
            for (doc, score) in scores.iter_mut().enumerate() {
                let tf = self.term_frequencies[doc].get(term).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let dl = self.doc_lengths[doc] as f32;
                let denom = tf + K1 * (1.0 - B + B * dl / self.avg_doc_length);
                *score += idf * tf * (K1 + 1.0) / denom;
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokenize;

    #[test]
    fn term_in_document_outranks_absence() {
        let corpus = vec![
            tokenize("apple releases new iphone today"),
            tokenize("government announces new emission policy"),
        ];
        let index = Bm25Index::new(&corpus);

        let scores = index.scores(&tokenize("iphone"));
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn repeated_terms_saturate() {
        let corpus = vec![
            tokenize("rust rust rust rust rust rust"),
            tokenize("rust language"),
        ];
        let index = Bm25Index::new(&corpus);

        let scores = index.scores(&tokenize("rust"));
        assert!(scores[0] > scores[1]);
        // Saturation: six occurrences are not worth six times one.
        assert!(scores[0] < scores[1] * 6.0);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let index = Bm25Index::new(&[]);
        assert!(index.scores(&tokenize("anything")).is_empty());
    }
}
