//! Greedy CTC decoding

use ndarray::{ArrayView2, Axis};

/// Placeholder the charsets use for a word space
pub const SPACE_PLACEHOLDER: &str = "§";

/// Greedy decoder over an ordered character set
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    tokens: Vec<String>,
    /// Whether index 0 of the logits is the blank
    has_blank: bool,
}

impl CtcDecoder {
    pub fn new(charset: Vec<String>, add_blank: bool) -> Self {
        Self {
            tokens: charset,
            has_blank: add_blank,
        }
    }

    /// Width of the logits' vocabulary axis
    pub fn vocabulary_size(&self) -> usize {
        self.tokens.len() + usize::from(self.has_blank)
    }

    /// Decode time-major logits of shape (T, V)
    pub fn decode(&self, logits: ArrayView2<'_, f32>) -> String {
        let best_path = logits.axis_iter(Axis(0)).map(|step| {
            step.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (idx, &v)| {
                    if v > best.1 {
                        (idx, v)
                    } else {
                        best
                    }
                })
                .0
        });

        let mut text = String::new();
        let mut previous: Option<usize> = None;

        for idx in best_path {
            if previous == Some(idx) {
                continue;
            }
            previous = Some(idx);

            if let Some(token) = self.token(idx) {
                text.push_str(token);
            }
        }

        text.replace(' ', "")
            .replace(SPACE_PLACEHOLDER, " ")
            .trim()
            .to_string()
    }

    fn token(&self, idx: usize) -> Option<&str> {
        if self.has_blank {
            if idx == 0 {
                return None;
            }
            self.tokens.get(idx - 1).map(String::as_str)
        } else {
            self.tokens.get(idx).map(String::as_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn charset(chars: &str) -> Vec<String> {
        chars.chars().map(String::from).collect()
    }

    /// One-hot logits following `path`
    fn logits(path: &[usize], vocab: usize) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((path.len(), vocab));
        for (t, &idx) in path.iter().enumerate() {
            out[[t, idx]] = 5.0;
        }
        out
    }

    #[test]
    fn test_all_blank_decodes_to_empty() {
        let decoder = CtcDecoder::new(charset("abc"), true);
        assert_eq!(decoder.decode(logits(&[0, 0, 0, 0], 4).view()), "");
    }

    #[test]
    fn test_repeats_collapse_and_blank_separates() {
        let decoder = CtcDecoder::new(charset("abc"), true);
        // a a _ a b b c -> "aabc"
        let text = decoder.decode(logits(&[1, 1, 0, 1, 2, 2, 3], 4).view());
        assert_eq!(text, "aabc");
    }

    #[test]
    fn test_placeholder_becomes_space_and_is_trimmed() {
        let decoder = CtcDecoder::new(charset("ཀག§"), true);
        let text = decoder.decode(logits(&[3, 1, 0, 3, 2, 3], 4).view());
        assert_eq!(text, "ཀ ག");
    }

    #[test]
    fn test_without_blank_index_zero_is_a_token() {
        let decoder = CtcDecoder::new(charset("xyz"), false);
        assert_eq!(decoder.vocabulary_size(), 3);
        assert_eq!(decoder.decode(logits(&[0, 0, 1, 2], 3).view()), "xyz");
    }

    #[test]
    fn test_stack_tokens_are_emitted_whole() {
        let decoder = CtcDecoder::new(vec!["སྐ".to_string(), "་".to_string()], true);
        assert_eq!(decoder.decode(logits(&[1, 2, 0, 1], 3).view()), "སྐ་སྐ");
    }
}
