//! Fuzzy string similarity for OCR output
//!
//! Both scores are in `[0, 1]` and compare case-insensitively after trimming.

fn normalize(s: &str) -> Vec<char> {
    s.trim().to_lowercase().chars().collect()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn indel_ratio(a: &[char], b: &[char]) -> f32 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f32 / total as f32
}

/// Normalized InDel similarity: `2 * LCS / (len(a) + len(b))`
pub fn fuzzy_ratio(a: &str, b: &str) -> f32 {
    indel_ratio(&normalize(a), &normalize(b))
}

/// Best [`fuzzy_ratio`] of the shorter string against every same-length
/// window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f32 {
    let (a, b) = (normalize(a), normalize(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() || short.len() == long.len() {
        return indel_ratio(&short, &long);
    }
    long.windows(short.len())
        .map(|w| indel_ratio(&short, w))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzy_ratio_identity_and_case() {
        assert_eq!(fuzzy_ratio("Riko Kashimoto", "riko kashimoto"), 1.0);
        assert_eq!(fuzzy_ratio("  Next ", "next"), 1.0);
        assert_eq!(fuzzy_ratio("", ""), 1.0);
        assert_eq!(fuzzy_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_fuzzy_ratio_typo() {
        let r = fuzzy_ratio("Riko Kashimotu", "Riko Kashimoto");
        assert!(r > 0.9 && r < 1.0, "{r}");
        assert!(fuzzy_ratio("Other", "Riko Kashimoto") < 0.7);
    }

    #[test]
    fn test_partial_ratio_finds_substring() {
        assert_eq!(partial_ratio("start", "Start Career!"), 1.0);
        assert_eq!(partial_ratio("Edit Team", "team"), 1.0);
        assert!(fuzzy_ratio("start", "Start Career!") < 0.68);
        assert!(partial_ratio("team", "To Home") < 0.68);
    }

    #[test]
    fn test_partial_ratio_empty() {
        assert_eq!(partial_ratio("", "next"), 0.0);
        assert_eq!(partial_ratio("", ""), 1.0);
    }
}
