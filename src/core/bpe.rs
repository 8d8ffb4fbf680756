//! Greedy merge loop and vocabulary-constrained re-splitting.
//!
//! A segment is turned into symbols (characters plus the end-of-word
//! marker, placed according to the codes version). Each round picks the
//! adjacent pair with the lowest rank and merges every non-overlapping
//! occurrence of it in one left-to-right pass. Symbols are byte spans of the
//! augmented segment, tagged with their interned id, so a round only touches
//! integers.

use super::merges::{CodesVersion, MergeTable, END_OF_WORD};
use super::vocab::Vocabulary;

#[derive(Debug, Clone, Copy)]
struct Symbol {
    start: usize,
    end: usize,
    id: Option<u32>,
}

/// Apply the merge table to one unprotected segment.
///
/// Returns the merged units without separators and with the end-of-word
/// marker stripped. A segment that starts out as a single symbol is
/// returned unchanged.
pub fn merge_segment(segment: &str, table: &MergeTable) -> Vec<String> {
    encode_segment(segment, table, None, "")
}

/// Merge one unprotected segment, then re-split units missing from
/// `vocab` when one is given.
///
/// A segment that starts out as a single symbol bypasses both steps.
pub fn encode_segment(
    segment: &str,
    table: &MergeTable,
    vocab: Option<&Vocabulary>,
    separator: &str,
) -> Vec<String> {
    let augmented = format!("{segment}{END_OF_WORD}");
    let mut symbols = initial_symbols(&augmented, segment.len(), table);

    if symbols.len() < 2 {
        return vec![segment.to_string()];
    }

    while let Some((first, second, merged)) = best_pair(&symbols, table) {
        symbols = merge_pair(&symbols, first, second, merged);
        if symbols.len() == 1 {
            break;
        }
    }

    let mut units: Vec<String> = symbols
        .iter()
        .map(|s| augmented[s.start..s.end].to_string())
        .collect();
    strip_end_of_word(&mut units);

    match vocab {
        Some(vocab) => split_out_of_vocabulary(units, table, vocab, separator),
        None => units,
    }
}

fn initial_symbols(augmented: &str, word_len: usize, table: &MergeTable) -> Vec<Symbol> {
    let span = |start: usize, end: usize| Symbol {
        start,
        end,
        id: table.symbol_id(&augmented[start..end]),
    };

    let mut symbols: Vec<Symbol> = augmented[..word_len]
        .char_indices()
        .map(|(start, ch)| span(start, start + ch.len_utf8()))
        .collect();

    match (table.version(), symbols.last_mut()) {
        (CodesVersion::V0_2, Some(last)) => *last = span(last.start, augmented.len()),
        _ => symbols.push(span(word_len, augmented.len())),
    }

    symbols
}

/// Lowest-ranked adjacent pair present in the table, as
/// `(left id, right id, merged id)`.
fn best_pair(symbols: &[Symbol], table: &MergeTable) -> Option<(u32, u32, u32)> {
    symbols
        .windows(2)
        .filter_map(|pair| {
            let (left, right) = (pair[0].id?, pair[1].id?);
            table
                .merge(left, right)
                .map(|m| (m.rank, left, right, m.merged))
        })
        .min_by_key(|&(rank, ..)| rank)
        .map(|(_, left, right, merged)| (left, right, merged))
}

fn merge_pair(symbols: &[Symbol], first: u32, second: u32, merged: u32) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(symbols.len());
    let mut i = 0;

    while i < symbols.len() {
        let current = symbols[i];
        match symbols.get(i + 1) {
            Some(next) if current.id == Some(first) && next.id == Some(second) => {
                out.push(Symbol {
                    start: current.start,
                    end: next.end,
                    id: Some(merged),
                });
                i += 2;
            }
            _ => {
                out.push(current);
                i += 1;
            }
        }
    }

    out
}

fn strip_end_of_word(units: &mut Vec<String>) {
    if units.last().is_some_and(|u| u == END_OF_WORD) {
        units.pop();
    } else if let Some(last) = units.last_mut() {
        if last.ends_with(END_OF_WORD) {
            let keep = last.len() - END_OF_WORD.len();
            last.truncate(keep);
        }
    }
}

/// Break out-of-vocabulary units back down along the reverse merge map.
///
/// Inner units are checked as `unit + separator`, the segment's final unit
/// bare. A unit that is neither covered nor splittable is kept as is.
pub fn split_out_of_vocabulary(
    units: Vec<String>,
    table: &MergeTable,
    vocab: &Vocabulary,
    separator: &str,
) -> Vec<String> {
    let last = units.len().saturating_sub(1);
    let mut out = Vec::with_capacity(units.len());
    let mut stack: Vec<(String, bool)> = Vec::new();

    for (idx, unit) in units.into_iter().enumerate() {
        stack.push((unit, idx == last));

        // Right halves are pushed before left halves so pieces come out in order.
        while let Some((piece, final_piece)) = stack.pop() {
            if piece.is_empty() {
                continue;
            }
            if vocab.covers(&piece, final_piece, separator) {
                out.push(piece);
                continue;
            }
            match reverse_split(&piece, final_piece, table) {
                Some((left, right)) => {
                    stack.push((right, final_piece));
                    stack.push((left, false));
                }
                None => out.push(piece),
            }
        }
    }

    out
}

fn reverse_split(piece: &str, final_piece: bool, table: &MergeTable) -> Option<(String, String)> {
    if final_piece {
        let (left, right) = table.split(&format!("{piece}{END_OF_WORD}"))?;
        let right = right.strip_suffix(END_OF_WORD).unwrap_or(right);
        Some((left.to_string(), right.to_string()))
    } else {
        let (left, right) = table.split(piece)?;
        Some((left.to_string(), right.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(version: CodesVersion, pairs: &[(&str, &str)]) -> MergeTable {
        MergeTable::from_pairs(version, pairs.iter().copied())
    }

    #[test]
    fn test_priority_order_v01() {
        let t = table(CodesVersion::V0_1, &[("a", "b"), ("ab", "c")]);
        assert_eq!(merge_segment("abc", &t), vec!["abc"]);
    }

    #[test]
    fn test_lower_rank_applied_first() {
        // (b, c) outranks (a, b), so `a` is left alone.
        let t = table(CodesVersion::V0_1, &[("b", "c"), ("a", "b")]);
        assert_eq!(merge_segment("abc", &t), vec!["a", "bc"]);
    }

    #[test]
    fn test_version_changes_final_symbol() {
        let pairs = [("l", "o"), ("lo", "w")];
        let v01 = table(CodesVersion::V0_1, &pairs);
        let v02 = table(CodesVersion::V0_2, &pairs);
        assert_eq!(merge_segment("low", &v01), vec!["low"]);
        assert_eq!(merge_segment("low", &v02), vec!["lo", "w"]);
    }

    #[test]
    fn test_end_of_word_merge_v02() {
        let t = table(CodesVersion::V0_2, &[("l", "o"), ("lo", "w</w>")]);
        assert_eq!(merge_segment("low", &t), vec!["low"]);
    }

    #[test]
    fn test_all_occurrences_merged_in_one_pass() {
        let t = table(CodesVersion::V0_1, &[("a", "a")]);
        assert_eq!(merge_segment("aaaaa", &t), vec!["aa", "aa", "a"]);
    }

    #[test]
    fn test_empty_table_splits_characters() {
        let v01 = table(CodesVersion::V0_1, &[]);
        let v02 = table(CodesVersion::V0_2, &[]);
        assert_eq!(merge_segment("abc", &v01), vec!["a", "b", "c"]);
        assert_eq!(merge_segment("abc", &v02), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_character_v02_unchanged() {
        let t = table(CodesVersion::V0_2, &[]);
        assert_eq!(merge_segment("x", &t), vec!["x"]);
    }

    #[test]
    fn test_multibyte_characters() {
        let t = table(CodesVersion::V0_2, &[("ü", "b")]);
        assert_eq!(merge_segment("übü", &t), vec!["üb", "ü"]);
    }

    #[test]
    fn test_vocabulary_split_final_unit() {
        let t = table(CodesVersion::V0_2, &[("a", "b"), ("ab", "c</w>")]);
        assert_eq!(merge_segment("abc", &t), vec!["abc"]);

        let vocab = Vocabulary::from_tokens(["ab@@", "c"]);
        let units = split_out_of_vocabulary(vec!["abc".to_string()], &t, &vocab, "@@");
        assert_eq!(units, vec!["ab", "c"]);
    }

    #[test]
    fn test_vocabulary_split_inner_unit_recurses() {
        let t = table(CodesVersion::V0_2, &[("a", "b"), ("ab", "c")]);
        let vocab = Vocabulary::from_tokens(["a@@", "b@@", "c@@", "d"]);
        let units = split_out_of_vocabulary(
            vec!["abc".to_string(), "d".to_string()],
            &t,
            &vocab,
            "@@",
        );
        assert_eq!(units, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_vocabulary_split_keeps_unsplittable() {
        let t = table(CodesVersion::V0_2, &[]);
        let vocab = Vocabulary::from_tokens(["y"]);
        let units = split_out_of_vocabulary(vec!["xx".to_string()], &t, &vocab, "@@");
        assert_eq!(units, vec!["xx"]);
    }

    #[test]
    fn test_deep_split_is_iterative() {
        // A left-branching chain of merges a, aa, aaa, ... none in vocabulary.
        let mut pairs = Vec::new();
        let mut prefix = "a".to_string();
        for _ in 0..2000 {
            pairs.push((prefix.clone(), "a".to_string()));
            prefix.push('a');
        }
        let t = MergeTable::from_pairs(CodesVersion::V0_2, pairs);
        let vocab = Vocabulary::from_tokens(["a@@", "b"]);
        let units = split_out_of_vocabulary(
            vec![prefix.clone(), "b".to_string()],
            &t,
            &vocab,
            "@@",
        );
        assert_eq!(units.len(), prefix.len() + 1);
        assert!(units[..prefix.len()].iter().all(|u| u == "a"));
        assert_eq!(units.last().map(String::as_str), Some("b"));
    }
}
