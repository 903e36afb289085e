use rayon::prelude::*;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::keywords::{KeywordError, KeywordTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
    pub value: i64,
    pub subtotal: i64,
}

/// Count case-insensitive, non-overlapping occurrences of `term` in `text`.
///
/// The term is matched literally and anywhere, so "tax" also counts inside
/// "taxes".
pub fn count_occurrences(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }

    // An escaped literal always compiles; the size limit is the only way out.
    match RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern.find_iter(text).count(),
        Err(e) => {
            log::warn!("Could not build pattern for '{}': {}", term, e);
            0
        }
    }
}

/// Count every keyword of `table` in `text`, in table order.
pub fn count_keywords(text: &str, table: &KeywordTable) -> Result<Vec<KeywordCount>, KeywordError> {
    let keywords: Vec<_> = table.iter().collect();

    keywords
        .par_iter()
        .map(|keyword| {
            let count = count_occurrences(text, &keyword.term);
            let subtotal = i64::try_from(count)
                .ok()
                .and_then(|c| c.checked_mul(keyword.value))
                .ok_or_else(|| KeywordError::Overflow {
                    keyword: keyword.term.clone(),
                })?;

            Ok(KeywordCount {
                keyword: keyword.term.clone(),
                count,
                value: keyword.value,
                subtotal,
            })
        })
        .collect()
}

pub fn grand_total(counts: &[KeywordCount]) -> Result<i64, KeywordError> {
    counts.iter().try_fold(0i64, |total, row| {
        total
            .checked_add(row.subtotal)
            .ok_or_else(|| KeywordError::Overflow {
                keyword: row.keyword.clone(),
            })
    })
}
