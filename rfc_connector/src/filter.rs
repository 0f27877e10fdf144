//! Splitting of query conditions into OPTIONS rows.
//!
//! One OPTIONS row of the table reader holds at most 72 characters and the
//! back-end concatenates rows verbatim, so a long condition may only be cut at
//! a space. The space at a cut is dropped.

use std::iter::FusedIterator;

use crate::error::{RfcError, RfcResult};

pub const DEFAULT_FILTER_MAX_LEN: usize = 72;

/// Lazy iterator over the chunks of a filter condition.
///
/// Yields `Err(FilterTooLong)` once, then stops, if a token longer than the
/// limit leaves no space to cut at. Cloning restarts from the current position.
#[derive(Debug, Clone)]
pub struct FilterChunks {
    normalized: String,
    offset: usize,
    max_len: usize,
    done: bool,
}

/// Split `filter` into chunks of at most `max_len` characters.
pub fn split_filter(filter: &str, max_len: usize) -> FilterChunks {
    FilterChunks {
        normalized: normalize(filter),
        offset: 0,
        max_len,
        done: false,
    }
}

/// Eagerly split `filter`, failing on the first unsplittable token.
pub fn filter_chunks(filter: &str, max_len: usize) -> RfcResult<Vec<String>> {
    split_filter(filter, max_len).collect()
}

/// Newlines become single spaces.
pub fn normalize(filter: &str) -> String {
    filter.replace("\r\n", "\n").replace('\n', " ")
}

impl FilterChunks {
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl Iterator for FilterChunks {
    type Item = RfcResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.normalized[self.offset..];

        // The character right after the limit is part of the search window: a
        // space there still allows a full-length chunk.
        let Some((lookahead, ch)) = rest.char_indices().nth(self.max_len) else {
            self.done = true;
            return Some(Ok(rest.to_string()));
        };
        let window = &rest[..lookahead + ch.len_utf8()];

        match window.rfind(' ') {
            Some(space) => {
                let chunk = rest[..space].to_string();
                self.offset += space + 1;
                Some(Ok(chunk))
            }
            None => {
                self.done = true;
                let token = rest.split(' ').next().unwrap_or(rest).to_string();
                Some(Err(RfcError::FilterTooLong {
                    max_len: self.max_len,
                    token,
                }))
            }
        }
    }
}

impl FusedIterator for FilterChunks {}
