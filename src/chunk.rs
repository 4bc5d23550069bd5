//! Overlapping character-window chunker.
//!
//! Splits document text into fixed-size windows (default 1000 characters)
//! with a fixed overlap (default 200 characters) so clause boundaries that
//! straddle a window edge still appear whole in one of the two neighbors.
//!
//! The iterator is lazy, finite, and restartable: [`chunk_windows`] borrows
//! the source text and can be called again to re-walk it. Empty input yields
//! an empty sequence; the final window may be shorter than the configured
//! size. The overlap must be strictly less than the window (validated at
//! config load; a zero step would never advance).

/// Lazy iterator over overlapping character windows of a text.
#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    text: &'a str,
    window: usize,
    step: usize,
    /// Byte offset of the next window start.
    start: usize,
    done: bool,
}

/// Split `text` into overlapping windows of `window_chars` characters,
/// consecutive windows sharing `overlap_chars` characters.
pub fn chunk_windows(text: &str, window_chars: usize, overlap_chars: usize) -> ChunkWindows<'_> {
    debug_assert!(window_chars > 0);
    debug_assert!(overlap_chars < window_chars);
    ChunkWindows {
        text,
        window: window_chars.max(1),
        // saturating guard keeps the iterator finite even on a bad config
        step: window_chars.saturating_sub(overlap_chars).max(1),
        start: 0,
        done: text.is_empty(),
    }
}

impl<'a> Iterator for ChunkWindows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let remainder = &self.text[self.start..];
        let end = match remainder.char_indices().nth(self.window) {
            Some((offset, _)) => self.start + offset,
            None => self.text.len(),
        };

        let piece = &self.text[self.start..end];

        if end == self.text.len() {
            self.done = true;
        } else {
            // Advance by `step` characters; the next window re-covers the
            // trailing `overlap` characters of this one.
            match remainder.char_indices().nth(self.step) {
                Some((offset, _)) => self.start += offset,
                None => self.done = true,
            }
        }

        Some(piece)
    }
}
