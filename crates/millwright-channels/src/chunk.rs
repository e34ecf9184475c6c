//! Reply chunking for platform message limits.
//!
//! Split preference: paragraph boundary (double newline), then line
//! boundary, then hard cut.

/// Maximum characters per message chunk.
pub const CHUNK_MAX: usize = 4096;

/// Split `text` into chunks no longer than [`CHUNK_MAX`] bytes.
///
/// A text of exactly `CHUNK_MAX` is a single chunk. Hard cuts land on a
/// char boundary so multi-byte text never splits mid-character.
pub fn split_chunks(text: &str) -> Vec<String> {
    split_chunks_at(text, CHUNK_MAX)
}

pub fn split_chunks_at(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if rest.len() <= max {
            chunks.push(rest.to_string());
            break;
        }

        // largest window that is still a char boundary
        let mut window_end = max;
        while !rest.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &rest[..window_end];

        let cut = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .filter(|&pos| pos > 0)
            .unwrap_or(window_end);

        let chunk = &rest[..cut];
        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[cut..].trim_start_matches('\n');
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn exactly_chunk_max_is_single_chunk() {
        let text = "a".repeat(CHUNK_MAX);
        assert_eq!(split_chunks(&text).len(), 1);
    }

    #[test]
    fn one_over_chunk_max_is_two_chunks() {
        let text = "a".repeat(CHUNK_MAX + 1);
        let chunks = split_chunks(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), CHUNK_MAX);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para = "b".repeat(3000);
        let text = format!("{para}\n\n{para}");
        let chunks = split_chunks(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], para);
        assert_eq!(chunks[1], para);
    }

    #[test]
    fn falls_back_to_line_boundaries() {
        let line = "c".repeat(3000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn hard_cuts_a_single_long_line() {
        let text = "x".repeat(9000);
        let chunks = split_chunks(&text);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        // 3-byte chars around the cut point
        let text = "日".repeat(2000);
        for c in split_chunks(&text) {
            assert!(c.len() <= CHUNK_MAX);
            assert!(c.chars().all(|ch| ch == '日'));
        }
    }

    #[test]
    fn no_empty_chunks() {
        let text = format!("\n\n{}", "d".repeat(5000));
        for c in split_chunks(&text) {
            assert!(!c.is_empty());
        }
    }
}
