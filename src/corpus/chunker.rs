//! Word-window chunking of the knowledge text

/// Split `text` into windows of `chunk_size` whitespace-separated words, each window starting
/// `chunk_size - overlap` words after the previous one. The last window may be shorter.
///
/// `overlap` is clamped below `chunk_size` so the window always advances.
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let overlap = overlap.min(chunk_size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}
