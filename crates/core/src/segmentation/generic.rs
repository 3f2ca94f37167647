use tracing::debug;

/// Recursive size-bounded splitter for documents without clause structure.
///
/// Splits on the largest separator that makes progress (double newline,
/// newline, sentence boundary, space, then a hard character cut) and
/// reassembles the fragments into chunks of at most `max_chars`, carrying
/// `overlap_chars` of trailing context from each chunk into the next.
pub fn split_generic(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars.saturating_sub(1));

    let fragments = split_recursive(trimmed, &["\n\n", "\n", ". ", " "], max_chars);
    let chunks = assemble(fragments, max_chars, overlap_chars);
    debug!(chunk_count = chunks.len(), "generic split complete");
    chunks
}

fn split_recursive(text: &str, separators: &[&str], max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }
    let Some((separator, rest)) = separators.split_first() else {
        return hard_cut(text, max_chars);
    };

    let parts: Vec<&str> = text
        .split(separator)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() <= 1 {
        return split_recursive(text, rest, max_chars);
    }

    parts
        .into_iter()
        .flat_map(|part| split_recursive(part, rest, max_chars))
        .collect()
}

fn assemble(fragments: Vec<String>, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for fragment in fragments {
        let joined_len = if current.is_empty() {
            fragment.chars().count()
        } else {
            current.chars().count() + fragment.chars().count() + 1
        };

        if joined_len > max_chars && !current.is_empty() {
            let tail = overlap_tail(&current, overlap_chars);
            chunks.push(std::mem::take(&mut current));
            // Skip the overlap when the next fragment is so large that
            // carrying it would breach the bound.
            if tail.chars().count() + fragment.chars().count() + 1 <= max_chars {
                current = tail;
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&fragment);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Last `overlap_chars` characters, snapped forward to a word boundary so
/// the carried context never starts mid-word.
fn overlap_tail(chunk: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    let start = chars.len().saturating_sub(overlap_chars);
    let tail: String = chars[start..].iter().collect();
    match tail.find(' ') {
        Some(space) if space + 1 < tail.len() => tail[space + 1..].to_string(),
        _ => tail,
    }
}

fn hard_cut(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|window| window.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_generic("", 500, 50).is_empty());
        assert!(split_generic("   \n\n  ", 500, 50).is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = split_generic("one small paragraph", 500, 50);
        assert_eq!(chunks, vec!["one small paragraph".to_string()]);
    }

    #[test]
    fn chunks_respect_the_size_bound() {
        let text = "A sentence about nothing in particular. ".repeat(80);
        let chunks = split_generic(&text, 500, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn adjacent_chunks_share_overlap_context() {
        let text = "The first topic covers alpha. ".repeat(40);
        let chunks = split_generic(&text, 200, 40);
        assert!(chunks.len() > 1);
        let first_tail: String = chunks[0]
            .chars()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert!(chunks[1].contains(first_tail.trim()));
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let text = format!("{}\n\n{}", "alpha ".repeat(40).trim(), "beta ".repeat(40).trim());
        let chunks = split_generic(&text, 260, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("alpha"));
        assert!(!chunks[0].contains("beta"));
    }

    #[test]
    fn unbroken_text_falls_back_to_hard_cuts() {
        let text = "x".repeat(1_200);
        let chunks = split_generic(&text, 500, 0);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 500));
    }
}
