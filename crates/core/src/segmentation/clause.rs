use crate::error::{PipelineError, Result};
use crate::models::{ChunkType, ClauseAnnotation, PipelineConfig};
use regex::Regex;
use tracing::debug;

/// A chunk produced by the clause parser before document identity and
/// sequence numbers are attached.
#[derive(Debug, Clone)]
pub struct ClausePiece {
    pub text: String,
    pub chunk_type: ChunkType,
    pub clause: Option<ClauseAnnotation>,
}

#[derive(Debug)]
struct Header {
    start: usize,
    /// Dotted number, or the bare letter for a lettered item.
    number: String,
    title: String,
    level: u32,
    lettered: bool,
}

#[derive(Debug)]
struct Ancestor {
    number: String,
    title: String,
    lettered: bool,
}

/// Parse legal text into clause-aligned pieces.
///
/// Headers are found by a multiline scan for keyword headings
/// (`Article 5`, `Section 2.1: Confidentiality`), bare dotted-number
/// clause heads (`5.1 Termination.`), and lettered items (`(a)`, `(iv)`)
/// whose clause number is composed from the enclosing clause, so `(a)`
/// under `5.1` becomes `5.1.a`. The text between one header and the next
/// becomes that header's body. Hierarchy is tracked with a stack of
/// currently-open ancestors keyed by dotted-prefix containment; no tree is
/// materialized. Text before the first header becomes a single generic
/// piece.
///
/// Returns `SegmentationAnomaly` when no header matches at all, so the
/// caller can fall back to generic splitting.
pub fn parse_clause_pieces(text: &str, config: &PipelineConfig) -> Result<Vec<ClausePiece>> {
    let headers = scan_headers(text)?;
    if headers.is_empty() {
        return Err(PipelineError::SegmentationAnomaly(
            "no section or clause headers detected".to_string(),
        ));
    }
    debug!(header_count = headers.len(), "clause headers detected");

    let mut pieces = Vec::new();

    let preamble = text[..headers[0].start].trim();
    if !preamble.is_empty() {
        pieces.push(ClausePiece {
            text: preamble.to_string(),
            chunk_type: ChunkType::Generic,
            clause: None,
        });
    }

    let mut stack: Vec<Ancestor> = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        let end = headers
            .get(index + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());
        let body = text[header.start..end].trim();

        let (clause_number, level) = if header.lettered {
            // A lettered item nests under whatever clause is open; it
            // closes only a preceding lettered sibling.
            while stack.last().is_some_and(|top| top.lettered) {
                stack.pop();
            }
            let composed = match stack.last() {
                Some(parent) => format!("{}.{}", parent.number, header.number),
                None => format!("0.{}", header.number),
            };
            let level = dotted_level(&composed);
            (composed, level)
        } else {
            while stack
                .last()
                .is_some_and(|top| !is_dotted_prefix(&top.number, &header.number))
            {
                stack.pop();
            }
            (header.number.clone(), header.level)
        };

        let section_title = stack
            .iter()
            .rev()
            .find(|ancestor| !ancestor.title.is_empty())
            .map(|ancestor| ancestor.title.clone())
            .or_else(|| (!header.title.is_empty()).then(|| header.title.clone()))
            .unwrap_or_else(|| "Preamble".to_string());
        let section_number = stack
            .first()
            .map(|ancestor| ancestor.number.clone())
            .unwrap_or_else(|| top_level_component(&clause_number).to_string());

        pieces.push(ClausePiece {
            text: body.to_string(),
            chunk_type: ChunkType::Clause,
            clause: Some(ClauseAnnotation {
                clause_number: clause_number.clone(),
                section_number,
                section_title,
                hierarchy_level: level,
            }),
        });

        stack.push(Ancestor {
            number: clause_number,
            title: header.title.clone(),
            lettered: header.lettered,
        });
    }

    let pieces = split_oversize(pieces, config.legal_max_chunk_chars);
    let pieces = merge_undersize(
        pieces,
        config.legal_min_chunk_chars,
        config.legal_max_chunk_chars,
    );
    Ok(pieces)
}

fn scan_headers(text: &str) -> Result<Vec<Header>> {
    let keyword_re = Regex::new(
        r"(?m)^[ \t]*(?:Article|Section|Part|Clause|ARTICLE|SECTION|PART|CLAUSE)\s+(\d+(?:\.\d+)*)\.?:?[ \t]*(.*)$",
    )?;
    let numbered_re = Regex::new(r"(?m)^[ \t]*(\d+(?:\.\d+)*)\.?[ \t]+(\S.*)$")?;
    let lettered_re = Regex::new(r"(?mi)^[ \t]*\(([a-z]|[ivxlcdm]+)\)[ \t]+(\S.*)$")?;

    let mut headers: Vec<Header> = Vec::new();
    for caps in keyword_re.captures_iter(text) {
        let whole = caps.get(0).ok_or_else(empty_capture)?;
        let number = caps.get(1).ok_or_else(empty_capture)?.as_str();
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        headers.push(Header {
            start: whole.start(),
            number: number.to_string(),
            title: clean_title(rest),
            level: dotted_level(number),
            lettered: false,
        });
    }

    for caps in numbered_re.captures_iter(text) {
        let whole = caps.get(0).ok_or_else(empty_capture)?;
        if headers.iter().any(|header| header.start == whole.start()) {
            continue;
        }
        let number = caps.get(1).ok_or_else(empty_capture)?.as_str();
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        // A dot-less number is only a header when it introduces a titled
        // line ("5 TERMINATION"); otherwise lines like "30 days later"
        // would be misread as clause heads.
        if !number.contains('.')
            && !rest
                .chars()
                .next()
                .is_some_and(|first| first.is_alphabetic() && first.is_uppercase())
        {
            continue;
        }
        headers.push(Header {
            start: whole.start(),
            number: number.to_string(),
            title: clean_title(rest),
            level: dotted_level(number),
            lettered: false,
        });
    }

    for caps in lettered_re.captures_iter(text) {
        let whole = caps.get(0).ok_or_else(empty_capture)?;
        if headers.iter().any(|header| header.start == whole.start()) {
            continue;
        }
        let letter = caps.get(1).ok_or_else(empty_capture)?.as_str();
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        headers.push(Header {
            start: whole.start(),
            number: letter.to_lowercase(),
            title: clean_title(rest),
            // Recomputed once the enclosing clause is known.
            level: 0,
            lettered: true,
        });
    }

    headers.sort_by_key(|header| header.start);
    Ok(headers)
}

fn empty_capture() -> PipelineError {
    PipelineError::SegmentationAnomaly("header pattern matched without capture".to_string())
}

/// Count of dot-separated components: `5` -> 1, `5.1` -> 2, `5.1.1` -> 3.
fn dotted_level(number: &str) -> u32 {
    number.split('.').count() as u32
}

fn top_level_component(number: &str) -> &str {
    number.split('.').next().unwrap_or(number)
}

fn is_dotted_prefix(ancestor: &str, descendant: &str) -> bool {
    descendant.len() > ancestor.len()
        && descendant.starts_with(ancestor)
        && descendant.as_bytes().get(ancestor.len()) == Some(&b'.')
}

/// First sentence of the header remainder, without trailing punctuation.
fn clean_title(rest: &str) -> String {
    rest.split(['.', '!', '?', ':'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn split_oversize(pieces: Vec<ClausePiece>, max_chars: usize) -> Vec<ClausePiece> {
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.text.chars().count() <= max_chars {
            out.push(piece);
            continue;
        }
        let parts = split_body(&piece.text, max_chars);
        debug!(
            clause = piece
                .clause
                .as_ref()
                .map(|c| c.clause_number.as_str())
                .unwrap_or("preamble"),
            part_count = parts.len(),
            "split oversized clause body"
        );
        for part in parts {
            out.push(ClausePiece {
                text: part,
                chunk_type: piece.chunk_type,
                clause: piece.clause.clone(),
            });
        }
    }
    out
}

/// Split a body on paragraph boundaries first, sentence boundaries next,
/// and hard character cuts as a last resort.
fn split_body(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let paragraph = paragraph.trim();
        if paragraph.chars().count() > max_chars {
            flush(&mut parts, &mut current);
            for sentence_part in split_long_paragraph(paragraph, max_chars) {
                parts.push(sentence_part);
            }
            continue;
        }
        if !current.is_empty() && current.chars().count() + paragraph.chars().count() + 2 > max_chars
        {
            flush(&mut parts, &mut current);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    flush(&mut parts, &mut current);
    parts
}

fn split_long_paragraph(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(paragraph) {
        if sentence.chars().count() > max_chars {
            flush(&mut parts, &mut current);
            parts.extend(hard_cut(sentence, max_chars));
            continue;
        }
        if !current.is_empty() && current.chars().count() + sentence.chars().count() + 1 > max_chars
        {
            flush(&mut parts, &mut current);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }
    flush(&mut parts, &mut current);
    parts
}

fn flush(parts: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    current.clear();
}

/// Sentence boundaries: terminal punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some((next_offset, next_ch)) = chars.peek().copied() {
                if next_ch.is_whitespace() {
                    let sentence = text[start..=offset].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_offset;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn hard_cut(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|window| window.iter().collect::<String>())
        .collect()
}

/// Merge a below-minimum piece into its preceding sibling. Merging stays
/// within the same parent clause and the same section; preamble pieces and
/// pieces from different sections never merge.
fn merge_undersize(pieces: Vec<ClausePiece>, min_chars: usize, max_chars: usize) -> Vec<ClausePiece> {
    let mut out: Vec<ClausePiece> = Vec::new();
    for piece in pieces {
        let mergeable = piece.text.chars().count() < min_chars
            && out
                .last()
                .is_some_and(|prev| shares_parent(prev, &piece, max_chars));
        if mergeable {
            if let Some(prev) = out.last_mut() {
                prev.text.push_str("\n\n");
                prev.text.push_str(&piece.text);
                continue;
            }
        }
        out.push(piece);
    }
    out
}

fn shares_parent(prev: &ClausePiece, next: &ClausePiece, max_chars: usize) -> bool {
    let (Some(a), Some(b)) = (prev.clause.as_ref(), next.clause.as_ref()) else {
        return false;
    };
    a.section_number == b.section_number
        && parent_number(&a.clause_number) == parent_number(&b.clause_number)
        && prev.text.chars().count() + next.text.chars().count() + 2 <= max_chars
}

fn parent_number(number: &str) -> &str {
    number.rsplit_once('.').map(|(head, _)| head).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn clause(piece: &ClausePiece) -> &ClauseAnnotation {
        piece.clause.as_ref().expect("piece should carry a clause")
    }

    #[test]
    fn hierarchy_levels_follow_dotted_components() {
        let text = "5 Termination\n\
                    This section governs how the agreement ends between the parties involved.\n\
                    5.1 Notice. Either party may terminate this agreement by written notice.\n\
                    5.2 Cure. The breaching party has thirty days to cure any default stated.\n\
                    5.1.1 Exceptions. Notice is not required where the breach is incurable.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        let levels: Vec<u32> = pieces.iter().map(|p| clause(p).hierarchy_level).collect();
        assert_eq!(levels, vec![1, 2, 2, 3]);

        let deepest = clause(&pieces[3]);
        assert_eq!(deepest.clause_number, "5.1.1");
        assert_eq!(deepest.section_title, "Termination");
        assert_eq!(deepest.section_number, "5");
    }

    #[test]
    fn dotted_clause_heads_become_separate_chunks() {
        let text = "5.1 Termination. Either party may terminate with 30 days notice.\n\
                    5.2 Confidentiality. Each party shall keep the terms of this agreement private.";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(pieces.len(), 2);
        assert_eq!(clause(&pieces[0]).clause_number, "5.1");
        assert_eq!(clause(&pieces[1]).clause_number, "5.2");
        assert_eq!(clause(&pieces[0]).hierarchy_level, 2);
        assert_eq!(clause(&pieces[1]).hierarchy_level, 2);
        assert!(pieces
            .iter()
            .all(|piece| piece.chunk_type == ChunkType::Clause));
    }

    #[test]
    fn trailing_period_is_stripped_from_clause_numbers() {
        let text = "5.1. Payment terms shall be net thirty days from the invoice date issued.\n\
                    5.2. Late payments accrue interest at the statutory rate until settled fully.";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(clause(&pieces[0]).clause_number, "5.1");
        assert_eq!(clause(&pieces[1]).clause_number, "5.2");
    }

    #[test]
    fn keyword_headers_set_section_context() {
        let text = "Article 2: Confidentiality\n\
                    2.1 Each party shall protect the other party's confidential information fully.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(clause(&pieces[0]).clause_number, "2");
        assert_eq!(clause(&pieces[0]).section_title, "Confidentiality");
        assert_eq!(clause(&pieces[1]).section_title, "Confidentiality");
        assert_eq!(clause(&pieces[1]).section_number, "2");
    }

    #[test]
    fn preamble_becomes_a_generic_piece() {
        let text = "This agreement is made between Alpha Corp and Beta LLC on the first of March.\n\n\
                    1.1 Definitions. Terms used in this agreement carry their ordinary meaning.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(pieces[0].chunk_type, ChunkType::Generic);
        assert!(pieces[0].clause.is_none());
        assert_eq!(clause(&pieces[1]).clause_number, "1.1");
    }

    #[test]
    fn zero_headers_is_a_recoverable_anomaly() {
        let result = parse_clause_pieces("just prose with no structure at all", &config());
        match result {
            Err(error) => assert!(error.is_recoverable()),
            Ok(_) => panic!("expected a segmentation anomaly"),
        }
    }

    #[test]
    fn oversized_bodies_split_but_keep_clause_metadata() {
        let long_sentences = "The obligations described herein survive termination. "
            .repeat(60);
        let text = format!("7.1 Survival. {long_sentences}");
        let pieces = parse_clause_pieces(&text, &config()).expect("parse should succeed");
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.text.chars().count() <= config().legal_max_chunk_chars);
            assert_eq!(clause(piece).clause_number, "7.1");
        }
    }

    #[test]
    fn tiny_siblings_merge_forward_within_the_same_parent() {
        let text = "3.1 Fees. Client shall pay the fees set out in Schedule A within thirty days.\n\
                    3.2 Taxes apply.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].text.contains("Taxes apply"));
        assert_eq!(clause(&pieces[0]).clause_number, "3.1");
    }

    #[test]
    fn lettered_items_compose_numbers_from_the_enclosing_clause() {
        let text = "5 Termination\n\
                    This section governs the manner in which either party may end the agreement.\n\
                    5.1 Notice. Either party may terminate by delivering prior written notice.\n\
                    (a) Notice must be delivered in writing to the registered office address shown.\n\
                    (b) The cure period is thirty days from the date the notice is first received.\n\
                    5.2 Effect. Termination does not relieve either party of accrued payment duties.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        let numbers: Vec<&str> = pieces
            .iter()
            .map(|piece| clause(piece).clause_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["5", "5.1", "5.1.a", "5.1.b", "5.2"]);

        let item = clause(&pieces[2]);
        assert_eq!(item.hierarchy_level, 3);
        assert_eq!(item.section_number, "5");
        assert_eq!(item.section_title, "Termination");
        // Sibling (b) closed (a); it must not nest under it.
        assert_eq!(clause(&pieces[3]).clause_number, "5.1.b");
        assert_eq!(clause(&pieces[4]).hierarchy_level, 2);
    }

    #[test]
    fn roman_numeral_items_are_treated_as_lettered() {
        let text = "2.1 Remedies. The non-breaching party may pursue any remedy listed below.\n\
                    (iv) Specific performance may be sought where damages would be inadequate.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        assert_eq!(clause(&pieces[1]).clause_number, "2.1.iv");
        assert_eq!(clause(&pieces[1]).hierarchy_level, 3);
    }

    #[test]
    fn merging_never_crosses_section_boundaries() {
        let text = "3 Payment\n\
                    Client shall pay all undisputed invoices within thirty days of receipt thereof.\n\
                    4 Term\n\
                    Two years.\n";
        let pieces = parse_clause_pieces(text, &config()).expect("parse should succeed");
        let numbers: Vec<&str> = pieces
            .iter()
            .map(|piece| clause(piece).clause_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["3", "4"]);
    }
}
