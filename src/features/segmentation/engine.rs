//! Message segmentation
//!
//! Splits reply text into chunks that fit the platform's message limit.
//! Lengths are measured in characters, so multi-byte text is never split
//! mid-character. Boundaries are tried in order of preference:
//! paragraph → line → sentence → word → hard character split.
//!
//! Chunks are an exact partition of the (decorated) input: the separator
//! that ends a unit stays at the end of the preceding chunk, so joining
//! every chunk's text reproduces the input byte for byte.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    pub index: usize,
    pub text: String,
    pub is_first: bool,
    pub is_last: bool,
}

/// Fixed markers wrapped around the text before it is measured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decorations {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl Decorations {
    pub fn new(prefix: Option<String>, suffix: Option<String>) -> Self {
        Self { prefix, suffix }
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.as_deref().map_or(true, str::is_empty)
            && self.suffix.as_deref().map_or(true, str::is_empty)
    }

    pub fn apply(&self, text: &str) -> String {
        let prefix = self.prefix.as_deref().unwrap_or("");
        let suffix = self.suffix.as_deref().unwrap_or("");
        format!("{prefix}{text}{suffix}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
    Character,
}

impl Boundary {
    fn finer(self) -> Boundary {
        match self {
            Boundary::Paragraph => Boundary::Line,
            Boundary::Line => Boundary::Sentence,
            Boundary::Sentence => Boundary::Word,
            Boundary::Word | Boundary::Character => Boundary::Character,
        }
    }

    fn separator(self) -> Option<&'static Regex> {
        static PARAGRAPH: OnceLock<Option<Regex>> = OnceLock::new();
        static LINE: OnceLock<Option<Regex>> = OnceLock::new();
        static SENTENCE: OnceLock<Option<Regex>> = OnceLock::new();
        static WORD: OnceLock<Option<Regex>> = OnceLock::new();

        let (cell, pattern) = match self {
            Boundary::Paragraph => (&PARAGRAPH, r"\n(?:[ \t]*\n)+"),
            Boundary::Line => (&LINE, r"\n"),
            Boundary::Sentence => (&SENTENCE, r#"[.!?]+["'”’)\]]*\s+"#),
            Boundary::Word => (&WORD, r"\s+"),
            Boundary::Character => return None,
        };
        cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
    }
}

/// Split `text` (with optional decorations) into chunks of at most `limit`
/// characters. Empty input yields a single empty chunk. A `limit` of 0 is
/// treated as 1.
pub fn segment(text: &str, limit: usize, decorations: Option<&Decorations>) -> Vec<MessageChunk> {
    let limit = limit.max(1);
    let source = match decorations {
        Some(d) if !d.is_empty() => d.apply(text),
        _ => text.to_string(),
    };

    let ranges = if char_len(&source) <= limit {
        vec![0..source.len()]
    } else {
        split_range(&source, 0..source.len(), limit, Boundary::Paragraph)
    };

    let total = ranges.len();
    ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| MessageChunk {
            index,
            text: source[range].to_string(),
            is_first: index == 0,
            is_last: index + 1 == total,
        })
        .collect()
}

/// Plain text chunks, for callers that don't need chunk metadata
pub fn segment_text(text: &str, limit: usize) -> Vec<String> {
    segment(text, limit, None).into_iter().map(|c| c.text).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Greedily pack units of `range` at `boundary`, recursing to a finer
/// boundary for any unit that alone exceeds `limit`.
fn split_range(source: &str, range: Range<usize>, limit: usize, boundary: Boundary) -> Vec<Range<usize>> {
    if boundary == Boundary::Character {
        return hard_split(source, range, limit);
    }
    let units = match boundary.separator() {
        Some(separator) => units_of(source, range, separator),
        None => return split_range(source, range, limit, boundary.finer()),
    };

    let mut chunks = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;

    for unit in units {
        let unit_len = char_len(&source[unit.clone()]);

        if unit_len > limit {
            if let Some((open, _)) = current.take() {
                chunks.push(open);
            }
            let mut pieces = split_range(source, unit, limit, boundary.finer());
            // The last piece stays open so following units can pack onto it
            if let Some(last) = pieces.pop() {
                let last_len = char_len(&source[last.clone()]);
                chunks.extend(pieces);
                current = Some((last, last_len));
            }
            continue;
        }

        current = match current.take() {
            Some((open, len)) if len + unit_len <= limit => Some((open.start..unit.end, len + unit_len)),
            Some((open, _)) => {
                chunks.push(open);
                Some((unit, unit_len))
            }
            None => Some((unit, unit_len)),
        };
    }

    if let Some((open, _)) = current {
        chunks.push(open);
    }
    chunks
}

/// Cut `range` after every separator match; every byte lands in exactly one unit
fn units_of(source: &str, range: Range<usize>, separator: &Regex) -> Vec<Range<usize>> {
    let slice = &source[range.clone()];
    let mut units = Vec::new();
    let mut start = 0;

    for m in separator.find_iter(slice) {
        if m.end() > start {
            units.push(range.start + start..range.start + m.end());
            start = m.end();
        }
    }
    if start < slice.len() {
        units.push(range.start + start..range.end);
    }
    units
}

fn hard_split(source: &str, range: Range<usize>, limit: usize) -> Vec<Range<usize>> {
    let slice = &source[range.clone()];
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in slice.char_indices() {
        if count == limit {
            pieces.push(range.start + start..range.start + offset);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < slice.len() {
        pieces.push(range.start + start..range.end);
    }
    pieces
}
