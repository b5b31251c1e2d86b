// tokenizer.rs: line framing, label/tag/feature splitting and float lexing
use memchr::{memchr, memchr_iter, memrchr};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Strip a leading UTF-8 BOM and one trailing `\n` and `\r`.
pub fn strip_line(line: &[u8]) -> &[u8] {
    let mut out = line.strip_prefix(UTF8_BOM).unwrap_or(line);
    if let Some(rest) = out.strip_suffix(b"\n") {
        out = rest;
    }
    if let Some(rest) = out.strip_suffix(b"\r") {
        out = rest;
    }
    out
}

/// A raw line split into its label words, optional tag and feature region.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitExample<'a> {
    pub label_words: Vec<&'a [u8]>,
    pub tag: Option<&'a [u8]>,
    /// Everything from the first `|` to the end of the line (empty if none).
    pub features: &'a [u8],
    /// Byte offset of `features` within the line.
    pub features_offset: usize,
}

/// Split `line` at its first `|`.
///
/// Text before the bar is label text. If that text contains a tab only the
/// part after the last tab is used. The final word is taken as the tag when
/// it touches the bar, starts with `'` (which is stripped), or is a lone word
/// that cannot start a numeric label.
pub fn split_example(line: &[u8]) -> SplitExample<'_> {
    let bar = memchr(b'|', line).unwrap_or(line.len());
    let features = &line[bar..];

    if line.first() == Some(&b'|') {
        return SplitExample { label_words: Vec::new(), tag: None, features, features_offset: bar };
    }

    let label_start = memrchr(b'\t', &line[..bar]).map(|t| t + 1).unwrap_or(0);
    let label_space = &line[label_start..bar];
    let mut label_words = split_words(label_space);

    let mut tag = None;
    if let Some(&last) = label_words.last() {
        let touches_bar = label_space.last().map_or(false, |&b| b != b' ');
        let quoted = last.first() == Some(&b'\'');
        let lone_word = label_words.len() == 1 && !starts_numeric(last);
        if touches_bar || quoted || lone_word {
            label_words.pop();
            tag = Some(if quoted { &last[1..] } else { last });
        }
    }

    SplitExample { label_words, tag, features, features_offset: bar }
}

/// Split on spaces, dropping empty words.
pub fn split_words(text: &[u8]) -> Vec<&[u8]> {
    // Pre-reserve capacity based on space count to reduce reallocations
    let approx = memchr_iter(b' ', text).count() + 1;
    let mut out = Vec::with_capacity(approx.min(8));
    let mut start = 0usize;
    for pos in memchr_iter(b' ', text) {
        if pos > start {
            out.push(&text[start..pos]);
        }
        start = pos + 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn starts_numeric(word: &[u8]) -> bool {
    matches!(word.first(), Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.'))
}

fn special_word_len(bytes: &[u8]) -> Option<usize> {
    for word in [&b"infinity"[..], &b"inf"[..], &b"nan"[..]] {
        if bytes.len() >= word.len() && bytes[..word.len()].eq_ignore_ascii_case(word) {
            return Some(word.len());
        }
    }
    None
}

/// Lex a float starting at `start`, skipping leading blanks.
///
/// Returns the value and the position just past it. When no number can be
/// read the value is 0 and the returned position equals `start`, which is
/// how callers detect a malformed float.
pub fn parse_float(bytes: &[u8], start: usize) -> (f32, usize) {
    let n = bytes.len();
    let mut i = start;
    while i < n && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    let num_start = i;
    if i < n && (bytes[i] == b'-' || bytes[i] == b'+') {
        i += 1;
    }

    if let Some(len) = special_word_len(&bytes[i..]) {
        i += len;
    } else {
        let int_start = i;
        while i < n && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let mut digits = i - int_start;
        if i < n && bytes[i] == b'.' {
            let mut j = i + 1;
            while j < n && bytes[j].is_ascii_digit() {
                j += 1;
            }
            digits += j - (i + 1);
            if digits > 0 {
                i = j;
            }
        }
        if digits == 0 {
            return (0.0, start);
        }
        if i < n && (bytes[i] == b'e' || bytes[i] == b'E') {
            let mut j = i + 1;
            if j < n && (bytes[j] == b'-' || bytes[j] == b'+') {
                j += 1;
            }
            let exp_start = j;
            while j < n && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > exp_start {
                i = j;
            }
        }
    }

    match std::str::from_utf8(&bytes[num_start..i]).ok().and_then(|s| s.parse::<f32>().ok()) {
        Some(v) => (v, i),
        None => (0.0, start),
    }
}
