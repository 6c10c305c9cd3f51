use std::fmt::{self, Write};

pub const TAG_WIDTH: usize = 4;

/// Fixed-width field identifier, space padded (`"Id  "`, `"Str "`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag([u8; TAG_WIDTH]);

impl Tag {
    pub const fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut tag = [b' '; TAG_WIDTH];
        let mut idx = 0;
        while idx < bytes.len() && idx < TAG_WIDTH {
            tag[idx] = bytes[idx];
            idx += 1;
        }
        Tag(tag)
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        let bytes = prefix.as_bytes();
        if bytes.is_empty() || bytes.len() > TAG_WIDTH || !bytes[0].is_ascii_alphanumeric() {
            return None;
        }
        if !bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' ') {
            return None;
        }
        let mut tag = [b' '; TAG_WIDTH];
        tag[..bytes.len()].copy_from_slice(bytes);
        Some(Tag(tag))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unparsable;

pub fn encode_line(tag: Tag, value: &str) -> String {
    let mut line = String::with_capacity(TAG_WIDTH + 3 + value.len());
    let _ = write_line(&mut line, tag, value);
    line
}

pub fn write_line<W: Write, V: fmt::Display>(out: &mut W, tag: Tag, value: V) -> fmt::Result {
    writeln!(out, "{}: {}", tag, value)
}

/// Header line opening a sub-record section or text block.
pub fn write_header<W: Write>(out: &mut W, tag: Tag) -> fmt::Result {
    writeln!(out, "{}:", tag)
}

/// Splits a line into its tag and raw value. Accepts `TAGV: value`,
/// `TAGV value`, a bare `TAGV` and a short tag closed early by a colon
/// (`Id: 5`).
pub fn decode_line(line: &str) -> Result<(Tag, &str), Unparsable> {
    let line = line.trim();
    let bytes = line.as_bytes();
    let (tag, rest) = match line.find(':') {
        Some(colon) if colon <= TAG_WIDTH => {
            let tag = Tag::from_prefix(line[..colon].trim_end()).ok_or(Unparsable)?;
            (tag, &line[colon + 1..])
        }
        _ => {
            if bytes.len() < TAG_WIDTH || !line.is_char_boundary(TAG_WIDTH) {
                return Err(Unparsable);
            }
            if bytes.len() > TAG_WIDTH && bytes[TAG_WIDTH] != b' ' {
                return Err(Unparsable);
            }
            let tag = Tag::from_prefix(&line[..TAG_WIDTH]).ok_or(Unparsable)?;
            (tag, &line[TAG_WIDTH..])
        }
    };
    Ok((tag, rest.trim_start()))
}

pub fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

pub fn parse_ints(value: &str) -> Option<Vec<i64>> {
    value
        .split_whitespace()
        .map(|field| field.parse::<i64>().ok())
        .collect()
}

pub fn encode_pair(first: i64, second: i64) -> String {
    format!("{}/{}", first, second)
}

pub fn decode_pair(value: &str) -> Option<(i64, i64)> {
    let (first, second) = value.split_once('/')?;
    Some((parse_int(first)?, parse_int(second)?))
}

/// Letter encoding of one flag word: bits 0-25 are `a`-`z`, bits 26-31 are
/// `A`-`F`, an empty word is `0`.
pub fn encode_flag_word(word: u32) -> String {
    if word == 0 {
        return "0".to_string();
    }
    let mut text = String::new();
    for bit in 0..32u32 {
        if word & (1 << bit) != 0 {
            let letter = if bit < 26 {
                b'a' + bit as u8
            } else {
                b'A' + (bit - 26) as u8
            };
            text.push(letter as char);
        }
    }
    text
}

/// Accepts the letter encoding or a plain decimal word.
pub fn decode_flag_word(text: &str) -> Option<u32> {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<u32>().ok();
    }
    let mut word = 0u32;
    for b in text.bytes() {
        let bit = match b {
            b'a'..=b'z' => b - b'a',
            b'A'..=b'F' => 26 + (b - b'A'),
            _ => return None,
        };
        word |= 1 << bit;
    }
    Some(word)
}

pub fn encode_flags(words: &[u32; 4]) -> String {
    words
        .iter()
        .map(|word| encode_flag_word(*word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Older files carry fewer than four words; missing words are empty.
pub fn decode_flags(value: &str) -> Option<[u32; 4]> {
    let mut words = [0u32; 4];
    let mut count = 0;
    for (idx, field) in value.split_whitespace().enumerate() {
        if idx >= words.len() {
            return None;
        }
        words[idx] = decode_flag_word(field)?;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(words)
}

/// Writes a multi-line text block: header, the text's lines, then `~`.
pub fn write_block<W: Write>(out: &mut W, tag: Tag, text: &str) -> fmt::Result {
    write_header(out, tag)?;
    for line in text.split('\n') {
        writeln!(out, "{}", line.trim_end_matches('\r'))?;
    }
    writeln!(out, "~")
}

/// Line source over a record's text.
pub struct LineCursor<'a> {
    lines: std::str::Split<'a, char>,
    pending: Option<&'a str>,
    line_number: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            lines: data.split('\n'),
            pending: None,
            line_number: 0,
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn next_raw(&mut self) -> Option<&'a str> {
        if let Some(line) = self.pending.take() {
            self.line_number += 1;
            return Some(line);
        }
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    /// Hands `line` back so the next read returns it again.
    pub fn push_back(&mut self, line: &'a str) {
        self.pending = Some(line);
        self.line_number = self.line_number.saturating_sub(1);
    }

    /// Next line that carries data: blank lines and `*` comments are skipped.
    pub fn next_data(&mut self) -> Option<&'a str> {
        loop {
            let line = self.next_raw()?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('*') {
                continue;
            }
            return Some(line);
        }
    }

    /// Reads a text block body up to its `~` line. The flag is false when
    /// the data ran out first.
    pub fn read_block(&mut self) -> (String, bool) {
        let mut lines: Vec<&str> = Vec::new();
        while let Some(line) = self.next_raw() {
            if line == "~" {
                return (lines.join("\n"), true);
            }
            lines.push(line);
        }
        (lines.join("\n"), false)
    }
}
