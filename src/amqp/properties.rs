//! A reader for the flat `key=value` text format used to ship session parameters
//! (the `.properties` format).
use std::collections::BTreeMap;
use std::io::Read;
use std::ops::Range;
use std::str::Chars;

const HIGH_SURROGATES: Range<u32> = 0xD800..0xDC00;
const LOW_SURROGATES: Range<u32> = 0xDC00..0xE000;

/// The raw key/value pairs read from a properties source.
///
/// Keys are case-sensitive. When a key appears more than once the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Read all properties from `reader`.
    ///
    /// The source is decoded as UTF-8, falling back to ISO-8859-1 when it is not valid UTF-8.
    pub fn load(mut reader: impl Read) -> Result<Self, std::io::Error> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => e.as_bytes().iter().map(|&byte| char::from(byte)).collect(),
        };
        Ok(Self::parse(&text))
    }

    /// Parse properties from an in-memory string.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let mut logical = line.trim_start().to_owned();
            if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
                continue;
            }
            // A line ending with an odd number of backslashes continues on the next one.
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }
            let (key, value) = split_entry(&logical);
            entries.insert(unescape(key), unescape(value));
        }
        Self { entries }
    }

    /// Look up the value associated with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split a logical line on the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match decode_code_unit(&code, &mut chars) {
                    Some(decoded) => out.push(decoded),
                    // Malformed escapes are kept verbatim.
                    None => {
                        out.push_str("\\u");
                        out.push_str(&code);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Decode the hex digits of a `\uXXXX` escape.
///
/// A high surrogate is only valid when immediately followed by an escaped low surrogate,
/// which is then consumed from `rest`.
fn decode_code_unit(code: &str, rest: &mut Chars<'_>) -> Option<char> {
    let unit = u32::from_str_radix(code, 16).ok()?;
    if !HIGH_SURROGATES.contains(&unit) {
        return char::from_u32(unit);
    }
    let mut lookahead = rest.clone();
    if lookahead.next() != Some('\\') || lookahead.next() != Some('u') {
        return None;
    }
    let low_code: String = lookahead.by_ref().take(4).collect();
    let low = u32::from_str_radix(&low_code, 16)
        .ok()
        .filter(|low| LOW_SURROGATES.contains(low))?;
    *rest = lookahead;
    char::from_u32(0x10000 + ((unit - HIGH_SURROGATES.start) << 10) + (low - LOW_SURROGATES.start))
}
