//! Lexical primitives shared by the config dialects: a byte cursor, quoted
//! strings, identifiers, duration and integer literals, and the small JSON
//! subset used for canned SQL result fixtures.

use serde_json::{Map, Number, Value};
use std::time::Duration;

use super::error::SyntaxError;
use crate::models::DataRow;

/// Fallback used when a duration string cannot be understood.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

/// Forward-only reader over the input with cheap backtracking via `pos`/`reset`.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    /// Skips whitespace; returns whether anything was skipped.
    pub fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    pub fn expect(&mut self, expected: char, what: &'static str) -> Result<(), SyntaxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SyntaxError::unexpected(what, self.rest(), self.pos))
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.input[start..self.pos]
    }
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// `[letters digits - _]+`
pub fn identifier<'a>(cur: &mut Cursor<'a>) -> Option<&'a str> {
    let ident = cur.take_while(is_identifier_char);
    (!ident.is_empty()).then_some(ident)
}

/// Single-quoted string where a doubled quote (`''`) is a literal quote.
pub fn single_quoted(cur: &mut Cursor<'_>) -> Result<Option<String>, SyntaxError> {
    let start = cur.pos();
    if !cur.eat('\'') {
        return Ok(None);
    }
    let mut text = String::new();
    loop {
        match cur.bump() {
            Some('\'') => {
                if cur.eat('\'') {
                    text.push('\'');
                } else {
                    return Ok(Some(text));
                }
            }
            Some(c) => text.push(c),
            None => return Err(SyntaxError::UnterminatedString(start)),
        }
    }
}

/// Double-quoted string without escapes.
pub fn double_quoted(cur: &mut Cursor<'_>) -> Result<Option<String>, SyntaxError> {
    let start = cur.pos();
    if !cur.eat('"') {
        return Ok(None);
    }
    let body = cur.take_while(|c| c != '"');
    if !cur.eat('"') {
        return Err(SyntaxError::UnterminatedString(start));
    }
    Ok(Some(body.to_string()))
}

pub fn quoted(cur: &mut Cursor<'_>) -> Result<Option<String>, SyntaxError> {
    match cur.peek() {
        Some('\'') => single_quoted(cur),
        Some('"') => double_quoted(cur),
        _ => Ok(None),
    }
}

/// Unsigned decimal digits as an integer.
pub fn integer(cur: &mut Cursor<'_>) -> Result<Option<i64>, SyntaxError> {
    let start = cur.pos();
    let digits = cur.take_while(|c| c.is_ascii_digit());
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<i64>()
        .map(Some)
        .map_err(|_| SyntaxError::InvalidNumber {
            text: digits.to_string(),
            offset: start,
        })
}

/// `<digits>` followed by `ms`, `s`, `m` or `h`. Backtracks and returns
/// `Ok(None)` when no unit follows the number.
pub fn duration(cur: &mut Cursor<'_>) -> Result<Option<Duration>, SyntaxError> {
    let start = cur.pos();
    let digits = cur.take_while(|c| c.is_ascii_digit());
    if digits.is_empty() {
        return Ok(None);
    }
    let unit_ms: u64 = if cur.eat_str("ms") {
        1
    } else if cur.eat('s') {
        1_000
    } else if cur.eat('m') {
        60_000
    } else if cur.eat('h') {
        3_600_000
    } else {
        cur.reset(start);
        return Ok(None);
    };
    let invalid = || SyntaxError::InvalidNumber {
        text: digits.to_string(),
        offset: start,
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let millis = value.checked_mul(unit_ms).ok_or_else(invalid)?;
    Ok(Some(Duration::from_millis(millis)))
}

/// Whole-string duration match (`^\d+(ms|s|m|h)$`), surrounding whitespace ignored.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut cur = Cursor::new(text.trim());
    match duration(&mut cur) {
        Ok(Some(d)) if cur.is_eof() => Some(d),
        _ => None,
    }
}

/// Lenient conversion: anything that is not a duration literal becomes 60 s.
pub fn parse_duration_or_default(text: &str) -> Duration {
    parse_duration(text).unwrap_or(DEFAULT_DURATION)
}

/// Renders a duration back into a literal that `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

/// Tracks whether a scan position is inside a quoted region. Either quote
/// character opens a region that only the same character closes. A doubled
/// quote (`''`) closes and reopens, so it stays inside the region.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuoteState {
    open: Option<char>,
    backslash_escapes: bool,
    after_backslash: bool,
}

impl QuoteState {
    /// A quote preceded by a backslash never toggles.
    pub fn with_backslash_escapes() -> Self {
        Self {
            backslash_escapes: true,
            ..Self::default()
        }
    }

    pub fn feed(&mut self, c: char) {
        if self.backslash_escapes {
            let escaped = self.after_backslash;
            self.after_backslash = c == '\\' && !escaped;
            if escaped {
                return;
            }
        }
        match self.open {
            Some(q) if c == q => self.open = None,
            None if c == '\'' || c == '"' => self.open = Some(c),
            _ => {}
        }
    }

    pub fn in_quotes(&self) -> bool {
        self.open.is_some()
    }
}

/// Drops `#` comments up to the end of their line (quoted `#` is kept) and
/// normalises line endings to `\n`. `quotes` decides how quoted regions end.
pub fn strip_comments(input: &str, mut quotes: QuoteState) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut in_comment = false;
    for c in normalized.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push(c);
            }
            continue;
        }
        if c == '#' && !quotes.in_quotes() {
            in_comment = true;
            continue;
        }
        quotes.feed(c);
        out.push(c);
    }
    out
}

/// `[ {..}, {..} ]`; arrays hold objects only.
pub fn json_array(cur: &mut Cursor<'_>) -> Result<Option<Vec<DataRow>>, SyntaxError> {
    if !cur.eat('[') {
        return Ok(None);
    }
    let mut rows = Vec::new();
    cur.skip_whitespace();
    if cur.eat(']') {
        return Ok(Some(rows));
    }
    loop {
        cur.skip_whitespace();
        match json_object(cur)? {
            Some(row) => rows.push(row),
            None => return Err(SyntaxError::unexpected("'{'", cur.rest(), cur.pos())),
        }
        cur.skip_whitespace();
        if cur.eat(',') {
            continue;
        }
        cur.expect(']', "',' or ']'")?;
        return Ok(Some(rows));
    }
}

fn json_object(cur: &mut Cursor<'_>) -> Result<Option<Map<String, Value>>, SyntaxError> {
    if !cur.eat('{') {
        return Ok(None);
    }
    let mut object = Map::new();
    cur.skip_whitespace();
    if cur.eat('}') {
        return Ok(Some(object));
    }
    loop {
        cur.skip_whitespace();
        let key = double_quoted(cur)?
            .ok_or_else(|| SyntaxError::unexpected("a quoted key", cur.rest(), cur.pos()))?;
        cur.skip_whitespace();
        cur.expect(':', "':'")?;
        cur.skip_whitespace();
        let value = json_value(cur)?;
        object.insert(key, value);
        cur.skip_whitespace();
        if cur.eat(',') {
            continue;
        }
        cur.expect('}', "',' or '}'")?;
        return Ok(Some(object));
    }
}

fn json_value(cur: &mut Cursor<'_>) -> Result<Value, SyntaxError> {
    if cur.eat_str("true") {
        return Ok(Value::Bool(true));
    }
    if cur.eat_str("false") {
        return Ok(Value::Bool(false));
    }
    if cur.eat_str("null") {
        return Ok(Value::Null);
    }
    if let Some(text) = double_quoted(cur)? {
        return Ok(Value::String(text));
    }
    if let Some(object) = json_object(cur)? {
        return Ok(Value::Object(object));
    }
    json_number(cur)
}

fn json_number(cur: &mut Cursor<'_>) -> Result<Value, SyntaxError> {
    let start = cur.pos();
    let negative = cur.eat('-');
    let whole = cur.take_while(|c| c.is_ascii_digit());
    if whole.is_empty() {
        cur.reset(start);
        return Err(SyntaxError::unexpected("a JSON value", cur.rest(), start));
    }
    let mut fraction = "";
    let before_dot = cur.pos();
    if cur.eat('.') {
        fraction = cur.take_while(|c| c.is_ascii_digit());
        if fraction.is_empty() {
            cur.reset(before_dot);
        }
    }
    let sign = if negative { "-" } else { "" };
    let invalid = |text: String| SyntaxError::InvalidNumber { text, offset: start };
    if fraction.is_empty() {
        let text = format!("{sign}{whole}");
        text.parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(text))
    } else {
        let text = format!("{sign}{whole}.{fraction}");
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn durations_convert_exactly() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1ms"), Some(Duration::from_millis(1)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn bad_durations_fall_back_to_sixty_seconds() {
        assert_eq!(parse_duration("10d"), None);
        assert_eq!(parse_duration("1.5s"), None);
        assert_eq!(parse_duration_or_default("soon"), DEFAULT_DURATION);
        assert_eq!(parse_duration_or_default(""), DEFAULT_DURATION);
        assert_eq!(parse_duration_or_default(&format_duration(Duration::from_millis(1500))), Duration::from_millis(1500));
    }

    #[test]
    fn duration_backtracks_without_unit() {
        let mut cur = Cursor::new("443 ");
        assert_eq!(duration(&mut cur).unwrap(), None);
        assert_eq!(cur.pos(), 0);
        assert_eq!(integer(&mut cur).unwrap(), Some(443));
    }

    #[test]
    fn single_quotes_unescape_doubled_quote() {
        let mut cur = Cursor::new("'it''s \"fine\"' rest");
        assert_eq!(single_quoted(&mut cur).unwrap().as_deref(), Some("it's \"fine\""));
        assert_eq!(cur.rest(), " rest");
    }

    #[test]
    fn unterminated_strings_fail() {
        let mut cur = Cursor::new("'never closed");
        assert_eq!(single_quoted(&mut cur), Err(SyntaxError::UnterminatedString(0)));
        let mut cur = Cursor::new("\"open");
        assert_eq!(double_quoted(&mut cur), Err(SyntaxError::UnterminatedString(0)));
    }

    #[test]
    fn double_quotes_take_single_quotes_literally() {
        let mut cur = Cursor::new("\"it's\"");
        assert_eq!(double_quoted(&mut cur).unwrap().as_deref(), Some("it's"));
    }

    #[test]
    fn json_array_of_objects() {
        let mut cur = Cursor::new(
            r#"[
              { "id": 1, "name": "test", "ratio": 0.5, "ok": true, "gone": null },
              { "nested": { "x": -2 } }
            ]"#,
        );
        let rows = json_array(&mut cur).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("test"));
        assert_eq!(rows[0]["ratio"], json!(0.5));
        assert_eq!(rows[0]["ok"], json!(true));
        assert_eq!(rows[0]["gone"], Value::Null);
        assert_eq!(rows[1]["nested"], json!({ "x": -2 }));
        assert!(cur.is_eof());
    }

    #[test]
    fn json_array_rejects_scalars() {
        let mut cur = Cursor::new("[1, 2]");
        assert!(json_array(&mut cur).is_err());
    }

    #[test]
    fn comments_are_stripped_outside_quotes_only() {
        let text = "a 1 # trailing\r\n.url 'http://x/#frag' # gone\n# don't\nb";
        assert_eq!(
            strip_comments(text, QuoteState::default()),
            "a 1 \n.url 'http://x/#frag' \n\nb"
        );
    }

    #[test]
    fn trailing_backslash_closes_plain_quotes() {
        let text = ".command 'dir C:\\'  # list drive\n.host 'h' # done";
        assert_eq!(
            strip_comments(text, QuoteState::default()),
            ".command 'dir C:\\'  \n.host 'h' "
        );

        let mut quotes = QuoteState::default();
        for c in "'it''s'".chars() {
            quotes.feed(c);
        }
        assert!(!quotes.in_quotes());
    }

    #[test]
    fn escaped_quote_does_not_toggle() {
        let mut quotes = QuoteState::with_backslash_escapes();
        for c in "\"a\\\"b".chars() {
            quotes.feed(c);
        }
        assert!(quotes.in_quotes());
        quotes.feed('"');
        assert!(!quotes.in_quotes());
    }

    #[test]
    fn identifiers_allow_dash_and_underscore() {
        let mut cur = Cursor::new("_my-service_1 {");
        assert_eq!(identifier(&mut cur), Some("_my-service_1"));
        assert_eq!(identifier(&mut cur), None);
    }
}
