use thiserror::Error;

const CONTEXT_CHARS: usize = 100;

/// What went wrong, with the byte offset into the preprocessed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("block `{name}` opened at offset {offset} is never closed")]
    UnclosedBlock { name: String, offset: usize },
    #[error("unexpected '}}' at offset {0}")]
    UnexpectedCloseBrace(usize),
    #[error("attribute `{name}` at offset {offset} has no value")]
    MissingValue { name: String, offset: usize },
    #[error("invalid number `{text}` at offset {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("expected {expected} at offset {offset}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
        offset: usize,
    },
}

impl SyntaxError {
    pub(crate) fn unexpected(expected: &'static str, rest: &str, offset: usize) -> Self {
        let found = match rest.chars().next() {
            Some(c) => format!("'{c}'"),
            None => "end of input".to_string(),
        };
        SyntaxError::Unexpected {
            expected,
            found,
            offset,
        }
    }
}

/// A config text that could not be parsed. Always fatal for the parse call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse config: {reason}. Input length: {input_len}, First 100 chars: {prefix}")]
pub struct ParseError {
    pub reason: SyntaxError,
    pub input_len: usize,
    pub prefix: String,
}

impl ParseError {
    pub fn new(reason: SyntaxError, input: &str) -> Self {
        Self {
            reason,
            input_len: input.len(),
            prefix: input.chars().take(CONTEXT_CHARS).collect(),
        }
    }
}
