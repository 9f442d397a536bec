//! Source-text checks for array-method callbacks that only render markup.

use crate::types::models::{FunctionMapping, SourceRange};
use regex::Regex;
use std::sync::OnceLock;

static ARRAY_METHOD_CALL: OnceLock<Regex> = OnceLock::new();

fn array_method_call() -> &'static Regex {
    ARRAY_METHOD_CALL.get_or_init(|| {
        Regex::new(r"\.(map|filter|reduce|forEach|find|some|every)\s*\(")
            .expect("array method pattern is valid")
    })
}

/// Source text split into lines, with 1-based access
pub struct SourceLines<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> SourceLines<'a> {
    pub fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        Self { text, starts }
    }

    /// Line `line` (1-based) without its terminator
    pub fn line(&self, line: u32) -> Option<&'a str> {
        let index = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(index)?;
        let end = self
            .starts
            .get(index + 1)
            .map_or(self.text.len(), |next| next - 1);
        self.text
            .get(start..end)
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
    }

    /// Lines `first..=last`, missing lines ignored
    pub fn lines(&self, first: u32, last: u32) -> impl Iterator<Item = &'a str> + '_ {
        (first..=last.max(first)).filter_map(|line| self.line(line))
    }

    /// Text covered by `range`; columns are taken as byte columns
    pub fn slice(&self, range: &SourceRange) -> Option<&'a str> {
        let start = self.offset(range.start.line, range.start.column)?;
        let end = self
            .offset(range.end.line, range.end.column)
            .unwrap_or(self.text.len())
            .max(start);
        self.text.get(start..end)
    }

    fn offset(&self, line: u32, column: u32) -> Option<usize> {
        let text = self.line(line)?;
        let start = self.starts[(line - 1) as usize];
        Some(start + (column as usize).min(text.len()))
    }
}

/// Whether `line` (or the line before it) calls one of the array iteration methods
pub fn has_array_method_call(lines: &SourceLines<'_>, line: u32) -> bool {
    let current = lines.line(line);
    let previous = line.checked_sub(1).and_then(|prev| lines.line(prev));
    [current, previous]
        .into_iter()
        .flatten()
        .any(|text| array_method_call().is_match(text))
}

/// Whether a function's body is (or immediately returns) a markup element
pub fn body_is_markup(function_text: &str) -> bool {
    let body = match function_text.find("=>") {
        Some(arrow) => &function_text[arrow + 2..],
        None => match function_text.find(')') {
            Some(close) => &function_text[close + 1..],
            None => return false,
        },
    };

    let body = body.trim_start();
    let expression = match body.strip_prefix('{') {
        Some(block) => match block.trim_start().strip_prefix("return") {
            Some(returned) => returned,
            None => return false,
        },
        None => body,
    };

    expression
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .starts_with('<')
}

/// Anonymous array-method callback whose body is markup
pub fn is_markup_callback(function: &FunctionMapping, lines: &SourceLines<'_>) -> bool {
    if !function.is_anonymous() {
        return false;
    }
    if !has_array_method_call(lines, function.loc.start.line) {
        return false;
    }
    lines.slice(&function.loc).is_some_and(body_is_markup)
}
