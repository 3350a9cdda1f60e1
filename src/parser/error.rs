//! User-friendly parse error types and formatting.
//!
//! Converts raw pest parser errors into structured diagnostics with the
//! offending source line, a caret under the failing column, and a hint for
//! the mistakes people actually make in command scripts.

use std::fmt;

use super::Rule;

/// A structured, user-friendly parser error.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message (no raw rule names).
    pub message: String,
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed) where the error begins.
    pub col: usize,
    /// End column for span errors (used to size the underline caret).
    pub col_end: Option<usize>,
    /// The full text of the offending source line.
    pub source_line: Option<String>,
    /// Optional script path shown in the error header.
    pub filename: Option<String>,
    /// Optional suggestion to help the user fix the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Build a `ParseError` from a pest error, enriching it with source context.
    pub fn from_pest(
        error: &pest::error::Error<Rule>,
        source: &str,
        filename: Option<&str>,
    ) -> Self {
        let (line, col, col_end) = match error.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c, None),
            pest::error::LineColLocation::Span((sl, sc), (el, ec)) => {
                let end = if sl == el { Some(ec) } else { None };
                (sl, sc, end)
            }
        };

        let source_line = source
            .lines()
            .nth(line.saturating_sub(1))
            .map(str::to_string);

        let (message, hint) = match &error.variant {
            pest::error::ErrorVariant::ParsingError { positives, .. } => (
                friendly_message(positives),
                friendly_hint(positives, source_line.as_deref()),
            ),
            pest::error::ErrorVariant::CustomError { message } => (message.clone(), None),
        };

        ParseError {
            message,
            line,
            col,
            col_end,
            source_line,
            filename: filename.map(str::to_string),
            hint,
        }
    }
}

/// Return a short, user-facing label for a grammar rule, or `None` to omit it.
fn rule_label(rule: Rule) -> Option<&'static str> {
    match rule {
        Rule::identifier => Some("name"),
        Rule::block => Some("block (`{ ... }`)"),
        Rule::param_list => Some("parameter list"),
        Rule::function_def => Some("function definition"),
        Rule::action_def => Some("action definition"),
        Rule::let_stmt => Some("`let` binding"),
        Rule::if_stmt => Some("`if` statement"),
        Rule::for_stmt => Some("`for` loop"),
        Rule::return_stmt => Some("`return`"),
        Rule::expr | Rule::or_expr | Rule::postfix | Rule::primary => Some("expression"),
        Rule::call_args => Some("argument list (`(...)`)"),
        Rule::method => Some("method call"),
        Rule::index => Some("index (`[...]`)"),
        Rule::cmp_op => Some("`==` or `!=`"),
        Rule::string => Some("string"),
        Rule::integer => Some("integer"),
        Rule::boolean => Some("`true` or `false`"),
        Rule::list => Some("list"),
        Rule::kw_in => Some("`in`"),
        Rule::kw_else => Some("`else`"),
        _ => None,
    }
}

/// Compose a human-readable message from the expected rule set.
fn friendly_message(positives: &[Rule]) -> String {
    let mut named: Vec<&str> = positives.iter().copied().filter_map(rule_label).collect();
    named.dedup();

    match named.as_slice() {
        [] => "unexpected token".to_string(),
        [single] => format!("expected {single}"),
        [a, b] => format!("expected {a} or {b}"),
        [rest @ .., last] => format!("expected {} or {}", rest.join(", "), last),
    }
}

/// Return an actionable hint based on the set of expected rules and context.
fn friendly_hint(positives: &[Rule], source_line: Option<&str>) -> Option<String> {
    let has = |r: Rule| positives.contains(&r);

    if let Some(line) = source_line
        && line.matches('"').count() % 2 == 1
    {
        return Some("This line has an unterminated string; close it with `\"`.".to_string());
    }

    if has(Rule::block) {
        return Some(
            "Bodies of `fn`, `action`, `if` and `for` are wrapped in braces: `{ ... }`."
                .to_string(),
        );
    }

    if has(Rule::identifier) {
        return Some(
            "Names start with a letter or `_` and contain only letters, digits and `_`; \
             keywords such as `fn`, `let` or `in` cannot be used as names."
                .to_string(),
        );
    }

    None
}

/// Format the caret underline for an error at `col` with optional `col_end`.
fn underline(col: usize, col_end: Option<usize>) -> String {
    let start = col.saturating_sub(1);
    let len = col_end.map_or(1, |end| end.saturating_sub(col).max(1));
    format!("{}{}", " ".repeat(start), "^".repeat(len))
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        let location = match &self.filename {
            Some(name) => format!("{name}:{}:{}", self.line, self.col),
            None => format!("{}:{}", self.line, self.col),
        };
        writeln!(f, "  --> {location}")?;

        if let Some(ref src) = self.source_line {
            let num = self.line.to_string();
            let pad = " ".repeat(num.len());

            writeln!(f, "   {pad} |")?;
            writeln!(f, "   {num} | {src}")?;
            writeln!(f, "   {pad} | {}", underline(self.col, self.col_end))?;
        }

        if let Some(ref hint) = self.hint {
            writeln!(f)?;
            write!(f, "   = hint: {hint}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}
