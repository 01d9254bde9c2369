//! Source-code synthesis for session state persistence.
//!
//! Rewrites a user script so that a stateless execution restores the session
//! variables up front, persists them at the end, and still yields the value
//! of the user's own trailing expression. Statement-vs-expression detection
//! is line-prefix/regex based by design: no independent syntax facility is
//! available, so the transform is best-effort and the generated persist code
//! is permissive enough to absorb false positives.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

/// Reserved external function the prelude calls to fetch session state.
pub const RESTORE_STATE_FN: &str = "__restore_state__";
/// Reserved external function the postamble calls to hand state back.
pub const PERSIST_STATE_FN: &str = "__persist_state__";

const STATE_VAR: &str = "__state__";
const RESULT_VAR: &str = "__result__";
const VARS_VAR: &str = "__vars__";

/// Lines opening with one of these are statements, never bare expressions.
/// `await` is deliberately absent: a top-level `await f()` is an expression
/// whose value the user expects back.
static STATEMENT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:assert|async|break|class|continue|def|del|elif|else|except|finally|for|from|global|if|import|nonlocal|pass|raise|return|try|while|with|yield)\b",
    )
    .expect("statement keyword pattern")
});

/// Matches a line that assigns to a simple/tuple/attribute/subscript target,
/// including annotated and augmented forms. `==` is not an assignment.
static ASSIGNMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[A-Za-z_][A-Za-z0-9_]*",
        r"(?:[ \t]*,[ \t]*[A-Za-z_][A-Za-z0-9_]*|\.[A-Za-z_][A-Za-z0-9_]*|\[[^\]]*\])*",
        r"[ \t]*(?::[^=\n]+)?",
        r"(?:=|\+=|-=|\*=|/=|//=|%=|@=|&=|\|=|\^=|>>=|<<=|\*\*=)",
        r"(?:[^=]|$)",
    ))
    .expect("assignment line pattern")
});

/// Captures the bare-name targets of an assignment anywhere in the script.
/// Indented matches inside function bodies are deliberate false positives;
/// the runtime `NameError` guard in the persist postamble absorbs them.
static ASSIGN_TARGETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[ \t]*([A-Za-z_][A-Za-z0-9_]*(?:[ \t]*,[ \t]*[A-Za-z_][A-Za-z0-9_]*)*)",
        r"[ \t]*(?::[^=\n]+)?",
        r"(?:=|\+=|-=|\*=|/=|//=|%=|@=|&=|\|=|\^=|>>=|<<=|\*\*=)",
        r"(?:[^=]|$)",
    ))
    .expect("assignment target pattern")
});

pub(crate) struct Synthesized {
    pub(crate) code: String,
    /// Whether the trailing bare expression was rewritten into the reserved
    /// temporary (and re-emitted after the persist postamble).
    pub(crate) captures_result: bool,
}

/// Wrap `user_code` with the restore prelude and the persist postamble.
///
/// `known_keys` are the variable names currently held in session state; they
/// are unpacked into the script's top-level namespace and always persisted
/// back, together with any assignment target the heuristic discovers.
pub(crate) fn synthesize(user_code: &str, known_keys: &[String]) -> Synthesized {
    let lines: Vec<&str> = user_code.lines().collect();
    let capture = find_capture(&lines);

    let restorable: BTreeSet<&String> = known_keys
        .iter()
        .filter(|key| usable_name(key.as_str()))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "{STATE_VAR} = {RESTORE_STATE_FN}()");
    for key in &restorable {
        let _ = writeln!(out, "{key} = {STATE_VAR}[{key:?}]");
    }

    for (index, line) in lines.iter().enumerate() {
        match capture {
            Some(span) if index == span.start && index == span.end => {
                let expr = strip_trailing_comment(line);
                let _ = writeln!(out, "{RESULT_VAR} = ({expr})");
            }
            Some(span) if index == span.start => {
                let _ = writeln!(out, "{RESULT_VAR} = ({line}");
            }
            Some(span) if index == span.end => {
                let expr = strip_trailing_comment(line);
                let _ = writeln!(out, "{expr})");
            }
            _ => {
                let _ = writeln!(out, "{line}");
            }
        }
    }

    let mut names: BTreeSet<String> = discover_assigned_names(&lines);
    names.extend(known_keys.iter().cloned());
    names.retain(|name| usable_name(name));

    let _ = writeln!(out, "{VARS_VAR} = {{}}");
    for name in &names {
        let _ = writeln!(out, "try:");
        let _ = writeln!(out, "    {VARS_VAR}[{name:?}] = {name}");
        let _ = writeln!(out, "except NameError:");
        let _ = writeln!(out, "    pass");
    }
    let _ = writeln!(out, "{PERSIST_STATE_FN}({VARS_VAR})");

    if capture.is_some() {
        let _ = writeln!(out, "{RESULT_VAR}");
    }

    Synthesized {
        code: out,
        captures_result: capture.is_some(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CaptureSpan {
    start: usize,
    end: usize,
}

/// Locate the trailing bare expression, if any, as an inclusive span of
/// physical lines. A closing-heavy final line is joined backwards through
/// its bracket-continuation group before the statement checks run.
fn find_capture(lines: &[&str]) -> Option<CaptureSpan> {
    let end = lines.iter().rposition(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })?;

    let mut start = end;
    let mut balance = net_bracket_balance(lines[end]);
    while balance < 0 && start > 0 {
        start -= 1;
        balance += net_bracket_balance(lines[start]);
    }
    if balance != 0 {
        return None;
    }

    let head = lines[start];
    if head.starts_with(char::is_whitespace) || head.starts_with('@') {
        return None;
    }
    if STATEMENT_KEYWORD.is_match(head) || ASSIGNMENT_LINE.is_match(head) {
        return None;
    }
    if strip_trailing_comment(lines[end]).ends_with(':') {
        return None;
    }

    Some(CaptureSpan { start, end })
}

fn discover_assigned_names(lines: &[&str]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for line in lines {
        if let Some(captures) = ASSIGN_TARGETS.captures(line) {
            for name in captures[1].split(',') {
                names.insert(name.trim().to_string());
            }
        }
    }
    names
}

/// Net `(`/`[`/`{` depth of one line, ignoring bracket characters inside
/// string literals and everything after an unquoted `#`.
fn net_bracket_balance(line: &str) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => break,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn strip_trailing_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (position, c) in line.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => return line[..position].trim_end(),
            _ => {}
        }
    }
    line.trim_end()
}

fn usable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
