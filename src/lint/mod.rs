//! Script linting
//!
//! Linting only reports. Findings are logged in an eslint-like format and
//! never fail the task that ran the linter.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::utils::collect_files;

static DEBUGGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdebugger\b").unwrap());
static LOOSE_EQUALITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^=!<>]([!=]=)[^=]").unwrap());
static VAR_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[;{(\s])(var)\s").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single lint result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}  {}  {}  {}",
            self.file.display(),
            self.line,
            self.column,
            self.severity,
            self.message,
            self.rule
        )
    }
}

/// The "lint sources" collaborator
pub trait Linter: Send + Sync {
    fn lint(&self, path: &Path, source: &str) -> Vec<Finding>;
}

/// Line-based rules that need no parser
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicLinter;

impl Linter for BasicLinter {
    fn lint(&self, path: &Path, source: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut in_block_comment = false;

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let mut finding = |column: usize, rule: &'static str, message: &str, severity| {
                findings.push(Finding {
                    file: path.to_path_buf(),
                    line,
                    column,
                    rule,
                    message: message.to_string(),
                    severity,
                });
            };

            let trimmed = raw.trim_end();
            if trimmed.len() != raw.len() {
                finding(trimmed.len() + 1, "no-trailing-spaces", "Trailing spaces not allowed", Severity::Warning);
            }

            let code = strip_comments_and_strings(trimmed, &mut in_block_comment);

            if let Some(m) = DEBUGGER.find(&code) {
                finding(m.start() + 1, "no-debugger", "Unexpected 'debugger' statement", Severity::Error);
            }

            for caps in LOOSE_EQUALITY.captures_iter(&code) {
                let op = &caps[1];
                let strict = if op == "==" { "===" } else { "!==" };
                let column = caps.get(1).map(|m| m.start() + 1).unwrap_or(1);
                finding(
                    column,
                    "eqeqeq",
                    &format!("Expected '{}' and instead saw '{}'", strict, op),
                    Severity::Warning,
                );
            }

            if let Some(m) = VAR_DECL.captures(&code).and_then(|c| c.get(1)) {
                finding(m.start() + 1, "no-var", "Unexpected var, use let or const instead", Severity::Warning);
            }
        }

        findings
    }
}

/// Blank out comments and string contents so rules only see code.
/// Column positions are preserved.
fn strip_comments_and_strings(line: &str, in_block_comment: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if *in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block_comment = false;
                out.push_str("  ");
            } else {
                out.push(' ');
            }
            continue;
        }

        if let Some(q) = quote {
            if c == '\\' {
                out.push(' ');
                if chars.next().is_some() {
                    out.push(' ');
                }
                continue;
            }
            if c == q {
                quote = None;
                out.push(c);
            } else {
                out.push(' ');
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => break,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *in_block_comment = true;
                out.push_str("  ");
            }
            _ => out.push(c),
        }
    }

    out
}

/// Lint every file under `root` matching `patterns`
pub fn lint_sources<S: AsRef<str>>(
    linter: &dyn Linter,
    root: &Path,
    patterns: &[S],
) -> anyhow::Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for relative in collect_files(root, patterns)? {
        let full = root.join(&relative);
        let source = match fs::read_to_string(&full) {
            Ok(source) => source,
            Err(e) => {
                warn!("Skipping {}: {}", full.display(), e);
                continue;
            }
        };
        findings.extend(linter.lint(&relative, &source));
    }

    Ok(findings)
}

/// Log findings and a summary line
pub fn report(findings: &[Finding]) {
    for finding in findings {
        warn!("{}", finding);
    }

    let errors = findings.iter().filter(|f| f.severity == Severity::Error).count();
    let warnings = findings.len() - errors;

    if findings.is_empty() {
        info!("Lint: no problems");
    } else {
        warn!(
            "Lint: {} problem(s) ({} error(s), {} warning(s))",
            findings.len(),
            errors,
            warnings
        );
    }
}
