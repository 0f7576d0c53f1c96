//! Whitespace and comment stripping for scripts
//!
//! This is not a real minifier: it removes comments and collapses runs of
//! whitespace. A run containing a newline becomes a single newline so code
//! relying on automatic semicolon insertion keeps working. String and regex
//! literals are copied through untouched.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::PipelineResult;
use crate::mode::Mode;
use crate::pipeline::{FileRecord, Step};

/// Minify JavaScript code
pub fn minify_code(code: &str) -> String {
    let mut result = String::with_capacity(code.len());
    let mut in_string = false;
    let mut string_char = ' ';
    let mut escaped = false;
    let mut in_single_comment = false;
    let mut in_multi_comment = false;
    let mut prev_char = ' ';
    let mut pending_space: Option<char> = None;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if in_single_comment {
            if c == '\n' {
                in_single_comment = false;
                pending_space = Some('\n');
            }
            continue;
        }

        if in_multi_comment {
            if prev_char == '*' && c == '/' {
                in_multi_comment = false;
                prev_char = ' ';
                pending_space.get_or_insert(' ');
            } else {
                prev_char = c;
            }
            continue;
        }

        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == string_char {
                in_string = false;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = match (pending_space, c) {
                (_, '\n') | (Some('\n'), _) => Some('\n'),
                _ => Some(' '),
            };
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    in_single_comment = true;
                    continue;
                }
                Some('*') => {
                    chars.next();
                    in_multi_comment = true;
                    prev_char = ' ';
                    continue;
                }
                _ if regex_allowed(&result) => {
                    flush_space(&mut result, &mut pending_space);
                    result.push(c);
                    copy_regex(&mut chars, &mut result);
                    continue;
                }
                _ => {}
            }
        }

        flush_space(&mut result, &mut pending_space);

        if c == '"' || c == '\'' || c == '`' {
            in_string = true;
            string_char = c;
        }

        result.push(c);
    }

    if !result.is_empty() {
        result.push('\n');
    }

    result
}

fn flush_space(result: &mut String, pending: &mut Option<char>) {
    if let Some(space) = pending.take() {
        if !result.is_empty() && !result.ends_with('\n') {
            result.push(space);
        }
    }
}

/// Replace comments with spaces, keeping line breaks, strings and regex
/// literals. Byte offsets of the remaining code are unchanged.
pub fn blank_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                out.push(c);
                let mut escaped = false;
                for next in chars.by_ref() {
                    out.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                out.push(' ');
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                    blank(&mut out, next);
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = ' ';
                for next in chars.by_ref() {
                    blank(&mut out, next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '/' if regex_allowed(&out) => {
                out.push(c);
                copy_regex(&mut chars, &mut out);
            }
            _ => out.push(c),
        }
    }

    out
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

/// Whether a `/` following `preceding` opens a regex literal rather than
/// a division
fn regex_allowed(preceding: &str) -> bool {
    let preceding = preceding.trim_end();
    match preceding.chars().last() {
        None => true,
        Some(c) if "(,=:[!&|?{};+-*%<>~^".contains(c) => true,
        Some(c) if is_ident_char(c) => {
            let word = preceding
                .rsplit(|c: char| !is_ident_char(c))
                .next()
                .unwrap_or_default();
            matches!(
                word,
                "return" | "typeof" | "case" | "do" | "else" | "in" | "instanceof" | "new" | "delete"
                    | "void" | "throw" | "yield" | "await"
            )
        }
        _ => false,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Copy a regex literal body up to and including its closing `/`. The
/// opening `/` has already been consumed.
fn copy_regex(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let mut escaped = false;
    let mut in_class = false;

    for c in chars.by_ref() {
        out.push(c);
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            '\n' => break,
            _ => {}
        }
    }
}

/// Minify every record as JavaScript
pub struct MinifyScripts;

impl Step for MinifyScripts {
    fn name(&self) -> &str {
        "uglify"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                record.contents = minify_code(&record.text()).into_bytes();
                record.source_map = None;
                record
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_comments_and_whitespace() {
        let code = "// header\nvar   a = 1; /* inline */ var b = 2;\n\n\n  call(a,   b);\n";
        assert_eq!(minify_code(code), "var a = 1; var b = 2;\ncall(a, b);\n");
    }

    #[test]
    fn test_strings_untouched() {
        let code = "var s = \"a  // not a comment\"; var t = '\\'  x';";
        assert_eq!(minify_code(code), format!("{}\n", code));
    }

    #[test]
    fn test_escaped_backslash_ends_string() {
        let code = "var s = \"\\\\\";   var t = 1;";
        assert_eq!(minify_code(code), "var s = \"\\\\\"; var t = 1;\n");
    }

    #[test]
    fn test_regex_literals_untouched() {
        let code = "var rprotocol = /^\\/\\//, keep = 1;";
        assert_eq!(minify_code(code), format!("{}\n", code));

        let code = "if (x) return /[/*]/.test(s)   // trailing\nnext();";
        assert_eq!(minify_code(code), "if (x) return /[/*]/.test(s)\nnext();\n");
    }

    #[test]
    fn test_division_is_not_a_regex() {
        let code = "var half = total / 2; // half\nvar q = (a) / (b) /* c */;";
        assert_eq!(minify_code(code), "var half = total / 2;\nvar q = (a) / (b) ;\n");
    }

    #[test]
    fn test_blank_comments_keeps_offsets() {
        let code = "// import old from './old';\nvar re = /\\/\\//; /* é */ require('./a// b');";
        let blanked = blank_comments(code);

        assert_eq!(blanked.len(), code.len());
        assert!(!blanked.contains("./old"));
        assert!(blanked.contains("var re = /\\/\\//;"));
        assert!(blanked.contains("require('./a// b');"));
        assert_eq!(blanked.find("require"), code.find("require"));
    }

    #[test]
    fn test_step_drops_source_map() {
        let mut record = FileRecord::new("vendor.js", "a  =  1 ;");
        record.source_map = Some(crate::pipeline::SourceMapBuilder::new("vendor.js").build());

        let out = MinifyScripts.apply(vec![record], Mode::Production).unwrap();
        assert_eq!(out[0].text(), "a = 1 ;\n");
        assert!(out[0].source_map.is_none());
    }
}
