//! Code transformation
//!
//! Rewrites ES module syntax to CommonJS so modules can run inside the
//! bundle runtime, and bakes `process.env.NODE_ENV` into the code. Every
//! rewrite keeps the number of lines intact so line-level source maps stay
//! accurate; the trailing export assignments are appended after the last
//! original line.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::bundler::ModuleType;
use crate::error::BundleError;
use crate::mode::Mode;

static NODE_ENV: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bprocess\.env\.NODE_ENV\b").unwrap());

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([\w$*{}\s,]+?)\s+from\s+["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)import\s+["']([^"']+)["'][ \t]*;?"#).unwrap());

static IMPORT_DYNAMIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*(["'][^"']+["'])\s*\)"#).unwrap());

static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+(\*|\{[^}]*\})\s*from\s+["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)export\s+\{([^}]*)\}[ \t]*;?"#).unwrap());

static EXPORT_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap());

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var|class|function\s*\*?|async\s+function\s*\*?)\s*([\w$]+)").unwrap()
});

/// Code transformer
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    mode: Mode,
}

impl Transformer {
    /// Create a new transformer
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Transform source code based on module type
    pub fn transform(
        &self,
        source: &str,
        path: &Path,
        module_type: &ModuleType,
    ) -> Result<String, BundleError> {
        match module_type {
            ModuleType::JavaScript => Ok(self.transform_javascript(source, path)),
            ModuleType::Json => self.transform_json(source, path),
            ModuleType::Unknown => Err(BundleError::new(
                path,
                "Unsupported module type (expected .js, .mjs, .cjs or .json)",
            )),
        }
    }

    /// Envify and convert ES modules to CommonJS
    fn transform_javascript(&self, source: &str, path: &Path) -> String {
        debug!("Transforming JavaScript: {}", path.display());

        let env = format!("\"{}\"", self.mode.node_env());
        let code = NODE_ENV.replace_all(source, env.as_str()).into_owned();

        esm_to_commonjs(&code)
    }

    /// Transform JSON to JS module
    fn transform_json(&self, source: &str, path: &Path) -> Result<String, BundleError> {
        debug!("Transforming JSON: {}", path.display());

        serde_json::from_str::<serde_json::Value>(source)
            .map_err(|e| BundleError::new(path, format!("Invalid JSON: {}", e)))?;

        Ok(format!("module.exports = {};", source.trim_end()))
    }
}

/// Pad `replacement` with newlines so it spans as many lines as `original`
fn keep_lines(original: &str, replacement: String) -> String {
    let missing = original.matches('\n').count().saturating_sub(replacement.matches('\n').count());
    replacement + &"\n".repeat(missing)
}

/// Rewrite ES module syntax to CommonJS
pub fn esm_to_commonjs(source: &str) -> String {
    let mut counter = 0usize;
    let mut exported: Vec<String> = Vec::new();
    let mut is_module = false;

    let mut next_tmp = || {
        counter += 1;
        format!("__import{}", counter)
    };

    let code = IMPORT_FROM.replace_all(source, |caps: &Captures| {
        is_module = true;
        let indent = &caps[1];
        let tmp = next_tmp();
        let mut decls = vec![format!("{} = require(\"{}\")", tmp, &caps[3])];
        decls.extend(import_bindings(&caps[2], &tmp));
        keep_lines(&caps[0], format!("{}var {};", indent, decls.join(", ")))
    });

    let code = IMPORT_BARE.replace_all(&code, |caps: &Captures| {
        is_module = true;
        format!("{}require(\"{}\");", &caps[1], &caps[2])
    });

    let code = IMPORT_DYNAMIC.replace_all(&code, |caps: &Captures| {
        format!("Promise.resolve().then(function () {{ return require({}); }})", &caps[1])
    });

    let code = EXPORT_FROM.replace_all(&code, |caps: &Captures| {
        is_module = true;
        let indent = &caps[1];
        let tmp = next_tmp();
        let clause = caps[2].trim();
        let body = if clause == "*" {
            format!(
                "{indent}var {tmp} = require(\"{spec}\"); Object.keys({tmp}).forEach(function (k) {{ if (k !== \"default\") exports[k] = {tmp}[k]; }});",
                indent = indent,
                tmp = tmp,
                spec = &caps[3]
            )
        } else {
            let assigns: Vec<String> = export_specifiers(clause)
                .into_iter()
                .map(|(local, exported)| format!("exports.{} = {}.{};", exported, tmp, local))
                .collect();
            format!("{}var {} = require(\"{}\"); {}", indent, tmp, &caps[3], assigns.join(" "))
        };
        keep_lines(&caps[0], body)
    });

    let code = EXPORT_LIST.replace_all(&code, |caps: &Captures| {
        is_module = true;
        let assigns: Vec<String> = export_specifiers(&caps[2])
            .into_iter()
            .map(|(local, exported)| format!("exports.{} = {};", exported, local))
            .collect();
        keep_lines(&caps[0], format!("{}{}", &caps[1], assigns.join(" ")))
    });

    let code = EXPORT_DEFAULT.replace_all(&code, |caps: &Captures| {
        is_module = true;
        format!("{}exports.default = ", &caps[1])
    });

    let code = EXPORT_DECL.replace_all(&code, |caps: &Captures| {
        is_module = true;
        exported.push(caps[3].to_string());
        format!("{}{} {}", &caps[1], caps[2].trim_end(), &caps[3])
    });

    let mut out = code.into_owned();

    if !is_module {
        return out;
    }

    out.insert_str(0, "Object.defineProperty(exports, \"__esModule\", { value: true }); ");
    if !exported.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        for name in exported {
            out.push_str(&format!("exports.{} = {};\n", name, name));
        }
    }

    out
}

/// Declarations for the bindings of an import clause
fn import_bindings(clause: &str, tmp: &str) -> Vec<String> {
    let clause = clause.trim();
    let mut decls = Vec::new();

    let rest = if clause.starts_with('{') || clause.starts_with('*') {
        clause
    } else {
        let (default, rest) = clause.split_once(',').unwrap_or((clause, ""));
        decls.push(format!(
            "{} = {}.__esModule ? {}.default : {}",
            default.trim(),
            tmp,
            tmp,
            tmp
        ));
        rest.trim()
    };

    if let Some(ns) = rest.strip_prefix('*') {
        let name = ns.trim().trim_start_matches("as").trim();
        decls.push(format!("{} = {}", name, tmp));
    } else if rest.starts_with('{') {
        for (imported, local) in export_specifiers(rest) {
            decls.push(format!("{} = {}.{}", local, tmp, imported));
        }
    }

    decls
}

/// Parse `{ a, b as c }` into `(a, a)` and `(b, c)` pairs
fn export_specifiers(list: &str) -> Vec<(String, String)> {
    list.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(" as ") {
            Some((from, to)) => (from.trim().to_string(), to.trim().to_string()),
            None => (item.to_string(), item.to_string()),
        })
        .collect()
}
