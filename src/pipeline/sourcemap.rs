//! Source map (revision 3) generation
//!
//! Only line-level mappings are produced: every mapped generated line points
//! at column 0 of one original line.

use serde::{Deserialize, Serialize};

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A serialized-ready source map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Render as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Accumulates line mappings and encodes them
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: String,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    /// generated line -> (source index, original line)
    lines: Vec<Option<(usize, usize)>>,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Register a source and return its index
    pub fn add_source(&mut self, name: impl Into<String>, content: Option<String>) -> usize {
        self.sources.push(name.into());
        self.sources_content.push(content);
        self.sources.len() - 1
    }

    /// Map a zero-based generated line to a zero-based original line
    pub fn add_line(&mut self, generated_line: usize, source: usize, original_line: usize) {
        if self.lines.len() <= generated_line {
            self.lines.resize(generated_line + 1, None);
        }
        self.lines[generated_line] = Some((source, original_line));
    }

    pub fn build(self) -> SourceMap {
        let mut mappings = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                mappings.push(';');
            }
            if let Some((source, original)) = *line {
                let (source, original) = (source as i64, original as i64);
                encode_vlq(&mut mappings, 0);
                encode_vlq(&mut mappings, source - prev_source);
                encode_vlq(&mut mappings, original - prev_line);
                encode_vlq(&mut mappings, 0);
                prev_source = source;
                prev_line = original;
            }
        }

        SourceMap {
            version: 3,
            file: self.file,
            sources: self.sources,
            sources_content: self.sources_content,
            names: Vec::new(),
            mappings,
        }
    }
}

/// Append the base64 VLQ encoding of `value`
fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = vlq & 0b1_1111;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut s = String::new();
        encode_vlq(&mut s, value);
        s
    }

    #[test]
    fn test_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
    }

    #[test]
    fn test_line_mappings() {
        let mut builder = SourceMapBuilder::new("bundle.js");
        let a = builder.add_source("js/a.js", None);
        builder.add_line(1, a, 0);
        builder.add_line(2, a, 1);
        let map = builder.build();

        assert_eq!(map.mappings, ";AAAA;AACA");
        assert_eq!(map.sources, vec!["js/a.js".to_string()]);
    }

    #[test]
    fn test_json_shape() {
        let map = SourceMapBuilder::new("bundle.css").build();
        let json: serde_json::Value = serde_json::from_str(&map.to_json()).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "bundle.css");
        assert!(json["sourcesContent"].is_array());
    }
}
