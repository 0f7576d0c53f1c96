//! Generic pipeline steps

use std::fs;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use tracing::debug;

use super::{FileRecord, Step};
use crate::error::{PipelineError, PipelineResult};
use crate::mode::Mode;
use crate::utils::{build_globset, format_size, is_contained};

type StepFn = dyn Fn(Vec<FileRecord>, Mode) -> PipelineResult<Vec<FileRecord>> + Send + Sync;

/// Step backed by a closure
pub struct FnStep {
    name: String,
    f: Box<StepFn>,
}

impl FnStep {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<FileRecord>, Mode) -> PipelineResult<Vec<FileRecord>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, records: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        (self.f)(records, mode)
    }
}

/// Runs the inner step only in one mode
pub struct When<S> {
    mode: Mode,
    inner: S,
}

impl<S: Step> When<S> {
    pub fn new(mode: Mode, inner: S) -> Self {
        Self { mode, inner }
    }
}

impl<S: Step> Step for When<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, records: Vec<FileRecord>, mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        if mode == self.mode {
            self.inner.apply(records, mode)
        } else {
            Ok(records)
        }
    }
}

/// Give every record a fixed file name
pub struct Rename {
    to: String,
}

impl Rename {
    pub fn new(to: impl Into<String>) -> Self {
        Self { to: to.into() }
    }
}

impl Step for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                record.path = PathBuf::from(&self.to);
                if let Some(map) = record.source_map.as_mut() {
                    map.file = self.to.clone();
                }
                record
            })
            .collect())
    }
}

/// Join all records, in input order, into one
pub struct Concat {
    to: String,
    separator: String,
}

impl Concat {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            separator: "\n".to_string(),
        }
    }
}

impl Step for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        if records.is_empty() {
            return Ok(records);
        }

        let mut contents = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                contents.extend_from_slice(self.separator.as_bytes());
            }
            contents.extend_from_slice(&record.contents);
        }

        Ok(vec![FileRecord::new(&self.to, contents)])
    }
}

/// Drop directory components, keeping only the file name
pub struct Flatten;

impl Step for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .map(|mut record| {
                if let Some(name) = record.path.file_name() {
                    record.path = PathBuf::from(name);
                }
                record
            })
            .collect())
    }
}

/// Keep records whose file name matches one of the patterns
pub struct Filter {
    matcher: GlobSet,
}

impl Filter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> PipelineResult<Self> {
        let matcher = build_globset(patterns).map_err(|e| PipelineError::step("filter", e))?;
        Ok(Self { matcher })
    }
}

impl Step for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .file_name()
                    .map(|name| self.matcher.is_match(name))
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// Emit each attached source map as a sibling `.map` record and point the
/// source at it
pub struct WriteSourceMaps;

impl Step for WriteSourceMaps {
    fn name(&self) -> &str {
        "sourcemaps"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        let mut out = Vec::with_capacity(records.len() * 2);

        for mut record in records {
            let Some(map) = record.source_map.take() else {
                out.push(record);
                continue;
            };

            let file_name = record.file_name().unwrap_or("out").to_string();
            let map_name = format!("{}.map", file_name);
            let trailer = if file_name.ends_with(".css") {
                format!("\n/*# sourceMappingURL={} */\n", map_name)
            } else {
                format!("\n//# sourceMappingURL={}\n", map_name)
            };

            let map_path = record.path.with_file_name(&map_name);
            record.contents.extend_from_slice(trailer.as_bytes());

            out.push(record);
            out.push(FileRecord::new(map_path, map.to_json()));
        }

        Ok(out)
    }
}

/// Write records under a directory, passing them through unchanged.
/// Each file is written to a temporary sibling first and then renamed.
pub struct Dest {
    dir: PathBuf,
}

impl Dest {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Step for Dest {
    fn name(&self) -> &str {
        "dest"
    }

    fn apply(&self, records: Vec<FileRecord>, _mode: Mode) -> PipelineResult<Vec<FileRecord>> {
        for record in &records {
            if !is_contained(&record.path) {
                return Err(PipelineError::step(
                    "dest",
                    format!("refusing to write outside {}: {}", self.dir.display(), record.path.display()),
                ));
            }
            let target = self.dir.join(&record.path);
            write_atomic(&target, &record.contents)?;
            debug!("wrote {} ({})", target.display(), format_size(record.contents.len()));
        }
        Ok(records)
    }
}

fn write_atomic(target: &Path, contents: &[u8]) -> PipelineResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents).map_err(|e| PipelineError::io(&tmp, e))?;
    fs::rename(&tmp, target).map_err(|e| PipelineError::io(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SourceMapBuilder;

    #[test]
    fn test_concat_preserves_order() {
        let records = vec![FileRecord::new("a.js", "a"), FileRecord::new("b.js", "b")];
        let out = Concat::new("vendor.js").apply(records, Mode::Development).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, PathBuf::from("vendor.js"));
        assert_eq!(out[0].text(), "a\nb");
    }

    #[test]
    fn test_concat_empty_emits_nothing() {
        let out = Concat::new("vendor.js").apply(vec![], Mode::Development).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_flatten_and_filter() {
        let records = vec![
            FileRecord::new("lib/fonts/x/icons.woff", ""),
            FileRecord::new("lib/img/logo.png", ""),
        ];
        let filtered = Filter::new(&["*.woff", "*.ttf"])
            .unwrap()
            .apply(records, Mode::Development)
            .unwrap();
        let flat = Flatten.apply(filtered, Mode::Development).unwrap();

        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path, PathBuf::from("icons.woff"));
    }

    #[test]
    fn test_write_source_maps_adds_sibling() {
        let mut record = FileRecord::new("bundle.css", "a{}");
        record.source_map = Some(SourceMapBuilder::new("bundle.css").build());

        let out = WriteSourceMaps.apply(vec![record], Mode::Development).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].text().contains("/*# sourceMappingURL=bundle.css.map */"));
        assert_eq!(out[1].path, PathBuf::from("bundle.css.map"));
        assert!(out[0].source_map.is_none());
    }

    #[test]
    fn test_dest_writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![FileRecord::new("fonts/a.woff", "font")];

        Dest::new(dir.path()).apply(records, Mode::Development).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("fonts/a.woff")).unwrap(), "font");
        assert!(!dir.path().join("fonts/.a.woff.tmp").exists());
    }

    #[test]
    fn test_dest_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let result = Dest::new(dir.path()).apply(vec![FileRecord::new("../x", "")], Mode::Development);
        assert!(result.is_err());
    }
}
