//! Rewriting of workspace-absolute paths in scan results.
//!
//! The engine reports every location as an absolute path inside the
//! per-request workspace. Callers only ever see paths relative to the tree
//! they submitted, so [`strip`] rewrites each path field and scrubs the
//! workspace root out of free-text messages. Absolute paths outside the
//! workspace are left untouched and reported as [`NormalizationWarning`]s.
//!
//! Rule files written for inline rules live beside the workspace rather than
//! inside it. [`redact_rule_files`] replaces their paths with
//! [`INLINE_RULES_LABEL`] wherever the engine mentions them.

use std::path::{Component, Path, PathBuf};

use crate::result::ScanResult;

/// Placeholder shown in place of a materialized inline rule file.
pub const INLINE_RULES_LABEL: &str = "<inline-rules>";

/// Result of normalizing a [`ScanResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// The rewritten result.
    pub result: ScanResult,
    /// Paths that could not be made relative.
    pub warnings: Vec<NormalizationWarning>,
}

/// An absolute path outside the workspace that was left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationWarning {
    /// Result field the path was found in.
    pub field: &'static str,
    /// The path as reported by the engine.
    pub path: String,
}

/// Rewrites every path in `result` relative to `workspace_root`.
///
/// Paths become `/`-separated regardless of platform. A path equal to the
/// root becomes `.`.
#[must_use]
pub fn strip(mut result: ScanResult, workspace_root: &Path) -> Normalized {
    let mut rewriter = Rewriter {
        root: workspace_root,
        warnings: Vec::new(),
    };

    for finding in &mut result.findings {
        rewriter.rewrite(&mut finding.path, "findings.path");
        finding.message = scrub_text(&finding.message, workspace_root);
        if let Some(lines) = finding.lines.as_mut() {
            *lines = scrub_text(lines, workspace_root);
        }
    }
    for diagnostic in &mut result.errors {
        if let Some(path) = diagnostic.path.as_mut() {
            rewriter.rewrite(path, "errors.path");
        }
        diagnostic.message = scrub_text(&diagnostic.message, workspace_root);
    }
    for path in &mut result.scanned_paths {
        rewriter.rewrite(path, "paths.scanned");
    }
    for skipped in &mut result.skipped_paths {
        rewriter.rewrite(&mut skipped.path, "paths.skipped");
        if let Some(reason) = skipped.reason.as_mut() {
            *reason = scrub_text(reason, workspace_root);
        }
    }

    Normalized {
        result,
        warnings: rewriter.warnings,
    }
}

/// Removes occurrences of `workspace_root` from free text.
///
/// `<root>/x` becomes `x` and a bare `<root>` becomes `.`. Used for engine
/// messages and captured stderr before they are shown to callers.
#[must_use]
pub fn scrub_text(text: &str, workspace_root: &Path) -> String {
    let root_text = workspace_root.to_string_lossy();
    let root = root_text.trim_end_matches('/');
    if root.is_empty() {
        return text.to_owned();
    }
    text.replace(&format!("{root}/"), "").replace(root, ".")
}

/// Replaces each of `rule_files` in `text` with [`INLINE_RULES_LABEL`].
#[must_use]
pub fn redact_text(text: &str, rule_files: &[PathBuf]) -> String {
    rule_files.iter().fold(text.to_owned(), |redacted, file| {
        let needle = file.to_string_lossy();
        if needle.is_empty() {
            redacted
        } else {
            redacted.replace(needle.as_ref(), INLINE_RULES_LABEL)
        }
    })
}

/// Replaces every mention of `rule_files` in `result` with
/// [`INLINE_RULES_LABEL`].
///
/// Applies to path fields and free text alike. Run it before [`strip`] so
/// rule files are not reported as paths outside the workspace.
#[must_use]
pub fn redact_rule_files(mut result: ScanResult, rule_files: &[PathBuf]) -> ScanResult {
    if rule_files.is_empty() {
        return result;
    }
    let redact = |text: &mut String| *text = redact_text(text, rule_files);

    for finding in &mut result.findings {
        redact(&mut finding.path);
        redact(&mut finding.message);
        if let Some(lines) = finding.lines.as_mut() {
            redact(lines);
        }
    }
    for diagnostic in &mut result.errors {
        if let Some(path) = diagnostic.path.as_mut() {
            redact(path);
        }
        redact(&mut diagnostic.message);
    }
    result.scanned_paths.iter_mut().for_each(redact);
    for skipped in &mut result.skipped_paths {
        redact(&mut skipped.path);
        if let Some(reason) = skipped.reason.as_mut() {
            redact(reason);
        }
    }
    result
}

struct Rewriter<'a> {
    root: &'a Path,
    warnings: Vec<NormalizationWarning>,
}

impl Rewriter<'_> {
    fn rewrite(&mut self, path: &mut String, field: &'static str) {
        let candidate = Path::new(path.as_str());
        if !candidate.is_absolute() {
            if let Some(stripped) = path.strip_prefix("./") {
                *path = stripped.to_owned();
            }
            return;
        }
        match candidate.strip_prefix(self.root) {
            Ok(relative) => *path = to_slash(relative),
            Err(_) => self.warnings.push(NormalizationWarning {
                field,
                path: path.clone(),
            }),
        }
    }
}

fn to_slash(relative: &Path) -> String {
    let segments: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect();
    if segments.is_empty() {
        String::from(".")
    } else {
        segments.join("/")
    }
}

#[cfg(test)]
mod tests;
