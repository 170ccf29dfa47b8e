//! Output validation — runs before anything destructive happens to the
//! live site.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PublishError;

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub file_count: usize,
    pub total_bytes: u64,
    /// Best-effort internal link scan; broken links warn, they do not fail
    /// the deployment.
    pub broken_links: Vec<String>,
}

/// Validate the generated site: index present, size within the cap, and a
/// best-effort internal link check.
pub fn validate_output(output_dir: &Path, max_mb: u64) -> Result<ValidationReport, PublishError> {
    if !output_dir.join("index.html").exists() {
        return Err(PublishError::Validation(
            "index.html missing from generator output".to_string(),
        ));
    }

    let mut file_count = 0usize;
    let mut total_bytes = 0u64;
    let mut files: HashSet<String> = HashSet::new();
    for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        file_count += 1;
        total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        if let Ok(rel) = entry.path().strip_prefix(output_dir) {
            files.insert(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    let max_bytes = max_mb * 1024 * 1024;
    if total_bytes > max_bytes {
        return Err(PublishError::Validation(format!(
            "output size {} MB exceeds cap {} MB",
            total_bytes / (1024 * 1024),
            max_mb
        )));
    }

    let broken_links = scan_internal_links(output_dir, &files);
    if !broken_links.is_empty() {
        warn!(
            count = broken_links.len(),
            sample = %broken_links.first().cloned().unwrap_or_default(),
            "broken internal links found"
        );
    }

    debug!(file_count, total_bytes, "output validated");
    Ok(ValidationReport {
        file_count,
        total_bytes,
        broken_links,
    })
}

/// Collect internal href/src targets that resolve to no generated file.
fn scan_internal_links(output_dir: &Path, files: &HashSet<String>) -> Vec<String> {
    let mut broken = Vec::new();

    for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
        if entry.path().extension().and_then(|e| e.to_str()) != Some("html") {
            continue;
        }
        let html = match std::fs::read_to_string(entry.path()) {
            Ok(html) => html,
            Err(_) => continue,
        };

        for target in link_targets(&html) {
            if !is_resolvable(&target, files) {
                broken.push(format!(
                    "{} -> {}",
                    entry.path().strip_prefix(output_dir).unwrap_or(entry.path()).display(),
                    target
                ));
            }
        }
    }

    broken
}

/// href/src attribute values pointing inside the site (absolute paths).
fn link_targets(html: &str) -> Vec<String> {
    let mut targets = Vec::new();
    for attr in ["href=\"", "src=\""] {
        let mut rest = html;
        while let Some(start) = rest.find(attr) {
            rest = &rest[start + attr.len()..];
            if let Some(end) = rest.find('"') {
                let value = &rest[..end];
                // Only site-internal absolute paths; external URLs,
                // anchors, and data URIs are out of scope.
                if value.starts_with('/') && !value.starts_with("//") {
                    targets.push(value.split('#').next().unwrap_or(value).to_string());
                }
                rest = &rest[end..];
            } else {
                break;
            }
        }
    }
    targets
}

fn is_resolvable(target: &str, files: &HashSet<String>) -> bool {
    let path = target.trim_start_matches('/').trim_end_matches('/');
    if path.is_empty() {
        return true;
    }
    files.contains(path)
        || files.contains(&format!("{path}/index.html"))
        || files.contains(&format!("{path}index.html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn site(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mill-validate-{}", uuid::Uuid::new_v4()));
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn valid_site_passes() {
        let dir = site(&[
            ("index.html", r#"<a href="/posts/">posts</a>"#),
            ("posts/index.html", "<html></html>"),
            ("css/site.css", "body{}"),
        ]);
        let report = validate_output(&dir, 200).unwrap();
        assert_eq!(report.file_count, 3);
        assert!(report.broken_links.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_index_fails() {
        let dir = site(&[("about.html", "<html></html>")]);
        let err = validate_output(&dir, 200).unwrap_err();
        assert!(matches!(err, PublishError::Validation(_)));
        assert!(err.to_string().contains("index.html"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn size_cap_enforced() {
        let big = "x".repeat(2 * 1024 * 1024);
        let dir = site(&[("index.html", big.as_str())]);
        let err = validate_output(&dir, 1).unwrap_err();
        assert!(err.to_string().contains("exceeds cap"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn broken_links_reported_but_not_fatal() {
        let dir = site(&[(
            "index.html",
            r#"<a href="/missing/">gone</a> <a href="https://external.example/">ok</a>"#,
        )]);
        let report = validate_output(&dir, 200).unwrap();
        assert_eq!(report.broken_links.len(), 1);
        assert!(report.broken_links[0].contains("/missing/"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
