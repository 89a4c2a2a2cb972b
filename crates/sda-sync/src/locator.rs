use sda_protocol::Project;
use serde_json::Value;
use tracing::debug;

const MANIFEST: &str = "package.json";

/// Where a repository name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// The `name` field of the project's `package.json`.
    Manifest,
    /// The project's display name.
    DisplayName,
}

/// URL-safe remote repository name for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName {
    pub name: String,
    pub source: NameSource,
}

/// Derive the remote repository name for `project`.
///
/// A usable `package.json` name wins; otherwise the display name is used.
/// Never fails: any manifest problem falls back to the display name.
pub fn locate_repository(project: &Project) -> RepoName {
    match manifest_name(project) {
        Some(name) => RepoName {
            name: sanitize_manifest_name(&name),
            source: NameSource::Manifest,
        },
        None => RepoName {
            name: slug_display_name(&project.name),
            source: NameSource::DisplayName,
        },
    }
}

fn manifest_name(project: &Project) -> Option<String> {
    let contents = project.file_tree.get(MANIFEST)?.contents()?;
    let manifest: Value = match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(e) => {
            debug!(project = %project.id, error = %e, "Ignoring unparsable package.json");
            return None;
        }
    };
    manifest
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Lowercase, with each whitespace run collapsed into one `-`.
fn slug_display_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else {
            slug.extend(c.to_lowercase());
            in_whitespace = false;
        }
    }
    slug
}

/// Lowercase, with every character outside `[a-zA-Z0-9-_.]` replaced by `-`.
fn sanitize_manifest_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
