//! Source patches.

use serde::{Deserialize, Serialize};

fn default_strip() -> u32 {
    1
}

/// The edit a patch performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum PatchEdit {
    /// Literal replacement of every occurrence
    Replace { from: String, to: String },

    /// Regex substitution of every match; `$1` / `${name}` backrefs
    Regex { pattern: String, to: String },

    /// Create or overwrite the file
    Write { contents: String },

    /// Remove the file if present
    Delete,

    /// Unified diff, inline or from a resource
    Diff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contents: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource: Option<String>,
        #[serde(default = "default_strip")]
        strip: u32,
    },
}

impl PatchEdit {
    pub fn kind(&self) -> &'static str {
        match self {
            PatchEdit::Replace { .. } => "replace",
            PatchEdit::Regex { .. } => "regex",
            PatchEdit::Write { .. } => "write",
            PatchEdit::Delete => "delete",
            PatchEdit::Diff { .. } => "diff",
        }
    }
}

/// A source patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Target file relative to `dir`; unused by `diff`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,

    /// Directory relative to the buildpath the patch works in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Step id to apply the patch right before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    #[serde(flatten)]
    pub edit: PatchEdit,
}

impl Patch {
    /// Label used in logs.
    pub fn describe(&self) -> String {
        match &self.edit {
            PatchEdit::Diff {
                resource: Some(name),
                ..
            } => format!("diff from resource `{}`", name),
            PatchEdit::Diff { .. } => "inline diff".to_string(),
            edit => format!("{} {}", edit.kind(), self.file),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match &self.edit {
            PatchEdit::Diff {
                contents, resource, ..
            } => match (contents, resource) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => return Err("diff patch needs exactly one of `contents` or `resource`".into()),
            },
            PatchEdit::Regex { pattern, .. } => {
                regex::Regex::new(pattern)
                    .map_err(|e| format!("invalid regex in patch for {}: {}", self.file, e))?;
                self.require_file()?;
            }
            PatchEdit::Replace { from, .. } => {
                if from.is_empty() {
                    return Err(format!("replace patch for {} has an empty `from`", self.file));
                }
                self.require_file()?;
            }
            _ => self.require_file()?,
        }
        Ok(())
    }

    fn require_file(&self) -> Result<(), String> {
        if self.file.is_empty() {
            return Err(format!("{} patch needs a `file`", self.edit.kind()));
        }
        if self.file.starts_with('/') || self.file.split('/').any(|c| c == "..") {
            return Err(format!("patch target `{}` must stay inside the source tree", self.file));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_patches() {
        let replace: Patch = toml::from_str(
            r#"
file = "src/Directory.Build.props"
edit = "replace"
from = "<LangVersion>9.0</LangVersion>"
to = "<LangVersion>latest</LangVersion>"
stage = "build"
"#,
        )
        .unwrap();
        assert_eq!(replace.stage.as_deref(), Some("build"));
        assert!(matches!(replace.edit, PatchEdit::Replace { .. }));
        assert!(replace.validate().is_ok());

        let delete: Patch = toml::from_str(
            r#"
file = "src/runtime/src/installer/managed/CommandLine/commandline.xsd"
edit = "delete"
"#,
        )
        .unwrap();
        assert_eq!(delete.edit, PatchEdit::Delete);

        let diff: Patch = toml::from_str(
            r#"
edit = "diff"
resource = "clang-fix"
"#,
        )
        .unwrap();
        assert!(matches!(diff.edit, PatchEdit::Diff { strip: 1, .. }));
        assert!(diff.validate().is_ok());
    }

    #[test]
    fn test_patch_validation() {
        let bad_regex = Patch {
            file: "configure".into(),
            dir: None,
            stage: None,
            edit: PatchEdit::Regex {
                pattern: "(unclosed".into(),
                to: String::new(),
            },
        };
        assert!(bad_regex.validate().is_err());

        let escaping = Patch {
            file: "../../etc/passwd".into(),
            dir: None,
            stage: None,
            edit: PatchEdit::Delete,
        };
        assert!(escaping.validate().is_err());

        let both = Patch {
            file: String::new(),
            dir: None,
            stage: None,
            edit: PatchEdit::Diff {
                contents: Some("--- a\n+++ b\n".into()),
                resource: Some("p".into()),
                strip: 1,
            },
        };
        assert!(both.validate().is_err());
    }
}
