//! Install and post-install actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Shell a completion script is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl CompletionShell {
    /// Directory under `share/` the shell loads completions from.
    pub fn share_dir(&self) -> &'static str {
        match self {
            CompletionShell::Bash => "bash-completion/completions",
            CompletionShell::Zsh => "zsh/site-functions",
            CompletionShell::Fish => "fish/vendor_completions.d",
        }
    }

    /// Conventional file name for a command's completion.
    pub fn file_name(&self, command: &str) -> String {
        match self {
            CompletionShell::Bash => command.to_string(),
            CompletionShell::Zsh => format!("_{}", command),
            CompletionShell::Fish => format!("{}.fish", command),
        }
    }
}

fn default_metadata_file() -> String {
    "package.json".to_string()
}

/// Two-phase install of a package-manager client with a freshly built
/// runtime.
///
/// The client is unpacked into `staging` (the bootstrap copy), then run by
/// `runtime` to install itself into `target_prefix`. The final package
/// directory gets the pristine `metadata_file` from the staged copy so it
/// never references the staging path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSpec {
    /// Resource holding the client package
    pub resource: String,
    /// Runtime executable used to run the client
    pub runtime: String,
    /// Directory the bootstrap copy is unpacked into
    pub staging: String,
    /// Client entry point, relative to `staging`
    pub entry: String,
    /// Arguments passed after the entry point
    #[serde(default)]
    pub args: Vec<String>,
    /// Prefix the client installs into
    pub target_prefix: String,
    /// Installed package directory
    pub package_dir: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    /// Paths removed after the install
    #[serde(default)]
    pub discard: Vec<String>,
    /// Directories put in front of PATH for the client
    #[serde(default)]
    pub path_prepend: Vec<String>,
    /// Extra environment for the client
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// One installer action. Paths are templates; relative paths resolve
/// against the buildpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstallAction {
    /// Copy files or trees; `from` may be a glob
    Copy { from: String, to: String },

    Mkdir { path: String },

    Remove { path: String },

    /// `ln -sf target link`
    Symlink { target: String, link: String },

    /// Atomic file write
    Write {
        path: String,
        contents: String,
        #[serde(default)]
        executable: bool,
    },

    /// Unpack the first archive matching `archive` into `into`
    Extract { archive: String, into: String },

    /// Wrapper script that sets env vars and execs `target`
    EnvScript {
        path: String,
        target: String,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },

    /// Install a shell completion script
    Completion {
        shell: CompletionShell,
        from: String,
        name: String,
    },

    /// Link manpages into a man tree, pruning stale entries first
    Manpages {
        /// Directory containing `manN/` section directories
        from: String,
        sections: Vec<String>,
        /// Globs of page names to link, per section
        #[serde(default)]
        include: Vec<String>,
        /// Globs of stale page names to remove before linking
        #[serde(default)]
        prune: Vec<String>,
        /// Destination man tree; `{shared_prefix}/share/man` when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        into: Option<String>,
    },

    Bootstrap(BootstrapSpec),

    /// Copy documentation into `{doc}`
    Docs { from: Vec<String> },
}

impl InstallAction {
    pub fn kind(&self) -> &'static str {
        match self {
            InstallAction::Copy { .. } => "copy",
            InstallAction::Mkdir { .. } => "mkdir",
            InstallAction::Remove { .. } => "remove",
            InstallAction::Symlink { .. } => "symlink",
            InstallAction::Write { .. } => "write",
            InstallAction::Extract { .. } => "extract",
            InstallAction::EnvScript { .. } => "env_script",
            InstallAction::Completion { .. } => "completion",
            InstallAction::Manpages { .. } => "manpages",
            InstallAction::Bootstrap(_) => "bootstrap",
            InstallAction::Docs { .. } => "docs",
        }
    }

    /// Every string of the action that undergoes template expansion.
    pub fn templated_strings(&self) -> Vec<&str> {
        let strs: Vec<&String> = match self {
            InstallAction::Copy { from, to } => vec![from, to],
            InstallAction::Mkdir { path } | InstallAction::Remove { path } => vec![path],
            InstallAction::Symlink { target, link } => vec![target, link],
            InstallAction::Write { path, contents, .. } => vec![path, contents],
            InstallAction::Extract { archive, into } => vec![archive, into],
            InstallAction::EnvScript { path, target, env } => {
                let mut v = vec![path, target];
                v.extend(env.values());
                v
            }
            InstallAction::Completion { from, name, .. } => vec![from, name],
            InstallAction::Manpages { from, into, .. } => {
                let mut v = vec![from];
                v.extend(into.iter());
                v
            }
            InstallAction::Bootstrap(spec) => {
                let mut v = vec![
                    &spec.runtime,
                    &spec.staging,
                    &spec.entry,
                    &spec.target_prefix,
                    &spec.package_dir,
                ];
                v.extend(spec.args.iter());
                v.extend(spec.discard.iter());
                v.extend(spec.path_prepend.iter());
                v.extend(spec.env.values());
                v
            }
            InstallAction::Docs { from } => from.iter().collect(),
        };
        strs.into_iter().map(String::as_str).collect()
    }
}
