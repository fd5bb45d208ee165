//! Host platform description and the conditions formulas gate items on.
//!
//! The platform is detected once per invocation. Every `when` / `unless`
//! table in a formula is evaluated against it while the build plan is
//! computed, never during execution.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::config::PlatformOverrides;
use crate::util::process::{find_executable, ProcessBuilder};

/// Compiler selected for the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compiler {
    /// Compiler family: "clang", "gcc"
    pub family: String,

    /// Vendor build number (Apple clang reports e.g. 1500)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<u32>,
}

/// Build mode toggles chosen on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMode {
    /// Building a relocatable artifact for distribution
    pub bottle: bool,

    /// Building from the development branch
    pub head: bool,
}

/// The platform a build runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system: "linux", "macos", "windows"
    pub os: String,

    /// CPU architecture: "x86_64", "aarch64"
    pub arch: String,

    /// OS release, e.g. "14.4" on macOS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Compiler the build uses, if one was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<Compiler>,

    /// Apple clang build of the host developer tools. Stays put when a
    /// formula switches to another compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_clang_build: Option<u32>,

    /// Other compiler families installed on the host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_compilers: Vec<String>,

    /// Whether the build filesystem ignores case
    pub case_insensitive_fs: bool,

    pub mode: BuildMode,
}

impl Platform {
    /// A bare platform with only OS and architecture set.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            arch: arch.into(),
            os_version: None,
            compiler: None,
            host_clang_build: None,
            alternate_compilers: Vec::new(),
            case_insensitive_fs: false,
            mode: BuildMode::default(),
        }
    }

    /// Detect the current host, applying configured overrides.
    pub fn detect(overrides: &PlatformOverrides) -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();

        let os_version = overrides
            .os_version
            .clone()
            .or_else(|| detect_os_version(&os));

        let detected = detect_compiler(&os);
        let compiler = match (&overrides.compiler, overrides.clang_build) {
            (Some(family), build) => Some(Compiler {
                family: family.clone(),
                build: build.or_else(|| detected.as_ref().and_then(|c| c.build)),
            }),
            (None, Some(build)) => Some(Compiler {
                family: "clang".to_string(),
                build: Some(build),
            }),
            (None, None) => detected,
        };
        let host_clang_build = overrides.clang_build.or_else(|| {
            compiler
                .as_ref()
                .filter(|c| c.family == "clang")
                .and_then(|c| c.build)
        });
        let alternate_compilers = detect_alternate_compilers(&os, compiler.as_ref());

        let case_insensitive_fs = overrides
            .case_insensitive_fs
            .unwrap_or_else(probe_case_insensitive_fs);

        let platform = Platform {
            os,
            arch,
            os_version,
            compiler,
            host_clang_build,
            alternate_compilers,
            case_insensitive_fs,
            mode: BuildMode::default(),
        };
        tracing::debug!("detected platform: {}", platform.describe());
        platform
    }

    pub fn with_os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }

    pub fn with_compiler(mut self, family: impl Into<String>, build: Option<u32>) -> Self {
        let family = family.into();
        if family == "clang" {
            self.host_clang_build = build;
        }
        self.compiler = Some(Compiler { family, build });
        self
    }

    pub fn with_alternate_compiler(mut self, family: impl Into<String>) -> Self {
        self.alternate_compilers.push(family.into());
        self
    }

    pub fn with_case_insensitive_fs(mut self, value: bool) -> Self {
        self.case_insensitive_fs = value;
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apple clang build number of the host developer tools.
    pub fn clang_build(&self) -> Option<u32> {
        self.host_clang_build
    }

    /// One-line summary for logs.
    pub fn describe(&self) -> String {
        let mut out = format!("{}-{}", self.os, self.arch);
        if let Some(ref version) = self.os_version {
            out.push_str(&format!(" {}", version));
        }
        if let Some(ref compiler) = self.compiler {
            out.push_str(&format!(" {}", compiler.family));
            if let Some(build) = compiler.build {
                out.push_str(&format!("-{}", build));
            }
        }
        if self.case_insensitive_fs {
            out.push_str(" (case-insensitive fs)");
        }
        out
    }
}

/// Platform condition attached to formula items.
///
/// Every field that is present must match. An empty condition matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Operating system: "linux", "macos"
    #[serde(default)]
    pub os: Option<String>,

    /// CPU architecture: "x86_64", "aarch64"
    #[serde(default)]
    pub arch: Option<String>,

    /// Minimum OS release: "13", "13.3" or a macOS name like "ventura"
    #[serde(default)]
    pub os_version_min: Option<String>,

    /// Minimum clang build (inclusive)
    #[serde(default)]
    pub clang_build_min: Option<u32>,

    /// Maximum clang build (inclusive)
    #[serde(default)]
    pub clang_build_max: Option<u32>,

    /// Compiler family
    #[serde(default)]
    pub compiler: Option<String>,

    #[serde(default)]
    pub case_insensitive_fs: Option<bool>,

    #[serde(default)]
    pub bottle: Option<bool>,

    #[serde(default)]
    pub head: Option<bool>,
}

impl Condition {
    /// Check if this condition matches the given platform.
    pub fn matches(&self, platform: &Platform) -> bool {
        if let Some(ref os) = self.os {
            if os != &platform.os {
                return false;
            }
        }
        if let Some(ref arch) = self.arch {
            if !arch_matches(arch, &platform.arch) {
                return false;
            }
        }
        if let Some(ref min) = self.os_version_min {
            match platform.os_version.as_deref() {
                Some(actual) if compare_versions(actual, min) != Ordering::Less => {}
                _ => return false,
            }
        }
        if let Some(min) = self.clang_build_min {
            match platform.clang_build() {
                Some(build) if build >= min => {}
                _ => return false,
            }
        }
        if let Some(max) = self.clang_build_max {
            match platform.clang_build() {
                Some(build) if build <= max => {}
                _ => return false,
            }
        }
        if let Some(ref compiler) = self.compiler {
            if platform.compiler.as_ref().map(|c| c.family.as_str()) != Some(compiler.as_str()) {
                return false;
            }
        }
        if let Some(value) = self.case_insensitive_fs {
            if value != platform.case_insensitive_fs {
                return false;
            }
        }
        if let Some(value) = self.bottle {
            if value != platform.mode.bottle {
                return false;
            }
        }
        if let Some(value) = self.head {
            if value != platform.mode.head {
                return false;
            }
        }
        true
    }

    /// Check the condition for fields that can never match, e.g. a
    /// misspelled macOS release name.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref min) = self.os_version_min {
            if parse_version(min).is_none() {
                return Err(format!("invalid os_version_min `{}`", min));
            }
        }
        if let (Some(min), Some(max)) = (self.clang_build_min, self.clang_build_max) {
            if min > max {
                return Err(format!("clang_build_min {} exceeds clang_build_max {}", min, max));
            }
        }
        Ok(())
    }
}

/// Evaluate an item's `when` / `unless` pair.
pub fn gate_allows(when: Option<&Condition>, unless: Option<&Condition>, platform: &Platform) -> bool {
    when.map_or(true, |c| c.matches(platform)) && !unless.map_or(false, |c| c.matches(platform))
}

fn arch_matches(wanted: &str, actual: &str) -> bool {
    fn normalize(a: &str) -> &str {
        match a {
            "arm64" | "arm" => "aarch64",
            "intel" | "amd64" => "x86_64",
            other => other,
        }
    }
    normalize(wanted) == normalize(actual)
}

/// Map macOS release names to their version numbers.
fn macos_release(name: &str) -> Option<&'static str> {
    Some(match name {
        "catalina" => "10.15",
        "big_sur" => "11",
        "monterey" => "12",
        "ventura" => "13",
        "sonoma" => "14",
        "sequoia" => "15",
        "tahoe" => "26",
        _ => return None,
    })
}

/// Parse a possibly-short version ("14", "13.3") into semver form.
fn parse_version(s: &str) -> Option<semver::Version> {
    let s = macos_release(s).unwrap_or(s);
    let mut parts = s.trim().split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

/// Compare two OS versions; unparseable versions compare as equal to
/// nothing and sort lowest.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn detect_os_version(os: &str) -> Option<String> {
    if os != "macos" {
        return None;
    }
    let output = ProcessBuilder::new("sw_vers")
        .arg("-productVersion")
        .exec()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

static CLANG_BUILD_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"clang-(\d+)").ok());

fn detect_compiler(os: &str) -> Option<Compiler> {
    if os == "macos" || find_executable("gcc").is_none() {
        find_executable("clang")?;
        let build = ProcessBuilder::new("clang")
            .arg("--version")
            .exec()
            .ok()
            .and_then(|out| parse_clang_build(&String::from_utf8_lossy(&out.stdout)));
        return Some(Compiler {
            family: "clang".to_string(),
            build,
        });
    }
    Some(Compiler {
        family: "gcc".to_string(),
        build: None,
    })
}

/// Compiler families on PATH besides `selected`. On macOS `gcc` is a
/// clang driver, so only clang counts there.
fn detect_alternate_compilers(os: &str, selected: Option<&Compiler>) -> Vec<String> {
    let families: &[&str] = if os == "macos" { &["clang"] } else { &["clang", "gcc"] };
    families
        .iter()
        .filter(|family| selected.map_or(true, |c| c.family != **family))
        .filter(|family| find_executable(family).is_some())
        .map(|family| family.to_string())
        .collect()
}

/// Extract the Apple clang build number from `clang --version` output.
pub fn parse_clang_build(version_output: &str) -> Option<u32> {
    let re = CLANG_BUILD_RE.as_ref()?;
    re.captures(version_output)?.get(1)?.as_str().parse().ok()
}

fn probe_case_insensitive_fs() -> bool {
    let Ok(dir) = tempfile::tempdir() else {
        return false;
    };
    let lower = dir.path().join("keg-case-probe");
    if std::fs::write(&lower, b"").is_err() {
        return false;
    }
    dir.path().join("KEG-CASE-PROBE").exists()
}
