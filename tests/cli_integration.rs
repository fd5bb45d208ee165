//! CLI integration tests for Keg.
//!
//! Every test gets its own shared prefix, cache and formula directory, and
//! runs the real binary against formulae that only need `sh`.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use predicates::prelude::*;
use tempfile::TempDir;

use keg::util::hash::sha256_bytes;

/// An isolated keg installation.
struct Env {
    tmp: TempDir,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        for dir in ["root", "cache", "formulae", "home", "work"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        Env { tmp }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("root")
    }

    fn work(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    /// The keg binary with paths pointing into the sandbox.
    fn keg(&self) -> Command {
        let home = self.tmp.path().join("home");
        let mut cmd = Command::cargo_bin("keg").unwrap();
        cmd.env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("XDG_CACHE_HOME", home.join(".cache"))
            .env("XDG_DATA_HOME", home.join(".local/share"))
            .env_remove("KEG_ROOT")
            .env_remove("KEG_CACHE")
            .env_remove("RUST_LOG")
            .arg("--no-color")
            .arg("--root")
            .arg(self.root())
            .arg("--cache")
            .arg(self.tmp.path().join("cache"))
            .arg("--formula-dir")
            .arg(self.tmp.path().join("formulae"))
            .current_dir(self.work());
        cmd
    }

    fn write_formula(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tmp.path().join("formulae").join(format!("{}.toml", name));
        fs::write(&path, body).unwrap();
        path
    }

    fn write_work_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.work().join(name);
        fs::write(&path, data).unwrap();
        path
    }
}

fn formula(name: &str, version: &str, extra: &str) -> String {
    format!(
        r#"[formula]
name = "{name}"
version = "{version}"
license = "MIT"
{extra}
"#
    )
}

fn sh_step(id: &str, script: &str) -> String {
    format!(
        r#"
[[steps]]
id = "{id}"
run = ["sh", "-c", '''{script}''']
"#
    )
}

fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path).unwrap().to_string()
}

fn tarball_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

// ============================================================================
// keg install
// ============================================================================

#[test]
fn test_install_places_build_output_in_keg() {
    let env = Env::new();
    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &sh_step("build", "mkdir -p {prefix} && printf built > {prefix}/out.bin"),
        ),
    );

    let keg = env.root().join("Cellar/app/1.0");
    env.keg()
        .args(["install", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains(keg.display().to_string()))
        .stderr(predicate::str::contains("Installed app 1.0"));

    assert_eq!(fs::read_to_string(keg.join("out.bin")).unwrap(), "built");
    assert!(keg.join("INSTALL_RECEIPT.json").is_file());
    assert!(env.root().join("opt/app").exists());
}

#[test]
fn test_install_twice_needs_force() {
    let env = Env::new();
    env.write_formula("app", &formula("app", "1.0", &sh_step("build", "mkdir -p {prefix}")));

    env.keg().args(["install", "app"]).assert().success();
    env.keg()
        .args(["install", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already installed"));
    env.keg().args(["install", "app", "--force"]).assert().success();
}

#[test]
fn test_bad_checksum_runs_nothing() {
    let env = Env::new();
    let marker = env.work().join("step-ran");
    let tarball = env.write_work_file("client-1.2.3.tgz", b"tampered");
    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &format!(
                r#"
[[resources]]
name = "client"
url = "{}"
sha256 = "{}"
{}"#,
                file_url(&tarball),
                sha256_bytes(b"original"),
                sh_step("build", &format!("touch {}", marker.display()))
            ),
        ),
    );

    env.keg()
        .args(["install", "app"])
        .assert()
        .code(12)
        .stderr(predicate::str::contains("checksum"));

    assert!(!marker.exists());
    assert!(!env.root().join("Cellar/app").exists());
}

#[test]
fn test_missing_dependency() {
    let env = Env::new();
    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &format!(
                "\n[[dependencies]]\nname = \"zlib\"\n{}",
                sh_step("build", "mkdir -p {prefix}")
            ),
        ),
    );

    env.keg()
        .args(["install", "app"])
        .assert()
        .code(11)
        .stderr(predicate::str::contains("zlib"));
}

#[test]
fn test_replace_patch_without_match_fails() {
    let env = Env::new();
    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &format!(
                r##"{}{}
[[patches]]
file = "config.h"
stage = "build"
edit = "replace"
from = "#define OLD 1"
to = "#define NEW 1"
"##,
                sh_step("gen", "echo '#define OTHER 1' > config.h"),
                sh_step("build", "mkdir -p {prefix}")
            ),
        ),
    );

    env.keg()
        .args(["install", "app"])
        .assert()
        .code(13)
        .stderr(predicate::str::contains("config.h"));
    assert!(!env.root().join("Cellar/app/1.0").exists());
}

#[test]
fn test_failed_step_reports_output() {
    let env = Env::new();
    env.write_formula(
        "app",
        &formula("app", "1.0", &sh_step("build", "echo boom; exit 3")),
    );

    env.keg()
        .args(["install", "app"])
        .assert()
        .code(14)
        .stderr(predicate::str::contains("boom"));
    assert!(!env.root().join("Cellar/app/1.0").exists());
}

#[test]
fn test_bootstrapped_client_is_not_outdated() {
    let env = Env::new();
    let pristine = "{\"name\":\"client\",\"version\":\"1.2.3\"}\n";
    let install_sh = r#"#!/bin/sh
dest="$2/lib/node_modules/client"
mkdir -p "$dest"
echo "{\"name\":\"client\",\"version\":\"1.2.3\",\"_resolved\":\"file:$1\"}" > "$dest/package.json"
"#;
    let data = tarball_gz(&[
        ("package/package.json", pristine),
        ("package/bin/install.sh", install_sh),
    ]);
    let tarball = env.write_work_file("client-1.2.3.tgz", &data);

    env.write_formula(
        "runtime",
        &formula(
            "runtime",
            "1.0",
            &format!(
                r#"{}
[[resources]]
name = "client"
url = "{}"
sha256 = "{}"

[[install]]
action = "bootstrap"
resource = "client"
runtime = "sh"
staging = "client_bootstrap"
entry = "bin/install.sh"
args = ["{{resource:client}}", "{{libexec}}"]
target_prefix = "{{libexec}}"
package_dir = "{{libexec}}/lib/node_modules/client"
"#,
                sh_step("build", "mkdir -p {prefix}"),
                file_url(&tarball),
                sha256_bytes(&data)
            ),
        ),
    );

    env.keg().args(["install", "runtime"]).assert().success();

    let metadata = env
        .root()
        .join("Cellar/runtime/1.0/libexec/lib/node_modules/client/package.json");
    assert_eq!(fs::read_to_string(metadata).unwrap(), pristine);

    env.keg()
        .args(["outdated", "runtime"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_upgrade_prunes_stale_manpages() {
    let env = Env::new();
    let man1 = env.root().join("share/man/man1");
    fs::create_dir_all(&man1).unwrap();
    fs::write(man1.join("bar.1"), "stale copy").unwrap();
    fs::write(man1.join("keep.1"), "unrelated").unwrap();

    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &format!(
                r#"{}
[[install]]
action = "write"
path = "{{prefix}}/share/man/man1/app.1"
contents = ".TH APP 1"

[[post_install]]
action = "manpages"
from = "{{prefix}}/share/man"
sections = ["man1"]
include = ["app*"]
prune = ["bar.*"]
"#,
                sh_step("build", "mkdir -p {prefix}")
            ),
        ),
    );

    env.keg().args(["install", "app"]).assert().success();

    assert!(!man1.join("bar.1").exists());
    assert!(man1.join("keep.1").is_file());
    let page = man1.join("app.1");
    assert!(fs::symlink_metadata(&page).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&page).unwrap(), ".TH APP 1");
}

// ============================================================================
// keg test
// ============================================================================

const HELLO_TESTS: &str = r##"
[[install]]
action = "write"
path = "{bin}/hello"
contents = "#!/bin/sh\necho hello from {name}\n"
executable = true

[[test]]
step = "run"
run = ["{bin}/hello"]
stdout_eq = "hello from {name}"
"##;

#[test]
fn test_test_command_runs_installed_keg() {
    let env = Env::new();
    env.write_formula("hello", &formula("hello", "1.0", HELLO_TESTS));

    env.keg().args(["install", "hello"]).assert().success();
    env.keg()
        .args(["test", "hello"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Finished testing hello 1.0"));
}

#[test]
fn test_test_command_requires_install() {
    let env = Env::new();
    env.write_formula("hello", &formula("hello", "1.0", HELLO_TESTS));

    env.keg()
        .args(["test", "hello"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("hello is not installed"));
}

// ============================================================================
// keg plan / info / fetch
// ============================================================================

#[test]
fn test_plan_json() {
    let env = Env::new();
    env.write_formula(
        "app",
        &formula(
            "app",
            "2.0",
            &format!(
                "\n[[dependencies]]\nname = \"cmake\"\nphases = [\"build\"]\n{}",
                sh_step("build", "make")
            ),
        ),
    );

    let output = env.keg().args(["plan", "app", "--json"]).output().unwrap();
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["formula"], "app");
    assert_eq!(plan["pkg_version"], "2.0");
    assert_eq!(plan["dependencies"][0]["name"], "cmake");
    assert_eq!(plan["steps"][0]["argv"][0], "sh");
}

#[test]
fn test_plan_rejects_unknown_placeholder() {
    let env = Env::new();
    env.write_formula("app", &formula("app", "1.0", &sh_step("build", "cp x {nowhere}")));

    env.keg()
        .args(["plan", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_info_shows_install_state() {
    let env = Env::new();
    env.write_formula("app", &formula("app", "1.0", &sh_step("build", "mkdir -p {prefix}")));

    env.keg()
        .args(["info", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app 1.0"))
        .stdout(predicate::str::contains("Not installed"));
}

#[test]
fn test_fetch_prints_cached_path() {
    let env = Env::new();
    let tarball = env.write_work_file("client-1.2.3.tgz", b"client");
    env.write_formula(
        "app",
        &formula(
            "app",
            "1.0",
            &format!(
                "\n[[resources]]\nname = \"client\"\nurl = \"{}\"\nsha256 = \"{}\"\n",
                file_url(&tarball),
                sha256_bytes(b"client")
            ),
        ),
    );

    env.keg()
        .args(["fetch", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client-1.2.3.tgz"));
}

#[test]
fn test_unknown_formula() {
    let env = Env::new();
    env.keg()
        .args(["info", "nonexistent"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no formula named `nonexistent`"));
}

// ============================================================================
// keg completions
// ============================================================================

#[test]
fn test_completions_bash() {
    Command::cargo_bin("keg")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keg"));
}
