//! Formula text fixtures.

/// A formula with only a `[formula]` table followed by `extra`.
pub fn formula(name: &str, version: &str, extra: &str) -> String {
    format!(
        r#"[formula]
name = "{name}"
version = "{version}"
desc = "test formula"
license = "MIT"

{extra}
"#
    )
}

/// A `[[steps]]` entry running `script` with `sh -c`.
pub fn sh_step(id: &str, script: &str) -> String {
    format!(
        r#"
[[steps]]
id = "{id}"
run = ["sh", "-c", '''{script}''']
"#
    )
}

/// A `[[resources]]` entry.
pub fn resource(name: &str, url: &str, sha256: &str) -> String {
    format!(
        r#"
[[resources]]
name = "{name}"
url = "{url}"
sha256 = "{sha256}"
"#
    )
}

/// A `[[dependencies]]` entry with optional raw extra keys.
pub fn dependency(name: &str, extra: &str) -> String {
    format!(
        r#"
[[dependencies]]
name = "{name}"
{extra}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::Formula;
    use std::path::Path;

    #[test]
    fn test_fixture_parses() {
        let content = formula(
            "app",
            "1.0",
            &format!(
                "{}{}",
                dependency("zlib", "phases = [\"build\"]"),
                sh_step("build", "echo {prefix} > out.txt")
            ),
        );
        let parsed = Formula::parse(&content, Path::new("app.toml")).unwrap();
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.dependencies.len(), 1);
    }
}
