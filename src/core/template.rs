//! `{placeholder}` expansion for formula strings.
//!
//! A placeholder is `{` + an identifier-like name + `}`. Anything else in
//! braces (shell `${VAR}`, C# blocks, JSON) is copied through untouched;
//! `{{` and `}}` always produce literal braces.

use std::sync::LazyLock;

use regex::Regex;

/// Layout variables every template may use.
pub const LAYOUT_VARS: &[&str] = &[
    "prefix",
    "bin",
    "sbin",
    "lib",
    "include",
    "libexec",
    "share",
    "man",
    "man1",
    "doc",
    "etc",
    "var",
    "buildpath",
    "testpath",
    "name",
    "version",
    "version.major",
    "version.major_minor",
    "shared_prefix",
    "cellar",
    "cache",
    "opt_prefix",
    "opt_bin",
    "opt_lib",
    "opt_include",
    "opt_libexec",
    "jobs",
];

/// Fields of an installed dependency usable as `{dep:NAME.FIELD}`.
pub const DEP_FIELDS: &[&str] = &[
    "prefix",
    "opt",
    "bin",
    "lib",
    "include",
    "libexec",
    "share",
    "opt_bin",
    "opt_lib",
    "opt_include",
    "version",
];

static NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:@+/-]*$").ok());

/// A parsed placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder<'a> {
    /// Layout variable, e.g. `{prefix}`
    Var(&'a str),
    /// `{dep:NAME.FIELD}`
    Dep { name: &'a str, field: &'a str },
    /// `{resource:NAME}`: cached download
    Resource(&'a str),
    /// `{resource_dir:NAME}`: staged directory
    ResourceDir(&'a str),
    /// `{which:PROG}`
    Which(&'a str),
    /// `{env:VAR}`
    Env(&'a str),
}

impl<'a> Placeholder<'a> {
    /// Parse the text between braces.
    pub fn parse(text: &'a str) -> Result<Self, String> {
        let Some((kind, rest)) = text.split_once(':') else {
            if LAYOUT_VARS.contains(&text) {
                return Ok(Placeholder::Var(text));
            }
            return Err(format!("unknown placeholder `{{{}}}`", text));
        };
        if rest.is_empty() {
            return Err(format!("empty placeholder argument in `{{{}}}`", text));
        }
        match kind {
            "dep" => {
                let (name, field) = rest
                    .rsplit_once('.')
                    .ok_or_else(|| format!("`{{{}}}` must be written as {{dep:NAME.FIELD}}", text))?;
                if !DEP_FIELDS.contains(&field) {
                    return Err(format!("unknown dependency field `{}` in `{{{}}}`", field, text));
                }
                Ok(Placeholder::Dep { name, field })
            }
            "resource" => Ok(Placeholder::Resource(rest)),
            "resource_dir" => Ok(Placeholder::ResourceDir(rest)),
            "which" => Ok(Placeholder::Which(rest)),
            "env" => Ok(Placeholder::Env(rest)),
            _ => Err(format!("unknown placeholder kind `{}` in `{{{}}}`", kind, text)),
        }
    }
}

enum Piece<'a> {
    Literal(&'a str),
    Brace(char),
    Slot(&'a str),
}

fn is_placeholder_name(text: &str) -> bool {
    NAME_RE.as_ref().is_some_and(|re| re.is_match(text))
}

fn tokenize(input: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let bytes = input.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                pieces.push(Piece::Literal(&input[start..i]));
                pieces.push(Piece::Brace('{'));
                i += 2;
                start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                pieces.push(Piece::Literal(&input[start..i]));
                pieces.push(Piece::Brace('}'));
                i += 2;
                start = i;
            }
            // shell parameter expansion
            b'{' if i > 0 && bytes[i - 1] == b'$' => i += 1,
            b'{' => match input[i + 1..].find('}') {
                Some(len) if is_placeholder_name(&input[i + 1..i + 1 + len]) => {
                    pieces.push(Piece::Literal(&input[start..i]));
                    pieces.push(Piece::Slot(&input[i + 1..i + 1 + len]));
                    i += len + 2;
                    start = i;
                }
                _ => i += 1,
            },
            _ => i += 1,
        }
    }
    pieces.push(Piece::Literal(&input[start..]));
    pieces
}

/// Check that every placeholder in `input` is well-formed and known.
pub fn validate(input: &str) -> Result<(), String> {
    for piece in tokenize(input) {
        if let Piece::Slot(text) = piece {
            Placeholder::parse(text)?;
        }
    }
    Ok(())
}

/// Names of the formulas referenced through `{dep:NAME.FIELD}`.
pub fn referenced_deps(input: &str) -> Vec<String> {
    tokenize(input)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Slot(text) => match Placeholder::parse(text) {
                Ok(Placeholder::Dep { name, .. }) => Some(name.to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Expand every placeholder through `lookup`.
///
/// `lookup` returns `Ok(None)` for a placeholder that is valid but has no
/// value in the current context; that is reported as an error too.
pub fn expand<F>(input: &str, mut lookup: F) -> Result<String, String>
where
    F: FnMut(&Placeholder<'_>) -> Result<Option<String>, String>,
{
    let mut out = String::with_capacity(input.len());
    for piece in tokenize(input) {
        match piece {
            Piece::Literal(s) => out.push_str(s),
            Piece::Brace(c) => out.push(c),
            Piece::Slot(text) => {
                let placeholder = Placeholder::parse(text)?;
                match lookup(&placeholder)? {
                    Some(value) => out.push_str(&value),
                    None => return Err(format!("`{{{}}}` has no value here", text)),
                }
            }
        }
    }
    Ok(out)
}
