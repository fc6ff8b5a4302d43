//! Build parameter specifiers declared inside job scripts.
//!
//! A parameterised job script starts a block of specifier lines with one of
//! the markers `#-?`, `/*-?` or `//*-?`:
//!
//! ```text
//! #-?b?VERBOSE?on?print every command
//! #-?c?TARGET?debug|release
//! #-?s?BRANCH?main?branch to build
//! ```
//!
//! Fields are `?`-separated: marker, type (`b`ool, `c`hoice, `s`tring), name,
//! default (or `|`-separated choices for `c`), optional comment. The block
//! ends at the first non-specifier line after it has started.
//!
//! Submitted values end up in the job's environment, so they are sanitised
//! against path traversal unless the parameter name opts out.

use std::path::Path;

use serde::Serialize;

use crate::error::CoreError;

/// Line prefixes that introduce a parameter specifier.
const SPECIFIER_MARKERS: [&str; 3] = ["#-?", "/*-?", "//*-?"];

/// Parameter names with this prefix are passed through unsanitised.
pub const UNSANITIZED_PREFIX: &str = "NOPATH_";

/// Parameter names with this suffix are passed through unsanitised.
pub const UNSANITIZED_SUFFIX: &str = "_URI";

/// The kind of form control a parameter declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Choice,
    String,
}

/// One declared build parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    /// Default value. For booleans this is `Some("true")` when the box starts
    /// checked and `None` otherwise (an unchecked box submits nothing).
    pub default: Option<String>,
    /// Allowed values for [`ParamKind::Choice`]; empty for other kinds.
    pub choices: Vec<String>,
    pub comment: Option<String>,
    /// Whether submitted values skip path sanitisation.
    pub unsanitized: bool,
}

/// Whether `line` is a parameter specifier.
pub fn is_param_specifier(line: &str) -> bool {
    SPECIFIER_MARKERS.iter().any(|m| line.starts_with(m))
}

/// Parse the first block of parameter specifiers in a script.
///
/// Malformed specifier lines (too few fields, unknown type) are skipped but
/// do not end the block.
pub fn parse_param_specs(script: &str) -> Vec<ParamSpec> {
    let mut specs = Vec::new();
    let mut in_block = false;

    for line in script.lines() {
        if !is_param_specifier(line) {
            if in_block {
                break;
            }
            continue;
        }
        in_block = true;

        let fields: Vec<&str> = line.split('?').collect();
        if fields.len() < 4 || fields[2].is_empty() {
            tracing::debug!(line, "Skipping malformed parameter specifier");
            continue;
        }
        let name = fields[2].to_string();
        let value = fields[3];
        let comment = fields
            .get(4)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let unsanitized = skips_sanitizing(&name);

        let spec = match fields[1] {
            "b" => ParamSpec {
                name,
                kind: ParamKind::Bool,
                default: bool_default(value).then(|| "true".to_string()),
                choices: Vec::new(),
                comment,
                unsanitized,
            },
            "c" => {
                let choices: Vec<String> = value.split('|').map(str::to_string).collect();
                ParamSpec {
                    name,
                    kind: ParamKind::Choice,
                    default: choices.first().cloned(),
                    choices,
                    comment,
                    unsanitized,
                }
            }
            "s" => ParamSpec {
                name,
                kind: ParamKind::String,
                default: Some(value.to_string()),
                choices: Vec::new(),
                comment,
                unsanitized,
            },
            other => {
                tracing::debug!(kind = other, "Skipping parameter of unknown type");
                continue;
            }
        };
        specs.push(spec);
    }
    specs
}

/// Read and parse the parameter specifiers of the script at `path`.
///
/// A missing script declares no parameters. Non-UTF-8 content (a binary
/// program) is read lossily and simply yields no specifiers.
pub async fn read_param_specs(path: &Path) -> Result<Vec<ParamSpec>, CoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(parse_param_specs(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Whether a parameter name opts out of path sanitisation.
pub fn skips_sanitizing(name: &str) -> bool {
    name.starts_with(UNSANITIZED_PREFIX) || name.ends_with(UNSANITIZED_SUFFIX)
}

/// Sanitise a submitted parameter value for use in the job environment.
///
/// Removes every `../`, lexically cleans the result and drops a leading `/`,
/// so a value can never point outside the job's workspace by construction.
pub fn sanitize_param_value(name: &str, value: &str) -> String {
    if skips_sanitizing(name) || value.is_empty() {
        return value.to_string();
    }
    let cleaned = clean_path(&value.replace("../", ""));
    match cleaned.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => cleaned,
    }
}

fn bool_default(value: &str) -> bool {
    matches!(value, "on" | "true" | "1") || value.starts_with("enable")
}

/// Lexical path cleaning: collapse repeated separators, drop `.` segments
/// and resolve `..` against preceding segments.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }
    let joined = out.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "#!/bin/sh\n\
        #-?b?VERBOSE?on?print every command\n\
        #-?b?DRY_RUN?off\n\
        #-?c?TARGET?debug|release|profile?build flavour\n\
        #-?s?BRANCH?main\n\
        #-?s?NOPATH_DEST?/srv/out\n\
        \n\
        #-?s?IGNORED?after the block\n\
        echo building\n";

    #[test]
    fn parses_leading_specifier_block() {
        let specs = parse_param_specs(SCRIPT);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["VERBOSE", "DRY_RUN", "TARGET", "BRANCH", "NOPATH_DEST"]);

        assert_eq!(specs[0].kind, ParamKind::Bool);
        assert_eq!(specs[0].default.as_deref(), Some("true"));
        assert_eq!(specs[0].comment.as_deref(), Some("print every command"));
        assert_eq!(specs[1].default, None);

        assert_eq!(specs[2].kind, ParamKind::Choice);
        assert_eq!(specs[2].choices, ["debug", "release", "profile"]);
        assert_eq!(specs[2].default.as_deref(), Some("debug"));

        assert_eq!(specs[3].kind, ParamKind::String);
        assert_eq!(specs[3].default.as_deref(), Some("main"));
        assert!(!specs[3].unsanitized);
        assert!(specs[4].unsanitized);
    }

    #[test]
    fn alternate_markers_are_recognised() {
        assert!(is_param_specifier("/*-?s?A?x"));
        assert!(is_param_specifier("//*-?s?A?x"));
        assert!(!is_param_specifier("# -?s?A?x"));
    }

    #[test]
    fn script_without_specifiers_has_no_params() {
        assert!(parse_param_specs("#!/bin/sh\nmake all\n").is_empty());
    }

    #[test]
    fn malformed_specifiers_are_skipped_inside_block() {
        let specs = parse_param_specs("#-?s\n#-?x?WHAT?y\n#-?s?OK?v\n");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "OK");
    }

    #[tokio::test]
    async fn reads_specs_from_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("build.sh");
        tokio::fs::write(&script, SCRIPT).await.unwrap();
        assert_eq!(read_param_specs(&script).await.unwrap().len(), 5);
        assert!(read_param_specs(&dir.path().join("missing.sh"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sanitize_strips_traversal_and_root() {
        assert_eq!(sanitize_param_value("DIR", "../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_param_value("DIR", "/abs/path"), "abs/path");
        assert_eq!(sanitize_param_value("DIR", "a/./b//c/"), "a/b/c");
        assert_eq!(sanitize_param_value("DIR", "a/b/..x"), "a/b/..x");
        assert_eq!(sanitize_param_value("DIR", ""), "");
    }

    #[test]
    fn opted_out_names_are_untouched() {
        assert_eq!(sanitize_param_value("NOPATH_DEST", "../x"), "../x");
        assert_eq!(
            sanitize_param_value("REPO_URI", "https://host/../repo"),
            "https://host/../repo"
        );
    }
}
