//! Command-line argument parsing.
//!
//! Usage:
//!   preproc [-v] [-c <config>] [-D name=value]... [<file> | -]

use std::path::{Path, PathBuf};

use crate::script::value::Value;

pub const USAGE: &str = "Usage: preproc [-v] [-c <config>] [-D name=value]... [<file> | -]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Engine config file (`-c<file>`).
    pub config: Option<PathBuf>,
    /// Host-defined globals (`-D name=value`), in command-line order.
    pub defines: Vec<(String, Value)>,
    /// Debug logging (`-v`).
    pub verbose: bool,
    pub input: Input,
}

/// Where the document comes from.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Input {
    #[default]
    Stdin,
    File(PathBuf),
}

impl Input {
    /// Directory that relative resource paths resolve against.
    pub fn base_dir(&self) -> PathBuf {
        match self {
            Input::Stdin => PathBuf::from("."),
            Input::File(path) => match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            Input::Stdin => "<stdin>".to_owned(),
            Input::File(path) => path.display().to_string(),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'v' => args.verbose = true,

                // -c<file> / -c <file>
                'c' => {
                    let file = option_value(&chars, &mut j, argv, &mut i, "-c requires a file argument")?;
                    args.config = Some(PathBuf::from(file));
                }

                // -Dname=value / -D name=value
                'D' => {
                    let def = option_value(&chars, &mut j, argv, &mut i, "-D requires name=value")?;
                    args.defines.push(parse_define(&def)?);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => {
            let p = positional.remove(0);
            if p != "-" {
                args.input = Input::File(PathBuf::from(p));
            }
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

/// The value of an option that takes an argument, either embedded in the
/// same word or in the next one.
fn option_value(chars: &[char], j: &mut usize, argv: &[String], i: &mut usize, missing: &str) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(missing.to_owned())
    }
}

/// Split `name=value`.  The value is taken as JSON when it parses,
/// otherwise as a plain string; a bare `name` defines an empty string.
pub fn parse_define(def: &str) -> Result<(String, Value), String> {
    let (name, raw) = def.split_once('=').unwrap_or((def, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid definition: {def:?}"));
    }
    Ok((name.to_owned(), define_value(raw)))
}

fn define_value(raw: &str) -> Value {
    Value::from_json(raw).unwrap_or_else(|_| Value::from(raw))
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Locate the engine config file.
///
/// Priority: `-c<file>` → `PREPROC_CONFIG` env var → `preproc.conf` in the
/// per-user config directory.  Returns `None` when nothing applies or the
/// per-user file does not exist.
pub fn find_config(cli_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = cli_override {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("PREPROC_CONFIG") {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    directories::ProjectDirs::from("", "", "preproc")
        .map(|dirs| dirs.config_dir().join("preproc.conf"))
        .filter(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(!a.verbose);
        assert!(a.config.is_none());
        assert_eq!(a.input, Input::Stdin);
    }

    #[test]
    fn file_positional() {
        let a = parse_argv(&argv(&["diagrams/seq.puml"])).unwrap();
        assert_eq!(a.input, Input::File(PathBuf::from("diagrams/seq.puml")));
        assert_eq!(a.input.base_dir(), PathBuf::from("diagrams"));
    }

    #[test]
    fn dash_is_stdin() {
        let a = parse_argv(&argv(&["-v", "-"])).unwrap();
        assert!(a.verbose);
        assert_eq!(a.input, Input::Stdin);
        assert_eq!(a.input.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn bare_file_resolves_against_cwd() {
        let a = parse_argv(&argv(&["seq.puml"])).unwrap();
        assert_eq!(a.input.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn config_embedded_and_separate() {
        let a = parse_argv(&argv(&["-cengine.conf"])).unwrap();
        assert_eq!(a.config, Some(PathBuf::from("engine.conf")));
        let a = parse_argv(&argv(&["-c", "engine.conf"])).unwrap();
        assert_eq!(a.config, Some(PathBuf::from("engine.conf")));
    }

    #[test]
    fn config_requires_argument() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn defines() {
        let a = parse_argv(&argv(&["-D", "n=3", "-Dname=Alice", "-D", "cfg={\"a\":[1]}", "-Dflag"])).unwrap();
        assert_eq!(a.defines[0], ("n".to_owned(), Value::from(3)));
        assert_eq!(a.defines[1], ("name".to_owned(), Value::from("Alice")));
        assert_eq!(a.defines[2].1, Value::from_json(r#"{"a":[1]}"#).unwrap());
        assert_eq!(a.defines[3], ("flag".to_owned(), Value::from("")));
    }

    #[test]
    fn invalid_define() {
        assert!(parse_argv(&argv(&["-D", "=1"])).is_err());
    }

    #[test]
    fn combined_flags() {
        let a = parse_argv(&argv(&["-vcx.conf", "in.txt"])).unwrap();
        assert!(a.verbose);
        assert_eq!(a.config, Some(PathBuf::from("x.conf")));
    }

    #[test]
    fn unknown_flag() {
        let err = parse_argv(&argv(&["-z"])).unwrap_err();
        assert!(err.contains("unknown option: -z"));
    }

    #[test]
    fn too_many_arguments() {
        assert!(parse_argv(&argv(&["a", "b"])).is_err());
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-odd-name"])).unwrap();
        assert_eq!(a.input, Input::File(PathBuf::from("-odd-name")));
    }

    #[test]
    fn explicit_config_wins() {
        let p = find_config(Some(Path::new("/tmp/x.conf")));
        assert_eq!(p, Some(PathBuf::from("/tmp/x.conf")));
    }
}
