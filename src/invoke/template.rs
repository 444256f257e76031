//! Argument template rendering.
//!
//! Templates are argv lists, never shell strings, so target paths with
//! spaces or metacharacters need no quoting.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z_]+)\}").unwrap();
}

/// Placeholders a template may use.
pub const PLACEHOLDERS: &[&str] = &["target", "scratch", "password"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
}

/// Values substituted into an argument template.
pub struct TemplateVars<'a> {
    pub target: &'a Path,
    pub scratch: &'a Path,
    /// `None` renders as an empty string.
    pub password: Option<&'a str>,
}

/// Check that `args` only uses known placeholders.
pub fn validate(args: &[String]) -> Result<(), TemplateError> {
    for arg in args {
        for caps in PLACEHOLDER.captures_iter(arg) {
            let name = &caps[1];
            if !PLACEHOLDERS.contains(&name) {
                return Err(TemplateError::UnknownPlaceholder(name.to_string()));
            }
        }
    }
    Ok(())
}

/// Whether any argument references `{name}`.
pub fn references(args: &[String], name: &str) -> bool {
    let needle = format!("{{{}}}", name);
    args.iter().any(|a| a.contains(&needle))
}

/// Substitute placeholders into each argument.
pub fn render(args: &[String], vars: &TemplateVars<'_>) -> Result<Vec<OsString>, TemplateError> {
    validate(args)?;

    let rendered = args
        .iter()
        .map(|arg| match arg.as_str() {
            // Whole-argument paths are passed through untouched so non-UTF-8
            // names survive.
            "{target}" => vars.target.as_os_str().to_os_string(),
            "{scratch}" => vars.scratch.as_os_str().to_os_string(),
            _ => {
                let replaced = PLACEHOLDER.replace_all(arg, |caps: &Captures| match &caps[1] {
                    "target" => vars.target.to_string_lossy().into_owned(),
                    "scratch" => vars.scratch.to_string_lossy().into_owned(),
                    "password" => vars.password.unwrap_or_default().to_string(),
                    _ => caps[0].to_string(),
                });
                OsString::from(replaced.into_owned())
            }
        })
        .collect();

    Ok(rendered)
}
