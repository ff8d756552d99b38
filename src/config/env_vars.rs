use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref WINDOWS_VAR: Regex =
        Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").expect("windows variable pattern");
    static ref UNIX_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("unix variable pattern");
}

/// Expand Windows-style `%VAR%` references. Unknown variables are left as-is.
pub fn expand_windows_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('%') {
        return input.to_string();
    }
    WINDOWS_VAR
        .replace_all(input, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand Unix-style `$VAR` and `${VAR}` references. Unknown variables are left as-is.
pub fn expand_unix_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('$') {
        return input.to_string();
    }
    UNIX_VAR
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand both reference styles.
pub fn expand_env_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let windows = expand_windows_vars(input, &lookup);
    expand_unix_vars(&windows, &lookup)
}

/// Environment variable bound to a dotted configuration key:
/// `artifacts.processes.enabled` is read from `ARTIFACTS_PROCESSES_ENABLED`.
pub fn env_var_name<S: AsRef<str>>(key_path: &[S]) -> String {
    key_path
        .iter()
        .map(|part| part.as_ref())
        .collect::<Vec<_>>()
        .join("_")
        .replace('.', "_")
        .to_uppercase()
}
