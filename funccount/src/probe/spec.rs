//! Probe specification parser
//!
//! ```text
//! func            kernel function
//! lib:func        user-space function in library `lib`
//! p::func         same as `func`
//! p:lib:func      same as `lib:func`
//! t:cat:event     kernel tracepoint `cat:event`
//! u:lib:probe     USDT probe in `lib`
//! ```
//!
//! Without `--regexp` the pattern is a glob where `*` matches any substring
//! and the whole name must match. With `--regexp` the expression is matched at
//! the start of the name.

use regex::Regex;

use crate::domain::{FuncCountError, ProbeKind, Result};

/// A parsed probe specification
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub kind: ProbeKind,
    /// Library or binary name as typed; empty for kernel probes
    pub library: String,
    /// Pattern as typed, before glob translation
    pub raw_pattern: String,
    pub is_regex: bool,
    matcher: Regex,
}

impl ProbeSpec {
    /// Parse a `[type:][library:]pattern` specification
    ///
    /// # Errors
    /// Returns [`FuncCountError::InvalidSpec`] for an unknown type letter, more
    /// than two `:` separators, or a pattern that does not compile
    pub fn parse(spec: &str, use_regex: bool) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();

        let (kind, library, pattern) = match parts.as_slice() {
            [pattern] => (ProbeKind::Function, "", (*pattern).to_string()),
            [library, pattern] => (ProbeKind::Function, *library, (*pattern).to_string()),
            // category:event is a single matchable name
            ["t", category, event] => (ProbeKind::Tracepoint, "", format!("{category}:{event}")),
            [kind, library, pattern] => {
                let kind = match *kind {
                    "p" => ProbeKind::Function,
                    "u" => ProbeKind::Usdt,
                    other => {
                        return Err(FuncCountError::InvalidSpec(format!(
                            "Type must be 'p', 't', or 'u', but got {other}"
                        )))
                    }
                };
                (kind, *library, (*pattern).to_string())
            }
            _ => {
                return Err(FuncCountError::InvalidSpec(format!(
                    "Too many ':'-separated components in pattern {spec}"
                )))
            }
        };

        let source = if use_regex { format!("^(?:{pattern})") } else { glob_to_regex(&pattern) };
        let matcher = Regex::new(&source).map_err(|e| {
            FuncCountError::InvalidSpec(format!("Invalid pattern {pattern}: {e}"))
        })?;

        Ok(Self {
            kind,
            library: library.to_string(),
            raw_pattern: pattern,
            is_regex: use_regex,
            matcher,
        })
    }

    /// Whether a candidate name is selected by this spec
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    /// The compiled expression, as shown in error messages
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    /// Kernel functions and tracepoints need no library
    #[must_use]
    pub fn is_kernel_probe(&self) -> bool {
        self.kind == ProbeKind::Tracepoint || (self.kind == ProbeKind::Function && self.library.is_empty())
    }

    /// User functions and USDT probes are looked up in a library or executable
    #[must_use]
    pub fn needs_library(&self) -> bool {
        !self.is_kernel_probe()
    }
}

/// Translate a `*` glob into an anchored regular expression
///
/// Everything except `*` is matched literally.
#[must_use]
fn glob_to_regex(glob: &str) -> String {
    let body: Vec<String> = glob.split('*').map(regex::escape).collect();
    format!("^{}$", body.join(".*"))
}
