//! INI parsing for provider files
//!
//! Follows the rules of Python's `configparser` with interpolation
//! disabled, so provider files written for existing virtual BMC tooling
//! load unchanged:
//!
//! - `[SECTION]` headers are case-sensitive, option names are not
//! - `key = value` or `key: value`, the first delimiter wins
//! - full-line `#` and `;` comments
//! - indented lines continue the previous value, blank lines inside a
//!   value are kept and trailing ones dropped
//! - `[DEFAULT]` values are visible from every section
//!
//! Several files can be merged into one [`Ini`]; later files overwrite
//! options of earlier ones.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{BmcError, Result};

/// Name of the fallback section
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Merged contents of one or more INI files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    defaults: BTreeMap<String, String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Ini {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and merge it into this document
    ///
    /// `path` is only used for error messages. A duplicate section or
    /// option inside the same text is an error; across calls it is a merge.
    pub fn merge_str(&mut self, path: &Path, text: &str) -> Result<()> {
        let parse_error = |line: usize, message: String| BmcError::ProviderParse {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut seen_sections: HashSet<String> = HashSet::new();
        let mut seen_options: HashSet<(String, String)> = HashSet::new();
        let mut section: Option<String> = None;
        // (option, indent) of the value that continuation lines extend
        let mut current: Option<(String, usize)> = None;
        // blank lines kept only if another continuation line follows
        let mut pending_blank = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let stripped = raw.trim();

            if stripped.is_empty() {
                if current.is_some() {
                    pending_blank += 1;
                }
                continue;
            }
            if stripped.starts_with('#') || stripped.starts_with(';') {
                continue;
            }

            let indent = raw.len() - raw.trim_start().len();

            if let (Some(sect), Some((option, option_indent))) = (&section, &current) {
                if indent > *option_indent {
                    if let Some(value) = self.section_mut(sect).get_mut(option) {
                        for _ in 0..pending_blank {
                            value.push('\n');
                        }
                        value.push('\n');
                        value.push_str(stripped);
                    }
                    pending_blank = 0;
                    continue;
                }
            }

            if let Some(header) = stripped
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                if header.is_empty() {
                    return Err(parse_error(line_no, "empty section name".to_string()));
                }
                if !seen_sections.insert(header.to_string()) {
                    return Err(parse_error(
                        line_no,
                        format!("section [{}] already exists", header),
                    ));
                }
                if header != DEFAULT_SECTION {
                    self.sections.entry(header.to_string()).or_default();
                }
                section = Some(header.to_string());
                current = None;
                pending_blank = 0;
                continue;
            }

            let Some(sect) = &section else {
                return Err(parse_error(
                    line_no,
                    "option outside of a section".to_string(),
                ));
            };

            let Some(split) = stripped.find(|c: char| c == '=' || c == ':') else {
                return Err(parse_error(
                    line_no,
                    format!("expected 'option = value', got '{}'", stripped),
                ));
            };

            let option = stripped[..split].trim().to_lowercase();
            let value = stripped[split + 1..].trim().to_string();

            if option.is_empty() {
                return Err(parse_error(line_no, "empty option name".to_string()));
            }
            if !seen_options.insert((sect.clone(), option.clone())) {
                return Err(parse_error(
                    line_no,
                    format!("option '{}' in section [{}] already exists", option, sect),
                ));
            }

            self.section_mut(sect).insert(option.clone(), value);
            current = Some((option, indent));
            pending_blank = 0;
        }

        Ok(())
    }

    fn section_mut(&mut self, name: &str) -> &mut BTreeMap<String, String> {
        if name == DEFAULT_SECTION {
            &mut self.defaults
        } else {
            self.sections.entry(name.to_string()).or_default()
        }
    }

    /// True if the section was declared (the DEFAULT section never counts)
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Look up an option, falling back to `[DEFAULT]`
    ///
    /// Returns None when the section does not exist.
    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        let values = self.sections.get(section)?;
        let option = option.to_lowercase();
        values
            .get(&option)
            .or_else(|| self.defaults.get(&option))
            .map(String::as_str)
    }

    /// Declared section names, sorted
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// All options visible from a section, including defaults, sorted
    pub fn options(&self, section: &str) -> Vec<(&str, &str)> {
        let Some(values) = self.sections.get(section) else {
            return Vec::new();
        };
        let mut merged: BTreeMap<&str, &str> = self
            .defaults
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        merged.extend(values.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        merged.into_iter().collect()
    }
}
