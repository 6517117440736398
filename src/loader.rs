use std::collections::HashMap;
use std::path::Path;

use crate::env::TargetEnv;
use crate::error::{DecodeError, Error};
use crate::model::{Entry, KeyParsingMode, LoadReport, SubstitutionMode};
use crate::parser::parse_with_source;

/// How one override file is decoded and merged into an environment target.
///
/// A [`ShadowEnv`](crate::ShadowEnv) owns one loader and drives it once per
/// file, reloading itself in between.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    override_existing: bool,
    substitution_mode: SubstitutionMode,
    key_parsing_mode: KeyParsingMode,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether decoded values replace variables the target already has.
    ///
    /// Defaults to `true`, so a later file wins over an earlier one.
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    pub fn key_parsing_mode(mut self, key_parsing_mode: KeyParsingMode) -> Self {
        self.key_parsing_mode = key_parsing_mode;
        self
    }

    /// Read and decode `path` without applying anything.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<Entry>, Error> {
        let bytes = std::fs::read(path).map_err(|source| Error::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;

        let decode_err = |source: DecodeError| Error::Decode {
            path: path.to_path_buf(),
            source,
        };
        let text = std::str::from_utf8(&bytes).map_err(|err| decode_err(err.into()))?;
        parse_with_source(
            text,
            Some(path),
            self.key_parsing_mode,
            self.substitution_mode == SubstitutionMode::Expand,
        )
        .map_err(|err| decode_err(err.into()))
    }

    /// Decode `path` completely, then write its entries into `target`.
    pub(crate) fn merge_file(
        &self,
        path: &Path,
        target: &mut TargetEnv,
    ) -> Result<LoadReport, Error> {
        let mut entries = self.parse_file(path)?;
        if self.substitution_mode == SubstitutionMode::Expand {
            Expander::new(&entries, target, self.override_existing).expand_all(&mut entries);
        }

        let mut report = LoadReport {
            files_read: 1,
            ..LoadReport::default()
        };
        for entry in entries {
            if !self.override_existing && target.contains_key(&entry.key) {
                tracing::trace!(key = %entry.key, "keeping existing variable");
                report.skipped_existing += 1;
                continue;
            }
            target.set_var(&entry.key, &entry.value)?;
            report.loaded += 1;
        }

        tracing::debug!(
            path = %path.display(),
            loaded = report.loaded,
            skipped = report.skipped_existing,
            "merged override file"
        );
        Ok(report)
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            override_existing: true,
            substitution_mode: SubstitutionMode::Disabled,
            key_parsing_mode: KeyParsingMode::Strict,
        }
    }
}

/// Resolves `$VAR` and `${VAR}` against the file's own entries first and the
/// target second. Unknown and self-referencing placeholders stay literal.
///
/// Entry values arrive in the parser's escaped form: `\$` and `\\` are
/// literal and are decoded here, after placeholders are replaced.
struct Expander<'a> {
    raw: HashMap<String, String>,
    resolved: HashMap<String, String>,
    target: &'a TargetEnv,
    override_existing: bool,
    /// Set when the expansion in progress referenced a key already on the
    /// stack. Such values depend on where resolution started and are not
    /// cached.
    cycle: bool,
}

impl<'a> Expander<'a> {
    fn new(entries: &[Entry], target: &'a TargetEnv, override_existing: bool) -> Self {
        Self {
            raw: entries
                .iter()
                .map(|entry| (entry.key.clone(), entry.value.clone()))
                .collect(),
            resolved: HashMap::new(),
            target,
            override_existing,
            cycle: false,
        }
    }

    fn expand_all(mut self, entries: &mut [Entry]) {
        for entry in entries {
            entry.value = self.resolve(&entry.key, &mut Vec::new());
        }
    }

    fn resolve(&mut self, key: &str, stack: &mut Vec<String>) -> String {
        if let Some(done) = self.resolved.get(key) {
            return done.clone();
        }

        // A kept target value is what the key will hold after the merge.
        let kept = (!self.override_existing)
            .then(|| self.target.get_var(key))
            .flatten();
        let value = match (kept, self.raw.get(key).cloned()) {
            (Some(existing), _) => existing,
            (None, None) => return self.target.get_var(key).unwrap_or_default(),
            (None, Some(raw)) => {
                let outer = std::mem::replace(&mut self.cycle, false);
                stack.push(key.to_owned());
                let expanded = expand(&raw, |name| self.placeholder(name, stack));
                stack.pop();
                let cyclic = self.cycle;
                self.cycle |= outer;
                if cyclic {
                    return expanded;
                }
                expanded
            }
        };

        self.resolved.insert(key.to_owned(), value.clone());
        value
    }

    fn placeholder(&mut self, name: &str, stack: &mut Vec<String>) -> Option<String> {
        if stack.iter().any(|open| open == name) {
            self.cycle = true;
            return None;
        }
        if self.raw.contains_key(name) {
            return Some(self.resolve(name, stack));
        }
        self.target.get_var(name)
    }
}

fn expand(input: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['$', '\\']) {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        if let Some(escaped) = candidate.strip_prefix('\\') {
            let mut chars = escaped.chars();
            match chars.next() {
                Some(ch) => {
                    out.push(ch);
                    rest = chars.as_str();
                }
                None => {
                    out.push('\\');
                    rest = "";
                }
            }
            continue;
        }
        match placeholder(candidate) {
            Some((name, len)) => {
                let token = &candidate[..len];
                out.push_str(&lookup(name).unwrap_or_else(|| token.to_owned()));
                rest = &candidate[len..];
            }
            None => {
                out.push('$');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parses the placeholder at the start of `input` (which begins with `$`),
/// returning its name and the byte length of the whole token.
fn placeholder(input: &str) -> Option<(&str, usize)> {
    if let Some(braced) = input.strip_prefix("${") {
        let end = braced.find('}')?;
        let name = &braced[..end];
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
        return valid.then_some((name, end + 3));
    }

    let tail = &input[1..];
    let starts_name = tail
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
    if !starts_name {
        return None;
    }
    let len = tail
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    Some((&tail[..len], len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_keeps_unknown_and_malformed_placeholders() {
        let out = expand("a-${X}-$Y-${}-$1-$", |name| {
            (name == "X").then(|| "x".to_owned())
        });
        assert_eq!(out, "a-x-$Y-${}-$1-$");
    }

    #[test]
    fn expand_decodes_escaped_literals_after_substitution() {
        let out = expand(r"\$HOME/$HOME C:\\dir \", |name| {
            (name == "HOME").then(|| r"/h\x".to_owned())
        });
        assert_eq!(out, r"$HOME//h\x C:\dir \");
    }

    #[test]
    fn cyclic_values_resolve_the_same_in_either_order() {
        let target = TargetEnv::memory();
        for input in ["A=$B\nB=$A\n", "B=$A\nA=$B\n"] {
            let mut entries = parse_with_source(input, None, KeyParsingMode::Strict, true)
                .expect("parse should succeed");
            Expander::new(&entries, &target, true).expand_all(&mut entries);
            for entry in &entries {
                assert_eq!(entry.value, format!("${}", entry.key), "input {input:?}");
            }
        }
    }

    #[test]
    fn placeholder_lengths_cover_whole_token() {
        assert_eq!(placeholder("${A.B}rest"), Some(("A.B", 6)));
        assert_eq!(placeholder("$AB_1-rest"), Some(("AB_1", 5)));
        assert_eq!(placeholder("${open"), None);
    }
}
