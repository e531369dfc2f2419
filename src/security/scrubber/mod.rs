//! Secret scrubber (spec §4.B).
//!
//! Every string field returned from a dispatcher tool invocation, and every
//! branch return message, passes through `scrub` before it leaves the core.
//! Detection is a two-phase scan: an Aho-Corasick automaton over literal
//! credential prefixes gates a second-pass regex validation, so the common
//! case (no secret present) costs one linear scan over the text.

use aho_corasick::AhoCorasick;
use base64::Engine;
use regex::Regex;
use tracing::warn;

const REDACTION_MARKER: &str = "[REDACTED]";

struct LeakPattern {
    name: &'static str,
    regex: Regex,
    /// Index into the Aho-Corasick automaton's pattern list. `None` when the
    /// pattern has no usable literal prefix and must always run.
    ac_index: Option<usize>,
}

struct KnownSecretPattern {
    name: String,
    regex: Regex,
}

/// Outcome of a single `scrub` call.
#[derive(Debug, Clone)]
pub struct ScrubResult {
    pub scrubbed: String,
    pub hits: Vec<String>,
}

/// Detects and redacts credential-like substrings in outbound text.
pub struct SecretScrubber {
    patterns: Vec<LeakPattern>,
    ac: AhoCorasick,
    known_secrets: Vec<KnownSecretPattern>,
    base64_candidate_re: Regex,
    hex_candidate_re: Regex,
}

impl SecretScrubber {
    pub fn new() -> Self {
        // (name, regex, literal prefix used for the Aho-Corasick first pass)
        let pattern_defs: Vec<(&str, &str, &str)> = vec![
            (
                "anthropic_api_key",
                r"sk-ant-api[0-9a-zA-Z\-_]{16,200}",
                "sk-ant-api",
            ),
            (
                "openai_api_key",
                r"sk-(?:proj|org|svcacct)-[a-zA-Z0-9\-_]{16,200}|sk-(?:[b-zB-Z0-9]|a[^n]|an[^t])[a-zA-Z0-9]{13,197}",
                "sk-",
            ),
            ("slack_bot_token", r"xoxb-[0-9]+-[0-9]+-[a-zA-Z0-9]+", "xoxb-"),
            (
                "slack_app_token",
                r"xapp-[0-9]+-[A-Z0-9]+-[0-9]+-[A-Fa-f0-9]+",
                "xapp-",
            ),
            ("github_pat", r"ghp_[a-zA-Z0-9]{36}", "ghp_"),
            (
                "github_fine_grained_pat",
                r"github_pat_[a-zA-Z0-9]{22}_[a-zA-Z0-9]{59}",
                "github_pat_",
            ),
            ("aws_access_key", r"AKIA[0-9A-Z]{16}", "AKIA"),
            ("gcp_api_key", r"AIza[0-9A-Za-z\-_]{35}", "AIza"),
            (
                "bearer_authorization_header",
                r"(?i)bearer\s+[a-zA-Z0-9\-_.=]{16,500}",
                "",
            ),
            (
                "generic_long_random_token",
                r"\b[A-Za-z0-9_\-]{40,200}\b",
                "",
            ),
        ];

        let mut prefixes = Vec::with_capacity(pattern_defs.len());
        let mut patterns = Vec::with_capacity(pattern_defs.len());

        for (name, regex_str, prefix) in pattern_defs {
            match Regex::new(regex_str) {
                Ok(regex) => {
                    let ac_index = if prefix.is_empty() {
                        None
                    } else {
                        let idx = prefixes.len();
                        prefixes.push(prefix);
                        Some(idx)
                    };
                    patterns.push(LeakPattern {
                        name,
                        regex,
                        ac_index,
                    });
                }
                Err(e) => {
                    warn!("failed to compile scrubber pattern '{}': {}", name, e);
                }
            }
        }

        let ac = AhoCorasick::new(&prefixes)
            .expect("aho-corasick automaton should build from literal prefixes");

        Self {
            patterns,
            ac,
            known_secrets: Vec::new(),
            base64_candidate_re: Regex::new(r"[A-Za-z0-9+/]{20,500}={0,3}").unwrap(),
            hex_candidate_re: Regex::new(r"[0-9a-fA-F]{40,512}").unwrap(),
        }
    }

    /// Register a known secret value (e.g. a just-issued branch credential)
    /// for exact-match detection across raw, base64, and hex encodings.
    /// Values shorter than 10 chars are skipped to avoid false positives.
    pub fn add_known_secret(&mut self, name: &str, value: &str) {
        if value.len() < 10 {
            return;
        }
        let escaped = regex::escape(value);
        if let Ok(regex) = Regex::new(&escaped) {
            self.known_secrets.push(KnownSecretPattern {
                name: format!("{name}_raw"),
                regex,
            });
        }
        let b64_standard = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
        let b64_url_safe =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value.as_bytes());
        for (suffix, b64) in [("base64", &b64_standard), ("base64url", &b64_url_safe)] {
            if let Ok(regex) = Regex::new(&regex::escape(b64)) {
                self.known_secrets.push(KnownSecretPattern {
                    name: format!("{name}_{suffix}"),
                    regex,
                });
            }
        }
        let hex_str = hex::encode(value.as_bytes());
        if let Ok(regex) = Regex::new(&format!("(?i){}", regex::escape(&hex_str))) {
            self.known_secrets.push(KnownSecretPattern {
                name: format!("{name}_hex"),
                regex,
            });
        }
    }

    fn find_candidate_patterns(&self, text: &str) -> Vec<bool> {
        let mut candidates: Vec<bool> =
            self.patterns.iter().map(|p| p.ac_index.is_none()).collect();
        for ac_match in self.ac.find_overlapping_iter(text) {
            let ac_pattern_id = ac_match.pattern().as_usize();
            for (i, pattern) in self.patterns.iter().enumerate() {
                if pattern.ac_index == Some(ac_pattern_id) {
                    candidates[i] = true;
                }
            }
        }
        candidates
    }

    fn scan_encoded(&self, text: &str) -> Vec<(usize, usize, &'static str)> {
        let mut matches = Vec::new();
        for candidate in self.base64_candidate_re.find_iter(text) {
            let candidate_str = candidate.as_str();
            let decoded_str = base64::engine::general_purpose::STANDARD
                .decode(candidate_str)
                .or_else(|_| {
                    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(candidate_str)
                })
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some(decoded_str) = decoded_str {
                for pattern in &self.patterns {
                    if pattern.regex.is_match(&decoded_str) {
                        matches.push((candidate.start(), candidate.end(), pattern.name));
                    }
                }
            }
        }
        for candidate in self.hex_candidate_re.find_iter(text) {
            if let Ok(decoded) = hex::decode(candidate.as_str())
                && let Ok(decoded_str) = String::from_utf8(decoded)
            {
                for pattern in &self.patterns {
                    if pattern.regex.is_match(&decoded_str) {
                        matches.push((candidate.start(), candidate.end(), pattern.name));
                    }
                }
            }
        }
        matches
    }

    /// Scrub `text`, returning the redacted string and the set of pattern
    /// names that fired. Deterministic and idempotent:
    /// `scrub(scrub(s)).scrubbed == scrub(s).scrubbed`.
    pub fn scrub(&self, text: &str) -> ScrubResult {
        let mut hits = Vec::new();
        let mut result = text.to_string();

        let candidate_indices = self.find_candidate_patterns(&result);
        for (i, pattern) in self.patterns.iter().enumerate() {
            if !candidate_indices[i] {
                continue;
            }
            if pattern.regex.is_match(&result) {
                hits.push(pattern.name.to_string());
            }
            result = pattern.regex.replace_all(&result, REDACTION_MARKER).into_owned();
        }

        for ks in &self.known_secrets {
            if ks.regex.is_match(&result) {
                hits.push(ks.name.clone());
            }
            result = ks.regex.replace_all(&result, REDACTION_MARKER).into_owned();
        }

        let encoded_matches = self.scan_encoded(&result);
        if !encoded_matches.is_empty() {
            let mut ranges: Vec<(usize, usize)> = encoded_matches
                .iter()
                .map(|(start, end, name)| {
                    hits.push(name.to_string());
                    (*start, *end)
                })
                .collect();
            ranges.sort_by_key(|r| r.0);
            let mut merged: Vec<(usize, usize)> = Vec::new();
            for (start, end) in ranges {
                if let Some(last) = merged.last_mut()
                    && start <= last.1
                {
                    last.1 = last.1.max(end);
                    continue;
                }
                merged.push((start, end));
            }
            for (start, end) in merged.into_iter().rev() {
                if start <= result.len()
                    && end <= result.len()
                    && result.is_char_boundary(start)
                    && result.is_char_boundary(end)
                {
                    result.replace_range(start..end, REDACTION_MARKER);
                }
            }
        }

        hits.sort();
        hits.dedup();
        ScrubResult {
            scrubbed: result,
            hits,
        }
    }
}

impl Default for SecretScrubber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
