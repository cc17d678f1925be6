// Sheet names for mirror sheets: first two words of the driver name,
// unique within the workbook (case-insensitive), at most 31 characters.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use espelhos_engine::workbook::{normalize_sheet_name, MAX_SHEET_NAME_LEN};

const FALLBACK_NAME: &str = "SEM_NOME";

fn forbidden_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\\/*?:\[\]]").expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Drop characters sheet names may not hold and collapse whitespace.
/// Apostrophes cannot open or close a sheet name either.
pub fn sanitize(name: &str) -> String {
    let cleaned = forbidden_chars().replace_all(name, "");
    let collapsed = whitespace_runs().replace_all(&cleaned, " ");
    collapsed.trim().trim_matches('\'').trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Preferred sheet name for a driver before collision handling.
pub fn base_name(driver: &str) -> String {
    let sanitized = sanitize(driver);
    let parts: Vec<&str> = sanitized.split(' ').filter(|p| !p.is_empty()).collect();
    let base = match parts.as_slice() {
        [] => FALLBACK_NAME.to_string(),
        [only] => only.to_string(),
        [first, second, ..] => format!("{first} {second}"),
    };
    truncate_chars(&base, MAX_SHEET_NAME_LEN).trim().to_string()
}

/// Hands out unique sheet names in request order.
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    /// A namer that never hands out any of `reserved`.
    pub fn with_reserved<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            used: reserved.into_iter().map(normalize_sheet_name).collect(),
        }
    }

    /// Unique name for `driver`. Collisions get " 2", " 3", ... with the
    /// base cut so the whole name stays within 31 characters.
    pub fn next_name(&mut self, driver: &str) -> String {
        let base = base_name(driver);
        let mut candidate = base.clone();
        let mut i = 2;
        while candidate.is_empty() || self.used.contains(&normalize_sheet_name(&candidate)) {
            let suffix = format!(" {i}");
            let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
            candidate = format!("{}{}", truncate_chars(&base, room), suffix).trim().to_string();
            i += 1;
        }
        self.used.insert(normalize_sheet_name(&candidate));
        candidate
    }
}
