//! Ordering of line identifiers for the line menu.
//!
//! Identifiers are a mix of letters and digits ("123", "N61", "Z-10"). They
//! sort by their non-digit part first, then by the value of their digits, so
//! plain numeric lines come first in numeric order followed by the lettered
//! groups ("20", "34", "200", "N61").

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::Vehicle;

/// Menu entry that clears the line filter
pub const SHOW_ALL: &str = "SHOW ALL BUSES";

/// Identifier with every ASCII digit removed
fn letter_part(line: &str) -> String {
    line.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// Identifier with everything but ASCII digits removed
fn number_part(line: &str) -> String {
    line.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Compare two digit strings by numeric value without parsing
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Sort key implementing the line order.
///
/// Within one letter group, the letters-only identifier (no digits at all)
/// sorts first; identifiers with digits follow in numeric order.
#[derive(Debug, Clone)]
pub struct LineKey {
    letters: String,
    number: Option<String>,
}

impl LineKey {
    pub fn new(line: &str) -> Self {
        let number = number_part(line);
        Self {
            letters: letter_part(line),
            number: if number.is_empty() { None } else { Some(number) },
        }
    }
}

impl Ord for LineKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.letters.cmp(&other.letters).then_with(|| {
            match (&self.number, &other.number) {
                (Some(a), Some(b)) => compare_numeric(a, b),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }
}

impl PartialEq for LineKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LineKey {}

impl PartialOrd for LineKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two line identifiers
pub fn compare_lines(a: &str, b: &str) -> Ordering {
    LineKey::new(a).cmp(&LineKey::new(b))
}

/// Sort line identifiers in place. Stable: equal keys keep their order.
pub fn sort_lines<S: AsRef<str>>(lines: &mut [S]) {
    lines.sort_by_cached_key(|l| LineKey::new(l.as_ref()));
}

/// Distinct lines of a result set, sorted, in first-seen order for ties
pub fn distinct_lines(vehicles: &[Vehicle]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut lines: Vec<String> = vehicles
        .iter()
        .filter(|v| seen.insert(v.line.as_str()))
        .map(|v| v.line.clone())
        .collect();
    sort_lines(&mut lines);
    lines
}

/// Entries of the line menu: [`SHOW_ALL`] followed by the sorted lines
pub fn line_menu(vehicles: &[Vehicle]) -> Vec<String> {
    std::iter::once(SHOW_ALL.to_string())
        .chain(distinct_lines(vehicles))
        .collect()
}
