use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Reduce a set of glob patterns to the smallest set of directories that
/// covers all of them.
///
/// Each pattern is cut down to its literal directory prefix, then any two
/// directories sharing a common ancestor collapse into that ancestor. The
/// filesystem root alone does not count as a shared ancestor, so `/var/log`
/// and `/data` stay apart while `/var/log` and `/var/lib` become `/var`.
///
/// eg: `/var/log/*.log`, `/var/log/*.txt`, `/data/**`, `/usr/local/tomcat/access.log`
/// results in `/data`, `/usr/local/tomcat`, `/var/log` (sorted, callers should
/// treat it as a set).
pub fn common_path<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    let dirs = paths.iter().map(|p| split_pattern(p.as_ref()).0);
    reduce_dirs(dirs)
}

/// Split a glob into the directory before the first unescaped meta character
/// and the remaining pattern.
pub fn split_pattern(pattern: &str) -> (&str, &str) {
    let literal_end = first_meta(pattern).unwrap_or(pattern.len());
    match pattern[..literal_end].rfind('/') {
        None => (".", pattern),
        Some(0) => ("/", &pattern[1..]),
        Some(idx) => (&pattern[..idx], &pattern[idx + 1..]),
    }
}

fn first_meta(pattern: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in pattern.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' | '[' | '{' => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Collapse directories that share an ancestor into that ancestor, keeping
/// the rest verbatim. Output is sorted and free of duplicates.
pub fn reduce_dirs<'a>(dirs: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut kept: Vec<Vec<Component<'a>>> = Vec::new();

    for dir in dirs {
        let mut merged: Vec<Component<'a>> = Path::new(dir).components().collect();
        // Anything the new entry overlaps with is folded into it. Entries that
        // survive a pass can never overlap the shorter merged result either.
        kept.retain(|existing| match common_parent(&merged, existing) {
            Some(parent) => {
                merged = parent;
                false
            }
            None => true,
        });
        kept.push(merged);
    }

    kept.into_iter()
        .map(|components| {
            components
                .iter()
                .collect::<PathBuf>()
                .to_string_lossy()
                .into_owned()
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn common_parent<'a>(a: &[Component<'a>], b: &[Component<'a>]) -> Option<Vec<Component<'a>>> {
    let prefix: Vec<Component<'a>> = a
        .iter()
        .zip(b)
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| *x)
        .collect();

    // one directory contains the other (root included)
    if prefix.len() == a.len() || prefix.len() == b.len() {
        return Some(prefix);
    }

    prefix
        .iter()
        .any(|c| matches!(c, Component::Normal(_)))
        .then_some(prefix)
}
