//! Path algebra: parsing, normalization, resolution and comparison of the
//! path strings the file system works with.
//!
//! A parsed path is a component list whose first element is the whole root
//! text (`"/"`, `"c:/"`) for absolute paths, or `""` for relative paths.
//! `.` and `..` are collapsed during parsing; `..` is clamped at an absolute
//! root and preserved at the front of relative paths.

use core::cmp::Ordering;

use crate::error::{ErrorCode, Result};

bitflags! {
    /// Which path shapes [`validate`] accepts.
    pub struct ValidationFlags: u32 {
        const ABSOLUTE = 1 << 0;
        const RELATIVE = 1 << 1;
        const RELATIVE_OR_ABSOLUTE = Self::ABSOLUTE.bits | Self::RELATIVE.bits;
    }
}

/// Backslashes become forward slashes; nothing else changes.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Length of the root prefix: 1 for `/`, 2-3 for `c:`/`c:/`, 0 if relative.
fn root_length(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.first() == Some(&b'/') {
        return 1;
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        if bytes.len() == 2 {
            return 2;
        }
        if bytes[2] == b'/' {
            return 3;
        }
    }
    0
}

pub fn is_absolute(path: &str) -> bool {
    root_length(path) > 0
}

/// Whether `path` is exactly a root (`/`, `c:/`).
pub fn is_root(path: &str) -> bool {
    let length = root_length(path);
    length > 0 && length == path.len()
}

/// Split `path` into its component list.
pub fn parse(path: &str) -> Vec<String> {
    let path = normalize_separators(path);
    let length = root_length(&path);
    let root = if length == 0 {
        String::new()
    } else if path.as_bytes()[length - 1] == b'/' {
        path[..length].to_string()
    } else {
        // `c:` without a separator still names the root `c:/`
        format!("{}/", &path[..length])
    };
    let absolute = length > 0;
    let mut components = vec![root];
    for part in path[length..].split('/') {
        match part {
            "" | "." => {}
            ".." => match components.last().map(|c| c.as_str()) {
                Some("..") => components.push(String::from("..")),
                _ if components.len() > 1 => {
                    components.pop();
                }
                _ if absolute => {} // clamped at the root
                _ => components.push(String::from("..")),
            },
            name => components.push(String::from(name)),
        }
    }
    components
}

/// Inverse of [`parse`].
pub fn format(components: &[String]) -> String {
    match components.split_first() {
        None => String::new(),
        Some((root, rest)) => {
            if rest.is_empty() {
                root.clone()
            } else {
                format!("{}{}", root, rest.join("/"))
            }
        }
    }
}

pub fn dirname(path: &str) -> String {
    let mut components = parse(path);
    if components.len() > 1 {
        components.pop();
    }
    format(&components)
}

pub fn basename(path: &str) -> String {
    let components = parse(path);
    if components.len() > 1 {
        components.last().unwrap().clone()
    } else {
        String::new()
    }
}

/// Textually join `path` onto `base`. No `.`/`..` reduction happens here.
pub fn combine(base: &str, path: &str) -> String {
    if is_absolute(path) || base.is_empty() {
        return normalize_separators(path);
    }
    let base = normalize_separators(base);
    let path = normalize_separators(path);
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Join `path` onto `base` and collapse `.` and `..`.
pub fn resolve(base: &str, path: &str) -> String {
    format(&parse(&combine(base, path)))
}

pub fn add_trailing_separator(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Check `path` against `flags` and return it with separators normalized.
pub fn validate(path: &str, flags: ValidationFlags) -> Result<String> {
    if path.is_empty() || path.contains('\0') {
        return Err(ErrorCode::EINVAL.into());
    }
    let path = normalize_separators(path);
    let allowed = if is_absolute(&path) {
        ValidationFlags::ABSOLUTE
    } else {
        ValidationFlags::RELATIVE
    };
    if !flags.intersects(allowed) {
        return Err(ErrorCode::EINVAL.into());
    }
    Ok(path)
}

/// Locale-independent ASCII fold used by the case-insensitive comparator.
pub(crate) fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

pub fn compare(a: &str, b: &str, ignore_case: bool) -> Ordering {
    if ignore_case {
        fold(a).cmp(&fold(b))
    } else {
        a.cmp(b)
    }
}

pub fn equals(a: &str, b: &str, ignore_case: bool) -> bool {
    compare(a, b, ignore_case) == Ordering::Equal
}
