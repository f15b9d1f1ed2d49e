//! Tree entry name ordering: a directory entry's name sorts as if it had an
//! implicit trailing `/`, which matters exactly when one name is a prefix of
//! another (`"sub"` the directory vs. `"sub.txt"` the file).

use std::cmp::Ordering;

/// Compares two sibling tree-entry names the way Git orders tree leaves.
pub fn compare_names(a_name: &str, a_is_dir: bool, b_name: &str, b_is_dir: bool) -> Ordering {
    let a = a_name.as_bytes();
    let b = b_name.as_bytes();
    let min_len = a.len().min(b.len());
    match a[..min_len].cmp(&b[..min_len]) {
        Ordering::Equal => {}
        other => return other,
    }
    let a_next = a.get(min_len).copied().or(a_is_dir.then_some(b'/'));
    let b_next = b.get(min_len).copied().or(b_is_dir.then_some(b'/'));
    a_next.cmp(&b_next)
}

/// Depth of a directory path: number of path components (root `""` is 0).
pub fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.matches('/').count() + 1
    }
}
