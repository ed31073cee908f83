/// Maximum length of a sanitized device name.
const MAX_LEN: usize = 64;

/// Derives a filesystem-safe name from a logical device name.
///
/// Lowercases the input, replaces every character outside `[a-z0-9._-]`
/// with `_`, and caps the result at [`MAX_LEN`] characters. The output
/// never contains a path separator, so a sanitized name cannot escape the
/// log directory. Idempotent.
///
/// Every log-file path in the store is built through this function so that
/// append, tail, clear and list always agree on the physical file for a
/// logical name.
pub fn safe_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .take(MAX_LEN)
        .collect()
}
