//! Orchestrator name sanitization.

/// Maximum length of a generated name, leaving room for a pod ordinal suffix.
pub const MAX_NAME_LEN: usize = 60;

/// Turn an arbitrary string into a valid object name.
///
/// Lower-cases the input, replaces every character outside `[a-z0-9-]` with
/// `-`, truncates to [`MAX_NAME_LEN`], and replaces a leading or trailing `-`
/// with `1` so the result never starts or ends with a dash.
pub fn sanitize_name(name: &str) -> String {
    let mut clean: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect();

    if clean.starts_with('-') {
        clean.replace_range(0..1, "1");
    }

    if clean.len() > MAX_NAME_LEN {
        clean.truncate(MAX_NAME_LEN);
    }

    if clean.ends_with('-') {
        clean.pop();
        clean.push('1');
    }

    clean
}
