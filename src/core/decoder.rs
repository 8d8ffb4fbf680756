//! Surface-text reconstruction from subword units.

/// Separator appended to every unit that is not the last of its word.
pub const DEFAULT_SEPARATOR: &str = "@@";

/// Join `tokens` with spaces and remove subword boundaries.
pub fn decode<S: AsRef<str>>(tokens: &[S], separator: &str) -> String {
    let line = tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ");
    decode_line(&line, separator)
}

/// Remove every `separator + " "` from an encoded line, and a dangling
/// separator at the very end.
///
/// Never fails: malformed input yields a best-effort string. An empty
/// separator leaves the line untouched.
pub fn decode_line(line: &str, separator: &str) -> String {
    if separator.is_empty() {
        return line.to_string();
    }

    let mut boundary = String::with_capacity(separator.len() + 1);
    boundary.push_str(separator);
    boundary.push(' ');

    let mut text = line.replace(&boundary, "");
    if text.ends_with(separator) {
        text.truncate(text.len() - separator.len());
    }
    text
}
