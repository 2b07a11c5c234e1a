//! Sanitizing of user-supplied filenames.

use crate::error::{Result, StorageError};

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '+' | ',' | '.')
}

/// Normalize a user-supplied filename before it is mapped to a storage key.
///
/// Every character outside `[A-Za-z0-9-_=+,.]` becomes `_` and a leading dot
/// is replaced so the name can never be hidden or relative. Names that are
/// empty after this fail with [`StorageError::InvalidName`].
pub fn sanitize_filename(name: &str) -> Result<String> {
    let mut sanitized: String = name
        .chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .collect();

    if sanitized.starts_with('.') {
        sanitized.replace_range(..1, "_");
    }

    if sanitized.is_empty() {
        return Err(StorageError::InvalidName(format!(
            "'{}' is empty after sanitizing",
            name
        )));
    }
    Ok(sanitized)
}
