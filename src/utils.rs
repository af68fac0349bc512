use crate::error::{PipeError, Result};

/// Format pipe name to the Windows named pipe namespace
pub fn format_pipe_name(name: &str) -> String {
    if name.starts_with("\\\\.\\pipe\\") {
        name.to_string()
    } else {
        format!("\\\\.\\pipe\\{}", name)
    }
}

/// Reject names that are empty once the namespace prefix is stripped.
pub(crate) fn validate_pipe_name(name: &str) -> Result<()> {
    let bare = name.strip_prefix("\\\\.\\pipe\\").unwrap_or(name);
    if bare.is_empty() {
        return Err(PipeError::generic("pipe name must not be empty"));
    }
    Ok(())
}
