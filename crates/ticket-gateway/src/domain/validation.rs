//! Structural validation of submitted tasks.
//!
//! Every validated string must be printable ASCII: bytes in `0x09..=0x0d`
//! (tab, newlines, form feed) or `0x20..=0x7e`.

use crate::domain::error::GatewayError;
use shared_types::Task;

/// True if every byte of `s` is printable ASCII or ASCII whitespace control.
pub fn is_printable(s: &str) -> bool {
    s.bytes()
        .all(|b| (0x09..=0x0d).contains(&b) || (0x20..=0x7e).contains(&b))
}

/// Check a task before it is authorized and routed.
///
/// # Errors
///
/// Returns `GatewayError::TaskInvalid` naming the first offending field.
pub fn validate_task(task: &Task) -> Result<(), GatewayError> {
    if task.primary_uri.is_empty() || !is_printable(&task.primary_uri) {
        return Err(invalid("PrimaryURI invalid"));
    }
    if !is_printable(&task.secondary_uri) {
        return Err(invalid("SecondaryURI invalid"));
    }
    if task.filename.is_empty() || !is_printable(&task.filename) {
        return Err(invalid("Filename invalid"));
    }
    if task.tasks.is_empty() {
        return Err(invalid("No tasks requested"));
    }
    if task
        .tasks
        .keys()
        .any(|name| name.is_empty() || !is_printable(name))
    {
        return Err(invalid("Task name invalid"));
    }
    if !task.tags.iter().all(|tag| is_printable(tag)) {
        return Err(invalid("Tag invalid"));
    }
    if task.attempts < 0 {
        return Err(invalid("Negative number of attempts"));
    }
    if !is_printable(&task.comment) {
        return Err(invalid("Comment invalid"));
    }
    Ok(())
}

fn invalid(reason: &str) -> GatewayError {
    GatewayError::TaskInvalid(reason.to_string())
}
