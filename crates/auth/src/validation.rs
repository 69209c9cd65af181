use keystone_core::{DomainError, DomainResult};

/// Required text column: trimmed, non-empty, at most `max` characters.
pub(crate) fn required(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::malformed(format!("{field} cannot be empty")));
    }
    bounded(field, value, max)
}

/// Optional text column: at most `max` characters.
pub(crate) fn bounded(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.chars().count() > max {
        return Err(DomainError::malformed(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

/// Every id in an association set must refer to a persisted row.
pub(crate) fn assigned_ids<T>(field: &str, ids: Option<&Vec<T>>, is_assigned: fn(T) -> bool) -> DomainResult<()>
where
    T: Copy,
{
    if let Some(ids) = ids {
        if ids.iter().any(|id| !is_assigned(*id)) {
            return Err(DomainError::malformed(format!(
                "{field} contains an unassigned id"
            )));
        }
    }
    Ok(())
}
