//! Delete and insert strategies.

/// Policy governing what happens to dependent rows when a referenced or
/// owning row is deleted.
///
/// The engine's local delete path and the generated store-side triggers
/// implement the same policy, since a delete can originate either in-process
/// or directly against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteStrategy {
    /// Dependent rows are deleted after the parent row.
    Cascade,
    /// Link columns in dependent rows are set to NULL.
    SetNull,
    /// For single-row references, like `Cascade`; for collections, join rows
    /// are removed (or link columns nulled) without deleting the referenced
    /// rows themselves.
    Unlink,
    /// Dependent rows are left untouched and become dangling by design.
    NoAction,
}

impl DeleteStrategy {
    /// Returns true if this strategy installs a store-side trigger.
    pub fn needs_trigger(self) -> bool {
        !matches!(self, DeleteStrategy::NoAction)
    }
}

/// Policy for applying a foreign-column-bound value at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertStrategy {
    /// Keep a pre-existing target row's value when one is present.
    PreferExisting,
    /// Always apply the new value.
    OverwriteExisting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_action_installs_no_trigger() {
        assert!(!DeleteStrategy::NoAction.needs_trigger());
        assert!(DeleteStrategy::Cascade.needs_trigger());
        assert!(DeleteStrategy::SetNull.needs_trigger());
        assert!(DeleteStrategy::Unlink.needs_trigger());
    }
}
