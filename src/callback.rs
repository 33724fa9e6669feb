//! Lifecycle events the executor fires around a run. Registering handlers
//! for these is left to the caller; the engine only needs something to
//! notify.

use crate::migration::ResolvedMigration;

/// A point in the migration lifecycle a [`CallbackHandler`] can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    BeforeMigrate,
    BeforeEachMigrate,
    AfterEachMigrate,
    AfterEachMigrateError,
    AfterVersioned,
    BeforeRepeatables,
    AfterMigrateApplied,
    AfterMigrateError,
    AfterMigrate,
}

/// The handler interface the executor notifies. A no-op blanket default so
/// a caller only overrides the events it cares about; shaped the same way
/// as [`crate::executor::ProgressReporter`].
pub trait CallbackHandler {
    /// `migration` is `None` for run-scoped events (`BeforeMigrate`,
    /// `AfterVersioned`, `BeforeRepeatables`, `AfterMigrate`, and the two
    /// `AfterMigrate*` terminal events) and `Some` for per-migration events.
    fn on_event(&mut self, event: Event, migration: Option<&ResolvedMigration>);
}

/// A [`CallbackHandler`] that does nothing, used when the caller registers
/// no callbacks.
#[derive(Default)]
pub struct NoopCallbackHandler;

impl CallbackHandler for NoopCallbackHandler {
    fn on_event(&mut self, _event: Event, _migration: Option<&ResolvedMigration>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_handler_accepts_every_event() {
        let mut h = NoopCallbackHandler;
        h.on_event(Event::BeforeMigrate, None);
        h.on_event(Event::AfterMigrate, None);
    }
}
