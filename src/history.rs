use crate::migration::AppliedMigration;

/// The append-only schema history table and the mutual-exclusion lock that
/// serializes concurrent engine instances against it.
///
/// A concrete implementation binds this to a real connection/table; the
/// engine only depends on this contract rather than a specific driver.
pub trait SchemaHistoryStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the schema history table exists yet.
    fn exists(&mut self) -> Result<bool, Self::Error>;

    /// Create the schema history table.
    fn create(&mut self) -> Result<(), Self::Error>;

    /// Append a row recording the outcome of one executed migration.
    /// `installed_rank` must be one greater than the highest rank already
    /// present: strictly increasing, no gaps within one run.
    fn add_applied_migration(&mut self, row: AppliedMigration) -> Result<(), Self::Error>;

    /// All rows, in `installed_rank` order.
    fn all_applied_migrations(&mut self) -> Result<Vec<AppliedMigration>, Self::Error>;

    /// The next `installed_rank` to use, derived from the highest rank
    /// currently present (or `1` if the table is empty).
    fn next_installed_rank(&mut self) -> Result<i32, Self::Error> {
        Ok(self
            .all_applied_migrations()?
            .iter()
            .map(|m| m.installed_rank)
            .max()
            .unwrap_or(0)
            + 1)
    }

    /// Acquire the lock, run `body` with it held, and release on every exit
    /// path including `body` returning an error. Re-entrant calls within one
    /// invocation of `lock` must not deadlock.
    ///
    /// `body`'s error type is the boxed trait object rather than
    /// `Self::Error`: the executor's `body` spans planning and execution,
    /// which can fail for reasons that have nothing to do with the history
    /// store (a mixed-transactionality group, a migration's own SQL
    /// failing), so it needs a currency type wider than this store's own
    /// error.
    fn lock<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, Box<dyn std::error::Error + Send + Sync>>,
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync>>
    where
        Self: Sized;
}
