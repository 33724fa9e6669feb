//! Wraps a migration group's execution in the correct transactional
//! boundary, including the single-connection autocommit toggle quirk some
//! drivers need.

use crate::adapter::DatabaseAdapter;

/// Runs `body` against either a transactional or an autocommit
/// [`ExecutionContext`](crate::migration::ExecutionContext), committing or
/// rolling back as appropriate.
///
/// Some drivers hand out one physical connection that is always "in a
/// transaction" from the server's point of view; for those, running a
/// non-transactional group means toggling the connection's autocommit mode
/// rather than simply skipping `BEGIN`/`COMMIT`. [`DatabaseAdapter`]
/// implementations that multiplex multiple logical connections over one
/// physical connection are expected to perform that toggle inside
/// `autocommit_context`/`begin` themselves; this function only sequences
/// the calls in the right order.
pub fn run_in_boundary<A, T>(
    adapter: &mut A,
    transactional: bool,
    body: impl FnOnce(&mut A::Context) -> Result<T, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>>
where
    A: DatabaseAdapter,
    A::Error: 'static,
{
    if transactional {
        let mut context = adapter.begin()?;
        let result = body(&mut context);
        match result {
            Ok(value) => {
                adapter.commit(context)?;
                Ok(value)
            }
            Err(err) => {
                // Best-effort rollback: if it also fails, the original
                // execution error is still the one the caller needs to see.
                let _ = adapter.rollback(context);
                Err(err)
            }
        }
    } else {
        let mut context = adapter.autocommit_context()?;
        body(&mut context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ExecutionContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log(Rc<RefCell<Vec<&'static str>>>);

    struct FakeContext(Rc<RefCell<Vec<&'static str>>>);
    impl ExecutionContext for FakeContext {
        fn execute_statement(&mut self, _sql: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.borrow_mut().push("execute");
            Ok(())
        }
    }

    struct FakeAdapter(Rc<RefCell<Vec<&'static str>>>);
    impl DatabaseAdapter for FakeAdapter {
        type Error = std::io::Error;
        type Context = FakeContext;

        fn supports_ddl_transactions(&self) -> bool {
            true
        }
        fn begin(&mut self) -> Result<Self::Context, Self::Error> {
            self.0.borrow_mut().push("begin");
            Ok(FakeContext(self.0.clone()))
        }
        fn commit(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
            self.0.borrow_mut().push("commit");
            Ok(())
        }
        fn rollback(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
            self.0.borrow_mut().push("rollback");
            Ok(())
        }
        fn autocommit_context(&mut self) -> Result<Self::Context, Self::Error> {
            self.0.borrow_mut().push("autocommit");
            Ok(FakeContext(self.0.clone()))
        }
    }

    #[test]
    fn transactional_success_commits() {
        let log = Log::default();
        let mut adapter = FakeAdapter(log.0.clone());
        run_in_boundary(&mut adapter, true, |ctx| ctx.execute_statement("select 1")).unwrap();
        assert_eq!(*log.0.borrow(), vec!["begin", "execute", "commit"]);
    }

    #[test]
    fn transactional_failure_rolls_back() {
        let log = Log::default();
        let mut adapter = FakeAdapter(log.0.clone());
        let result: Result<(), Box<dyn std::error::Error + Send + Sync>> =
            run_in_boundary(&mut adapter, true, |_ctx| Err("boom".into()));
        assert!(result.is_err());
        assert_eq!(*log.0.borrow(), vec!["begin", "rollback"]);
    }

    #[test]
    fn non_transactional_uses_autocommit_context() {
        let log = Log::default();
        let mut adapter = FakeAdapter(log.0.clone());
        run_in_boundary(&mut adapter, false, |ctx| ctx.execute_statement("vacuum")).unwrap();
        assert_eq!(*log.0.borrow(), vec!["autocommit", "execute"]);
    }
}
