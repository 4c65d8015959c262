/// Options governing a transaction scope.
///
/// `exclusive` only applies to the embedded engine, where driver transaction
/// state is shared per connection; `lazy` and `itersize` only apply to the
/// networked engine's server-side cursors.
#[derive(Debug, Clone)]
pub struct TxOptions {
    /// Commit on clean scope exit (rollback otherwise).
    pub commit: bool,

    /// Serialize against other scopes on the same embedded Database.
    pub exclusive: bool,

    /// Use a server-side streaming cursor; exactly one `select` is allowed.
    pub lazy: bool,

    /// Fetch batch size in lazy mode.
    pub itersize: usize,

    /// Schema name prefixed to unqualified tables for the scope.
    pub schema: Option<String>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            commit: true,
            exclusive: true,
            lazy: false,
            itersize: 2000,
            schema: None,
        }
    }
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn itersize(mut self, itersize: usize) -> Self {
        self.itersize = itersize.max(1);
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}
