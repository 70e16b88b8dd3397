//! Target resolution: expand a specification into owned `TargetHost`s.
//!
//! Pure address expansion plus credential attachment; no connection is
//! attempted here.

use tracing::info;

use crate::application::ports::ConnectionFactory;
use crate::application::services::host::TargetHost;
use crate::domain::target::resolve_targets;
use crate::domain::{ResolutionError, RunConfig};

pub struct TargetResolver<'a> {
    config: &'a RunConfig,
    factory: &'a dyn ConnectionFactory,
}

impl<'a> TargetResolver<'a> {
    #[must_use]
    pub fn new(config: &'a RunConfig, factory: &'a dyn ConnectionFactory) -> Self {
        Self { config, factory }
    }

    /// Resolve a specification into a non-empty, ordered list of hosts.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] when the specification is empty,
    /// malformed, or expands to too many targets.
    pub fn resolve(&self, spec: &str) -> Result<Vec<TargetHost>, ResolutionError> {
        let targets = resolve_targets(spec, &self.config.connection, self.config.targets.max)?;
        info!(count = targets.len(), spec, "resolved targets");
        Ok(targets
            .into_iter()
            .map(|target| {
                let conn = self.factory.open(&target);
                TargetHost::new(target, conn)
            })
            .collect())
    }
}
