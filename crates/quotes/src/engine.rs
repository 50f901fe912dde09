use anyhow::Result;

use crate::config::EngineConfig;
use crate::services::Services;

/// Entry point for every engine operation.
///
/// Holds no mutable state: each call reads and writes through the injected
/// services, so one `Engine` can serve concurrent calls for different
/// conversations, runs, views or aspects. Ordering between stages (all
/// centroids before cluster assignment) is the caller's workflow concern.
#[derive(Clone)]
pub struct Engine {
  pub(crate) services: Services,
  pub(crate) config: EngineConfig,
}

impl Engine {
  pub fn new(services: Services, config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { services, config })
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn services(&self) -> &Services {
    &self.services
  }
}
