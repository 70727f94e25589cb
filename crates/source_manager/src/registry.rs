//! Factory registry
//!
//! Enumerated once at startup and passed explicitly into the manager.

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{ContractError, DataSourceFactory, Result};
use tracing::debug;

/// Ordered set of device factories, unique by display name and device type
#[derive(Clone)]
pub struct FactoryRegistry {
    factories: Vec<Arc<dyn DataSourceFactory>>,
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FactoryRegistry {
    /// Build a registry
    ///
    /// # Errors
    /// `InvalidArgument` if no factory is given or two factories share a
    /// display name or a device type.
    pub fn new(factories: Vec<Arc<dyn DataSourceFactory>>) -> Result<Self> {
        if factories.is_empty() {
            return Err(ContractError::invalid_argument("no data source factories found"));
        }

        let mut names = HashSet::new();
        let mut device_types = HashSet::new();
        for factory in &factories {
            if !names.insert(factory.display_name()) {
                return Err(ContractError::invalid_argument(format!(
                    "duplicate data source factory name: {}",
                    factory.display_name()
                )));
            }
            // Playback resolves descriptors by device type.
            if !device_types.insert(factory.device_type()) {
                return Err(ContractError::invalid_argument(format!(
                    "duplicate data source device type: {} (factory {})",
                    factory.device_type(),
                    factory.display_name()
                )));
            }
        }

        debug!(count = factories.len(), "factory registry built");
        Ok(Self { factories })
    }

    /// Display names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.display_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Look up by display name
    pub fn get(&self, display_name: &str) -> Result<&Arc<dyn DataSourceFactory>> {
        self.factories
            .iter()
            .find(|f| f.display_name() == display_name)
            .ok_or_else(|| ContractError::not_found("factory", display_name))
    }

    /// Look up by the device type written to recording descriptors
    pub fn for_device_type(&self, device_type: &str) -> Result<&Arc<dyn DataSourceFactory>> {
        self.factories
            .iter()
            .find(|f| f.device_type() == device_type)
            .ok_or_else(|| ContractError::not_found("device type", device_type))
    }

    pub fn needs_startup_config(&self, display_name: &str) -> Result<bool> {
        Ok(self.get(display_name)?.needs_startup_config())
    }
}
