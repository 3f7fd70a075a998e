//! Named driver registry.
//!
//! Callers pick a driver by name plus a data source name, the same way they
//! would select any other database driver. The registry is built once at
//! startup and passed to [`Database::open`](crate::Database::open).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use dblog_core::SqlLogger;

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::logging_driver::LoggingDriver;
use crate::postgres::PgDriver;

/// Name of the PostgreSQL driver wrapped with SQL logging.
pub const DRIVER_NAME: &str = "pq-with-logging";

/// Name of the plain PostgreSQL driver.
pub const POSTGRES_DRIVER_NAME: &str = "postgres";

/// Map of driver name to driver.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plain and the logging PostgreSQL drivers.
    ///
    /// `logger` is the sink every connection opened through
    /// [`DRIVER_NAME`] logs to.
    pub fn with_defaults(logger: SqlLogger) -> Self {
        let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        drivers.insert(POSTGRES_DRIVER_NAME.to_string(), Arc::new(PgDriver::new()));
        drivers.insert(
            DRIVER_NAME.to_string(),
            Arc::new(LoggingDriver::new(PgDriver::new(), logger)),
        );
        Self { drivers }
    }

    /// Register `driver` under `name`. Names must be unique and non-empty.
    pub fn register<D>(&mut self, name: impl Into<String>, driver: D) -> Result<()>
    where
        D: Driver + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(DriverError::Other("driver name must not be empty".to_string()));
        }
        if self.drivers.contains_key(&name) {
            return Err(DriverError::DuplicateDriver(name));
        }

        debug!(
            subsystem = "db",
            component = "registry",
            op = "register",
            driver = %name,
            "Registered driver"
        );
        self.drivers.insert(name, Arc::new(driver));
        Ok(())
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }
}
