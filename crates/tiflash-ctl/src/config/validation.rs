//! Configuration validation.

use super::Config;
use crate::error::{CtlError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.tidb.host.is_empty() {
        return Err(CtlError::Config("tidb.host is required".into()));
    }
    if config.tidb.port == 0 {
        return Err(CtlError::Config("tidb.port must be non-zero".into()));
    }
    if config.tidb.user.is_empty() {
        return Err(CtlError::Config("tidb.user is required".into()));
    }

    if let Some(address) = &config.pd.address {
        if address.trim().is_empty() {
            return Err(CtlError::Config("pd.address must not be empty when set".into()));
        }
    }
    if config.pd.timeout_secs == 0 {
        return Err(CtlError::Config("pd.timeout_secs must be at least 1".into()));
    }

    if config.check.num_replica == 0 {
        return Err(CtlError::Config("check.num_replica must be at least 1".into()));
    }
    if config.check.row_id_column.is_empty() {
        return Err(CtlError::Config("check.row_id_column is required".into()));
    }
    if config.check.region_batch == 0 {
        return Err(CtlError::Config("check.region_batch must be at least 1".into()));
    }

    Ok(())
}
