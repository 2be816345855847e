//! Identity registry: exporter/investor self-registration
//!
//! Registration gates every other operation: only registered exporters may
//! submit invoices and only registered investors may fund pools. There is
//! no un-registration.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Address, EngineEvent, EventRecord},
};

/// Register the caller as an exporter
pub fn register_exporter(storage: &Storage, caller: &Address) -> Result<Vec<EventRecord>> {
    if storage.is_registered_exporter(caller)? {
        return Err(Error::AlreadyRegistered(format!(
            "exporter {}",
            caller
        )));
    }

    let mut txn = storage.begin()?;
    txn.put_exporter_registration(caller)?;
    txn.emit(EngineEvent::ExporterRegistered {
        address: caller.clone(),
    })?;
    let events = txn.commit()?;

    tracing::info!(address = %caller, "Exporter registered");
    Ok(events)
}

/// Register the caller as an investor
pub fn register_investor(storage: &Storage, caller: &Address) -> Result<Vec<EventRecord>> {
    if storage.is_registered_investor(caller)? {
        return Err(Error::AlreadyRegistered(format!(
            "investor {}",
            caller
        )));
    }

    let mut txn = storage.begin()?;
    txn.put_investor_registration(caller)?;
    txn.emit(EngineEvent::InvestorRegistered {
        address: caller.clone(),
    })?;
    let events = txn.commit()?;

    tracing::info!(address = %caller, "Investor registered");
    Ok(events)
}

/// Fail unless the caller is the configured admin
pub fn require_admin(admin: &Address, caller: &Address) -> Result<()> {
    if caller != admin {
        return Err(Error::Unauthorized(format!(
            "{} is not the admin",
            caller
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_register_exporter() {
        let (storage, _tmp) = test_storage();
        let addr = Address::new("exp-1");

        let events = register_exporter(&storage, &addr).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].event,
            EngineEvent::ExporterRegistered { .. }
        ));
        assert!(storage.is_registered_exporter(&addr).unwrap());
    }

    #[test]
    fn test_double_registration_rejected() {
        let (storage, _tmp) = test_storage();
        let addr = Address::new("inv-1");

        register_investor(&storage, &addr).unwrap();
        let err = register_investor(&storage, &addr).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn test_same_address_may_hold_both_roles() {
        let (storage, _tmp) = test_storage();
        let addr = Address::new("both-1");

        register_exporter(&storage, &addr).unwrap();
        register_investor(&storage, &addr).unwrap();

        assert!(storage.is_registered_exporter(&addr).unwrap());
        assert!(storage.is_registered_investor(&addr).unwrap());
    }

    #[test]
    fn test_require_admin() {
        let admin = Address::new("admin");
        assert!(require_admin(&admin, &admin).is_ok());
        assert!(matches!(
            require_admin(&admin, &Address::new("mallory")),
            Err(Error::Unauthorized(_))
        ));
    }
}
