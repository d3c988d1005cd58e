#[cfg(test)]
mod tests {
    use sluice_core::{
        Failure, FailureKind, failure_kind,
        native::{Attribute, Handle, HandleKind, NativeApi, to_wide},
    };
    use sluice_odbc::{Environment, HandleRegistry, HandleState, NativeHandle};
    use sluice_tests::{MockDriver, init_logs, mock_driver, silent_logs};
    use std::sync::Arc;

    fn api(driver: &Arc<MockDriver>) -> Arc<dyn NativeApi> {
        driver.clone()
    }

    /// A connected connection handle and the environment owning it.
    fn connected(driver: &Arc<MockDriver>) -> (Arc<Environment>, Arc<NativeHandle>) {
        let environment = Environment::new(api(driver)).unwrap();
        let connection = HandleRegistry::allocate(
            &api(driver),
            HandleKind::Connection,
            environment.handle().raw(),
        )
        .unwrap();
        let ret = driver.driver_connect(connection.raw(), &to_wide("DSN=mock"));
        assert!(ret.is_success());
        (environment, connection)
    }

    fn disconnect(driver: &MockDriver, connection: &NativeHandle) {
        assert!(driver.disconnect(connection.raw()).is_success());
    }

    #[test]
    fn environment_declares_odbc_3_80() {
        init_logs();
        let driver = mock_driver();
        let environment = Environment::new(api(&driver)).unwrap();
        assert_eq!(
            driver.env_attributes(),
            vec![(Attribute::ODBC_VERSION, Attribute::OV_ODBC3_80)]
        );
        assert!(environment.handle().is_valid());
        assert_eq!(driver.live_handles(HandleKind::Environment), 1);
        drop(environment);
        assert_eq!(driver.live_handles(HandleKind::Environment), 0);
    }

    #[test]
    fn double_free() {
        init_logs();
        let driver = mock_driver();
        let handle = NativeHandle::new(api(&driver), HandleKind::Environment);
        assert_eq!(handle.state(), HandleState::Unallocated);
        assert!(handle.raw().is_null());
        assert!(handle.allocate(Handle::NULL));
        let raw = handle.raw();
        assert!(!raw.is_null());
        assert!(handle.free().unwrap());
        assert_eq!(handle.state(), HandleState::Freed);
        assert!(handle.raw().is_null());
        silent_logs! {
            assert!(!handle.free().unwrap());
        }
        assert_eq!(driver.free_calls(raw), 1);
        drop(handle);
        assert_eq!(driver.free_calls(raw), 1);
    }

    #[test]
    fn allocate_twice() {
        let driver = mock_driver();
        let handle = NativeHandle::new(api(&driver), HandleKind::Environment);
        assert!(handle.allocate(Handle::NULL));
        silent_logs! {
            assert!(!handle.allocate(Handle::NULL));
        }
        assert_eq!(driver.live_handles(HandleKind::Environment), 1);
    }

    #[test]
    fn drop_frees() {
        let driver = mock_driver();
        let handle = NativeHandle::new(api(&driver), HandleKind::Environment);
        assert!(handle.allocate(Handle::NULL));
        let raw = handle.raw();
        drop(handle);
        assert_eq!(driver.free_calls(raw), 1);
        assert_eq!(driver.live_handles(HandleKind::Environment), 0);
    }

    #[test]
    fn free_unallocated() {
        let driver = mock_driver();
        let handle = NativeHandle::new(api(&driver), HandleKind::Statement);
        silent_logs! {
            let error = handle.free().unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::State);
        }
        assert_eq!(driver.calls("SQLFreeHandle"), 0);
    }

    #[test]
    fn allocation_failure() {
        let driver = mock_driver();
        let environment = Environment::new(api(&driver)).unwrap();
        driver.fail_allocation(HandleKind::Connection);
        silent_logs! {
            let error = HandleRegistry::allocate(
                &api(&driver),
                HandleKind::Connection,
                environment.handle().raw(),
            )
            .unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Resource);
            assert!(matches!(
                error.downcast_ref::<Failure>(),
                Some(Failure::Allocation { kind: HandleKind::Connection, diagnostics })
                    if diagnostics[0].sqlstate == "HY013"
            ));
        }
    }

    #[test]
    fn checkout_twice() {
        init_logs();
        let driver = mock_driver();
        let (_environment, connection) = connected(&driver);
        let registry = HandleRegistry::new(connection.clone());
        let first = registry.checkout(1).unwrap();
        let second = registry.checkout(1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(driver.live_handles(HandleKind::Statement), 1);

        let other = registry.checkout(2).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);

        assert!(registry.checkin(1));
        assert!(!registry.checkin(1));
        assert_eq!(first.state(), HandleState::Freed);
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());

        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
        assert_eq!(driver.live_handles(HandleKind::Statement), 0);
        disconnect(&driver, &connection);
    }

    #[test]
    fn checkout_needs_a_connection() {
        let driver = mock_driver();
        let environment = Environment::new(api(&driver)).unwrap();
        let connection = HandleRegistry::allocate(
            &api(&driver),
            HandleKind::Connection,
            environment.handle().raw(),
        )
        .unwrap();
        let registry = HandleRegistry::new(connection);
        silent_logs! {
            let error = registry.checkout(1).unwrap_err();
            assert_eq!(failure_kind(&error), FailureKind::Resource);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn borrows() {
        let driver = mock_driver();
        let (_environment, connection) = connected(&driver);
        let registry = HandleRegistry::new(connection.clone());
        let handle = registry.checkout(1).unwrap();
        {
            let guard = handle.borrow();
            let _other = handle.borrow();
            assert_eq!(guard.kind(), HandleKind::Statement);
            assert_eq!(handle.borrows(), 2);
        }
        assert_eq!(handle.borrows(), 0);
        registry.clear();
        disconnect(&driver, &connection);
    }
}
