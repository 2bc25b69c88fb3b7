#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use crate::error::StoreError;
    use crate::infrastructure::ObjectStore;
    use crate::infrastructure_in_memory::InMemoryObjectStore;
    use crate::types::LeaseState;

    /// Drives the full adapter contract against one backend. Every
    /// store implementation must pass this unchanged.
    fn exercise_contract(store: &dyn ObjectStore) {
        let path = "c/nodes/job";

        // Creation races
        assert!(!store.exists(path).unwrap());
        store.create_if_absent(path, "v1").unwrap();
        assert!(store.exists(path).unwrap());
        assert!(matches!(
            store.create_if_absent(path, "v2"),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.read(path).unwrap(), "v1");
        assert!(matches!(
            store.read("c/nodes/missing"),
            Err(StoreError::NotFound(_))
        ));

        // Fresh acquisition and double-acquire
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Available);
        let token = store
            .acquire_lease(path, Duration::from_secs(30), "tok-a")
            .unwrap();
        assert_eq!(token, "tok-a");
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Leased);
        assert!(matches!(
            store.acquire_lease(path, Duration::from_secs(30), "tok-b"),
            Err(StoreError::LeaseAlreadyPresent(_))
        ));

        // Conditional writes against the held lease
        assert!(matches!(
            store.write(path, "v2", None),
            Err(StoreError::OwnershipConflict(_))
        ));
        assert!(matches!(
            store.write(path, "v2", Some("tok-b")),
            Err(StoreError::OwnershipConflict(_))
        ));
        store.write(path, "v2", Some("tok-a")).unwrap();
        assert_eq!(store.read(path).unwrap(), "v2");

        // Token change requires proof of the current token
        assert!(matches!(
            store.change_lease(path, "tok-b", "tok-c"),
            Err(StoreError::OwnershipConflict(_))
        ));
        let token = store.change_lease(path, "tok-a", "tok-c").unwrap();
        assert_eq!(token, "tok-c");
        assert!(matches!(
            store.write(path, "v3", Some("tok-a")),
            Err(StoreError::OwnershipConflict(_))
        ));
        store.write(path, "v3", Some("tok-c")).unwrap();

        // Release requires proof as well
        assert!(matches!(
            store.release_lease(path, "tok-a"),
            Err(StoreError::OwnershipConflict(_))
        ));
        store.release_lease(path, "tok-c").unwrap();
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Available);
        store.write(path, "v4", None).unwrap();

        // Teardown
        assert!(store.delete_if_exists(path).unwrap());
        assert!(!store.delete_if_exists(path).unwrap());
        assert!(!store.exists(path).unwrap());
    }

    /// Expiry behavior, driven by real short leases.
    fn exercise_expiry(store: &dyn ObjectStore) {
        let path = "c/nodes/expiring";
        store.create_if_absent(path, "v1").unwrap();

        store
            .acquire_lease(path, Duration::from_millis(30), "tok-a")
            .unwrap();
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Leased);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Expired);

        // An expired lease no longer gates writes and can be taken over.
        store.write(path, "v2", None).unwrap();
        assert!(matches!(
            store.renew_lease(path, "tok-a", Duration::from_secs(1)),
            Err(StoreError::OwnershipConflict(_))
        ));
        store
            .acquire_lease(path, Duration::from_secs(30), "tok-b")
            .unwrap();
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Leased);
    }

    /// Renewal pushes the expiry out past the original duration.
    fn exercise_renewal(store: &dyn ObjectStore) {
        let path = "c/nodes/renewing";
        store.create_if_absent(path, "v1").unwrap();

        store
            .acquire_lease(path, Duration::from_millis(40), "tok-a")
            .unwrap();
        store
            .renew_lease(path, "tok-a", Duration::from_millis(300))
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Leased);

        assert!(matches!(
            store.renew_lease(path, "tok-b", Duration::from_millis(300)),
            Err(StoreError::OwnershipConflict(_))
        ));
    }

    #[test]
    fn test_in_memory_store_contract() {
        let store = InMemoryObjectStore::new();
        exercise_contract(&store);
    }

    #[test]
    fn test_in_memory_store_expiry() {
        let store = InMemoryObjectStore::new();
        exercise_expiry(&store);
    }

    #[test]
    fn test_in_memory_store_renewal() {
        let store = InMemoryObjectStore::new();
        exercise_renewal(&store);
    }

    #[test]
    fn test_in_memory_store_forced_expiry() {
        let store = InMemoryObjectStore::new();
        let path = "c/nodes/forced";
        store.create_if_absent(path, "v1").unwrap();

        assert!(!store.expire_lease(path));
        store
            .acquire_lease(path, Duration::from_secs(60), "tok-a")
            .unwrap();
        assert!(store.expire_lease(path));
        assert_eq!(store.lease_state(path).unwrap(), LeaseState::Expired);

        // Expired leases cannot be expired twice.
        assert!(!store.expire_lease(path));
    }

    #[test]
    fn test_in_memory_store_counts_state_polls() {
        let store = InMemoryObjectStore::new();
        let path = "c/nodes/polled";
        store.create_if_absent(path, "v1").unwrap();

        assert_eq!(store.state_polls(), 0);
        store.lease_state(path).unwrap();
        store.lease_state(path).unwrap();
        assert_eq!(store.state_polls(), 2);
    }

    #[test]
    fn test_lease_state_acquirability() {
        assert!(LeaseState::Available.is_acquirable());
        assert!(LeaseState::Expired.is_acquirable());
        assert!(!LeaseState::Leased.is_acquirable());
    }

    #[test]
    fn test_lease_operations_on_missing_object() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.lease_state("c/nodes/none"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.acquire_lease("c/nodes/none", Duration::from_secs(1), "tok"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use super::*;
        use crate::infrastructure_sqlite::SqliteObjectStore;

        #[test]
        fn test_sqlite_store_contract() {
            let store = SqliteObjectStore::open_in_memory().unwrap();
            exercise_contract(&store);
        }

        #[test]
        fn test_sqlite_store_expiry() {
            let store = SqliteObjectStore::open_in_memory().unwrap();
            exercise_expiry(&store);
        }

        #[test]
        fn test_sqlite_store_renewal() {
            let store = SqliteObjectStore::open_in_memory().unwrap();
            exercise_renewal(&store);
        }
    }
}
