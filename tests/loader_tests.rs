use futures::future::join_all;
use lazymap::constants::{LOAD_EVENT, MAP_LOADED_EVENT};
use lazymap::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Loader tests: one import per state, readiness events and their order
#[cfg(test)]
mod loader_tests {
    use super::*;

    fn loader_with(backend: HeadlessBackend) -> (Loader, Arc<HeadlessBackend>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(backend);
        let loader = Loader::with_state(LoaderState::new());
        loader.set_api_key("test-key").set_backend(backend.clone());
        (loader, backend)
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        let callback = Callback::new(move |_| {
            handle.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> Callback {
        let log = log.clone();
        let label = label.to_string();
        Callback::new(move |_| log.lock().unwrap().push(label.clone()))
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_import() {
        let (backend, gate) = HeadlessBackend::gated();
        let (loader, backend) = loader_with(backend);

        let pending: Vec<_> = (0..5).map(|_| loader.load()).collect();
        assert_eq!(loader.phase(), LoadPhase::Loading);

        gate.open();
        let results = join_all(pending).await;

        assert!(results.iter().all(|result| result.is_ok()));
        assert_eq!(backend.import_calls(), 1);
        assert_eq!(loader.phase(), LoadPhase::Loaded);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_failure() {
        let (backend, gate) = HeadlessBackend::gated();
        let (loader, backend) = loader_with(backend);

        let pending: Vec<_> = (0..3).map(|_| loader.load()).collect();
        gate.fail("quota exceeded");
        let results = join_all(pending).await;

        let expected = MapError::ExternalLoad("quota exceeded".to_string());
        for result in results {
            assert_eq!(result.unwrap_err(), expected);
        }
        assert_eq!(backend.import_calls(), 1);
        assert_eq!(loader.phase(), LoadPhase::Failed(expected));
    }

    #[tokio::test]
    async fn test_missing_api_key_rejects_without_import() {
        let backend = Arc::new(HeadlessBackend::new());
        let loader = Loader::with_state(LoaderState::new());
        loader.set_backend(backend.clone());

        let err = loader.load().await.unwrap_err();

        assert!(matches!(err, MapError::Configuration(_)));
        assert_eq!(loader.phase(), LoadPhase::NotStarted);
        assert_eq!(backend.import_calls(), 0);

        // Configuring the key afterwards still allows the first load
        loader.set_api_key("late-key");
        loader.load().await.unwrap();
        assert_eq!(backend.import_calls(), 1);
    }

    #[tokio::test]
    async fn test_late_once_subscriber_is_served() {
        let (loader, backend) = loader_with(HeadlessBackend::new());
        loader.load().await.unwrap();

        let (count, callback) = counter();
        loader.once(LOAD_EVENT, callback);
        loader.load().await.unwrap();
        loader.load().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(backend.import_calls(), 1);
    }

    #[tokio::test]
    async fn test_repeating_subscriber_sees_every_dispatch() {
        let (loader, _) = loader_with(HeadlessBackend::new());
        let (count, callback) = counter();
        loader.on(LOAD_EVENT, callback);

        loader.load().await.unwrap();
        loader.load().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_event_reaches_every_loader_on_the_state() {
        let (first, _) = loader_with(HeadlessBackend::new());
        let second = Loader::with_state(first.state().clone());

        let (count, callback) = counter();
        first.on(LOAD_EVENT, callback);
        second.load().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(first.is_loaded());
    }

    #[tokio::test]
    async fn test_load_with_callback_when_already_loaded() {
        let (loader, _) = loader_with(HeadlessBackend::new());
        loader.load().await.unwrap();

        let called = Arc::new(AtomicUsize::new(0));
        let handle = called.clone();
        loader
            .load_with(move || {
                handle.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_joining_loader_callback_runs_after_import() {
        let (backend, gate) = HeadlessBackend::gated();
        let (loader, _) = loader_with(backend);

        let first = loader.load();
        let called = Arc::new(AtomicUsize::new(0));
        let handle = called.clone();
        let second = loader.load_with(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(called.load(Ordering::SeqCst), 0);

        gate.open();
        let (a, b) = futures::join!(first, second);
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_map_loaded_follows_load() {
        let (backend, gate) = HeadlessBackend::gated();
        let (loader, _) = loader_with(backend);
        let log = Arc::new(Mutex::new(Vec::new()));
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        loader.on(MAP_LOADED_EVENT, recorder(&log, "map_loaded"));

        let loading = {
            let map = map.clone();
            tokio::spawn(async move { map.load().await })
        };
        while loader.phase() != LoadPhase::Loading {
            tokio::task::yield_now().await;
        }

        // The map subscribed first, so it materializes while `load` is
        // still being dispatched to this later listener.
        loader.on(LOAD_EVENT, recorder(&log, "load"));
        gate.open();
        loading.await.unwrap().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["load", "map_loaded"]);
        assert!(loader.state().is_map_loaded());
    }

    #[tokio::test]
    async fn test_map_loaded_dispatched_once() {
        let (loader, _) = loader_with(HeadlessBackend::new());
        let (count, callback) = counter();
        loader.on(MAP_LOADED_EVENT, callback);

        let first = Map::with_loader("first", MapOptions::default(), loader.clone());
        let second = Map::with_loader("second", MapOptions::default(), loader.clone());
        first.load().await.unwrap();
        second.load().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_on_map_load_after_the_fact() {
        let (loader, _) = loader_with(HeadlessBackend::new());
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        map.load().await.unwrap();

        let (count, callback) = counter();
        loader.on_map_load(callback);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_map_init_in_background() {
        let (loader, _) = loader_with(HeadlessBackend::new());
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());

        let (tx, rx) = futures::channel::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        loader.on_map_load(Callback::new(move |_| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }));

        map.init().expect("tokio runtime available");
        rx.await.expect("map_loaded dispatched");
        assert!(map.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_terminal() {
        let (loader, backend) = loader_with(HeadlessBackend::failing("invalid key"));
        let (count, callback) = counter();
        loader.on(LOAD_EVENT, callback);

        assert!(loader.load().await.is_err());
        let err = loader.load().await.unwrap_err();

        assert_eq!(err, MapError::ExternalLoad("invalid key".to_string()));
        assert_eq!(backend.import_calls(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_config_changes_after_load_are_kept() {
        let (loader, backend) = loader_with(HeadlessBackend::new());
        loader.set_libraries(["places"]);
        loader.load().await.unwrap();

        loader.add_library("geometry");

        assert_eq!(
            loader.state().config().libraries,
            vec!["places".to_string(), "geometry".to_string()]
        );
        assert_eq!(backend.last_request().unwrap().libraries, vec!["places"]);
    }
}
