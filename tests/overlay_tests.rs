use lazymap::constants::{OVERLAY_ADD_EVENT, OVERLAY_DRAW_EVENT, OVERLAY_REMOVE_EVENT};
use lazymap::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Overlays, popups and tooltips on a headless map
#[cfg(test)]
mod overlay_tests {
    use super::*;

    fn loaded_loader() -> (Loader, Arc<HeadlessBackend>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(HeadlessBackend::new());
        let loader = Loader::with_state(LoaderState::new());
        loader.set_api_key("test-key").set_backend(backend.clone());
        (loader, backend)
    }

    fn counter(overlay: &Overlay, event_type: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        overlay.on(
            event_type,
            Callback::new(move |_| {
                handle.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    #[tokio::test]
    async fn test_show_attaches_and_draws() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::new((0.0, 0.0), 3.0), loader.clone());
        let overlay = Overlay::with_loader((0.0, 0.0), loader.clone());
        let added = counter(&overlay, OVERLAY_ADD_EVENT);
        let draws = counter(&overlay, OVERLAY_DRAW_EVENT);

        let shown = overlay.show(&map).await.unwrap();

        assert_eq!(shown.id(), overlay.id());
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert!(draws.load(Ordering::SeqCst) >= 1);
        assert_eq!(overlay.pixel(), Some(Point::new(400.0, 300.0)));
        assert!(overlay.is_visible());

        let library = backend.library();
        assert!(library.overlays()[0].is_on(&library.maps()[0]));
    }

    #[tokio::test]
    async fn test_far_position_is_not_drawn() {
        let (loader, _) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::new((0.0, 0.0), 10.0), loader.clone());
        let overlay = Overlay::with_loader((0.0, 20.0), loader.clone());

        overlay.show(&map).await.unwrap();

        let state = overlay.overlay_state();
        assert!(state.added && state.displayed);
        assert_eq!(overlay.pixel(), None);
        assert!(!overlay.is_visible());

        // Moving the view brings it back in range on the next draw
        map.set_center((0.0, 20.0));
        assert_eq!(overlay.pixel(), Some(Point::new(400.0, 300.0)));
        assert!(overlay.is_visible());
    }

    #[tokio::test]
    async fn test_draw_event_reports_visibility() {
        let (loader, _) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::new((0.0, 0.0), 2.0), loader.clone());
        let overlay = Overlay::with_loader((0.0, 0.0), loader.clone());
        let last = Arc::new(Mutex::new(None));
        let sink = last.clone();
        overlay.on(
            OVERLAY_DRAW_EVENT,
            Callback::new(move |event| *sink.lock().unwrap() = event.detail.clone()),
        );

        overlay.show(&map).await.unwrap();
        overlay.set_offset((10.0, -5.0));

        let detail = last.lock().unwrap().clone().unwrap();
        assert_eq!(detail["x"], 410.0);
        assert_eq!(detail["y"], 295.0);
        assert_eq!(detail["visible"], true);
    }

    #[tokio::test]
    async fn test_hide_is_idempotent() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let overlay = Overlay::with_loader((0.0, 0.0), loader.clone());
        let removed = counter(&overlay, OVERLAY_REMOVE_EVENT);
        overlay.show(&map).await.unwrap();

        overlay.hide();
        overlay.hide();

        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert!(!overlay.is_shown());
        assert!(!overlay.is_visible());
        assert!(!backend.library().overlays()[0].has_map());
    }

    #[tokio::test]
    async fn test_hide_before_show_is_a_no_op() {
        let (loader, backend) = loaded_loader();
        let overlay = Overlay::with_loader((0.0, 0.0), loader);
        let removed = counter(&overlay, OVERLAY_REMOVE_EVENT);

        overlay.hide();

        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(overlay.state(), MaterializationState::Unmaterialized);
        assert_eq!(backend.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_show_on_same_map_adds_once() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let overlay = Overlay::with_loader((0.0, 0.0), loader.clone());
        let added = counter(&overlay, OVERLAY_ADD_EVENT);

        overlay.show(&map).await.unwrap();
        overlay.show(&map).await.unwrap();

        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(backend.library().overlays_created(), 1);
    }

    #[tokio::test]
    async fn test_overlay_removed_while_loading_stays_detached() {
        let (backend, gate) = HeadlessBackend::gated();
        let backend = Arc::new(backend);
        let loader = Loader::with_state(LoaderState::new());
        loader.set_api_key("test-key").set_backend(backend.clone());
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let overlay = Overlay::with_loader((0.0, 0.0), loader.clone());

        let showing = {
            let (overlay, map) = (overlay.clone(), map.clone());
            tokio::spawn(async move { overlay.show(&map).await.map(|_| ()) })
        };
        while loader.phase() != LoadPhase::Loading {
            tokio::task::yield_now().await;
        }

        overlay.hide();
        gate.open();
        showing.await.unwrap().unwrap();

        assert!(!overlay.overlay_state().added);
        assert!(!backend.library().overlays()[0].has_map());
    }

    #[tokio::test]
    async fn test_popup_opens_on_marker_click() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let marker = Marker::with_loader(MarkerOptions::new((1.0, 2.0)), loader.clone());
        let popup = Popup::with_loader(
            PopupOptions {
                content: "Depot".into(),
                ..PopupOptions::default()
            },
            loader.clone(),
        );
        marker.bind_popup(&popup);
        marker.show(&map).await.unwrap();

        backend.library().markers()[0].trigger("click", None);

        assert!(popup.is_open());
        assert_eq!(popup.overlay().position(), LatLng::new(1.0, 2.0));
        assert!(popup.overlay().overlay_state().added);

        popup.close();
        assert!(!popup.is_open());
    }

    #[tokio::test]
    async fn test_unbound_popup_ignores_clicks() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let marker = Marker::with_loader(MarkerOptions::new((1.0, 2.0)), loader.clone());
        let popup = Popup::with_loader(PopupOptions::default(), loader.clone());
        let binding = marker.bind_popup(&popup);
        marker.show(&map).await.unwrap();

        binding.unbind(&marker);
        backend.library().markers()[0].trigger("click", None);

        assert!(!popup.is_open());
    }

    #[tokio::test]
    async fn test_popup_open_before_load() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let popup = Popup::with_loader(PopupOptions::default(), loader.clone());

        popup.open(&map, (5.0, 5.0)).await.unwrap();

        assert!(map.is_loaded());
        assert_eq!(backend.import_calls(), 1);
        assert!(popup.overlay().overlay_state().added);
    }

    #[tokio::test]
    async fn test_tooltip_follows_hover() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let line = Polyline::with_loader(
            PolylineOptions::new([(0.0, 0.0), (2.0, 4.0)]),
            loader.clone(),
        );
        let tooltip = Tooltip::with_loader(
            TooltipOptions {
                content: "Route 9".into(),
                ..TooltipOptions::default()
            },
            loader.clone(),
        );
        line.bind_tooltip(&tooltip);
        line.show(&map).await.unwrap();

        let native = backend.library().polylines()[0].clone();
        native.trigger("mouseover", None);
        assert!(tooltip.is_open());
        assert_eq!(tooltip.overlay().position(), LatLng::new(1.0, 2.0));

        native.trigger("mouseout", None);
        assert!(!tooltip.is_open());
    }

    #[tokio::test]
    async fn test_permanent_tooltip_stays_open() {
        let (loader, backend) = loaded_loader();
        let map = Map::with_loader("map", MapOptions::default(), loader.clone());
        let marker = Marker::with_loader(MarkerOptions::new((0.0, 0.0)), loader.clone());
        let tooltip = Tooltip::with_loader(TooltipOptions::default(), loader.clone());
        tooltip.set_permanent(true);
        marker.bind_tooltip(&tooltip);
        marker.show(&map).await.unwrap();

        let native = backend.library().markers()[0].clone();
        native.trigger("mouseover", None);
        native.trigger("mouseout", None);

        assert!(tooltip.is_open());
    }
}
