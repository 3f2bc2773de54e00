use anyhow::Context;
use lazymap::prelude::*;
use std::time::Duration;

/// Walk through a slow library load: drawables are configured and shown
/// while the import is still pending, and everything appears at once when
/// it completes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let api_key = std::env::args().nth(1).unwrap_or_else(|| "demo-key".to_string());
    let (backend, gate) = HeadlessBackend::gated();
    let backend = Arc::new(backend);

    let loader = Loader::new();
    loader
        .set_api_key(&api_key)
        .set_version("weekly")
        .set_libraries(["places", "marker"])
        .set_backend(backend.clone());

    loader.on(
        constants::LOAD_EVENT,
        Callback::new(|_| log::info!("mapping library loaded")),
    );
    loader.on_map_load(Callback::new(|_| log::info!("first map is ready")));

    let map = Map::new("demo-map", MapOptions::new((48.8566, 2.3522), 11.0));
    map.set_zoom(13.0);

    let markers: Vec<Marker> = [
        ("Louvre", (48.8606, 2.3376)),
        ("Notre-Dame", (48.8530, 2.3499)),
        ("Eiffel Tower", (48.8584, 2.2945)),
    ]
    .into_iter()
    .map(|(title, position)| {
        Marker::with_options(MarkerOptions {
            title: Some(title.to_string()),
            ..MarkerOptions::new(position)
        })
    })
    .collect();

    let overlay = Overlay::new((48.8566, 2.3522));
    overlay.on(
        constants::OVERLAY_DRAW_EVENT,
        Callback::new(|event| log::debug!("overlay drawn: {:?}", event.detail)),
    );

    let mut pending = Vec::new();
    for marker in &markers {
        let (marker, map) = (marker.clone(), map.clone());
        pending.push(tokio::spawn(async move { marker.show(&map).await }));
    }
    let shown_overlay = {
        let (overlay, map) = (overlay.clone(), map.clone());
        tokio::spawn(async move { overlay.show(&map).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    log::info!("phase while waiting: {}", loader.phase());
    gate.open();

    for handle in pending {
        handle.await.context("marker task panicked")??;
    }
    let overlay = shown_overlay.await.context("overlay task panicked")??;

    let library = backend.library();
    log::info!(
        "imports: {}, maps: {}, markers: {}, overlays: {}",
        backend.import_calls(),
        library.maps_created(),
        library.markers_created(),
        library.overlays_created()
    );

    let native = map.native_sync().context("map should be materialized")?;
    log::info!("native zoom {} at {:?}", native.zoom(), native.center());
    match overlay.pixel() {
        Some(pixel) => log::info!("overlay at ({:.0}, {:.0})", pixel.x, pixel.y),
        None => log::info!("overlay outside the drawable area"),
    }

    Ok(())
}
