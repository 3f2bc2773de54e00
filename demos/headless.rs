use lazymap::prelude::*;

/// Drive the deferred-initialization flow against the headless runtime
#[tokio::main]
async fn main() -> lazymap::Result<()> {
    lazymap::init_debug_logging();
    println!("🗺️ Lazymap Headless Example");
    println!("===========================");

    let backend = Arc::new(HeadlessBackend::new());
    let loader = Loader::new();
    loader
        .set_api_key("demo-key")
        .set_libraries(["marker", "geometry"])
        .set_backend(backend.clone());

    // Everything below is configured before the library exists
    let map = Map::new("map", MapOptions::new((37.7749, -122.4194), 12.0));
    map.on(
        "zoom_changed",
        Callback::new(|_| println!("   🔍 zoom changed")),
    );

    let marker = Marker::with_options(MarkerOptions {
        title: Some("Ferry Building".to_string()),
        ..MarkerOptions::new((37.7955, -122.3937))
    });
    let popup = Popup::new("Ferry Building Marketplace");
    marker.bind_popup(&popup);

    let route = Polyline::new([
        (37.7955, -122.3937),
        (37.8080, -122.4177),
        (37.8267, -122.4230),
    ]);
    let tooltip = Tooltip::new("Waterfront walk");
    route.bind_tooltip(&tooltip);

    loader.on_map_load(Callback::new(|_| println!("✅ map_loaded dispatched")));
    println!("⏳ Phase before load: {}", loader.phase());

    marker.show(&map).await?;
    route.show(&map).await?;
    println!("✅ Phase after load: {}", loader.phase());
    println!("   Imports performed: {}", backend.import_calls());

    let library = backend.library();
    println!("\n📋 Native objects:");
    println!("   Maps: {}", library.maps_created());
    println!("   Markers: {}", library.markers_created());
    println!("   Polylines: {}", library.polylines_created());

    println!("\n🎯 Simulating runtime events:");
    for native in library.markers() {
        native.trigger("click", None);
    }
    println!("   Popup open after click: {}", popup.is_open());
    if let Some(pixel) = popup.overlay().pixel() {
        println!("   Popup drawn at ({:.0}, {:.0})", pixel.x, pixel.y);
    }

    for native in library.polylines() {
        native.trigger("mouseover", None);
        println!("   Tooltip open on hover: {}", tooltip.is_open());
        native.trigger("mouseout", None);
        println!("   Tooltip open after hover: {}", tooltip.is_open());
    }

    map.set_zoom(14.0);

    println!("\n📊 Final map state:");
    let center = map.center();
    println!("   Center: {:.4}, {:.4}", center.lat, center.lng);
    println!("   Zoom: {:.1}", map.zoom());

    Ok(())
}
