use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use datamaps::config::AppConfig;
use datamaps::plugins::{BUBBLE_CLASS, LEGEND_CLASS};
use datamaps::render::SUBUNIT_CLASS;
use datamaps::{Datamap, Document, MapError, MapOptions};
use serde_json::{json, Value};

async fn japan(options: Value) -> Datamap {
    let options = MapOptions::from_value(options).unwrap();
    let mut map = Datamap::new(Document::new(960.0, 600.0), options).unwrap();
    map.draw().await.unwrap();
    map
}

fn subunits(map: &Datamap) -> Vec<datamaps::NodeId> {
    map.document().select_all(map.svg(), Some("path"), Some(SUBUNIT_CLASS))
}

fn fill_of(map: &Datamap, id: &str) -> String {
    let node = map.document().select(map.svg(), Some("path"), Some(id)).unwrap();
    map.document().style(node, "fill").unwrap().to_string()
}

#[tokio::test]
async fn draws_every_prefecture() {
    let map = japan(json!({"scope": "japan"})).await;
    assert_eq!(map.regions().len(), 47);
    assert_eq!(subunits(&map).len(), 47);

    let tokyo = map.document().select(map.svg(), Some("path"), Some("JP-13")).unwrap();
    assert!(map.document().attr(tokyo, "d").unwrap().starts_with('M'));
    assert_eq!(fill_of(&map, "JP-13"), "#ABDDA4");

    // Everything fits on the surface.
    let [x, y] = map.region_centroid("JP-13").unwrap();
    assert!(x > 0.0 && x < 960.0 && y > 0.0 && y < 600.0);
}

#[tokio::test]
async fn done_fires_once_after_regions_are_drawn() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let options = MapOptions::from_value(json!({"scope": "japan"}))
        .unwrap()
        .with_done(move |map| {
            assert_eq!(map.regions().len(), 47);
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let mut map = Datamap::new(Document::new(960.0, 600.0), options).unwrap();
    map.draw().await.unwrap();
    map.draw().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(subunits(&map).len(), 47);
}

#[tokio::test]
async fn choropleth_update_recolors_only_named_prefectures() {
    let mut map = japan(json!({
        "scope": "japan",
        "fills": {"HIGH": "#c00", "defaultFill": "#ddd"},
        "data": {"JP-27": {"fillKey": "HIGH"}}
    }))
    .await;
    assert_eq!(fill_of(&map, "JP-27"), "#c00");

    let update = json!({"JP-13": "#00f", "JP-27": {"note": "kept"}});
    map.update_choropleth(update.as_object().unwrap());
    map.document_mut().settle();

    assert_eq!(fill_of(&map, "JP-13"), "#00f");
    assert_eq!(fill_of(&map, "JP-27"), "#c00");
    assert_eq!(fill_of(&map, "JP-01"), "#ddd");
    assert_eq!(map.stored_data("JP-27"), Some(json!({"fillKey": "HIGH", "note": "kept"})));
}

#[tokio::test]
async fn hovering_a_prefecture_shows_its_local_name() {
    let mut map = japan(json!({"scope": "japan"})).await;
    // Label point shipped with the boundary data.
    let [x, y] = map.lat_lng_to_xy(35.6578, 139.407).unwrap();
    let hit = map.pointer_at(x, y).unwrap();
    assert_eq!(map.describe(hit).unwrap().0, "JP-13");

    let popup = map.popup_node().unwrap();
    let html = map.document().html(popup).unwrap();
    assert!(html.starts_with("<div class=\"hoverinfo\"><strong>"));
    assert!(html.contains("東京都"));
}

#[tokio::test]
async fn plugins_draw_on_top_of_the_regions() {
    let mut map = japan(json!({"scope": "japan", "fills": {"BIG": "#f0f", "defaultFill": "#ddd"}})).await;
    let bubbles = map
        .bubbles(json!([{"centered": "JP-13", "radius": 10, "fillKey": "BIG"}]), None)
        .unwrap();
    let labels = map.labels(None).unwrap();
    map.legend(json!({"legendTitle": "Sizes"})).unwrap();
    map.graticule().unwrap();

    let doc = map.document();
    let circle = doc.select(bubbles, Some("circle"), Some(BUBBLE_CLASS)).unwrap();
    let [cx, cy] = map.region_centroid("JP-13").unwrap();
    assert_eq!(doc.attr(circle, "cx"), Some(cx.to_string().as_str()));
    assert_eq!(doc.attr(circle, "cy"), Some(cy.to_string().as_str()));
    assert_eq!(doc.style(circle, "fill"), Some("#f0f"));
    assert_eq!(doc.select_all(labels, Some("text"), None).len(), 47);
    assert_eq!(doc.select_all(doc.host(), Some("div"), Some(LEGEND_CLASS)).len(), 1);

    // The bubble wins the hit test over the prefecture beneath it.
    assert_eq!(map.hit_test(cx, cy), Some(circle));
}

#[tokio::test]
async fn plugin_errors_surface_to_the_caller() {
    let mut map = japan(json!({"scope": "japan"})).await;
    let err = map.bubbles(json!({"centered": "JP-13"}), None).unwrap_err();
    assert_eq!(err.to_string(), "Datamaps Error - bubbles must be an array");
    assert!(matches!(map.plugin("heatmap", json!([]), None, false), Err(MapError::UnknownPlugin(_))));
}

#[tokio::test]
async fn inline_world_data_hides_antarctica_by_default() {
    let square = |id: &str, lon: f64| {
        json!({
            "type": "Feature",
            "id": id,
            "properties": {"name": id},
            "geometry": {"type": "Polygon", "coordinates": [[[lon, -80], [lon + 10.0, -80], [lon + 10.0, -70], [lon, -70], [lon, -80]]]}
        })
    };
    let data = json!({"type": "FeatureCollection", "features": [square("ATA", 0.0), square("CHL", 20.0)]});

    let hidden = japan(json!({"geographyConfig": {"dataJson": data.clone()}})).await;
    assert_eq!(hidden.regions().iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["CHL"]);

    let shown = japan(json!({"geographyConfig": {"dataJson": data, "hideAntarctica": false}})).await;
    assert_eq!(shown.regions().len(), 2);
}

#[tokio::test]
async fn world_scope_without_boundaries_is_an_error() {
    let options = MapOptions::from_value(json!({})).unwrap();
    let mut map = Datamap::new(Document::new(960.0, 600.0), options).unwrap();
    assert!(matches!(map.draw().await, Err(MapError::NoTopology(_))));
}

#[tokio::test]
async fn remote_csv_data_is_applied_after_drawing() {
    let path = std::env::temp_dir().join(format!("datamaps-choropleth-{}.csv", std::process::id()));
    std::fs::write(&path, "id,fillKey,votes\nJP-13,HIGH,10\nJP-47,LOW,3\n,HIGH,1\n").unwrap();

    let mut map = japan(json!({
        "scope": "japan",
        "dataType": "csv",
        "dataUrl": path.to_string_lossy(),
        "fills": {"HIGH": "#a00", "LOW": "#00a", "defaultFill": "#ddd"}
    }))
    .await;
    map.document_mut().settle();
    std::fs::remove_file(&path).ok();

    assert_eq!(fill_of(&map, "JP-13"), "#a00");
    assert_eq!(fill_of(&map, "JP-47"), "#00a");
    assert_eq!(fill_of(&map, "JP-01"), "#ddd");
    assert_eq!(map.stored_data("JP-13").unwrap()["votes"], "10");
}

#[tokio::test]
async fn remote_json_data_recolors_and_merges_after_drawing() {
    let path = std::env::temp_dir().join(format!("datamaps-choropleth-{}.json", std::process::id()));
    std::fs::write(&path, r##"{"JP-13": "#00f", "JP-27": {"fillKey": "HIGH", "votes": 7}}"##).unwrap();

    let mut map = japan(json!({
        "scope": "japan",
        "dataUrl": path.to_string_lossy(),
        "fills": {"HIGH": "#a00", "LOW": "#00a", "defaultFill": "#ddd"},
        "data": {"JP-27": {"fillKey": "LOW", "name": "Osaka"}}
    }))
    .await;
    map.document_mut().settle();
    std::fs::remove_file(&path).ok();

    assert_eq!(fill_of(&map, "JP-13"), "#00f");
    assert_eq!(fill_of(&map, "JP-27"), "#a00");
    assert_eq!(fill_of(&map, "JP-01"), "#ddd");
    assert_eq!(
        map.stored_data("JP-27"),
        Some(json!({"fillKey": "HIGH", "name": "Osaka", "votes": 7}))
    );
}

#[tokio::test]
async fn demo_config_renders_a_page() {
    let config = AppConfig::from_toml(include_str!("../demos/japan.toml")).unwrap();
    let mut map = Datamap::new(Document::new(960.0, 600.0), config.map_options().unwrap()).unwrap();
    map.draw().await.unwrap();
    for call in &config.plugins {
        map.plugin(&call.name, call.data.clone(), call.options.clone(), call.new_layer).unwrap();
    }

    let page = map.to_html();
    assert!(page.contains("datamaps-style-block"));
    assert!(page.contains("datamaps-subunit JP-13"));
    assert!(page.contains("<h2>Survey</h2>"));
    assert!(page.contains("No answer"));
    assert_eq!(page.matches("<circle").count(), 2);
    assert_eq!(config.server.port, 8080);
}
