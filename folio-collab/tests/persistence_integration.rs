//! RocksDB project store driven through the adapter traits.

use folio_collab::{CanvasConfig, CanvasSync, ProjectStore, StoreConfig, TopicBus};
use folio_core::{
    CanvasSnapshot, CellStore, GridItem, ImageStore, ProjectId, SectionId, SnapshotStore,
    TemplateType,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig::for_testing(dir.path().join("db"))
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::open(config(&dir)).unwrap();
    let project = ProjectId::random();
    let section = SectionId::from("hero");

    let mut cells = GridItem::default_band(2);
    cells[0].assign_template(TemplateType::Text);
    cells[0].text.title.content = "Welcome".into();

    store.upsert_cells(project, &section, &cells).await.unwrap();
    let first = store.read_cells(project, &section).await.unwrap();
    store.upsert_cells(project, &section, &cells).await.unwrap();
    let second = store.read_cells(project, &section).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 8);
    assert_eq!(second[0].text.title.content, "Welcome");
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempdir().unwrap();
    let project = ProjectId::random();
    let section = SectionId::from("gallery");
    let snapshot = CanvasSnapshot::new(json!({ "shapes": [{ "id": "a", "w": 120 }] }));

    {
        let store = ProjectStore::open(config(&dir)).unwrap();
        store.upsert_cells(project, &section, &GridItem::default_band(3)).await.unwrap();
        store.delete_cells(project, &section, &[9, 10, 11, 12]).await.unwrap();
        store.write_snapshot(project, &snapshot).await.unwrap();
        store.upload_image(&format!("{project}/gallery/1-a.png"), vec![0x89, 0x50]).await.unwrap();
        store.sync().unwrap();
    }

    let store = ProjectStore::open(config(&dir)).unwrap();
    assert_eq!(store.read_cells(project, &section).await.unwrap().len(), 8);
    assert_eq!(store.read_snapshot(project).await.unwrap(), Some(snapshot));
    assert_eq!(
        store.load_image(&format!("{project}/gallery/1-a.png")).unwrap(),
        Some(vec![0x89, 0x50])
    );
    assert_eq!(store.list_projects().unwrap(), vec![project]);
}

#[tokio::test]
async fn test_snapshot_is_compressed() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::open(config(&dir)).unwrap();
    let project = ProjectId::random();

    let shapes: Vec<_> = (0..500)
        .map(|i| json!({ "id": format!("shape-{i}"), "type": "rect", "fill": "#ffffff" }))
        .collect();
    let meta = store
        .save_snapshot(project, &CanvasSnapshot::new(json!({ "shapes": shapes })))
        .unwrap();

    assert!(meta.compressed_size * 4 < meta.snapshot_size);
    assert_eq!(store.load_metadata(project).unwrap(), Some(meta));
}

#[tokio::test]
async fn test_upload_returns_public_url() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::open(config(&dir)).unwrap();
    let url = store.upload_image("p/s/2-x.webp", vec![1]).await.unwrap();
    assert_eq!(url, "https://cdn.test/images/p/s/2-x.webp");
}

#[tokio::test]
async fn test_canvas_sync_on_rocksdb() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ProjectStore::open(config(&dir)).unwrap());
    let bus = Arc::new(TopicBus::new(16));
    let project = ProjectId::random();

    let writer = CanvasSync::new(project, store.clone(), bus.clone(), CanvasConfig::for_testing());
    let mounted = writer.mount().await.unwrap();
    mounted.local_edit(CanvasSnapshot::new(json!({ "v": 1 })));
    drop(mounted);
    writer.save_now().await.unwrap();

    let reader = CanvasSync::new(project, store.clone(), bus, CanvasConfig::for_testing());
    assert!(reader.reload().await.unwrap());
    assert_eq!(*reader.snapshot(), CanvasSnapshot::new(json!({ "v": 1 })));
}
