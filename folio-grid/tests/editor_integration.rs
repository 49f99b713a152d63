//! End-to-end editor flows against the in-memory store.

use folio_core::{
    CellStore, GridItem, MemoryStore, ProjectId, SectionId, TemplateType, TextField, MAX_ROWS,
    MERGE_MARKER,
};
use folio_grid::{
    ClipboardPayload, EditError, EditorConfig, GridEditor, GridEvent, LayoutConfig, Offset,
    SectionLayout, SelectionState, Size, WriteOutcome,
};
use std::sync::Arc;

struct Fixture {
    editor: GridEditor,
    store: Arc<MemoryStore>,
    project: ProjectId,
    section: SectionId,
}

async fn loaded() -> Fixture {
    let store = Arc::new(MemoryStore::with_base_url("https://cdn.test"));
    let project = ProjectId::random();
    let section = SectionId::from("roadmap");
    let mut editor = GridEditor::new(
        project,
        section.clone(),
        store.clone(),
        store.clone(),
        EditorConfig::for_testing(),
    );
    editor.load().await.unwrap();
    Fixture {
        editor,
        store,
        project,
        section,
    }
}

fn select(editor: &mut GridEditor, ids: &[u32]) {
    editor.clear_selection();
    for id in ids {
        editor.click(*id, true);
    }
}

#[tokio::test]
async fn test_merge_square_then_unmerge() {
    let mut f = loaded().await;
    f.editor.click(1, false);
    f.editor.assign_template(TemplateType::Text).await;
    select(&mut f.editor, &[1, 2, 5, 6]);

    let anchor = f.editor.merge_selected().await.unwrap();
    assert_eq!(anchor, 1);
    let cell = f.editor.cell(1).unwrap();
    assert_eq!((cell.row_span, cell.col_span), (2, 2));
    assert_eq!(cell.text.body.content, MERGE_MARKER);
    for id in [2, 5, 6] {
        assert!(f.editor.cell(id).unwrap().hidden);
    }
    assert_eq!(f.editor.selection_state(), SelectionState::NoSelection);
    assert_eq!(f.editor.visible_cells().count(), 5);

    let stored = f.store.cell(f.project, &f.section, 6).await.unwrap();
    assert!(stored.hidden);

    f.editor.unmerge(1).await.unwrap();
    for id in [1, 2, 5, 6] {
        let cell = f.editor.cell(id).unwrap();
        assert!(!cell.hidden, "cell {id} still hidden");
        assert_eq!((cell.row_span, cell.col_span), (1, 1));
    }
    assert!(f.editor.cell(1).unwrap().text.body.content.is_empty());
    assert_eq!(f.editor.visible_cells().count(), 8);
}

#[tokio::test]
async fn test_l_shaped_merge_rejected() {
    let mut f = loaded().await;
    let before: Vec<GridItem> = f.editor.cells().cloned().collect();
    let writes = f.store.write_count();

    select(&mut f.editor, &[1, 2, 5]);
    let err = f.editor.merge_selected().await.unwrap_err();
    assert!(matches!(err, EditError::NotRectangular));

    let after: Vec<GridItem> = f.editor.cells().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(f.store.write_count(), writes);
    assert_eq!(f.editor.selection().len(), 3);
}

#[tokio::test]
async fn test_merge_persist_failure_leaves_state() {
    let mut f = loaded().await;
    select(&mut f.editor, &[3, 4]);
    f.store.fail_next_writes(1);

    let err = f.editor.merge_selected().await.unwrap_err();
    assert!(matches!(err, EditError::Persist(_)));
    assert!(!f.editor.cell(4).unwrap().hidden);
    assert_eq!(f.editor.cell(3).unwrap().col_span, 1);
}

#[tokio::test]
async fn test_unmerge_plain_cell_rejected() {
    let mut f = loaded().await;
    assert!(matches!(f.editor.unmerge(3).await, Err(EditError::NotMerged(3))));
    assert!(matches!(f.editor.unmerge(42).await, Err(EditError::CellNotFound(42))));
}

#[tokio::test]
async fn test_row_removal_blocked_at_minimum() {
    let mut f = loaded().await;
    assert_eq!(f.editor.rows(), 2);
    let err = f.editor.remove_row().await.unwrap_err();
    assert!(matches!(err, EditError::MinRows { min: 2 }));
    assert_eq!(f.editor.rows(), 2);
    assert_eq!(f.editor.cells().count(), 8);
    assert_eq!(f.store.cell_count(f.project, &f.section).await, 8);
}

#[tokio::test]
async fn test_add_then_remove_row() {
    let mut f = loaded().await;
    let mut events = f.editor.subscribe();

    assert_eq!(f.editor.add_row().await.unwrap(), 3);
    assert_eq!(events.recv().await.unwrap(), GridEvent::RowsChanged(3));
    assert_eq!(f.store.cell_count(f.project, &f.section).await, 12);
    assert_eq!(f.editor.cell(12).unwrap().row, 3);

    f.editor.click(11, false);
    assert_eq!(f.editor.remove_row().await.unwrap(), 2);
    assert_eq!(f.store.cell_count(f.project, &f.section).await, 8);
    assert_eq!(f.editor.selection_state(), SelectionState::NoSelection);
}

#[tokio::test]
async fn test_load_respects_stored_rows_and_backfills() {
    let store = Arc::new(MemoryStore::new());
    let project = ProjectId::random();
    let section = SectionId::from("gallery");

    let mut deep = GridItem::new_default(4, 2);
    deep.template = TemplateType::Text;
    deep.text.title.content = "Row four".into();
    store.upsert_cells(project, &section, &[deep]).await.unwrap();

    let mut editor = GridEditor::new(project, section.clone(), store.clone(), store.clone(), EditorConfig::for_testing());
    let backfilled = editor.load().await.unwrap();

    assert_eq!(editor.rows(), 4);
    assert_eq!(backfilled, 15);
    assert_eq!(editor.cell(14).unwrap().text.title.content, "Row four");
    assert_eq!(store.cell_count(project, &section).await, 16);
}

#[tokio::test]
async fn test_load_skips_rows_beyond_limit() {
    let store = Arc::new(MemoryStore::new());
    let project = ProjectId::random();
    let section = SectionId::from("stray");

    let past_limit = GridItem::new_default(MAX_ROWS + 1, 1);
    let mut overflowing = GridItem::new_default(1, 3);
    overflowing.row = 1 << 30;
    store.upsert_cells(project, &section, &[past_limit, overflowing]).await.unwrap();

    let mut editor = GridEditor::new(project, section.clone(), store.clone(), store.clone(), EditorConfig::for_testing());
    let backfilled = editor.load().await.unwrap();

    assert_eq!(editor.rows(), 2);
    assert_eq!(backfilled, 8);
    assert_eq!(editor.cells().count(), 8);
    assert_eq!(editor.cell(3).unwrap().row, 1);
}

#[tokio::test]
async fn test_backfill_failure_keeps_local_state() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next_writes(1);
    let mut editor = GridEditor::new(
        ProjectId::random(),
        SectionId::from("s"),
        store.clone(),
        store.clone(),
        EditorConfig::for_testing(),
    );
    assert_eq!(editor.load().await.unwrap(), 8);
    assert_eq!(editor.cells().count(), 8);
    assert!(editor.has_unsaved_changes());

    let report = editor.retry_unsaved().await;
    assert_eq!(report.saved.len(), 8);
    assert!(!editor.has_unsaved_changes());
}

#[tokio::test]
async fn test_template_assignment_partial_failure() {
    let mut f = loaded().await;
    select(&mut f.editor, &[1, 2, 3]);
    // Cells persist one by one in id order; the first write fails.
    f.store.fail_next_writes(1);

    let report = f.editor.assign_template(TemplateType::Text).await;
    assert_eq!(report.saved, vec![2, 3]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 1);
    assert!(!report.is_complete());

    for id in [1, 2, 3] {
        assert_eq!(f.editor.cell(id).unwrap().template, TemplateType::Text);
    }
    assert_eq!(f.editor.selection_state(), SelectionState::NoSelection);
    assert_eq!(f.editor.unsaved_cells().collect::<Vec<_>>(), vec![1]);
    let stored = f.store.cell(f.project, &f.section, 1).await.unwrap();
    assert_eq!(stored.template, TemplateType::None);
}

#[tokio::test]
async fn test_reset_restores_defaults() {
    let mut f = loaded().await;
    f.editor.set_text(7, TextField::Body, "notes").await.unwrap();
    select(&mut f.editor, &[7]);
    let report = f.editor.reset_selected().await;
    assert_eq!(report.saved, vec![7]);
    assert_eq!(f.editor.cell(7).unwrap(), &GridItem::new_default(2, 3));
}

#[tokio::test]
async fn test_image_drag_and_scale() {
    let mut f = loaded().await;
    f.editor.click(1, false);
    f.editor
        .paste(ClipboardPayload::Text("https://img.test/wide.jpg".into()), false)
        .await
        .unwrap();

    let layout = SectionLayout::compute(f.editor.cells(), f.editor.rows(), &LayoutConfig::for_testing()).unwrap();
    assert_eq!(f.editor.apply_layout(&layout).await, WriteOutcome::Saved);
    assert_eq!(f.editor.frame(1).unwrap().container(), Some(Size::new(100.0, 100.0)));

    // Natural size unknown: drag is a no-op.
    assert!(!f.editor.begin_image_drag(1, Offset::new(0.0, 0.0)).unwrap());

    f.editor.image_loaded(1, Size::new(300.0, 200.0));
    let writes = f.store.write_count();
    assert!(f.editor.begin_image_drag(1, Offset::new(50.0, 50.0)).unwrap());
    assert_eq!(f.editor.drag_image(1, Offset::new(0.0, 20.0)), Some(Offset::new(-50.0, -30.0)));
    assert_eq!(f.editor.drag_image(1, Offset::new(-500.0, -500.0)), Some(Offset::new(-200.0, -100.0)));
    assert_eq!(f.store.write_count(), writes, "drag frames must not persist");

    let outcome = f.editor.end_image_drag(1, Offset::new(-500.0, -500.0)).await.unwrap();
    assert_eq!(outcome, Some(WriteOutcome::Saved));
    let stored = f.store.cell(f.project, &f.section, 1).await.unwrap();
    assert_eq!((stored.image.offset_x, stored.image.offset_y), (-200.0, -100.0));

    // Halving the scale: 150×100 image in a 100px box.
    f.editor.set_image_scale(1, 0.5).await.unwrap();
    let stored = f.store.cell(f.project, &f.section, 1).await.unwrap();
    assert_eq!(stored.image.scale, 0.5);
    assert_eq!((stored.image.offset_x, stored.image.offset_y), (-50.0, 0.0));
}

#[tokio::test]
async fn test_growing_container_reclamps_stored_offset() {
    let mut f = loaded().await;
    f.editor.click(1, false);
    f.editor
        .paste(ClipboardPayload::Text("https://img.test/square.png".into()), false)
        .await
        .unwrap();
    f.editor.set_container_size(1, Size::new(100.0, 100.0)).await;
    f.editor.image_loaded(1, Size::new(400.0, 400.0));

    assert!(f.editor.begin_image_drag(1, Offset::new(0.0, 0.0)).unwrap());
    f.editor.end_image_drag(1, Offset::new(-300.0, -300.0)).await.unwrap();
    let stored = f.store.cell(f.project, &f.section, 1).await.unwrap();
    assert_eq!((stored.image.offset_x, stored.image.offset_y), (-300.0, -300.0));

    let mut events = f.editor.subscribe();
    let outcome = f.editor.set_container_size(1, Size::new(300.0, 300.0)).await;
    assert_eq!(outcome, WriteOutcome::Saved);

    // A 400px image in a 300px box may move at most 100px.
    let cell = f.editor.cell(1).unwrap();
    assert_eq!((cell.image.offset_x, cell.image.offset_y), (-100.0, -100.0));
    assert!(cell.image.offset_x + 400.0 * cell.image.scale >= 300.0);
    let stored = f.store.cell(f.project, &f.section, 1).await.unwrap();
    assert_eq!((stored.image.offset_x, stored.image.offset_y), (-100.0, -100.0));
    assert_eq!(events.try_recv().unwrap(), GridEvent::CellsChanged(vec![1]));

    // Same size again: nothing to write.
    let writes = f.store.write_count();
    f.editor.set_container_size(1, Size::new(300.0, 300.0)).await;
    assert_eq!(f.store.write_count(), writes);
}

#[tokio::test]
async fn test_superseded_upload_is_dropped() {
    let mut f = loaded().await;
    let older = f.editor.start_upload(4).unwrap();
    let newer = f.editor.start_upload(4).unwrap();

    let outcome = f
        .editor
        .finish_upload(newer, Ok("https://cdn.test/newer.png".into()))
        .await
        .unwrap();
    assert!(outcome.is_saved());

    let err = f
        .editor
        .finish_upload(older, Ok("https://cdn.test/older.png".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::StaleUpload(4)));
    assert_eq!(f.editor.cell(4).unwrap().image.url.as_deref(), Some("https://cdn.test/newer.png"));
    let stored = f.store.cell(f.project, &f.section, 4).await.unwrap();
    assert_eq!(stored.image.url.as_deref(), Some("https://cdn.test/newer.png"));
}

#[tokio::test]
async fn test_drag_blocked_during_upload() {
    let mut f = loaded().await;
    f.editor.click(2, false);
    f.editor
        .paste(ClipboardPayload::Text("https://img.test/a.png".into()), false)
        .await
        .unwrap();
    f.editor.set_container_size(2, Size::new(100.0, 100.0)).await;
    f.editor.image_loaded(2, Size::new(400.0, 400.0));

    let ticket = f.editor.start_upload(2).unwrap();
    assert!(matches!(
        f.editor.begin_image_drag(2, Offset::default()),
        Err(EditError::UploadInFlight(2))
    ));

    let outcome = f
        .editor
        .finish_upload(ticket, Ok("https://cdn.test/new.png".into()))
        .await
        .unwrap();
    assert!(outcome.is_saved());
    assert!(!f.editor.is_uploading(2));
    assert_eq!(f.editor.cell(2).unwrap().image.url.as_deref(), Some("https://cdn.test/new.png"));
}

#[tokio::test]
async fn test_paste_image_file_uploads() {
    let mut f = loaded().await;
    f.editor.click(5, false);
    let outcome = f
        .editor
        .paste(
            ClipboardPayload::Image {
                bytes: vec![0x89, b'P', b'N', b'G'],
                mime: "image/png".into(),
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcome, Some(WriteOutcome::Saved));

    let url = f.editor.cell(5).unwrap().image.url.clone().unwrap();
    let prefix = format!("https://cdn.test/{}/{}/5-", f.project, f.section);
    assert!(url.starts_with(&prefix), "unexpected url {url}");
    assert!(url.ends_with(".png"));
    let path = url.trim_start_matches("https://cdn.test/");
    assert_eq!(f.store.image(path).await, Some(vec![0x89, b'P', b'N', b'G']));
    assert!(!f.editor.is_uploading(5));
}

#[tokio::test]
async fn test_failed_upload_clears_flag() {
    let mut f = loaded().await;
    f.store.fail_next_writes(1);
    let err = f.editor.upload_image(3, vec![1, 2, 3], "png").await.unwrap_err();
    assert!(matches!(err, EditError::Persist(_)));
    assert!(!f.editor.is_uploading(3));
    assert_eq!(f.editor.cell(3).unwrap().template, TemplateType::None);
}

#[tokio::test]
async fn test_context_click_forces_single() {
    let mut f = loaded().await;
    select(&mut f.editor, &[1, 2]);
    f.editor.context_click(2);
    assert_eq!(f.editor.selection().len(), 2);
    f.editor.context_click(8);
    assert_eq!(f.editor.selection_state(), SelectionState::Single(8));
}
