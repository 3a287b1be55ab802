use super::*;
use crate::gateway::memory::{Call, InMemoryGateway, ROOT_FOLDER_ID};

const SHADOW: &str = "[SHADOW]";

fn setup() -> (Arc<InMemoryGateway>, ShadowWorkspace, String) {
    let gw = Arc::new(InMemoryGateway::new());
    let config = MeshConfig::new("test-token").unwrap();
    let shadow = ShadowWorkspace::new(gw.clone(), &config);
    let folder = gw.add_folder(ROOT_FOLDER_ID, "project");
    (gw, shadow, folder)
}

fn shadow_folders(gw: &InMemoryGateway, folder: &str) -> usize {
    gw.children(folder)
        .iter()
        .filter(|i| i.name == SHADOW && i.is_folder())
        .count()
}

#[tokio::test]
async fn create_stages_every_top_level_file() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    gw.add_file(&folder, "notes.md", "n");
    let nested = gw.add_folder(&folder, "assets");
    gw.add_file(&nested, "logo.png", "png");

    let shadow_id = shadow.create(&folder, None).await.unwrap();

    let mut staged: Vec<String> = gw.children(&shadow_id).into_iter().map(|i| i.name).collect();
    staged.sort();
    assert_eq!(staged, vec!["notes.md", "report.txt"]);
    assert_eq!(gw.file_content(&shadow_id, "report.txt").unwrap(), "v1");
    // production untouched
    assert_eq!(gw.file_content(&folder, "report.txt").unwrap(), "v1");
}

#[tokio::test]
async fn create_with_explicit_selection() {
    let (gw, shadow, folder) = setup();
    let report = gw.add_file(&folder, "report.txt", "v1");
    gw.add_file(&folder, "notes.md", "n");

    let shadow_id = shadow
        .create(&folder, Some(&[report.clone()]))
        .await
        .unwrap();
    let staged: Vec<String> = gw.children(&shadow_id).into_iter().map(|i| i.name).collect();
    assert_eq!(staged, vec!["report.txt"]);

    // an empty selection stages everything, as an absent one does
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "a.txt", "a");
    let shadow_id = shadow.create(&folder, Some(&[])).await.unwrap();
    assert_eq!(gw.children(&shadow_id).len(), 1);
}

#[tokio::test]
async fn unknown_file_id_propagates() {
    let (_gw, shadow, folder) = setup();
    let err = shadow
        .create(&folder, Some(&["missing".to_string()]))
        .await
        .unwrap_err();
    match err {
        MeshError::Provider(e) => assert_eq!(e.status, Some(404)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn repeated_create_reuses_the_shadow() {
    let (gw, shadow, folder) = setup();
    let first = shadow.create(&folder, None).await.unwrap();
    let second = shadow.create(&folder, None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(shadow_folders(&gw, &folder), 1);
}

#[tokio::test]
async fn restaging_a_file_hits_provider_collision() {
    let (gw, shadow, folder) = setup();
    let report = gw.add_file(&folder, "report.txt", "v1");
    shadow.create(&folder, Some(&[report.clone()])).await.unwrap();

    let err = shadow.create(&folder, Some(&[report])).await.unwrap_err();
    match err {
        MeshError::Provider(e) => assert!(e.is_conflict()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(shadow_folders(&gw, &folder), 1);
}

#[tokio::test]
async fn commit_without_approval_does_nothing() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    let shadow_id = shadow.create(&folder, None).await.unwrap();
    gw.reset_calls();

    let outcome = shadow.commit(&folder, false).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Declined(Declined::ApprovalRequired));
    assert_eq!(gw.call_count(), 0);
    assert_eq!(gw.children(&shadow_id).len(), 1);
}

#[tokio::test]
async fn commit_without_shadow_is_declined() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Declined(Declined::NoShadow));
    assert_eq!(gw.calls(), vec![Call::List]);
}

#[tokio::test]
async fn commit_replaces_changed_files_and_cleans_up() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "draft");
    let shadow_id = shadow.create(&folder, None).await.unwrap();

    // an agent edits the staged copy
    let staged = gw.child(&shadow_id, "report.txt", ItemKind::File).unwrap();
    gw.update_file(&staged.id, bytes::Bytes::from_static(b"final"))
        .await
        .unwrap();

    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed(CommitReport {
            replaced: vec!["report.txt".into()],
            added: vec![],
            skipped: vec![],
        })
    );
    assert_eq!(gw.file_content(&folder, "report.txt").unwrap(), "final");
    assert_eq!(shadow_folders(&gw, &folder), 0);
    assert_eq!(
        gw.children(&folder)
            .iter()
            .filter(|i| i.name == "report.txt")
            .count(),
        1
    );
    assert_eq!(shadow.state(&folder).await.unwrap(), ShadowState::NoShadow);
}

#[tokio::test]
async fn commit_adds_new_files() {
    let (gw, shadow, folder) = setup();
    let shadow_id = shadow.create(&folder, None).await.unwrap();
    gw.add_file(&shadow_id, "new.txt", "fresh");

    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed(CommitReport {
            replaced: vec![],
            added: vec!["new.txt".into()],
            skipped: vec![],
        })
    );
    assert_eq!(gw.file_content(&folder, "new.txt").unwrap(), "fresh");
    assert_eq!(shadow_folders(&gw, &folder), 0);
}

#[tokio::test]
async fn commit_ignores_nested_folders_in_shadow() {
    let (gw, shadow, folder) = setup();
    let shadow_id = shadow.create(&folder, None).await.unwrap();
    let nested = gw.add_folder(&shadow_id, "drafts");
    gw.add_file(&nested, "x.txt", "x");

    shadow.commit(&folder, true).await.unwrap();
    assert!(gw.children(&folder).is_empty());
}

#[tokio::test]
async fn failure_before_touching_production_is_total() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    shadow.create(&folder, None).await.unwrap();

    gw.fail_next(Call::Read, "report.txt");
    let err = shadow.commit(&folder, true).await.unwrap_err();
    assert!(matches!(err, CommitError::Failed(_)));
    assert_eq!(gw.file_content(&folder, "report.txt").unwrap(), "v1");
    assert_eq!(shadow_folders(&gw, &folder), 1);
}

#[tokio::test]
async fn partial_commit_resumes_from_what_is_left() {
    let (gw, shadow, folder) = setup();
    let shadow_id = shadow.create(&folder, None).await.unwrap();
    gw.add_file(&shadow_id, "a.txt", "a");
    gw.add_file(&shadow_id, "b.txt", "b");
    gw.add_file(&shadow_id, "c.txt", "c");

    gw.fail_next(Call::Copy, "b.txt");
    let err = shadow.commit(&folder, true).await.unwrap_err();
    match err {
        CommitError::Partial {
            merged, pending, ..
        } => {
            assert_eq!(merged, vec!["a.txt"]);
            assert_eq!(pending, vec!["b.txt", "c.txt"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    match shadow.state(&folder).await.unwrap() {
        ShadowState::Staged { files, .. } => {
            let names: Vec<String> = files.into_iter().map(|i| i.name).collect();
            assert_eq!(names, vec!["b.txt", "c.txt"]);
        }
        ShadowState::NoShadow => panic!("shadow should still exist"),
    }

    // the second attempt only sees the remainder, so a.txt is not copied twice
    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed(CommitReport {
            replaced: vec![],
            added: vec!["b.txt".into(), "c.txt".into()],
            skipped: vec![],
        })
    );
    for name in ["a.txt", "b.txt", "c.txt"] {
        assert!(gw.file_content(&folder, name).is_some(), "{name} missing");
    }
    assert_eq!(shadow_folders(&gw, &folder), 0);
}

#[tokio::test]
async fn upload_failure_after_delete_is_recoverable() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    let shadow_id = shadow.create(&folder, None).await.unwrap();
    let staged = gw.child(&shadow_id, "report.txt", ItemKind::File).unwrap();
    gw.update_file(&staged.id, bytes::Bytes::from_static(b"v2"))
        .await
        .unwrap();

    gw.fail_next(Call::Upload, "report.txt");
    let err = shadow.commit(&folder, true).await.unwrap_err();
    match err {
        CommitError::Partial {
            merged, pending, ..
        } => {
            assert!(merged.is_empty());
            assert_eq!(pending, vec!["report.txt"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    // production lost the file between delete and upload
    assert!(gw.file_content(&folder, "report.txt").is_none());

    shadow.commit(&folder, true).await.unwrap();
    assert_eq!(gw.file_content(&folder, "report.txt").unwrap(), "v2");
}

#[tokio::test]
async fn teardown_failure_after_full_merge_is_partial() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    shadow.create(&folder, None).await.unwrap();

    gw.fail_next(Call::Delete, SHADOW);
    let err = shadow.commit(&folder, true).await.unwrap_err();
    match err {
        CommitError::Partial {
            merged, pending, ..
        } => {
            assert_eq!(merged, vec!["report.txt"]);
            assert!(pending.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }

    // the empty shadow is removed by the next commit
    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Committed(CommitReport::default()));
    assert_eq!(shadow_folders(&gw, &folder), 0);
}

#[tokio::test]
async fn bookkeeping_files_are_neither_staged_nor_merged_back() {
    let (gw, shadow, folder) = setup();
    gw.add_file(&folder, "report.txt", "v1");
    gw.add_file(&folder, ".reasoning_ledger.log", "line-1\n");
    gw.add_file(&folder, ".agent_memory.json", "{}");

    let shadow_id = shadow.create(&folder, None).await.unwrap();
    let staged: Vec<String> = gw.children(&shadow_id).into_iter().map(|i| i.name).collect();
    assert_eq!(staged, vec!["report.txt"]);

    // even a ledger copied in by hand is dropped with the shadow
    gw.add_file(&shadow_id, ".reasoning_ledger.log", "stale\n");
    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed(CommitReport {
            replaced: vec!["report.txt".into()],
            added: vec![],
            skipped: vec![".reasoning_ledger.log".into()],
        })
    );
    assert_eq!(
        gw.file_content(&folder, ".reasoning_ledger.log").unwrap(),
        "line-1\n"
    );
    assert_eq!(shadow_folders(&gw, &folder), 0);
}

#[tokio::test]
async fn memory_staged_by_id_is_reported_as_skipped() {
    let (gw, shadow, folder) = setup();
    let memory_id = gw.add_file(&folder, ".agent_memory.json", r#"{"v":1}"#);

    let shadow_id = shadow
        .create(&folder, Some(&[memory_id]))
        .await
        .unwrap();
    let staged = gw
        .child(&shadow_id, ".agent_memory.json", ItemKind::File)
        .unwrap();
    gw.update_file(&staged.id, bytes::Bytes::from_static(br#"{"v":2}"#))
        .await
        .unwrap();

    let outcome = shadow.commit(&folder, true).await.unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed(CommitReport {
            replaced: vec![],
            added: vec![],
            skipped: vec![".agent_memory.json".into()],
        })
    );
    assert_eq!(
        gw.file_content(&folder, ".agent_memory.json").unwrap(),
        r#"{"v":1}"#
    );
    assert_eq!(shadow_folders(&gw, &folder), 0);
}
