use std::time::Duration;

use todosync::{
    cache::{
        key::{CachedValue, QueryKey, TaskFilter},
        store::{EntryState, QueryCache},
    },
    mutate::{self, MutationKind},
    remote::{RemoteError, RemoteErrorKind, RemoteOp},
    task::{TaskDraft, TaskPatch, TaskRecord},
    types::{is_placeholder_id, TaskId, PLACEHOLDER_ID_BASE},
};

fn task(id: TaskId, title: &str, completed: bool) -> TaskRecord {
    TaskRecord {
        id,
        owner_id: 1,
        title: title.to_string(),
        completed,
    }
}

fn cache_with_all(tasks: Vec<TaskRecord>) -> QueryCache {
    let mut cache = QueryCache::new(Duration::from_secs(30));
    cache.write(QueryKey::list_all(), CachedValue::Many(tasks));
    cache
}

fn read_all(cache: &QueryCache) -> Vec<TaskRecord> {
    match cache.read(&QueryKey::list_all()) {
        Some(CachedValue::Many(list)) => list.clone(),
        other => panic!("expected a populated list-all entry, got {other:?}"),
    }
}

fn remote_failure(op: RemoteOp, id: Option<TaskId>) -> RemoteError {
    RemoteError::new(op, id, RemoteErrorKind::Status(500))
}

#[test]
fn optimistic_create_prepends_then_commits_server_record() {
    let t1 = task(1, "first", false);
    let mut cache = cache_with_all(vec![t1.clone()]);

    let draft = TaskDraft {
        owner_id: 1,
        title: "new".to_string(),
        completed: false,
    };
    let ctx = mutate::apply_create(&mut cache, draft, 1 << 62);

    let speculative = read_all(&cache);
    assert_eq!(speculative.len(), 2);
    assert!(is_placeholder_id(speculative[0].id));
    assert_eq!(speculative[0].title, "new");
    assert_eq!(speculative[1], t1);

    let server = task(2, "new", false);
    mutate::commit_create(&mut cache, ctx, &server);

    let committed = read_all(&cache);
    assert_eq!(committed, vec![server, t1]);
    assert!(committed.iter().all(|t| !is_placeholder_id(t.id)));
}

#[test]
fn failed_create_restores_lists_verbatim() {
    let t1 = task(1, "first", false);
    let mut cache = cache_with_all(vec![t1.clone()]);
    cache.write(
        QueryKey::list(TaskFilter::by_completed(false)),
        CachedValue::Many(vec![t1.clone()]),
    );

    let draft = TaskDraft {
        owner_id: 1,
        title: "doomed".to_string(),
        completed: false,
    };
    let ctx = mutate::apply_create(&mut cache, draft, 1 << 62);
    assert_eq!(read_all(&cache).len(), 2);

    let err = ctx.failure(remote_failure(RemoteOp::Create, None));
    assert_eq!(err.kind, MutationKind::Create);
    ctx.restore(&mut cache);

    assert_eq!(read_all(&cache), vec![t1.clone()]);
    let active = cache
        .read(&QueryKey::list(TaskFilter::by_completed(false)))
        .and_then(|v| v.as_many().map(|s| s.to_vec()));
    assert_eq!(active, Some(vec![t1]));
}

#[test]
fn create_skips_lists_whose_filter_rejects_the_record() {
    let done = task(9, "done", true);
    let mut cache = cache_with_all(vec![]);
    cache.write(
        QueryKey::list(TaskFilter::by_completed(true)),
        CachedValue::Many(vec![done.clone()]),
    );

    let draft = TaskDraft {
        owner_id: 1,
        title: "active".to_string(),
        completed: false,
    };
    let _ctx = mutate::apply_create(&mut cache, draft, 1 << 62);

    // The completed=true list must not receive an active record.
    let completed_list = cache
        .read(&QueryKey::list(TaskFilter::by_completed(true)))
        .and_then(|v| v.as_many().map(|s| s.to_vec()));
    assert_eq!(completed_list, Some(vec![done]));
    assert_eq!(read_all(&cache).len(), 1);
}

#[test]
fn update_patches_everywhere_then_rolls_back_exactly() {
    let t1 = task(1, "first", false);
    let t2 = task(2, "second", false);
    let mut cache = cache_with_all(vec![t1.clone(), t2.clone()]);
    cache.write(QueryKey::detail(1), CachedValue::One(t1.clone()));

    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        ..TaskPatch::default()
    };
    let ctx = mutate::apply_update(&mut cache, 1, &patch);

    assert_eq!(read_all(&cache)[0].title, "renamed");
    assert_eq!(
        cache.read(&QueryKey::detail(1)).and_then(|v| v.as_one()).map(|r| r.title.as_str()),
        Some("renamed")
    );

    ctx.restore(&mut cache);

    assert_eq!(read_all(&cache), vec![t1.clone(), t2]);
    assert_eq!(cache.read(&QueryKey::detail(1)).and_then(|v| v.as_one()), Some(&t1));
}

#[test]
fn completed_flip_migrates_between_filtered_lists() {
    let t1 = task(1, "migrate me", false);
    let t2 = task(2, "stay", false);
    let done = task(3, "done", true);
    let mut cache = cache_with_all(vec![t1.clone(), t2.clone(), done.clone()]);
    cache.write(
        QueryKey::list(TaskFilter::by_completed(false)),
        CachedValue::Many(vec![t1.clone(), t2.clone()]),
    );
    cache.write(
        QueryKey::list(TaskFilter::by_completed(true)),
        CachedValue::Many(vec![done.clone()]),
    );

    let patch = TaskPatch {
        completed: Some(true),
        ..TaskPatch::default()
    };
    let ctx = mutate::apply_update(&mut cache, 1, &patch);
    let server = task(1, "migrate me", true);
    mutate::commit_update(&mut cache, ctx, &server);

    let active = cache
        .read(&QueryKey::list(TaskFilter::by_completed(false)))
        .and_then(|v| v.as_many().map(|s| s.to_vec()))
        .expect("active list");
    let completed = cache
        .read(&QueryKey::list(TaskFilter::by_completed(true)))
        .and_then(|v| v.as_many().map(|s| s.to_vec()))
        .expect("completed list");

    assert_eq!(active, vec![t2.clone()]);
    assert_eq!(completed, vec![server.clone(), done]);
    // The unfiltered list keeps the record in place, reconciled.
    assert_eq!(read_all(&cache)[0], server.clone());
    // The detail entry holds the authoritative record.
    assert_eq!(cache.read(&QueryKey::detail(1)).and_then(|v| v.as_one()), Some(&server));
}

#[test]
fn unchanged_completed_reconciles_in_place() {
    let t1 = task(1, "first", false);
    let t2 = task(2, "second", false);
    let mut cache = cache_with_all(vec![t1, t2.clone()]);

    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        ..TaskPatch::default()
    };
    let ctx = mutate::apply_update(&mut cache, 1, &patch);
    let server = task(1, "renamed", false);
    mutate::commit_update(&mut cache, ctx, &server);

    assert_eq!(read_all(&cache), vec![server, t2]);
}

#[test]
fn failed_delete_restores_lists_and_names_the_target() {
    let t1 = task(1, "first", false);
    let t2 = task(2, "second", true);
    let mut cache = cache_with_all(vec![t1.clone(), t2.clone()]);
    cache.write(QueryKey::detail(1), CachedValue::One(t1.clone()));

    let ctx = mutate::apply_delete(&mut cache, 1);
    assert_eq!(read_all(&cache), vec![t2.clone()]);
    assert_eq!(cache.state(&QueryKey::detail(1)), EntryState::Absent);

    let err = ctx.failure(remote_failure(RemoteOp::Delete, Some(1)));
    assert_eq!(err.kind, MutationKind::Delete);
    assert_eq!(err.id, Some(1));
    ctx.restore(&mut cache);

    assert_eq!(read_all(&cache), vec![t1, t2]);
    // The detail entry was removed outright; it refetches on next read.
    assert_eq!(cache.state(&QueryKey::detail(1)), EntryState::Absent);
}

#[test]
fn successful_delete_needs_no_reconciliation() {
    let t1 = task(1, "first", false);
    let t2 = task(2, "second", false);
    let mut cache = cache_with_all(vec![t1, t2.clone()]);

    let ctx = mutate::apply_delete(&mut cache, 1);
    drop(ctx);

    assert_eq!(read_all(&cache), vec![t2]);
}

#[test]
fn commit_create_without_a_placeholder_touches_nothing() {
    // Another create is still unresolved: its speculative record sits at
    // the base of the placeholder namespace.
    let speculative = task(PLACEHOLDER_ID_BASE, "in flight", false);
    let t1 = task(1, "first", false);
    let mut cache = cache_with_all(vec![speculative.clone(), t1.clone()]);

    // A context that never carried a placeholder must not substitute the
    // server record for someone else's speculative entry.
    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        ..TaskPatch::default()
    };
    let ctx = mutate::apply_update(&mut cache, 1, &patch);
    let server = task(2, "imposter", false);
    mutate::commit_create(&mut cache, ctx, &server);

    let all = read_all(&cache);
    assert_eq!(all[0], speculative);
    assert!(all.iter().all(|t| t.id != server.id));
}

#[test]
fn update_of_uncached_id_touches_nothing() {
    let t1 = task(1, "first", false);
    let mut cache = cache_with_all(vec![t1.clone()]);

    let patch = TaskPatch {
        title: Some("ghost".to_string()),
        ..TaskPatch::default()
    };
    let ctx = mutate::apply_update(&mut cache, 42, &patch);
    assert_eq!(read_all(&cache), vec![t1.clone()]);

    ctx.restore(&mut cache);
    assert_eq!(read_all(&cache), vec![t1]);
}
