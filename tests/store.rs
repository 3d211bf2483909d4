use std::{fs, thread, time::Duration};

use tempfile::TempDir;
use tubesnip::progress::{ProgressLevel, ProgressSink};
use tubesnip::store::{Sqlite, StoreSink, TaskRecord, TaskState, TaskStore};

fn open_store(dir: &TempDir) -> Sqlite {
    Sqlite::open(&dir.path().join("tasks.sqlite")).unwrap()
}

fn sample_task(id: &str) -> TaskRecord {
    TaskRecord::new(id, "https://youtu.be/abc", "0:10", "0:30")
}

#[test]
fn put_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.put_task(&sample_task("t1")).unwrap();

    let task = store.get_task("t1").unwrap().unwrap();
    assert_eq!(task.task_id, "t1");
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.url, "https://youtu.be/abc");
    assert!(task.created_at > 0);

    assert!(store.get_task("nope").unwrap().is_none());
}

#[test]
fn replacing_a_task_keeps_its_creation_time() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.put_task(&sample_task("t1")).unwrap();
    let created_at = store.get_task("t1").unwrap().unwrap().created_at;

    let mut updated = sample_task("t1");
    updated.state = TaskState::Processing;
    updated.progress = Some("Video fetch started".to_owned());
    store.put_task(&updated).unwrap();

    let task = store.get_task("t1").unwrap().unwrap();
    assert_eq!(task.state, TaskState::Processing);
    assert_eq!(task.progress.as_deref(), Some("Video fetch started"));
    assert_eq!(task.created_at, created_at);
}

#[test]
fn listing_filters_by_state() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut done = sample_task("done");
    done.state = TaskState::Completed;
    store.put_task(&sample_task("p1")).unwrap();
    store.put_task(&sample_task("p2")).unwrap();
    store.put_task(&done).unwrap();

    assert_eq!(store.list_tasks(None).unwrap().len(), 3);
    assert_eq!(
        store.list_tasks(Some(TaskState::Pending)).unwrap().len(),
        2
    );
    let completed = store.list_tasks(Some(TaskState::Completed)).unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].task_id, "done");
}

#[test]
fn deleting_a_task_cascades_to_files_and_logs() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let artifact = dir.path().join("segment.mp4");
    fs::write(&artifact, b"data").unwrap();

    store.put_task(&sample_task("t1")).unwrap();
    store.record_file("t1", "video", &artifact).unwrap();
    store.append_log("t1", "info", "Video fetch started").unwrap();

    store.delete_task("t1").unwrap();

    assert!(store.get_task("t1").unwrap().is_none());
    assert!(store.files("t1").unwrap().is_empty());
    assert!(store.logs("t1", 10).unwrap().is_empty());
}

#[test]
fn recording_the_same_kind_twice_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let first = dir.path().join("a.mp4");
    let second = dir.path().join("b.mp4");
    fs::write(&first, b"x").unwrap();
    fs::write(&second, b"xy").unwrap();

    store.put_task(&sample_task("t1")).unwrap();
    store.record_file("t1", "video", &first).unwrap();
    store.record_file("t1", "video", &second).unwrap();

    let files = store.files("t1").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "b.mp4");
    assert_eq!(files[0].file_size, Some(2));
}

#[test]
fn logs_come_back_newest_first_and_bounded() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.put_task(&sample_task("t1")).unwrap();
    for i in 0..5 {
        store
            .append_log("t1", "info", &format!("milestone {i}"))
            .unwrap();
    }

    let logs = store.logs("t1", 3).unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].message, "milestone 4");
    assert_eq!(logs[2].message, "milestone 2");
}

#[test]
fn stats_count_per_state() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut failed = sample_task("f1");
    failed.state = TaskState::Failed;
    store.put_task(&sample_task("p1")).unwrap();
    store.put_task(&failed).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
}

#[test]
fn stale_cleanup_only_touches_old_terminal_tasks() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut done = sample_task("done");
    done.state = TaskState::Completed;
    store.put_task(&done).unwrap();
    store.put_task(&sample_task("active")).unwrap();

    // everything is too recent to qualify
    assert_eq!(
        store.delete_finished_before(Duration::from_secs(3600)).unwrap(),
        0
    );

    thread::sleep(Duration::from_millis(2100));
    let removed = store.delete_finished_before(Duration::from_secs(1)).unwrap();
    assert_eq!(removed, 1);
    assert!(store.get_task("done").unwrap().is_none());
    // non-terminal tasks survive no matter their age
    assert!(store.get_task("active").unwrap().is_some());
}

#[test]
fn store_sink_persists_milestones_as_log_rows() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.put_task(&sample_task("t1")).unwrap();

    let sink = StoreSink::new(&store, "t1");
    sink.report(ProgressLevel::Info, "Video fetch started");
    sink.report(ProgressLevel::Error, "Audio fetch failed");

    let logs = store.logs("t1", 10).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].level, "error");
    assert_eq!(logs[1].message, "Video fetch started");
}
