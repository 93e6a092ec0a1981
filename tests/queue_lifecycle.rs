use filequeue::storage::StorageEngine;
use filequeue::{Queue, QueueError, QueueOptions};
use tempfile::tempdir;

fn fixture() -> Vec<Vec<u8>> {
    vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"bbb".to_vec(),
        vec![b'x'; 1000],
        b"hello".to_vec(),
        b"world".to_vec(),
    ]
}

#[test]
fn round_trip_preserves_order_and_content() {
    let dir = tempdir().unwrap();
    let q = Queue::open(dir.path()).unwrap();
    for item in fixture() {
        q.push(&item).unwrap();
    }
    assert_eq!(q.size().unwrap(), 6);
    for item in fixture() {
        assert_eq!(q.pop().unwrap(), item);
    }
    assert!(q.is_empty().unwrap());
}

#[test]
fn small_max_file_size_forces_many_rotations() {
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 100,
        max_files: 256,
    };
    let q = Queue::open_with_options(dir.path(), options).unwrap();
    for item in fixture() {
        q.push(&item).unwrap();
    }
    assert_eq!(q.size().unwrap(), 6);
    for item in fixture() {
        assert_eq!(q.pop().unwrap(), item);
    }
    assert!(q.is_empty().unwrap());

    let dat_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().map(|e| e == "dat").unwrap_or(false))
        .count();
    // the last segment is never auto-deleted, even once fully drained
    assert_eq!(dat_files, 1);
}

#[test]
fn interleaved_push_and_pop_stays_fifo() {
    let dir = tempdir().unwrap();
    let q = Queue::open(dir.path()).unwrap();
    q.push(b"1").unwrap();
    q.push(b"2").unwrap();
    assert_eq!(q.pop().unwrap(), b"1");
    q.push(b"3").unwrap();
    assert_eq!(q.pop().unwrap(), b"2");
    assert_eq!(q.pop().unwrap(), b"3");
    assert!(q.is_empty().unwrap());
}

#[test]
fn cold_start_recovers_unread_items() {
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 64,
        max_files: 256,
    };
    {
        let q = Queue::open_with_options(dir.path(), options).unwrap();
        for item in fixture() {
            q.push(&item).unwrap();
        }
        q.pop().unwrap(); // leaves 5 unread, across however many segments
        q.pop().unwrap(); // leaves 4 unread
    }
    // A brand new engine instance, as if the process had restarted, must
    // recover the exact remaining contents in order.
    let q = Queue::open_with_options(dir.path(), options).unwrap();
    assert_eq!(q.size().unwrap(), 4);
    for item in fixture().into_iter().skip(2) {
        assert_eq!(q.pop().unwrap(), item);
    }
    assert!(q.is_empty().unwrap());
}

#[test]
fn size_after_reopen_following_tail_retirement_matches_remaining_items() {
    // Regression test: with max_file_size = 64, the fixture rotates into at
    // least two segments, and popping enough items to drain and retire the
    // oldest one must not leave a stale baseline behind that inflates
    // size() on the next cold start.
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 64,
        max_files: 256,
    };
    {
        let q = Queue::open_with_options(dir.path(), options).unwrap();
        for item in fixture() {
            q.push(&item).unwrap();
        }
        for _ in 0..4 {
            q.pop().unwrap();
        }
    }
    let q = Queue::open_with_options(dir.path(), options).unwrap();
    assert_eq!(q.size().unwrap(), 2);
    assert_eq!(q.pop().unwrap(), b"hello");
    assert_eq!(q.pop().unwrap(), b"world");
    assert!(matches!(q.pop(), Err(QueueError::Underflow)));
    assert!(q.is_empty().unwrap());
}

#[test]
fn second_handle_to_same_path_shares_state_in_process() {
    let dir = tempdir().unwrap();
    let a = Queue::open(dir.path()).unwrap();
    let b = Queue::open(dir.path()).unwrap();
    a.push(b"shared").unwrap();
    assert_eq!(b.pop().unwrap(), b"shared");
}

#[test]
fn clear_empties_even_the_last_segment() {
    let dir = tempdir().unwrap();
    let q = Queue::open(dir.path()).unwrap();
    q.push(b"only").unwrap();
    q.clear().unwrap();
    assert!(q.is_empty().unwrap());
    assert!(matches!(q.pop(), Err(QueueError::Underflow)));
}

#[test]
fn repeated_single_item_cycle_leaves_one_segment() {
    let dir = tempdir().unwrap();
    let q = Queue::open(dir.path()).unwrap();
    for _ in 0..100 {
        q.push(b"x").unwrap();
        assert_eq!(q.pop().unwrap(), b"x");
    }
    assert!(q.is_empty().unwrap());
    let dat_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().map(|e| e == "dat").unwrap_or(false))
        .count();
    assert_eq!(dat_files, 1);
}

#[test]
fn crash_between_write_size_and_write_content_drops_the_orphan() {
    use filequeue::record::{write_record, Record, Tag};
    use std::io::Write as _;

    let dir = tempdir().unwrap();
    {
        let q = Queue::open(dir.path()).unwrap();
        for item in [b"first".to_vec(), b"second".to_vec()] {
            q.push(&item).unwrap();
        }
    }
    // Simulate a crash between writeSize and writeContent: append a bare
    // payload_size header with no body to the current head segment.
    let head = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.path().extension().map(|ext| ext == "dat").unwrap_or(false))
        .expect("a segment exists")
        .path();
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&head).unwrap();
        write_record(&mut file, &Record::new(Tag::PayloadSize, 10)).unwrap();
        file.flush().unwrap();
    }

    // Reopening must recover only the completed prefix; the orphaned header
    // with no body is treated as end-of-stream, not a malformed record.
    let q = Queue::open(dir.path()).unwrap();
    assert_eq!(q.size().unwrap(), 2);
    assert_eq!(q.pop().unwrap(), b"first");
    assert_eq!(q.pop().unwrap(), b"second");
    assert!(q.is_empty().unwrap());
}

#[test]
fn independent_engines_on_one_directory_see_each_others_rotations() {
    // Two StorageEngine instances opened directly (bypassing the per-path
    // registry) stand in for two separate processes sharing one directory.
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 32,
        max_files: 64,
    };
    let writer = StorageEngine::open(dir.path(), options).unwrap();
    let reader = StorageEngine::open(dir.path(), options).unwrap();

    writer.write_size(20).unwrap();
    writer.write_content(&vec![b'a'; 20]).unwrap();
    // Forces a second segment: writer's own fingerprint write must reach
    // the sentinel so `reader`'s next refresh notices the new segment set.
    writer.write_size(20).unwrap();
    writer.write_content(&vec![b'b'; 20]).unwrap();

    assert_eq!(reader.size().unwrap(), 2);
    assert_eq!(reader.read_size().unwrap(), 20);
    assert_eq!(reader.read_content().unwrap(), vec![b'a'; 20]);
    assert_eq!(reader.read_size().unwrap(), 20);
    assert_eq!(reader.read_content().unwrap(), vec![b'b'; 20]);
}

#[test]
fn independent_engines_see_a_push_that_never_rotates() {
    // Unlike the rotation test above, max_file_size is large enough that a
    // single push never triggers a rotation, so the segment set's topology
    // (count, oldest number) never changes. The fingerprint still has to
    // change, via the head segment's on-disk size, or `reader` never notices.
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 1 << 20,
        max_files: 64,
    };
    let writer = StorageEngine::open(dir.path(), options).unwrap();
    let reader = StorageEngine::open(dir.path(), options).unwrap();

    writer.write_size(4).unwrap();
    writer.write_content(b"1234").unwrap();

    assert_eq!(reader.size().unwrap(), 1);
    assert_eq!(reader.read_size().unwrap(), 4);
    assert_eq!(reader.read_content().unwrap(), b"1234");
}

#[test]
fn opening_a_missing_directory_is_a_domain_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("never-created");
    assert!(matches!(
        Queue::open(&missing),
        Err(QueueError::Domain { .. })
    ));
}

#[test]
fn overflow_when_segment_pool_is_full() {
    let dir = tempdir().unwrap();
    let options = QueueOptions {
        max_file_size: 1,
        max_files: 2,
    };
    let q = Queue::open_with_options(dir.path(), options).unwrap();
    q.push(b"a").unwrap();
    q.push(b"b").unwrap();
    assert!(matches!(
        q.push(b"c"),
        Err(QueueError::Overflow { max_files: 2 })
    ));
}
