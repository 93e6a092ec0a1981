use filequeue::PriorityQueue;
use tempfile::tempdir;

#[test]
fn always_drains_the_highest_occupied_level() {
    let dir = tempdir().unwrap();
    let pq = PriorityQueue::open(dir.path()).unwrap();

    pq.push(1, b"background").unwrap();
    pq.push(255, b"urgent").unwrap();
    pq.push(128, b"normal").unwrap();
    pq.push(255, b"also-urgent").unwrap();

    assert_eq!(pq.size().unwrap(), 4);
    assert_eq!(pq.pop().unwrap(), b"urgent");
    assert_eq!(pq.pop().unwrap(), b"also-urgent");
    assert_eq!(pq.pop().unwrap(), b"normal");
    assert_eq!(pq.pop().unwrap(), b"background");
    assert!(pq.is_empty().unwrap());
}

#[test]
fn new_higher_priority_item_jumps_the_queue() {
    let dir = tempdir().unwrap();
    let pq = PriorityQueue::open(dir.path()).unwrap();

    pq.push(10, b"first-in").unwrap();
    assert_eq!(pq.pop().unwrap(), b"first-in");

    pq.push(10, b"low").unwrap();
    pq.push(200, b"high").unwrap();
    assert_eq!(pq.pop().unwrap(), b"high");
    assert_eq!(pq.pop().unwrap(), b"low");
}
