use pulse_core::buffer::{ingestion_buffer, CloseReason};
use pulse_core::record::RawRecord;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn rec(i: usize) -> RawRecord {
    RawRecord::new(i.to_string(), format!("tweet number {i}"))
}

#[tokio::test(start_paused = true)]
async fn closes_on_size_when_records_arrive_fast() {
    let (handle, mut rx) = ingestion_buffer(100, Duration::from_millis(500), 4);
    for i in 0..250 {
        handle.accept(rec(i)).await.unwrap();
    }
    let start = Instant::now();
    for _ in 0..2 {
        let batch = rx.next_batch().await.unwrap();
        assert_eq!(batch.len(), 100);
        assert_eq!(batch.reason, CloseReason::Size);
    }
    assert_eq!(start.elapsed(), Duration::ZERO);

    let tail = rx.next_batch().await.unwrap();
    assert_eq!(tail.len(), 50);
    assert_eq!(tail.reason, CloseReason::Age);
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn closes_on_age_measured_from_first_record() {
    let (handle, mut rx) = ingestion_buffer(10, Duration::from_millis(350), 4);
    let producer = tokio::spawn(async move {
        for i in 0..10 {
            handle.accept(rec(i)).await.unwrap();
            sleep(Duration::from_millis(100)).await;
        }
        handle.shutdown();
    });

    let start = Instant::now();
    let first = rx.next_batch().await.unwrap();
    assert_eq!(first.reason, CloseReason::Age);
    assert_eq!(first.len(), 4);
    assert_eq!(start.elapsed(), Duration::from_millis(350));

    let mut seen: HashSet<String> = first.records.into_iter().map(|r| r.id).collect();
    while let Some(batch) = rx.next_batch().await {
        for r in batch.records {
            assert!(seen.insert(r.id), "record delivered twice");
        }
    }
    assert_eq!(seen.len(), 10);
    producer.await.unwrap();
}

#[tokio::test]
async fn shutdown_flushes_partial_batch_then_refuses() {
    let (handle, mut rx) = ingestion_buffer(10, Duration::from_secs(60), 2);
    for i in 0..5 {
        handle.accept(rec(i)).await.unwrap();
    }
    handle.shutdown();
    assert!(handle.accept(rec(99)).await.is_err());

    let batch = rx.next_batch().await.unwrap();
    assert_eq!(batch.reason, CloseReason::Shutdown);
    let ids: Vec<String> = batch.records.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    assert!(rx.next_batch().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_collecting_ends_the_open_batch() {
    let (handle, mut rx) = ingestion_buffer(10, Duration::from_secs(60), 2);
    let consumer = tokio::spawn(async move {
        let mut batches = Vec::new();
        while let Some(batch) = rx.next_batch().await {
            batches.push(batch);
        }
        batches
    });
    handle.accept(rec(0)).await.unwrap();
    handle.accept(rec(1)).await.unwrap();
    handle.shutdown();

    let batches = consumer.await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0].reason, CloseReason::Shutdown);
}

#[tokio::test]
async fn shutdown_drains_in_size_bounded_batches() {
    let (handle, mut rx) = ingestion_buffer(4, Duration::from_secs(60), 4);
    for i in 0..10 {
        handle.accept(rec(i)).await.unwrap();
    }
    handle.shutdown();
    let mut sizes = Vec::new();
    while let Some(batch) = rx.next_batch().await {
        sizes.push(batch.len());
    }
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[tokio::test]
async fn full_buffer_blocks_accept_until_consumed() {
    let (handle, mut rx) = ingestion_buffer(2, Duration::from_millis(20), 1);
    handle.accept(rec(0)).await.unwrap();
    handle.accept(rec(1)).await.unwrap();

    let blocked = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.accept(rec(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!blocked.is_finished());

    let batch = rx.next_batch().await.unwrap();
    assert_eq!(batch.len(), 2);
    blocked.await.unwrap().unwrap();
    let next = rx.next_batch().await.unwrap();
    assert_eq!(next.records[0].id, "2");
}
