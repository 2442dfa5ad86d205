use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use metasync_core::RateLimitedQueue;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn no_window_admits_more_than_the_limit() {
    let limit = 20;
    let window = Duration::from_secs(1);
    let queue = RateLimitedQueue::new(limit, window);
    let starts = Arc::new(Mutex::new(Vec::new()));

    let tasks = (0..25).map(|index| {
        let queue = queue.clone();
        let starts = Arc::clone(&starts);
        async move {
            queue
                .enqueue(|| async move {
                    starts.lock().expect("starts").push((index, Instant::now()));
                    index
                })
                .await
        }
    });
    let results = join_all(tasks).await;

    assert_eq!(results, (0..25).collect::<Vec<_>>());
    let starts = starts.lock().expect("starts").clone();
    let order: Vec<usize> = starts.iter().map(|(index, _)| *index).collect();
    assert_eq!(order, (0..25).collect::<Vec<_>>(), "tasks start in FIFO order");

    let limit = limit as usize;
    for first in 0..starts.len() - limit {
        let span = starts[first + limit].1 - starts[first].1;
        assert!(
            span >= window,
            "tasks {first}..={} started within {span:?}",
            first + limit
        );
    }
}

#[tokio::test(start_paused = true)]
async fn uneven_limit_still_spends_a_full_window() {
    let limit = 7;
    let window = Duration::from_millis(100);
    let queue = RateLimitedQueue::new(limit, window);

    let origin = Instant::now();
    let mut starts = Vec::new();
    for _ in 0..=limit {
        starts.push(queue.enqueue(|| async { Instant::now() }).await);
    }

    assert_eq!(starts[0], origin);
    let span = starts[limit as usize] - starts[0];
    assert!(span >= window, "{} starts within {span:?}", limit + 1);
}

#[tokio::test]
async fn task_errors_pass_through_and_do_not_stall_the_queue() {
    let queue = RateLimitedQueue::new(100, Duration::from_secs(1));

    let failed: Result<u8, String> = queue
        .enqueue(|| async { Err(String::from("upstream refused")) })
        .await;
    let succeeded: Result<u8, String> = queue.enqueue(|| async { Ok(7) }).await;

    assert_eq!(failed, Err(String::from("upstream refused")));
    assert_eq!(succeeded, Ok(7));
}

#[tokio::test]
async fn tasks_run_one_at_a_time() {
    let queue = RateLimitedQueue::new(1_000, Duration::from_secs(1));
    let running = Arc::new(Mutex::new(0_usize));
    let peak = Arc::new(Mutex::new(0_usize));

    let tasks = (0..5).map(|_| {
        let queue = queue.clone();
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        async move {
            queue
                .enqueue(|| async move {
                    {
                        let mut running = running.lock().expect("running");
                        *running += 1;
                        let mut peak = peak.lock().expect("peak");
                        *peak = (*peak).max(*running);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    *running.lock().expect("running") -= 1;
                })
                .await
        }
    });
    join_all(tasks).await;

    assert_eq!(*peak.lock().expect("peak"), 1);
}
