//! Scheduler behavior against an instrumented in-memory multipart service:
//! concurrency bound, retry budget, finalize ordering, cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use sealdrop_core::{
    CompletedPart, ContentMeta, ObjectHandle, SealdropError, SealdropResult, TransferHandle,
    TransferPlan,
};
use sealdrop_crypto::generate_key;
use sealdrop_transfer::{MultipartTransferClient, UploadOptions, UploadSession};

/// Scripted fake of the remote multipart service. Tracks an in-flight
/// high-water mark and records completion order.
#[derive(Default)]
struct FakeRemote {
    chunk_size: usize,
    upload_delay: Duration,
    /// part_number -> transient failures still to inject
    failures: Mutex<HashMap<u32, u32>>,
    /// extra upload delay per part, for forcing completion orders
    part_delays: Mutex<HashMap<u32, Duration>>,
    parts: Mutex<HashMap<u32, (String, Bytes)>>,
    completion_order: Mutex<Vec<u32>>,
    finalized: Mutex<Option<Vec<CompletedPart>>>,
    aborted: AtomicBool,
    upload_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct FakeClient {
    remote: Arc<FakeRemote>,
}

impl FakeClient {
    fn new(chunk_size: usize) -> Self {
        Self {
            remote: Arc::new(FakeRemote {
                chunk_size,
                ..FakeRemote::default()
            }),
        }
    }

    fn with_remote(remote: FakeRemote) -> Self {
        Self {
            remote: Arc::new(remote),
        }
    }
}

impl MultipartTransferClient for FakeClient {
    async fn begin(&self, total_size: u64, _meta: &ContentMeta) -> SealdropResult<TransferHandle> {
        Ok(TransferHandle {
            session_id: "sess-1".into(),
            plan: TransferPlan::new(total_size, self.remote.chunk_size),
        })
    }

    async fn upload_part(
        &self,
        _session_id: &str,
        part_number: u32,
        frame: Bytes,
    ) -> SealdropResult<String> {
        let remote = &self.remote;
        remote.upload_calls.fetch_add(1, Ordering::SeqCst);

        let now = remote.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        remote.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let extra = remote
            .part_delays
            .lock()
            .unwrap()
            .get(&part_number)
            .copied()
            .unwrap_or_default();
        tokio::time::sleep(remote.upload_delay + extra).await;
        remote.in_flight.fetch_sub(1, Ordering::SeqCst);

        let inject = {
            let mut failures = remote.failures.lock().unwrap();
            match failures.get_mut(&part_number) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if inject {
            return Err(SealdropError::Transport(format!(
                "injected 503 for part {part_number}"
            )));
        }

        let etag = format!("etag-{part_number}");
        remote
            .parts
            .lock()
            .unwrap()
            .insert(part_number, (etag.clone(), frame));
        remote.completion_order.lock().unwrap().push(part_number);
        Ok(etag)
    }

    async fn finalize(
        &self,
        _session_id: &str,
        parts: &[CompletedPart],
    ) -> SealdropResult<ObjectHandle> {
        *self.remote.finalized.lock().unwrap() = Some(parts.to_vec());
        Ok(ObjectHandle("obj-1".into()))
    }

    async fn abort(&self, _session_id: &str) -> SealdropResult<()> {
        self.remote.aborted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_options(concurrent: usize) -> UploadOptions {
    UploadOptions {
        concurrent_parts: concurrent,
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(5),
    }
}

fn input(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 241) as u8).collect()
}

#[tokio::test]
async fn test_in_flight_never_exceeds_bound() {
    let client = FakeClient::with_remote(FakeRemote {
        chunk_size: 100,
        upload_delay: Duration::from_millis(15),
        ..FakeRemote::default()
    });
    let data = input(1000); // 10 parts

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        fast_options(3),
    )
    .await
    .unwrap();
    session.run(&data[..]).await.unwrap();

    assert_eq!(client.remote.parts.lock().unwrap().len(), 10);
    assert!(
        client.remote.max_in_flight.load(Ordering::SeqCst) <= 3,
        "in-flight uploads exceeded the bound: {}",
        client.remote.max_in_flight.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_transient_failures_within_budget_recover() {
    let client = FakeClient::with_remote(FakeRemote {
        chunk_size: 100,
        failures: Mutex::new(HashMap::from([(2, 2)])),
        ..FakeRemote::default()
    });
    let data = input(450); // 5 parts

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        fast_options(3),
    )
    .await
    .unwrap();
    let outcome = session.run(&data[..]).await.unwrap();

    // Two failures then success: exactly one recorded completion for part 2.
    assert_eq!(outcome.parts.len(), 5);
    assert_eq!(
        outcome.parts.iter().filter(|p| p.part_number == 2).count(),
        1
    );
    // 5 parts + 2 retries of part 2
    assert_eq!(client.remote.upload_calls.load(Ordering::SeqCst), 7);
    assert!(!client.remote.aborted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_retry_exhaustion_fails_session_and_aborts() {
    // Pool of 1 keeps admission strictly sequential, so nothing after the
    // poisoned part may be dispatched.
    let client = FakeClient::with_remote(FakeRemote {
        chunk_size: 100,
        failures: Mutex::new(HashMap::from([(1, 3)])),
        ..FakeRemote::default()
    });
    let data = input(1000); // would be 10 parts

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        fast_options(1),
    )
    .await
    .unwrap();
    let err = session.run(&data[..]).await.unwrap_err();

    assert!(matches!(err, SealdropError::Transport(_)));
    assert_eq!(
        client.remote.upload_calls.load(Ordering::SeqCst),
        3,
        "exactly the attempt budget, no further parts dispatched"
    );
    assert!(client.remote.parts.lock().unwrap().is_empty());
    assert!(client.remote.finalized.lock().unwrap().is_none());
    assert!(client.remote.aborted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_finalize_receives_sorted_dense_sequence() {
    // Part 1 takes one transient failure, so parts 2 and 3 complete first.
    let client = FakeClient::with_remote(FakeRemote {
        chunk_size: 100,
        failures: Mutex::new(HashMap::from([(1, 1)])),
        ..FakeRemote::default()
    });
    let data = input(300); // 3 parts

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        UploadOptions {
            concurrent_parts: 3,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(30),
        },
    )
    .await
    .unwrap();
    session.run(&data[..]).await.unwrap();

    let order = client.remote.completion_order.lock().unwrap().clone();
    assert_eq!(order.len(), 3);
    assert_ne!(order[0], 1, "part 1 should have completed late");

    let finalized = client.remote.finalized.lock().unwrap().clone().unwrap();
    let numbers: Vec<u32> = finalized.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(finalized[0].etag, "etag-1");
    assert_eq!(finalized[2].etag, "etag-3");
}

#[tokio::test]
async fn test_cancellation_aborts_without_new_admissions() {
    let client = FakeClient::with_remote(FakeRemote {
        chunk_size: 100,
        upload_delay: Duration::from_millis(10),
        ..FakeRemote::default()
    });
    let data = input(1000);

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        fast_options(2),
    )
    .await
    .unwrap();
    session.cancellation_token().cancel();
    let err = session.run(&data[..]).await.unwrap_err();

    assert!(matches!(err, SealdropError::Cancelled));
    assert_eq!(client.remote.upload_calls.load(Ordering::SeqCst), 0);
    assert!(client.remote.aborted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_progress_reaches_totals() {
    let client = FakeClient::new(100);
    let data = input(250);

    let session = UploadSession::begin(
        &client,
        generate_key(),
        data.len() as u64,
        &ContentMeta::default(),
        fast_options(3),
    )
    .await
    .unwrap();
    let progress = session.progress();
    session.run(&data[..]).await.unwrap();

    let snap = *progress.borrow();
    assert_eq!(snap.completed_parts, 3);
    assert_eq!(snap.completed_bytes, 250);
}

#[tokio::test]
async fn test_empty_input_finalizes_zero_parts() {
    let client = FakeClient::new(100);

    let session = UploadSession::begin(
        &client,
        generate_key(),
        0,
        &ContentMeta::default(),
        fast_options(3),
    )
    .await
    .unwrap();
    let outcome = session.run(&b""[..]).await.unwrap();

    assert_eq!(outcome.plan.total_parts, 0);
    assert!(outcome.parts.is_empty());
    let finalized = client.remote.finalized.lock().unwrap().clone().unwrap();
    assert!(finalized.is_empty());
}

#[tokio::test]
async fn test_resume_is_refused() {
    let client = FakeClient::new(100);
    let err = UploadSession::resume(&client, "sess-9").unwrap_err();
    assert!(matches!(err, SealdropError::Protocol(_)));
}
