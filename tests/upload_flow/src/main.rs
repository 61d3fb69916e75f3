fn main() {
    println!("Run `cargo test -p upload-flow` to execute end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use cirrus_store::{
        MemoryStore, MultipartSession, ObjectStore, PartLease, RemoteObject, SimpleSession,
        StoreError,
    };
    use cirrus_writer::{ObjectWriter, UploadOptions};

    /// Shared observation state for [`ObservedStore`]: scripted
    /// failures to inject, plus counters and a log of uploaded parts.
    #[derive(Clone, Default)]
    struct Script {
        part_failures: Arc<Mutex<VecDeque<StoreError>>>,
        simple_failures: Arc<Mutex<VecDeque<StoreError>>>,
        leases_issued: Arc<AtomicU32>,
        simple_sessions: Arc<AtomicU32>,
        parts_seen: Arc<Mutex<BTreeMap<u32, Vec<u8>>>>,
    }

    impl Script {
        fn fail_part_uploads(&self, failures: Vec<StoreError>) {
            self.part_failures.lock().unwrap().extend(failures);
        }

        fn fail_simple_uploads(&self, failures: Vec<StoreError>) {
            self.simple_failures.lock().unwrap().extend(failures);
        }

        fn parts(&self) -> BTreeMap<u32, Vec<u8>> {
            self.parts_seen.lock().unwrap().clone()
        }
    }

    /// Store wrapper that injects scripted failures and records every
    /// accepted part, on top of the in-memory backend.
    struct ObservedStore {
        inner: MemoryStore,
        script: Script,
    }

    impl ObservedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                script: Script::default(),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for ObservedStore {
        async fn simple_session(&self) -> Result<Box<dyn SimpleSession>, StoreError> {
            self.script.simple_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ObservedSimple {
                inner: self.inner.simple_session().await?,
                script: self.script.clone(),
            }))
        }

        async fn start_multipart(
            &self,
            name: &str,
            content_type: &str,
            metadata: &HashMap<String, String>,
        ) -> Result<Arc<dyn MultipartSession>, StoreError> {
            Ok(Arc::new(ObservedMultipart {
                inner: self.inner.start_multipart(name, content_type, metadata).await?,
                script: self.script.clone(),
            }))
        }
    }

    struct ObservedSimple {
        inner: Box<dyn SimpleSession>,
        script: Script,
    }

    #[async_trait]
    impl SimpleSession for ObservedSimple {
        async fn upload_whole(
            &self,
            payload: &[u8],
            name: &str,
            content_type: &str,
            digest: &str,
            metadata: &HashMap<String, String>,
        ) -> Result<RemoteObject, StoreError> {
            if let Some(err) = self.script.simple_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.inner
                .upload_whole(payload, name, content_type, digest, metadata)
                .await
        }
    }

    struct ObservedMultipart {
        inner: Arc<dyn MultipartSession>,
        script: Script,
    }

    #[async_trait]
    impl MultipartSession for ObservedMultipart {
        async fn part_lease(&self) -> Result<Box<dyn PartLease>, StoreError> {
            self.script.leases_issued.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ObservedLease {
                inner: self.inner.part_lease().await?,
                script: self.script.clone(),
            }))
        }

        async fn finish(&self) -> Result<RemoteObject, StoreError> {
            self.inner.finish().await
        }
    }

    struct ObservedLease {
        inner: Box<dyn PartLease>,
        script: Script,
    }

    #[async_trait]
    impl PartLease for ObservedLease {
        async fn upload_part(
            &mut self,
            payload: &[u8],
            digest: &str,
            part_index: u32,
        ) -> Result<usize, StoreError> {
            if let Some(err) = self.script.part_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let written = self.inner.upload_part(payload, digest, part_index).await?;
            self.script
                .parts_seen
                .lock()
                .unwrap()
                .insert(part_index, payload.to_vec());
            Ok(written)
        }
    }

    fn options(chunk_size: usize, concurrency: usize) -> UploadOptions {
        UploadOptions {
            chunk_size,
            concurrency,
            ..UploadOptions::default()
        }
    }

    /// Deterministic pseudo-random payload for round-trip checks.
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// The canonical segmentation scenario: 25 bytes against a 10-byte
    /// threshold with two workers must produce exactly three parts and
    /// one finish, and reassemble byte-for-byte.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn alphabet_splits_into_three_parts() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        let mut writer = ObjectWriter::new(store, "alphabet.bin", options(10, 2));

        assert_eq!(writer.write(b"ABCDEFGHIJKLMNOPQRSTUVWXY").await.unwrap(), 25);
        let obj = writer.close().await.unwrap();

        assert_eq!(obj.size, 25);
        let parts = script.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[&1], b"ABCDEFGHIJ");
        assert_eq!(parts[&2], b"KLMNOPQRST");
        assert_eq!(parts[&3], b"UVWXY");
        assert_eq!(memory.finishes(), 1);
        assert_eq!(
            memory.object("alphabet.bin").unwrap().data,
            b"ABCDEFGHIJKLMNOPQRSTUVWXY"
        );
    }

    /// Uneven writes, multiple workers: concatenating parts in id order
    /// must reconstruct the input exactly.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn round_trip_across_uneven_writes() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        let mut writer = ObjectWriter::new(store, "roundtrip.bin", options(64, 3));

        let data = pattern(1000);
        let mut offset = 0;
        for step in [7usize, 13, 64, 1, 200, 33, 500, 182] {
            let end = (offset + step).min(data.len());
            assert_eq!(writer.write(&data[offset..end]).await.unwrap(), end - offset);
            offset = end;
        }
        assert_eq!(offset, data.len());
        writer.close().await.unwrap();

        assert_eq!(memory.object("roundtrip.bin").unwrap().data, data);

        // Ids are 1..k with no gaps; the tail is the only short part.
        let parts = script.parts();
        let ids: Vec<u32> = parts.keys().copied().collect();
        let expected: Vec<u32> = (1..=ids.len() as u32).collect();
        assert_eq!(ids, expected);
        for (id, part) in &parts {
            if *id < ids.len() as u32 {
                assert_eq!(part.len(), 64);
            }
        }
        let rebuilt: Vec<u8> = parts.values().flatten().copied().collect();
        assert_eq!(rebuilt, data);
    }

    #[tokio::test]
    async fn object_under_threshold_uses_one_simple_upload() {
        let memory = MemoryStore::new();
        let mut writer = ObjectWriter::new(
            Arc::new(memory.clone()),
            "under.bin",
            options(1000, 2),
        );

        writer.write(&pattern(999)).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(memory.simple_uploads(), 1);
        assert_eq!(memory.multipart_starts(), 0);
        assert_eq!(memory.object("under.bin").unwrap().data, pattern(999));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multipart_starts_exactly_once() {
        let memory = MemoryStore::new();
        let mut writer = ObjectWriter::new(
            Arc::new(memory.clone()),
            "many.bin",
            options(16, 4),
        );

        // Many flushes across many writes still start one session.
        for _ in 0..20 {
            writer.write(&pattern(48)).await.unwrap();
        }
        writer.close().await.unwrap();

        assert_eq!(memory.multipart_starts(), 1);
        assert_eq!(memory.part_uploads(), 60);
    }

    #[tokio::test]
    async fn transient_part_failure_recovers_on_a_fresh_lease() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        script.fail_part_uploads(vec![StoreError::Transport("connection reset".into())]);
        let mut writer = ObjectWriter::new(store, "recovers.bin", options(10, 1));

        let data = pattern(25);
        writer.write(&data).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(memory.object("recovers.bin").unwrap().data, data);
        // Three parts accepted once each: the retry re-sent the same
        // chunk rather than duplicating or skipping an index.
        assert_eq!(memory.part_uploads(), 3);
        assert_eq!(script.parts().len(), 3);
        // One worker lease plus the fresh lease for the retry.
        assert_eq!(script.leases_issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fatal_part_failure_fails_write_and_close() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        let fatal = StoreError::Service {
            status: 400,
            message: "rejected".into(),
        };
        script.fail_part_uploads(vec![fatal.clone()]);
        let mut writer = ObjectWriter::new(store, "doomed.bin", options(10, 2));

        // Keep writing until the recorded error surfaces.
        let mut saw_error = None;
        for _ in 0..100 {
            match writer.write(&pattern(10)).await {
                Ok(_) => tokio::task::yield_now().await,
                Err(err) => {
                    saw_error = Some(err);
                    break;
                }
            }
        }
        assert_eq!(saw_error, Some(fatal.clone()));

        let err = writer.close().await.unwrap_err();
        assert_eq!(err, fatal);

        // The session was never assembled and the object never stored.
        assert_eq!(memory.finishes(), 0);
        assert!(memory.object("doomed.bin").is_none());

        // The failure is sticky: closing again replays it without new
        // remote calls, and writes stay rejected.
        let leases_after = script.leases_issued.load(Ordering::SeqCst);
        assert_eq!(writer.close().await.unwrap_err(), fatal);
        assert_eq!(writer.write(b"more").await.unwrap_err(), fatal);
        assert_eq!(script.leases_issued.load(Ordering::SeqCst), leases_after);
    }

    #[tokio::test]
    async fn simple_upload_retries_with_a_fresh_session() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        script.fail_simple_uploads(vec![StoreError::Service {
            status: 503,
            message: "unavailable".into(),
        }]);
        let mut writer = ObjectWriter::new(store, "eventually.bin", UploadOptions::default());

        writer.write(b"eventually consistent").await.unwrap();
        let obj = writer.close().await.unwrap();

        assert_eq!(obj.size, 21);
        assert_eq!(memory.simple_uploads(), 1);
        // The failed attempt's session was discarded for a fresh one.
        assert_eq!(script.simple_sessions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_simple_failure_is_sticky() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let fatal = StoreError::Service {
            status: 403,
            message: "forbidden".into(),
        };
        store.script.fail_simple_uploads(vec![fatal.clone()]);
        let mut writer = ObjectWriter::new(store, "forbidden.bin", UploadOptions::default());

        writer.write(b"nope").await.unwrap();
        assert_eq!(writer.close().await.unwrap_err(), fatal);
        assert_eq!(writer.close().await.unwrap_err(), fatal);
        assert!(memory.object("forbidden.bin").is_none());
    }

    /// A final chunk exactly at the threshold boundary: 20 bytes with a
    /// 10-byte threshold leaves nothing to flush at close.
    #[tokio::test]
    async fn boundary_sized_object_has_no_trailing_part() {
        let memory = MemoryStore::new();
        let store = Arc::new(ObservedStore::new(memory.clone()));
        let script = store.script.clone();
        let mut writer = ObjectWriter::new(store, "boundary.bin", options(10, 2));

        writer.write(&pattern(20)).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(script.parts().len(), 2);
        assert_eq!(memory.object("boundary.bin").unwrap().data, pattern(20));
    }
}
