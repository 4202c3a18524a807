//! The ingestion registry: the single owner of a session's corpus.
//!
//! Every submission goes through [`IngestionRegistry::submit`], which
//! fingerprints the bytes, short-circuits exact duplicates, records a
//! `Processing` entry, drives extraction to completion, and finalizes the
//! record as `Completed` or `Failed`. Nothing outside this module mutates the
//! corpus; readers get owned snapshots.
//!
//! # Concurrency
//!
//! Records sit behind a `std::sync::RwLock` that is never held across an
//! `.await`. A separate async gate is held shared by every in-flight
//! `submit` and exclusively by `clear`, so a clear never interleaves with a
//! half-finished submission. Each accepted submission carries an attempt
//! number; finalization only writes if the record still has that attempt.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ExtractionError;
use crate::extract::Extractor;
use crate::fingerprint::fingerprint;
use crate::models::{
    file_extension, FileFormat, FileState, FileStatus, IngestSummary, IngestedFile, Outcome,
    SubmitReport,
};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::transcribe::Transcriber;

#[derive(Default)]
struct Corpus {
    records: HashMap<String, IngestedFile>,
    /// Filenames in first-submission order.
    order: Vec<String>,
    /// Buckets in first-insertion order; names inside in first-insertion order.
    buckets: Vec<(FileFormat, Vec<String>)>,
}

impl Corpus {
    /// Insert or overwrite `file`, placing it in a bucket the first time only.
    fn put(&mut self, file: IngestedFile) {
        let name = file.filename.clone();
        let format = file.format;
        if self.records.insert(name.clone(), file).is_some() {
            return;
        }
        self.order.push(name.clone());
        if let Some(format) = format {
            match self.buckets.iter_mut().find(|(f, _)| *f == format) {
                Some((_, names)) => names.push(name),
                None => self.buckets.push((format, vec![name])),
            }
        }
    }

    fn summary(&self) -> IngestSummary {
        let mut summary = IngestSummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in self.records.values() {
            match record.status() {
                FileStatus::Processing => summary.processing += 1,
                FileStatus::Completed => summary.completed += 1,
                FileStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Session-scoped corpus of ingested files.
pub struct IngestionRegistry {
    session_id: Uuid,
    extractor: Extractor,
    max_preview_bytes: u64,
    gate: tokio::sync::RwLock<()>,
    corpus: RwLock<Corpus>,
}

impl IngestionRegistry {
    pub fn new(extractor: Extractor, max_preview_bytes: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            extractor,
            max_preview_bytes,
            gate: tokio::sync::RwLock::new(()),
            corpus: RwLock::new(Corpus::default()),
        }
    }

    /// Registry with the configured speech backend and ffmpeg demuxer.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transcriber = Transcriber::from_config(&config.transcription)?;
        Ok(Self::new(
            Extractor::new(transcriber),
            config.ingest.max_preview_bytes,
        ))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn read(&self) -> RwLockReadGuard<'_, Corpus> {
        self.corpus.read().expect("ingestion registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Corpus> {
        self.corpus.write().expect("ingestion registry lock poisoned")
    }

    /// Submit one file and drive it to a terminal status.
    ///
    /// Returns [`Outcome::DuplicateSkipped`] without touching state when the
    /// filename is already known with the same fingerprint and did not fail.
    /// Otherwise the record is (re)created as `Processing`, extracted, and
    /// finalized; the outcome is [`Outcome::Accepted`] whether extraction
    /// succeeded or not.
    pub async fn submit(&self, filename: &str, bytes: impl Into<Arc<[u8]>>) -> Outcome {
        let _gate = self.gate.read().await;

        let bytes: Arc<[u8]> = bytes.into();
        let fp = fingerprint(&bytes);
        let extension = file_extension(filename);
        let format = FileFormat::from_extension(&extension);

        let attempt = {
            let mut corpus = self.write();
            let previous = corpus.records.get(filename);
            if let Some(existing) = previous {
                if existing.fingerprint == fp && existing.status() != FileStatus::Failed {
                    info!(filename, fingerprint = %fp.short(), "duplicate upload skipped");
                    return Outcome::DuplicateSkipped;
                }
            }
            let attempt = previous.map_or(1, |r| r.attempt + 1);
            corpus.put(IngestedFile {
                filename: filename.to_string(),
                extension: extension.clone(),
                format,
                fingerprint: fp,
                size_bytes: bytes.len() as u64,
                attempt,
                state: FileState::Processing {
                    started_at: Utc::now(),
                },
                raw_bytes: Some(Arc::clone(&bytes)),
            });
            attempt
        };

        debug!(filename, fingerprint = %fp.short(), attempt, "processing");

        let result = match format {
            Some(format) => self.extractor.extract(bytes, format).await,
            None => Err(ExtractionError::UnsupportedFormat(extension)),
        };

        self.finalize(filename, attempt, result);
        Outcome::Accepted
    }

    fn finalize(&self, filename: &str, attempt: u32, result: Result<String, ExtractionError>) {
        let mut corpus = self.write();
        let Some(record) = corpus.records.get_mut(filename) else {
            return;
        };
        if record.attempt != attempt {
            debug!(filename, attempt, current = record.attempt, "result superseded by newer upload");
            return;
        }

        record.state = match result {
            Ok(text) => {
                info!(
                    filename,
                    format = %record.extension,
                    chars = text.chars().count(),
                    "processed"
                );
                FileState::Completed {
                    text,
                    processed_at: Utc::now(),
                }
            }
            Err(error) => {
                warn!(filename, kind = ?error.kind(), error = %error, "processing failed");
                FileState::Failed {
                    error,
                    failed_at: Utc::now(),
                }
            }
        };

        if record.size_bytes > self.max_preview_bytes {
            debug!(filename, size = record.size_bytes, "evicting raw bytes");
            record.raw_bytes = None;
        }
    }

    /// Submit files sequentially in order. One file's failure never stops the batch.
    pub async fn submit_batch<I>(
        &self,
        files: I,
        progress: &dyn IngestProgressReporter,
    ) -> Vec<SubmitReport>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
        I::IntoIter: ExactSizeIterator,
    {
        let files = files.into_iter();
        let total = files.len() as u64;
        let mut reports = Vec::with_capacity(files.len());
        for (i, (filename, bytes)) in files.enumerate() {
            progress.report(IngestProgressEvent::Processing {
                filename: filename.clone(),
                n: i as u64 + 1,
                total,
            });
            let outcome = self.submit(&filename, bytes).await;
            let status = self.read().records.get(&filename).map(|r| r.status());
            progress.report(IngestProgressEvent::Finished {
                filename: filename.clone(),
                outcome,
                status,
            });
            reports.push(SubmitReport {
                filename,
                outcome,
                status,
            });
        }
        reports
    }

    pub fn get(&self, filename: &str) -> Option<IngestedFile> {
        self.read().records.get(filename).cloned()
    }

    /// Format buckets with their filenames, both in insertion order.
    pub fn list_by_format(&self) -> Vec<(FileFormat, Vec<String>)> {
        self.read().buckets.clone()
    }

    /// All records in first-submission order.
    pub fn records(&self) -> Vec<IngestedFile> {
        let corpus = self.read();
        corpus
            .order
            .iter()
            .filter_map(|name| corpus.records.get(name).cloned())
            .collect()
    }

    pub fn summary(&self) -> IngestSummary {
        self.read().summary()
    }

    pub fn snapshot(&self) -> CorpusSnapshot {
        CorpusSnapshot::of(&self.read())
    }

    /// Run `f` on a snapshot while holding the corpus read lock, so no clear
    /// can complete until `f` returns.
    pub(crate) fn with_snapshot<R>(&self, f: impl FnOnce(&CorpusSnapshot) -> R) -> R {
        let corpus = self.read();
        f(&CorpusSnapshot::of(&corpus))
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Drop every record. Waits for in-flight submissions to finish first.
    pub async fn clear(&self) {
        self.clear_with(|| {}).await;
    }

    /// [`clear`](Self::clear), running `alongside` while the corpus is still
    /// write-locked and no submission is in flight.
    pub async fn clear_with(&self, alongside: impl FnOnce()) {
        let _gate = self.gate.write().await;
        let dropped = {
            let mut corpus = self.write();
            alongside();
            std::mem::take(&mut *corpus).records.len()
        };
        info!(session = %self.session_id, dropped, "corpus cleared");
    }
}

/// Immutable view of the corpus at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    buckets: Vec<(FileFormat, Vec<String>)>,
    records: HashMap<String, IngestedFile>,
}

impl CorpusSnapshot {
    fn of(corpus: &Corpus) -> Self {
        Self {
            buckets: corpus.buckets.clone(),
            records: corpus.records.clone(),
        }
    }

    /// Bucket `files` by format in iteration order. Later duplicates replace earlier ones.
    pub fn from_records(files: impl IntoIterator<Item = IngestedFile>) -> Self {
        let mut corpus = Corpus::default();
        for file in files {
            corpus.put(file);
        }
        Self {
            buckets: corpus.buckets,
            records: corpus.records,
        }
    }

    pub fn buckets(&self) -> &[(FileFormat, Vec<String>)] {
        &self.buckets
    }

    pub fn get(&self, filename: &str) -> Option<&IngestedFile> {
        self.records.get(filename)
    }

    /// Completed files of one bucket, in bucket order.
    pub fn completed_in<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = &'a IngestedFile> + 'a {
        names
            .iter()
            .filter_map(|name| self.records.get(name))
            .filter(|r| r.status() == FileStatus::Completed)
    }

    pub fn has_completed(&self) -> bool {
        self.records
            .values()
            .any(|r| r.status() == FileStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{AudioClip, SpeechBackend};
    use crate::transcribe::AudioDemuxer;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct SilentDemuxer;

    #[async_trait]
    impl AudioDemuxer for SilentDemuxer {
        async fn extract_audio(&self, _video: &[u8]) -> Result<Option<AudioClip>, ExtractionError> {
            Ok(None)
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl SpeechBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }
        async fn recognize(&self, clip: &AudioClip) -> anyhow::Result<String> {
            Ok(String::from_utf8_lossy(&clip.bytes).into_owned())
        }
    }

    /// Echoes after a delay and flags when it returns.
    struct SlowBackend {
        done: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SpeechBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }
        async fn recognize(&self, clip: &AudioClip) -> anyhow::Result<String> {
            if clip.bytes.starts_with(b"slow ") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.done.store(true, Ordering::SeqCst);
            Ok(String::from_utf8_lossy(&clip.bytes).into_owned())
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<String>>);

    impl IngestProgressReporter for RecordingProgress {
        fn report(&self, event: IngestProgressEvent) {
            let line = match event {
                IngestProgressEvent::Discovering { path } => format!("discover {}", path),
                IngestProgressEvent::Processing { filename, n, total } => {
                    format!("{}/{} {}", n, total, filename)
                }
                IngestProgressEvent::Finished { filename, .. } => format!("done {}", filename),
            };
            self.0.lock().unwrap().push(line);
        }
    }

    fn registry_with(backend: Arc<dyn SpeechBackend>, max_preview_bytes: u64) -> IngestionRegistry {
        let transcriber = Transcriber::new(Arc::new(SilentDemuxer), backend, Duration::from_secs(5));
        IngestionRegistry::new(Extractor::new(transcriber), max_preview_bytes)
    }

    fn registry(max_preview_bytes: u64) -> IngestionRegistry {
        registry_with(Arc::new(EchoBackend), max_preview_bytes)
    }

    fn slow_registry() -> (Arc<IngestionRegistry>, Arc<AtomicBool>) {
        let done = Arc::new(AtomicBool::new(false));
        let backend = Arc::new(SlowBackend {
            done: Arc::clone(&done),
        });
        (Arc::new(registry_with(backend, 1024 * 1024)), done)
    }

    async fn wait_for_processing(reg: &IngestionRegistry, filename: &str) {
        for _ in 0..100 {
            if reg.get(filename).map(|r| r.status()) == Some(FileStatus::Processing) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("{} never started processing", filename);
    }

    fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn identical_resubmission_is_skipped() {
        let reg = registry(1024 * 1024);
        let bytes = docx(&["hello"]);
        assert_eq!(reg.submit("a.docx", bytes.clone()).await, Outcome::Accepted);
        let first = reg.get("a.docx").unwrap();
        assert_eq!(reg.submit("a.docx", bytes).await, Outcome::DuplicateSkipped);
        let second = reg.get("a.docx").unwrap();
        assert_eq!(first.processed_at(), second.processed_at());
        assert_eq!(second.attempt, 1);
    }

    #[tokio::test]
    async fn changed_bytes_overwrite_in_place() {
        let reg = registry(1024 * 1024);
        reg.submit("a.docx", docx(&["one"])).await;
        let first = reg.get("a.docx").unwrap();
        assert_eq!(reg.submit("a.docx", docx(&["two"])).await, Outcome::Accepted);
        let second = reg.get("a.docx").unwrap();
        assert_eq!(second.extracted_text(), Some("two"));
        assert_eq!(second.attempt, 2);
        assert!(second.processed_at() >= first.processed_at());
        assert_eq!(reg.list_by_format(), vec![(FileFormat::Docx, vec!["a.docx".to_string()])]);
    }

    #[tokio::test]
    async fn failed_record_is_retried_on_identical_bytes() {
        let reg = registry(1024 * 1024);
        let clip = b"MP4?".to_vec();
        assert_eq!(reg.submit("talk.mp4", clip.clone()).await, Outcome::Accepted);
        assert_eq!(
            reg.get("talk.mp4").unwrap().error_detail(),
            Some(&ExtractionError::NoAudioTrack)
        );
        assert_eq!(reg.submit("talk.mp4", clip).await, Outcome::Accepted);
        assert_eq!(reg.get("talk.mp4").unwrap().attempt, 2);
    }

    #[tokio::test]
    async fn unsupported_extension_is_failed_and_unbucketed() {
        let reg = registry(1024);
        reg.submit("sheet.xlsx", b"PK".to_vec()).await;
        let record = reg.get("sheet.xlsx").unwrap();
        assert_eq!(record.format, None);
        assert_eq!(
            record.error_detail(),
            Some(&ExtractionError::UnsupportedFormat("xlsx".into()))
        );
        assert!(reg.list_by_format().is_empty());
        assert_eq!(reg.summary().failed, 1);
    }

    #[tokio::test]
    async fn buckets_keep_insertion_order() {
        let reg = registry(1024 * 1024);
        reg.submit("b.wav", b"second voice".to_vec()).await;
        reg.submit("z.docx", docx(&["zed"])).await;
        reg.submit("a.wav", b"first voice".to_vec()).await;
        assert_eq!(
            reg.list_by_format(),
            vec![
                (FileFormat::Wav, vec!["b.wav".to_string(), "a.wav".to_string()]),
                (FileFormat::Docx, vec!["z.docx".to_string()]),
            ]
        );
        assert_eq!(
            reg.get("a.wav").unwrap().extracted_text(),
            Some("first voice")
        );
    }

    #[tokio::test]
    async fn oversized_raw_bytes_are_evicted_text_kept() {
        let reg = registry(16);
        reg.submit("big.docx", docx(&["kept text"])).await;
        let record = reg.get("big.docx").unwrap();
        assert!(record.raw_bytes().is_none());
        assert_eq!(record.extracted_text(), Some("kept text"));

        let reg = registry(1024 * 1024);
        reg.submit("small.docx", docx(&["x"])).await;
        assert!(reg.get("small.docx").unwrap().raw_bytes().is_some());
    }

    #[tokio::test]
    async fn clear_empties_everything() {
        let reg = registry(1024 * 1024);
        reg.submit("a.docx", docx(&["a"])).await;
        assert_eq!(reg.len(), 1);
        reg.clear().await;
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(reg.list_by_format().is_empty());
        assert!(reg.get("a.docx").is_none());
        assert_eq!(reg.summary(), IngestSummary::default());
    }

    #[tokio::test]
    async fn batch_reports_each_file() {
        let reg = registry(1024 * 1024);
        let progress = RecordingProgress::default();
        let reports = reg
            .submit_batch(
                vec![
                    ("a.docx".to_string(), docx(&["a"])),
                    ("b.ppt".to_string(), b"legacy".to_vec()),
                    ("a.docx".to_string(), docx(&["a"])),
                ],
                &progress,
            )
            .await;
        assert_eq!(
            *progress.0.lock().unwrap(),
            vec![
                "1/3 a.docx",
                "done a.docx",
                "2/3 b.ppt",
                "done b.ppt",
                "3/3 a.docx",
                "done a.docx",
            ]
        );
        let outcomes: Vec<_> = reports.iter().map(|r| (r.outcome, r.status)).collect();
        assert_eq!(
            outcomes,
            vec![
                (Outcome::Accepted, Some(FileStatus::Completed)),
                (Outcome::Accepted, Some(FileStatus::Failed)),
                (Outcome::DuplicateSkipped, Some(FileStatus::Completed)),
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_changes() {
        let reg = registry(1024 * 1024);
        reg.submit("a.docx", docx(&["a"])).await;
        let snap = reg.snapshot();
        reg.clear().await;
        assert!(snap.has_completed());
        assert_eq!(snap.buckets().len(), 1);
        assert!(snap.get("a.docx").is_some());
    }

    #[tokio::test]
    async fn newer_upload_wins_over_older_in_flight_one() {
        let (reg, _) = slow_registry();
        let older = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.submit("a.wav", b"slow old take".to_vec()).await })
        };
        wait_for_processing(&reg, "a.wav").await;

        assert_eq!(reg.submit("a.wav", b"new take".to_vec()).await, Outcome::Accepted);
        assert_eq!(older.await.unwrap(), Outcome::Accepted);

        let record = reg.get("a.wav").unwrap();
        assert_eq!(record.attempt, 2);
        assert_eq!(record.status(), FileStatus::Completed);
        assert_eq!(record.extracted_text(), Some("new take"));
        assert_eq!(reg.list_by_format(), vec![(FileFormat::Wav, vec!["a.wav".to_string()])]);
    }

    #[tokio::test]
    async fn clear_waits_for_in_flight_submission() {
        let (reg, done) = slow_registry();
        let pending = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.submit("a.wav", b"slow words".to_vec()).await })
        };
        wait_for_processing(&reg, "a.wav").await;

        let saw_done = Arc::new(AtomicBool::new(false));
        {
            let (done, saw_done) = (Arc::clone(&done), Arc::clone(&saw_done));
            reg.clear_with(move || saw_done.store(done.load(Ordering::SeqCst), Ordering::SeqCst))
                .await;
        }
        assert!(saw_done.load(Ordering::SeqCst));
        assert_eq!(pending.await.unwrap(), Outcome::Accepted);

        assert!(reg.is_empty());
        assert!(reg.get("a.wav").is_none());
        assert!(reg.list_by_format().is_empty());
        assert_eq!(reg.summary(), IngestSummary::default());
    }
}
