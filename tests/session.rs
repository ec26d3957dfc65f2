//! End-to-end session tests driven by a scripted capture backend.
//!
//! The backend replays a list of steps on its own thread, the way a real
//! audio host calls back from its realtime thread. Operator actions
//! (breaks, cancel) are steps too, so the cut points are deterministic.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use songbreak::audio::{
    AudioFormat, AudioSink, BufferCallback, CallbackFlow, CaptureBackend, CaptureDevice,
    CaptureError, CaptureSession, CaptureStream, EncoderSinkFactory, EncodingSettings,
    ErrorCallback, PcmFormat, SequentialPaths, SessionControl, SessionPhase, SinkFactory,
    StreamSpec,
};

const FRAMES: usize = 256;
const CHANNELS: usize = 2;

enum Step {
    Buffer(Vec<i16>),
    Empty,
    Act(Box<dyn FnOnce() + Send>),
    DeviceLost,
}

type Script = Arc<Mutex<VecDeque<Step>>>;

#[derive(Default, Clone)]
struct Counters {
    delivered: Arc<AtomicUsize>,
    completed_at: Arc<Mutex<Option<usize>>>,
}

struct ScriptedBackend {
    script: Script,
    counters: Counters,
}

struct ScriptedStream {
    script: Script,
    counters: Counters,
    on_buffer: Option<BufferCallback>,
    on_error: Option<ErrorCallback>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureBackend for ScriptedBackend {
    fn open_stream(
        &self,
        _device: &CaptureDevice,
        _spec: &StreamSpec,
        on_buffer: BufferCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Ok(Box::new(ScriptedStream {
            script: Arc::clone(&self.script),
            counters: self.counters.clone(),
            on_buffer: Some(on_buffer),
            on_error: Some(on_error),
            worker: None,
        }))
    }
}

impl CaptureStream for ScriptedStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        let script = Arc::clone(&self.script);
        let counters = self.counters.clone();
        let mut on_buffer = self.on_buffer.take().expect("started twice");
        let mut on_error = self.on_error.take().expect("started twice");

        self.worker = Some(thread::spawn(move || loop {
            let Some(step) = script.lock().unwrap().pop_front() else {
                return;
            };
            match step {
                Step::Buffer(pcm) => {
                    let n = counters.delivered.fetch_add(1, Ordering::SeqCst) + 1;
                    if on_buffer(&pcm) == CallbackFlow::Complete {
                        *counters.completed_at.lock().unwrap() = Some(n);
                        return;
                    }
                }
                Step::Empty => {
                    on_buffer(&[]);
                }
                Step::Act(action) => action(),
                Step::DeviceLost => {
                    on_error(CaptureError::Device("device unplugged".into()));
                    return;
                }
            }
        }));
        Ok(())
    }

    /// Waits for the script to reach the point where the session completed
    /// the stream, which keeps the cut after a cancel deterministic.
    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(worker) = self.worker.take() {
            worker.join().expect("delivery thread panicked");
        }
        Ok(())
    }
}

struct Fixture {
    session: CaptureSession<ScriptedBackend>,
    control: SessionControl,
    script: Script,
    counters: Counters,
    dir: tempfile::TempDir,
}

fn fixture_with(factory: Arc<dyn SinkFactory>) -> Fixture {
    let script: Script = Arc::default();
    let counters = Counters::default();
    let backend = ScriptedBackend {
        script: Arc::clone(&script),
        counters: counters.clone(),
    };
    let spec = StreamSpec::new(PcmFormat::default(), Some(FRAMES as u32));
    let session = CaptureSession::new(backend, factory, spec);
    let control = session.control();
    Fixture {
        session,
        control,
        script,
        counters,
        dir: tempfile::tempdir().unwrap(),
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(EncoderSinkFactory::new(
        PcmFormat::default(),
        EncodingSettings::default(),
    )))
}

fn device() -> CaptureDevice {
    CaptureDevice {
        index: 0,
        display_name: "Scripted input".into(),
    }
}

/// Buffer `n` filled with a recognizable ramp.
fn buffer(n: usize) -> Vec<i16> {
    (0..FRAMES * CHANNELS)
        .map(|i| ((n * 1_000 + i) % i16::MAX as usize) as i16)
        .collect()
}

impl Fixture {
    fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    fn push_buffers(&self, range: std::ops::Range<usize>) {
        for n in range {
            self.push(Step::Buffer(buffer(n)));
        }
    }

    fn push_break(&self) {
        let control = self.control.clone();
        self.push(Step::Act(Box::new(move || control.request_break())));
    }

    fn push_cancel(&self) {
        let control = self.control.clone();
        self.push(Step::Act(Box::new(move || control.cancel())));
    }

    fn base(&self) -> PathBuf {
        self.dir.path().join("set")
    }
}

fn read_wav(path: &Path) -> Vec<i16> {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.bits_per_sample, 16);
    reader.into_samples::<i16>().map(|s| s.unwrap()).collect()
}

fn header_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[test]
fn test_single_file_receives_every_buffer_in_order() {
    let f = fixture();
    f.push_buffers(0..20);
    f.push_cancel();
    f.push_buffers(20..22);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();

    assert_eq!(report.files.len(), 1);
    let path = &report.files[0].path;
    assert_eq!(path, &f.dir.path().join("set_1.wav"));

    let written = read_wav(path);
    let expected: Vec<i16> = (0..21).flat_map(buffer).collect();
    assert_eq!(written, expected);

    let bytes = std::fs::read(path).unwrap();
    let samples = 21 * FRAMES * CHANNELS;
    assert_eq!(header_u32(&bytes, 40) as usize, samples * 2);
    assert_eq!(header_u32(&bytes, 28), 48_000 * 2 * 2);
    assert_eq!(bytes.len(), 44 + samples * 2);
}

#[test]
fn test_break_splits_output_without_loss() {
    let f = fixture();
    let k = 7;
    f.push_buffers(0..k);
    f.push_break();
    f.push_buffers(k..15);
    f.push_cancel();
    f.push_buffers(15..16);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();

    assert_eq!(report.files.len(), 2);
    let first = read_wav(&report.files[0].path);
    let second = read_wav(&report.files[1].path);

    assert_eq!(first, (0..k).flat_map(buffer).collect::<Vec<_>>());
    assert_eq!(second, (k..16).flat_map(buffer).collect::<Vec<_>>());

    let delivered = f.counters.delivered.load(Ordering::SeqCst);
    assert_eq!(first.len() + second.len(), delivered * FRAMES * CHANNELS);
    assert_eq!(report.total_samples() as usize, first.len() + second.len());
}

#[test]
fn test_rapid_breaks_coalesce_into_one_rotation() {
    let f = fixture();
    f.push_buffers(0..3);
    for _ in 0..5 {
        f.push_break();
    }
    f.push_buffers(3..6);
    f.push_cancel();
    f.push_buffers(6..7);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();

    assert_eq!(report.files.len(), 2);
    assert!(!f.dir.path().join("set_3.wav").exists());
    assert_eq!(f.control.status().breaks, 1);
}

#[test]
fn test_cancel_stops_within_one_buffer_and_finalizes_once() {
    let journal = Arc::new(Mutex::new(Vec::<String>::new()));
    let f = fixture_with(Arc::new(JournalFactory {
        journal: Arc::clone(&journal),
    }));
    f.push_buffers(0..4);
    f.push_cancel();
    f.push_buffers(4..10);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();

    // The buffer in flight when the gate is raised may still be written.
    let delivered = f.counters.delivered.load(Ordering::SeqCst);
    assert!(delivered <= 5, "delivered {delivered} buffers after cancel");
    assert_eq!(report.buffers as usize, delivered);

    let log = journal.lock().unwrap();
    let finalized: Vec<_> = log.iter().filter(|e| e.starts_with("finalize")).collect();
    assert_eq!(finalized.len(), 1);
    assert_eq!(log.last().map(String::as_str), Some(finalized[0].as_str()));

    assert_eq!(f.control.status().phase, SessionPhase::Stopped);
    // Stop is idempotent and breaks after stop have no effect.
    f.control.cancel();
    f.control.request_break();
    assert_eq!(f.control.status().breaks, 0);
}

#[test]
fn test_cancel_before_start_records_nothing() {
    let f = fixture();
    f.control.cancel();

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();

    assert!(report.files.is_empty());
    assert!(!f.dir.path().join("set_1.wav").exists());
}

#[test]
fn test_break_requested_before_capture_is_discarded() {
    let f = fixture();
    f.control.request_break();
    f.push_buffers(0..3);
    f.push_cancel();
    f.push_buffers(3..4);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();
    assert_eq!(report.files.len(), 1);
}

#[test]
fn test_empty_buffers_are_skipped() {
    let f = fixture();
    f.push_buffers(0..2);
    f.push(Step::Empty);
    f.push_buffers(2..4);
    f.push(Step::Empty);
    f.push_cancel();
    f.push_buffers(4..5);

    let paths = SequentialPaths::new(f.base(), "wav");
    let report = f.session.run(&device(), AudioFormat::Wav, paths).unwrap();
    let written = read_wav(&report.files[0].path);
    assert_eq!(written, (0..5).flat_map(buffer).collect::<Vec<_>>());
}

#[test]
fn test_failed_rotation_keeps_previous_file_intact() {
    let f = fixture_with(Arc::new(FlakyFactory {
        inner: EncoderSinkFactory::new(PcmFormat::default(), EncodingSettings::default()),
        allowed: AtomicUsize::new(1),
    }));
    f.push_buffers(0..5);
    f.push_break();
    f.push_buffers(5..10);

    let paths = SequentialPaths::new(f.base(), "wav");
    let err = f
        .session
        .run(&device(), AudioFormat::Wav, paths)
        .unwrap_err();
    assert!(matches!(err, CaptureError::Io { .. }), "got {err}");

    let first = f.dir.path().join("set_1.wav");
    assert_eq!(read_wav(&first), (0..5).flat_map(buffer).collect::<Vec<_>>());
    let bytes = std::fs::read(&first).unwrap();
    assert_eq!(bytes.len(), 44 + 5 * FRAMES * CHANNELS * 2);

    // The buffer that triggered the rotation is the last one processed.
    assert_eq!(*f.counters.completed_at.lock().unwrap(), Some(6));

    let status = f.control.status();
    assert_eq!(status.phase, SessionPhase::Stopped);
    assert!(status.last_error.is_some());
    assert_eq!(status.breaks, 0);
    assert_eq!(status.completed_files, vec![first]);
}

#[test]
fn test_device_loss_ends_session_with_device_error() {
    let f = fixture();
    f.push_buffers(0..3);
    f.push(Step::DeviceLost);

    let paths = SequentialPaths::new(f.base(), "wav");
    let err = f
        .session
        .run(&device(), AudioFormat::Wav, paths)
        .unwrap_err();
    assert!(matches!(err, CaptureError::Device(_)));

    // Partial output is kept and finalized.
    let first = f.dir.path().join("set_1.wav");
    assert_eq!(read_wav(&first).len(), 3 * FRAMES * CHANNELS);
}

#[test]
fn test_first_sink_failure_never_starts_capture() {
    let f = fixture();
    let paths = SequentialPaths::new(f.dir.path().join("missing").join("set"), "wav");

    let err = f
        .session
        .run(&device(), AudioFormat::Wav, paths)
        .unwrap_err();
    assert!(matches!(err, CaptureError::Io { .. }));
    assert_eq!(f.counters.delivered.load(Ordering::SeqCst), 0);
}

#[test]
fn test_open_failure_is_device_error() {
    struct NoDevice;
    impl CaptureBackend for NoDevice {
        fn open_stream(
            &self,
            device: &CaptureDevice,
            _spec: &StreamSpec,
            _on_buffer: BufferCallback,
            _on_error: ErrorCallback,
        ) -> Result<Box<dyn CaptureStream>, CaptureError> {
            Err(CaptureError::Device(format!("no device at index {}", device.index)))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let session = CaptureSession::new(
        NoDevice,
        Arc::new(EncoderSinkFactory::new(
            PcmFormat::default(),
            EncodingSettings::default(),
        )),
        StreamSpec::new(PcmFormat::default(), None),
    );
    let control = session.control();
    let paths = SequentialPaths::new(dir.path().join("set"), "wav");

    let err = session.run(&device(), AudioFormat::Wav, paths).unwrap_err();
    assert!(matches!(err, CaptureError::Device(_)));
    assert!(!dir.path().join("set_1.wav").exists());

    let status = control.status();
    assert_eq!(status.phase, SessionPhase::Stopped);
    assert!(status.completed_files.is_empty());
    assert!(status.current_file.is_none());
}

/// Delivers one buffer from inside `open_stream`, the way hosts that start
/// a stream as soon as it is built do.
struct EagerBackend {
    inner: ScriptedBackend,
    first: Vec<i16>,
}

impl CaptureBackend for EagerBackend {
    fn open_stream(
        &self,
        device: &CaptureDevice,
        spec: &StreamSpec,
        mut on_buffer: BufferCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.inner.counters.delivered.fetch_add(1, Ordering::SeqCst);
        if on_buffer(&self.first) == CallbackFlow::Complete {
            *self.inner.counters.completed_at.lock().unwrap() = Some(1);
        }
        self.inner.open_stream(device, spec, on_buffer, on_error)
    }
}

#[test]
fn test_buffer_delivered_while_opening_goes_to_first_file() {
    let script: Script = Arc::default();
    let counters = Counters::default();
    let backend = EagerBackend {
        inner: ScriptedBackend {
            script: Arc::clone(&script),
            counters: counters.clone(),
        },
        first: buffer(0),
    };
    let session = CaptureSession::new(
        backend,
        Arc::new(EncoderSinkFactory::new(
            PcmFormat::default(),
            EncodingSettings::default(),
        )),
        StreamSpec::new(PcmFormat::default(), Some(FRAMES as u32)),
    );
    let control = session.control();
    {
        let mut steps = script.lock().unwrap();
        for n in 1..4 {
            steps.push_back(Step::Buffer(buffer(n)));
        }
        let cancel = control.clone();
        steps.push_back(Step::Act(Box::new(move || cancel.cancel())));
        steps.push_back(Step::Buffer(buffer(4)));
    }

    let dir = tempfile::tempdir().unwrap();
    let paths = SequentialPaths::new(dir.path().join("set"), "wav");
    let report = session.run(&device(), AudioFormat::Wav, paths).unwrap();

    assert_eq!(*counters.completed_at.lock().unwrap(), Some(5));
    assert_eq!(report.files.len(), 1);
    assert_eq!(
        read_wav(&report.files[0].path),
        (0..5).flat_map(buffer).collect::<Vec<_>>()
    );
    assert!(control.status().last_error.is_none());
}

#[test]
fn test_opus_rotation_produces_two_ogg_files() {
    let f = fixture();
    f.push_buffers(0..10);
    f.push_break();
    f.push_buffers(10..20);
    f.push_cancel();
    f.push_buffers(20..21);

    let paths = SequentialPaths::new(f.base(), "opus");
    let report = f.session.run(&device(), AudioFormat::Opus, paths).unwrap();

    assert_eq!(report.files.len(), 2);
    for file in &report.files {
        let bytes = std::fs::read(&file.path).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
    }
}

#[test]
fn test_mp3_rotation_produces_two_mpeg_files() {
    let f = fixture();
    f.push_buffers(0..10);
    f.push_break();
    f.push_buffers(10..20);
    f.push_cancel();
    f.push_buffers(20..21);

    let paths = SequentialPaths::new(f.base(), "mp3");
    let report = f.session.run(&device(), AudioFormat::Mp3, paths).unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].path, f.dir.path().join("set_1.mp3"));
    assert_eq!(report.files[1].path, f.dir.path().join("set_2.mp3"));
    for file in &report.files {
        let bytes = std::fs::read(&file.path).unwrap();
        // MPEG audio frames start with an 11-bit sync word.
        let frames = bytes
            .windows(2)
            .filter(|w| w[0] == 0xFF && (w[1] & 0xE0) == 0xE0)
            .count();
        assert!(frames >= 2, "{} has {frames} frame headers", file.path.display());
    }
    assert_eq!(report.files[0].samples, 10 * (FRAMES * CHANNELS) as u64);
    assert_eq!(report.files[1].samples, 11 * (FRAMES * CHANNELS) as u64);
}

/// Lets the first `allowed` sinks through, then fails like a read-only disk.
struct FlakyFactory {
    inner: EncoderSinkFactory,
    allowed: AtomicUsize,
}

impl SinkFactory for FlakyFactory {
    fn create(&self, path: &Path, format: AudioFormat) -> Result<Box<dyn AudioSink>, CaptureError> {
        let allowed = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if allowed.is_err() {
            return Err(CaptureError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        self.inner.create(path, format)
    }
}

/// Sinks that only log what happens to them.
struct JournalFactory {
    journal: Arc<Mutex<Vec<String>>>,
}

struct JournalSink {
    path: PathBuf,
    journal: Arc<Mutex<Vec<String>>>,
}

impl SinkFactory for JournalFactory {
    fn create(&self, path: &Path, _format: AudioFormat) -> Result<Box<dyn AudioSink>, CaptureError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("create {}", path.display()));
        Ok(Box::new(JournalSink {
            path: path.to_path_buf(),
            journal: Arc::clone(&self.journal),
        }))
    }
}

impl AudioSink for JournalSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), CaptureError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("write {} {}", self.path.display(), pcm.len()));
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<(), CaptureError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("finalize {}", self.path.display()));
        Ok(())
    }
}
