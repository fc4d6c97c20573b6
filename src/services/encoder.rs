// Encoder Process Supervisor
// Owns the external FFmpeg process for the active recording session

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{error, info, warn};
use thiserror::Error;

use crate::models::{CaptureRequest, ResolutionMode};
use crate::services::{
    emit_event, emit_log_line, emit_status, EventSink, SessionEnded, Severity,
    EVENT_SESSION_ENDED,
};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// How long a freshly launched encoder gets before an exit counts as a
/// failed start rather than a finished session.
const LAUNCH_GRACE: Duration = Duration::from_millis(500);
/// Cooperative shutdown window before the process is killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Exit-status poll step while waiting for a graceful stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Reported when the process left no exit status behind.
const EXIT_CODE_UNKNOWN: i32 = -1;

pub const VIDEO_SUBDIR: &str = "video";
pub const SCREENSHOT_SUBDIR: &str = "screenshot";

/// Why a session could not be started.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("a recording session is already active")]
    AlreadyRunning,

    #[error("invalid capture request: {0}")]
    InvalidRequest(String),

    #[error("output folder not usable: {0}")]
    OutputFolder(String),

    #[error("failed to launch encoder: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("encoder exited during startup (code {0})")]
    EarlyExit(i32),
}

/// One in-flight encoder process. Owned exclusively by the supervisor;
/// released on every stop path, including failed ones.
struct EncoderSession {
    child: Child,
    request: CaptureRequest,
    output_path: PathBuf,
    paused: bool,
    drain_stop: Arc<AtomicBool>,
    drain_thread: Option<JoinHandle<()>>,
}

/// Drives at most one encoder process at a time through launch, pause
/// signaling, and shutdown.
pub struct EncoderSupervisor {
    encoder_path: String,
    sink: Arc<dyn EventSink>,
    session: Option<EncoderSession>,
}

impl EncoderSupervisor {
    pub fn new(encoder_path: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            encoder_path: encoder_path.into(),
            sink,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.session.as_ref().map(|s| s.paused).unwrap_or(false)
    }

    /// Parameters of the in-flight session, if any.
    pub fn active_request(&self) -> Option<&CaptureRequest> {
        self.session.as_ref().map(|s| &s.request)
    }

    /// Destination file of the in-flight session, if any.
    pub fn output_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.output_path.as_path())
    }

    /// Launches the encoder for `request` and returns the output file
    /// path. Creates the destination root and its `video`/`screenshot`
    /// subfolders. A process that dies within the launch grace interval
    /// is reported as a failed start, and nothing is retained.
    pub fn start_session(&mut self, request: &CaptureRequest) -> Result<PathBuf, StartError> {
        if self.session.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        match self.try_start(request) {
            Ok(path) => {
                emit_status(self.sink.as_ref(), Severity::Info, "Recording in progress");
                Ok(path)
            }
            Err(err) => {
                error!("[Encoder] start failed: {err}");
                emit_status(
                    self.sink.as_ref(),
                    Severity::Error,
                    format!("Start failed: {err}"),
                );
                Err(err)
            }
        }
    }

    fn try_start(&mut self, request: &CaptureRequest) -> Result<PathBuf, StartError> {
        request.validate().map_err(StartError::InvalidRequest)?;
        let video_dir =
            prepare_output_root(&request.output_root).map_err(StartError::OutputFolder)?;
        let output_path = unique_output_path(&video_dir, request.monitor.index);
        let args = build_encoder_args(request, &output_path);
        let program = self.encoder_path.clone();
        self.launch(&program, &args, request, output_path)
    }

    fn launch(
        &mut self,
        program: &str,
        args: &[String],
        request: &CaptureRequest,
        output_path: PathBuf,
    ) -> Result<PathBuf, StartError> {
        info!("[Encoder] CMD: {} {}", program, args.join(" "));
        emit_log_line(
            self.sink.as_ref(),
            &format!("CMD: {} {}", program, args.join(" ")),
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn()?;

        // An exit inside the grace window means the invocation was
        // rejected, not that a recording finished.
        thread::sleep(LAUNCH_GRACE);
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(StartError::EarlyExit(
                    status.code().unwrap_or(EXIT_CODE_UNKNOWN),
                ));
            }
            Ok(None) => {}
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StartError::Spawn(err));
            }
        }

        let drain_stop = Arc::new(AtomicBool::new(false));
        let drain_thread = child.stderr.take().map(|stderr| {
            spawn_drain_thread(stderr, Arc::clone(&drain_stop), Arc::clone(&self.sink))
        });

        self.session = Some(EncoderSession {
            child,
            request: request.clone(),
            output_path: output_path.clone(),
            paused: false,
            drain_stop,
            drain_thread,
        });
        Ok(output_path)
    }

    /// Stops the active session, killing the encoder if it ignores the
    /// graceful request. Bounded by the stop timeout plus kill overhead;
    /// a no-op when nothing is recording.
    pub fn stop_session(&mut self) {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => return,
        };

        emit_status(self.sink.as_ref(), Severity::Warning, "Stopping...");

        // Mark the stop as intentional before the process can react, so
        // the drain thread does not misread the stream closing.
        session.drain_stop.store(true, Ordering::SeqCst);

        if let Some(stdin) = session.child.stdin.as_mut() {
            let _ = stdin.write_all(b"q\n");
            let _ = stdin.flush();
        }

        let exit_code = match wait_with_timeout(&mut session.child, STOP_TIMEOUT) {
            Some(status) => status.code().unwrap_or(EXIT_CODE_UNKNOWN),
            None => {
                warn!(
                    "[Encoder] graceful stop not confirmed within {}s; killing process",
                    STOP_TIMEOUT.as_secs()
                );
                let _ = session.child.kill();
                match session.child.wait() {
                    Ok(status) => status.code().unwrap_or(EXIT_CODE_UNKNOWN),
                    Err(err) => {
                        warn!("[Encoder] failed to reap encoder process: {err}");
                        EXIT_CODE_UNKNOWN
                    }
                }
            }
        };

        if let Some(handle) = session.drain_thread.take() {
            let _ = handle.join();
        }

        info!("[Encoder] session ended with exit code {exit_code}");
        emit_event(
            self.sink.as_ref(),
            EVENT_SESSION_ENDED,
            &SessionEnded { exit_code },
        );
        emit_status(self.sink.as_ref(), Severity::Info, "Saved.");
    }

    /// Writes the pause/resume toggle to the encoder. Best-effort: a
    /// failed write leaves the state untouched and emits nothing.
    pub fn toggle_pause(&mut self) {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };
        let stdin = match session.child.stdin.as_mut() {
            Some(stdin) => stdin,
            None => return,
        };

        if stdin
            .write_all(b"p\n")
            .and_then(|()| stdin.flush())
            .is_err()
        {
            warn!("[Encoder] pause toggle write failed");
            return;
        }

        session.paused = !session.paused;
        if session.paused {
            emit_status(self.sink.as_ref(), Severity::Warning, "Paused");
        } else {
            emit_status(self.sink.as_ref(), Severity::Info, "Recording");
        }
    }
}

impl Drop for EncoderSupervisor {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("[Encoder] supervisor dropped with a live session; stopping");
            self.stop_session();
        }
    }
}

fn spawn_drain_thread(
    stderr: ChildStderr,
    stop: Arc<AtomicBool>,
    sink: Arc<dyn EventSink>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            buf.clear();
            // Raw bytes; the encoder's diagnostics are not guaranteed
            // to be valid UTF-8.
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        emit_log_line(sink.as_ref(), &format!("ffmpeg: {trimmed}"));
                    }
                }
                Err(err) => {
                    // A failed read says nothing about the process.
                    // Stop forwarding and leave the session alone.
                    warn!("[Encoder] stderr drain ended early: {err}");
                    return;
                }
            }
        }
        if !stop.load(Ordering::SeqCst) {
            // EOF without a stop request: the encoder died on its own.
            // Reported here; state is resolved by the stop the observer
            // issues next.
            emit_status(
                sink.as_ref(),
                Severity::Error,
                "Encoder process exited unexpectedly",
            );
        }
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(err) => {
                warn!("[Encoder] exit-status poll failed: {err}");
                return None;
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
}

/// Creates the output root plus its `video` and `screenshot` subfolders
/// and returns the directory recordings land in.
fn prepare_output_root(root: &Path) -> Result<PathBuf, String> {
    if root.to_string_lossy().trim().is_empty() {
        return Err("output root folder is not set".to_string());
    }
    let video_dir = root.join(VIDEO_SUBDIR);
    let screenshot_dir = root.join(SCREENSHOT_SUBDIR);
    for dir in [root, video_dir.as_path(), screenshot_dir.as_path()] {
        fs::create_dir_all(dir)
            .map_err(|err| format!("cannot create {}: {err}", dir.display()))?;
    }
    Ok(video_dir)
}

/// Builds `capture_{display}_{timestamp}.mp4`, adding a numeric suffix
/// when a same-second start would collide with an existing file.
fn unique_output_path(video_dir: &Path, display_index: usize) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("capture_{display_index}_{stamp}");
    let mut candidate = video_dir.join(format!("{base}.mp4"));
    let mut n = 2;
    while candidate.exists() {
        candidate = video_dir.join(format!("{base}_{n}.mp4"));
        n += 1;
    }
    candidate
}

/// Assembles the encoder argument vector for one request. Display
/// geometry, frame rate, resolution mode, and the audio flag each feed
/// exactly one argument group.
fn build_encoder_args(request: &CaptureRequest, output: &Path) -> Vec<String> {
    let monitor = &request.monitor;
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "gdigrab".into(),
        "-framerate".into(),
        request.fps.to_string(),
        "-offset_x".into(),
        monitor.left.to_string(),
        "-offset_y".into(),
        monitor.top.to_string(),
        "-video_size".into(),
        format!("{}x{}", monitor.width(), monitor.height()),
        "-i".into(),
        "desktop".into(),
    ];

    if request.capture_audio {
        args.extend(["-f".into(), "wasapi".into(), "-i".into(), "default".into()]);
    }

    if let ResolutionMode::Custom { width, height } = request.resolution {
        args.extend(["-vf".into(), format!("scale={width}:{height}")]);
    }

    args.extend([
        "-vsync".into(),
        "cfr".into(),
        "-r".into(),
        request.fps.to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        request.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    if request.capture_audio {
        args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), "192k".into()]);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}
