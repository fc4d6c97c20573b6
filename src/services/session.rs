// Session Controller
// Single-writer state machine routing front-end and hotkey commands
// into the encoder supervisor

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::models::{
    CaptureRequest, Monitor, Preset, ResolutionMode, DEFAULT_CRF, DEFAULT_FPS,
};
use crate::services::{
    emit_status, list_monitors, EncoderSupervisor, EventSink, HotkeyAction, Severity,
};

/// Lifecycle of the recording session. `Starting` and `Stopping` only
/// exist while the controller is processing the matching command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
}

/// How long to wait between accepting a start and launching the
/// encoder, so a front-end window has time to get out of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDelay {
    Standard,
    Minimal,
}

impl StartDelay {
    pub fn duration(self) -> Duration {
        match self {
            StartDelay::Standard => Duration::from_millis(2000),
            StartDelay::Minimal => Duration::from_millis(150),
        }
    }
}

/// Capture parameters for one start command. The display and output
/// folder come from the controller's current selection and settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub resolution: ResolutionMode,
    pub fps: u32,
    pub crf: u32,
    pub capture_audio: bool,
    pub delay: StartDelay,
}

impl StartOptions {
    pub fn from_preset(preset: &Preset, delay: StartDelay) -> Self {
        Self {
            resolution: preset.resolution,
            fps: preset.fps,
            crf: preset.crf,
            capture_audio: false,
            delay,
        }
    }
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            resolution: ResolutionMode::Native,
            fps: DEFAULT_FPS,
            crf: DEFAULT_CRF,
            capture_audio: false,
            delay: StartDelay::Standard,
        }
    }
}

/// Everything the controller reacts to. Commands queue up while an
/// earlier one is still being processed, so a stop issued mid-start is
/// handled right after the start finishes instead of getting lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start(StartOptions),
    Stop,
    TogglePause,
    RefreshDisplays,
    SelectDisplay(usize),
}

impl From<HotkeyAction> for ControlCommand {
    fn from(action: HotkeyAction) -> Self {
        match action {
            HotkeyAction::PauseResume => ControlCommand::TogglePause,
            HotkeyAction::Stop => ControlCommand::Stop,
        }
    }
}

/// Cloneable sender half handed to hotkey callbacks and input threads.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<ControlCommand>,
}

impl SessionHandle {
    pub fn new(tx: Sender<ControlCommand>) -> Self {
        Self { tx }
    }

    /// Queues a command for the controller. `false` once the controller
    /// is gone.
    pub fn send(&self, command: ControlCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Drives the session state machine. All mutations happen on the thread
/// that calls [`process_next`](Self::process_next), which keeps the
/// encoder supervisor single-owner without any locking.
pub struct SessionController {
    state: SessionState,
    supervisor: EncoderSupervisor,
    monitors: Vec<Monitor>,
    selected: Option<usize>,
    output_root: PathBuf,
    sink: Arc<dyn EventSink>,
    commands: Receiver<ControlCommand>,
}

impl SessionController {
    pub fn new(
        encoder_path: impl Into<String>,
        output_root: PathBuf,
        sink: Arc<dyn EventSink>,
        commands: Receiver<ControlCommand>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            supervisor: EncoderSupervisor::new(encoder_path, Arc::clone(&sink)),
            monitors: Vec::new(),
            selected: None,
            output_root,
            sink,
            commands,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn selected_monitor(&self) -> Option<&Monitor> {
        match self.selected {
            Some(index) if index >= 1 => self.monitors.get(index - 1),
            _ => None,
        }
    }

    /// Blocks for the next command and processes it. `false` when every
    /// sender is gone and no command will ever arrive again.
    pub fn process_next(&mut self) -> bool {
        match self.commands.recv() {
            Ok(command) => {
                self.process(command);
                true
            }
            Err(_) => false,
        }
    }

    pub fn process(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start(options) => self.start(options),
            ControlCommand::Stop => self.stop(),
            ControlCommand::TogglePause => self.toggle_pause(),
            ControlCommand::RefreshDisplays => self.refresh_displays(),
            ControlCommand::SelectDisplay(index) => {
                self.select_display(index);
            }
        }
    }

    /// Re-enumerates the attached displays and re-validates the current
    /// selection against the fresh list.
    pub fn refresh_displays(&mut self) {
        if self.state != SessionState::Idle {
            warn!("[Session] display refresh ignored while a session is active");
            return;
        }
        self.apply_displays(list_monitors());
    }

    fn apply_displays(&mut self, monitors: Vec<Monitor>) {
        self.monitors = monitors;
        for monitor in &self.monitors {
            info!("[Session] {}", monitor.label());
        }

        let still_valid = self
            .selected
            .map(|index| index >= 1 && index <= self.monitors.len())
            .unwrap_or(false);
        if !still_valid {
            self.selected = if self.monitors.is_empty() {
                None
            } else {
                Some(1)
            };
        }
    }

    /// Picks the display with the given 1-based index from the current
    /// list. Rejected outside `Idle` and for indices not in the list.
    pub fn select_display(&mut self, index: usize) -> bool {
        if self.state != SessionState::Idle {
            warn!("[Session] display selection ignored while a session is active");
            return false;
        }
        if index == 0 || index > self.monitors.len() {
            warn!("[Session] display {index} is not in the current list");
            return false;
        }
        self.selected = Some(index);
        true
    }

    fn start(&mut self, options: StartOptions) {
        if self.state != SessionState::Idle {
            warn!("[Session] start ignored in state {:?}", self.state);
            return;
        }
        let monitor = match self.selected_monitor().cloned() {
            Some(monitor) => monitor,
            None => {
                error!("[Session] start rejected: no display selected");
                emit_status(
                    self.sink.as_ref(),
                    Severity::Error,
                    "Start failed: no display selected",
                );
                return;
            }
        };

        self.transition(SessionState::Starting);
        info!(
            "[Session] starting on {} after {}ms",
            monitor.label(),
            options.delay.duration().as_millis()
        );
        thread::sleep(options.delay.duration());

        let request = CaptureRequest {
            monitor,
            resolution: options.resolution,
            fps: options.fps,
            crf: options.crf,
            capture_audio: options.capture_audio,
            output_root: self.output_root.clone(),
        };
        match self.supervisor.start_session(&request) {
            Ok(path) => {
                info!("[Session] recording to {}", path.display());
                self.transition(SessionState::Recording);
            }
            Err(_) => {
                // Supervisor already reported the failure to the sink.
                self.transition(SessionState::Idle);
            }
        }
    }

    fn stop(&mut self) {
        match self.state {
            SessionState::Recording | SessionState::Paused => {
                self.transition(SessionState::Stopping);
                self.supervisor.stop_session();
                self.transition(SessionState::Idle);
            }
            _ => debug!("[Session] stop ignored in state {:?}", self.state),
        }
    }

    fn toggle_pause(&mut self) {
        match self.state {
            SessionState::Recording | SessionState::Paused => {
                self.supervisor.toggle_pause();
                // The supervisor keeps its state when the toggle write
                // fails; mirror it instead of assuming the flip.
                let next = if self.supervisor.is_paused() {
                    SessionState::Paused
                } else {
                    SessionState::Recording
                };
                if next != self.state {
                    self.transition(next);
                }
            }
            _ => debug!("[Session] pause toggle ignored in state {:?}", self.state),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !is_valid_transition(self.state, next) {
            error!("[Session] invalid transition {:?} -> {:?}", self.state, next);
            return;
        }
        debug!("[Session] {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    matches!(
        (from, to),
        (Idle, Starting)
            | (Starting, Recording)
            | (Starting, Idle)
            | (Recording, Paused)
            | (Paused, Recording)
            | (Recording, Stopping)
            | (Paused, Stopping)
            | (Stopping, Idle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PRESETS;
    use crate::services::CollectingSink;
    use std::sync::mpsc;

    fn monitor(index: usize) -> Monitor {
        let left = (index as i32 - 1) * 1920;
        Monitor {
            index,
            device: format!("\\\\.\\DISPLAY{index}"),
            left,
            top: 0,
            right: left + 1920,
            bottom: 1080,
            dpi_x: Some(96),
            dpi_y: Some(96),
        }
    }

    fn controller(
        encoder: &str,
        output_root: PathBuf,
        monitors: Vec<Monitor>,
    ) -> (SessionController, SessionHandle, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let (tx, rx) = mpsc::channel();
        let mut controller = SessionController::new(
            encoder,
            output_root,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            rx,
        );
        controller.apply_displays(monitors);
        (controller, SessionHandle::new(tx), sink)
    }

    fn minimal_options() -> StartOptions {
        StartOptions {
            delay: StartDelay::Minimal,
            ..StartOptions::default()
        }
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        let valid = [
            (Idle, Starting),
            (Starting, Recording),
            (Starting, Idle),
            (Recording, Paused),
            (Paused, Recording),
            (Recording, Stopping),
            (Paused, Stopping),
            (Stopping, Idle),
        ];
        for (from, to) in valid {
            assert!(is_valid_transition(from, to), "{from:?} -> {to:?}");
        }

        let invalid = [
            (Idle, Recording),
            (Idle, Stopping),
            (Recording, Idle),
            (Paused, Idle),
            (Stopping, Recording),
            (Starting, Paused),
            (Idle, Idle),
        ];
        for (from, to) in invalid {
            assert!(!is_valid_transition(from, to), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn test_hotkeys_map_to_commands() {
        assert_eq!(
            ControlCommand::from(HotkeyAction::PauseResume),
            ControlCommand::TogglePause
        );
        assert_eq!(ControlCommand::from(HotkeyAction::Stop), ControlCommand::Stop);
    }

    #[test]
    fn test_delay_values() {
        assert_eq!(StartDelay::Standard.duration(), Duration::from_millis(2000));
        assert_eq!(StartDelay::Minimal.duration(), Duration::from_millis(150));
    }

    #[test]
    fn test_options_from_preset_copy_fields() {
        let options = StartOptions::from_preset(&PRESETS[2], StartDelay::Minimal);
        assert_eq!(options.fps, PRESETS[2].fps);
        assert_eq!(options.crf, PRESETS[2].crf);
        assert_eq!(options.resolution, PRESETS[2].resolution);
        assert!(!options.capture_audio);
        assert_eq!(options.delay, StartDelay::Minimal);
    }

    #[test]
    fn test_selection_survives_refresh_only_if_still_listed() {
        let (mut controller, _handle, _sink) =
            controller("unused", PathBuf::from("/tmp/out"), vec![monitor(1), monitor(2)]);
        assert!(controller.select_display(2));
        assert_eq!(controller.selected_monitor().map(|m| m.index), Some(2));

        controller.apply_displays(vec![monitor(1)]);
        assert_eq!(controller.selected_monitor().map(|m| m.index), Some(1));

        controller.apply_displays(Vec::new());
        assert!(controller.selected_monitor().is_none());

        controller.apply_displays(vec![monitor(1), monitor(2)]);
        assert_eq!(controller.selected_monitor().map(|m| m.index), Some(1));
    }

    #[test]
    fn test_select_display_bounds() {
        let (mut controller, _handle, _sink) =
            controller("unused", PathBuf::from("/tmp/out"), vec![monitor(1), monitor(2)]);
        assert!(!controller.select_display(0));
        assert!(!controller.select_display(3));
        assert!(controller.select_display(1));
        assert!(controller.select_display(2));
    }

    #[test]
    fn test_start_without_display_stays_idle() {
        let (mut controller, _handle, sink) =
            controller("unused", PathBuf::from("/tmp/out"), Vec::new());

        controller.process(ControlCommand::Start(minimal_options()));
        assert_eq!(controller.state(), SessionState::Idle);

        let statuses = sink.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, "error");
    }

    #[cfg(unix)]
    mod lifecycle {
        use super::*;
        use crate::services::EVENT_SESSION_ENDED;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use tempfile::TempDir;

        fn fake_encoder(dir: &Path) -> String {
            let script = dir.join("fake_encoder.sh");
            fs::write(
                &script,
                "#!/bin/sh\nwhile read line; do\n  if [ \"$line\" = \"q\" ]; then\n    exit 0\n  fi\ndone\nexit 0\n",
            )
            .unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            script.to_string_lossy().into_owned()
        }

        #[test]
        fn test_full_lifecycle_via_commands() {
            let tmp = TempDir::new().unwrap();
            let encoder = fake_encoder(tmp.path());
            let (mut controller, _handle, sink) =
                controller(&encoder, tmp.path().join("out"), vec![monitor(1)]);

            controller.process(ControlCommand::Start(minimal_options()));
            assert_eq!(controller.state(), SessionState::Recording);

            // Selection and refresh are locked while recording.
            assert!(!controller.select_display(1));

            controller.process(ControlCommand::TogglePause);
            assert_eq!(controller.state(), SessionState::Paused);

            // The hotkey path is the same command.
            controller.process(ControlCommand::from(HotkeyAction::PauseResume));
            assert_eq!(controller.state(), SessionState::Recording);

            controller.process(ControlCommand::from(HotkeyAction::Stop));
            assert_eq!(controller.state(), SessionState::Idle);

            let statuses = sink.statuses();
            let expected: Vec<(String, String)> = [
                ("info", "Recording in progress"),
                ("warning", "Paused"),
                ("info", "Recording"),
                ("warning", "Stopping..."),
                ("info", "Saved."),
            ]
            .iter()
            .map(|(sev, msg)| (sev.to_string(), msg.to_string()))
            .collect();
            assert_eq!(statuses, expected);

            // Stop is idempotent once back in Idle.
            let events_before = sink.events().len();
            controller.process(ControlCommand::Stop);
            assert_eq!(controller.state(), SessionState::Idle);
            assert_eq!(sink.events().len(), events_before);
        }

        #[test]
        fn test_stop_queued_during_start_runs_right_after() {
            let tmp = TempDir::new().unwrap();
            let encoder = fake_encoder(tmp.path());
            let (mut controller, handle, sink) =
                controller(&encoder, tmp.path().join("out"), vec![monitor(1)]);

            assert!(handle.send(ControlCommand::Start(minimal_options())));
            assert!(handle.send(ControlCommand::Stop));

            assert!(controller.process_next());
            assert_eq!(controller.state(), SessionState::Recording);
            assert!(controller.process_next());
            assert_eq!(controller.state(), SessionState::Idle);

            assert!(sink
                .events()
                .iter()
                .any(|(name, _)| name == EVENT_SESSION_ENDED));
        }

        #[test]
        fn test_second_start_is_ignored_while_recording() {
            let tmp = TempDir::new().unwrap();
            let encoder = fake_encoder(tmp.path());
            let (mut controller, _handle, sink) =
                controller(&encoder, tmp.path().join("out"), vec![monitor(1)]);

            controller.process(ControlCommand::Start(minimal_options()));
            controller.process(ControlCommand::Start(minimal_options()));
            assert_eq!(controller.state(), SessionState::Recording);

            let recording_statuses = sink
                .statuses()
                .iter()
                .filter(|(_, msg)| msg == "Recording in progress")
                .count();
            assert_eq!(recording_statuses, 1);

            controller.process(ControlCommand::Stop);
        }

        #[test]
        fn test_launch_failure_returns_to_idle() {
            let tmp = TempDir::new().unwrap();
            let (mut controller, _handle, sink) =
                controller("false", tmp.path().join("out"), vec![monitor(1)]);

            controller.process(ControlCommand::Start(minimal_options()));
            assert_eq!(controller.state(), SessionState::Idle);
            assert_eq!(sink.statuses().last().unwrap().0, "error");

            // A fresh start attempt is allowed after the failure.
            controller.process(ControlCommand::Stop);
            assert_eq!(controller.state(), SessionState::Idle);
        }
    }
}
