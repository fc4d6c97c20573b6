// Scenerec console front-end
// Wires the recording core to a terminal: env configuration, console
// status output, global hotkeys, and a stdin command reader

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use chrono::Local;
use log::{debug, error, info, warn, LevelFilter, Log, Metadata, Record};
use serde_json::Value;

use scenerec::models::{suggest_preset_for_monitor, Monitor, PRESETS};
use scenerec::services::{
    try_set_per_monitor_dpi_awareness, ControlCommand, EventSink, HotkeyService,
    SessionController, SessionHandle, SessionState, SettingsManager, StartDelay, StartOptions,
    EVENT_LOG, EVENT_SESSION_ENDED, EVENT_STATUS,
};

// ============================================================================
// Logging
// ============================================================================

struct RecorderLogger {
    level: LevelFilter,
}

impl Log for RecorderLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now();
        let date = timestamp.format("%Y-%m-%d");
        let time = timestamp.format("%H:%M:%S");
        eprintln!(
            "[{date}][{time}][{}][{}] {}",
            record.target(),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn init_logger(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    log::set_boxed_logger(Box::new(RecorderLogger { level }))?;
    log::set_max_level(level);
    Ok(())
}

// ============================================================================
// Console event sink
// ============================================================================

/// Prints core events to stdout. Error statuses also queue a stop so
/// the control loop unwinds instead of waiting on dead hotkeys.
struct ConsoleSink {
    handle: SessionHandle,
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &str, payload: Value) {
        match event {
            EVENT_STATUS => {
                let message = payload["message"].as_str().unwrap_or_default();
                let severity = payload["severity"].as_str().unwrap_or("info");
                println!("[{severity}] {message}");
                if severity == "error" {
                    self.handle.send(ControlCommand::Stop);
                }
            }
            EVENT_LOG => {
                if let Some(line) = payload["line"].as_str() {
                    println!("    {line}");
                }
            }
            EVENT_SESSION_ENDED => {
                let code = payload["exit_code"].as_i64().unwrap_or(-1);
                println!("[info] encoder exited with code {code}");
            }
            _ => {}
        }
    }
}

// ============================================================================
// Environment configuration
// ============================================================================

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|value| parse_bool(&value))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring unparsable {name}={value}");
            None
        }
    }
}

/// Preset override from the environment when it names a real entry,
/// otherwise the size-based suggestion for the monitor.
fn choose_preset_index(requested: Option<usize>, monitor: &Monitor) -> usize {
    match requested {
        Some(index) if index < PRESETS.len() => index,
        Some(index) => {
            warn!("SCENEREC_PRESET={index} is not in the preset list; using the suggested preset");
            suggest_preset_for_monitor(monitor.width(), monitor.height())
        }
        None => suggest_preset_for_monitor(monitor.width(), monitor.height()),
    }
}

/// Encoder binary: explicit override first, then whatever is on PATH.
fn resolve_encoder() -> Option<String> {
    if let Ok(path) = env::var("SCENEREC_FFMPEG") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    which::which("ffmpeg")
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

fn spawn_console_reader(handle: SessionHandle) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let command = match line.trim().to_lowercase().as_str() {
                "q" | "quit" | "stop" => Some(ControlCommand::Stop),
                "p" | "pause" => Some(ControlCommand::TogglePause),
                "" => None,
                other => {
                    println!("Unknown command '{other}'. Use 'p' to pause/resume, 'q' to stop.");
                    None
                }
            };
            if let Some(command) = command {
                let is_stop = command == ControlCommand::Stop;
                if !handle.send(command) || is_stop {
                    break;
                }
            }
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = env::var("SCENEREC_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::Info);
    init_logger(level)?;

    info!("Scenerec v{} starting", env!("CARGO_PKG_VERSION"));

    if try_set_per_monitor_dpi_awareness() {
        debug!("Per-monitor DPI awareness enabled");
    } else {
        debug!("Per-monitor DPI awareness not available");
    }

    let settings_manager = SettingsManager::at_default_location();
    let settings = settings_manager.load();
    // Env override is per-invocation and never written back to config.
    let output_root = env::var("SCENEREC_OUTPUT")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&settings.output_folder));
    info!("Output folder: {}", output_root.display());

    let encoder_path = match resolve_encoder() {
        Some(path) => path,
        None => {
            error!("ffmpeg not found on PATH; install it or set SCENEREC_FFMPEG");
            return Err("ffmpeg not found".into());
        }
    };
    info!("Encoder: {encoder_path}");

    let (tx, rx) = mpsc::channel();
    let handle = SessionHandle::new(tx);
    let sink: Arc<dyn EventSink> = Arc::new(ConsoleSink {
        handle: handle.clone(),
    });
    let mut controller = SessionController::new(encoder_path, output_root, sink, rx);

    controller.refresh_displays();
    if controller.monitors().is_empty() {
        error!("No displays detected; nothing to record");
        return Err("no displays detected".into());
    }

    if let Some(index) = env_parse::<usize>("SCENEREC_DISPLAY") {
        if !controller.select_display(index) {
            warn!("SCENEREC_DISPLAY={index} is not in the display list; keeping display 1");
        }
    }
    let monitor = match controller.selected_monitor().cloned() {
        Some(monitor) => monitor,
        None => {
            error!("No display selected");
            return Err("no display selected".into());
        }
    };
    info!("Capturing {}", monitor.label());

    let preset_index = choose_preset_index(env_parse::<usize>("SCENEREC_PRESET"), &monitor);
    let preset = &PRESETS[preset_index];
    info!("Preset: {}", preset.name);

    let delay = if env_bool("SCENEREC_QUICK_START").unwrap_or(false) {
        StartDelay::Minimal
    } else {
        StartDelay::Standard
    };
    let mut options = StartOptions::from_preset(preset, delay);
    if let Some(fps) = env_parse::<u32>("SCENEREC_FPS") {
        options.fps = fps;
    }
    if let Some(audio) = env_bool("SCENEREC_AUDIO") {
        options.capture_audio = audio;
    }

    let hotkey_handle = handle.clone();
    let mut hotkeys = HotkeyService::new(Arc::new(move |action| {
        hotkey_handle.send(action.into());
    }));
    if hotkeys.register_all() {
        info!("Hotkeys active: HOME pause/resume, END stop");
    } else {
        warn!("Global hotkeys unavailable; use console commands instead");
    }

    spawn_console_reader(handle.clone());
    println!("Controls: HOME or 'p' pauses and resumes, END or 'q' stops.");

    controller.process(ControlCommand::Start(options));
    while controller.state() != SessionState::Idle {
        if !controller.process_next() {
            break;
        }
    }

    hotkeys.unregister_all();
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Monitor {
        Monitor {
            index: 1,
            device: "\\\\.\\DISPLAY1".to_string(),
            left: 0,
            top: 0,
            right: 1920,
            bottom: 1080,
            dpi_x: None,
            dpi_y: None,
        }
    }

    #[test]
    fn test_preset_override_in_range_is_honored() {
        assert_eq!(choose_preset_index(Some(0), &monitor()), 0);
        assert_eq!(choose_preset_index(Some(PRESETS.len() - 1), &monitor()), PRESETS.len() - 1);
    }

    #[test]
    fn test_preset_override_out_of_range_falls_back_to_suggestion() {
        let monitor = monitor();
        let suggested = suggest_preset_for_monitor(monitor.width(), monitor.height());
        assert_eq!(choose_preset_index(Some(PRESETS.len()), &monitor), suggested);
        assert_eq!(choose_preset_index(Some(99), &monitor), suggested);
        assert_eq!(choose_preset_index(None, &monitor), suggested);
    }
}
