// Global Hotkeys
// System-wide HOME/END bindings that control the active session

use std::sync::Arc;

/// Hotkey id for the pause/resume binding (HOME).
pub const HOTKEY_ID_PAUSE: i32 = 1;
/// Hotkey id for the stop binding (END).
pub const HOTKEY_ID_STOP: i32 = 2;

/// What a registered hotkey asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    PauseResume,
    Stop,
}

impl HotkeyAction {
    /// Action registered under the given hotkey id, if any.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            HOTKEY_ID_PAUSE => Some(HotkeyAction::PauseResume),
            HOTKEY_ID_STOP => Some(HotkeyAction::Stop),
            _ => None,
        }
    }
}

type HotkeyCallback = Arc<dyn Fn(HotkeyAction) + Send + Sync>;

/// Owns the OS-level hotkey registrations and the thread that listens
/// for them. The callback runs on the listener thread, so it must stay
/// cheap; handing the action to a channel is the intended use.
pub struct HotkeyService {
    callback: HotkeyCallback,
    listener: Option<platform::Listener>,
}

impl HotkeyService {
    pub fn new(callback: HotkeyCallback) -> Self {
        Self {
            callback,
            listener: None,
        }
    }

    /// Claims both bindings system-wide. Returns `true` only when both
    /// registrations succeeded. A partial registration keeps delivering
    /// the binding that did succeed; callers decide whether to keep it
    /// or call [`unregister_all`](Self::unregister_all).
    pub fn register_all(&mut self) -> bool {
        if let Some(listener) = &self.listener {
            return listener.all_registered;
        }
        match platform::spawn_listener(Arc::clone(&self.callback)) {
            Some(listener) => {
                let all = listener.all_registered;
                self.listener = Some(listener);
                all
            }
            None => false,
        }
    }

    /// Whether a listener currently holds any registration attempt.
    pub fn is_registered(&self) -> bool {
        self.listener.is_some()
    }

    /// Releases both bindings and stops the listener thread. Safe to
    /// call repeatedly and safe after a partial registration; both ids
    /// are always released.
    pub fn unregister_all(&mut self) {
        if let Some(listener) = self.listener.take() {
            platform::stop_listener(listener);
        }
    }
}

impl Drop for HotkeyService {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

#[cfg(windows)]
mod platform {
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};

    use log::{debug, warn};
    use windows::Win32::Foundation::{LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_NOREPEAT, VK_END, VK_HOME,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, PostThreadMessageW, TranslateMessage, MSG, WM_HOTKEY,
        WM_QUIT,
    };

    use super::{HotkeyAction, HotkeyCallback, HOTKEY_ID_PAUSE, HOTKEY_ID_STOP};

    pub(super) struct Listener {
        thread: Option<JoinHandle<()>>,
        thread_id: u32,
        pub(super) all_registered: bool,
    }

    /// Spawns the message-loop thread and registers both hotkeys on it.
    /// WM_HOTKEY is delivered to the registering thread, so registration
    /// and the loop must share one.
    pub(super) fn spawn_listener(callback: HotkeyCallback) -> Option<Listener> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                let thread_id = unsafe { GetCurrentThreadId() };
                let all_registered = register_current_thread();
                if ready_tx.send((thread_id, all_registered)).is_err() {
                    unregister_current_thread();
                    return;
                }
                run_message_loop(callback.as_ref());
                unregister_current_thread();
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                warn!("[Hotkeys] failed to spawn listener thread: {err}");
                return None;
            }
        };

        match ready_rx.recv() {
            Ok((thread_id, all_registered)) => Some(Listener {
                thread: Some(thread),
                thread_id,
                all_registered,
            }),
            Err(_) => {
                let _ = thread.join();
                None
            }
        }
    }

    pub(super) fn stop_listener(mut listener: Listener) {
        let posted = unsafe {
            PostThreadMessageW(listener.thread_id, WM_QUIT, WPARAM(0), LPARAM(0))
        }
        .is_ok();

        if let Some(thread) = listener.thread.take() {
            if posted || thread.is_finished() {
                let _ = thread.join();
            } else {
                warn!("[Hotkeys] listener did not accept shutdown message; leaving it detached");
            }
        }
    }

    fn register_current_thread() -> bool {
        let pause =
            unsafe { RegisterHotKey(None, HOTKEY_ID_PAUSE, MOD_NOREPEAT, VK_HOME.0 as u32) };
        if let Err(err) = &pause {
            warn!("[Hotkeys] HOME registration failed: {err}");
        }
        let stop = unsafe { RegisterHotKey(None, HOTKEY_ID_STOP, MOD_NOREPEAT, VK_END.0 as u32) };
        if let Err(err) = &stop {
            warn!("[Hotkeys] END registration failed: {err}");
        }
        pause.is_ok() && stop.is_ok()
    }

    fn unregister_current_thread() {
        // Both ids unconditionally. After a partial registration the
        // failed id just reports an error here, which is fine.
        for id in [HOTKEY_ID_PAUSE, HOTKEY_ID_STOP] {
            if let Err(err) = unsafe { UnregisterHotKey(None, id) } {
                debug!("[Hotkeys] unregister id {id}: {err}");
            }
        }
    }

    fn run_message_loop(callback: &(dyn Fn(HotkeyAction) + Send + Sync)) {
        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, None, 0, 0).as_bool() {
                if msg.message == WM_HOTKEY {
                    if let Some(action) = HotkeyAction::from_id(msg.wParam.0 as i32) {
                        callback(action);
                    }
                    continue;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

#[cfg(not(windows))]
mod platform {
    use log::info;

    use super::HotkeyCallback;

    pub(super) struct Listener {
        pub(super) all_registered: bool,
    }

    pub(super) fn spawn_listener(_callback: HotkeyCallback) -> Option<Listener> {
        info!("[Hotkeys] global hotkeys are not available on this platform");
        None
    }

    pub(super) fn stop_listener(_listener: Listener) {}
}
