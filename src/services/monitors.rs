// Monitor Enumeration
// Win32 display discovery with per-monitor DPI lookup

use log::{debug, warn};

use crate::models::Monitor;

/// Lists the active displays in OS enumeration order.
///
/// Every call is a fresh query; indices restart at 1 each time. Returns
/// an empty list when enumeration fails or the platform has no display
/// API, so callers treat "no displays" uniformly and disable start
/// controls.
pub fn list_monitors() -> Vec<Monitor> {
    let monitors = platform::enumerate();
    if monitors.is_empty() {
        warn!("[Monitors] enumeration returned no displays");
    } else {
        debug!("[Monitors] found {} display(s)", monitors.len());
    }
    monitors
}

/// Opts the process into per-monitor-V2 DPI awareness so monitor
/// rectangles come back in physical pixels. Returns whether the request
/// took effect; never fails the program.
pub fn try_set_per_monitor_dpi_awareness() -> bool {
    platform::set_dpi_awareness()
}

#[cfg(windows)]
mod platform {
    use log::warn;

    use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW,
    };
    use windows::Win32::UI::HiDpi::{
        GetDpiForMonitor, SetProcessDPIAware, SetProcessDpiAwarenessContext,
        DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, MDT_EFFECTIVE_DPI,
    };

    use crate::models::Monitor;

    pub(super) fn enumerate() -> Vec<Monitor> {
        unsafe extern "system" fn enum_proc(
            hmonitor: HMONITOR,
            _hdc: HDC,
            _rect: *mut RECT,
            data: LPARAM,
        ) -> BOOL {
            let monitors = unsafe { &mut *(data.0 as *mut Vec<Monitor>) };
            let mut info = MONITORINFOEXW::default();
            info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
            if unsafe { GetMonitorInfoW(hmonitor, &mut info.monitorInfo as *mut _ as *mut _) }
                .as_bool()
            {
                let rc = info.monitorInfo.rcMonitor;
                let device = String::from_utf16_lossy(&info.szDevice)
                    .trim_end_matches('\0')
                    .to_string();
                let (dpi_x, dpi_y) = monitor_dpi(hmonitor);
                monitors.push(Monitor {
                    index: monitors.len() + 1,
                    device,
                    left: rc.left,
                    top: rc.top,
                    right: rc.right,
                    bottom: rc.bottom,
                    dpi_x,
                    dpi_y,
                });
            }
            BOOL(1)
        }

        let mut monitors: Vec<Monitor> = Vec::new();
        let ok = unsafe {
            EnumDisplayMonitors(
                None,
                None,
                Some(enum_proc),
                LPARAM(&mut monitors as *mut Vec<Monitor> as isize),
            )
        };
        if !ok.as_bool() {
            warn!("[Monitors] EnumDisplayMonitors failed");
            return Vec::new();
        }
        monitors
    }

    /// Best-effort effective-DPI lookup. A monitor that refuses the
    /// query simply reports no DPI; the rest of the list is unaffected.
    fn monitor_dpi(hmonitor: HMONITOR) -> (Option<u32>, Option<u32>) {
        let mut dpi_x = 0u32;
        let mut dpi_y = 0u32;
        match unsafe { GetDpiForMonitor(hmonitor, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y) } {
            Ok(()) => (Some(dpi_x), Some(dpi_y)),
            Err(_) => (None, None),
        }
    }

    pub(super) fn set_dpi_awareness() -> bool {
        if unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
            .is_ok()
        {
            return true;
        }
        // Windows before 1703 has no awareness-context API; fall back
        // to the legacy process-wide opt-in.
        unsafe { SetProcessDPIAware() }.as_bool()
    }
}

#[cfg(not(windows))]
mod platform {
    use crate::models::Monitor;

    pub(super) fn enumerate() -> Vec<Monitor> {
        Vec::new()
    }

    pub(super) fn set_dpi_awareness() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_sequential_from_one() {
        // Whatever the machine reports, indices and rectangles must be
        // consistent; an empty list is a valid outcome.
        let monitors = list_monitors();
        for (i, monitor) in monitors.iter().enumerate() {
            assert_eq!(monitor.index, i + 1);
            assert!(monitor.right > monitor.left);
            assert!(monitor.bottom > monitor.top);
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn test_non_windows_enumeration_is_empty() {
        assert!(list_monitors().is_empty());
        assert!(!try_set_per_monitor_dpi_awareness());
    }

    #[cfg(windows)]
    #[test]
    fn test_dpi_awareness_opt_in_reports_success() {
        // Either the context setter or the legacy call takes effect on
        // any supported Windows. No other test touches the process-wide
        // awareness state, so the first attempt is the one under test.
        assert!(try_set_per_monitor_dpi_awareness());
    }

    #[test]
    fn test_fresh_list_every_call() {
        let first = list_monitors();
        let second = list_monitors();
        assert_eq!(first.len(), second.len());
    }
}
