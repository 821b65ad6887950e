//! Window and process discovery
//!
//! Enumerates top-level windows through whichever facility works on this
//! machine and exposes them as uniform [`WindowInfo`] handles.
//!
//! On Linux the chain is `xdotool`, then `wmctrl`, then the native display
//! client (`xcap`). Elsewhere the native enumeration is used directly.
//! Process matching maps window PIDs to process names as a last resort.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::command::{args, CommandRunner, SystemRunner};
use super::ControllerError;
use crate::geometry::Region;

const TOOL_TIMEOUT: Duration = Duration::from_secs(3);

/// Which facility produced a handle; decides how it is manipulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBackend {
    Native,
    Xdotool,
    Wmctrl,
}

/// A top-level window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: u64,
    pub title: String,
    /// Window-manager class (`WM_CLASS` class part on X11)
    pub class: String,
    pub pid: Option<u32>,
    /// Process name when the backend reports it directly
    pub process_name: Option<String>,
    /// Outer geometry in screen coordinates
    pub region: Region,
    pub minimized: bool,
    pub backend: WindowBackend,
}

impl WindowInfo {
    fn bare(id: u64, backend: WindowBackend) -> Self {
        Self {
            id,
            title: String::new(),
            class: String::new(),
            pid: None,
            process_name: None,
            region: Region::new(0, 0, 0, 0),
            minimized: false,
            backend,
        }
    }

    /// Bring the window to the foreground
    pub fn activate(&self) -> Result<(), ControllerError> {
        #[cfg(windows)]
        {
            super::win32::activate(self.id)
        }
        #[cfg(not(windows))]
        {
            match self.backend {
                WindowBackend::Wmctrl => wm_tool("wmctrl", &["-ia", &self.hex_id()]),
                _ => wm_tool("xdotool", &["windowactivate", "--sync", &self.id.to_string()])
                    .or_else(|_| wm_tool("wmctrl", &["-ia", &self.hex_id()])),
            }
        }
    }

    pub fn minimize(&self) -> Result<(), ControllerError> {
        #[cfg(windows)]
        {
            super::win32::minimize(self.id)
        }
        #[cfg(not(windows))]
        {
            wm_tool("xdotool", &["windowminimize", &self.id.to_string()])
        }
    }

    pub fn restore(&self) -> Result<(), ControllerError> {
        #[cfg(windows)]
        {
            super::win32::restore(self.id)
        }
        #[cfg(not(windows))]
        {
            wm_tool("xdotool", &["windowmap", &self.id.to_string()])
                .or_else(|_| self.activate())
        }
    }

    /// Client area in screen coordinates; the outer geometry where the
    /// platform has no separate notion of a client area.
    pub fn client_region(&self) -> Option<Region> {
        #[cfg(windows)]
        {
            super::win32::client_region(self.id)
        }
        #[cfg(not(windows))]
        {
            Some(self.region).filter(|r| !r.is_empty())
        }
    }

    /// Re-query the minimized flag where the backend can
    pub fn is_minimized(&self) -> bool {
        #[cfg(windows)]
        {
            super::win32::is_minimized(self.id)
        }
        #[cfg(not(windows))]
        {
            self.minimized
        }
    }

    #[allow(dead_code)]
    fn hex_id(&self) -> String {
        format!("0x{:08x}", self.id)
    }
}

#[cfg(not(windows))]
fn wm_tool(program: &str, argv: &[&str]) -> Result<(), ControllerError> {
    let out = SystemRunner.run(program, &args(argv), TOOL_TIMEOUT)?;
    if out.success() {
        Ok(())
    } else {
        Err(ControllerError::CommandFailed {
            command: super::command::describe(program, &args(argv)),
            code: out.code,
            stderr: out.stderr_text(),
        })
    }
}

/// All visible top-level windows, from the first facility that yields any
pub fn get_all_windows() -> Vec<WindowInfo> {
    if cfg!(target_os = "linux") {
        let runner = SystemRunner;
        if which::which("xdotool").is_ok() {
            let found = list_with_xdotool(&runner);
            if !found.is_empty() {
                return found;
            }
        }
        if which::which("wmctrl").is_ok() {
            let found = list_with_wmctrl(&runner);
            if !found.is_empty() {
                return found;
            }
        }
    }
    list_native()
}

/// Windows whose title or class equals `title`, else whose title contains
/// it case-insensitively
pub fn get_windows_with_title(title: &str) -> Vec<WindowInfo> {
    let all = get_all_windows();
    let exact: Vec<_> = all
        .iter()
        .filter(|w| w.title.trim() == title || w.class == title)
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    let needle = title.to_lowercase();
    all.into_iter()
        .filter(|w| w.title.to_lowercase().contains(&needle))
        .collect()
}

/// First titled window owned by a process whose name contains `name`
pub fn find_window_by_process_name(name: &str) -> Option<WindowInfo> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    get_all_windows().into_iter().find(|w| {
        process_name_of(w)
            .map(|p| p.to_lowercase().contains(&needle))
            .unwrap_or(false)
    })
}

/// Locate the window a controller should drive
pub fn find_window(title: &str, process_hints: &[String]) -> Option<WindowInfo> {
    let windows = get_all_windows();
    match_window(&windows, title, process_hints, process_name_of)
}

/// Apply the matching policy to a window list. The first non-empty tier wins:
/// exact title, exact class, title substring (case-insensitive), class equal
/// to a process hint, then process name containing a hint.
pub fn match_window<F>(
    windows: &[WindowInfo],
    title: &str,
    process_hints: &[String],
    process_name: F,
) -> Option<WindowInfo>
where
    F: Fn(&WindowInfo) -> Option<String>,
{
    let wanted = title.trim();
    if !wanted.is_empty() {
        if let Some(w) = windows.iter().find(|w| w.title.trim() == wanted) {
            return Some(w.clone());
        }
        if let Some(w) = windows.iter().find(|w| w.class == wanted) {
            return Some(w.clone());
        }
        let needle = wanted.to_lowercase();
        if let Some(w) = windows
            .iter()
            .find(|w| !w.title.is_empty() && w.title.to_lowercase().contains(&needle))
        {
            return Some(w.clone());
        }
    }

    let hints: Vec<String> = process_hints
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect();

    for hint in &hints {
        if let Some(w) = windows.iter().find(|w| w.class.to_lowercase() == *hint) {
            return Some(w.clone());
        }
    }

    // Untitled windows owned by a matching process are helpers, not the game.
    for hint in &hints {
        if let Some(w) = windows.iter().find(|w| {
            !w.title.trim().is_empty()
                && process_name(w)
                    .map(|p| p.to_lowercase().contains(hint))
                    .unwrap_or(false)
        }) {
            return Some(w.clone());
        }
    }
    None
}

/// Process name for a window, from the backend or the PID
pub fn process_name_of(window: &WindowInfo) -> Option<String> {
    if let Some(name) = window.process_name.as_ref().filter(|n| !n.is_empty()) {
        return Some(name.clone());
    }
    let pid = window.pid?;
    process_name_for_pid(pid)
}

#[cfg(target_os = "linux")]
fn process_name_for_pid(pid: u32) -> Option<String> {
    std::fs::read_to_string(format!("/proc/{pid}/comm"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
fn process_name_for_pid(_pid: u32) -> Option<String> {
    None
}

fn list_native() -> Vec<WindowInfo> {
    let windows = match xcap::Window::all() {
        Ok(w) => w,
        Err(e) => {
            log::debug!("[Window] native enumeration failed: {}", e);
            return Vec::new();
        }
    };
    windows
        .iter()
        .map(|w| WindowInfo {
            id: u64::from(w.id()),
            title: w.title().to_string(),
            class: String::new(),
            pid: None,
            process_name: Some(w.app_name().to_string()),
            region: Region::new(w.x(), w.y(), w.width(), w.height()),
            minimized: w.is_minimized(),
            backend: WindowBackend::Native,
        })
        .collect()
}

fn list_with_xdotool(runner: &dyn CommandRunner) -> Vec<WindowInfo> {
    let ids = match tool_stdout(runner, "xdotool", &["search", "--onlyvisible", "--name", ".*"]) {
        Some(out) => parse_id_list(&out),
        None => return Vec::new(),
    };

    let mut windows = Vec::with_capacity(ids.len());
    for id in ids {
        let sid = id.to_string();
        let mut info = WindowInfo::bare(id, WindowBackend::Xdotool);
        if let Some(geo) = tool_stdout(runner, "xdotool", &["getwindowgeometry", "--shell", &sid]) {
            if let Some(region) = parse_xdotool_geometry(&geo) {
                info.region = region;
            }
        }
        info.title = tool_stdout(runner, "xdotool", &["getwindowname", &sid])
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        info.class = tool_stdout(runner, "xdotool", &["getwindowclassname", &sid])
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if let Some(props) = tool_stdout(runner, "xprop", &["-id", &sid, "_NET_WM_PID", "_NET_WM_STATE"]) {
            let (pid, hidden) = parse_xprop(&props);
            info.pid = pid;
            info.minimized = hidden;
        }
        windows.push(info);
    }
    windows
}

fn list_with_wmctrl(runner: &dyn CommandRunner) -> Vec<WindowInfo> {
    tool_stdout(runner, "wmctrl", &["-lpGx"])
        .map(|out| out.lines().filter_map(parse_wmctrl_line).collect())
        .unwrap_or_default()
}

fn tool_stdout(runner: &dyn CommandRunner, program: &str, argv: &[&str]) -> Option<String> {
    match runner.run(program, &args(argv), TOOL_TIMEOUT) {
        Ok(out) if out.success() => Some(out.stdout_text()),
        Ok(_) => None,
        Err(e) => {
            log::debug!("[Window] {} failed: {}", program, e);
            None
        }
    }
}

/// Decimal window ids, one per line
pub fn parse_id_list(output: &str) -> Vec<u64> {
    output
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect()
}

/// `KEY=VALUE` lines from `xdotool getwindowgeometry --shell`
pub fn parse_xdotool_geometry(output: &str) -> Option<Region> {
    let (mut x, mut y, mut w, mut h) = (None, None, None, None);
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "X" => x = value.parse::<i32>().ok(),
            "Y" => y = value.parse::<i32>().ok(),
            "WIDTH" => w = value.parse::<u32>().ok(),
            "HEIGHT" => h = value.parse::<u32>().ok(),
            _ => {}
        }
    }
    Some(Region::new(x?, y?, w?, h?))
}

static XPROP_PID: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"_NET_WM_PID\(CARDINAL\)\s*=\s*(\d+)").ok());

/// PID and hidden flag from `xprop -id <id> _NET_WM_PID _NET_WM_STATE`
pub fn parse_xprop(output: &str) -> (Option<u32>, bool) {
    let pid = XPROP_PID
        .as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|c| c[1].parse().ok());
    (pid, output.contains("_NET_WM_STATE_HIDDEN"))
}

/// One line of `wmctrl -lpGx`:
/// `id desktop pid x y w h instance.Class host title...`
pub fn parse_wmctrl_line(line: &str) -> Option<WindowInfo> {
    let mut parts = line.split_whitespace();
    let id = u64::from_str_radix(parts.next()?.trim_start_matches("0x"), 16).ok()?;
    let _desktop = parts.next()?;
    let pid: u32 = parts.next()?.parse().ok()?;
    let x: i32 = parts.next()?.parse().ok()?;
    let y: i32 = parts.next()?.parse().ok()?;
    let w: u32 = parts.next()?.parse().ok()?;
    let h: u32 = parts.next()?.parse().ok()?;
    let wm_class = parts.next()?;
    let _host = parts.next()?;
    let title = parts.collect::<Vec<_>>().join(" ");

    let class = wm_class
        .rsplit_once('.')
        .map(|(_, class)| class)
        .unwrap_or(wm_class)
        .to_string();

    Some(WindowInfo {
        id,
        title,
        class,
        pid: (pid > 0).then_some(pid),
        process_name: None,
        region: Region::new(x, y, w, h),
        minimized: false,
        backend: WindowBackend::Wmctrl,
    })
}
