//! Win32 window manipulation for native handles

use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::UI::WindowsAndMessaging::{
    GetClientRect, IsIconic, IsWindow, IsWindowVisible, SetForegroundWindow, ShowWindow,
    SW_MINIMIZE, SW_RESTORE,
};

use super::ControllerError;
use crate::geometry::Region;

fn hwnd(id: u64) -> HWND {
    HWND(id as usize as *mut core::ffi::c_void)
}

pub fn activate(id: u64) -> Result<(), ControllerError> {
    // SAFETY: the handle came from window enumeration; Win32 validates it.
    let ok = unsafe { SetForegroundWindow(hwnd(id)) };
    if ok.as_bool() {
        Ok(())
    } else {
        Err(ControllerError::Input(format!(
            "SetForegroundWindow refused window {id:#x}"
        )))
    }
}

pub fn minimize(id: u64) -> Result<(), ControllerError> {
    // SAFETY: see `activate`. The return value is the previous visibility.
    unsafe {
        let _ = ShowWindow(hwnd(id), SW_MINIMIZE);
    }
    Ok(())
}

pub fn restore(id: u64) -> Result<(), ControllerError> {
    // SAFETY: see `activate`.
    unsafe {
        let _ = ShowWindow(hwnd(id), SW_RESTORE);
    }
    Ok(())
}

pub fn is_minimized(id: u64) -> bool {
    // SAFETY: see `activate`.
    unsafe { IsIconic(hwnd(id)).as_bool() }
}

/// Client rectangle translated to screen coordinates
pub fn client_region(id: u64) -> Option<Region> {
    let h = hwnd(id);
    // SAFETY: all out-pointers are valid locals.
    unsafe {
        if !IsWindow(h).as_bool() || !IsWindowVisible(h).as_bool() {
            return None;
        }
        let mut rect = RECT::default();
        GetClientRect(h, &mut rect).ok()?;
        let mut top_left = POINT { x: 0, y: 0 };
        let mut bottom_right = POINT {
            x: rect.right,
            y: rect.bottom,
        };
        if !ClientToScreen(h, &mut top_left).as_bool()
            || !ClientToScreen(h, &mut bottom_right).as_bool()
        {
            return None;
        }
        let width = (bottom_right.x - top_left.x).max(0) as u32;
        let height = (bottom_right.y - top_left.y).max(0) as u32;
        Some(Region::new(top_left.x, top_left.y, width, height)).filter(|r| !r.is_empty())
    }
}
