//! COM plumbing: apartment setup, strings, ID lists.

use shelltab_core::location::{is_virtual, locations_equivalent};
use shelltab_core::{ShellTabError, ShellTabResult};
use shelltab_watcher::StaInit;
use std::any::Any;
use std::ffi::c_void;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::System::Com::{
    CoInitializeEx, CoTaskMemFree, CoUninitialize, COINIT, COINIT_APARTMENTTHREADED,
    COINIT_MULTITHREADED,
};
use windows::Win32::UI::Shell::Common::ITEMIDLIST;
use windows::Win32::UI::Shell::{ILFree, ILIsEqual, SHParseDisplayName};

/// Keeps COM initialized on the current thread until dropped.
pub(crate) struct ComGuard;

impl ComGuard {
    fn init(mode: COINIT) -> ShellTabResult<Self> {
        unsafe { CoInitializeEx(None, mode) }
            .ok()
            .map_err(|e| ShellTabError::sta(format!("CoInitializeEx failed: {e:?}")))?;
        Ok(Self)
    }

    pub(crate) fn apartment() -> ShellTabResult<Self> {
        Self::init(COINIT_APARTMENTTHREADED)
    }

    pub(crate) fn multithreaded() -> ShellTabResult<Self> {
        Self::init(COINIT_MULTITHREADED)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Initializer for the watcher's STA thread.
pub(crate) fn sta_init() -> StaInit {
    Box::new(|| {
        let guard = ComGuard::apartment()?;
        Ok(Box::new(guard) as Box<dyn Any>)
    })
}

/// Map a COM failure to a shell error naming the call.
pub(crate) fn com_error(call: &'static str) -> impl Fn(windows::core::Error) -> ShellTabError {
    move |e| ShellTabError::shell(format!("{call} failed: {e:?}"))
}

pub(crate) fn to_wide_null(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Copy and free a string allocated by the shell.
pub(crate) fn take_pwstr(value: PWSTR) -> String {
    let text = unsafe { value.to_string() }.unwrap_or_default();
    unsafe { CoTaskMemFree(Some(value.0 as *const c_void)) };
    text
}

/// An absolute item ID list, freed on drop.
pub(crate) struct Pidl(*mut ITEMIDLIST);

impl Pidl {
    /// Parse a display name the way the shell would. `shell:::{GUID}` is
    /// accepted.
    pub(crate) fn parse(location: &str) -> Option<Self> {
        let name = if is_virtual(location) {
            &location["shell:".len()..]
        } else {
            location
        };
        let wide = to_wide_null(name);
        let mut pidl: *mut ITEMIDLIST = std::ptr::null_mut();
        unsafe { SHParseDisplayName(PCWSTR(wide.as_ptr()), None, &mut pidl, 0, None) }.ok()?;
        (!pidl.is_null()).then_some(Self(pidl))
    }

    pub(crate) fn same_item(&self, other: &Pidl) -> bool {
        unsafe { ILIsEqual(self.0, other.0) }.as_bool()
    }
}

impl Drop for Pidl {
    fn drop(&mut self) {
        unsafe { ILFree(Some(self.0 as *const ITEMIDLIST)) };
    }
}

/// Two locations name the same shell item. Falls back to string comparison
/// when either cannot be parsed, e.g. a drive that is not mounted.
pub(crate) fn same_location(a: &str, b: &str) -> bool {
    match (Pidl::parse(a), Pidl::parse(b)) {
        (Some(a), Some(b)) => a.same_item(&b),
        _ => locations_equivalent(a, b),
    }
}
