use std::io;
use std::sync::OnceLock;

use windows_sys::Win32::Networking::WinSock::{WSAStartup, WSADATA};

/// Process-scoped, init-on-first-use Winsock startup.
///
/// Mirrors the original source's `winsock_init.hpp`: a process-wide
/// refcounted global guarded by a lock. We have no equivalent teardown hook
/// (`WSACleanup` in the original ran from a static destructor); corio
/// accepts that minor, documented deviation — see `SPEC_FULL.md` §6.
static WINSOCK: OnceLock<io::Result<()>> = OnceLock::new();

pub(crate) fn ensure_initialized() -> io::Result<()> {
    match WINSOCK.get_or_init(|| {
        let mut data = unsafe { std::mem::zeroed::<WSADATA>() };
        let rc = unsafe { WSAStartup(0x0202, &mut data) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(rc))
        }
    }) {
        Ok(()) => Ok(()),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
    }
}
