// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// RAII guard that blocks every signal for the calling thread.
///
/// Poll waits run under this guard so they cannot be interrupted by
/// `EINTR`; the saved mask is restored bitwise when the guard drops.
#[derive(Debug)]
pub(crate) struct SigGuard {
    saved: libc::sigset_t,
}

impl SigGuard {
    pub(crate) fn block_all() -> Self {
        unsafe {
            let mut all: libc::sigset_t = std::mem::zeroed();
            libc::sigfillset(&mut all);
            let mut saved: libc::sigset_t = std::mem::zeroed();
            libc::pthread_sigmask(libc::SIG_SETMASK, &all, &mut saved);
            SigGuard { saved }
        }
    }
}

impl Drop for SigGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(
                libc::SIG_SETMASK,
                &self.saved,
                std::ptr::null_mut(),
            );
        }
    }
}
