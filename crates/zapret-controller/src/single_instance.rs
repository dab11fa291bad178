use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireInstanceError {
    #[error("another Zapret Controller instance is already running")]
    AlreadyRunning,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[cfg(windows)]
    #[error("win32 call {api} failed with code {code}")]
    Win32 { api: &'static str, code: u32 },
}

impl AcquireInstanceError {
    #[cfg_attr(windows, allow(dead_code))]
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

#[cfg(windows)]
mod windows_impl {
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
    use windows_sys::Win32::System::Threading::CreateMutexA;
    use zapret_platform::AppPaths;

    use super::AcquireInstanceError;

    const MUTEX_NAME: &[u8] = b"Global\\ZapretControllerMutex\0";

    pub struct SingleInstance {
        handle: HANDLE,
    }

    impl SingleInstance {
        pub fn acquire(_paths: &AppPaths) -> Result<Self, AcquireInstanceError> {
            // SAFETY: the mutex name is a static NUL-terminated string and
            // null security attributes are valid; the handle is checked
            // before use.
            unsafe {
                let handle = CreateMutexA(ptr::null(), 1, MUTEX_NAME.as_ptr());

                if handle.is_null() {
                    return Err(AcquireInstanceError::Win32 {
                        api: "CreateMutexA",
                        code: GetLastError(),
                    });
                }

                if GetLastError() == ERROR_ALREADY_EXISTS {
                    CloseHandle(handle);
                    return Err(AcquireInstanceError::AlreadyRunning);
                }

                Ok(Self { handle })
            }
        }
    }

    impl Drop for SingleInstance {
        fn drop(&mut self) {
            // SAFETY: `self.handle` was returned by `CreateMutexA` and is
            // owned by this guard until drop.
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(windows))]
mod other_impl {
    use std::fs::{File, OpenOptions};
    use std::io::{Seek, SeekFrom, Write};

    use fs2::FileExt;
    use zapret_platform::AppPaths;

    use super::AcquireInstanceError;

    pub struct SingleInstance {
        _file: File,
    }

    impl SingleInstance {
        pub fn acquire(paths: &AppPaths) -> Result<Self, AcquireInstanceError> {
            paths.ensure_dirs().map_err(|error| {
                AcquireInstanceError::io("failed to create app directories", error)
            })?;

            let mut lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(paths.instance_lock_file())
                .map_err(|error| {
                    AcquireInstanceError::io("failed to open instance lock file", error)
                })?;

            match lock_file.try_lock_exclusive() {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(AcquireInstanceError::AlreadyRunning);
                }
                Err(error) => {
                    return Err(AcquireInstanceError::io(
                        "failed to acquire instance lock",
                        error,
                    ));
                }
            }

            lock_file
                .set_len(0)
                .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
                .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
                .map_err(|error| {
                    AcquireInstanceError::io("failed to write instance lock metadata", error)
                })?;

            Ok(Self { _file: lock_file })
        }
    }
}

#[cfg(not(windows))]
pub use other_impl::SingleInstance;
#[cfg(windows)]
pub use windows_impl::SingleInstance;
