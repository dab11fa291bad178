use thiserror::Error;

#[derive(Debug, Error)]
#[cfg_attr(not(windows), allow(dead_code))]
pub enum ElevationError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("elevated relaunch failed with code {code}")]
    Launch { code: isize },
}

/// Build a command line from `args`, quoting arguments that contain
/// whitespace or quotes.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn join_arguments<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg.is_empty() || arg.contains([' ', '\t', '"']) {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(windows)]
mod platform {
    use std::ptr;

    use windows_sys::Win32::UI::Shell::{IsUserAnAdmin, ShellExecuteW};
    use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    use super::{ElevationError, join_arguments};

    fn to_wide(value: &std::ffi::OsStr) -> Vec<u16> {
        use std::os::windows::ffi::OsStrExt;
        value.encode_wide().chain(std::iter::once(0)).collect()
    }

    pub fn is_elevated() -> bool {
        // SAFETY: IsUserAnAdmin takes no arguments and only inspects the
        // current process token.
        unsafe { IsUserAnAdmin() != 0 }
    }

    pub fn relaunch_elevated() -> Result<(), ElevationError> {
        let exe = std::env::current_exe().map_err(|source| ElevationError::Io {
            context: "failed to resolve current executable",
            source,
        })?;
        let cwd = std::env::current_dir().map_err(|source| ElevationError::Io {
            context: "failed to resolve working directory",
            source,
        })?;
        let args = join_arguments(std::env::args().skip(1));

        let verb = to_wide("runas".as_ref());
        let exe = to_wide(exe.as_os_str());
        let cwd = to_wide(cwd.as_os_str());
        let args = to_wide(args.as_ref());

        // SAFETY: every string is NUL-terminated and outlives the call; a
        // null owner window is allowed.
        let result = unsafe {
            ShellExecuteW(
                ptr::null_mut(),
                verb.as_ptr(),
                exe.as_ptr(),
                args.as_ptr(),
                cwd.as_ptr(),
                SW_SHOWNORMAL,
            )
        };

        // ShellExecuteW reports success with a value greater than 32.
        let code = result as isize;
        if code > 32 {
            Ok(())
        } else {
            Err(ElevationError::Launch { code })
        }
    }
}

#[cfg(not(windows))]
mod platform {
    use super::ElevationError;

    pub fn is_elevated() -> bool {
        true
    }

    pub fn relaunch_elevated() -> Result<(), ElevationError> {
        Ok(())
    }
}

pub use platform::{is_elevated, relaunch_elevated};
