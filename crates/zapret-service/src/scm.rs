use async_trait::async_trait;
use log::{debug, info};

use crate::error::ServiceError;
use crate::traits::ServiceControl;
use crate::types::{ServiceCommand, ServiceState};

/// Controls a service through the Windows Service Control Manager.
#[derive(Debug, Clone)]
pub struct ScmService {
    name: String,
}

impl ScmService {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

async fn run_blocking<T, F>(operation: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(ServiceError::task)?
}

#[async_trait]
impl ServiceControl for ScmService {
    fn service_name(&self) -> &str {
        &self.name
    }

    async fn query_state(&self) -> Result<ServiceState, ServiceError> {
        let name = self.name.clone();
        run_blocking(move || platform::query_state(&name)).await
    }

    async fn issue(&self, command: ServiceCommand) -> Result<(), ServiceError> {
        info!("Sending {command} to service {}", self.name);
        let name = self.name.clone();
        let result = run_blocking(move || platform::issue(&name, command)).await;
        if let Err(error) = &result {
            debug!("Service {command} failed: {error}");
        }
        result
    }

    async fn binary_path(&self) -> Result<String, ServiceError> {
        let name = self.name.clone();
        run_blocking(move || platform::binary_path(&name)).await
    }
}

#[cfg(windows)]
mod platform {
    use std::ptr;

    use windows_sys::Win32::Foundation::{
        ERROR_ACCESS_DENIED, ERROR_INSUFFICIENT_BUFFER, ERROR_SERVICE_DOES_NOT_EXIST, GetLastError,
    };
    use windows_sys::Win32::System::Services::{
        CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW, QUERY_SERVICE_CONFIGW,
        QueryServiceConfigW, QueryServiceStatus, SC_HANDLE, SC_MANAGER_CONNECT,
        SERVICE_CONTROL_STOP, SERVICE_QUERY_CONFIG, SERVICE_QUERY_STATUS, SERVICE_START,
        SERVICE_STATUS, SERVICE_STOP, StartServiceW,
    };

    use crate::error::ServiceError;
    use crate::types::{ServiceCommand, ServiceState};

    struct ScHandle(SC_HANDLE);

    impl Drop for ScHandle {
        fn drop(&mut self) {
            // SAFETY: the handle was returned non-null by OpenSCManagerW or
            // OpenServiceW and is owned by this guard.
            unsafe {
                CloseServiceHandle(self.0);
            }
        }
    }

    // Field order matters: the service handle closes before the manager.
    struct OpenedService {
        service: ScHandle,
        _manager: ScHandle,
    }

    fn to_wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn last_error(api: &'static str, name: &str, operation: &'static str) -> ServiceError {
        // SAFETY: GetLastError only reads thread-local state.
        let code = unsafe { GetLastError() };
        match code {
            ERROR_ACCESS_DENIED => ServiceError::AccessDenied { operation },
            ERROR_SERVICE_DOES_NOT_EXIST => ServiceError::NotInstalled {
                name: name.to_string(),
            },
            code => ServiceError::Win32 { api, code },
        }
    }

    fn open(name: &str, access: u32, operation: &'static str) -> Result<OpenedService, ServiceError> {
        // SAFETY: null machine and database names select the local SCM.
        let manager = unsafe { OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_CONNECT) };
        if manager.is_null() {
            return Err(last_error("OpenSCManagerW", name, operation));
        }
        let manager = ScHandle(manager);

        let wide_name = to_wide(name);
        // SAFETY: `wide_name` is NUL-terminated and outlives the call.
        let service = unsafe { OpenServiceW(manager.0, wide_name.as_ptr(), access) };
        if service.is_null() {
            return Err(last_error("OpenServiceW", name, operation));
        }

        Ok(OpenedService {
            service: ScHandle(service),
            _manager: manager,
        })
    }

    pub(super) fn query_state(name: &str) -> Result<ServiceState, ServiceError> {
        let opened = open(name, SERVICE_QUERY_STATUS, "query service state")?;
        // SAFETY: SERVICE_STATUS is plain data; all-zero is a valid value.
        let mut status: SERVICE_STATUS = unsafe { std::mem::zeroed() };
        // SAFETY: the handle is open and `status` is a valid out pointer.
        let ok = unsafe { QueryServiceStatus(opened.service.0, &raw mut status) };
        if ok == 0 {
            return Err(last_error("QueryServiceStatus", name, "query service state"));
        }
        Ok(ServiceState::from_code(status.dwCurrentState))
    }

    pub(super) fn issue(name: &str, command: ServiceCommand) -> Result<(), ServiceError> {
        match command {
            ServiceCommand::Start => {
                let opened = open(name, SERVICE_START, "start the service")?;
                // SAFETY: no service arguments are passed.
                let ok = unsafe { StartServiceW(opened.service.0, 0, ptr::null()) };
                if ok == 0 {
                    return Err(last_error("StartServiceW", name, "start the service"));
                }
            }
            ServiceCommand::Stop => {
                let opened = open(name, SERVICE_STOP, "stop the service")?;
                // SAFETY: SERVICE_STATUS is plain data; all-zero is a valid value.
                let mut status: SERVICE_STATUS = unsafe { std::mem::zeroed() };
                // SAFETY: the handle is open and `status` is a valid out pointer.
                let ok = unsafe {
                    ControlService(opened.service.0, SERVICE_CONTROL_STOP, &raw mut status)
                };
                if ok == 0 {
                    return Err(last_error("ControlService", name, "stop the service"));
                }
            }
        }
        Ok(())
    }

    pub(super) fn binary_path(name: &str) -> Result<String, ServiceError> {
        let opened = open(name, SERVICE_QUERY_CONFIG, "read the service configuration")?;

        let mut needed: u32 = 0;
        // SAFETY: a null buffer with zero size only asks for the required size.
        let ok = unsafe {
            QueryServiceConfigW(opened.service.0, ptr::null_mut(), 0, &raw mut needed)
        };
        // SAFETY: GetLastError only reads thread-local state.
        if ok == 0 && unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER {
            return Err(last_error("QueryServiceConfigW", name, "read the service configuration"));
        }

        // u64 storage keeps the buffer aligned for QUERY_SERVICE_CONFIGW.
        let mut buffer = vec![0_u64; (needed as usize).div_ceil(8).max(1)];
        let config = buffer.as_mut_ptr().cast::<QUERY_SERVICE_CONFIGW>();
        // SAFETY: `buffer` holds at least `needed` bytes and is suitably aligned.
        let ok = unsafe { QueryServiceConfigW(opened.service.0, config, needed, &raw mut needed) };
        if ok == 0 {
            return Err(last_error("QueryServiceConfigW", name, "read the service configuration"));
        }

        // SAFETY: on success the SCM filled `config`, and lpBinaryPathName
        // points to a NUL-terminated string inside `buffer`.
        let path = unsafe {
            let raw = (*config).lpBinaryPathName;
            if raw.is_null() {
                return Ok(String::new());
            }
            let mut len = 0;
            while *raw.add(len) != 0 {
                len += 1;
            }
            String::from_utf16_lossy(std::slice::from_raw_parts(raw, len))
        };
        Ok(path)
    }
}

#[cfg(not(windows))]
mod platform {
    use crate::error::ServiceError;
    use crate::types::{ServiceCommand, ServiceState};

    pub(super) fn query_state(_name: &str) -> Result<ServiceState, ServiceError> {
        Err(ServiceError::Unsupported)
    }

    pub(super) fn issue(_name: &str, _command: ServiceCommand) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported)
    }

    pub(super) fn binary_path(_name: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unsupported)
    }
}
