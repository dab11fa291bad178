mod error;
mod scm;
mod script;
mod traits;
mod types;

pub use error::ServiceError;
pub use scm::ScmService;
pub use script::{HELPER_SCRIPT_NAME, executable_from_command_line, helper_script_path};
pub use traits::ServiceControl;
pub use types::{ServiceCommand, ServiceState};
