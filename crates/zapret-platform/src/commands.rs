use std::path::Path;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppresses the console window of helpers spawned from the tray process.
pub trait HideWindow {
    fn hide_window(&mut self) -> &mut Self;
}

impl HideWindow for tokio::process::Command {
    #[cfg(windows)]
    fn hide_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_window(&mut self) -> &mut Self {
        self
    }
}

/// `cmd /c start "" <script>`: the script gets its own console while the
/// `cmd` launcher stays hidden.
#[must_use]
pub fn script_launch_command(script: &Path) -> tokio::process::Command {
    let mut command = tokio::process::Command::new("cmd");
    command.args(["/c", "start", ""]).arg(script).hide_window();
    command
}
