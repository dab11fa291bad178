use std::path::PathBuf;

pub const HELPER_SCRIPT_NAME: &str = "service.bat";

const SEPARATORS: [char; 2] = ['\\', '/'];

/// Extract the executable path from a registered service command line,
/// dropping surrounding quotes and any arguments.
#[must_use]
pub fn executable_from_command_line(command_line: &str) -> &str {
    let trimmed = command_line.trim();
    if let Some(rest) = trimmed.strip_prefix('"') {
        return rest.find('"').map_or(rest, |end| &rest[..end]);
    }
    trimmed.split(' ').next().unwrap_or(trimmed)
}

/// Locate the helper script that ships next to the service executable.
///
/// The script lives in the release root; services installed from a release
/// usually point at `<root>\bin\winws.exe`, so a trailing `bin` directory is
/// skipped.
#[must_use]
pub fn helper_script_path(command_line: &str) -> PathBuf {
    let exe = executable_from_command_line(command_line);
    let mut dir = parent_dir(exe);
    if last_component(dir).eq_ignore_ascii_case("bin") {
        dir = parent_dir(dir);
    }

    let separator = if exe.contains('\\') { '\\' } else { '/' };
    let mut script = dir.to_string();
    if !script.ends_with(SEPARATORS) {
        script.push(separator);
    }
    script.push_str(HELPER_SCRIPT_NAME);
    PathBuf::from(script)
}

fn parent_dir(path: &str) -> &str {
    let path = path.trim_end_matches(SEPARATORS);
    match path.rfind(SEPARATORS) {
        Some(index) => {
            let parent = &path[..index];
            // Keep the separator for roots like `C:\` and `/`.
            if parent.is_empty() || parent.ends_with(':') {
                &path[..=index]
            } else {
                parent
            }
        }
        None => ".",
    }
}

fn last_component(path: &str) -> &str {
    let path = path.trim_end_matches(SEPARATORS);
    path.rfind(SEPARATORS)
        .map_or(path, |index| &path[index + 1..])
}
