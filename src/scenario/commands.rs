//! Shell commands run inside the sandboxes.

/// Single-quote `s` for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Join a mount path and a file name.
pub fn file_path(mount: &str, file: &str) -> String {
    format!("{}/{}", mount.trim_end_matches('/'), file)
}

/// Write `content` plus a newline, byte for byte. `printf '%s'` leaves
/// backslashes and leading dashes alone, unlike `echo`.
pub fn write_line(content: &str, path: &str) -> String {
    format!("printf '%s\\n' {} > {path}", shell_quote(content))
}

/// File content as `write_line` stored it, without the trailing newline.
pub fn written_content(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

pub fn mount_grep(mount: &str) -> String {
    format!("mount | grep {}", mount.trim_matches('/'))
}

pub fn list_dir(mount: &str) -> String {
    format!("ls -la {}/", mount.trim_end_matches('/'))
}

pub fn exists(path: &str) -> String {
    format!("test -f {path} && echo 'File exists' || echo 'File does not exist'")
}

pub fn details(path: &str) -> String {
    format!("ls -la {path} 2>/dev/null || echo 'Cannot access file'")
}

pub fn identity() -> String {
    "whoami && groups".to_string()
}

pub fn read(path: &str) -> String {
    format!("cat {path}")
}
