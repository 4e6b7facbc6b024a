//! Building the command that launches the bridge process.
//!
//! The bridge is usually a script (node, python) that expects the user's
//! PATH. With a shell prefix the command runs inside that shell, e.g.
//! `/bin/zsh -l -c`; an empty prefix picks `$SHELL -l -c`, falling back to
//! bash/sh for shells that do not accept `-l -c`.

use std::process::Command;

/// Shells whose flag syntax is not POSIX-compatible.
const NON_POSIX_SHELLS: [&str; 6] = ["fish", "nu", "nushell", "elvish", "xonsh", "ion"];

/// Prepend the binary's parent directory to PATH so interpreters installed
/// next to it are found.
pub fn prepare_path_env(cmd: &mut Command, binary_path: &str) {
    if !binary_path.contains('/') {
        return;
    }
    let Some(dir) = std::path::Path::new(binary_path)
        .parent()
        .and_then(|d| d.to_str())
    else {
        return;
    };
    let path = match std::env::var("PATH") {
        Ok(existing) if !existing.is_empty() => format!("{}:{}", dir, existing),
        _ => dir.to_string(),
    };
    cmd.env("PATH", path);
}

/// Build the bridge command.
///
/// Without `shell_prefix` the binary is executed directly. With one, the
/// quoted command line is passed to that shell.
pub fn build_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&str>,
    shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let mut cmd = match shell_prefix {
        None => {
            let mut cmd = Command::new(binary_path);
            cmd.args(args);
            cmd
        }
        Some(prefix) => shell_wrapped(binary_path, args, prefix)?,
    };

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    prepare_path_env(&mut cmd, binary_path);
    Ok(cmd)
}

fn shell_wrapped(binary_path: &str, args: &[String], prefix: &str) -> Result<Command, String> {
    let prefix = resolve_shell_prefix(prefix);
    let mut parts = prefix.split_whitespace();
    let shell = parts.next().ok_or_else(|| "Empty shell prefix".to_string())?;

    let command_line = std::iter::once(binary_path)
        .chain(args.iter().map(String::as_str))
        .map(|part| {
            shlex::try_quote(part)
                .map(|q| q.into_owned())
                .map_err(|_| format!("Cannot quote argument: {}", part))
        })
        .collect::<Result<Vec<_>, _>>()?
        .join(" ");

    let mut cmd = Command::new(shell);
    cmd.args(parts).arg(command_line);
    Ok(cmd)
}

/// Use `prefix` as given, or derive a login-shell prefix from `$SHELL`.
fn resolve_shell_prefix(prefix: &str) -> String {
    if !prefix.trim().is_empty() {
        return prefix.to_string();
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let name = std::path::Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let shell = if NON_POSIX_SHELLS.contains(&name) {
        if std::path::Path::new("/bin/bash").exists() {
            "/bin/bash".to_string()
        } else {
            "/bin/sh".to_string()
        }
    } else {
        shell
    };

    format!("{} -l -c", shell)
}
