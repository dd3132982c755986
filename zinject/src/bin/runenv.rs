//! The run-environment trampoline.
//!
//! Deployed copies of this binary are named after a binding (`mytool`,
//! `mytool.exe`); on invocation it looks up the command line the launcher
//! recorded for that name (`ZEROINSTALL_RUNENV_<name>` on POSIX, the
//! `ZEROINSTALL_RUNENV_FILE_<name>` / `ZEROINSTALL_RUNENV_ARGS_<name>` pair
//! on Windows) and execs the target with its own arguments appended.

use std::process::exit;

fn main() {
    let name = match binding_name() {
        Some(name) => name,
        None => {
            eprintln!("runenv: cannot determine my own binding name");
            exit(25);
        }
    };

    match run(&name) {
        Ok(status) => exit(status),
        Err(message) => {
            eprintln!("runenv: {message}");
            exit(12);
        }
    }
}

/// The deployed file name, minus any `.exe`, is the binding name.
fn binding_name() -> Option<String> {
    let current = std::env::current_exe().ok()?;
    let stem = current.file_stem()?;
    Some(stem.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn run(name: &str) -> Result<i32, String> {
    use std::os::unix::process::CommandExt;

    let variable = format!("ZEROINSTALL_RUNENV_{name}");
    let recorded = std::env::var(&variable)
        .map_err(|_| format!("{variable} is not set; was I launched outside the injector?"))?;
    let mut argv = shell_words::split(&recorded)
        .map_err(|error| format!("{variable} is not parseable: {error}"))?;
    if argv.is_empty() {
        return Err(format!("{variable} is empty"));
    }

    let mut command = std::process::Command::new(argv.remove(0));
    command.args(argv);
    command.args(std::env::args_os().skip(1));
    // exec only returns on failure
    Err(format!("exec failed: {}", command.exec()))
}

#[cfg(windows)]
fn run(name: &str) -> Result<i32, String> {
    use std::os::windows::process::CommandExt;

    let file_variable = format!("ZEROINSTALL_RUNENV_FILE_{name}");
    let args_variable = format!("ZEROINSTALL_RUNENV_ARGS_{name}");
    let file = std::env::var(&file_variable)
        .map_err(|_| format!("{file_variable} is not set; was I launched outside the injector?"))?;
    let args = std::env::var(&args_variable).unwrap_or_default();

    let mut command = std::process::Command::new(file);
    if !args.is_empty() {
        // the launcher already quoted this string; pass it through verbatim
        command.raw_arg(args);
    }
    for arg in std::env::args_os().skip(1) {
        command.arg(arg);
    }
    let status = command
        .status()
        .map_err(|error| format!("launch failed: {error}"))?;
    Ok(status.code().unwrap_or(1))
}
