//! Deploying run-environment executables and the variables that drive them.
//!
//! An executable binding plants a tiny trampoline in the cache; when
//! invoked, the trampoline reads `ZEROINSTALL_RUNENV_<name>` (one
//! shell-escaped command line on POSIX) or the
//! `ZEROINSTALL_RUNENV_FILE_<name>` / `ZEROINSTALL_RUNENV_ARGS_<name>` pair
//! (Windows) and execs the real target with its own arguments appended.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::context::EnvMap;
use crate::errors::{ExecError, ExecResult};
use crate::locations::Locations;

/// Deploys the trampoline for `name`, returning the deployed path.
///
/// The template is hardlinked when the filesystem allows it and copied
/// otherwise. An already-present target (a previous deploy, possibly still
/// running and therefore locked) is simply reused.
pub(crate) fn deploy(locations: &Locations, name: &str) -> ExecResult<Utf8PathBuf> {
    let directory = locations.executables_dir(name);
    fs::create_dir_all(&directory)?;
    let target = directory.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));

    if !target.exists() {
        let template = locations.runenv_template()?;
        if fs::hard_link(&template, &target).is_err() {
            if let Err(error) = fs::copy(&template, &target) {
                // lost a race against a concurrent deploy?
                if !target.exists() {
                    return Err(error.into());
                }
            }
        }
        tracing::debug!("deployed run-environment executable {target}");
    }
    set_executable(&target)?;
    Ok(target)
}

/// Rejects names that cannot safely become a file name and an environment
/// variable suffix.
pub(crate) fn validate_name(name: &str) -> ExecResult<()> {
    const FORBIDDEN: &[char] = &['/', '\\', ':', '"', '<', '>', '|', '?', '*', '='];
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(FORBIDDEN)
        || name.chars().any(char::is_control)
    {
        return Err(ExecError::InvalidBindingName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Stores an expanded command line where the trampoline will look for it.
pub(crate) fn set_variables(env: &mut EnvMap, name: &str, argv: &[String]) {
    if cfg!(windows) {
        env.set(&format!("ZEROINSTALL_RUNENV_FILE_{name}"), &argv[0]);
        env.set(
            &format!("ZEROINSTALL_RUNENV_ARGS_{name}"),
            windows_join(&argv[1..]),
        );
    } else {
        env.set(
            &format!("ZEROINSTALL_RUNENV_{name}"),
            shell_words::join(argv),
        );
    }
}

/// Joins arguments with cmd-style quoting, the inverse of
/// `CommandLineToArgvW`.
pub(crate) fn windows_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| windows_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn windows_quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_owned();
    }
    let mut quoted = String::from("\"");
    let mut backslashes = 0;
    for character in arg.chars() {
        match character {
            '\\' => {
                backslashes += 1;
                quoted.push('\\');
            }
            '"' => {
                // a literal quote needs its run of backslashes doubled + 1
                quoted.push_str(&"\\".repeat(backslashes + 1));
                quoted.push('"');
                backslashes = 0;
            }
            character => {
                backslashes = 0;
                quoted.push(character);
            }
        }
    }
    // trailing backslashes would otherwise escape the closing quote
    quoted.push_str(&"\\".repeat(backslashes));
    quoted.push('"');
    quoted
}

#[cfg(unix)]
fn set_executable(path: &Utf8Path) -> ExecResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Utf8Path) -> ExecResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        validate_name("mytool").unwrap();
        validate_name("my-tool.2").unwrap();
        for bad in ["", ".", "..", "a/b", "a\\b", "a:b", "a*b", "a=b", "a\nb"] {
            assert!(
                matches!(
                    validate_name(bad),
                    Err(ExecError::InvalidBindingName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn windows_quoting() {
        assert_eq!(windows_quote("plain"), "plain");
        assert_eq!(windows_quote(""), "\"\"");
        assert_eq!(windows_quote("has space"), "\"has space\"");
        assert_eq!(windows_quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(windows_quote("end\\"), "end\\");
        assert_eq!(windows_quote("tr \\ail\\"), "\"tr \\ail\\\\\"");
    }

    #[test]
    fn deploy_reuses_an_existing_target() {
        let scratch = temp_dir::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf()).unwrap();
        let template = root.join("runenv-template");
        fs::write(&template, b"#!/bin/sh\n").unwrap();

        let mut locations = Locations::with_cache_dir(root.join("cache"));
        locations.set_runenv_template(template.clone());

        let first = deploy(&locations, "mytool").unwrap();
        let expected = locations
            .executables_dir("mytool")
            .join(format!("mytool{}", std::env::consts::EXE_SUFFIX));
        assert_eq!(first, expected);
        assert!(first.is_file());

        // deploying again is a no-op reuse, even if the template vanished
        fs::remove_file(&template).unwrap();
        let second = deploy(&locations, "mytool").unwrap();
        assert_eq!(first, second);
    }
}
