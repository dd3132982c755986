//! Late-bound command lines and their expansion.
//!
//! Command lines are assembled while bindings are still mutating the
//! environment, so they are kept symbolic (literals with `$var` references
//! plus `for-each` macros) and only expanded against the final environment
//! during `to_start_info`.

use zinject_selections::Arg;

use crate::context::EnvMap;

/// One not-yet-expanded element of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandLineItem {
    /// A single argument, expanded with `$var` substitution.
    Literal(String),
    /// Emits a copy of `args` per element of a list variable.
    ForEach {
        item_from: String,
        separator: Option<String>,
        args: Vec<String>,
    },
}

impl From<&Arg> for CommandLineItem {
    fn from(arg: &Arg) -> Self {
        match arg {
            Arg::Literal(value) => CommandLineItem::Literal(value.clone()),
            Arg::ForEach {
                item_from,
                separator,
                args,
            } => CommandLineItem::ForEach {
                item_from: item_from.clone(),
                separator: separator.clone(),
                args: args.clone(),
            },
        }
    }
}

/// Expands a symbolic command line into concrete argv entries.
///
/// `for-each` binds `item` for the duration of each iteration and removes it
/// afterwards, including when the source variable is unset or empty and the
/// loop body never runs.
pub(crate) fn expand_command_line(items: &[CommandLineItem], env: &mut EnvMap) -> Vec<String> {
    let mut argv = Vec::new();
    for item in items {
        match item {
            CommandLineItem::Literal(value) => argv.push(expand(value, env)),
            CommandLineItem::ForEach {
                item_from,
                separator,
                args,
            } => {
                let separator = separator
                    .clone()
                    .unwrap_or_else(|| EnvMap::path_list_separator().to_owned());
                let list = env.get(item_from).map(str::to_owned);
                if let Some(list) = list {
                    if !list.is_empty() && !separator.is_empty() {
                        for value in list.split(separator.as_str()) {
                            env.set("item", value);
                            for arg in args {
                                argv.push(expand(arg, env));
                            }
                        }
                    }
                }
                env.remove("item");
            }
        }
    }
    argv
}

/// Unix-shell style `$var` / `${var}` substitution. Unset variables expand
/// to the empty string; a `$` that starts no recognizable name stays
/// literal.
pub(crate) fn expand(input: &str, env: &EnvMap) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(current) = chars.next() {
        if current != '$' {
            output.push(current);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '}' {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                chars.next(); // the closing brace
                output.push_str(env.get(&name).unwrap_or_default());
            }
            Some(&next) if next == '_' || next.is_ascii_alphanumeric() => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '_' || next.is_ascii_alphanumeric() {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                output.push_str(env.get(&name).unwrap_or_default());
            }
            _ => output.push('$'),
        }
    }
    output
}
