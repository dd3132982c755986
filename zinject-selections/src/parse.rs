//! Reading the XML form of selections documents.
//!
//! The schema evolves; anything this parser does not understand is captured
//! into [`Extensions`] instead of being an error, so documents written by a
//! newer solver still launch.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{Result, SelectionsError};
use crate::{
    Arg, Binding, Command, Dependency, EnvironmentMode, Extensions, Importance,
    ImplementationSelection, Restriction, Runner, Selections,
};

pub(crate) fn parse_selections(xml: &str) -> Result<Selections> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if start.local_name().as_ref() != b"selections" {
                    return Err(SelectionsError::UnexpectedRoot {
                        found: name_of(&start),
                    });
                }
                return parse_document(&mut reader, &start);
            }
            Event::Empty(start) => {
                if start.local_name().as_ref() != b"selections" {
                    return Err(SelectionsError::UnexpectedRoot {
                        found: name_of(&start),
                    });
                }
                // A degenerate but well-formed document with no selections.
                let (interface, command, extensions) = document_attributes(&start)?;
                return Ok(Selections {
                    interface: interface.into(),
                    command,
                    implementations: Vec::new(),
                    extensions,
                });
            }
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "selections".into(),
                })
            }
            _ => continue,
        }
    }
}

fn parse_document(reader: &mut Reader<&[u8]>, root: &BytesStart) -> Result<Selections> {
    let (interface, command, mut extensions) = document_attributes(root)?;
    let mut implementations = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.local_name().as_ref() {
                b"selection" => implementations.push(parse_selection(reader, &start)?),
                _ => skip_unknown(reader, &start, &mut extensions)?,
            },
            Event::Empty(start) => match start.local_name().as_ref() {
                b"selection" => implementations.push(selection_shell(&start)?),
                _ => extensions.elements.push(name_of(&start)),
            },
            Event::End(end) if end.local_name().as_ref() == b"selections" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "selections".into(),
                })
            }
            _ => {}
        }
    }

    Ok(Selections {
        interface: interface.into(),
        command,
        implementations,
        extensions,
    })
}

fn document_attributes(root: &BytesStart) -> Result<(String, Option<String>, Extensions)> {
    let mut interface = None;
    let mut command = None;
    let mut extensions = Extensions::default();

    for attribute in root.attributes() {
        let attribute = attribute?;
        if is_namespace_decl(&attribute) {
            continue;
        }
        match attribute.key.local_name().as_ref() {
            b"interface" => interface = Some(attr_string(&attribute)?),
            b"command" => command = Some(attr_string(&attribute)?),
            _ => capture_attribute(&attribute, &mut extensions)?,
        }
    }

    let interface = interface.ok_or(SelectionsError::MissingAttribute {
        element: "selections",
        attribute: "interface",
    })?;
    // An empty command attribute means "no command", matching a document
    // produced for a library-only selection.
    let command = command.filter(|name| !name.is_empty());
    Ok((interface, command, extensions))
}

/// Parses the attributes of a `<selection>` into an implementation with no
/// children yet.
fn selection_shell(start: &BytesStart) -> Result<ImplementationSelection> {
    let mut interface = None;
    let mut id = None;
    let mut version = None;
    let mut arch = None;
    let mut from_feed = None;
    let mut local_path = None;
    let mut extensions = Extensions::default();

    for attribute in start.attributes() {
        let attribute = attribute?;
        if is_namespace_decl(&attribute) {
            continue;
        }
        match attribute.key.local_name().as_ref() {
            b"interface" => interface = Some(attr_string(&attribute)?),
            b"id" => id = Some(attr_string(&attribute)?),
            b"version" => version = Some(attr_string(&attribute)?),
            b"arch" => arch = Some(attr_string(&attribute)?),
            b"from-feed" => from_feed = Some(attr_string(&attribute)?),
            b"local-path" => local_path = Some(attr_string(&attribute)?),
            _ => capture_attribute(&attribute, &mut extensions)?,
        }
    }

    Ok(ImplementationSelection {
        interface: interface
            .ok_or(SelectionsError::MissingAttribute {
                element: "selection",
                attribute: "interface",
            })?
            .into(),
        id: id.ok_or(SelectionsError::MissingAttribute {
            element: "selection",
            attribute: "id",
        })?,
        version: version.unwrap_or_default(),
        arch,
        from_feed: from_feed.map(Into::into),
        local_path: local_path.map(Into::into),
        commands: Vec::new(),
        bindings: Vec::new(),
        dependencies: Vec::new(),
        restrictions: Vec::new(),
        extensions,
    })
}

fn parse_selection(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
) -> Result<ImplementationSelection> {
    let mut selection = selection_shell(start)?;

    loop {
        match reader.read_event()? {
            Event::Start(child) => match child.local_name().as_ref() {
                b"command" => selection.commands.push(parse_command(reader, &child)?),
                b"requires" => selection
                    .dependencies
                    .push(parse_dependency(reader, &child, false)?),
                b"restricts" => {
                    selection.restrictions.push(restriction_from(&child)?);
                    reader.read_to_end(child.name())?;
                }
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        selection.bindings.push(binding);
                        reader.read_to_end(child.name())?;
                    } else {
                        skip_unknown(reader, &child, &mut selection.extensions)?;
                    }
                }
            },
            Event::Empty(child) => match child.local_name().as_ref() {
                b"requires" => selection
                    .dependencies
                    .push(parse_dependency(reader, &child, true)?),
                b"restricts" => selection.restrictions.push(restriction_from(&child)?),
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        selection.bindings.push(binding);
                    } else {
                        selection.extensions.elements.push(name_of(&child));
                    }
                }
            },
            Event::End(end) if end.local_name().as_ref() == b"selection" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "selection".into(),
                })
            }
            _ => {}
        }
    }

    Ok(selection)
}

fn parse_command(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Command> {
    let mut name = None;
    let mut path = None;
    let mut extensions = Extensions::default();

    for attribute in start.attributes() {
        let attribute = attribute?;
        if is_namespace_decl(&attribute) {
            continue;
        }
        match attribute.key.local_name().as_ref() {
            b"name" => name = Some(attr_string(&attribute)?),
            b"path" => path = Some(attr_string(&attribute)?),
            _ => capture_attribute(&attribute, &mut extensions)?,
        }
    }

    let mut command = Command {
        name: name.ok_or(SelectionsError::MissingAttribute {
            element: "command",
            attribute: "name",
        })?,
        path,
        args: Vec::new(),
        runner: None,
        working_dir: None,
        bindings: Vec::new(),
        dependencies: Vec::new(),
        extensions,
    };

    loop {
        match reader.read_event()? {
            Event::Start(child) => match child.local_name().as_ref() {
                b"arg" => {
                    let text = reader.read_text(child.name())?;
                    command.args.push(Arg::Literal(text.into_owned()));
                }
                b"for-each" => command.args.push(parse_for_each(reader, &child)?),
                b"runner" => command.runner = Some(parse_runner(reader, &child)?),
                b"requires" => command
                    .dependencies
                    .push(parse_dependency(reader, &child, false)?),
                b"working-dir" => {
                    command.working_dir = Some(working_dir_source(&child)?);
                    reader.read_to_end(child.name())?;
                }
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        command.bindings.push(binding);
                        reader.read_to_end(child.name())?;
                    } else {
                        skip_unknown(reader, &child, &mut command.extensions)?;
                    }
                }
            },
            Event::Empty(child) => match child.local_name().as_ref() {
                b"arg" => command.args.push(Arg::Literal(String::new())),
                b"requires" => command
                    .dependencies
                    .push(parse_dependency(reader, &child, true)?),
                b"working-dir" => command.working_dir = Some(working_dir_source(&child)?),
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        command.bindings.push(binding);
                    } else {
                        command.extensions.elements.push(name_of(&child));
                    }
                }
            },
            Event::End(end) if end.local_name().as_ref() == b"command" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "command".into(),
                })
            }
            _ => {}
        }
    }

    Ok(command)
}

fn parse_runner(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Runner> {
    let mut interface = None;
    let mut command = None;
    let mut extensions = Extensions::default();

    for attribute in start.attributes() {
        let attribute = attribute?;
        if is_namespace_decl(&attribute) {
            continue;
        }
        match attribute.key.local_name().as_ref() {
            b"interface" => interface = Some(attr_string(&attribute)?),
            b"command" => command = Some(attr_string(&attribute)?),
            _ => capture_attribute(&attribute, &mut extensions)?,
        }
    }

    let mut runner = Runner {
        interface: interface
            .ok_or(SelectionsError::MissingAttribute {
                element: "runner",
                attribute: "interface",
            })?
            .into(),
        command,
        args: Vec::new(),
        bindings: Vec::new(),
        extensions,
    };

    loop {
        match reader.read_event()? {
            Event::Start(child) => match child.local_name().as_ref() {
                b"arg" => {
                    let text = reader.read_text(child.name())?;
                    runner.args.push(Arg::Literal(text.into_owned()));
                }
                b"for-each" => runner.args.push(parse_for_each(reader, &child)?),
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        runner.bindings.push(binding);
                        reader.read_to_end(child.name())?;
                    } else {
                        skip_unknown(reader, &child, &mut runner.extensions)?;
                    }
                }
            },
            Event::Empty(child) => match child.local_name().as_ref() {
                b"arg" => runner.args.push(Arg::Literal(String::new())),
                _ => {
                    if let Some(binding) = binding_from(&child)? {
                        runner.bindings.push(binding);
                    } else {
                        runner.extensions.elements.push(name_of(&child));
                    }
                }
            },
            Event::End(end) if end.local_name().as_ref() == b"runner" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "runner".into(),
                })
            }
            _ => {}
        }
    }

    Ok(runner)
}

/// Parses a `<requires>` element. `empty` is true when the element was
/// self-closing and has no binding children to read.
fn parse_dependency(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    empty: bool,
) -> Result<Dependency> {
    let mut interface = None;
    let mut importance = Importance::default();

    for attribute in start.attributes() {
        let attribute = attribute?;
        if is_namespace_decl(&attribute) {
            continue;
        }
        match attribute.key.local_name().as_ref() {
            b"interface" => interface = Some(attr_string(&attribute)?),
            b"importance" => {
                importance = match attr_string(&attribute)?.as_str() {
                    "essential" => Importance::Essential,
                    "recommended" => Importance::Recommended,
                    value => {
                        return Err(SelectionsError::InvalidAttributeValue {
                            element: "requires",
                            attribute: "importance",
                            value: value.to_owned(),
                        })
                    }
                }
            }
            _ => {}
        }
    }

    let mut dependency = Dependency {
        interface: interface
            .ok_or(SelectionsError::MissingAttribute {
                element: "requires",
                attribute: "interface",
            })?
            .into(),
        importance,
        bindings: Vec::new(),
    };

    if empty {
        return Ok(dependency);
    }

    loop {
        match reader.read_event()? {
            Event::Start(child) => {
                if let Some(binding) = binding_from(&child)? {
                    dependency.bindings.push(binding);
                }
                reader.read_to_end(child.name())?;
            }
            Event::Empty(child) => {
                if let Some(binding) = binding_from(&child)? {
                    dependency.bindings.push(binding);
                }
            }
            Event::End(end) if end.local_name().as_ref() == b"requires" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "requires".into(),
                })
            }
            _ => {}
        }
    }

    Ok(dependency)
}

fn parse_for_each(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Arg> {
    let mut item_from = None;
    let mut separator = None;

    for attribute in start.attributes() {
        let attribute = attribute?;
        match attribute.key.local_name().as_ref() {
            b"item-from" => item_from = Some(attr_string(&attribute)?),
            b"separator" => separator = Some(attr_string(&attribute)?),
            _ => {}
        }
    }

    let mut args = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(child) if child.local_name().as_ref() == b"arg" => {
                let text = reader.read_text(child.name())?;
                args.push(text.into_owned());
            }
            Event::Start(child) => {
                reader.read_to_end(child.name())?;
            }
            Event::Empty(child) if child.local_name().as_ref() == b"arg" => {
                args.push(String::new());
            }
            Event::End(end) if end.local_name().as_ref() == b"for-each" => break,
            Event::Eof => {
                return Err(SelectionsError::Truncated {
                    element: "for-each".into(),
                })
            }
            _ => {}
        }
    }

    Ok(Arg::ForEach {
        item_from: item_from.ok_or(SelectionsError::MissingAttribute {
            element: "for-each",
            attribute: "item-from",
        })?,
        separator,
        args,
    })
}

/// Builds a [`Binding`] from a binding element, or `None` if the element is
/// not a binding at all.
fn binding_from(start: &BytesStart) -> Result<Option<Binding>> {
    match start.local_name().as_ref() {
        b"environment" => {
            let mut name = None;
            let mut value = None;
            let mut insert = None;
            let mut mode = EnvironmentMode::default();
            let mut separator = None;
            let mut default = None;

            for attribute in start.attributes() {
                let attribute = attribute?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attr_string(&attribute)?),
                    b"value" => value = Some(attr_string(&attribute)?),
                    b"insert" => insert = Some(attr_string(&attribute)?),
                    b"separator" => separator = Some(attr_string(&attribute)?),
                    b"default" => default = Some(attr_string(&attribute)?),
                    b"mode" => {
                        mode = match attr_string(&attribute)?.as_str() {
                            "prepend" => EnvironmentMode::Prepend,
                            "append" => EnvironmentMode::Append,
                            "replace" => EnvironmentMode::Replace,
                            other => {
                                return Err(SelectionsError::InvalidAttributeValue {
                                    element: "environment",
                                    attribute: "mode",
                                    value: other.to_owned(),
                                })
                            }
                        }
                    }
                    _ => {}
                }
            }

            Ok(Some(Binding::Environment {
                name: name.ok_or(SelectionsError::MissingAttribute {
                    element: "environment",
                    attribute: "name",
                })?,
                value,
                insert,
                mode,
                separator,
                default,
            }))
        }
        kind @ (b"executable-in-var" | b"executable-in-path") => {
            let mut name = None;
            let mut command = None;
            for attribute in start.attributes() {
                let attribute = attribute?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attr_string(&attribute)?),
                    b"command" => command = Some(attr_string(&attribute)?),
                    _ => {}
                }
            }
            let name = name.ok_or(SelectionsError::MissingAttribute {
                element: "executable-in-var",
                attribute: "name",
            })?;
            Ok(Some(if kind == b"executable-in-var" {
                Binding::ExecutableInVar { name, command }
            } else {
                Binding::ExecutableInPath { name, command }
            }))
        }
        b"working-dir" => Ok(Some(Binding::WorkingDir {
            source: working_dir_source(start)?,
        })),
        _ => Ok(None),
    }
}

/// Reads the `src` attribute of a `<working-dir>`; defaults to the
/// implementation root.
fn working_dir_source(start: &BytesStart) -> Result<String> {
    for attribute in start.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == b"src" {
            return attr_string(&attribute);
        }
    }
    Ok(".".to_owned())
}

fn restriction_from(start: &BytesStart) -> Result<Restriction> {
    let mut interface = None;
    let mut version = None;
    for attribute in start.attributes() {
        let attribute = attribute?;
        match attribute.key.local_name().as_ref() {
            b"interface" => interface = Some(attr_string(&attribute)?),
            b"version" => version = Some(attr_string(&attribute)?),
            _ => {}
        }
    }
    Ok(Restriction {
        interface: interface
            .ok_or(SelectionsError::MissingAttribute {
                element: "restricts",
                attribute: "interface",
            })?
            .into(),
        version,
    })
}

/// Records an unknown element and skips past its subtree.
fn skip_unknown(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    extensions: &mut Extensions,
) -> Result<()> {
    extensions.elements.push(name_of(start));
    reader.read_to_end(start.name())?;
    Ok(())
}

fn capture_attribute(attribute: &Attribute, extensions: &mut Extensions) -> Result<()> {
    extensions.attributes.insert(
        String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
        attr_string(attribute)?,
    );
    Ok(())
}

fn attr_string(attribute: &Attribute) -> Result<String> {
    Ok(attribute.unescape_value()?.into_owned())
}

fn is_namespace_decl(attribute: &Attribute) -> bool {
    attribute.key.as_ref().starts_with(b"xmlns")
}

fn name_of(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Selections;

    const DOC: &str = r#"<?xml version="1.0"?>
<selections xmlns="http://zero-install.sourceforge.net/2004/injector/interface"
            interface="https://example.com/app" command="run">
  <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.2">
    <command name="run" path="bin/app">
      <arg>--launched</arg>
      <for-each item-from="CLASSPATH" separator=":">
        <arg>-cp</arg>
        <arg>${item}</arg>
      </for-each>
      <runner interface="https://example.com/python" command="run">
        <arg>-O</arg>
      </runner>
      <working-dir src="data"/>
    </command>
    <environment name="APP_HOME" insert="" mode="replace"/>
    <requires interface="https://example.com/lib">
      <environment name="LIBPATH" insert="lib" mode="prepend" separator=":"/>
    </requires>
    <restricts interface="https://example.com/python" version="3.10.."/>
  </selection>
  <selection interface="https://example.com/python" id="package:deb:python3:3.11"
             version="3.11">
    <command name="run" path="/usr/bin/python3"/>
  </selection>
  <selection interface="https://example.com/lib" id="sha256new_LIB" version="0.9"
             frobnicate="yes">
    <executable-in-path name="libtool" command="tool"/>
    <novel-element><nested/></novel-element>
  </selection>
</selections>
"#;

    #[test]
    fn parses_a_full_document() {
        let selections = Selections::from_xml(DOC).unwrap();
        assert_eq!(selections.interface.as_str(), "https://example.com/app");
        assert_eq!(selections.command.as_deref(), Some("run"));
        assert_eq!(selections.implementations.len(), 3);

        let main = selections.main_implementation().unwrap();
        assert_eq!(main.id, "sha256new_MAIN");
        assert_eq!(main.version, "1.2");
        let run = main.command("run").unwrap();
        assert_eq!(run.path.as_deref(), Some("bin/app"));
        assert_eq!(run.working_dir.as_deref(), Some("data"));
        assert_eq!(run.args.len(), 2);
        assert_eq!(run.args[0], Arg::Literal("--launched".into()));
        assert_eq!(
            run.args[1],
            Arg::ForEach {
                item_from: "CLASSPATH".into(),
                separator: Some(":".into()),
                args: vec!["-cp".into(), "${item}".into()],
            }
        );
        let runner = run.runner.as_ref().unwrap();
        assert_eq!(runner.interface.as_str(), "https://example.com/python");
        assert_eq!(runner.command_name(), "run");
        assert_eq!(runner.args, vec![Arg::Literal("-O".into())]);

        assert_eq!(
            main.bindings,
            vec![Binding::Environment {
                name: "APP_HOME".into(),
                value: None,
                insert: Some(String::new()),
                mode: EnvironmentMode::Replace,
                separator: None,
                default: None,
            }]
        );
        assert_eq!(main.dependencies.len(), 1);
        let dependency = &main.dependencies[0];
        assert_eq!(dependency.interface.as_str(), "https://example.com/lib");
        assert_eq!(dependency.importance, Importance::Essential);
        assert_eq!(dependency.bindings.len(), 1);
        assert_eq!(main.restrictions.len(), 1);
        assert_eq!(main.restrictions[0].version.as_deref(), Some("3.10.."));
    }

    #[test]
    fn package_selection_round_trips_sentinel() {
        let selections = Selections::from_xml(DOC).unwrap();
        let python = selections
            .find(&"https://example.com/python".into())
            .unwrap();
        assert!(python.is_package());
        assert_eq!(
            python.command("run").unwrap().path.as_deref(),
            Some("/usr/bin/python3")
        );
    }

    #[test]
    fn unknown_content_is_captured_not_fatal() {
        let selections = Selections::from_xml(DOC).unwrap();
        let lib = selections.find(&"https://example.com/lib".into()).unwrap();
        assert_eq!(
            lib.extensions.attributes.get("frobnicate").map(String::as_str),
            Some("yes")
        );
        assert_eq!(lib.extensions.elements, vec!["novel-element".to_owned()]);
        assert_eq!(
            lib.bindings,
            vec![Binding::ExecutableInPath {
                name: "libtool".into(),
                command: Some("tool".into()),
            }]
        );
    }

    #[test]
    fn unknown_runner_content_is_captured_not_fatal() {
        let selections = Selections::from_xml(
            r#"<selections interface="https://example.com/app" command="run">
                 <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
                   <command name="run" path="bin/app">
                     <runner interface="https://example.com/python" os="Linux">
                       <arg>-O</arg>
                       <future-hint/>
                     </runner>
                   </command>
                 </selection>
               </selections>"#,
        )
        .unwrap();

        let main = selections.main_implementation().unwrap();
        let runner = main.command("run").unwrap().runner.as_ref().unwrap();
        assert_eq!(runner.args, vec![Arg::Literal("-O".into())]);
        assert_eq!(
            runner.extensions.attributes.get("os").map(String::as_str),
            Some("Linux")
        );
        assert_eq!(runner.extensions.elements, vec!["future-hint".to_owned()]);
    }

    #[test]
    fn missing_interface_is_an_error() {
        let error = Selections::from_xml(r#"<selections command="run"/>"#).unwrap_err();
        assert!(matches!(
            error,
            SelectionsError::MissingAttribute {
                element: "selections",
                attribute: "interface",
            }
        ));
        assert_eq!(error.exit_code(), 25);
    }

    #[test]
    fn wrong_root_is_an_error() {
        let error = Selections::from_xml("<interface/>").unwrap_err();
        assert!(matches!(
            error,
            SelectionsError::UnexpectedRoot { found } if found == "interface"
        ));
    }

    #[test]
    fn truncated_document_is_an_error() {
        let error = Selections::from_xml(
            r#"<selections interface="https://example.com/app"><selection"#,
        )
        .unwrap_err();
        // quick-xml reports the dangling element itself.
        assert!(matches!(
            error,
            SelectionsError::Xml(_) | SelectionsError::Truncated { .. }
        ));
    }
}
