//! End-to-end scenarios: selections XML in, process descriptor out.

use std::fs;
use std::process::Child;

use camino::Utf8PathBuf;
use temp_dir::TempDir;
use zinject::errors::{ExecError, ExecResult};
use zinject::{
    DirectoryStore, EnvMap, ExecutionContext, ExecutionStrategy, Executor, Locations,
    NativeStrategy, StartInfo,
};
use zinject_selections::Selections;

/// A strategy with a fully controlled environment, so assertions don't
/// depend on the host.
struct FixedEnv(Vec<(String, String)>);

impl FixedEnv {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }
}

impl ExecutionStrategy for FixedEnv {
    fn create_context(&self) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        for (name, value) in &self.0 {
            context.env.set(name, value.clone());
        }
        context
    }

    fn start(&self, info: &StartInfo) -> ExecResult<Child> {
        NativeStrategy.start(info)
    }
}

struct Fixture {
    _scratch: TempDir,
    store_root: Utf8PathBuf,
    cache: Utf8PathBuf,
    executor: Executor<DirectoryStore>,
}

fn fixture(env: &[(&str, &str)]) -> Fixture {
    let scratch = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf()).unwrap();

    let store_root = root.join("store");
    for (digest, file) in [
        ("sha256new_MAIN", "bin/app"),
        ("sha256new_PY", "bin/python"),
        ("sha256new_LIB", "bin/tool"),
    ] {
        let path = store_root.join(digest).join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"#!/bin/sh\n").unwrap();
    }
    fs::create_dir_all(store_root.join("sha256new_MAIN").join("data")).unwrap();
    fs::create_dir_all(store_root.join("sha256new_LIB").join("lib")).unwrap();

    let template = root.join("runenv-template");
    fs::write(&template, b"#!/bin/sh\nexec placeholder\n").unwrap();

    let cache = root.join("cache");
    let mut locations = Locations::with_cache_dir(cache.clone());
    locations.set_runenv_template(template);

    let executor = Executor::with_strategy(
        DirectoryStore::new(vec![store_root.clone()]),
        Box::new(FixedEnv::new(env)),
        locations,
    );

    Fixture {
        _scratch: scratch,
        store_root,
        cache,
        executor,
    }
}

fn selections(xml: &str) -> Selections {
    Selections::from_xml(xml).unwrap()
}

fn impl_path(fixture: &Fixture, digest: &str, relative: &str) -> Utf8PathBuf {
    let mut path = fixture.store_root.join(digest);
    for segment in relative.split('/') {
        path.push(segment);
    }
    path
}

#[test]
fn single_program_no_dependencies() {
    let fixture = fixture(&[("HOME", "/home/u")]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    assert_eq!(info.file_name, impl_path(&fixture, "sha256new_MAIN", "bin/app"));
    assert!(info.arguments.is_empty());
    assert!(info.working_dir.is_none());
    // environment untouched
    assert_eq!(info.environment.len(), 1);
    assert_eq!(info.environment.get("HOME"), Some("/home/u"));
}

#[test]
fn insert_binding_prepends_an_implementation_path() {
    let fixture = fixture(&[("PYTHONPATH", "/existing")]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <requires interface="https://example.com/lib">
                 <environment name="PYTHONPATH" insert="lib" mode="prepend" separator=":"/>
               </requires>
             </selection>
             <selection interface="https://example.com/lib" id="sha256new_LIB" version="0.9"/>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    let lib_dir = impl_path(&fixture, "sha256new_LIB", "lib");
    assert_eq!(
        info.environment.get("PYTHONPATH").unwrap(),
        format!("{lib_dir}:/existing")
    );
}

#[test]
fn runner_chain_prepends_the_interpreter() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <runner interface="https://example.com/python">
                   <arg>-O</arg>
                 </runner>
               </command>
             </selection>
             <selection interface="https://example.com/python" id="sha256new_PY" version="3.12">
               <command name="run" path="bin/python"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    builder.add_arguments(["input.txt"]);
    let info = builder.to_start_info().unwrap();

    assert_eq!(info.file_name, impl_path(&fixture, "sha256new_PY", "bin/python"));
    assert_eq!(
        info.arguments,
        vec![
            "-O".to_string(),
            impl_path(&fixture, "sha256new_MAIN", "bin/app").to_string(),
            "input.txt".to_string(),
        ]
    );
}

#[test]
fn executable_in_path_deploys_a_trampoline() {
    let fixture = fixture(&[("PATH", "/usr/bin")]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <requires interface="https://example.com/lib">
                 <executable-in-path name="mytool" command="tool"/>
               </requires>
             </selection>
             <selection interface="https://example.com/lib" id="sha256new_LIB" version="0.9">
               <command name="tool" path="bin/tool">
                 <arg>-q</arg>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    let deploy_dir = fixture
        .cache
        .join("injector")
        .join("executables")
        .join("mytool");
    let deployed = deploy_dir.join(format!("mytool{}", std::env::consts::EXE_SUFFIX));
    assert!(deployed.is_file(), "trampoline not deployed at {deployed}");

    let path = info.environment.get("PATH").unwrap();
    let expected_prefix = format!("{deploy_dir}{}", EnvMap::path_list_separator());
    assert!(
        path.starts_with(&expected_prefix),
        "PATH should start with the deploy dir: {path}"
    );
    assert!(path.ends_with("/usr/bin"), "host PATH lost: {path}");

    let target = impl_path(&fixture, "sha256new_LIB", "bin/tool");
    if cfg!(windows) {
        assert_eq!(
            info.environment.get("ZEROINSTALL_RUNENV_FILE_mytool"),
            Some(target.as_str())
        );
        assert_eq!(
            info.environment.get("ZEROINSTALL_RUNENV_ARGS_mytool"),
            Some("-q")
        );
    } else {
        assert_eq!(
            info.environment.get("ZEROINSTALL_RUNENV_mytool").unwrap(),
            shell_words_join(&[target.as_str(), "-q"])
        );
    }
}

/// Matches shell_words::join for the simple paths used in these tests.
fn shell_words_join(words: &[&str]) -> String {
    words.join(" ")
}

#[test]
fn executable_in_var_points_at_the_trampoline() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <requires interface="https://example.com/lib">
                 <executable-in-var name="TOOL" command="tool"/>
               </requires>
             </selection>
             <selection interface="https://example.com/lib" id="sha256new_LIB" version="0.9">
               <command name="tool" path="bin/tool"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    let deployed = fixture
        .cache
        .join("injector")
        .join("executables")
        .join("TOOL")
        .join(format!("TOOL{}", std::env::consts::EXE_SUFFIX));
    assert_eq!(info.environment.get("TOOL"), Some(deployed.as_str()));
    assert!(deployed.is_file());
}

#[test]
fn for_each_expands_per_item() {
    let fixture = fixture(&[("CLASSPATH", "/a:/b")]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <arg>prefix</arg>
                 <for-each item-from="CLASSPATH" separator=":">
                   <arg>-cp</arg>
                   <arg>${item}</arg>
                 </for-each>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    assert_eq!(info.arguments, vec!["prefix", "-cp", "/a", "-cp", "/b"]);
    assert_eq!(info.environment.get("item"), None);
}

#[test]
fn wrapper_goes_first_and_user_arguments_last() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <arg>--declared</arg>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    builder.add_wrapper("sudo -E").unwrap();
    builder.add_arguments(["--verbose", "$HOME"]);
    let info = builder.to_start_info().unwrap();

    assert_eq!(info.file_name, Utf8PathBuf::from("sudo"));
    assert_eq!(
        info.arguments,
        vec![
            "-E".to_string(),
            impl_path(&fixture, "sha256new_MAIN", "bin/app").to_string(),
            "--declared".to_string(),
            "--verbose".to_string(),
            // user arguments are never expanded
            "$HOME".to_string(),
        ]
    );
}

#[test]
fn later_prepend_bindings_shadow_earlier_ones() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <environment name="XPATH" value="/one" mode="prepend" separator=":"/>
               <environment name="XPATH" value="/two" mode="prepend" separator=":"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();
    assert_eq!(info.environment.get("XPATH"), Some("/two:/one"));
}

#[test]
fn package_implementations_skip_env_bindings_but_keep_their_paths() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <runner interface="https://example.com/python"/>
               </command>
             </selection>
             <selection interface="https://example.com/python" id="package:deb:python3:3.11"
                        version="3.11">
               <command name="run" path="/usr/bin/python3"/>
               <environment name="PYTHONHOME" insert="" mode="replace"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    // the package path is taken verbatim, not resolved against the store
    assert_eq!(info.file_name, Utf8PathBuf::from("/usr/bin/python3"));
    // and its environment binding was suppressed
    assert_eq!(info.environment.get("PYTHONHOME"), None);
}

#[test]
fn working_dir_binding_applies_once() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <working-dir src="data"/>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();
    assert_eq!(
        info.working_dir.as_deref(),
        Some(impl_path(&fixture, "sha256new_MAIN", "data").as_path())
    );
}

#[test]
fn second_working_dir_is_invalid() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <working-dir src="data"/>
               <command name="run" path="bin/app">
                 <working-dir src="data"/>
               </command>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(error, ExecError::WorkingDirAlreadySet));
    assert_eq!(error.exit_code(), 25);
}

#[test]
fn unsafe_working_dir_is_invalid() {
    for source in ["/abs", "..\\x", "a/../b"] {
        let fixture = fixture(&[]);
        let document = selections(&format!(
            r#"<selections interface="https://example.com/app" command="run">
                 <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
                   <command name="run" path="bin/app">
                     <working-dir src="{source}"/>
                   </command>
                 </selection>
               </selections>"#
        ));

        let error = fixture.executor.inject(&document, None).unwrap_err();
        assert!(
            matches!(error, ExecError::UnsafeWorkingDir { .. }),
            "{source} should be rejected, got {error:?}"
        );
    }
}

#[test]
fn conflicting_environment_binding_is_invalid() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <environment name="X" value="v" insert="lib"/>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(
        error,
        ExecError::ConflictingEnvironmentBinding { .. }
    ));
    assert_eq!(error.exit_code(), 25);
}

#[test]
fn missing_essential_dependency_fails_at_inject() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <requires interface="https://example.com/absent"/>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(
        matches!(&error, ExecError::MissingSelection { interface } if interface.as_str() == "https://example.com/absent")
    );
}

#[test]
fn dangling_restriction_fails_at_inject() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <restricts interface="https://example.com/absent" version="2.0.."/>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(
        matches!(&error, ExecError::MissingSelection { interface } if interface.as_str() == "https://example.com/absent")
    );
    assert_eq!(error.exit_code(), 25);
}

#[test]
fn missing_recommended_dependency_is_tolerated() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <requires interface="https://example.com/absent" importance="recommended">
                 <environment name="OPTIONAL" insert="" mode="replace"/>
               </requires>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();
    assert_eq!(info.environment.get("OPTIONAL"), None);
}

#[test]
fn selections_without_a_command_are_invalid() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0"/>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(error, ExecError::MissingCommandName));
}

#[test]
fn unknown_command_name_is_invalid() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="debug">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(
        &error,
        ExecError::UnknownCommand { name, .. } if name == "debug"
    ));
}

#[test]
fn runner_loops_are_cut_off() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <runner interface="https://example.com/python"/>
               </command>
             </selection>
             <selection interface="https://example.com/python" id="sha256new_PY" version="3.12">
               <command name="run" path="bin/python">
                 <runner interface="https://example.com/app"/>
               </command>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(error, ExecError::CyclicRunnerChain { .. }));
}

#[test]
fn override_main_replaces_the_entry_point() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <arg>--kept</arg>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, Some("bin/alt")).unwrap();
    let info = builder.to_start_info().unwrap();
    assert_eq!(info.file_name, impl_path(&fixture, "sha256new_MAIN", "bin/alt"));
    // declared arguments survive an override
    assert_eq!(info.arguments, vec!["--kept"]);
}

#[test]
fn local_path_implementations_bypass_the_store() {
    let fixture = fixture(&[]);
    // a development checkout living outside any store
    let checkout = fixture.store_root.parent().unwrap().join("checkout");
    std::fs::create_dir_all(checkout.join("bin").as_std_path()).unwrap();
    let document = selections(&format!(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="." version="0.1-dev"
                        local-path="{checkout}">
               <command name="run" path="bin/app"/>
             </selection>
           </selections>"#
    ));

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();
    assert_eq!(info.file_name, checkout.join("bin").join("app"));
}

#[test]
fn implementation_absent_from_the_store_is_reported() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_NOWHERE" version="1.0">
               <command name="run" path="bin/app"/>
             </selection>
           </selections>"#,
    );

    let error = fixture.executor.inject(&document, None).unwrap_err();
    assert!(matches!(&error, ExecError::NotInStore { id } if id == "sha256new_NOWHERE"));
    assert_eq!(error.exit_code(), 12);
}

#[test]
fn to_start_info_is_stable_across_calls() {
    let fixture = fixture(&[("CLASSPATH", "/a:/b")]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app">
                 <for-each item-from="CLASSPATH" separator=":">
                   <arg>${item}</arg>
                 </for-each>
               </command>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let first = builder.to_start_info().unwrap();
    let second = builder.to_start_info().unwrap();
    assert_eq!(first.file_name, second.file_name);
    assert_eq!(first.arguments, second.arguments);
    assert_eq!(
        first.environment.iter().collect::<Vec<_>>(),
        second.environment.iter().collect::<Vec<_>>()
    );
}

#[test]
fn self_referential_executable_binding_applies_once() {
    // An implementation exposing one of its own commands as an executable:
    // the recursion back into its own binding containers must be suppressed,
    // and the env prepend must happen exactly once.
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <command name="helper" path="bin/app"/>
               <executable-in-var name="SELFTOOL" command="helper"/>
               <environment name="MARKER" value="once" mode="prepend" separator=":"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    let info = builder.to_start_info().unwrap();

    // applied once, not "once:once"
    assert_eq!(info.environment.get("MARKER"), Some("once"));
    let deployed = fixture
        .cache
        .join("injector")
        .join("executables")
        .join("SELFTOOL")
        .join(format!("SELFTOOL{}", std::env::consts::EXE_SUFFIX));
    assert_eq!(info.environment.get("SELFTOOL"), Some(deployed.as_str()));
    let recorded = if cfg!(windows) {
        info.environment
            .get("ZEROINSTALL_RUNENV_FILE_SELFTOOL")
            .unwrap()
            .to_owned()
    } else {
        info.environment
            .get("ZEROINSTALL_RUNENV_SELFTOOL")
            .unwrap()
            .to_owned()
    };
    assert!(
        recorded.contains("bin/app") || recorded.contains("bin\\app"),
        "recorded command line should point into the implementation: {recorded}"
    );
}

#[test]
fn set_environment_variable_wins_over_bindings() {
    let fixture = fixture(&[]);
    let document = selections(
        r#"<selections interface="https://example.com/app" command="run">
             <selection interface="https://example.com/app" id="sha256new_MAIN" version="1.0">
               <command name="run" path="bin/app"/>
               <environment name="MODE" value="bound" mode="replace"/>
             </selection>
           </selections>"#,
    );

    let mut builder = fixture.executor.inject(&document, None).unwrap();
    builder.set_environment_variable("MODE", "forced");
    let info = builder.to_start_info().unwrap();
    assert_eq!(info.environment.get("MODE"), Some("forced"));
}
