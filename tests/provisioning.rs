// tests/provisioning.rs
#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serial_test::serial;
use toolbelt::errors::ToolsError;
use toolbelt::venv::lock::EnvLock;
use toolbelt::venv::{BaseRequirements, DependencySpec, PoetryExport, VirtualEnv, VirtualEnvConfig};
use toolbelt_test_utils::FakePython;

use crate::common::{TestRepo, init_tracing, sh};

fn rich_env(name: &str) -> VirtualEnvConfig {
    VirtualEnvConfig::builder()
        .name(name)
        .requirement("rich")
        .build()
        .unwrap()
}

#[test]
#[serial]
fn provisioning_is_idempotent() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("lint"), &ws).unwrap();

    venv.ensure_ready().unwrap();
    venv.ensure_ready().unwrap();

    let py = repo.python();
    assert_eq!(py.count("-m venv"), 1, "{:#?}", py.invocations());
    assert_eq!(py.count("-m pip install -U wheel"), 1);
    assert_eq!(py.count("-m pip install rich"), 1);
    assert!(venv.python().is_file());
    assert!(venv.dir().join(".requirements.hash").is_file());
    assert!(venv.dir().starts_with(repo.root().join(".tools-venvs/py3.11")));
}

#[test]
#[serial]
fn changed_requirements_reinstall_without_recreating() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    VirtualEnv::new(&rich_env("lint"), &ws).unwrap().ensure_ready().unwrap();

    let changed = VirtualEnvConfig::builder()
        .name("lint")
        .requirement("rich")
        .requirement("attrs")
        .build()
        .unwrap();
    VirtualEnv::new(&changed, &ws).unwrap().ensure_ready().unwrap();

    let py = repo.python();
    assert_eq!(py.count("-m venv"), 1);
    assert_eq!(py.count("-m pip install attrs rich"), 1, "{:#?}", py.invocations());
}

#[test]
#[serial]
fn requirements_file_edits_trigger_a_reinstall() {
    init_tracing();
    let repo = TestRepo::new();
    repo.write("reqs/dev.txt", "rich\n");
    let ws = repo.workspace();
    let config = VirtualEnvConfig::builder()
        .name("dev")
        .requirements_file("reqs/dev.txt")
        .build()
        .unwrap();
    let venv = VirtualEnv::new(&config, &ws).unwrap();

    venv.ensure_ready().unwrap();
    venv.ensure_ready().unwrap();
    repo.write("reqs/dev.txt", "rich\nattrs\n");
    venv.ensure_ready().unwrap();

    assert_eq!(repo.python().count("install -r"), 2);
}

#[test]
#[serial]
fn corrupted_environment_is_recreated() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("docs"), &ws).unwrap();
    venv.ensure_ready().unwrap();

    std::fs::remove_file(venv.python()).unwrap();
    venv.ensure_ready().unwrap();

    let py = repo.python();
    assert_eq!(py.count("-m venv"), 2);
    assert_eq!(py.count("-m pip install rich"), 2, "hash file went with the directory");
    assert!(venv.python().is_file());
}

#[test]
#[serial]
fn missing_interpreter_during_install_recreates_once() {
    init_tracing();
    let repo = TestRepo::with_python(FakePython::builder().vanish_after_bootstrap(1));
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("flaky"), &ws).unwrap();

    venv.ensure_ready().unwrap();

    let py = repo.python();
    assert_eq!(py.count("-m venv"), 2, "{:#?}", py.invocations());
    assert_eq!(py.count("-m pip install rich"), 1);
    assert!(venv.python().is_file());
    assert!(venv.dir().join(".requirements.hash").is_file());
}

#[test]
#[serial]
fn missing_interpreter_twice_is_fatal() {
    init_tracing();
    let repo = TestRepo::with_python(FakePython::builder().vanish_after_bootstrap(2));
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("flaky"), &ws).unwrap();

    let err = venv.ensure_ready().unwrap_err();
    assert!(err.is_missing_file(), "{err:?}");
    assert!(matches!(err, ToolsError::Spawn { .. }), "{err:?}");
    assert_eq!(repo.python().count("-m venv"), 2);
    assert!(!venv.dir().join(".requirements.hash").exists());
}

#[test]
#[serial]
fn missing_requirements_file_fails_before_touching_disk() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let config = VirtualEnvConfig::builder()
        .name("broken")
        .requirements_file("nope.txt")
        .build()
        .unwrap();
    let venv = VirtualEnv::new(&config, &ws).unwrap();

    let err = venv.ensure_ready().unwrap_err();
    assert!(matches!(err, ToolsError::RequirementsFile { .. }), "{err:?}");
    assert!(!venv.dir().exists());
    assert_eq!(repo.python().count("-m venv"), 0);
}

#[test]
#[serial]
fn concurrent_provisioning_is_serialised_by_the_lock() {
    init_tracing();
    let repo = TestRepo::with_python(FakePython::builder().pip_delay(Duration::from_millis(500)));
    let ws = repo.workspace();
    let config = rich_env("shared");

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ws = ws.clone();
            let config = config.clone();
            thread::spawn(move || VirtualEnv::new(&config, &ws).unwrap().ensure_ready())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let py = repo.python();
    assert_eq!(py.count("-m venv"), 1, "{:#?}", py.invocations());
    assert_eq!(py.count("-m pip install rich"), 1);
}

#[test]
#[serial]
fn held_lock_times_out() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let lock_path = ws.paths().unwrap().lock_path("busy");
    let _held = EnvLock::acquire(&lock_path, "busy", Duration::from_secs(1)).unwrap();

    let config = VirtualEnvConfig::builder()
        .name("busy")
        .lock_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let err = VirtualEnv::new(&config, &ws).unwrap().ensure_ready().unwrap_err();
    match err {
        ToolsError::LockTimeout { name, .. } => assert_eq!(name, "busy"),
        other => panic!("expected a lock timeout, got {other:?}"),
    }
}

#[test]
#[serial]
fn lock_directory_name_cannot_be_an_environment() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    VirtualEnv::new(&rich_env("docs"), &ws).unwrap().ensure_ready().unwrap();
    let docs_lock = ws.paths().unwrap().lock_path("docs");
    assert!(docs_lock.is_file());

    let err = VirtualEnv::new(&rich_env("locks"), &ws).unwrap_err();
    assert!(matches!(err, ToolsError::Config(_)), "{err:?}");
    assert!(docs_lock.is_file());
}

#[test]
fn mixing_backends_is_a_config_error() {
    let err = VirtualEnvConfig::builder()
        .requirement("rich")
        .poetry(PoetryExport::default())
        .build()
        .unwrap_err();
    assert!(matches!(err, ToolsError::Config(_)), "{err:?}");

    let err = DependencySpec::builder()
        .requirements_file("a.txt")
        .poetry(PoetryExport::default())
        .build()
        .unwrap_err();
    assert!(matches!(err, ToolsError::Config(_)), "{err:?}");
}

#[test]
#[serial]
fn run_puts_the_environment_first_on_path() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let config = VirtualEnvConfig::builder()
        .name("paths")
        .env("TOOLS_FROM_CONFIG", "config")
        .build()
        .unwrap();
    let venv = VirtualEnv::new(&config, &ws).unwrap();
    venv.ensure_ready().unwrap();

    let out = venv
        .run(sh("echo \"$PATH\"; echo \"$TOOLS_FROM_CONFIG\"; pwd").capture(true))
        .unwrap();
    let stdout = out.stdout_lossy();
    let mut lines = stdout.lines();
    let path = lines.next().unwrap();
    let first = std::env::split_paths(path).next().unwrap();
    assert_eq!(first, venv.bin_dir());
    assert_eq!(lines.next(), Some("config"));
    let cwd = PathBuf::from(lines.next().unwrap());
    assert_eq!(cwd.canonicalize().unwrap(), repo.root().canonicalize().unwrap());
}

#[test]
#[serial]
fn caller_env_wins_over_config_env() {
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let config = VirtualEnvConfig::builder()
        .name("envs")
        .env("TOOLS_VALUE", "config")
        .build()
        .unwrap();
    let venv = VirtualEnv::new(&config, &ws).unwrap();
    venv.ensure_ready().unwrap();

    let out = venv
        .run(sh("echo \"$TOOLS_VALUE\"").env("TOOLS_VALUE", "caller").capture(true))
        .unwrap();
    assert_eq!(out.stdout_lossy(), "caller\n");
}

#[test]
#[serial]
fn site_packages_are_added_only_while_entered() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let config = VirtualEnvConfig::builder()
        .name("plugins")
        .add_as_extra_site_packages(true)
        .build()
        .unwrap();
    let venv = VirtualEnv::new(&config, &ws).unwrap();
    let expected = venv.dir().join("lib/site-packages");

    {
        let active = venv.enter().unwrap();
        assert_eq!(active.added_site_packages(), &[expected.clone()]);
        assert!(ws.search_path().contains(&expected));
    }
    assert!(!ws.search_path().contains(&expected));

    let plain = VirtualEnv::new(&rich_env("plain"), &ws).unwrap();
    let active = plain.enter().unwrap();
    assert!(active.added_site_packages().is_empty());
    assert!(ws.search_path().is_empty());
}

#[test]
#[serial]
fn installed_packages_are_parsed() {
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("list"), &ws).unwrap();
    venv.ensure_ready().unwrap();

    let packages = venv.installed_packages().unwrap();
    assert_eq!(packages.get("rich").map(String::as_str), Some("13.7.0"));
    assert_eq!(packages.len(), 2);
}

#[test]
#[serial]
fn install_and_uninstall_run_pip_in_the_environment() {
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let venv = VirtualEnv::new(&rich_env("pipops"), &ws).unwrap();
    venv.ensure_ready().unwrap();

    venv.install(["black"]).unwrap();
    venv.uninstall(["black"]).unwrap();

    let venv_python = venv.python().display().to_string();
    let py = repo.python();
    assert_eq!(py.count(&format!("{venv_python} -m pip install black")), 1);
    assert_eq!(py.count(&format!("{venv_python} -m pip uninstall -y black")), 1);
}

#[test]
#[serial]
fn failing_bootstrap_is_a_creation_error() {
    init_tracing();
    let repo = TestRepo::with_python(FakePython::builder().pip_exit_code(2));
    let ws = repo.workspace();
    let err = VirtualEnv::new(&rich_env("bad"), &ws)
        .unwrap()
        .ensure_ready()
        .unwrap_err();
    match &err {
        ToolsError::VenvCreation { name, .. } => assert_eq!(name, "bad"),
        other => panic!("expected a creation error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
}

#[test]
#[serial]
fn base_requirements_install_once() {
    init_tracing();
    let repo = TestRepo::new();
    let ws = repo.workspace();
    let base = BaseRequirements::new(
        DependencySpec::builder().requirement("rich").build().unwrap(),
    );

    assert!(base.install(&ws).unwrap());
    assert!(!base.install(&ws).unwrap());

    let hash = ws.paths().unwrap().default_config_hash_file();
    assert!(hash.is_file());
    let base_python = repo.python().path().display().to_string();
    assert_eq!(repo.python().count(&format!("{base_python} -m pip install rich")), 1);
}
