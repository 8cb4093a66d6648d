// tests/config.rs

mod common;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use toolbelt::config::{CommandLine, load, load_and_validate, locate, register_tools_file};
use toolbelt::dispatch::Dispatcher;
use toolbelt::errors::ToolsError;
use toolbelt::venv::DependencySpec;

use crate::common::{TestRepo, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

fn demo_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/tools.toml")
}

#[test]
fn demo_tools_file_is_valid() -> TestResult {
    init_tracing();
    let file = load_and_validate(demo_file())?;

    assert_eq!(file.settings.python.as_deref(), Some("python3"));
    assert_eq!(file.settings.lock_timeout, Some(Duration::from_secs(120)));
    assert!(matches!(file.default_requirements, Some(DependencySpec::Pip(_))));

    let paths: Vec<_> = file.groups.iter().map(|g| g.path.join(" ")).collect();
    assert_eq!(paths, vec!["ci", "ci docs"]);
    let docs_venv = file.groups[1].venv.as_ref().ok_or("docs group has a venv")?;
    assert_eq!(docs_venv.name.as_deref(), Some("docs"));
    assert!(docs_venv.add_as_extra_site_packages);

    let lint = file
        .commands
        .iter()
        .find(|c| c.name == "lint")
        .ok_or("lint command declared")?;
    assert_eq!(lint.no_output_timeout, Some(Duration::from_secs(300)));
    let lint_venv = lint.venv.as_ref().ok_or("lint has a venv")?;
    assert_eq!(lint_venv.env.get("MYPY_CACHE_DIR").map(String::as_str), Some(".cache/mypy"));

    let fmt = file
        .commands
        .iter()
        .find(|c| c.name == "fmt-check")
        .ok_or("fmt-check command declared")?;
    assert!(!fmt.check);
    assert!(matches!(fmt.cmd, CommandLine::Shell(_)));

    let build = file
        .commands
        .iter()
        .find(|c| c.name == "build")
        .ok_or("build command declared")?;
    assert_eq!(build.group_path, vec!["ci", "docs"]);
    Ok(())
}

#[test]
fn demo_tools_file_builds_nested_cli() -> TestResult {
    let repo = TestRepo::new();
    let file = load_and_validate(demo_file())?;
    let mut tools = Dispatcher::new(repo.workspace());
    register_tools_file(&file, &mut tools)?;

    let cli = tools.cli();
    let ci = cli.find_subcommand("ci").ok_or("ci group")?;
    assert!(ci.find_subcommand("lint").is_some());
    assert!(ci.find_subcommand("fmt-check").is_some());
    let docs = ci.find_subcommand("docs").ok_or("docs subgroup")?;
    assert!(docs.find_subcommand("build").is_some());
    Ok(())
}

#[test]
fn nested_directories_find_the_repo_file() -> TestResult {
    if std::env::var_os("TOOLS_CONFIG").is_some() {
        return Ok(());
    }
    let repo = TestRepo::new();
    repo.write("tools.toml", "[group.ci]\nhelp = \"CI\"\n");
    repo.write("src/pkg/__init__.py", "");

    let location = locate(&repo.root().join("src/pkg"));
    assert_eq!(location.repo_root, repo.root());
    assert_eq!(location.path, repo.root().join("tools.toml"));
    let file = load(&location)?;
    assert_eq!(file.groups.len(), 1);
    Ok(())
}

#[test]
fn invalid_files_are_reported() {
    let repo = TestRepo::new();

    let syntax = repo.write("syntax.toml", "[command.ci\ncmd = 1\n");
    assert!(matches!(load_and_validate(&syntax), Err(ToolsError::Toml(_))));

    let cycle = repo.write(
        "cycle.toml",
        "[group.a]\nparent = \"c\"\n[group.b]\nparent = \"a\"\n[group.c]\nparent = \"b\"\n",
    );
    let err = load_and_validate(&cycle).unwrap_err();
    assert!(matches!(err, ToolsError::Config(_)), "{err:?}");
    assert!(err.to_string().contains("cycle"), "{err}");

    let dangling = repo.write(
        "dangling.toml",
        "[group.ci]\n[command.ci.docs]\ncmd = \"make html\"\nvenv = \"docs\"\n",
    );
    let err = load_and_validate(&dangling).unwrap_err();
    assert!(err.to_string().contains("unknown venv 'docs'"), "{err}");

    let unknown_field = repo.write("field.toml", "[group.ci]\ncolour = \"red\"\n");
    assert!(matches!(load_and_validate(&unknown_field), Err(ToolsError::Toml(_))));

    let missing = repo.root().join("missing.toml");
    assert!(matches!(load_and_validate(&missing), Err(ToolsError::Io(_))));
}
