// tests/fingerprint.rs

use std::fs;
use std::path::PathBuf;

use proptest::prelude::*;
use toolbelt::errors::ToolsError;
use toolbelt::venv::{DependencySpec, Fingerprinter, PipRequirements};

fn pip(requirements: &[&str], files: &[&str]) -> DependencySpec {
    DependencySpec::Pip(PipRequirements {
        requirements: requirements.iter().map(|r| r.to_string()).collect(),
        requirements_files: files.iter().map(PathBuf::from).collect(),
        install_args: Vec::new(),
    })
}

#[test]
fn same_inputs_same_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "rich==13.7.0\n").unwrap();
    fs::write(dir.path().join("b.txt"), "attrs\n").unwrap();
    let fp = Fingerprinter::new("/usr/bin/tools", "");

    let one = fp
        .fingerprint(&pip(&["x", "y"], &["a.txt", "b.txt"]), dir.path())
        .unwrap();
    let two = fp
        .fingerprint(&pip(&["y", "x"], &["b.txt", "a.txt"]), dir.path())
        .unwrap();
    assert_eq!(one, two);
    assert_eq!(one.len(), 64);
    assert!(one.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn file_content_changes_the_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let reqs = dir.path().join("requirements.txt");
    fs::write(&reqs, "rich==13.7.0\n").unwrap();
    let fp = Fingerprinter::new("/usr/bin/tools", "");
    let spec = pip(&[], &["requirements.txt"]);

    let before = fp.fingerprint(&spec, dir.path()).unwrap();
    fs::write(&reqs, "rich==13.7.1\n").unwrap();
    let after = fp.fingerprint(&spec, dir.path()).unwrap();
    assert_ne!(before, after);
}

#[test]
fn seed_and_executable_change_the_fingerprint() {
    let root = std::path::Path::new("/");
    let spec = pip(&["rich"], &[]);
    let base = Fingerprinter::new("/usr/bin/tools", "")
        .fingerprint(&spec, root)
        .unwrap();
    let seeded = Fingerprinter::new("/usr/bin/tools", "2")
        .fingerprint(&spec, root)
        .unwrap();
    let other_exe = Fingerprinter::new("/opt/tools", "")
        .fingerprint(&spec, root)
        .unwrap();
    assert_ne!(base, seeded);
    assert_ne!(base, other_exe);
}

#[test]
fn missing_requirements_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let fp = Fingerprinter::new("tools", "");
    let err = fp
        .fingerprint(&pip(&[], &["missing.txt"]), dir.path())
        .unwrap_err();
    assert!(
        matches!(err, ToolsError::RequirementsFile { ref path, .. } if path.ends_with("missing.txt")),
        "{err:?}"
    );
}

fn requirements_and_permutation() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    proptest::collection::vec("[a-z]{1,8}(==[0-9]\\.[0-9])?", 0..8)
        .prop_flat_map(|reqs| (Just(reqs.clone()), Just(reqs).prop_shuffle()))
}

proptest! {
    #[test]
    fn requirement_order_never_matters(
        (reqs, shuffled) in requirements_and_permutation(),
        seed in "[a-z0-9]{0,4}",
    ) {
        let fp = Fingerprinter::new("tools", seed);
        let root = std::path::Path::new("/");
        let original = DependencySpec::Pip(PipRequirements {
            requirements: reqs,
            ..Default::default()
        });
        let permuted = DependencySpec::Pip(PipRequirements {
            requirements: shuffled,
            ..Default::default()
        });
        prop_assert_eq!(
            fp.fingerprint(&original, root).unwrap(),
            fp.fingerprint(&permuted, root).unwrap()
        );
    }
}
