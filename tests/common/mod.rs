#![allow(dead_code)]

use std::ffi::OsString;

pub use toolbelt_test_utils::builders::{TestRepo, tools_file};
pub use toolbelt_test_utils::{FakePython, init_tracing, with_timeout};

pub fn argv(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

/// `sh -c <script>` as a request.
pub fn sh(script: &str) -> toolbelt::exec::ExecRequest {
    toolbelt::exec::ExecRequest::new("sh").args(["-c", script])
}
