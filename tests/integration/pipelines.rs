//! Pipelines: wiring, exit codes, termination and descriptor hygiene

use std::time::{Duration, Instant};

use super::support::{open_fds, run, shell};

#[test]
fn test_exit_code_is_last_stage() {
    assert_eq!(run("false | true").code, 0);
    assert_eq!(run("true | false").code, 1);
    assert_eq!(run("sh -c 'exit 5' | sh -c 'exit 6'").code, 6);
}

#[test]
fn test_builtin_into_external() {
    assert_eq!(run("echo hello | tr a-z A-Z").text(), "HELLO\n");
    assert_eq!(run("seq 3 | sort -r").lines(), ["3", "2", "1"]);
}

#[test]
fn test_external_into_builtin_output_order() {
    let status = run("printf 'a\\nb\\n' | cat | cat | wc -l");
    assert_eq!(status.text().trim(), "2");
}

#[test]
fn test_large_output_through_pipe() {
    let status = run("seq 1 200000 | tail -n 1");
    assert_eq!(status.text(), "200000\n");

    let status = run("seq 1 50000 | wc -l");
    assert_eq!(status.text().trim(), "50000");
}

#[test]
fn test_yes_head_terminates() {
    let start = Instant::now();
    let status = run("yes | head -n 1");
    assert_eq!(status.text(), "y\n");
    assert_eq!(status.code, 0);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_builtin_writer_after_reader_exits() {
    let status = run("seq 1 1000000 | head -n 2");
    assert_eq!(status.lines(), ["1", "2"]);
    assert_eq!(status.code, 0);
}

#[test]
fn test_assignment_stage_does_not_leak() {
    let status = run("FOO=bar | echo \"[$FOO]\"; echo \"[$FOO]\"");
    assert_eq!(status.lines(), ["[]", "[]"]);
}

#[test]
fn test_cd_in_pipeline_stage_is_private() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let status = shell().cwd(dir.path()).run("cd sub | true; pwd").unwrap();
    assert_eq!(status.text(), format!("{}\n", dir.path().display()));
}

#[test]
fn test_subshell_as_stage() {
    let status = run("(echo one; echo two) | wc -l");
    assert_eq!(status.text().trim(), "2");

    let status = run("echo piped | (cat; echo tail)");
    assert_eq!(status.lines(), ["piped", "tail"]);
}

#[test]
fn test_pipeline_inside_conditional() {
    let status = run("echo x | grep -q y || echo missing");
    assert_eq!(status.text(), "missing\n");
}

#[test]
fn test_substitution_of_pipeline() {
    let status = run("echo \"$(echo abc | tr a-c x-z)\"");
    assert_eq!(status.text(), "xyz\n");
}

#[test]
fn test_no_descriptor_growth() {
    run("true | true");
    let before = open_fds();
    for _ in 0..1000 {
        let status = run("true | true");
        assert_eq!(status.code, 0);
    }
    let after = open_fds();
    // Other tests run concurrently in this process; a leak here would be
    // thousands of descriptors
    assert!(after <= before + 64, "descriptors grew from {before} to {after}");
}

#[test]
fn test_no_descriptor_growth_with_external_stages() {
    run("echo x | cat");
    let before = open_fds();
    for _ in 0..100 {
        assert_eq!(run("echo x | cat | cat").text(), "x\n");
    }
    let after = open_fds();
    assert!(after <= before + 64, "descriptors grew from {before} to {after}");
}
