//! Redirects to files, streams and host buffers

use std::fs;

use husk_interpreter::{HostBuffer, HostValue, ShellError, Template};

use super::support::{run, run_in, shell};

#[test]
fn test_truncate_and_append() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), "echo one > out; echo two >> out; echo three 1>> out");
    assert_eq!(fs::read_to_string(dir.path().join("out")).unwrap(), "one\ntwo\nthree\n");

    run_in(dir.path(), "echo fresh > out");
    assert_eq!(fs::read_to_string(dir.path().join("out")).unwrap(), "fresh\n");
}

#[test]
fn test_input_redirect() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in"), "b\na\n").unwrap();
    assert_eq!(run_in(dir.path(), "sort < in").lines(), ["a", "b"]);
    assert_eq!(run_in(dir.path(), "sort 0< in").lines(), ["a", "b"]);
}

#[test]
fn test_stderr_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_in(dir.path(), "sh -c 'echo out; echo err 1>&2' 2> err.txt");
    assert_eq!(status.text(), "out\n");
    assert_eq!(status.stderr_text(), "");
    assert_eq!(fs::read_to_string(dir.path().join("err.txt")).unwrap(), "err\n");

    run_in(dir.path(), "sh -c 'echo again 1>&2' 2>> err.txt");
    assert_eq!(fs::read_to_string(dir.path().join("err.txt")).unwrap(), "err\nagain\n");
}

#[test]
fn test_both_streams_to_one_file() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), "rm missing &> both.txt; echo ok &>> both.txt");
    assert_eq!(
        fs::read_to_string(dir.path().join("both.txt")).unwrap(),
        "rm: missing: No such file or directory\nok\n"
    );
}

#[test]
fn test_duplication() {
    let status = run("echo to-err 1>&2");
    assert_eq!(status.text(), "");
    assert_eq!(status.stderr_text(), "to-err\n");

    let status = run("echo also >&2");
    assert_eq!(status.stderr_text(), "also\n");

    let status = run("rm missing 2>&1 | tr a-z A-Z");
    assert_eq!(status.text(), "RM: MISSING: NO SUCH FILE OR DIRECTORY\n");
}

#[test]
fn test_redirect_target_is_expanded() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), "NAME=target; echo x > $NAME.txt");
    assert!(dir.path().join("target.txt").exists());
}

#[test]
fn test_missing_parent_fails_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_in(dir.path(), "echo x > nodir/out; echo next");
    assert_eq!(status.text(), "next\n");
    assert_eq!(status.stderr_text(), "husk: No such file or directory: nodir/out\n");

    let status = run_in(dir.path(), "cat < absent");
    assert_eq!(status.code, 1);
    assert_eq!(status.stderr_text(), "husk: No such file or directory: absent\n");
}

#[test]
fn test_redirect_without_command_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_in(dir.path(), "> empty.txt");
    assert_eq!(status.code, 0);
    assert_eq!(fs::read(dir.path().join("empty.txt")).unwrap(), b"");
}

#[test]
fn test_subshell_redirect() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), "(echo a; echo b) > both.txt");
    assert_eq!(fs::read_to_string(dir.path().join("both.txt")).unwrap(), "a\nb\n");
}

#[test]
fn test_host_buffer_collects_external_output() {
    let buffer = HostBuffer::new();
    let status = shell()
        .run(Template::new().text("sh -c 'echo from child' > ").value(&buffer).text("; echo done"))
        .unwrap();
    assert_eq!(buffer.to_string_lossy(), "from child\n");
    assert_eq!(status.text(), "done\n");
}

#[test]
fn test_host_buffer_truncate_and_append() {
    let buffer = HostBuffer::new();
    buffer.append(b"stale\n");
    run(Template::new().text("echo fresh > ").value(&buffer));
    assert_eq!(buffer.to_string_lossy(), "fresh\n");

    run(Template::new().text("echo more >> ").value(&buffer));
    assert_eq!(buffer.to_string_lossy(), "fresh\nmore\n");
}

#[test]
fn test_host_buffer_as_input() {
    let buffer = HostBuffer::new();
    buffer.append(b"z\ny\n");
    let status = run(Template::new().text("sort < ").value(&buffer));
    assert_eq!(status.lines(), ["y", "z"]);
}

#[test]
fn test_host_bytes_feed_builtins_and_pipelines() {
    let input = HostValue::Bytes(b"one\ntwo\nthree\n".to_vec().into());
    let status = run(Template::new().text("wc -l < ").value(input).text(" | tr -d ' '"));
    assert_eq!(status.text(), "3\n");
}

#[test]
fn test_host_bytes_cannot_be_written() {
    let input = HostValue::Bytes(b"x".to_vec().into());
    let err = shell().run(Template::new().text("echo x > ").value(input)).unwrap_err();
    assert!(matches!(err, ShellError::Syntax(_)), "{err}");
}

#[test]
fn test_interpolated_path_target() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("has space.txt");
    run(Template::new().text("echo hi > ").value(target.as_path()));
    assert_eq!(fs::read_to_string(&target).unwrap(), "hi\n");
}
