//! Builtins as seen through the shell

use std::fs;

use super::support::{run, run_in};

#[test]
fn test_echo_forms() {
    assert_eq!(run("echo a   b").text(), "a b\n");
    assert_eq!(run("echo -n no newline").text(), "no newline");
    assert_eq!(run("echo -e 'tab\\there'").text(), "tab\there\n");
    assert_eq!(run("echo").text(), "\n");
}

#[test]
fn test_seq_forms() {
    assert_eq!(run("seq 3").lines(), ["1", "2", "3"]);
    assert_eq!(run("seq 2 4").lines(), ["2", "3", "4"]);
    assert_eq!(run("seq 5 -2 1").lines(), ["5", "3", "1"]);
    assert_eq!(run("seq -w 8 10").lines(), ["08", "09", "10"]);
    assert_eq!(run("seq -s , 3").text(), "1,2,3\n");
}

#[test]
fn test_seq_zero_increment() {
    let status = run("seq 1 0 3");
    assert_eq!(status.code, 1);
    assert_eq!(status.stderr_text(), "seq: zero increment\n");
}

#[test]
fn test_basename_dirname() {
    assert_eq!(run("basename /usr/lib/libc.so lib/").lines(), ["libc.so", "lib"]);
    assert_eq!(run("basename /").text(), "/\n");
    assert_eq!(run("dirname /usr/lib/").text(), "/usr\n");
    assert_eq!(run("dirname file").text(), ".\n");
    assert_eq!(run("dirname /").text(), "/\n");
}

#[test]
fn test_true_false_exit() {
    assert_eq!(run("true").code, 0);
    assert_eq!(run("false").code, 1);
    assert_eq!(run("exit 256").code, 0);
    assert_eq!(run("false; exit").code, 1);
}

#[test]
fn test_rm_d() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("empty")).unwrap();
    fs::create_dir(dir.path().join("full")).unwrap();
    fs::write(dir.path().join("full/x"), "x").unwrap();

    assert_eq!(run_in(dir.path(), "rm -d empty").code, 0);
    assert!(!dir.path().join("empty").exists());

    let status = run_in(dir.path(), "rm -d full");
    assert_eq!(status.code, 1);
    assert_eq!(status.stderr_text(), "rm: full: Directory not empty\n");

    let status = run_in(dir.path(), "rm full");
    assert_eq!(status.stderr_text(), "rm: full: is a directory\n");
    assert_eq!(run_in(dir.path(), "rm -r full").code, 0);
    assert!(!dir.path().join("full").exists());
}

#[test]
fn test_file_operations() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_in(
        dir.path(),
        "mkdir -p a/b && touch a/b/f && cp a/b/f copy && mv copy moved && ls a/b . ",
    );
    assert_eq!(status.code, 0, "{}", status.stderr_text());
    assert!(dir.path().join("a/b/f").exists());
    assert!(dir.path().join("moved").exists());
    assert!(!dir.path().join("copy").exists());
}

#[test]
fn test_ls_output() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b", "a", ".dot"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    assert_eq!(run_in(dir.path(), "ls").lines(), ["a", "b"]);
    assert_eq!(run_in(dir.path(), "ls -A").lines(), [".dot", "a", "b"]);
}

#[test]
fn test_which_and_pwd() {
    let status = run("which sh");
    assert_eq!(status.code, 0);
    assert!(status.text().trim_end().ends_with("/sh"));
    assert_eq!(run("which echo").text(), "echo: shell built-in command\n");

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_in(dir.path(), "pwd").text(), format!("{}\n", dir.path().display()));
}

#[test]
fn test_builtins_see_command_local_variables() {
    let status = run("PATH=/nonexistent which sh");
    assert_eq!(status.code, 1);
}
