//! Parser + interpreter: statements, variables, substitution and scoping

use std::fs;
use std::time::{Duration, Instant};

use husk_interpreter::{Interpreter, ShellEnv, Template};

use super::support::{run, run_in, shell};

#[test]
fn test_statements_run_in_order() {
    let status = run("echo one; echo two\necho three");
    assert_eq!(status.lines(), ["one", "two", "three"]);
    assert_eq!(status.code, 0);
}

#[test]
fn test_conditionals_short_circuit() {
    assert_eq!(run("true && echo yes").text(), "yes\n");
    assert_eq!(run("false && echo yes").text(), "");
    assert_eq!(run("false || echo fallback").text(), "fallback\n");
    assert_eq!(run("true || echo fallback").text(), "");
    assert_eq!(run("false && echo a || echo b").text(), "b\n");
    assert_eq!(run("false && echo never").code, 1);
}

#[test]
fn test_last_status_variable() {
    assert_eq!(run("false; echo $?").text(), "1\n");
    assert_eq!(run("true; echo $?").text(), "0\n");
    assert_eq!(run("false || echo $?").text(), "1\n");
}

#[test]
fn test_assignment_and_expansion() {
    assert_eq!(run("name=world; echo hello $name").text(), "hello world\n");
    assert_eq!(run("A=1 B=2; echo $A$B").text(), "12\n");
    assert_eq!(run("echo ${unset_var:-default_value}").text(), "default_value\n");
    assert_eq!(run("X=set; echo ${X:+alt}").text(), "alt\n");
}

#[test]
fn test_assign_only_statement_exits_zero() {
    let status = run("false; X=1");
    assert_eq!(status.code, 0);
}

#[test]
fn test_command_local_assignment_is_scoped() {
    let status = run("GREETING=hi sh -c 'echo $GREETING'; echo \"[$GREETING]\"");
    assert_eq!(status.lines(), ["hi", "[]"]);
}

#[test]
fn test_export_visible_to_children_plain_assignment_not() {
    let status = run("export SHARED=1; PRIVATE=2; sh -c 'echo \"$SHARED-$PRIVATE\"'");
    assert_eq!(status.text(), "1-\n");

    let status = run("LATER=3; export LATER; sh -c 'echo $LATER'");
    assert_eq!(status.text(), "3\n");
}

#[test]
fn test_bare_export_lists_exported_variables() {
    let status = shell().env_clear().run("export B='two words' A=1; HIDDEN=x; export").unwrap();
    assert_eq!(status.lines(), ["export A=1", "export B='two words'"]);
}

#[test]
fn test_assignments_before_export() {
    let status = run("A=1 export B=2; echo \"[$A][$B]\"; sh -c 'echo \"[$A][$B]\"'");
    assert_eq!(status.lines(), ["[1][2]", "[][2]"]);
    assert_eq!(status.stderr_text(), "");

    let status = shell().env_clear().run("export X=1; A=2 export; echo $A").unwrap();
    assert_eq!(status.lines(), ["export X=1", "2"]);
}

#[test]
fn test_substitution_status_in_assignment() {
    assert_eq!(run("x=$(false); echo $?").text(), "1\n");
    assert_eq!(run("x=$(sh -c 'exit 3'); echo $?").text(), "3\n");
    assert_eq!(run("false; x=plain; echo $?").text(), "0\n");
    assert_eq!(run("x=$(false) y=$(true); echo $?").text(), "0\n");
}

#[test]
fn test_command_substitution() {
    assert_eq!(run("echo $(echo inner)").text(), "inner\n");
    assert_eq!(run("echo `echo ticks`").text(), "ticks\n");
    assert_eq!(run("echo x$(printf 'a b')y").lines(), ["xa by"]);
    assert_eq!(run("echo \"$(printf 'a  b')\"").text(), "a  b\n");
}

#[test]
fn test_substitution_output_is_word_split() {
    let status = run("sh -c 'echo $#' x $(printf 'one two\\nthree')");
    assert_eq!(status.text(), "3\n");
}

#[test]
fn test_variables_are_not_split() {
    let status = run("V='a b c'; sh -c 'echo $#' x $V");
    assert_eq!(status.text(), "1\n");
}

#[test]
fn test_brace_expansion() {
    assert_eq!(run("echo {a,b}{1,2}").text(), "a1 a2 b1 b2\n");
    assert_eq!(run("echo pre{x,y{1,2}}").text(), "prex prey1 prey2\n");
    assert_eq!(run("echo '{a,b}'").text(), "{a,b}\n");
}

#[test]
fn test_globbing() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.txt", "a.txt", ".hidden.txt", "c.md"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    assert_eq!(run_in(dir.path(), "echo *.txt").text(), "a.txt b.txt\n");
    assert_eq!(run_in(dir.path(), "echo '*.txt'").text(), "*.txt\n");
    assert_eq!(run_in(dir.path(), "echo *.none").text(), "*.none\n");
}

#[test]
fn test_subshell_does_not_leak_scope() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let status = run_in(dir.path(), "X=outer; (X=inner; cd sub; echo $X; pwd); echo $X; pwd");
    let sub = dir.path().join("sub");
    assert_eq!(
        status.lines(),
        [
            "inner".to_string(),
            sub.display().to_string(),
            "outer".to_string(),
            dir.path().display().to_string()
        ]
    );
}

#[test]
fn test_subshell_exit_ends_only_the_subshell() {
    let status = run("(echo in; exit 3; echo never); echo after $?");
    assert_eq!(status.lines(), ["in", "after 3"]);
}

#[test]
fn test_exit_stops_the_script() {
    let status = run("echo before; exit 4; echo after");
    assert_eq!(status.text(), "before\n");
    assert_eq!(status.code, 4);
}

#[test]
fn test_background_jobs_are_awaited() {
    let start = Instant::now();
    let status = run("sleep 0.2 & echo started");
    assert_eq!(status.text(), "started\n");
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_background_jobs_run_concurrently() {
    let start = Instant::now();
    let status = run("sleep 0.3 & sleep 0.3 & sleep 0.3");
    assert_eq!(status.code, 0);
    assert!(start.elapsed() < Duration::from_millis(850));
}

#[test]
fn test_background_job_has_its_own_scope() {
    let status = run("X=1 & echo \"[$X]\"");
    assert_eq!(status.text(), "[]\n");
}

#[test]
fn test_exit_kills_background_jobs() {
    let start = Instant::now();
    let status = run("sleep 5 & exit 2");
    assert_eq!(status.code, 2);
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_cd_and_back() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("inner")).unwrap();
    let status = run_in(dir.path(), "cd inner && pwd && cd - && pwd");
    let inner = dir.path().join("inner").display().to_string();
    let outer = dir.path().display().to_string();
    assert_eq!(status.lines(), [inner, outer.clone(), outer]);
}

#[test]
fn test_cd_into_file_is_20() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file"), "").unwrap();
    let status = run_in(dir.path(), "cd file");
    assert_eq!(status.code, 20);
    assert_eq!(status.stderr_text(), "cd: file: Not a directory\n");
}

#[test]
fn test_command_not_found() {
    let status = run("definitely_not_a_command_42 arg");
    assert_eq!(status.code, 1);
    assert_eq!(status.stderr_text(), "husk: command not found: definitely_not_a_command_42\n");
}

#[test]
fn test_external_signal_exit_code() {
    let status = run("sh -c 'kill -9 $$'");
    assert_eq!(status.code, 128 + 9);
}

#[test]
fn test_host_values_are_single_words() {
    let dir = tempfile::tempdir().unwrap();
    let name = "name with spaces; rm -rf x";
    let status = shell()
        .cwd(dir.path())
        .run(Template::new().text("touch ").value(name).text(" && ls"))
        .unwrap();
    assert_eq!(status.lines(), [name]);

    let list = vec!["a b".to_string(), "c".to_string()];
    let status = run(Template::new().text("sh -c 'echo $#' x ").value(list));
    assert_eq!(status.text(), "2\n");
}

#[test]
fn test_interpreter_keeps_scope_between_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let mut interp = Interpreter::new(ShellEnv::new(Default::default(), dir.path().to_path_buf()));
    interp.execute(&husk_parser::parse("export KEEP=yes; mkdir d; cd d").unwrap()).unwrap();
    assert_eq!(interp.env().get("KEEP").as_deref(), Some("yes"));
    assert_eq!(interp.env().cwd(), dir.path().join("d"));
}
