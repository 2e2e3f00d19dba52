//! Lexer + parser through the public API, and the quoting helpers

use husk_ast::{Expr, HuskError, PipelineItem, RedirectTarget};
use husk_interpreter::{Template, braces};
use husk_parser::{Parser, escape, parse};

use super::support::run;

#[test]
fn test_statement_structure() {
    let script = parse("a | b && c; d & e\nf").unwrap();
    assert_eq!(script.statements.len(), 3);

    match &script.statements[0].expressions[..] {
        [Expr::Cond(cond)] => assert!(matches!(cond.left, Expr::Pipeline(_))),
        other => panic!("unexpected {other:?}"),
    }
    let second = &script.statements[1].expressions;
    assert_eq!(second.len(), 2);
    assert!(matches!(second[0], Expr::Async(_)));
    assert!(matches!(second[1], Expr::Cmd(_)));
}

#[test]
fn test_subshell_in_pipeline() {
    let script = parse("(echo a; echo b) 2>&1 | cat").unwrap();
    match &script.statements[0].expressions[0] {
        Expr::Pipeline(pipeline) => match &pipeline.items[0] {
            PipelineItem::Subshell(subshell) => {
                assert_eq!(subshell.script.statements.len(), 2);
                assert_eq!(subshell.redirects.len(), 1);
                assert!(matches!(subshell.redirects[0].target, RedirectTarget::Duplicate));
            }
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_background_before_conditional_is_rejected() {
    let err = parse("echo x & && echo y").unwrap_err();
    assert!(matches!(err, HuskError::Syntax { .. }));
    assert!(parse("echo x & || echo y").is_err());
}

#[test]
fn test_errors_carry_positions() {
    let err = Parser::new_with_filename("echo ok\necho 'open", "script.sh").unwrap_err();
    match err {
        HuskError::Lex {
            filename, line, ..
        } => {
            assert_eq!(filename, "script.sh");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(parse("echo \"open").is_err());
    assert!(parse("echo $(unclosed").is_err());
}

#[test]
fn test_host_object_outside_redirect_is_rejected() {
    let buffer = husk_interpreter::HostBuffer::new();
    let template = Template::new().text("echo ").value(&buffer);
    let err = Parser::with_template(template.source(), &template.slots())
        .and_then(|parser| parser.parse())
        .unwrap_err();
    assert!(err.to_string().contains("redirect target"), "{err}");
}

#[test]
fn test_escape_round_trips_through_the_shell() {
    for value in ["plain", "two words", "it's", "$HOME", "a\"b", "*", "", "semi;colon"] {
        let script = format!("echo {}", escape(value));
        assert_eq!(run(script.as_str()).text(), format!("{value}\n"), "value {value:?}");
    }
}

#[test]
fn test_braces_helper() {
    assert_eq!(braces("{a,b}c{1,2}"), ["ac1", "ac2", "bc1", "bc2"]);
    assert_eq!(braces("x{1,{2,3}}"), ["x1", "x2", "x3"]);
    assert_eq!(braces("no-braces"), ["no-braces"]);
    assert_eq!(braces("{single}"), ["{single}"]);
}
