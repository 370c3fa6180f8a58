use super::r#break::BreakpointIdentity;
use super::{r#break, source_code, variables, watch, Command, CommandError, CommandResult};

pub const VAR_COMMAND: &str = "var";
pub const VAR_LOCAL_KEY: &str = "locals";
pub const VAR_GLOBAL_KEY: &str = "globals";
pub const VAR_REGISTRY_KEY: &str = "registry";
pub const VAR_STACK_KEY: &str = "stack";
pub const PRINT_COMMAND: &str = "print";
pub const PRINT_COMMAND_SHORT: &str = "p";
pub const BACKTRACE_COMMAND: &str = "backtrace";
pub const BACKTRACE_COMMAND_SHORT: &str = "bt";
pub const CONTINUE_COMMAND: &str = "continue";
pub const CONTINUE_COMMAND_SHORT: &str = "c";
pub const PAUSE_COMMAND: &str = "pause";
pub const STEP_INTO_COMMAND: &str = "stepinto";
pub const STEP_INTO_COMMAND_SHORT: &str = "step";
pub const STEP_OUT_COMMAND: &str = "stepout";
pub const STEP_OUT_COMMAND_SHORT: &str = "finish";
pub const STEP_OVER_COMMAND: &str = "stepover";
pub const STEP_OVER_COMMAND_SHORT: &str = "next";
pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const BREAK_REMOVE_SUBCOMMAND: &str = "remove";
pub const BREAK_REMOVE_SUBCOMMAND_SHORT: &str = "r";
pub const BREAK_INFO_SUBCOMMAND: &str = "info";
pub const WATCH_COMMAND: &str = "watch";
pub const WATCH_COMMAND_SHORT: &str = "w";
pub const WATCH_REMOVE_SUBCOMMAND: &str = "remove";
pub const WATCH_REMOVE_SUBCOMMAND_SHORT: &str = "r";
pub const WATCH_INFO_SUBCOMMAND: &str = "info";
pub const SOURCE_COMMAND: &str = "source";
pub const SOURCES_COMMAND: &str = "sources";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";

use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just};
use chumsky::text::Char;
use chumsky::{extra, text, Boxed, Parser};

type Err<'a> = extra::Err<Rich<'a, char>>;

/// Decimal `u32`, an overflow is a parse error.
pub fn number<'a>() -> impl chumsky::Parser<'a, &'a str, u32, Err<'a>> + Clone {
    text::int(10)
        .from_str::<u32>()
        .try_map(|n, span| n.map_err(|e| Rich::custom(span, e)))
        .labelled("number")
}

/// `<file>:<line>`, the file part may contain anything but a colon.
pub fn brkpt_at_line_parser<'a>() -> impl chumsky::Parser<'a, &'a str, BreakpointIdentity, Err<'a>>
{
    any()
        .filter(|c: &char| c.to_char() != ':')
        .repeated()
        .at_least(1)
        .to_slice()
        .then_ignore(just(':'))
        .then(number())
        .map(|(file, line): (&str, u32)| BreakpointIdentity {
            file: file.trim().to_string(),
            line,
        })
        .padded()
        .labelled("file:line")
}

/// Rest of the line as a Lua expression.
pub fn lua_expression<'a>() -> impl chumsky::Parser<'a, &'a str, String, Err<'a>> + Clone {
    any()
        .repeated()
        .at_least(1)
        .to_slice()
        .try_map(|s: &str, span| {
            let expr = s.trim();
            if expr.is_empty() {
                Err(Rich::custom(span, "expression expected"))
            } else {
                Ok(expr.to_string())
            }
        })
        .labelled("lua expression")
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, Command, Err<'a>>
where
    I: chumsky::Parser<'a, &'a str, Command, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl Command {
    /// Parse input string into command.
    pub fn parse(input: &str) -> CommandResult<Command> {
        if input.trim().is_empty() {
            return Ok(Command::SkipInput);
        }

        Self::parser()
            .parse(input)
            .into_result()
            .map_err(|e| {
                let reason = e
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown command".to_string());
                CommandError::Parsing(reason)
            })
    }

    fn parser<'a>() -> impl chumsky::Parser<'a, &'a str, Command, Err<'a>> {
        let op = |sym| just(sym).padded();
        let op2 = |full, short| op(full).or(op(short));
        // a subcommand is a whole word, `b rules.lua:1` is not a removal
        let sub = |sym| text::ascii::keyword(sym).padded();
        let sub2 = |full, short| sub(full).or(sub(short));

        let print_variables = op(VAR_COMMAND)
            .ignore_then(choice((
                op(VAR_LOCAL_KEY).to(variables::Command::Locals),
                op(VAR_GLOBAL_KEY).to(variables::Command::Globals),
                op(VAR_REGISTRY_KEY).to(variables::Command::Registry),
                op(VAR_STACK_KEY).to(variables::Command::Stack),
            )))
            .map(Command::PrintVariables)
            .boxed();

        let print = op2(PRINT_COMMAND, PRINT_COMMAND_SHORT)
            .ignore_then(lua_expression())
            .map(Command::Print)
            .boxed();

        let r#continue = op2(CONTINUE_COMMAND, CONTINUE_COMMAND_SHORT).to(Command::Continue);
        let pause = op(PAUSE_COMMAND).to(Command::Pause);
        let step_into = op2(STEP_INTO_COMMAND, STEP_INTO_COMMAND_SHORT).to(Command::StepInto);
        let step_out = op2(STEP_OUT_COMMAND, STEP_OUT_COMMAND_SHORT).to(Command::StepOut);
        let step_over = op2(STEP_OVER_COMMAND, STEP_OVER_COMMAND_SHORT).to(Command::StepOver);
        let backtrace = op2(BACKTRACE_COMMAND, BACKTRACE_COMMAND_SHORT).to(Command::PrintBacktrace);

        let source_code = op(SOURCE_COMMAND)
            .ignore_then(number().padded().or_not())
            .map(|num: Option<u32>| {
                Command::SourceCode(source_code::Command::Range(
                    num.unwrap_or(source_code::DEFAULT_RANGE),
                ))
            })
            .boxed();
        let sources = op(SOURCES_COMMAND).to(Command::SourceCode(source_code::Command::List));

        let help = op2(HELP_COMMAND, HELP_COMMAND_SHORT)
            .ignore_then(text::ident().or_not())
            .map(|s| Command::Help {
                command: s.map(ToOwned::to_owned),
                reason: None,
            })
            .padded()
            .boxed();

        let r#break = op2(BREAK_COMMAND, BREAK_COMMAND_SHORT)
            .ignore_then(choice((
                sub2(BREAK_REMOVE_SUBCOMMAND, BREAK_REMOVE_SUBCOMMAND_SHORT)
                    .ignore_then(brkpt_at_line_parser())
                    .map(|brkpt| Command::Breakpoint(r#break::Command::Remove(brkpt))),
                sub(BREAK_INFO_SUBCOMMAND).to(Command::Breakpoint(r#break::Command::Info)),
                brkpt_at_line_parser()
                    .map(|brkpt| Command::Breakpoint(r#break::Command::Add(brkpt))),
            )))
            .boxed();

        let watch = op2(WATCH_COMMAND, WATCH_COMMAND_SHORT)
            .ignore_then(choice((
                sub2(WATCH_REMOVE_SUBCOMMAND, WATCH_REMOVE_SUBCOMMAND_SHORT)
                    .ignore_then(lua_expression())
                    .map(|expr| Command::Watch(watch::Command::Remove(expr))),
                sub(WATCH_INFO_SUBCOMMAND)
                    .then(end())
                    .to(Command::Watch(watch::Command::Info)),
                lua_expression().map(|expr| Command::Watch(watch::Command::Add(expr))),
            )))
            .boxed();

        // `pause` before `print`, its short form would take `pause` as an expression
        choice((
            command(VAR_COMMAND, print_variables),
            command(PAUSE_COMMAND, pause),
            command(PRINT_COMMAND, print),
            command(CONTINUE_COMMAND, r#continue),
            command(STEP_INTO_COMMAND, step_into),
            command(STEP_OUT_COMMAND, step_out),
            command(STEP_OVER_COMMAND, step_over),
            command(SOURCES_COMMAND, sources),
            command(SOURCE_COMMAND, source_code),
            command(HELP_COMMAND, help),
            command(BACKTRACE_COMMAND, backtrace),
            command(BREAK_COMMAND, r#break),
            command(WATCH_COMMAND, watch),
        ))
        .map_err(|e| {
            let span = e.span();
            if span.start == 0 && span.end == 0 {
                Rich::custom(*e.span(), "type help for list of commands")
            } else {
                e
            }
        })
    }
}

#[test]
fn test_brkpt_at_line_parser() {
    struct TestCase {
        string: &'static str,
        result: Result<(&'static str, u32), ()>,
    }
    let cases = vec![
        TestCase {
            string: "main.lua:12",
            result: Ok(("main.lua", 12)),
        },
        TestCase {
            string: "  scripts/game loop.lua:3 ",
            result: Ok(("scripts/game loop.lua", 3)),
        },
        TestCase {
            string: ":3",
            result: Err(()),
        },
        TestCase {
            string: "main.lua",
            result: Err(()),
        },
        TestCase {
            string: "main.lua:x",
            result: Err(()),
        },
    ];

    for tc in cases {
        let expr = brkpt_at_line_parser().parse(tc.string).into_result();
        assert_eq!(
            expr.map(|id| (id.file, id.line)).map_err(|_| ()),
            tc.result.map(|(f, l)| (f.to_string(), l)),
            "{}",
            tc.string
        );
    }
}

#[test]
fn test_parser() {
    struct TestCase {
        inputs: Vec<&'static str>,
        command_matcher: fn(result: Result<Command, CommandError>),
    }
    let cases = vec![
        TestCase {
            inputs: vec!["var locals", "  var   locals "],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::PrintVariables(variables::Command::Locals)
                );
            },
        },
        TestCase {
            inputs: vec!["var globals"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::PrintVariables(variables::Command::Globals)
                );
            },
        },
        TestCase {
            inputs: vec!["var registry"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::PrintVariables(variables::Command::Registry)
                );
            },
        },
        TestCase {
            inputs: vec!["var stack"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::PrintVariables(variables::Command::Stack)
                );
            },
        },
        TestCase {
            inputs: vec!["var x"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["print t.x + 1", "p   t.x + 1  "],
            command_matcher: |result| {
                assert_eq!(result.unwrap(), Command::Print("t.x + 1".to_string()));
            },
        },
        TestCase {
            inputs: vec!["print", "print   "],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["das", "voo"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["", "   "],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::SkipInput),
        },
        TestCase {
            inputs: vec!["bt", "backtrace"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::PrintBacktrace),
        },
        TestCase {
            inputs: vec!["c", "continue"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Continue),
        },
        TestCase {
            inputs: vec!["pause"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Pause),
        },
        TestCase {
            inputs: vec!["step", "stepinto"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::StepInto),
        },
        TestCase {
            inputs: vec!["finish", "stepout"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::StepOut),
        },
        TestCase {
            inputs: vec!["next", "stepover"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::StepOver),
        },
        TestCase {
            inputs: vec!["b main.lua:5", "break  main.lua:5 "],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Add(BreakpointIdentity {
                        file: "main.lua".to_string(),
                        line: 5
                    }))
                );
            },
        },
        TestCase {
            inputs: vec!["b remove main.lua:5", "break r main.lua:5"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Remove(BreakpointIdentity {
                        file: "main.lua".to_string(),
                        line: 5
                    }))
                );
            },
        },
        TestCase {
            inputs: vec!["b rules.lua:1"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Add(BreakpointIdentity {
                        file: "rules.lua".to_string(),
                        line: 1
                    }))
                );
            },
        },
        TestCase {
            inputs: vec!["b main.lua:99999999999"],
            command_matcher: |result| assert!(result.is_err()),
        },
        TestCase {
            inputs: vec!["b info", "break info "],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Breakpoint(r#break::Command::Info)
                );
            },
        },
        TestCase {
            inputs: vec!["watch player.hp", "w  player.hp"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Watch(watch::Command::Add("player.hp".to_string()))
                );
            },
        },
        TestCase {
            inputs: vec!["watch remove player.hp", "w r player.hp"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Watch(watch::Command::Remove("player.hp".to_string()))
                );
            },
        },
        TestCase {
            inputs: vec!["watch info", "w info "],
            command_matcher: |result| {
                assert_eq!(result.unwrap(), Command::Watch(watch::Command::Info));
            },
        },
        TestCase {
            inputs: vec!["source", "source 5"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::SourceCode(source_code::Command::Range(5))
                );
            },
        },
        TestCase {
            inputs: vec!["source 12 "],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::SourceCode(source_code::Command::Range(12))
                );
            },
        },
        TestCase {
            inputs: vec!["sources"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::SourceCode(source_code::Command::List)
                );
            },
        },
        TestCase {
            inputs: vec!["h", "help"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Help {
                        command: None,
                        reason: None
                    }
                );
            },
        },
        TestCase {
            inputs: vec!["help break", "h  break"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Help {
                        command: Some("break".to_string()),
                        reason: None
                    }
                );
            },
        },
    ];

    for case in cases {
        for input in case.inputs {
            (case.command_matcher)(Command::parse(input));
        }
    }
}
