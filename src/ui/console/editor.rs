use crate::ui::command::parser::{
    BACKTRACE_COMMAND, BACKTRACE_COMMAND_SHORT, BREAK_COMMAND, BREAK_COMMAND_SHORT,
    BREAK_INFO_SUBCOMMAND, BREAK_REMOVE_SUBCOMMAND, CONTINUE_COMMAND, CONTINUE_COMMAND_SHORT,
    HELP_COMMAND, HELP_COMMAND_SHORT, PAUSE_COMMAND, PRINT_COMMAND, PRINT_COMMAND_SHORT,
    SOURCES_COMMAND, SOURCE_COMMAND, STEP_INTO_COMMAND, STEP_INTO_COMMAND_SHORT,
    STEP_OUT_COMMAND, STEP_OUT_COMMAND_SHORT, STEP_OVER_COMMAND, STEP_OVER_COMMAND_SHORT,
    VAR_COMMAND, VAR_GLOBAL_KEY, VAR_LOCAL_KEY, VAR_REGISTRY_KEY, VAR_STACK_KEY, WATCH_COMMAND,
    WATCH_COMMAND_SHORT, WATCH_INFO_SUBCOMMAND, WATCH_REMOVE_SUBCOMMAND,
};
use chumsky::prelude::{any, choice, just};
use chumsky::text::whitespace;
use chumsky::{extra, text, Parser};
use crossterm::style::{Color, Stylize};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::history::FileHistory;
use rustyline::line_buffer::LineBuffer;
use rustyline::{Changeset, CompletionType, Config, Context, Editor};
use rustyline_derive::{Helper, Hinter, Validator};
use std::borrow::Cow;
use std::borrow::Cow::{Borrowed, Owned};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trie_rs::{Trie, TrieBuilder};

struct CommandHint {
    short: Option<String>,
    long: String,
    subcommands: Vec<String>,
}

impl CommandHint {
    fn long(&self) -> String {
        self.long.clone()
    }

    fn display_with_short(&self) -> String {
        if let Some(ref short) = self.short {
            if self.long.starts_with(short) {
                format!(
                    "{}{}",
                    short.clone().bold().underlined(),
                    &self.long[short.len()..]
                )
            } else {
                format!("{}|{}", &self.long, short.clone().bold().underlined())
            }
        } else {
            self.long()
        }
    }
}

impl From<&str> for CommandHint {
    fn from(value: &str) -> Self {
        CommandHint {
            short: None,
            long: value.to_string(),
            subcommands: vec![],
        }
    }
}

impl From<(&str, &str)> for CommandHint {
    fn from((short, long): (&str, &str)) -> Self {
        CommandHint {
            short: Some(short.to_string()),
            long: long.to_string(),
            subcommands: vec![],
        }
    }
}

pub struct CommandCompleter {
    commands: Vec<CommandHint>,
    subcommand_hints: HashMap<String, Vec<String>>,
    file_hints: Trie<u8>,
    var_hints: Trie<u8>,
    vars: Vec<String>,
}

impl CommandCompleter {
    fn new(commands: impl IntoIterator<Item = CommandHint>) -> Self {
        let commands: Vec<CommandHint> = commands.into_iter().collect();
        let subcommand_hints = commands
            .iter()
            .flat_map(|cmd| {
                let mut hints = vec![(cmd.long.clone(), cmd.subcommands.clone())];
                if let Some(ref short) = cmd.short {
                    hints.push((short.clone(), cmd.subcommands.clone()));
                }
                hints
            })
            .collect::<HashMap<String, Vec<String>>>();

        Self {
            commands,
            subcommand_hints,
            file_hints: TrieBuilder::new().build(),
            var_hints: TrieBuilder::new().build(),
            vars: vec![],
        }
    }

    /// Source names a breakpoint may be set in.
    pub fn replace_file_hints(&mut self, files: impl IntoIterator<Item = String>) {
        let mut builder = TrieBuilder::new();
        files.into_iter().for_each(|file| {
            builder.push(file);
        });
        self.file_hints = builder.build();
    }

    /// Variable names of the current stop, completed after `print` and `watch`.
    pub fn replace_var_hints(&mut self, variables: impl IntoIterator<Item = String>) {
        let mut builder = TrieBuilder::new();
        self.vars = variables.into_iter().collect();
        self.vars.iter().for_each(|var| {
            builder.push(var);
        });
        self.var_hints = builder.build();
    }
}

#[derive(Debug, PartialEq)]
enum CompletableCommand<'a> {
    Breakpoint(&'a str),
    Expression(&'a str),
    Unrecognized(&'a str, Option<&'a str>),
}

impl<'a> CompletableCommand<'a> {
    fn recognize(line: &'a str) -> Option<CompletableCommand<'a>> {
        let op = just::<_, _, extra::Default>;

        let bp = op(BREAK_COMMAND)
            .or(op(BREAK_COMMAND_SHORT))
            .then(whitespace().at_least(1))
            .ignore_then(any().repeated().to_slice())
            .map(CompletableCommand::Breakpoint);

        let expr = choice((
            op(PRINT_COMMAND),
            op(PRINT_COMMAND_SHORT),
            op(WATCH_COMMAND),
            op(WATCH_COMMAND_SHORT),
        ))
        .then(whitespace().at_least(1))
        .ignore_then(any().repeated().to_slice())
        .map(CompletableCommand::Expression);

        let other = text::ident()
            .then_ignore(whitespace().at_least(1))
            .then(text::ident().or_not())
            .map(|(s1, s2): (&str, Option<&str>)| CompletableCommand::Unrecognized(s1.trim(), s2))
            .padded();

        let r = choice((bp, expr, other)).parse(line);
        r.into_result().ok()
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        fn pairs_from_variants(
            variants: impl Iterator<Item = impl ToString>,
            line: &str,
            tpl: &str,
            replacement_suffix: &str,
        ) -> (usize, Vec<Pair>) {
            let pos = line.len() - tpl.len();
            let pairs = variants.map(|v| Pair {
                display: v.to_string(),
                replacement: v.to_string() + replacement_suffix,
            });
            (pos, pairs.collect())
        }

        fn trie_variants(trie: &Trie<u8>, prefix: &str) -> Vec<String> {
            trie.predictive_search(prefix)
                .iter()
                .filter_map(|var| String::from_utf8(var.clone()).ok())
                .collect()
        }

        match CompletableCommand::recognize(line) {
            Some(CompletableCommand::Breakpoint(maybe_file)) => {
                if maybe_file.trim().is_empty() {
                    return Ok((0, vec![]));
                }

                let variants = trie_variants(&self.file_hints, maybe_file);
                if !variants.is_empty() {
                    return Ok(pairs_from_variants(variants.iter(), line, maybe_file, ":"));
                }
            }
            Some(CompletableCommand::Expression(maybe_var)) => {
                if maybe_var.trim().is_empty() {
                    return Ok(pairs_from_variants(self.vars.iter(), line, maybe_var, ""));
                }

                let variants = trie_variants(&self.var_hints, maybe_var);
                if !variants.is_empty() {
                    return Ok(pairs_from_variants(variants.iter(), line, maybe_var, ""));
                }
            }
            Some(CompletableCommand::Unrecognized(cmd, mb_subcmd_part)) => {
                if let Some(subcommands) = self.subcommand_hints.get(cmd) {
                    let pos = cmd.len() + 1;
                    let subcmd_part = mb_subcmd_part.unwrap_or_default();
                    let subcommands = subcommands
                        .iter()
                        .filter(|&subcmd| subcmd.starts_with(subcmd_part))
                        .map(|subcmd| Pair {
                            display: subcmd.to_string(),
                            replacement: subcmd.to_string(),
                        })
                        .collect();

                    return Ok((pos, subcommands));
                }
            }
            _ => {}
        }

        let pairs = self
            .commands
            .iter()
            .filter(|&cmd| cmd.long.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.display_with_short(),
                replacement: cmd.long(),
            })
            .collect();
        Ok((0, pairs))
    }
}

#[derive(Helper, Hinter, Validator)]
pub struct RLHelper {
    pub completer: Arc<Mutex<CommandCompleter>>,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    pub colored_prompt: String,
}

impl Completer for RLHelper {
    type Candidate = <CommandCompleter as Completer>::Candidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        self.completer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .complete(line, pos, ctx)
    }

    fn update(&self, line: &mut LineBuffer, start: usize, elected: &str, cl: &mut Changeset) {
        self.completer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .update(line, start, elected, cl)
    }
}

impl Highlighter for RLHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(format!("{}", hint.with(Color::Grey)))
    }
}

pub type LdbEditor = Editor<RLHelper, FileHistory>;

pub fn create_editor(promt: &str, save_history: bool) -> anyhow::Result<LdbEditor> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .completion_type(CompletionType::List)
        .build();

    let commands = [
        CommandHint {
            short: None,
            long: VAR_COMMAND.to_string(),
            subcommands: vec![
                VAR_LOCAL_KEY.to_string(),
                VAR_GLOBAL_KEY.to_string(),
                VAR_REGISTRY_KEY.to_string(),
                VAR_STACK_KEY.to_string(),
            ],
        },
        (PRINT_COMMAND_SHORT, PRINT_COMMAND).into(),
        (CONTINUE_COMMAND_SHORT, CONTINUE_COMMAND).into(),
        PAUSE_COMMAND.into(),
        (STEP_INTO_COMMAND_SHORT, STEP_INTO_COMMAND).into(),
        (STEP_OUT_COMMAND_SHORT, STEP_OUT_COMMAND).into(),
        (STEP_OVER_COMMAND_SHORT, STEP_OVER_COMMAND).into(),
        CommandHint {
            short: Some(BREAK_COMMAND_SHORT.to_string()),
            long: BREAK_COMMAND.to_string(),
            subcommands: vec![
                BREAK_REMOVE_SUBCOMMAND.to_string(),
                BREAK_INFO_SUBCOMMAND.to_string(),
            ],
        },
        CommandHint {
            short: Some(WATCH_COMMAND_SHORT.to_string()),
            long: WATCH_COMMAND.to_string(),
            subcommands: vec![
                WATCH_REMOVE_SUBCOMMAND.to_string(),
                WATCH_INFO_SUBCOMMAND.to_string(),
            ],
        },
        (BACKTRACE_COMMAND_SHORT, BACKTRACE_COMMAND).into(),
        SOURCE_COMMAND.into(),
        SOURCES_COMMAND.into(),
        (HELP_COMMAND_SHORT, HELP_COMMAND).into(),
        ("q", "quit").into(),
    ];

    let h = RLHelper {
        completer: Arc::new(Mutex::new(CommandCompleter::new(commands))),
        hinter: HistoryHinter {},
        colored_prompt: format!("{}", promt.with(Color::DarkGreen)),
    };

    let mut editor = Editor::with_history(config, FileHistory::new())?;
    editor.set_helper(Some(h));
    if save_history {
        if let Some(path) = crate::config::Config::history_path() {
            // no history yet on the first run
            _ = editor.load_history(&path);
        }
    }
    Ok(editor)
}
