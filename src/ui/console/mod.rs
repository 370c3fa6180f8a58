use crate::config;
use crate::frame::{FrameEvent, FrameSession};
use crate::protocol::StackFrameRef;
use crate::ui::command::r#break::ExecutionResult as BreakpointResult;
use crate::ui::command::source_code::DEFAULT_RANGE;
use crate::ui::command::watch::ExecutionResult as WatchResult;
use crate::ui::command;
use crate::ui::command::{
    backtrace, pause, r#break, r#continue, source_code, step_into, step_out, step_over, variables,
    watch, Command, CommandError,
};
use crate::ui::console::editor::{create_editor, CommandCompleter, LdbEditor};
use crate::ui::console::help::help_for_command;
use crate::ui::console::print::style::{ErrorView, FilePathView, KeywordView};
use crate::ui::console::print::ExternalPrinter;
use crate::weak_error;
use rustyline::error::ReadlineError;
use source_code::SourceFragment;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

mod editor;
mod help;
pub mod print;
pub mod view;

const WELCOME_TEXT: &str = r#"
ldb greets, type `help` for list of commands
"#;
const PROMT: &str = "(ldb) ";

/// How long the application loop waits for user input before looking at debuggee events.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct AppBuilder {
    save_history: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            save_history: config::current().save_history,
        }
    }

    pub fn save_history(self, save_history: bool) -> Self {
        Self { save_history }
    }

    pub fn build(self, session: FrameSession) -> anyhow::Result<TerminalApplication> {
        let (control_tx, control_rx) = mpsc::sync_channel::<Control>(0);
        let mut editor = create_editor(PROMT, self.save_history)?;

        if let Some(h) = editor.helper_mut() {
            if let Ok(mut completer) = h.completer.lock() {
                completer.replace_file_hints(session.sources().list().map(|s| s.title.clone()));
            }
        }

        Ok(TerminalApplication {
            session,
            editor,
            save_history: self.save_history,
            control_tx,
            control_rx,
        })
    }
}

enum Control {
    /// New command from user received
    Cmd(String),
    /// Ctrl+C pressed
    Interrupt,
    /// Terminate application
    Terminate,
}

pub struct TerminalApplication {
    session: FrameSession,
    editor: LdbEditor,
    save_history: bool,
    control_tx: SyncSender<Control>,
    control_rx: Receiver<Control>,
}

pub static HELLO_ONCE: Once = Once::new();

impl TerminalApplication {
    pub fn run(mut self) -> anyhow::Result<()> {
        let completer = self
            .editor
            .helper_mut()
            .map(|h| Arc::clone(&h.completer))
            .ok_or_else(|| anyhow::anyhow!("editor helper not installed"))?;

        let app_loop = AppLoop {
            session: self.session,
            control_rx: self.control_rx,
            completer,
            printer: ExternalPrinter::new(&mut self.editor)?,
        };

        let mut editor = self.editor;
        let save_history = self.save_history;
        let control_tx = self.control_tx;
        thread::spawn(move || {
            HELLO_ONCE.call_once(|| {
                println!("{WELCOME_TEXT}");
            });

            loop {
                let line = editor.readline(PROMT);
                match line {
                    Ok(input) => {
                        if input == "q" || input == "quit" {
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                        _ = editor.add_history_entry(&input);
                        if control_tx.send(Control::Cmd(input)).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) => {
                        if control_tx.send(Control::Interrupt).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Eof) => {
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                    Err(err) => {
                        println!("error: {:#}", err);
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                }
            }

            if save_history {
                if let Some(path) = config::Config::history_path() {
                    weak_error!(editor.save_history(&path), "save history:");
                }
            }
        });

        app_loop.run();

        Ok(())
    }
}

struct AppLoop {
    session: FrameSession,
    control_rx: Receiver<Control>,
    printer: ExternalPrinter,
    completer: Arc<Mutex<CommandCompleter>>,
}

impl AppLoop {
    fn update_completer_files(&self) {
        let titles = self
            .session
            .sources()
            .list()
            .map(|s| s.title.clone())
            .collect::<Vec<_>>();
        if let Ok(mut completer) = self.completer.lock() {
            completer.replace_file_hints(titles);
        }
    }

    fn update_completer_variables(&self) -> anyhow::Result<()> {
        let vars = self.session.locals(StackFrameRef::TOP)?;
        if let Ok(mut completer) = self.completer.lock() {
            completer.replace_var_hints(vars.into_iter().map(|v| v.name));
        }
        Ok(())
    }

    fn print_fragment(&self, fragment: &SourceFragment) {
        self.printer
            .print(view::render_source(fragment, self.session.breakpoints()));
    }

    fn print_watches(&mut self) {
        if self.session.watches().is_empty() {
            return;
        }
        match self.session.refresh_watches() {
            Ok(watches) => {
                for line in view::render_watches(watches) {
                    self.printer.print(line);
                }
            }
            Err(e) => self
                .printer
                .print(ErrorView::from(format!("watch error: {e:#}"))),
        }
    }

    fn on_stop(&mut self, key: &str, line: u32, is_refresh_only: bool) {
        let title = self
            .session
            .sources()
            .get(key)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| key.to_string());
        self.printer.print(format!(
            "Stopped at {}",
            FilePathView::from(format!("{title}:{}", line + 1))
        ));

        match source_code::Handler::new(&self.session).range(DEFAULT_RANGE) {
            Ok(fragment) => self.print_fragment(&fragment),
            Err(e) => self.printer.print(ErrorView::from(e)),
        }

        if !is_refresh_only {
            self.print_watches();
        }
        weak_error!(self.update_completer_variables(), "update completer:");
    }

    /// Print pending debuggee events, return `false` once the debuggee is gone.
    fn process_events(&mut self) -> bool {
        for event in self.session.pump() {
            match event {
                FrameEvent::StateChanged { is_break: false } => {
                    self.printer.print(KeywordView::from("running"));
                }
                FrameEvent::StateChanged { is_break: true } => {}
                FrameEvent::Stopped {
                    key,
                    line,
                    is_refresh_only,
                } => self.on_stop(&key, line, is_refresh_only),
                FrameEvent::SourceAdded { key, title } => {
                    log::debug!(target: "frame", "new source {title} ({key})");
                    self.update_completer_files();
                }
                FrameEvent::BreakpointsChanged => {}
                FrameEvent::Log {
                    log_type,
                    message,
                    key,
                    line,
                } => {
                    let place = line.map(|line| {
                        let title = self
                            .session
                            .sources()
                            .get(&key)
                            .map(|s| s.title.as_str())
                            .unwrap_or(key.as_str());
                        format!("{title}:{}", line + 1)
                    });
                    let message = message.trim_end_matches('\n');
                    self.printer
                        .print(view::render_log(log_type, message, place));
                }
                FrameEvent::Disconnected => {
                    self.printer.print(ErrorView::from("debuggee disconnected"));
                    return false;
                }
            }
        }
        true
    }

    fn handle_command(&mut self, cmd: &str) -> Result<(), CommandError> {
        match Command::parse(cmd)? {
            Command::PrintVariables(var_command) => variables::Handler::new(&self.session)
                .handle(var_command)?
                .iter()
                .for_each(|var| self.printer.print(view::render_var(var))),
            Command::Print(expr) => {
                let result = command::print::Handler::new(&self.session).handle(&expr)?;
                for (var, fields) in result.values {
                    self.printer
                        .print(view::render_var_with_fields(&var, &fields));
                }
            }
            Command::PrintBacktrace => backtrace::Handler::new(&self.session)
                .handle()?
                .iter()
                .for_each(|frame| self.printer.print(view::render_frame(frame))),
            Command::Continue => r#continue::Handler::new(&mut self.session).handle()?,
            Command::Pause => pause::Handler::new(&mut self.session).handle()?,
            Command::StepInto => step_into::Handler::new(&mut self.session).handle()?,
            Command::StepOut => step_out::Handler::new(&mut self.session).handle()?,
            Command::StepOver => step_over::Handler::new(&mut self.session).handle()?,
            Command::Breakpoint(bp_command) => {
                match r#break::Handler::new(&mut self.session).handle(&bp_command)? {
                    BreakpointResult::Requested(bp) => {
                        let title = self
                            .session
                            .sources()
                            .get(&bp.key)
                            .map(|s| s.title.clone())
                            .unwrap_or(bp.key);
                        self.printer.print(format!(
                            "Breakpoint change requested at {}",
                            FilePathView::from(format!("{title}:{}", bp.line + 1))
                        ));
                    }
                    BreakpointResult::Dump(breakpoints) => {
                        if breakpoints.is_empty() {
                            self.printer.print("No breakpoints");
                        }
                        for (num, bp) in breakpoints.iter().enumerate() {
                            let title = self
                                .session
                                .sources()
                                .get(&bp.key)
                                .map(|s| s.title.as_str())
                                .unwrap_or(bp.key.as_str());
                            self.printer.print(format!(
                                "- Breakpoint {num} at {}",
                                FilePathView::from(format!("{title}:{}", bp.line + 1))
                            ));
                        }
                    }
                }
            }
            Command::Watch(watch_command) => {
                match watch::Handler::new(&mut self.session).handle(watch_command)? {
                    WatchResult::New(expr) => {
                        self.printer
                            .print(format!("Watching {}", KeywordView::from(expr)));
                        if self.session.is_broken() {
                            self.print_watches();
                        }
                    }
                    WatchResult::Removed(Some(expr)) => {
                        self.printer
                            .print(format!("Removed watch {}", KeywordView::from(expr)));
                    }
                    WatchResult::Removed(None) => {
                        self.printer.print(ErrorView::from("no such watch"));
                    }
                    WatchResult::Dump(entries) => {
                        if entries.is_empty() {
                            self.printer.print("No watched expressions");
                        }
                        for (num, (expr, value)) in entries.iter().enumerate() {
                            let value = value
                                .as_ref()
                                .map(view::render_var)
                                .unwrap_or_else(|| format!("{expr} = <not evaluated>"));
                            self.printer.print(format!("{num}: {value}"));
                        }
                    }
                }
            }
            Command::SourceCode(source_command) => {
                let handler = source_code::Handler::new(&self.session);
                match source_command {
                    source_code::Command::Range(bounds) => {
                        let fragment = handler.range(bounds)?;
                        self.print_fragment(&fragment);
                    }
                    source_code::Command::List => {
                        for source in handler.list() {
                            self.printer.print(format!(
                                "{} ({} lines)",
                                FilePathView::from(&source.title),
                                source.lines.len()
                            ));
                        }
                    }
                }
            }
            Command::SkipInput => {}
            Command::Help { command, reason } => {
                if let Some(reason) = reason {
                    self.printer.print(ErrorView::from(reason));
                }
                self.printer.print(help_for_command(command.as_deref()));
            }
        }

        Ok(())
    }

    fn quit(&mut self) {
        if self.session.is_connected() {
            weak_error!(self.session.quit(), "quit:");
        }
        self.session.engine().shutdown();
    }

    fn run(mut self) {
        loop {
            match self.control_rx.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(Control::Cmd(command)) => {
                    if let Err(e) = self.handle_command(&command) {
                        match e {
                            CommandError::Parsing(_) => {
                                self.printer.print(ErrorView::from(e));
                            }
                            CommandError::Handle(ref err) if err.is_fatal() => {
                                self.printer.print(ErrorView::from("shutdown debugger"));
                                self.printer
                                    .print(ErrorView::from(format!("fatal error: {e:#}")));
                                self.quit();
                                return;
                            }
                            CommandError::Handle(_) => {
                                self.printer.print(ErrorView::from(format!("error: {e:#}")));
                            }
                        }
                    }
                }
                Ok(Control::Interrupt) => {
                    if !self.session.is_broken() {
                        weak_error!(self.session.pause(), "pause:");
                    }
                }
                Ok(Control::Terminate) | Err(RecvTimeoutError::Disconnected) => {
                    self.quit();
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if !self.process_events() {
                self.session.engine().shutdown();
                return;
            }
        }
    }
}
