use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::cell::RefCell;
use std::fmt::Display;

/// Prints debuggee reports above the prompt without breaking the line being edited.
///
/// Integration builds write to stdout directly, rustyline's printer needs a terminal.
pub struct ExternalPrinter {
    printer: Option<RefCell<Box<dyn RLExternalPrinter>>>,
}

impl ExternalPrinter {
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        if cfg!(feature = "int_test") {
            return Ok(Self { printer: None });
        }
        let printer = editor.create_external_printer()?;
        Ok(Self {
            printer: Some(RefCell::new(Box::new(printer))),
        })
    }

    pub fn print(&self, msg: impl Display) {
        let Some(printer) = &self.printer else {
            println!("{msg}");
            return;
        };
        if let Err(e) = printer.borrow_mut().print(msg.to_string()) {
            log::warn!(target: "frame", "external printer error: {e}");
        }
    }
}

pub mod style {
    use crossterm::style::{Color, Stylize};
    use std::fmt::{Display, Formatter};

    /// Declare a wrapper that shows one kind of console text (paths, keywords, errors) in
    /// its own color. Integration builds print plain text.
    macro_rules! view_struct {
        ($name: ident, $color: expr) => {
            pub struct $name<T: Display>(T);

            impl<T: Display> From<T> for $name<T> {
                fn from(value: T) -> Self {
                    Self(value)
                }
            }

            impl<T: Display> Display for $name<T> {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    if cfg!(feature = "int_test") {
                        write!(f, "{}", self.0)
                    } else {
                        write!(f, "{}", self.0.to_string().with($color))
                    }
                }
            }
        };
    }

    view_struct!(FilePathView, Color::Green);
    view_struct!(FunctionNameView, Color::Yellow);
    view_struct!(KeywordView, Color::Magenta);
    view_struct!(TypeView, Color::DarkCyan);
    view_struct!(OutputView, Color::Grey);
    view_struct!(WarningView, Color::DarkYellow);
    view_struct!(ErrorView, Color::Red);

}
