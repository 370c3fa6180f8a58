use crate::ui::command;
use command::parser;

pub const HELP: &str = r#"
Available debugger commands:

var locals|globals|registry|stack           -- show variables of the current stack frame
p, print <expression>                       -- evaluate a lua expression in the current stack frame
bt, backtrace                               -- print backtrace of the stopped script
c, continue                                 -- continue script being debugged, after pause or breakpoint
pause                                       -- stop the script at the next executed line
step, stepinto                              -- step script until it reaches a different source line
finish, stepout                             -- execute script until current function returns
next, stepover                              -- step script, stepping over function calls
b, break <file:line>|remove|info            -- manage breakpoints
w, watch <expression>|remove|info           -- manage watched expressions
source <>|<number>                          -- show source code around the current line
sources                                     -- show every source loaded by the script
h, help <>|<command>                        -- show help
q, quit                                     -- exit the debugger
"#;

pub const HELP_VAR: &str = "\
\x1b[32;1mvar\x1b[0m
Show variables of the current stack frame.

Available subcomands:
var locals - print local variables and upvalues of the current function
var globals - print global environment visible from the current function
var registry - print the lua registry table
var stack - print every stack slot of the current function, temporaries and varargs included
";

pub const HELP_PRINT: &str = "\
\x1b[32;1mp, print\x1b[0m
Evaluate a lua expression in the scope of the current stack frame. Locals hide upvalues,
upvalues hide globals. Every value the expression returns is printed, tables with their fields.

Examples of usage:
print player.hp - print field `hp` of local or global `player`
print #queue - print length of `queue`
print string.format('%d', n) - call a function, the call may have side effects
";

pub const HELP_BACKTRACE: &str = "\
\x1b[32;1mbt, backtrace\x1b[0m
Show backtrace of the stopped script.

Output format:
#{level} {function name} at {source}:{line}
";

pub const HELP_CONTINUE: &str = "\
\x1b[32;1mc, continue\x1b[0m
Continue script being debugged, after pause or breakpoint.
";

pub const HELP_PAUSE: &str = "\
\x1b[32;1mpause\x1b[0m
Stop a running script at the next executed line.
";

pub const HELP_STEPINTO: &str = "\
\x1b[32;1mstep, stepinto\x1b[0m
Step script until it reaches a different source line, entering called functions.
";

pub const HELP_STEPOUT: &str = "\
\x1b[32;1mfinish, stepout\x1b[0m
Execute script until current function returns.
";

pub const HELP_STEPOVER: &str = "\
\x1b[32;1mnext, stepover\x1b[0m
Step script, stepping over function calls.
";

pub const HELP_BREAK: &str = "\
\x1b[32;1mb, break\x1b[0m
Manage breakpoints.

Available subcomands:
break <file:line> - set breakpoint at a line of a loaded source
break remove|r <file:line> - delete breakpoint
break info - print list of breakpoints

<file> is the source path, its file name or the title shown by `sources`.
The breakpoint list is updated once the script confirms the change.

Examples of usage:
break main.lua:12 - stop the script before executing line 12 of main.lua
break r main.lua:12 - remove breakpoint at line 12 of main.lua
";

pub const HELP_WATCH: &str = "\
\x1b[32;1mw, watch\x1b[0m
Manage watched expressions. Watched expressions are evaluated again every time the script stops.

Available subcomands:
watch <expression> - add an expression to the list
watch remove|r <expression> - delete an expression from the list
watch info - print watched expressions and their values
";

pub const HELP_SOURCE: &str = "\
\x1b[32;1msource\x1b[0m
Show source code around the current line.

Available subcomands:
source - show 5 lines above and below the current line
source <number> - show <number> lines above and below the current line
";

pub const HELP_SOURCES: &str = "\
\x1b[32;1msources\x1b[0m
Show every source loaded by the script, files and string chunks.
";

pub const HELP_QUIT: &str = "\
\x1b[32;1mq, quit\x1b[0m
Exit the debugger, the script is stopped too.
";

pub fn help_for_command(command: Option<&str>) -> &str {
    match command {
        None => HELP,
        Some(parser::VAR_COMMAND) => HELP_VAR,
        Some(parser::PRINT_COMMAND) | Some(parser::PRINT_COMMAND_SHORT) => HELP_PRINT,
        Some(parser::BACKTRACE_COMMAND) | Some(parser::BACKTRACE_COMMAND_SHORT) => HELP_BACKTRACE,
        Some(parser::CONTINUE_COMMAND) | Some(parser::CONTINUE_COMMAND_SHORT) => HELP_CONTINUE,
        Some(parser::PAUSE_COMMAND) => HELP_PAUSE,
        Some(parser::STEP_INTO_COMMAND) | Some(parser::STEP_INTO_COMMAND_SHORT) => HELP_STEPINTO,
        Some(parser::STEP_OUT_COMMAND) | Some(parser::STEP_OUT_COMMAND_SHORT) => HELP_STEPOUT,
        Some(parser::STEP_OVER_COMMAND) | Some(parser::STEP_OVER_COMMAND_SHORT) => HELP_STEPOVER,
        Some(parser::BREAK_COMMAND) | Some(parser::BREAK_COMMAND_SHORT) => HELP_BREAK,
        Some(parser::WATCH_COMMAND) | Some(parser::WATCH_COMMAND_SHORT) => HELP_WATCH,
        Some(parser::SOURCE_COMMAND) => HELP_SOURCE,
        Some(parser::SOURCES_COMMAND) => HELP_SOURCES,
        Some("q") | Some("quit") => HELP_QUIT,
        _ => "unknown command",
    }
}
