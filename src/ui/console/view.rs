//! Text rendering of debuggee data.

use crate::frame::watch::WatchList;
use crate::protocol::{LogType, LuaBacktrace, LuaVar};
use crate::registry::BreakpointList;
use crate::ui::command::source_code::SourceFragment;
use crate::ui::console::print::style::{
    ErrorView, FilePathView, FunctionNameView, KeywordView, OutputView, TypeView, WarningView,
};
use std::fmt::Write;

const INDENT: usize = 4;

pub fn render_var(var: &LuaVar) -> String {
    if var.is_error() {
        return format!("{} = {}", KeywordView::from(&var.name), ErrorView::from(&var.value));
    }
    format!(
        "{} = {} {}",
        KeywordView::from(&var.name),
        TypeView::from(format!("{}", var.value_type)),
        var.value
    )
}

/// A var and its direct fields, one per line.
pub fn render_var_with_fields(var: &LuaVar, fields: &[LuaVar]) -> String {
    let mut out = render_var(var);
    if !fields.is_empty() {
        out.push_str(" {");
        for field in fields {
            let _ = write!(out, "\n{:INDENT$}{}", "", render_var(field));
        }
        out.push_str("\n}");
    }
    out
}

pub fn render_frame(frame: &LuaBacktrace) -> String {
    let place = match frame.line {
        Some(line) => format!("{}:{}", frame.title, line + 1),
        None => frame.title.clone(),
    };
    format!(
        "#{} {} at {}",
        frame.level,
        FunctionNameView::from(&frame.function),
        FilePathView::from(place)
    )
}

/// Numbered source lines, `>` marks the current line and `*` a breakpoint.
pub fn render_source(fragment: &SourceFragment, breakpoints: &BreakpointList) -> String {
    let width = (fragment.start as usize + fragment.lines.len()).to_string().len();
    let mut out = String::new();
    for (idx, line) in fragment.lines.iter().enumerate() {
        let line_idx = fragment.start + idx as u32;
        let current = if line_idx == fragment.current { '>' } else { ' ' };
        let bp = if breakpoints.find(&fragment.source.key, line_idx).is_some() {
            '*'
        } else {
            ' '
        };
        let number = format!("{:>width$}", line_idx + 1);
        let _ = writeln!(out, "{current}{bp} {} {line}", KeywordView::from(number));
    }
    out
}

pub fn render_watches(watches: &WatchList) -> Vec<String> {
    watches
        .entries()
        .enumerate()
        .map(|(num, (expr, value))| match value {
            Some(var) => format!(
                "{num}: {expr} = {} {}",
                TypeView::from(format!("{}", var.value_type)),
                var.value
            ),
            None => format!("{num}: {expr} = {}", OutputView::from("<not evaluated>")),
        })
        .collect()
}

pub fn render_log(log_type: LogType, message: &str, place: Option<String>) -> String {
    let text = match place {
        Some(place) => format!("{} {message}", FilePathView::from(place)),
        None => message.to_string(),
    };
    match log_type {
        LogType::Output => format!("{}", OutputView::from(text)),
        LogType::Info => text,
        LogType::Warning => format!("{}", WarningView::from(text)),
        LogType::Error => format!("{}", ErrorView::from(text)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{Breakpoint, LuaType, Source};

    #[test]
    #[cfg(feature = "int_test")]
    fn test_render_source() {
        let source = Source {
            key: "@a.lua".to_string(),
            title: "a.lua".to_string(),
            path: Some("a.lua".into()),
            lines: (1..=12).map(|n| format!("line{n}")).collect(),
        };
        let mut breakpoints = BreakpointList::new();
        breakpoints.set(Breakpoint::new("@a.lua", 9));
        let fragment = SourceFragment {
            source: &source,
            current: 8,
            start: 7,
            lines: &source.lines[7..10],
        };
        assert_eq!(
            render_source(&fragment, &breakpoints),
            "    8 line8\n>   9 line9\n * 10 line10\n"
        );
    }

    #[test]
    fn test_render_frame_lines_are_one_based() {
        let frame = LuaBacktrace {
            function: "f".to_string(),
            key: "@a.lua".to_string(),
            title: "a.lua".to_string(),
            line: Some(0),
            level: 1,
        };
        assert!(render_frame(&frame).contains("a.lua:1"));
    }

    #[test]
    fn test_render_fields() {
        let var = LuaVar {
            name: "t".to_string(),
            value: "table: 0x1".to_string(),
            value_type: LuaType::Table,
            has_fields: true,
            path: "t".to_string(),
            ..LuaVar::default()
        };
        let field = LuaVar {
            name: "x".to_string(),
            value: "1".to_string(),
            value_type: LuaType::Integer,
            ..LuaVar::default()
        };
        let rendered = render_var_with_fields(&var, &[field]);
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.lines().nth(1).unwrap().starts_with("    "));
    }
}
