//! Glue between an `mlua` interpreter and a debug session.

use crate::debuggee::coroutine::CoroutineId;
use crate::debuggee::session::{HookEvent, HookKind, Inspector, Session};
use crate::debuggee::{Error, Result};
use crate::protocol::{LogType, LuaBacktrace, LuaType, LuaVar, StackFrameRef};
use crate::registry::SourceManager;
use itertools::Itertools;
use mlua::{
    DebugEvent, Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Table, Thread, Value,
    VmState,
};
use once_cell::sync;
use regex::Regex;
use std::cmp::Ordering;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

/// Stack level of frame 0 as seen by a `debug.*` function called from the hook.
const LEVEL_OFFSET: i64 = 1;

/// Name under which the registry is reachable from evaluated expressions.
const REGISTRY_NAME: &str = "_REGISTRY";

/// Key of the frame globals in an evaluation environment. Not an identifier, so no local
/// can take its place.
const GLOBALS_KEY: &str = "(globals)";

/// Access path of the frame globals.
const GLOBALS_PATH: &str = "_ENV[\"(globals)\"]";

const LUA_KEYWORDS: [&str; 22] = [
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Interpreter with the safe standard libraries plus `debug`, which frame inspection needs.
pub fn new_interpreter() -> Lua {
    // SAFETY: `debug` is loaded on purpose, the hook reads frames through it.
    unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::default()) }
}

/// Functions of the `debug` library, captured before a script gets a chance to replace them.
pub struct DebugTools {
    getinfo: Function,
    getlocal: Function,
    getupvalue: Function,
    getregistry: Function,
    running: Option<Function>,
}

impl DebugTools {
    pub fn capture(lua: &Lua) -> mlua::Result<Self> {
        let debug: Table = lua.globals().get("debug")?;
        let coroutine: Option<Table> = lua.globals().get("coroutine")?;
        let running = match coroutine {
            Some(co) => co.get("running")?,
            None => None,
        };
        Ok(Self {
            getinfo: debug.get("getinfo")?,
            getlocal: debug.get("getlocal")?,
            getupvalue: debug.get("getupvalue")?,
            getregistry: debug.get("getregistry")?,
            running,
        })
    }

    /// Identity of the running Lua thread.
    pub fn coroutine_id(&self) -> CoroutineId {
        let Some(running) = &self.running else {
            return CoroutineId(0);
        };
        let current: mlua::Result<(Thread, bool)> = running.call(());
        match current {
            Ok((thread, _)) => CoroutineId(thread.to_pointer() as usize),
            Err(_) => CoroutineId(0),
        }
    }

    /// Source key and zero-based line of the Lua function calling a native function.
    fn caller_location(&self) -> Option<(String, Option<u32>)> {
        let info: Option<Table> = self.getinfo.call((2, "Sl")).ok()?;
        let info = info?;
        let source: String = info.get("source").ok()?;
        let line: i64 = info.get("currentline").ok()?;
        Some((source, (line > 0).then(|| (line - 1) as u32)))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !LUA_KEYWORDS.contains(&name)
}

/// Lua string literal with the same contents.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\{}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

/// Text of a value the way the frame shows it.
fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => quote(&s.to_string_lossy()),
        Value::Number(n) => format_number(*n),
        other => other
            .to_string()
            .unwrap_or_else(|_| format!("{}: {:?}", other.type_name(), other.to_pointer())),
    }
}

/// Text of a value the way `print` shows it.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Number(n) => format_number(*n),
        other => other
            .to_string()
            .unwrap_or_else(|_| format!("{}: {:?}", other.type_name(), other.to_pointer())),
    }
}

fn value_type(value: &Value) -> LuaType {
    LuaType::from_str(value.type_name()).unwrap_or(LuaType::Other)
}

fn has_fields(value: &Value) -> bool {
    match value {
        Value::Table(t) => t.clone().pairs::<Value, Value>().next().is_some(),
        _ => false,
    }
}

/// Display name of a table key.
fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => {
            let s = s.to_string_lossy().to_string();
            if is_identifier(&s) {
                s
            } else {
                format!("[{}]", quote(&s))
            }
        }
        other => format!("[{}]", describe(other)),
    }
}

/// Expression reaching `parent[key]`, `None` if the key can't be written as a literal.
fn index_path(parent: &str, key: &Value) -> Option<String> {
    if parent.is_empty() {
        return None;
    }
    match key {
        Value::String(s) => {
            let s = s.to_string_lossy().to_string();
            if is_identifier(&s) {
                Some(format!("{parent}.{s}"))
            } else {
                Some(format!("{parent}[{}]", quote(&s)))
            }
        }
        Value::Integer(i) => Some(format!("{parent}[{i}]")),
        Value::Number(n) if n.is_finite() => Some(format!("{parent}[{}]", format_number(*n))),
        Value::Boolean(b) => Some(format!("{parent}[{b}]")),
        _ => None,
    }
}

/// Integer keys first in numeric order, then everything else by name.
fn key_order(a: &(Value, Value), b: &(Value, Value)) -> Ordering {
    let rank = |v: &Value| match v {
        Value::Integer(i) => (0, *i),
        _ => (1, 0),
    };
    rank(&a.0)
        .cmp(&rank(&b.0))
        .then_with(|| key_name(&a.0).cmp(&key_name(&b.0)))
}

/// [`Inspector`] over a live interpreter, valid for the duration of one hook call.
pub struct LuaInspector<'a> {
    lua: &'a Lua,
    tools: &'a DebugTools,
}

impl<'a> LuaInspector<'a> {
    pub fn new(lua: &'a Lua, tools: &'a DebugTools) -> Self {
        Self { lua, tools }
    }

    fn level(frame: StackFrameRef) -> i64 {
        frame.level as i64 + LEVEL_OFFSET
    }

    fn frame_function(&self, frame: StackFrameRef) -> Result<Function> {
        let info: Option<Table> = self.tools.getinfo.call((Self::level(frame), "f"))?;
        let info = info.ok_or(Error::FrameNotFound(frame.level))?;
        let func: Function = info.get("func")?;
        Ok(func)
    }

    fn upvalues(&self, func: &Function) -> Result<Vec<(String, Value)>> {
        let mut upvalues = vec![];
        for idx in 1i64.. {
            let (name, value): (Option<String>, Value) =
                self.tools.getupvalue.call((func.clone(), idx))?;
            let Some(name) = name else { break };
            // native functions have unnamed upvalues
            if !name.is_empty() {
                upvalues.push((name, value));
            }
        }
        Ok(upvalues)
    }

    /// Active locals of a frame, with temporaries and varargs if asked for.
    fn locals(&self, frame: StackFrameRef, temporaries: bool) -> Result<Vec<(String, Value)>> {
        self.frame_function(frame)?;
        let level = Self::level(frame);

        let mut locals = vec![];
        for idx in 1i64.. {
            let (name, value): (Option<String>, Value) =
                self.tools.getlocal.call((level, idx))?;
            let Some(name) = name else { break };
            if temporaries || !name.starts_with('(') {
                locals.push((name, value));
            }
        }
        if temporaries {
            for idx in 1i64.. {
                let (name, value): (Option<String>, Value) =
                    self.tools.getlocal.call((level, -idx))?;
                let Some(name) = name else { break };
                locals.push((name, value));
            }
        }
        Ok(locals)
    }

    /// `_ENV` of the frame function, the global table if it has none.
    fn frame_globals(&self, frame: StackFrameRef) -> Result<Table> {
        let func = self.frame_function(frame)?;
        let env = self
            .upvalues(&func)?
            .into_iter()
            .find_map(|(name, value)| match value {
                Value::Table(t) if name == "_ENV" => Some(t),
                _ => None,
            });
        Ok(env.unwrap_or_else(|| self.lua.globals()))
    }

    /// Table resolving names the way code of the frame would: locals, upvalues, globals.
    fn frame_env(&self, frame: StackFrameRef) -> Result<Table> {
        let func = self.frame_function(frame)?;
        let env = self.lua.create_table()?;
        for (name, value) in self.upvalues(&func)? {
            if name != "_ENV" {
                env.raw_set(name, value)?;
            }
        }
        for (name, value) in self.locals(frame, false)? {
            env.raw_set(name, value)?;
        }
        let registry: Value = self.tools.getregistry.call(())?;
        env.raw_set(REGISTRY_NAME, registry)?;

        let globals = self.frame_globals(frame)?;
        env.raw_set(GLOBALS_KEY, globals.clone())?;
        let meta = self.lua.create_table()?;
        meta.raw_set("__index", globals.clone())?;
        meta.raw_set("__newindex", globals)?;
        env.set_metatable(Some(meta));
        Ok(env)
    }

    fn eval_values(&self, expr: &str, frame: StackFrameRef) -> Result<Vec<Value>> {
        let env = self.frame_env(frame)?;
        let as_expression = self
            .lua
            .load(format!("return {expr}"))
            .set_name("=eval")
            .set_environment(env.clone())
            .into_function();
        let chunk = match as_expression {
            Ok(chunk) => chunk,
            Err(_) => self
                .lua
                .load(expr)
                .set_name("=eval")
                .set_environment(env)
                .into_function()?,
        };
        let values: MultiValue = chunk.call(())?;
        Ok(values.into_iter().collect())
    }

    fn make_var(&self, name: String, value: &Value, frame: StackFrameRef, path: String) -> LuaVar {
        LuaVar {
            name,
            value: describe(value),
            value_type: value_type(value),
            has_fields: has_fields(value),
            frame,
            path,
        }
    }

    /// Vars of named slots, a name hidden by a later slot gets no access path.
    fn named_vars(&self, slots: Vec<(String, Value)>, frame: StackFrameRef) -> Vec<LuaVar> {
        let mut vars: Vec<LuaVar> = slots
            .iter()
            .enumerate()
            .map(|(idx, (name, value))| {
                let shadowed = slots[idx + 1..].iter().any(|(later, _)| later == name);
                let path = if shadowed || name.starts_with('(') {
                    String::new()
                } else {
                    name.clone()
                };
                self.make_var(name.clone(), value, frame, path)
            })
            .collect();
        vars.shrink_to_fit();
        vars
    }

    fn table_vars(&self, table: &Table, parent: &str, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let mut pairs: Vec<(Value, Value)> = table
            .clone()
            .pairs::<Value, Value>()
            .collect::<mlua::Result<_>>()?;
        pairs.sort_by(key_order);
        Ok(pairs
            .iter()
            .map(|(key, value)| {
                let path = index_path(parent, key).unwrap_or_default();
                self.make_var(key_name(key), value, frame, path)
            })
            .collect())
    }
}

impl Inspector for LuaInspector<'_> {
    fn local_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let func = self.frame_function(frame)?;
        let locals = self.locals(frame, false)?;
        let upvalues: Vec<_> = self
            .upvalues(&func)?
            .into_iter()
            .filter(|(name, _)| name != "_ENV")
            .collect();

        // locals hide upvalues with the same name
        let mut slots = upvalues;
        slots.extend(locals);
        Ok(self.named_vars(slots, frame))
    }

    fn stack_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let slots = self.locals(frame, true)?;
        Ok(self.named_vars(slots, frame))
    }

    fn global_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let globals = self.frame_globals(frame)?;
        self.table_vars(&globals, GLOBALS_PATH, frame)
    }

    fn registry_vars(&self) -> Result<Vec<LuaVar>> {
        let registry: Table = self.tools.getregistry.call(())?;
        self.table_vars(&registry, REGISTRY_NAME, StackFrameRef::TOP)
    }

    fn field_vars(&self, var: &LuaVar) -> Result<Vec<LuaVar>> {
        if !var.is_expandable() {
            return Err(Error::NotExpandable(var.name.clone()));
        }
        let value = self
            .eval_values(&var.path, var.frame)?
            .into_iter()
            .next()
            .unwrap_or(Value::Nil);
        match value {
            Value::Table(table) => self.table_vars(&table, &var.path, var.frame),
            _ => Err(Error::NotExpandable(var.name.clone())),
        }
    }

    fn eval(&self, expr: &str, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let values = self.eval_values(expr, frame)?;
        Ok(values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                if idx == 0 {
                    self.make_var(expr.to_string(), value, frame, expr.trim().to_string())
                } else {
                    self.make_var(format!("{expr} ({})", idx + 1), value, frame, String::new())
                }
            })
            .collect())
    }

    fn backtrace(&self) -> Result<Vec<LuaBacktrace>> {
        let mut trace = vec![];
        for level in 0u32.. {
            let info: Option<Table> = self
                .tools
                .getinfo
                .call((level as i64 + LEVEL_OFFSET, "nSl"))?;
            let Some(info) = info else { break };

            let name: Option<String> = info.get("name")?;
            let what: Option<String> = info.get("what")?;
            let source: Option<String> = info.get("source")?;
            let short_src: Option<String> = info.get("short_src")?;
            let line: Option<i64> = info.get("currentline")?;

            let function = name.unwrap_or_else(|| match what.as_deref() {
                Some("main") => "main chunk".to_string(),
                _ => "?".to_string(),
            });
            trace.push(LuaBacktrace {
                function,
                key: source.unwrap_or_default(),
                title: short_src.unwrap_or_default(),
                line: line.filter(|l| *l > 0).map(|l| (l - 1) as u32),
                level,
            });
        }
        Ok(trace)
    }
}

/// Active frames of the running coroutine. Level 0 is the hooked function.
fn stack_depth(lua: &Lua) -> u32 {
    let mut depth = 0;
    while lua.inspect_stack(depth as usize).is_some() {
        depth += 1;
    }
    depth
}

/// Hook the interpreter up to a session and forward `print` to the frame.
pub fn install(lua: &Lua, session: Arc<Session>) -> mlua::Result<()> {
    let tools = Rc::new(DebugTools::capture(lua)?);
    install_print(lua, session.clone(), tools.clone())?;

    let triggers = HookTriggers::new().on_calls().on_returns().every_line();
    lua.set_hook(triggers, move |lua, debug| {
        if session.is_detached() {
            return Ok(VmState::Continue);
        }
        let kind = match debug.event() {
            DebugEvent::Call => HookKind::Call,
            DebugEvent::TailCall => HookKind::TailCall,
            DebugEvent::Ret => HookKind::Return,
            DebugEvent::Line => HookKind::Line(debug.curr_line().max(0) as u32),
            _ => return Ok(VmState::Continue),
        };
        let source = debug.source();
        let event = HookEvent {
            coroutine: tools.coroutine_id(),
            kind,
            source: source.source.as_deref().unwrap_or("=?"),
            stack_depth: stack_depth(lua),
        };

        let inspector = LuaInspector::new(lua, &tools);
        match session.on_hook(&event, &inspector) {
            Ok(()) => Ok(VmState::Continue),
            Err(e) => Err(mlua::Error::RuntimeError(e.to_string())),
        }
    });
    Ok(())
}

fn install_print(lua: &Lua, session: Arc<Session>, tools: Rc<DebugTools>) -> mlua::Result<()> {
    let print = lua.create_function(move |_, args: MultiValue| {
        let text = args.iter().map(display).join("\t");
        println!("{text}");
        let (key, line) = tools.caller_location().unwrap_or_default();
        session.output(LogType::Output, &text, &key, line);
        Ok(())
    })?;
    lua.globals().set("print", print)
}

/// `chunk:line:` prefix of a Lua error message.
static ERROR_LOCATION: sync::Lazy<Regex> = sync::Lazy::new(|| {
    Regex::new(r#"(?:\[string "(.*?)"\]|([^\s:]+)):(\d+): "#).expect("must compile")
});

/// Source key and zero-based line an error message points to.
fn error_location(sources: &SourceManager, message: &str) -> Option<(String, u32)> {
    let caps = ERROR_LOCATION.captures(message)?;
    let line: u32 = caps.get(3)?.as_str().parse().ok()?;

    let source = if let Some(chunk) = caps.get(1) {
        sources.get_string(chunk.as_str().trim_end_matches("..."))?
    } else {
        let name = caps.get(2)?.as_str().trim_start_matches("...");
        sources.find_file(name).or_else(|| {
            sources
                .list()
                .find(|src| src.is_file() && src.key.ends_with(name))
        })?
    };
    Some((source.key.clone(), line.saturating_sub(1)))
}

/// Forward a script error to the frame.
pub fn report_error(session: &Session, err: &mlua::Error) {
    let message = err.to_string();
    let first_line = message.lines().next().unwrap_or_default();
    let location = session.with_sources(|sources| error_location(sources, first_line));
    let (key, line) = match location {
        Some((key, line)) => (key, Some(line)),
        None => (String::new(), None),
    };
    session.output(LogType::Error, &message, &key, line);
}
