//! Registry of interpreters running under a debugger.

use crate::debuggee::lua;
use crate::debuggee::session::Session;
use crate::{ldb_debug, ldb_warn};
use mlua::Lua;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Process unique id of an attached interpreter, stored in the interpreter app data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpreterId(u64);

/// Maps each attached interpreter to its debug session.
#[derive(Default)]
pub struct RuntimeContext {
    sessions: Mutex<HashMap<InterpreterId, Arc<Session>>>,
    next_id: AtomicU64,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the debug hook into `lua` and bind it to `session`.
    pub fn attach(&self, lua: &Lua, session: Arc<Session>) -> mlua::Result<InterpreterId> {
        if let Some(id) = lua.app_data_ref::<InterpreterId>().map(|id| *id) {
            ldb_debug!(target: "debuggee", "interpreter {id:?} already attached, rebind");
            self.detach(lua);
        }

        let id = InterpreterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lua::install(lua, session.clone())?;
        lua.set_app_data(id);
        self.lock().insert(id, session);
        Ok(id)
    }

    pub fn session_of(&self, lua: &Lua) -> Option<Arc<Session>> {
        let id = *lua.app_data_ref::<InterpreterId>()?;
        self.lock().get(&id).cloned()
    }

    /// Remove the hook, the interpreter keeps running at full speed.
    pub fn detach(&self, lua: &Lua) -> Option<Arc<Session>> {
        lua.remove_hook();
        let id = lua.remove_app_data::<InterpreterId>()?;
        self.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<InterpreterId, Arc<Session>>> {
        // a panic inside a hook leaves the map itself consistent
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Report an error raised by a script of an attached interpreter.
    pub fn report_error(&self, lua: &Lua, err: &mlua::Error) {
        match self.session_of(lua) {
            Some(session) => lua::report_error(&session, err),
            None => ldb_warn!(target: "debuggee", "script error outside of a session: {err}"),
        }
    }
}
