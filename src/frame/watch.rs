use crate::protocol::LuaVar;

/// Watched expressions and their values at some source update.
#[derive(Debug, Default)]
pub struct WatchList {
    exprs: Vec<String>,
    values: Vec<LuaVar>,
    /// Update counter the values were evaluated at.
    evaluated_at: Option<u32>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression, return `false` if it is already watched.
    pub fn add(&mut self, expr: &str) -> bool {
        let expr = expr.trim();
        if expr.is_empty() || self.exprs.iter().any(|e| e == expr) {
            return false;
        }
        self.exprs.push(expr.to_string());
        self.invalidate();
        true
    }

    pub fn remove(&mut self, expr: &str) -> bool {
        let expr = expr.trim();
        let Some(pos) = self.exprs.iter().position(|e| e == expr) else {
            return false;
        };
        self.exprs.remove(pos);
        self.invalidate();
        true
    }

    pub fn clear(&mut self) {
        self.exprs.clear();
        self.invalidate();
    }

    pub fn exprs(&self) -> &[String] {
        &self.exprs
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Whether the values must be evaluated again for `update_count`.
    pub fn is_stale(&self, update_count: u32) -> bool {
        match self.evaluated_at {
            Some(at) => at < update_count,
            None => true,
        }
    }

    pub fn store(&mut self, update_count: u32, values: Vec<LuaVar>) {
        self.values = values;
        self.evaluated_at = Some(update_count);
    }

    /// Expression and last known value pairs, `None` for values not evaluated yet.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&LuaVar>)> {
        let fresh = self.evaluated_at.is_some();
        self.exprs
            .iter()
            .enumerate()
            .map(move |(idx, expr)| (expr.as_str(), fresh.then(|| self.values.get(idx)).flatten()))
    }

    fn invalidate(&mut self) {
        self.values.clear();
        self.evaluated_at = None;
    }
}
