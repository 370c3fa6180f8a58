use crate::protocol::Breakpoint;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered set of breakpoints, unique by `(source key, line)`.
#[derive(Debug, Default, Clone)]
pub struct BreakpointList {
    breakpoints: BTreeMap<(String, u32), Breakpoint>,
}

impl BreakpointList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, key: &str, line: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&(key.to_string(), line))
    }

    /// Whether the source has any breakpoint at all.
    pub fn has_source(&self, key: &str) -> bool {
        self.first(key).is_some()
    }

    /// First breakpoint of a source.
    pub fn first(&self, key: &str) -> Option<&Breakpoint> {
        self.breakpoints
            .range((key.to_string(), 0)..)
            .next()
            .map(|(_, bp)| bp)
            .filter(|bp| bp.key == key)
    }

    /// Breakpoint following `bp` in the same source.
    pub fn next(&self, bp: &Breakpoint) -> Option<&Breakpoint> {
        self.breakpoints
            .range((
                Bound::Excluded((bp.key.clone(), bp.line)),
                Bound::Unbounded,
            ))
            .next()
            .map(|(_, next)| next)
            .filter(|next| next.key == bp.key)
    }

    /// Insert or replace a breakpoint. Return true if there was none at this place.
    pub fn set(&mut self, bp: Breakpoint) -> bool {
        self.breakpoints
            .insert((bp.key.clone(), bp.line), bp)
            .is_none()
    }

    pub fn remove(&mut self, key: &str, line: u32) -> Option<Breakpoint> {
        self.breakpoints.remove(&(key.to_string(), line))
    }

    /// Remove a breakpoint if it exists or add it otherwise. Return true if added.
    pub fn toggle(&mut self, bp: Breakpoint) -> bool {
        if self.remove(&bp.key, bp.line).is_some() {
            return false;
        }
        self.set(bp)
    }

    pub fn replace_all(&mut self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        self.breakpoints = breakpoints
            .into_iter()
            .map(|bp| ((bp.key.clone(), bp.line), bp))
            .collect();
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// Breakpoints visible to the user, internal ones are skipped.
    pub fn user_visible(&self) -> impl Iterator<Item = &Breakpoint> {
        self.iter().filter(|bp| !bp.is_internal)
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Breakpoint> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn list() -> BreakpointList {
        let mut list = BreakpointList::new();
        list.set(Breakpoint::new("@b.lua", 3));
        list.set(Breakpoint::new("@a.lua", 10));
        list.set(Breakpoint::new("@a.lua", 2));
        list
    }

    #[test]
    fn test_set_idempotent() {
        let mut list = list();
        assert!(!list.set(Breakpoint::new("@a.lua", 2)));
        assert_eq!(list.len(), 3);
        assert!(list.set(Breakpoint::temporary("@a.lua", 4)));
        assert!(list.find("@a.lua", 4).unwrap().is_temp);
    }

    #[test]
    fn test_ordering() {
        let list = list();
        let order: Vec<_> = list.iter().map(|bp| (bp.key.as_str(), bp.line)).collect();
        assert_eq!(order, vec![("@a.lua", 2), ("@a.lua", 10), ("@b.lua", 3)]);
    }

    #[test]
    fn test_first_and_next() {
        let list = list();
        let first = list.first("@a.lua").unwrap();
        assert_eq!(first.line, 2);
        let second = list.next(first).unwrap();
        assert_eq!(second.line, 10);
        assert!(list.next(second).is_none());
        assert!(list.first("@c.lua").is_none());
        assert!(list.has_source("@b.lua"));
    }

    #[test]
    fn test_remove_and_toggle() {
        let mut list = list();
        assert!(list.remove("@a.lua", 2).is_some());
        assert!(list.remove("@a.lua", 2).is_none());
        assert!(list.find("@a.lua", 2).is_none());

        assert!(list.toggle(Breakpoint::new("@a.lua", 2)));
        assert!(!list.toggle(Breakpoint::new("@a.lua", 2)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_hidden_internal() {
        let mut list = BreakpointList::new();
        list.set(Breakpoint {
            is_internal: true,
            ..Breakpoint::new("@a.lua", 1)
        });
        assert_eq!(list.len(), 1);
        assert_eq!(list.user_visible().count(), 0);
    }
}
