use rustc_hash::FxHashMap;

/// Marker reserved for edges without a physical boundary tag, i.e. interior edges.
pub const INTERIOR_EDGE_MARKER: i32 = 0;

/// Two-way map between user-facing marker names and internal integer markers.
///
/// Internal markers are assigned in insertion order starting at 1, since 0 is reserved for
/// interior edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkersConversion {
    names: Vec<String>,
    lookup: FxHashMap<String, i32>,
}

impl MarkersConversion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the internal marker of `name`, inserting it if it is new.
    pub fn insert(&mut self, name: &str) -> i32 {
        if let Some(&marker) = self.lookup.get(name) {
            return marker;
        }
        self.names.push(name.to_string());
        let marker = self.names.len() as i32;
        self.lookup.insert(name.to_string(), marker);
        marker
    }

    pub fn internal_marker(&self, name: &str) -> Option<i32> {
        self.lookup.get(name).copied()
    }

    pub fn user_marker(&self, marker: i32) -> Option<&str> {
        if marker <= 0 {
            return None;
        }
        self.names.get(marker as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
