//! Compile-time UUID → human-readable label lookup table (§4.8). Trivial
//! by design: a handful of well-known event IDs this crate cares about
//! naming in logs and diagnostics, nothing more.

use uuid::Uuid;

const INVALID_EVENT_LABEL: &str = "(invalid event)";
const UNKNOWN_EVENT_LABEL: &str = "(unknown event)";

/// Known event IDs, kept small and static. Entries here are illustrative of
/// the kind of system event this library ships metrics about; extend as
/// new well-known events are defined.
const EVENTS: &[(&str, &str)] = &[
    ("d54cbd8c-be0a-4d08-a450-ed2a2c721c4a", "network-connected"),
    ("2b5c044d-d819-4e37-9792-d1951224c97d", "user-logged-in"),
    ("7862e6d8-25f4-4d66-a310-3dec13b9acbb", "shell-crashed"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult<'a> {
    Found(&'a str),
    Invalid,
    Unknown,
}

impl<'a> LookupResult<'a> {
    /// The label to display regardless of which variant this is, matching
    /// §4.8's "always set the out label" contract.
    pub fn label(self) -> &'a str {
        match self {
            LookupResult::Found(label) => label,
            LookupResult::Invalid => INVALID_EVENT_LABEL,
            LookupResult::Unknown => UNKNOWN_EVENT_LABEL,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, LookupResult::Found(_))
    }
}

/// Look up `event_id` (a UUID string) in the static event table.
pub fn lookup(event_id: &str) -> LookupResult<'static> {
    if Uuid::parse_str(event_id).is_err() {
        return LookupResult::Invalid;
    }
    match EVENTS.iter().find(|(id, _)| *id == event_id) {
        Some((_, label)) => LookupResult::Found(label),
        None => LookupResult::Unknown,
    }
}
