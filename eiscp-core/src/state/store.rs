//! Message-driven device-state store.
//!
//! Each inbound message is `TAG` (three letters) followed by parameters. A tag
//! is looked up in a handler table; the handler mutates the [`DeviceState`]
//! in place and reports whether observers should hear about it. Unknown tags
//! are ignored so newer firmware does not break the client.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

use crate::observer::ObserverRegistry;
use crate::state::device::{
    DeviceState, ListEntry, Mute, PlayStatus, Power, Repeat, Shuffle, Source,
};

/// What a message did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Fields changed; observers were notified.
    Notify,
    /// Fields changed without notification.
    Silent,
    /// Known tag, but no field could be set from its parameters.
    Unchanged,
    /// Unknown tag.
    Ignored,
}

impl From<bool> for Update {
    fn from(changed: bool) -> Self {
        if changed {
            Update::Notify
        } else {
            Update::Unchanged
        }
    }
}

pub type TagHandler = fn(&mut DeviceState, &str) -> Update;

/// Owns the live [`DeviceState`] for one session.
///
/// The state lives in a `watch` channel: the store is its only writer,
/// readers take snapshots through [`subscribe`](Self::subscribe).
pub struct StateStore {
    state: watch::Sender<DeviceState>,
    handlers: HashMap<&'static str, TagHandler>,
    observers: Arc<ObserverRegistry>,
}

impl StateStore {
    pub fn new(observers: Arc<ObserverRegistry>) -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        let mut handlers: HashMap<&'static str, TagHandler> = HashMap::new();
        handlers.insert("NLT", menu_position);
        handlers.insert("NTM", time);
        handlers.insert("NAT", artist);
        handlers.insert("NAL", album);
        handlers.insert("NTI", title);
        handlers.insert("NTR", track);
        handlers.insert("MVL", volume);
        handlers.insert("SPL", speaker_layout);
        handlers.insert("AMT", mute);
        handlers.insert("NST", transport_status);
        handlers.insert("NLS", list);
        handlers.insert("PWR", power);
        Self {
            state,
            handlers,
            observers,
        }
    }

    /// Install or replace the handler for `tag`, returning the previous one.
    pub fn register_handler(&mut self, tag: &'static str, handler: TagHandler) -> Option<TagHandler> {
        self.handlers.insert(tag, handler)
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    /// Apply one decoded message.
    pub fn update(&mut self, message: &str) -> Update {
        let Some(tag) = message.get(..3) else {
            return Update::Ignored;
        };
        let params = &message[3..];
        let Some(handler) = self.handlers.get(tag).copied() else {
            trace!(tag, "ignoring unknown tag");
            return Update::Ignored;
        };

        let mut outcome = Update::Unchanged;
        self.state.send_if_modified(|state| {
            outcome = handler(state, params);
            outcome == Update::Notify
        });

        if outcome == Update::Notify {
            let snapshot = self.snapshot();
            self.observers.notify(&snapshot);
        }
        trace!(tag, ?outcome, "state update");
        outcome
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &*self.state.borrow())
            .field("tags", &self.handlers.len())
            .finish()
    }
}

// ── Handlers ─────────────────────────────────────────────────────

fn parse_decimal(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `NLT`: service code, two-digit depth, two-digit index.
fn menu_position(state: &mut DeviceState, params: &str) -> Update {
    let mut changed = false;
    if let Some(source) = params.get(0..2).and_then(Source::from_code) {
        state.source = source;
        changed = true;
    }
    if let Some(depth) = params.get(2..4).and_then(parse_decimal) {
        state.depth = depth;
        changed = true;
    }
    if let Some(index) = params.get(4..6).and_then(parse_decimal) {
        state.index = index;
        changed = true;
    }
    changed.into()
}

fn time(state: &mut DeviceState, params: &str) -> Update {
    state.time = Some(params.to_string());
    Update::Silent
}

fn artist(state: &mut DeviceState, params: &str) -> Update {
    state.artist = Some(params.to_string());
    Update::Notify
}

fn album(state: &mut DeviceState, params: &str) -> Update {
    state.album = Some(params.to_string());
    Update::Notify
}

fn title(state: &mut DeviceState, params: &str) -> Update {
    state.title = Some(params.to_string());
    Update::Notify
}

fn track(state: &mut DeviceState, params: &str) -> Update {
    state.track = Some(params.to_string());
    Update::Notify
}

fn volume(state: &mut DeviceState, params: &str) -> Update {
    state.volume = Some(params.to_string());
    Update::Notify
}

fn speaker_layout(state: &mut DeviceState, params: &str) -> Update {
    state.speaker_layout = Some(params.to_string());
    Update::Notify
}

fn mute(state: &mut DeviceState, params: &str) -> Update {
    state.mute = Some(if params == "00" { Mute::Off } else { Mute::On });
    Update::Notify
}

fn power(state: &mut DeviceState, params: &str) -> Update {
    let power = match params {
        "00" => Power::Standby,
        "01" => Power::On,
        _ => return Update::Unchanged,
    };
    state.power = Some(power);
    Update::Notify
}

/// `NST`: play, repeat and shuffle codes, one character each.
fn transport_status(state: &mut DeviceState, params: &str) -> Update {
    let mut chars = params.chars();
    let mut changed = false;
    if let Some(play) = chars.next().and_then(PlayStatus::from_code) {
        state.play = Some(play);
        changed = true;
    }
    if let Some(repeat) = chars.next().and_then(Repeat::from_code) {
        state.repeat = Some(repeat);
        changed = true;
    }
    if let Some(shuffle) = chars.next().and_then(Shuffle::from_code) {
        state.shuffle = Some(shuffle);
        changed = true;
    }
    changed.into()
}

/// `NLS`: `C<line>` moves the cursor, `A<line>?<label>` / `U<line>?<label>`
/// appends a listing entry. Line `0` starts a new listing.
fn list(state: &mut DeviceState, params: &str) -> Update {
    let line = params.get(1..2);
    match params.chars().next() {
        Some('C') => match line.and_then(parse_decimal) {
            Some(cursor) => {
                state.cursor = cursor;
                Update::Notify
            }
            None => Update::Unchanged,
        },
        Some('A' | 'U') => {
            let Some(line) = line else {
                return Update::Unchanged;
            };
            if line == "0" {
                state.content.clear();
            }
            state.content.push(ListEntry {
                line: line.to_string(),
                label: params.get(3..).unwrap_or_default().to_string(),
            });
            Update::Notify
        }
        _ => Update::Unchanged,
    }
}

// ── Tests ────────────────────────────────────────────────────────
