//! Snapshot of everything the receiver has told us.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Power {
    Standby,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mute {
    Off,
    On,
}

/// Network service currently browsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Unset,
    Dlna,
    Vtuner,
    Net,
}

impl Source {
    /// Map the two-character service code of a menu-position message.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Source::Dlna),
            "02" => Some(Source::Vtuner),
            "F3" => Some(Source::Net),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayStatus {
    Playing,
    Stopped,
    Paused,
    FastForward,
    FastReverse,
}

impl PlayStatus {
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'P' => Some(PlayStatus::Playing),
            'S' => Some(PlayStatus::Stopped),
            'p' => Some(PlayStatus::Paused),
            'F' => Some(PlayStatus::FastForward),
            'R' => Some(PlayStatus::FastReverse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    Off,
    All,
    Folder,
    One,
}

impl Repeat {
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            '-' => Some(Repeat::Off),
            'R' => Some(Repeat::All),
            'F' => Some(Repeat::Folder),
            '1' => Some(Repeat::One),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shuffle {
    Off,
    All,
    Album,
    Folder,
}

impl Shuffle {
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            '-' => Some(Shuffle::Off),
            'S' => Some(Shuffle::All),
            'A' => Some(Shuffle::Album),
            'F' => Some(Shuffle::Folder),
            _ => None,
        }
    }
}

/// One line of the current menu listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    /// Line index as sent by the device (`0`-`9`).
    pub line: String,
    pub label: String,
}

/// Device state, mutated field by field as notifications arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub power: Option<Power>,
    pub mute: Option<Mute>,
    /// Master volume, two hex digits.
    pub volume: Option<String>,
    pub speaker_layout: Option<String>,
    pub source: Source,
    /// Menu nesting level.
    pub depth: u32,
    pub index: u32,
    pub cursor: u32,
    /// Menu listing in arrival order.
    pub content: Vec<ListEntry>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    /// Elapsed play time. Updated without notifying observers.
    pub time: Option<String>,
    pub play: Option<PlayStatus>,
    pub repeat: Option<Repeat>,
    pub shuffle: Option<Shuffle>,
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.content {
            let marker = if entry.line == self.cursor.to_string() { '>' } else { ' ' };
            writeln!(f, "{marker}{} {}", entry.line, entry.label)?;
        }
        writeln!(f, "Artist: {}", or_dash(&self.artist))?;
        writeln!(f, "Album: {}", or_dash(&self.album))?;
        writeln!(f, "Title: {}", or_dash(&self.title))?;
        writeln!(f, "Track: {}", or_dash(&self.track))?;
        writeln!(
            f,
            "Volume: {}, Mute: {:?}, Speaker layout: {}",
            or_dash(&self.volume),
            self.mute,
            or_dash(&self.speaker_layout)
        )?;
        writeln!(
            f,
            "Source: {:?}, Depth: {}, Cursor: {}",
            self.source, self.depth, self.cursor
        )?;
        write!(
            f,
            "Play: {:?}, Repeat: {:?}, Shuffle: {:?}, Time: {}",
            self.play,
            self.repeat,
            self.shuffle,
            or_dash(&self.time)
        )
    }
}
