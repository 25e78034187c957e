pub mod device;
mod store;

pub use device::{DeviceState, ListEntry, Mute, PlayStatus, Power, Repeat, Shuffle, Source};
pub use store::{StateStore, TagHandler, Update};
