//! Built-in launcher variants.

mod content;
mod flatpak;
mod native;
mod open;
mod rom;
mod shell;
mod steam;
mod terminal;
mod windows;

pub use content::ContentVariant;
pub use flatpak::FlatpakVariant;
pub use native::NativeVariant;
pub use open::OpenVariant;
pub use rom::RomVariant;
pub use shell::ShellVariant;
pub use steam::SteamVariant;
pub use terminal::TerminalVariant;
pub use windows::{AppxVariant, LinkVariant, StartProcessVariant};
