//! Discord presentation: embeds for every reply and the button rows used by
//! the audio menu and the player controls.

pub mod buttons;
pub mod embeds;
