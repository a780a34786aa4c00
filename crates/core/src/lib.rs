pub mod config;
pub mod decode;
pub mod playback;
pub mod settings;
pub mod transport;
pub mod tts;
pub mod util;
pub mod voice;
pub mod wav;
