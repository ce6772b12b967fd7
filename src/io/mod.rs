pub mod command;
pub mod ytdlp;
pub mod ffmpeg;
