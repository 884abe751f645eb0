// crates/playbridge-core/src/commands.rs
//
// Every transport action a host can route to the control is a MediaCommand.
// Hosts collect these during their UI pass and hand them to
// MediaElement::execute afterwards.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    /// Open the source named by the URI (`pattern:...`, a file path, ...).
    Open(String),
    Play,
    Pause,
    Stop,
    Close,
    /// Seek to an absolute position; clamped to the seekable window by the engine.
    Seek(Duration),
}

impl MediaCommand {
    pub fn name(&self) -> &'static str {
        match self {
            MediaCommand::Open(_) => "open",
            MediaCommand::Play    => "play",
            MediaCommand::Pause   => "pause",
            MediaCommand::Stop    => "stop",
            MediaCommand::Close   => "close",
            MediaCommand::Seek(_) => "seek",
        }
    }

    /// Commands that need an open session to succeed.
    pub fn requires_session(&self) -> bool {
        !matches!(self, MediaCommand::Open(_))
    }
}
