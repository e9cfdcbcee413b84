use thiserror::Error;

pub type Result<T> = std::result::Result<T, SequencerError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to initialize MIDI output: {0}")]
    Init(String),

    #[error("no MIDI output ports available")]
    NoPorts,

    #[error("no MIDI output port matching '{0}'")]
    PortNotFound(String),

    #[error("failed to connect to MIDI output: {0}")]
    Connect(String),

    #[error("failed to send MIDI message: {0}")]
    Send(String),

    #[error("device is not connected")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("sequencer is not open")]
    NotOpen,

    #[error("device unavailable: sequencer is already open")]
    AlreadyOpen,

    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("timeline can only be replaced while stopped")]
    Running,

    #[error("no timeline is set")]
    NoTimeline,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("failed to spawn poll thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}
