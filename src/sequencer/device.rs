//! Output receivers the sequencer dispatches to.

use std::sync::Arc;

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::DeviceError;
use crate::events::MidiMessage;

/// External sink for channel messages: hardware port, software synth or test double.
pub trait MidiDevice: Send {
    fn open(&mut self) -> Result<(), DeviceError>;

    fn close(&mut self);

    fn send(&mut self, channel: u8, message: &MidiMessage) -> Result<(), DeviceError>;
}

/// MIDI output port reached through midir.
pub struct MidirDevice {
    client_name: String,
    port_name: Option<String>,
    connection: Option<MidiOutputConnection>,
}

impl MidirDevice {
    pub fn new(client_name: impl Into<String>, port_name: Option<String>) -> Self {
        Self {
            client_name: client_name.into(),
            port_name,
            connection: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.client_name.clone(), config.port_name.clone())
    }

    /// Names of the output ports currently visible to midir.
    pub fn port_names(client_name: &str) -> Result<Vec<String>, DeviceError> {
        let output = MidiOutput::new(client_name).map_err(|e| DeviceError::Init(e.to_string()))?;
        Ok(output
            .ports()
            .iter()
            .map(|p| output.port_name(p).unwrap_or_default())
            .collect())
    }
}

impl MidiDevice for MidirDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let output =
            MidiOutput::new(&self.client_name).map_err(|e| DeviceError::Init(e.to_string()))?;
        let ports = output.ports();
        let port = match &self.port_name {
            Some(name) => ports
                .iter()
                .find(|p| output.port_name(p).unwrap_or_default().contains(name.as_str()))
                .ok_or_else(|| DeviceError::PortNotFound(name.clone()))?,
            None => ports.first().ok_or(DeviceError::NoPorts)?,
        };

        let label = output.port_name(port).unwrap_or_default();
        let connection = output
            .connect(port, "stagetime-out")
            .map_err(|e| DeviceError::Connect(e.to_string()))?;
        info!(port = %label, "connected MIDI output");

        self.connection = Some(connection);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!("closed MIDI output");
        }
    }

    fn send(&mut self, channel: u8, message: &MidiMessage) -> Result<(), DeviceError> {
        let connection = self.connection.as_mut().ok_or(DeviceError::NotConnected)?;
        match message.to_bytes(channel) {
            Some(bytes) => connection
                .send(bytes.as_bytes())
                .map_err(|e| DeviceError::Send(e.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel: u8,
    pub message: MidiMessage,
}

#[derive(Debug, Default)]
struct Recording {
    open: bool,
    sent: Vec<Sent>,
    opens: usize,
}

/// In-memory device that records everything sent to it. Clones share the
/// same recording, so a test can keep one while the sequencer owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingDevice {
    inner: Arc<Mutex<Recording>>,
    unavailable: bool,
    fail_after: Option<usize>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose `open` always fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// A device that rejects every send after the first `count`.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_len(&self) -> usize {
        self.inner.lock().sent.len()
    }

    pub fn clear(&self) {
        self.inner.lock().sent.clear();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().opens
    }
}

impl MidiDevice for RecordingDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.unavailable {
            return Err(DeviceError::NoPorts);
        }
        let mut inner = self.inner.lock();
        inner.open = true;
        inner.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().open = false;
    }

    fn send(&mut self, channel: u8, message: &MidiMessage) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(DeviceError::NotConnected);
        }
        if self.fail_after.is_some_and(|n| inner.sent.len() >= n) {
            return Err(DeviceError::Send("recording device refused message".to_string()));
        }
        inner.sent.push(Sent {
            channel,
            message: message.clone(),
        });
        Ok(())
    }
}
