// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! An output stream that can be opened, closed and reopened around one engine.

use std::fmt;

use tracing::{info, warn};

use super::callback::{Callback, SharedCallback};
use super::error::OutputError;
use super::Output;
use crate::config;

/// Owns the engine callback and whichever output is currently driving it.
pub struct Stream {
    config: config::Audio,
    callback: SharedCallback,
    output: Option<Box<dyn Output>>,
}

impl Stream {
    /// Creates a closed stream. Nothing is rendered until [`Stream::start`].
    pub fn new(config: config::Audio, callback: Callback) -> Stream {
        Stream {
            config,
            callback: SharedCallback::new(callback),
            output: None,
        }
    }

    /// Opens the configured output and starts it. Does nothing if it's
    /// already running.
    pub fn start(&mut self) -> Result<(), OutputError> {
        if self.is_running() {
            return Ok(());
        }
        // A stream that stopped itself still has to be closed.
        self.stop();

        let output = super::open_output(&self.config, self.callback.clone())?;
        info!(output = %output, "Stream started");
        self.output = Some(output);
        Ok(())
    }

    /// Stops and closes the output. The engine keeps its voices.
    pub fn stop(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
            info!(output = %output, "Stream stopped");
        }
    }

    /// Opens and starts the stream if it isn't running. Returns true if it
    /// had to.
    pub fn ensure_running(&mut self) -> Result<bool, OutputError> {
        if self.is_running() {
            return Ok(false);
        }
        if self.output.is_some() {
            warn!("Stream stopped on its own, restarting");
        }
        self.start()?;
        Ok(true)
    }

    /// True while an output is open, running or not.
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.output.as_ref().is_some_and(|output| output.is_running())
    }

    pub fn config(&self) -> &config::Audio {
        &self.config
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}", output),
            None => write!(f, "{} (closed)", self.config.device()),
        }
    }
}
