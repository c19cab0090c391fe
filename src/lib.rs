/*
 Copyright (c) 2026 the driftloop authors

 This file is part of driftloop

 driftloop is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 driftloop is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with driftloop. If not, see <https://www.gnu.org/licenses/>.
*/

use core::fmt;
use std::process::{ExitCode, Termination};

use log::error;

pub mod aligned;
pub mod analyze;
pub mod backend;
pub mod backend_alsa;
pub mod config;
pub mod control;
pub mod convert;
pub mod logger;
pub mod loopback;
pub mod math;
pub mod priority;
pub mod resampler;
pub mod signals;
pub mod timer;

pub use config::Config;
pub use resampler::Resampler;

#[derive(Debug)]
pub enum Error {
    /// Bad command line or option combination; reported before anything runs.
    Config(String),
    /// The audio backend rejected an open/negotiate/start request, or an
    /// xrun could not be recovered.
    Device(String),
    /// Everything else (timer setup, allocation, ...).
    Message(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "{}", msg),
            Error::Device(msg) => write!(f, "{}", msg),
            Error::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Message(err.to_string())
    }
}

impl From<alsa::Error> for Error {
    fn from(err: alsa::Error) -> Self {
        Error::Device(err.to_string())
    }
}

pub struct TermResult(pub Result<()>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}
