// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport and initialization errors.

use core::fmt;
use std::io;

/// A transport operation failed.
#[derive(Debug)]
pub enum TransportError {
    /// The kernel or node returned an I/O error.
    Io(io::Error),
    /// A required object property was not found.
    MissingProperty {
        /// Kernel object id.
        object: u32,
        /// Property name.
        name: &'static str,
    },
    /// The device lacks a capability the composer needs.
    MissingCapability(&'static str),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "transport I/O error: {err}"),
            Self::MissingProperty { object, name } => {
                write!(f, "object {object} has no {name} property")
            }
            Self::MissingCapability(cap) => write!(f, "device lacks {cap}"),
        }
    }
}

impl core::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// The composer could not start. Fatal to the whole display subsystem.
#[derive(Debug)]
pub enum InitError {
    /// No device node qualified as a KMS device.
    NoUsableDevice,
    /// No connector can serve as the primary display.
    NoPrimaryDisplay,
    /// A worker thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUsableDevice => f.write_str("no usable KMS device found"),
            Self::NoPrimaryDisplay => f.write_str("no primary display candidate"),
            Self::Spawn(err) => write!(f, "failed to spawn worker thread: {err}"),
        }
    }
}

impl core::error::Error for InitError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}
