//! # cellforge Core
//!
//! Shared types and utilities for configuring single-cell biophysical models.
//!
//! ## Pipeline
//!
//! | Stage | Crate | Input |
//! |-------|-------|-------|
//! | Morphology | `cellforge-swc` | SWC reconstruction |
//! | Sections & mechanisms | `cellforge-neuron` | engine catalog |
//! | Calibration | `cellforge-allen` | fitted parameter tables |
//!
//! ## Design Philosophy
//!
//! 1. Preserve the values and topology of the published model exactly
//! 2. Pass the engine explicitly, never through process-wide state
//! 3. Keep calibration as data, not code

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common errors
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Unknown mechanism: {0}")]
    UnknownMechanism(String),

    #[error("Mechanism {mechanism} is not inserted in section {section}")]
    MechanismNotInserted { section: String, mechanism: String },

    #[error("Unknown attribute {attribute} for section {section}")]
    UnknownAttribute { section: String, attribute: String },

    #[error("No mechanism in section {section} uses ion {ion}")]
    IonNotPresent { section: String, ion: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Morphology error: {0}")]
    Morphology(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

/// Voltage (mV)
pub type Voltage = f64;

/// Length (um)
pub type Length = f64;

/// Conductance density (S/cm^2)
pub type Conductance = f64;

/// Specific membrane capacitance (uF/cm^2)
pub type Capacitance = f64;

/// Axial resistivity (ohm-cm)
pub type Resistivity = f64;

/// Spatial translation applied to loaded geometry (um)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: Length,
    pub y: Length,
    pub z: Length,
}

impl Offset {
    pub fn new(x: Length, y: Length, z: Length) -> Self {
        Self { x, y, z }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}
