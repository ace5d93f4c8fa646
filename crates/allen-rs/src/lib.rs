//! # ALLEN-RS
//!
//! Allen Cell Types Database biophysical model 472352327
//! (Htr3a-Cre interneuron, all-active fit).
//!
//! The Allen Institute publishes each fitted model as a morphology plus a
//! table of calibrated parameters. This crate rebuilds the cell from those
//! two inputs:
//!
//! 1. Load the SWC reconstruction, dropping its axon
//! 2. Attach a standard two-section axon stub (30 um x 1 um each)
//! 3. Insert `pas` everywhere and the active channels on the soma
//! 4. Discretize with `nseg = 1 + 2 * floor(L / 40)`
//! 5. Apply the fitted parameter tables
//!
//! The returned [`Cell`](cellforge_neuron::Cell) is ready for an engine to
//! simulate; nothing here integrates equations.

pub mod builder;
pub mod mechanisms;
pub mod parameters;

pub use builder::{attach_axon_stub, discretize, nseg_for_length, CellBuilder, Neuron472352327};
pub use parameters::{GlobalParameters, GroupParameters, ModelMechanisms, ModelParameters};

/// Model identifier; `<MODEL_ID>_instance` labels unnamed cells
pub const MODEL_ID: &str = "Neuron472352327";

/// Reconstruction the published model was fitted on
pub const MORPHOLOGY_FILE: &str = "Htr3a-Cre_NO152_Ai14_IVSCC_-175482.03.02.01_475124358_m.swc";
