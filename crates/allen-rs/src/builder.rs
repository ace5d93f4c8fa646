//! Cell construction: morphology, axon stub, mechanisms, discretization,
//! parameters. Each step works on the structure left by the previous one.

use crate::parameters::{ModelMechanisms, ModelParameters};
use crate::MODEL_ID;
use cellforge_core::{ForgeError, Length, Offset, Result};
use cellforge_neuron::{Cell, Engine, Group};
use cellforge_swc::{LoadOptions, Morphology};
use std::path::Path;
use tracing::info;

/// Length of each axon stub section (um)
pub const AXON_STUB_LENGTH: Length = 30.0;

/// Diameter of each axon stub section (um)
pub const AXON_STUB_DIAM: Length = 1.0;

/// Target spatial resolution for `nseg` (um)
pub const SEGMENT_LENGTH: Length = 40.0;

/// Odd segment count for a section of the given length
pub fn nseg_for_length(length: Length) -> Result<usize> {
    if !length.is_finite() || length < 0.0 {
        return Err(ForgeError::InvalidGeometry(format!(
            "cannot discretize a section of length {}",
            length
        )));
    }

    // `as` saturates, so an absurd length surfaces in the checked ops
    let steps = (length / SEGMENT_LENGTH).floor() as usize;
    steps
        .checked_mul(2)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| {
            ForgeError::InvalidGeometry(format!(
                "section of length {} needs more segments than fit in usize",
                length
            ))
        })
}

/// Builds a fully parameterized cell from a morphology
pub struct CellBuilder<'a, E: Engine + ?Sized> {
    engine: &'a E,
    model: String,
    name: Option<String>,
    offset: Offset,
    mechanisms: ModelMechanisms,
    parameters: ModelParameters,
}

impl<'a, E: Engine + ?Sized> CellBuilder<'a, E> {
    /// Builder for model 472352327 with its calibrated tables
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            model: MODEL_ID.to_string(),
            name: None,
            offset: Offset::default(),
            mechanisms: ModelMechanisms::neuron_472352327(),
            parameters: ModelParameters::neuron_472352327(),
        }
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn mechanisms(mut self, mechanisms: ModelMechanisms) -> Self {
        self.mechanisms = mechanisms;
        self
    }

    pub fn parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Load the SWC file and build the cell
    pub fn build<P: AsRef<Path>>(&self, morphology: P) -> Result<Cell> {
        let morphology = Morphology::from_file(morphology)?;
        self.build_from(&morphology)
    }

    /// Build the cell from an already parsed morphology
    pub fn build_from(&self, morphology: &Morphology) -> Result<Cell> {
        let mut cell = Cell::new(&self.model, self.name.clone());

        // Reconstructed axons are replaced by the stub below
        let options = LoadOptions {
            use_axon: false,
            offset: self.offset,
        };
        morphology.instantiate(self.engine, &mut cell, &options)?;

        attach_axon_stub(self.engine, &mut cell)?;
        self.mechanisms.insert(self.engine, &mut cell)?;
        discretize(self.engine, &mut cell)?;
        self.parameters.apply(self.engine, &mut cell)?;

        info!(
            cell = %cell,
            sections = cell.len(),
            segments = cell.total_segments(),
            "built cell"
        );
        Ok(cell)
    }
}

/// Two-section axon stub hanging off the middle of the first soma section
pub fn attach_axon_stub<E: Engine + ?Sized>(engine: &E, cell: &mut Cell) -> Result<()> {
    let soma = *cell
        .group(Group::Soma)
        .first()
        .ok_or_else(|| ForgeError::SectionNotFound("soma[0]".into()))?;

    let mut stub = Vec::with_capacity(2);
    for i in 0..2 {
        let mut section = engine.new_section(&format!("axon[{}]", i));
        engine.set(&mut section, "L", AXON_STUB_LENGTH)?;
        engine.set(&mut section, "diam", AXON_STUB_DIAM)?;
        engine.set_nseg(&mut section, 1)?;
        stub.push(cell.add_section(Group::Axon, section)?);
    }

    cell.connect(stub[0], soma, 0.5)?;
    cell.connect(stub[1], stub[0], 1.0)?;
    Ok(())
}

/// Set `nseg` of every section from its length
pub fn discretize<E: Engine + ?Sized>(engine: &E, cell: &mut Cell) -> Result<()> {
    for id in cell.group(Group::All).to_vec() {
        let section = cell.section_mut(id)?;
        let nseg = nseg_for_length(section.length)?;
        engine.set_nseg(section, nseg)?;
    }
    Ok(())
}

/// Model 472352327, the way the published template constructs it
pub struct Neuron472352327;

impl Neuron472352327 {
    pub fn build<E: Engine + ?Sized, P: AsRef<Path>>(
        engine: &E,
        morphology: P,
        name: Option<String>,
        offset: Offset,
    ) -> Result<Cell> {
        CellBuilder::new(engine)
            .name(name)
            .offset(offset)
            .build(morphology)
    }
}
