//! # NEURON-RS
//!
//! NEURON-style cell configuration in Rust.
//!
//! NEURON (Hines & Moore, Yale) describes a cell as a tree of unbranched
//! cable sections with membrane mechanisms inserted into them. This crate
//! models that configuration surface only: numerical integration of the
//! cable equation and mechanism kinetics stay with the simulation engine.
//!
//! ## Components
//!
//! 1. **Sections**: cable segments (soma, dendrite, axon) with geometry
//! 2. **Cells**: section arenas with named groups and tree topology
//! 3. **Mechanism catalog**: what the engine knows how to insert
//! 4. **Engine**: explicit handle used to create sections, insert
//!    mechanisms and assign parameters
//!
//! ## Attribute naming
//!
//! Attributes follow NEURON's conventions: `L`, `diam`, `Ra`, `cm`,
//! ion reversal potentials (`ena`, `ek`, `eca`) and mechanism RANGE
//! variables as `<parameter>_<mechanism>` (e.g. `gbar_NaV`, `e_pas`).

use cellforge_core::{Capacitance, ForgeError, Length, Offset, Resistivity, Result, Voltage};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

// =============================================================================
// IONS & MECHANISMS
// =============================================================================

/// Ion species whose reversal potential is a section variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ion {
    Na,
    K,
    Ca,
}

impl Ion {
    pub const ALL: [Ion; 3] = [Ion::Na, Ion::K, Ion::Ca];

    pub fn name(&self) -> &'static str {
        match self {
            Ion::Na => "na",
            Ion::K => "k",
            Ion::Ca => "ca",
        }
    }

    /// Section attribute holding the reversal potential (`ena`, `ek`, `eca`)
    pub fn reversal_attribute(&self) -> &'static str {
        match self {
            Ion::Na => "ena",
            Ion::K => "ek",
            Ion::Ca => "eca",
        }
    }

    pub fn from_reversal_attribute(attribute: &str) -> Option<Ion> {
        Self::ALL
            .into_iter()
            .find(|ion| ion.reversal_attribute() == attribute)
    }

    /// NEURON's global default reversal potential (mV)
    pub fn default_reversal(&self) -> Voltage {
        match self {
            Ion::Na => 50.0,
            Ion::K => -77.0,
            Ion::Ca => 132.457_934_172_202_6,
        }
    }
}

/// Declaration of an insertable density mechanism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismSpec {
    pub name: String,
    /// RANGE parameters and their defaults, in declaration order
    pub parameters: Vec<(String, f64)>,
    /// Ions read or written by the mechanism
    pub ions: Vec<Ion>,
}

impl MechanismSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: Vec::new(),
            ions: Vec::new(),
        }
    }

    /// Declare a RANGE parameter with its default value
    pub fn parameter(mut self, name: &str, default: f64) -> Self {
        self.parameters.push((name.to_string(), default));
        self
    }

    /// Declare use of an ion
    pub fn uses(mut self, ion: Ion) -> Self {
        if !self.ions.contains(&ion) {
            self.ions.push(ion);
        }
        self
    }

    /// Create a fresh instance with default parameter values
    pub fn instantiate(&self) -> InsertedMechanism {
        InsertedMechanism {
            name: self.name.clone(),
            parameters: self.parameters.iter().cloned().collect(),
            ions: self.ions.clone(),
        }
    }
}

/// An inserted mechanism instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedMechanism {
    pub name: String,
    pub parameters: BTreeMap<String, f64>,
    pub ions: Vec<Ion>,
}

impl InsertedMechanism {
    pub fn get(&self, parameter: &str) -> Option<f64> {
        self.parameters.get(parameter).copied()
    }
}

/// Mechanisms an engine knows how to insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanismCatalog {
    specs: BTreeMap<String, MechanismSpec>,
}

impl MechanismCatalog {
    /// Catalog with NEURON's builtin density mechanisms
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.register(mechanisms::pas());
        catalog
    }

    pub fn empty() -> Self {
        Self {
            specs: BTreeMap::new(),
        }
    }

    /// Register a mechanism, replacing any previous one with the same name
    pub fn register(&mut self, spec: MechanismSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&MechanismSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MechanismSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for MechanismCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<MechanismSpec> for MechanismCatalog {
    fn extend<T: IntoIterator<Item = MechanismSpec>>(&mut self, iter: T) {
        for spec in iter {
            self.register(spec);
        }
    }
}

/// Builtin NEURON mechanisms
pub mod mechanisms {
    use super::*;

    /// Passive (leak) channel
    pub fn pas() -> MechanismSpec {
        MechanismSpec::new("pas")
            .parameter("g", 0.001) // S/cm^2
            .parameter("e", -70.0) // mV
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Index of a section inside its cell
pub type SectionId = usize;

/// Columns of a section's 3-D point matrix
pub const POINT_COLUMNS: usize = 4;

/// Attachment of a section's child end to a location on its parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub parent: SectionId,
    /// Relative position along the parent (0-1)
    pub parent_x: f64,
    /// End of the child that attaches (0 or 1)
    pub child_x: f64,
}

/// A NEURON section (cable segment)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Number of segments
    pub nseg: usize,
    /// Length (um)
    pub length: Length,
    /// Diameter (um)
    pub diam: Length,
    /// Axial resistance (ohm-cm)
    pub ra: Resistivity,
    /// Membrane capacitance (uF/cm^2)
    pub cm: Capacitance,
    /// Inserted mechanisms, in insertion order
    pub mechanisms: Vec<InsertedMechanism>,
    /// Ion reversal potentials keyed by attribute (`ena`, `ek`, ...)
    pub ions: BTreeMap<String, Voltage>,
    /// 3-D points, one row per point: x, y, z, diam (um)
    pub points: Array2<f64>,
    /// Parent section and location
    pub parent: Option<Connection>,
    /// Children sections
    pub children: Vec<SectionId>,
}

impl Section {
    /// Create a new section with NEURON's default properties
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nseg: 1,
            length: 100.0, // um
            diam: 500.0,   // um
            ra: 35.4,      // ohm-cm
            cm: 1.0,       // uF/cm^2
            mechanisms: Vec::new(),
            ions: BTreeMap::new(),
            points: Array2::zeros((0, POINT_COLUMNS)),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Replace the 3-D points; length and diameter follow the new shape
    pub fn set_points(&mut self, points: Array2<f64>) -> Result<()> {
        if points.ncols() != POINT_COLUMNS {
            return Err(ForgeError::InvalidGeometry(format!(
                "{}: expected {} point columns, got {}",
                self.name,
                POINT_COLUMNS,
                points.ncols()
            )));
        }
        if points.nrows() < 2 {
            return Err(ForgeError::InvalidGeometry(format!(
                "{}: a section needs at least two 3-D points",
                self.name
            )));
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(ForgeError::InvalidGeometry(format!(
                "{}: non-finite 3-D point",
                self.name
            )));
        }

        self.points = points;
        self.length = self.arc_length();
        self.diam = self
            .points
            .column(3)
            .mean()
            .unwrap_or(self.diam);
        Ok(())
    }

    /// Path length through the 3-D points (um)
    pub fn arc_length(&self) -> Length {
        let rows: Vec<_> = self.points.axis_iter(Axis(0)).collect();
        rows.windows(2)
            .map(|pair| {
                let dx = pair[1][0] - pair[0][0];
                let dy = pair[1][1] - pair[0][1];
                let dz = pair[1][2] - pair[0][2];
                (dx * dx + dy * dy + dz * dz).sqrt()
            })
            .sum()
    }

    pub fn has_points(&self) -> bool {
        self.points.nrows() > 0
    }

    /// Translate the 3-D points
    pub fn translate(&mut self, offset: Offset) {
        if offset.is_zero() {
            return;
        }
        for (column, delta) in [offset.x, offset.y, offset.z].into_iter().enumerate() {
            let mut values = self.points.column_mut(column);
            values += delta;
        }
    }

    pub fn has_mechanism(&self, name: &str) -> bool {
        self.mechanisms.iter().any(|m| m.name == name)
    }

    pub fn mechanism(&self, name: &str) -> Option<&InsertedMechanism> {
        self.mechanisms.iter().find(|m| m.name == name)
    }

    pub fn mechanism_names(&self) -> impl Iterator<Item = &str> {
        self.mechanisms.iter().map(|m| m.name.as_str())
    }

    /// Whether any inserted mechanism uses the ion
    pub fn uses_ion(&self, ion: Ion) -> bool {
        self.mechanisms.iter().any(|m| m.ions.contains(&ion))
    }

    /// Read an attribute by its NEURON name
    pub fn get(&self, attribute: &str) -> Option<f64> {
        match attribute {
            "L" => Some(self.length),
            "diam" => Some(self.diam),
            "Ra" => Some(self.ra),
            "cm" => Some(self.cm),
            "nseg" => Some(self.nseg as f64),
            _ => {
                if let Some(value) = self.ions.get(attribute) {
                    return Some(*value);
                }
                let (index, parameter) = self.resolve_range(attribute)?;
                self.mechanisms[index].get(parameter)
            }
        }
    }

    /// Find the inserted mechanism a `<parameter>_<mechanism>` name refers to
    fn resolve_range<'a>(&self, attribute: &'a str) -> Option<(usize, &'a str)> {
        self.mechanisms
            .iter()
            .enumerate()
            .filter_map(|(index, m)| {
                attribute
                    .strip_suffix(m.name.as_str())
                    .and_then(|rest| rest.strip_suffix('_'))
                    .filter(|parameter| !parameter.is_empty())
                    .map(|parameter| (index, parameter, m.name.len()))
            })
            .max_by_key(|(_, _, len)| *len)
            .map(|(index, parameter, _)| (index, parameter))
    }

    /// Lateral membrane area of the section (um^2)
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.diam * self.length
    }
}

// =============================================================================
// CELL
// =============================================================================

/// Anatomical section groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Soma,
    Dend,
    Axon,
    /// Union of every other group
    All,
}

impl Group {
    pub fn name(&self) -> &'static str {
        match self {
            Group::Soma => "soma",
            Group::Dend => "dend",
            Group::Axon => "axon",
            Group::All => "all",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A configured cell: section arena plus named groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Model identifier, used for the fallback label
    model: String,
    /// Instance name
    name: Option<String>,
    sections: Vec<Section>,
    soma: Vec<SectionId>,
    dend: Vec<SectionId>,
    axon: Vec<SectionId>,
    all: Vec<SectionId>,
}

impl Cell {
    /// Create a new, empty cell
    pub fn new(model: &str, name: Option<String>) -> Self {
        Self {
            model: model.to_string(),
            name,
            sections: Vec::new(),
            soma: Vec::new(),
            dend: Vec::new(),
            axon: Vec::new(),
            all: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Add a section to a group; it is appended to `all` as well
    pub fn add_section(&mut self, group: Group, section: Section) -> Result<SectionId> {
        if self.find(&section.name).is_some() {
            return Err(ForgeError::Topology(format!(
                "duplicate section name {}",
                section.name
            )));
        }

        let id = self.sections.len();
        let members = match group {
            Group::Soma => &mut self.soma,
            Group::Dend => &mut self.dend,
            Group::Axon => &mut self.axon,
            Group::All => {
                return Err(ForgeError::Topology(format!(
                    "section {} must belong to an anatomical group",
                    section.name
                )))
            }
        };
        members.push(id);
        self.all.push(id);
        debug!(section = %section.name, group = %group, "created section");
        self.sections.push(section);
        Ok(id)
    }

    /// Section ids of a group, in insertion order
    pub fn group(&self, group: Group) -> &[SectionId] {
        match group {
            Group::Soma => &self.soma,
            Group::Dend => &self.dend,
            Group::Axon => &self.axon,
            Group::All => &self.all,
        }
    }

    pub fn section(&self, id: SectionId) -> Result<&Section> {
        self.sections
            .get(id)
            .ok_or_else(|| ForgeError::SectionNotFound(format!("#{}", id)))
    }

    pub fn section_mut(&mut self, id: SectionId) -> Result<&mut Section> {
        self.sections
            .get_mut(id)
            .ok_or_else(|| ForgeError::SectionNotFound(format!("#{}", id)))
    }

    /// Look up a section by name
    pub fn find(&self, name: &str) -> Option<SectionId> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Sections of a group with their ids
    pub fn sections(&self, group: Group) -> impl Iterator<Item = (SectionId, &Section)> {
        self.group(group).iter().map(|&id| (id, &self.sections[id]))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Connect the 0-end of `child` to `parent(parent_x)`
    pub fn connect(&mut self, child: SectionId, parent: SectionId, parent_x: f64) -> Result<()> {
        self.section(child)?;
        self.section(parent)?;

        if !(0.0..=1.0).contains(&parent_x) {
            return Err(ForgeError::Topology(format!(
                "connection location {} outside [0, 1]",
                parent_x
            )));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(ForgeError::Topology(format!(
                "connecting {} to {} would create a loop",
                self.sections[child].name, self.sections[parent].name
            )));
        }

        // Reconnecting replaces the previous parent
        if let Some(old) = self.sections[child].parent.take() {
            self.sections[old.parent].children.retain(|&c| c != child);
        }

        self.sections[child].parent = Some(Connection {
            parent,
            parent_x,
            child_x: 0.0,
        });
        if !self.sections[parent].children.contains(&child) {
            self.sections[parent].children.push(child);
        }

        debug!(
            child = %self.sections[child].name,
            parent = %self.sections[parent].name,
            parent_x,
            "connected"
        );
        Ok(())
    }

    /// Whether `ancestor` lies on the path from `id` to the root
    pub fn is_ancestor(&self, ancestor: SectionId, id: SectionId) -> bool {
        let mut current = self.sections.get(id).and_then(|s| s.parent);
        while let Some(connection) = current {
            if connection.parent == ancestor {
                return true;
            }
            current = self.sections[connection.parent].parent;
        }
        false
    }

    /// Translate every section's 3-D points
    pub fn translate(&mut self, offset: Offset) {
        for section in &mut self.sections {
            section.translate(offset);
        }
    }

    /// Get total number of segments
    pub fn total_segments(&self) -> usize {
        self.sections.iter().map(|s| s.nseg).sum()
    }

    /// Total lateral membrane area (um^2)
    pub fn total_area(&self) -> f64 {
        self.sections.iter().map(Section::area).sum()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}_instance", self.model),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Explicit handle to the simulation engine's configuration surface
///
/// Construction code receives the engine as an argument; there is no
/// process-wide engine state. Implementors supply the catalog, the
/// provided methods implement NEURON's insertion and attribute rules.
pub trait Engine {
    /// Mechanisms available for insertion
    fn catalog(&self) -> &MechanismCatalog;

    /// Create a section with the engine's defaults
    fn new_section(&self, name: &str) -> Section {
        Section::new(name)
    }

    /// Insert a density mechanism; inserting twice is a no-op
    fn insert(&self, section: &mut Section, mechanism: &str) -> Result<()> {
        if section.has_mechanism(mechanism) {
            return Ok(());
        }
        let spec = self
            .catalog()
            .get(mechanism)
            .ok_or_else(|| ForgeError::UnknownMechanism(mechanism.to_string()))?;

        section.mechanisms.push(spec.instantiate());
        for ion in &spec.ions {
            section
                .ions
                .entry(ion.reversal_attribute().to_string())
                .or_insert_with(|| ion.default_reversal());
        }
        debug!(section = %section.name, mechanism, "inserted");
        Ok(())
    }

    /// Assign an attribute by its NEURON name
    fn set(&self, section: &mut Section, attribute: &str, value: f64) -> Result<()> {
        match attribute {
            "L" | "diam" => {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ForgeError::InvalidGeometry(format!(
                        "{}.{} = {}",
                        section.name, attribute, value
                    )));
                }
                if attribute == "L" {
                    section.length = value;
                } else {
                    section.diam = value;
                }
            }
            "Ra" => section.ra = value,
            "cm" => section.cm = value,
            _ => {
                if let Some(ion) = Ion::from_reversal_attribute(attribute) {
                    if !section.uses_ion(ion) {
                        return Err(ForgeError::IonNotPresent {
                            section: section.name.clone(),
                            ion: ion.name().to_string(),
                        });
                    }
                    section.ions.insert(attribute.to_string(), value);
                    return Ok(());
                }

                let Some((index, parameter)) = section.resolve_range(attribute) else {
                    return Err(self.unresolved(section, attribute));
                };
                let mechanism = &mut section.mechanisms[index];
                match mechanism.parameters.get_mut(parameter) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(ForgeError::UnknownAttribute {
                            section: section.name.clone(),
                            attribute: attribute.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Set the number of segments
    fn set_nseg(&self, section: &mut Section, nseg: usize) -> Result<()> {
        if nseg == 0 {
            return Err(ForgeError::InvalidGeometry(format!(
                "{}.nseg must be positive",
                section.name
            )));
        }
        section.nseg = nseg;
        Ok(())
    }

    /// Error for an attribute no inserted mechanism declares
    fn unresolved(&self, section: &Section, attribute: &str) -> ForgeError {
        let known = self.catalog().names().find(|name| {
            attribute
                .strip_suffix(name)
                .is_some_and(|rest| rest.ends_with('_'))
        });
        match known {
            Some(mechanism) => ForgeError::MechanismNotInserted {
                section: section.name.clone(),
                mechanism: mechanism.to_string(),
            },
            None => ForgeError::UnknownAttribute {
                section: section.name.clone(),
                attribute: attribute.to_string(),
            },
        }
    }
}

/// In-process engine with NEURON's defaults and an extensible catalog
#[derive(Debug, Clone, Default)]
pub struct NeuronEngine {
    catalog: MechanismCatalog,
}

impl NeuronEngine {
    pub fn new() -> Self {
        Self {
            catalog: MechanismCatalog::new(),
        }
    }

    /// Engine whose catalog also contains `mechanisms`
    pub fn with_mechanisms<I: IntoIterator<Item = MechanismSpec>>(mechanisms: I) -> Self {
        let mut engine = Self::new();
        engine.catalog.extend(mechanisms);
        engine
    }
}

impl Engine for NeuronEngine {
    fn catalog(&self) -> &MechanismCatalog {
        &self.catalog
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn na_channel() -> MechanismSpec {
        MechanismSpec::new("NaV").parameter("gbar", 0.0).uses(Ion::Na)
    }

    #[test]
    fn test_create_cell() {
        let mut cell = Cell::new("pyramidal", None);
        cell.add_section(Group::Soma, Section::new("soma[0]")).unwrap();
        cell.add_section(Group::Axon, Section::new("axon[0]")).unwrap();
        cell.add_section(Group::Dend, Section::new("dend[0]")).unwrap();

        assert_eq!(cell.len(), 3);
        assert_eq!(cell.group(Group::All), &[0, 1, 2]);
        assert_eq!(cell.group(Group::Dend), &[2]);
    }

    #[test]
    fn test_add_section_rejects_all_group_and_duplicates() {
        let mut cell = Cell::new("test", None);
        assert!(cell.add_section(Group::All, Section::new("soma[0]")).is_err());

        cell.add_section(Group::Soma, Section::new("soma[0]")).unwrap();
        let err = cell.add_section(Group::Dend, Section::new("soma[0]")).unwrap_err();
        assert!(matches!(err, ForgeError::Topology(_)));
        assert_eq!(cell.group(Group::All).len(), 1);
    }

    #[test]
    fn test_connect_sections() {
        let mut cell = Cell::new("test", None);
        let soma = cell.add_section(Group::Soma, Section::new("soma")).unwrap();
        let dend = cell.add_section(Group::Dend, Section::new("dend")).unwrap();

        cell.connect(dend, soma, 1.0).unwrap();

        let connection = cell.section(dend).unwrap().parent.unwrap();
        assert_eq!(connection.parent, soma);
        assert_eq!(connection.parent_x, 1.0);
        assert_eq!(connection.child_x, 0.0);
        assert_eq!(cell.section(soma).unwrap().children, vec![dend]);
    }

    #[test]
    fn test_connect_rejects_loops_and_bad_locations() {
        let mut cell = Cell::new("test", None);
        let a = cell.add_section(Group::Soma, Section::new("a")).unwrap();
        let b = cell.add_section(Group::Dend, Section::new("b")).unwrap();
        let c = cell.add_section(Group::Dend, Section::new("c")).unwrap();
        cell.connect(b, a, 0.5).unwrap();
        cell.connect(c, b, 1.0).unwrap();

        assert!(cell.connect(a, c, 1.0).is_err());
        assert!(cell.connect(a, a, 0.5).is_err());
        assert!(cell.connect(c, a, 1.5).is_err());
        assert!(cell.connect(c, 42, 1.0).is_err());
    }

    #[test]
    fn test_reconnect_moves_child() {
        let mut cell = Cell::new("test", None);
        let a = cell.add_section(Group::Soma, Section::new("a")).unwrap();
        let b = cell.add_section(Group::Dend, Section::new("b")).unwrap();
        let c = cell.add_section(Group::Dend, Section::new("c")).unwrap();
        cell.connect(c, a, 0.5).unwrap();
        cell.connect(c, b, 1.0).unwrap();

        assert!(cell.section(a).unwrap().children.is_empty());
        assert_eq!(cell.section(b).unwrap().children, vec![c]);
    }

    #[test]
    fn test_insert_mechanism() {
        let engine = NeuronEngine::with_mechanisms([na_channel()]);
        let mut soma = engine.new_section("soma");
        engine.insert(&mut soma, "pas").unwrap();
        engine.insert(&mut soma, "NaV").unwrap();
        engine.insert(&mut soma, "pas").unwrap();

        assert_eq!(soma.mechanisms.len(), 2);
        assert_eq!(soma.get("ena"), Some(50.0));
        assert_eq!(soma.get("g_pas"), Some(0.001));
    }

    #[test]
    fn test_insert_unknown_mechanism_fails() {
        let engine = NeuronEngine::new();
        let mut soma = engine.new_section("soma");
        let err = engine.insert(&mut soma, "hh2").unwrap_err();
        assert!(matches!(err, ForgeError::UnknownMechanism(name) if name == "hh2"));
    }

    #[test]
    fn test_set_attributes() {
        let engine = NeuronEngine::with_mechanisms([na_channel()]);
        let mut soma = engine.new_section("soma");
        engine.insert(&mut soma, "pas").unwrap();
        engine.insert(&mut soma, "NaV").unwrap();

        engine.set(&mut soma, "Ra", 67.11).unwrap();
        engine.set(&mut soma, "cm", 2.3).unwrap();
        engine.set(&mut soma, "e_pas", -87.0).unwrap();
        engine.set(&mut soma, "gbar_NaV", 0.066).unwrap();
        engine.set(&mut soma, "ena", 53.0).unwrap();

        assert_eq!(soma.get("Ra"), Some(67.11));
        assert_eq!(soma.get("cm"), Some(2.3));
        assert_eq!(soma.mechanism("pas").unwrap().get("e"), Some(-87.0));
        assert_eq!(soma.get("gbar_NaV"), Some(0.066));
        assert_eq!(soma.get("ena"), Some(53.0));
    }

    #[test]
    fn test_set_errors() {
        let engine = NeuronEngine::with_mechanisms([na_channel()]);
        let mut dend = engine.new_section("dend");
        engine.insert(&mut dend, "pas").unwrap();

        assert!(matches!(
            engine.set(&mut dend, "gbar_NaV", 1.0),
            Err(ForgeError::MechanismNotInserted { .. })
        ));
        assert!(matches!(
            engine.set(&mut dend, "ena", 53.0),
            Err(ForgeError::IonNotPresent { .. })
        ));
        assert!(matches!(
            engine.set(&mut dend, "tau_pas", 1.0),
            Err(ForgeError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            engine.set(&mut dend, "L", -1.0),
            Err(ForgeError::InvalidGeometry(_))
        ));
        assert!(engine.set_nseg(&mut dend, 0).is_err());
    }

    #[test]
    fn test_underscored_mechanism_names_resolve() {
        let engine = NeuronEngine::with_mechanisms([
            MechanismSpec::new("Kv3_1").parameter("gbar", 0.0).uses(Ion::K),
            MechanismSpec::new("K_T").parameter("gbar", 0.0).uses(Ion::K),
        ]);
        let mut soma = engine.new_section("soma");
        engine.insert(&mut soma, "Kv3_1").unwrap();
        engine.insert(&mut soma, "K_T").unwrap();

        engine.set(&mut soma, "gbar_Kv3_1", 0.168562).unwrap();
        engine.set(&mut soma, "gbar_K_T", 0.000140197).unwrap();

        assert_eq!(soma.mechanism("Kv3_1").unwrap().get("gbar"), Some(0.168562));
        assert_eq!(soma.mechanism("K_T").unwrap().get("gbar"), Some(0.000140197));
    }

    #[test]
    fn test_section_points() {
        let mut sec = Section::new("dend");
        sec.set_points(array![
            [0.0, 0.0, 0.0, 2.0],
            [3.0, 4.0, 0.0, 2.0],
            [3.0, 4.0, 10.0, 1.0],
        ])
        .unwrap();

        assert!((sec.length - 15.0).abs() < 1e-12);
        assert!((sec.diam - 5.0 / 3.0).abs() < 1e-12);

        sec.translate(Offset::new(10.0, 0.0, -1.0));
        assert_eq!(sec.points[[0, 0]], 10.0);
        assert_eq!(sec.points[[2, 2]], 9.0);
        assert_eq!(sec.points[[1, 3]], 2.0);

        assert!(sec.set_points(array![[0.0, 0.0, 0.0, 1.0]]).is_err());
    }

    #[test]
    fn test_translate_by_zero_keeps_points() {
        let mut sec = Section::new("soma");
        sec.set_points(array![[-0.0, 1.5, -2.0, 4.0], [0.0, 3.5, -2.0, 4.0]]).unwrap();
        let before = sec.points.clone();

        sec.translate(Offset::default());
        assert_eq!(sec.points, before);
        // -0.0 + 0.0 would flip the sign bit
        assert!(sec.points[[0, 0]].is_sign_negative());

        let mut bare = Section::new("axon[0]");
        bare.translate(Offset::new(1.0, 2.0, 3.0));
        assert!(!bare.has_points());
    }

    #[test]
    fn test_section_area() {
        let mut sec = Section::new("test");
        sec.length = 100.0; // um
        sec.diam = 10.0; // um

        let area = sec.area();
        // pi * 10 * 100 = ~3141.6 um^2
        assert!((area - 3141.59).abs() < 0.01);
    }

    #[test]
    fn test_display_falls_back_to_model_label() {
        assert_eq!(Cell::new("Model1", Some("X".into())).to_string(), "X");
        assert_eq!(Cell::new("Model1", None).to_string(), "Model1_instance");
    }
}
