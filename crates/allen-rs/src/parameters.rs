//! Calibrated parameter tables.
//!
//! The values are outputs of the Allen Institute's all-active fitting and
//! are applied verbatim. Each section group gets one record; a single
//! routine, [`ModelParameters::apply`], writes them through the engine.

use cellforge_core::{Capacitance, Conductance, Resistivity, Result, Voltage};
use cellforge_neuron::{Cell, Engine, Group};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Values assigned to every section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameters {
    /// Axial resistivity (ohm-cm)
    pub ra: Resistivity,
    /// Passive reversal potential (mV)
    pub e_pas: Voltage,
}

/// Values assigned to every section of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParameters {
    pub group: Group,
    /// Membrane capacitance (uF/cm^2)
    pub cm: Capacitance,
    /// Passive conductance density (S/cm^2)
    pub g_pas: Conductance,
    /// Ion reversal potentials by attribute (`ena`, `ek`)
    #[serde(default)]
    pub reversal: BTreeMap<String, Voltage>,
    /// Mechanism RANGE values as `<parameter>_<mechanism>`
    #[serde(default)]
    pub mechanisms: BTreeMap<String, f64>,
}

impl GroupParameters {
    pub fn new(group: Group, cm: Capacitance, g_pas: Conductance) -> Self {
        Self {
            group,
            cm,
            g_pas,
            reversal: BTreeMap::new(),
            mechanisms: BTreeMap::new(),
        }
    }

    pub fn reversal(mut self, attribute: &str, value: Voltage) -> Self {
        self.reversal.insert(attribute.to_string(), value);
        self
    }

    pub fn mechanism(mut self, attribute: &str, value: f64) -> Self {
        self.mechanisms.insert(attribute.to_string(), value);
        self
    }

    /// Every attribute assignment of the record
    pub fn assignments(&self) -> impl Iterator<Item = (&str, f64)> {
        [("cm", self.cm), ("g_pas", self.g_pas)]
            .into_iter()
            .chain(self.reversal.iter().map(|(k, v)| (k.as_str(), *v)))
            .chain(self.mechanisms.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

/// Complete calibration of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub global: GlobalParameters,
    pub groups: Vec<GroupParameters>,
}

impl ModelParameters {
    /// Fitted values for model 472352327
    pub fn neuron_472352327() -> Self {
        Self {
            global: GlobalParameters {
                ra: 67.11,
                e_pas: -87.4209747314,
            },
            groups: vec![
                GroupParameters::new(Group::Axon, 2.3, 0.000877965239702),
                GroupParameters::new(Group::Dend, 2.3, 2.38788417905e-05),
                GroupParameters::new(Group::Soma, 2.3, 5.72175e-05)
                    .reversal("ena", 53.0)
                    .reversal("ek", -107.0)
                    .mechanism("gbar_Ih", 0.000122653)
                    .mechanism("gbar_NaV", 0.0664205)
                    .mechanism("gbar_Kd", 5.30709e-05)
                    .mechanism("gbar_Kv2like", 2.04034e-05)
                    .mechanism("gbar_Kv3_1", 0.168562)
                    .mechanism("gbar_K_T", 0.000140197)
                    .mechanism("gbar_Im_v2", 0.00506731)
                    .mechanism("gbar_SK", 0.00011628)
                    .mechanism("gbar_Ca_HVA", 0.000337475)
                    .mechanism("gbar_Ca_LVA", 0.00891093)
                    .mechanism("gamma_CaDynamics", 0.037713)
                    .mechanism("decay_CaDynamics", 795.904),
            ],
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read an alternative calibration
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let parameters = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), "read parameter tables");
        Ok(parameters)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn group(&self, group: Group) -> Option<&GroupParameters> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// Write every table into the cell's sections
    pub fn apply<E: Engine + ?Sized>(&self, engine: &E, cell: &mut Cell) -> Result<()> {
        for id in cell.group(Group::All).to_vec() {
            let section = cell.section_mut(id)?;
            engine.set(section, "Ra", self.global.ra)?;
            engine.set(section, "e_pas", self.global.e_pas)?;
        }

        for record in &self.groups {
            let ids = cell.group(record.group).to_vec();
            for &id in &ids {
                let section = cell.section_mut(id)?;
                for (attribute, value) in record.assignments() {
                    engine.set(section, attribute, value)?;
                }
            }
            debug!(group = %record.group, sections = ids.len(), "assigned parameters");
        }
        Ok(())
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self::neuron_472352327()
    }
}

/// Mechanisms inserted per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMechanisms {
    /// Inserted into every section
    pub all: Vec<String>,
    #[serde(default)]
    pub soma: Vec<String>,
    #[serde(default)]
    pub dend: Vec<String>,
    #[serde(default)]
    pub axon: Vec<String>,
}

impl ModelMechanisms {
    /// Passive leak everywhere, the active set on the soma only
    pub fn neuron_472352327() -> Self {
        Self {
            all: names(&["pas"]),
            soma: names(&[
                "CaDynamics",
                "Ca_HVA",
                "Ca_LVA",
                "Ih",
                "Im_v2",
                "K_T",
                "Kd",
                "Kv2like",
                "Kv3_1",
                "NaV",
                "SK",
            ]),
            dend: Vec::new(),
            axon: Vec::new(),
        }
    }

    pub fn for_group(&self, group: Group) -> &[String] {
        match group {
            Group::All => &self.all,
            Group::Soma => &self.soma,
            Group::Dend => &self.dend,
            Group::Axon => &self.axon,
        }
    }

    /// Insert every listed mechanism into its group's sections
    pub fn insert<E: Engine + ?Sized>(&self, engine: &E, cell: &mut Cell) -> Result<()> {
        for group in [Group::All, Group::Soma, Group::Dend, Group::Axon] {
            let names = self.for_group(group);
            if names.is_empty() {
                continue;
            }
            for id in cell.group(group).to_vec() {
                let section = cell.section_mut(id)?;
                for name in names {
                    engine.insert(section, name)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for ModelMechanisms {
    fn default() -> Self {
        Self::neuron_472352327()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
