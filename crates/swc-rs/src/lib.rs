//! # SWC-RS
//!
//! Reader for SWC neuronal morphologies and loader into cellforge cells.
//!
//! ## Format
//!
//! One sample per line, seven whitespace-separated columns:
//!
//! ```text
//! # id type x y z radius parent
//! 1 1 0.0 0.0 0.0 5.0 -1
//! 2 3 0.0 5.0 0.0 1.0 1
//! ```
//!
//! Type codes follow the CNIC convention
//! (http://www.neuronland.org/NLMorphologyConverter/MorphologyFormats/SWC/Spec.html):
//! 0 undefined, 1 soma, 2 axon, 3 basal dendrite, 4 apical dendrite,
//! 5 fork point, 6 end point, 7+ custom.
//!
//! ## Sections
//!
//! The loader turns the sample tree into NEURON-style sections: all soma
//! samples form `soma[0]`; every other run of samples between branch points
//! becomes `dend[i]` or `axon[i]`. Reconstructed axons can be dropped at
//! load time.

use cellforge_core::{ForgeError, Length, Offset, Result};
use cellforge_neuron::{Cell, Engine, Group, SectionId, POINT_COLUMNS};
use ndarray::Array2;
use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

// =============================================================================
// SWC PARSER
// =============================================================================

/// SWC morphology parser
#[derive(Parser)]
#[grammar_inline = r##"
WHITESPACE = _{ " " | "\t" }
COMMENT = _{ "#" ~ (!NEWLINE ~ ANY)* }

id = @{ ASCII_DIGIT+ }
kind = @{ ASCII_DIGIT+ }
parent = @{ "-"? ~ ASCII_DIGIT+ }
number = @{
    ("-" | "+")? ~ (ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT*)? | "." ~ ASCII_DIGIT+)
    ~ (("e" | "E") ~ ("-" | "+")? ~ ASCII_DIGIT+)?
}

sample = { id ~ kind ~ number ~ number ~ number ~ number ~ parent }
file = { SOI ~ (sample? ~ NEWLINE)* ~ sample? ~ EOI }
"##]
pub struct SwcParser;

/// SWC structure identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SwcType {
    Undefined,
    Soma,
    Axon,
    BasalDendrite,
    ApicalDendrite,
    ForkPoint,
    EndPoint,
    Custom(u32),
}

impl From<u32> for SwcType {
    fn from(v: u32) -> Self {
        match v {
            0 => SwcType::Undefined,
            1 => SwcType::Soma,
            2 => SwcType::Axon,
            3 => SwcType::BasalDendrite,
            4 => SwcType::ApicalDendrite,
            5 => SwcType::ForkPoint,
            6 => SwcType::EndPoint,
            other => SwcType::Custom(other),
        }
    }
}

impl SwcType {
    pub fn code(&self) -> u32 {
        match self {
            SwcType::Undefined => 0,
            SwcType::Soma => 1,
            SwcType::Axon => 2,
            SwcType::BasalDendrite => 3,
            SwcType::ApicalDendrite => 4,
            SwcType::ForkPoint => 5,
            SwcType::EndPoint => 6,
            SwcType::Custom(code) => *code,
        }
    }

    /// Section group the sample is loaded into
    pub fn group(&self) -> Group {
        match self {
            SwcType::Soma => Group::Soma,
            SwcType::Axon => Group::Axon,
            _ => Group::Dend,
        }
    }
}

impl fmt::Display for SwcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwcType::Custom(code) => write!(f, "Custom({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One SWC line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: u64,
    pub kind: SwcType,
    pub x: Length,
    pub y: Length,
    pub z: Length,
    pub radius: Length,
    /// `None` for roots (negative parent in the file)
    pub parent: Option<u64>,
}

impl Sample {
    /// Point row: x, y, z, diam
    fn point(&self) -> [f64; POINT_COLUMNS] {
        [self.x, self.y, self.z, 2.0 * self.radius]
    }
}

/// A parsed and validated SWC tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Morphology {
    samples: Vec<Sample>,
    index: HashMap<u64, usize>,
}

impl Morphology {
    /// Parse SWC text
    pub fn parse(content: &str) -> Result<Self> {
        let file = SwcParser::parse(Rule::file, content)
            .map_err(|e| ForgeError::Parse(e.to_string()))?
            .next()
            .ok_or_else(|| ForgeError::Parse("empty SWC input".into()))?;

        let mut samples = Vec::new();
        for pair in file.into_inner() {
            if pair.as_rule() != Rule::sample {
                continue;
            }
            let line = pair.as_span().start_pos().line_col().0;
            let fields: Vec<&str> = pair.into_inner().map(|p| p.as_str()).collect();
            samples.push(parse_sample(line, &fields)?);
        }

        Self::from_samples(samples)
    }

    /// Read and parse an SWC file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let morphology = Self::parse(&content)?;
        info!(
            path = %path.display(),
            samples = morphology.len(),
            "read morphology"
        );
        Ok(morphology)
    }

    /// Build from samples, checking ids, parents and tree shape
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(ForgeError::Morphology("no samples".into()));
        }

        let mut index = HashMap::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            if index.insert(sample.id, i).is_some() {
                return Err(ForgeError::Morphology(format!("duplicate sample id {}", sample.id)));
            }
        }

        for sample in &samples {
            if let Some(parent) = sample.parent {
                if parent == sample.id {
                    return Err(ForgeError::Morphology(format!(
                        "sample {} is its own parent",
                        sample.id
                    )));
                }
                if !index.contains_key(&parent) {
                    return Err(ForgeError::Morphology(format!(
                        "sample {} references missing parent {}",
                        sample.id, parent
                    )));
                }
            }
        }

        let morphology = Self { samples, index };
        morphology.check_acyclic()?;

        if !morphology.samples.iter().any(|s| s.kind == SwcType::Soma) {
            return Err(ForgeError::Morphology("no soma samples".into()));
        }
        Ok(morphology)
    }

    /// Every sample must reach a root by following parents
    fn check_acyclic(&self) -> Result<()> {
        let mut rooted: HashSet<u64> = HashSet::new();
        for sample in &self.samples {
            let mut path = Vec::new();
            let mut current = Some(sample);
            while let Some(s) = current {
                if rooted.contains(&s.id) {
                    break;
                }
                if path.contains(&s.id) {
                    return Err(ForgeError::Morphology(format!("cycle through sample {}", s.id)));
                }
                path.push(s.id);
                current = s.parent.map(|p| &self.samples[self.index[&p]]);
            }
            rooted.extend(path);
        }
        Ok(())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn get(&self, id: u64) -> Option<&Sample> {
        self.index.get(&id).map(|&i| &self.samples[i])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample counts per type
    pub fn type_counts(&self) -> BTreeMap<SwcType, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Child sample indices, in file order
    fn children(&self) -> HashMap<u64, Vec<usize>> {
        let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, sample) in self.samples.iter().enumerate() {
            if let Some(parent) = sample.parent {
                children.entry(parent).or_default().push(i);
            }
        }
        children
    }

    /// Number of samples in the subtree rooted at `start`
    fn subtree_size(&self, start: usize, children: &HashMap<u64, Vec<usize>>) -> usize {
        let mut stack = vec![start];
        let mut size = 0;
        while let Some(i) = stack.pop() {
            size += 1;
            if let Some(kids) = children.get(&self.samples[i].id) {
                stack.extend(kids.iter().copied());
            }
        }
        size
    }
}

fn parse_sample(line: usize, fields: &[&str]) -> Result<Sample> {
    let bad = |what: &str, value: &str| {
        ForgeError::Parse(format!("line {}: invalid {} '{}'", line, what, value))
    };
    let number = |i: usize, what: &str| -> Result<f64> {
        fields[i].parse::<f64>().map_err(|_| bad(what, fields[i]))
    };

    let id = fields[0].parse::<u64>().map_err(|_| bad("id", fields[0]))?;
    let kind = fields[1].parse::<u32>().map_err(|_| bad("type", fields[1]))?;
    let parent = fields[6].parse::<i64>().map_err(|_| bad("parent", fields[6]))?;
    let radius = number(5, "radius")?;
    if radius < 0.0 {
        return Err(bad("radius", fields[5]));
    }

    Ok(Sample {
        id,
        kind: SwcType::from(kind),
        x: number(2, "x")?,
        y: number(3, "y")?,
        z: number(4, "z")?,
        radius,
        parent: u64::try_from(parent).ok(),
    })
}

// =============================================================================
// LOADER
// =============================================================================

/// Options for turning a morphology into sections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Keep reconstructed axon samples
    pub use_axon: bool,
    /// Translation applied to every point
    pub offset: Offset,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_axon: true,
            offset: Offset::default(),
        }
    }
}

/// What the loader created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub soma: usize,
    pub dendrites: usize,
    pub axons: usize,
    /// Axon samples skipped because `use_axon` was off
    pub dropped_axon_samples: usize,
}

/// A section waiting to be built, starting at sample `start`
struct Pending {
    start: usize,
    /// Parent section and attachment location
    attach: Option<(SectionId, f64)>,
    /// Sample whose point opens the section
    lead: Option<usize>,
}

impl Morphology {
    /// Create the morphology's sections in `cell`.
    ///
    /// Sections are built on a copy of `cell` that replaces it only on
    /// success; on error `cell` is left as it was.
    pub fn instantiate<E: Engine + ?Sized>(
        &self,
        engine: &E,
        cell: &mut Cell,
        options: &LoadOptions,
    ) -> Result<LoadSummary> {
        let mut scratch = cell.clone();
        let summary = self.add_sections(engine, &mut scratch, options)?;
        *cell = scratch;
        Ok(summary)
    }

    fn add_sections<E: Engine + ?Sized>(
        &self,
        engine: &E,
        cell: &mut Cell,
        options: &LoadOptions,
    ) -> Result<LoadSummary> {
        for (kind, count) in self.type_counts() {
            debug!("{} - #{}", kind, count);
        }

        let children = self.children();
        let mut summary = LoadSummary::default();

        // Soma
        let soma_samples: Vec<usize> = (0..self.samples.len())
            .filter(|&i| self.samples[i].kind == SwcType::Soma)
            .collect();
        let soma_points = soma_points(&self.samples, &soma_samples);
        let mut soma = engine.new_section("soma[0]");
        soma.set_points(Array2::from(soma_points))?;
        soma.translate(options.offset);
        let soma_id = cell.add_section(Group::Soma, soma)?;
        summary.soma = 1;

        // Neurites, breadth first from the soma
        let mut queue: VecDeque<Pending> = VecDeque::new();
        for &i in &soma_samples {
            for &child in children.get(&self.samples[i].id).into_iter().flatten() {
                if self.samples[child].kind != SwcType::Soma {
                    queue.push_back(Pending {
                        start: child,
                        attach: Some((soma_id, 0.5)),
                        lead: Some(i),
                    });
                }
            }
        }
        for (i, sample) in self.samples.iter().enumerate() {
            if sample.parent.is_none() && sample.kind != SwcType::Soma {
                warn!(sample = sample.id, "neurite root not attached to the soma");
                queue.push_back(Pending {
                    start: i,
                    attach: None,
                    lead: None,
                });
            }
        }

        while let Some(pending) = queue.pop_front() {
            let kind = self.samples[pending.start].kind;
            let group = kind.group();

            if group == Group::Axon && !options.use_axon {
                summary.dropped_axon_samples += self.subtree_size(pending.start, &children);
                continue;
            }

            // Follow the unbranched run of same-group samples
            let mut run = vec![pending.start];
            let mut last = pending.start;
            loop {
                let kids = children.get(&self.samples[last].id);
                match kids.map(Vec::as_slice) {
                    Some([only]) if self.samples[*only].kind.group() == group => {
                        run.push(*only);
                        last = *only;
                    }
                    _ => break,
                }
            }

            let mut rows: Vec<[f64; POINT_COLUMNS]> = Vec::with_capacity(run.len() + 1);
            if let Some(lead) = pending.lead {
                let from_soma = self.samples[lead].kind == SwcType::Soma;
                if !from_soma || run.len() == 1 {
                    rows.push(self.samples[lead].point());
                }
            }
            rows.extend(run.iter().map(|&i| self.samples[i].point()));
            if rows.len() == 1 {
                // Isolated single sample: a cylinder as long as it is wide
                rows = cylinder(&self.samples[run[0]]);
            }

            let name = match group {
                Group::Axon => {
                    summary.axons += 1;
                    format!("axon[{}]", summary.axons - 1)
                }
                _ => {
                    summary.dendrites += 1;
                    format!("dend[{}]", summary.dendrites - 1)
                }
            };

            let mut section = engine.new_section(&name);
            section.set_points(Array2::from(rows))?;
            section.translate(options.offset);
            let id = cell.add_section(group, section)?;
            if let Some((parent, parent_x)) = pending.attach {
                cell.connect(id, parent, parent_x)?;
            }

            for &child in children.get(&self.samples[last].id).into_iter().flatten() {
                if self.samples[child].kind == SwcType::Soma {
                    warn!(sample = self.samples[child].id, "soma sample below a neurite ignored");
                    continue;
                }
                queue.push_back(Pending {
                    start: child,
                    attach: Some((id, 1.0)),
                    lead: Some(last),
                });
            }
        }

        if summary.dropped_axon_samples > 0 {
            info!(
                samples = summary.dropped_axon_samples,
                "dropped reconstructed axon"
            );
        }
        info!(
            dendrites = summary.dendrites,
            axons = summary.axons,
            "loaded morphology"
        );
        Ok(summary)
    }
}

/// Load an SWC file into `cell`, which is left untouched on error
pub fn load_swc<E: Engine + ?Sized, P: AsRef<Path>>(
    engine: &E,
    path: P,
    cell: &mut Cell,
    options: &LoadOptions,
) -> Result<LoadSummary> {
    Morphology::from_file(path)?.instantiate(engine, cell, options)
}

/// Points of the soma section
fn soma_points(samples: &[Sample], soma: &[usize]) -> Vec<[f64; POINT_COLUMNS]> {
    match soma {
        [single] => cylinder(&samples[*single]),
        many => many.iter().map(|&i| samples[i].point()).collect(),
    }
}

/// Two points along y, length and diameter equal to the sample's diameter
fn cylinder(sample: &Sample) -> Vec<[f64; POINT_COLUMNS]> {
    let d = 2.0 * sample.radius;
    vec![
        [sample.x, sample.y - sample.radius, sample.z, d],
        [sample.x, sample.y + sample.radius, sample.z, d],
    ]
}


// =============================================================================
// TESTS
// =============================================================================
