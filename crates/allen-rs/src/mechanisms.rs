//! Active mechanisms shipped with the Allen Cell Types biophysical models.
//!
//! Only the interface is declared here (RANGE parameters with their
//! defaults and ion usage); kinetics are compiled into the engine.

use cellforge_neuron::{Ion, MechanismSpec, NeuronEngine};

/// Calcium buffering and extrusion
pub fn ca_dynamics() -> MechanismSpec {
    MechanismSpec::new("CaDynamics")
        .parameter("gamma", 0.05) // fraction of free calcium
        .parameter("decay", 80.0) // ms
        .parameter("depth", 0.1) // um
        .parameter("minCai", 1e-4) // mM
        .uses(Ion::Ca)
}

/// High-voltage-activated calcium current
pub fn ca_hva() -> MechanismSpec {
    MechanismSpec::new("Ca_HVA")
        .parameter("gbar", 0.00001)
        .uses(Ion::Ca)
}

/// Low-voltage-activated calcium current
pub fn ca_lva() -> MechanismSpec {
    MechanismSpec::new("Ca_LVA")
        .parameter("gbar", 0.00001)
        .uses(Ion::Ca)
}

/// Hyperpolarization-activated cation current (nonspecific)
pub fn ih() -> MechanismSpec {
    MechanismSpec::new("Ih")
        .parameter("gbar", 0.00001)
        .parameter("ehcn", -45.0) // mV
}

/// M-type potassium current
pub fn im_v2() -> MechanismSpec {
    MechanismSpec::new("Im_v2")
        .parameter("gbar", 0.00001)
        .uses(Ion::K)
}

/// Transient potassium current
pub fn k_t() -> MechanismSpec {
    MechanismSpec::new("K_T")
        .parameter("gbar", 0.00001)
        .parameter("vshift", 0.0)
        .parameter("mTauF", 1.0)
        .parameter("hTauF", 1.0)
        .uses(Ion::K)
}

/// D-type potassium current
pub fn kd() -> MechanismSpec {
    MechanismSpec::new("Kd")
        .parameter("gbar", 0.00001)
        .uses(Ion::K)
}

/// Kv2-like delayed rectifier
pub fn kv2like() -> MechanismSpec {
    MechanismSpec::new("Kv2like")
        .parameter("gbar", 0.00001)
        .uses(Ion::K)
}

/// Kv3.1 fast delayed rectifier
pub fn kv3_1() -> MechanismSpec {
    MechanismSpec::new("Kv3_1")
        .parameter("gbar", 0.00001)
        .parameter("vshift", 0.0)
        .uses(Ion::K)
}

/// Transient sodium current
pub fn nav() -> MechanismSpec {
    MechanismSpec::new("NaV")
        .parameter("gbar", 0.0)
        .uses(Ion::Na)
}

/// Small-conductance calcium-activated potassium current
pub fn sk() -> MechanismSpec {
    MechanismSpec::new("SK")
        .parameter("gbar", 0.000001)
        .parameter("zTau", 1.0) // ms
        .uses(Ion::K)
        .uses(Ion::Ca)
}

/// All active mechanisms, in the order the model inserts them
pub fn catalog() -> Vec<MechanismSpec> {
    vec![
        ca_dynamics(),
        ca_hva(),
        ca_lva(),
        ih(),
        im_v2(),
        k_t(),
        kd(),
        kv2like(),
        kv3_1(),
        nav(),
        sk(),
    ]
}

/// Engine able to insert every mechanism the model uses
pub fn engine() -> NeuronEngine {
    NeuronEngine::with_mechanisms(catalog())
}
