use cellforge_allen::{mechanisms, CellBuilder, ModelMechanisms, ModelParameters, Neuron472352327};
use cellforge_core::{ForgeError, Offset};
use cellforge_neuron::{Cell, Group, NeuronEngine};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

const ACTIVE: [&str; 11] = [
    "CaDynamics", "Ca_HVA", "Ca_LVA", "Ih", "Im_v2", "K_T", "Kd", "Kv2like", "Kv3_1", "NaV", "SK",
];

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/interneuron.swc")
}

fn build(name: Option<&str>, offset: Offset) -> Cell {
    let engine = mechanisms::engine();
    Neuron472352327::build(&engine, fixture(), name.map(String::from), offset).unwrap()
}

fn named(cell: &Cell, name: &str) -> cellforge_neuron::Section {
    cell.section(cell.find(name).unwrap()).unwrap().clone()
}

#[test]
fn test_all_holds_every_section_once() {
    let cell = build(None, Offset::default());

    assert_eq!(cell.group(Group::Soma).len(), 1);
    assert_eq!(cell.group(Group::Dend).len(), 4);
    assert_eq!(cell.group(Group::Axon).len(), 2);

    let all = cell.group(Group::All);
    assert_eq!(all.len(), 7);
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(unique.len(), all.len());

    // insertion order: morphology first, stub appended last
    let names: Vec<_> = cell.sections(Group::All).map(|(_, s)| s.name.clone()).collect();
    assert_eq!(
        names,
        ["soma[0]", "dend[0]", "dend[1]", "dend[2]", "dend[3]", "axon[0]", "axon[1]"]
    );
}

#[test]
fn test_reconstructed_axon_is_replaced_by_stub() {
    let cell = build(None, Offset::default());

    for (_, section) in cell.sections(Group::Axon) {
        assert!(!section.has_points(), "{} came from the file", section.name);
        assert_eq!(section.length, 30.0);
        assert_eq!(section.diam, 1.0);
        assert_eq!(section.nseg, 1);
    }
}

#[test]
fn test_axon_stub_connections() {
    let cell = build(None, Offset::default());
    let soma = cell.group(Group::Soma)[0];
    let axon0 = cell.find("axon[0]").unwrap();
    let axon1 = cell.find("axon[1]").unwrap();

    let first = cell.section(axon0).unwrap().parent.unwrap();
    assert_eq!(first.parent, soma);
    assert_eq!(first.parent_x, 0.5);
    assert_eq!(first.child_x, 0.0);

    let second = cell.section(axon1).unwrap().parent.unwrap();
    assert_eq!(second.parent, axon0);
    assert_eq!(second.parent_x, 1.0);
}

#[test]
fn test_discretization_follows_length() {
    let cell = build(None, Offset::default());

    for (_, section) in cell.sections(Group::All) {
        let expected = 1 + 2 * (section.length / 40.0).floor() as usize;
        assert_eq!(section.nseg, expected, "{}", section.name);
        assert_eq!(section.nseg % 2, 1);
    }

    assert_eq!(named(&cell, "dend[1]").nseg, 3); // 50 um
    assert_eq!(named(&cell, "dend[2]").nseg, 5); // 90 um
    assert_eq!(named(&cell, "dend[3]").nseg, 1); // 20 um
}

#[test]
fn test_passive_parameters_everywhere() {
    let cell = build(None, Offset::default());

    for (_, section) in cell.sections(Group::All) {
        assert!(section.has_mechanism("pas"), "{}", section.name);
        assert_eq!(section.ra, 67.11);
        assert_eq!(section.get("e_pas"), Some(-87.4209747314));
        assert_eq!(section.cm, 2.3);
    }

    for (_, section) in cell.sections(Group::Axon) {
        assert_eq!(section.get("g_pas"), Some(0.000877965239702));
    }
    for (_, section) in cell.sections(Group::Dend) {
        assert_eq!(section.get("g_pas"), Some(2.38788417905e-05));
    }
}

#[test]
fn test_active_mechanisms_only_on_soma() {
    let cell = build(None, Offset::default());

    let soma = named(&cell, "soma[0]");
    assert_eq!(soma.mechanisms.len(), 12);
    for mechanism in ACTIVE {
        assert!(soma.has_mechanism(mechanism), "{}", mechanism);
    }

    for group in [Group::Dend, Group::Axon] {
        for (_, section) in cell.sections(group) {
            let inserted: Vec<_> = section.mechanism_names().collect();
            assert_eq!(inserted, ["pas"], "{}", section.name);
            assert!(section.ions.is_empty());
        }
    }
}

#[test]
fn test_soma_calibration() {
    let cell = build(None, Offset::default());
    let soma = named(&cell, "soma[0]");

    let expected = [
        ("ena", 53.0),
        ("ek", -107.0),
        ("gbar_Ih", 0.000122653),
        ("gbar_NaV", 0.0664205),
        ("gbar_Kd", 5.30709e-05),
        ("gbar_Kv2like", 2.04034e-05),
        ("gbar_Kv3_1", 0.168562),
        ("gbar_K_T", 0.000140197),
        ("gbar_Im_v2", 0.00506731),
        ("gbar_SK", 0.00011628),
        ("gbar_Ca_HVA", 0.000337475),
        ("gbar_Ca_LVA", 0.00891093),
        ("gamma_CaDynamics", 0.037713),
        ("decay_CaDynamics", 795.904),
        ("g_pas", 5.72175e-05),
        ("cm", 2.3),
    ];
    for (attribute, value) in expected {
        assert_eq!(soma.get(attribute), Some(value), "{}", attribute);
    }

    // untouched defaults survive
    assert_eq!(soma.get("depth_CaDynamics"), Some(0.1));
}

#[test]
fn test_string_representation() {
    assert_eq!(build(Some("X"), Offset::default()).to_string(), "X");
    assert_eq!(
        build(None, Offset::default()).to_string(),
        "Neuron472352327_instance"
    );
}

#[test]
fn test_offset_translates_geometry_only() {
    let origin = build(None, Offset::default());
    let offset = Offset::new(10.0, -7.5, 3.0);
    let shifted = build(None, offset);

    for ((_, a), (_, b)) in origin.sections(Group::All).zip(shifted.sections(Group::All)) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.points.nrows(), b.points.nrows());
        for row in 0..a.points.nrows() {
            for (column, delta) in [offset.x, offset.y, offset.z].into_iter().enumerate() {
                let moved = b.points[[row, column]] - a.points[[row, column]];
                assert!((moved - delta).abs() < 1e-9, "{} axis {}", a.name, column);
            }
            assert_eq!(b.points[[row, 3]], a.points[[row, 3]]);
        }

        assert!((a.length - b.length).abs() < 1e-9);
        assert_eq!(a.nseg, b.nseg);
        assert_eq!(a.ra, b.ra);
        assert_eq!(a.cm, b.cm);
        assert_eq!(a.mechanisms, b.mechanisms);
        assert_eq!(a.ions, b.ions);
    }
}

#[test]
fn test_missing_morphology_is_fatal() {
    let engine = mechanisms::engine();
    let err = Neuron472352327::build(&engine, "/nonexistent/cell.swc", None, Offset::default())
        .unwrap_err();
    assert!(matches!(err, ForgeError::Io(_)));
}

#[test]
fn test_malformed_morphology_is_fatal() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "1 1 0 0 0 5 -1").unwrap();
    writeln!(file, "2 3 0 10 zero 1 1").unwrap();

    let engine = mechanisms::engine();
    let err = Neuron472352327::build(&engine, file.path(), None, Offset::default()).unwrap_err();
    assert!(matches!(err, ForgeError::Parse(_)));
}

#[test]
fn test_engine_without_model_mechanisms_fails() {
    let engine = NeuronEngine::new();
    let err = CellBuilder::new(&engine).build(fixture()).unwrap_err();
    assert!(matches!(err, ForgeError::UnknownMechanism(_)));
}

#[test]
fn test_unsupported_parameter_fails() {
    let mut parameters = ModelParameters::neuron_472352327();
    for record in &mut parameters.groups {
        if record.group == Group::Dend {
            // dendrites carry no sodium channel
            record.mechanisms.insert("gbar_NaV".into(), 0.01);
        }
    }

    let engine = mechanisms::engine();
    let err = CellBuilder::new(&engine)
        .parameters(parameters)
        .build(fixture())
        .unwrap_err();
    assert!(matches!(err, ForgeError::MechanismNotInserted { .. }));
}

#[test]
fn test_recalibration_from_json() {
    let mut parameters = ModelParameters::neuron_472352327();
    parameters.global.ra = 100.0;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(parameters.to_json().unwrap().as_bytes()).unwrap();

    let loaded = ModelParameters::from_json_file(file.path()).unwrap();
    let engine = mechanisms::engine();
    let cell = CellBuilder::new(&engine)
        .parameters(loaded)
        .build(fixture())
        .unwrap();

    for (_, section) in cell.sections(Group::All) {
        assert_eq!(section.ra, 100.0);
    }
    assert_eq!(named(&cell, "soma[0]").get("gbar_NaV"), Some(0.0664205));
}

#[test]
fn test_extra_dendritic_mechanisms() {
    let mut mechanisms = ModelMechanisms::neuron_472352327();
    mechanisms.dend.push("Ih".into());

    let engine = cellforge_allen::mechanisms::engine();
    let cell = CellBuilder::new(&engine)
        .mechanisms(mechanisms)
        .build(fixture())
        .unwrap();

    for (_, section) in cell.sections(Group::Dend) {
        assert!(section.has_mechanism("Ih"));
        assert_eq!(section.get("gbar_Ih"), Some(0.00001));
    }
    for (_, section) in cell.sections(Group::Axon) {
        assert!(!section.has_mechanism("Ih"));
    }
}
