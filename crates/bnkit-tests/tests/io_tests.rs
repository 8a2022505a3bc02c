//! File format round-trips and exports over the shared fixtures.

use bnkit_core::{EliminationEngine, InferenceEngine, Network};
use bnkit_io::{export, read_xml, read_xml_file, write_xml, write_xml_file, Format, IoError};
use bnkit_tests::{asia, random_network, sprinkler};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;

fn assert_same_network(a: &Network, b: &Network) {
    assert_eq!(a.name(), b.name());
    assert_eq!(a.len(), b.len());
    for (x, y) in a.variables().iter().zip(b.variables()) {
        assert_eq!(x.name(), y.name());
        assert_eq!(x.domain(), y.domain());
        assert_eq!(x.parents(), y.parents());
        assert_eq!(x.cpt(), y.cpt(), "table of {}", x.name());
    }
}

#[test]
fn xml_round_trip_is_lossless() {
    for net in [asia(), sprinkler()] {
        let again = read_xml(&write_xml(&net)).unwrap();
        assert_same_network(&net, &again);
    }
    let mut rng = SmallRng::seed_from_u64(11);
    for _ in 0..20 {
        let net = random_network(&mut rng, 7, 3, 4);
        let again = read_xml(&write_xml(&net)).unwrap();
        assert_same_network(&net, &again);
    }
}

#[test]
fn xml_escapes_markup_in_names() {
    let mut net = Network::new("a <b> & \"c\"");
    let v = net.add_variable("x&y", ["<15", ">=15"]).unwrap();
    net.set_cpt(v, vec![0.25, 0.75]).unwrap();
    let xml = write_xml(&net);
    assert!(xml.contains("&lt;15"));
    assert!(!xml.contains("<OUTCOME><15"));
    assert_same_network(&net, &read_xml(&xml).unwrap());
}

#[test]
fn file_round_trip_answers_queries() {
    let dir = std::env::temp_dir().join(format!("bnkit-io-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("asia.xml");
    write_xml_file(&asia(), &path).unwrap();
    let net = Arc::new(read_xml_file(&path).unwrap());
    let mut engine = EliminationEngine::new(net).unwrap();
    engine.add_evidence("xray", "yes").unwrap();
    engine.add_evidence("dysp", "yes").unwrap();
    let p = engine.conditional_probability("lung", "yes").unwrap();
    assert!((p - 0.6212527967).abs() < 1e-6);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_file_is_an_io_error() {
    let err = read_xml_file("/nonexistent/bnkit/network.xml").unwrap_err();
    assert!(matches!(err, IoError::Io(_)));
}

#[test]
fn text_exports_mention_every_variable() {
    let net = asia();
    for format in [Format::Bif, Format::Net] {
        let text = export(&net, format);
        for variable in net.variables() {
            assert!(text.contains(variable.name()), "{:?} misses {}", format, variable.name());
        }
        assert_eq!(text.matches('{').count(), text.matches('}').count());
    }
    let bif = export(&net, Format::Bif);
    assert_eq!(bif.matches("probability (").count(), net.len());
    let hugin = export(&net, Format::Net);
    assert_eq!(hugin.matches("potential (").count(), net.len());
    assert_eq!(hugin.matches('(').count(), hugin.matches(')').count());
    assert_eq!(Format::Net.extension(), "net");
}
