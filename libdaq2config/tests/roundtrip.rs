//! Generate a partition file and read it back.

use std::str::FromStr;

use xmltree::Element;

use libdaq2config::configurator::Configurator;
use libdaq2config::fragments::FragmentStore;
use libdaq2config::reader::{Advisory, ConfigReader};
use libdaq2config::topology::{BuilderVariant, PeerTransport, TopologyParams, TopologySpec};

fn params(s: &str) -> TopologyParams {
    match TopologySpec::from_str(s).unwrap() {
        TopologySpec::Ferol(p) => p,
        other => panic!("not a FEROL topology: {other:?}"),
    }
}

#[test]
fn test_evb_ibv_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evb_ibv_16s16fx1x4.xml");

    let store = FragmentStore::new(None).unwrap();
    let mut cfg = Configurator::new(store, BuilderVariant::Evb, PeerTransport::Ibv);
    cfg.tcp_cwnd = Some(80000);
    cfg.make_config(&params("16s16fx1x4"), &path).unwrap();

    let (topology, advisories) = ConfigReader::new(false).read(&path).unwrap();
    assert_eq!(topology.variant, BuilderVariant::Evb);
    assert_eq!(topology.transport, PeerTransport::Ibv);
    assert_eq!(topology.n_ferols(), 16);
    assert_eq!(topology.n_rus(), 1);
    assert_eq!(topology.n_bus(), 4);
    // under evb the event manager runs on RU0, no separate context
    assert!(topology.evm().is_none());
    assert_eq!(topology.config_string(), "16s16fx1x4");
    assert!(advisories.is_empty(), "{advisories:?}");
}

#[test]
fn test_gevb2g_udapl_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gevb2g_udapl_16s16fx1x4.xml");

    let store = FragmentStore::new(None).unwrap();
    let mut cfg = Configurator::new(store, BuilderVariant::Gevb2g, PeerTransport::Udapl);
    cfg.tcp_cwnd = Some(80000);
    cfg.make_config(&params("16s16fx1x4"), &path).unwrap();

    let (topology, advisories) = ConfigReader::new(false).read(&path).unwrap();
    assert_eq!(topology.variant, BuilderVariant::Gevb2g);
    assert_eq!(topology.transport, PeerTransport::Udapl);
    assert!(topology.evm().is_some());
    assert_eq!(topology.n_rus(), 1);
    assert_eq!(topology.config_string(), "16s16fx1x4");
    assert!(advisories.is_empty(), "{advisories:?}");
}

#[test]
fn test_default_cwnd_is_off_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("default_cwnd.xml");

    let store = FragmentStore::new(None).unwrap();
    let cfg = Configurator::new(store, BuilderVariant::Evb, PeerTransport::Ibv);
    cfg.make_config(&params("16s16fx1x4"), &path).unwrap();

    let (_, advisories) = ConfigReader::new(false).read(&path).unwrap();
    assert!(advisories
        .iter()
        .any(|a| matches!(a, Advisory::CwndOffPolicy { actual: 135000, .. })));
}

#[test]
fn test_bad_rack_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never_written.xml");

    let store = FragmentStore::new(None).unwrap();
    let mut cfg = Configurator::new(store, BuilderVariant::Evb, PeerTransport::Ibv);
    cfg.ferol_rack = 9;
    assert!(cfg.make_config(&params("16s16fx1x4"), &path).is_err());
    assert!(!path.exists());
}

#[test]
fn test_dual_stream_partition_layout() {
    let store = FragmentStore::new(None).unwrap();
    let cfg = Configurator::new(store.clone(), BuilderVariant::Evb, PeerTransport::Ibv);
    let doc = cfg.build_partition(&params("16s8fx1x4")).unwrap();

    let contexts: Vec<&Element> = doc
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .filter(|e| e.name == "Context")
        .collect();
    let count = |tag: &str| {
        contexts
            .iter()
            .filter(|c| c.attributes.get("url").unwrap().contains(tag))
            .count()
    };
    assert_eq!(count("FEROLCONTROLLER"), 8);
    assert_eq!(count("RU0_SOAP"), 1);
    assert_eq!(count("BU"), 4);
    assert_eq!(count("EVM"), 0);

    // RU0 runs the event manager and owns all 16 FED ids in slot order
    let ru0 = find_context(&doc, "RU0_SOAP_HOST_NAME");
    assert!(ru0
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .any(|e| e.attributes.get("class").map(String::as_str) == Some("evb::EVM")));
    let expected: Vec<String> = (900..916).map(|f| f.to_string()).collect();
    assert_eq!(routing_fedids(ru0), expected);

    // gevb2g keeps a separate EVM context instead
    let cfg = Configurator::new(store, BuilderVariant::Gevb2g, PeerTransport::Ibv);
    let doc = cfg.build_partition(&params("16s8fx1x4")).unwrap();
    let evm = find_context(&doc, "EVM0_SOAP_HOST_NAME");
    assert!(evm
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .any(|e| e.attributes.get("class").map(String::as_str) == Some("gevb2g::EVM")));
}

#[test]
fn test_frl_routing_follows_assignment() {
    let store = FragmentStore::new(None).unwrap();
    let cfg = Configurator::new(store, BuilderVariant::Evb, PeerTransport::Ibv);
    let doc = cfg.build_partition(&params("4s4fx2x4")).unwrap();

    // single stream per FEROL: RU0 owns ferols 0 and 1, even fedids only
    let ru0 = find_context(&doc, "RU0_SOAP_HOST_NAME");
    assert_eq!(routing_fedids(ru0), vec!["900", "902"]);
    let ru1 = find_context(&doc, "RU1_SOAP_HOST_NAME");
    assert_eq!(routing_fedids(ru1), vec!["904", "906"]);
}

fn find_context<'a>(doc: &'a Element, url_part: &str) -> &'a Element {
    doc.children
        .iter()
        .filter_map(|c| c.as_element())
        .find(|e| {
            e.name == "Context"
                && e.attributes
                    .get("url")
                    .map(|u| u.contains(url_part))
                    .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("no context with url {url_part}"))
}

fn routing_fedids(context: &Element) -> Vec<String> {
    let app = context
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .find(|e| {
            e.name == "Application"
                && e.attributes.get("class").map(String::as_str) == Some("pt::frl::Application")
        })
        .expect("no pt::frl application");
    let properties = app
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .find(|e| e.name == "properties")
        .expect("no pt::frl properties");
    let routing = properties
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .find(|e| e.name == "frlRouting")
        .expect("no frlRouting");

    routing
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .filter(|e| e.name == "item")
        .map(|item| {
            item.children
                .iter()
                .filter_map(|c| c.as_element())
                .find(|e| e.name == "fedid")
                .and_then(|f| f.get_text())
                .expect("item without fedid")
                .into_owned()
        })
        .collect()
}
