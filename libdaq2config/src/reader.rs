//! Reading an existing partition file back into a [`Topology`].
//!
//! Besides recovering the host list and the global choices, the reader runs
//! the plausibility checks that caught most hand-edited partition files:
//! every enabled FEROL stream must carry an event-size limit and a congestion
//! window, and values that differ across streams or sit outside the known
//! tables are reported as advisories rather than errors.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use regex::Regex;
use xmltree::Element;

use super::constants::{
    size_limit_for_merging, CWND_POLICY_DUAL_STREAM, CWND_POLICY_SINGLE_STREAM, FED_EMULATOR_CLASS,
    FEROL_CLASS, FMM_CONTROLLER_CLASS, I2O_NS, PT_IBV_CLASS, PT_UDAPL_CLASS,
};
use super::error::{PropertyError, ReaderError};
use super::host::{
    cfg_string_to_bool, EfedStream, FerolStreams, FmmSlot, Host, HostKind, Role,
};
use super::topology::{BuilderVariant, PeerTransport, Topology};
use super::xmlutil;

/// A suspicious but tolerated finding. The first-seen value stays in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    DifferingEventSizes { first: u32, other: u32 },
    EventSizeOffPolicy { actual: u32, expected: u32 },
    DifferingCwnd { first: u32, other: u32 },
    CwndOffPolicy { actual: u32, allowed: [u32; 2] },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DifferingEventSizes { first, other } => write!(
                f,
                "FEROLs have differing Event_Length_Max_bytes ({first} vs {other}); keeping {first}"
            ),
            Self::EventSizeOffPolicy { actual, expected } => write!(
                f,
                "Event_Length_Max_bytes is {actual} but the merging factor calls for {expected}"
            ),
            Self::DifferingCwnd { first, other } => write!(
                f,
                "FEROLs have differing TCP_CWND ({first} vs {other}); keeping {first}"
            ),
            Self::CwndOffPolicy { actual, allowed } => write!(
                f,
                "TCP_CWND is {actual}, outside the usual values {} and {}",
                allowed[0], allowed[1]
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigReader {
    /// Skip the post-parse plausibility checks.
    pub quiet: bool,
}

impl ConfigReader {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn read(&self, path: &Path) -> Result<(Topology, Vec<Advisory>), ReaderError> {
        if !path.exists() {
            return Err(ReaderError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let root = Element::parse(BufReader::new(file))?;
        self.read_element(&root)
    }

    /// Extract the topology from an already parsed partition document.
    pub fn read_element(&self, root: &Element) -> Result<(Topology, Vec<Advisory>), ReaderError> {
        let xdaq_ns = match (&root.name, &root.namespace) {
            (name, Some(ns)) if name == "Partition" => ns.clone(),
            _ => return Err(ReaderError::BadRoot(root.name.clone())),
        };

        let variant = detect_variant(root)?;
        let url_pattern = Regex::new(r"^http://([A-Z_0-9]*?)([0-9]+)_SOAP_HOST_NAME:.*")
            .expect("static regex");

        let mut hosts: Vec<Host> = Vec::new();
        let mut transport: Option<PeerTransport> = None;
        let mut max_sizes: Vec<u32> = Vec::new();
        let mut cwnds: Vec<u32> = Vec::new();

        for context in xmlutil::children(root, &xdaq_ns, "Context") {
            let url = context
                .attributes
                .get("url")
                .cloned()
                .unwrap_or_default();
            let caps = url_pattern
                .captures(&url)
                .ok_or_else(|| ReaderError::BadContextUrl(url.clone()))?;
            let tag = caps[1].to_string();
            let index: u32 = caps[2]
                .parse()
                .map_err(|_| ReaderError::BadContextUrl(url.clone()))?;
            let role = Role::from_tag(&tag)
                .ok_or_else(|| ReaderError::UnknownHostType { tag, url: url.clone() })?;

            let applications: Vec<(String, u32)> = xmlutil::children(context, &xdaq_ns, "Application")
                .map(|app| {
                    let class = app.attributes.get("class").cloned().unwrap_or_default();
                    let instance = app
                        .attributes
                        .get("instance")
                        .and_then(|i| i.parse().ok())
                        .unwrap_or(0);
                    (class, instance)
                })
                .collect();

            let kind = match role {
                Role::FerolController => {
                    HostKind::Ferol(read_ferol_streams(context, &xdaq_ns, &url, &mut max_sizes, &mut cwnds)?)
                }
                Role::Efed => HostKind::Efed(read_efed_streams(context, &xdaq_ns)?),
                Role::Fmm => HostKind::Fmm(read_fmm_slots(context, &xdaq_ns, &url)?),
                _ => HostKind::Generic,
            };

            if role == Role::Ru && transport.is_none() {
                transport = applications.iter().find_map(|(class, _)| match class.as_str() {
                    PT_IBV_CLASS => Some(PeerTransport::Ibv),
                    PT_UDAPL_CLASS => Some(PeerTransport::Udapl),
                    _ => None,
                });
            }

            let mut host = Host::new(role, index, kind);
            host.applications = applications;
            hosts.push(host);
        }

        let transport = transport.ok_or(ReaderError::IndeterminateTransport)?;
        let mut topology = Topology::new(variant, transport);
        topology.uses_gtpe = hosts.iter().any(|h| h.role == Role::Gtpe);
        topology.hosts = hosts;
        topology.event_size = max_sizes.first().copied();
        topology.tcp_cwnd = cwnds.first().copied();

        let mut advisories = Vec::new();
        if !self.quiet {
            self.validate(&topology, &max_sizes, &cwnds, &mut advisories)?;
            for advisory in &advisories {
                log::warn!("{advisory}");
            }
        }

        Ok((topology, advisories))
    }

    fn validate(
        &self,
        topology: &Topology,
        max_sizes: &[u32],
        cwnds: &[u32],
        advisories: &mut Vec<Advisory>,
    ) -> Result<(), ReaderError> {
        let ferol_streams: u32 = topology
            .ferols()
            .filter_map(Host::ferol_streams)
            .map(|s| s.n_enabled())
            .sum();
        if ferol_streams == 0 {
            return Ok(());
        }

        if max_sizes.len() != ferol_streams as usize {
            return Err(ReaderError::IncompleteConfig(format!(
                "found {} Event_Length_Max_bytes values for {} enabled streams",
                max_sizes.len(),
                ferol_streams
            )));
        }
        if cwnds.len() != ferol_streams as usize {
            return Err(ReaderError::IncompleteConfig(format!(
                "found {} TCP_CWND values for {} enabled streams",
                cwnds.len(),
                ferol_streams
            )));
        }

        let first_size = max_sizes[0];
        if let Some(&other) = max_sizes.iter().find(|&&s| s != first_size) {
            advisories.push(Advisory::DifferingEventSizes {
                first: first_size,
                other,
            });
        }
        if topology.n_rus() > 0 {
            let merging = ferol_streams / topology.n_rus() as u32;
            if let Some((expected, _)) = size_limit_for_merging(merging) {
                if first_size != expected {
                    advisories.push(Advisory::EventSizeOffPolicy {
                        actual: first_size,
                        expected,
                    });
                }
            }
        }

        let first_cwnd = cwnds[0];
        if let Some(&other) = cwnds.iter().find(|&&c| c != first_cwnd) {
            advisories.push(Advisory::DifferingCwnd {
                first: first_cwnd,
                other,
            });
        }
        let dual_stream = ferol_streams > topology.n_ferols() as u32;
        let allowed = if dual_stream {
            CWND_POLICY_DUAL_STREAM
        } else {
            CWND_POLICY_SINGLE_STREAM
        };
        if !allowed.contains(&first_cwnd) {
            advisories.push(Advisory::CwndOffPolicy {
                actual: first_cwnd,
                allowed,
            });
        }

        Ok(())
    }
}

fn detect_variant(root: &Element) -> Result<BuilderVariant, ReaderError> {
    let protocol =
        xmlutil::find_child(root, I2O_NS, "protocol").ok_or(ReaderError::IndeterminateVariant)?;
    xmlutil::children(protocol, I2O_NS, "target")
        .filter_map(|t| t.attributes.get("class"))
        .find_map(|class| BuilderVariant::from_protocol_class(class))
        .ok_or(ReaderError::IndeterminateVariant)
}

fn read_u32_property(
    app: &Element,
    class: &str,
    prop: &str,
) -> Result<u32, PropertyError> {
    let value = xmlutil::read_property_from_app(app, class, prop)?;
    value.parse().map_err(|_| PropertyError::BadPropertyValue {
        property: prop.to_string(),
        value,
    })
}

fn read_ferol_streams(
    context: &Element,
    xdaq_ns: &str,
    url: &str,
    max_sizes: &mut Vec<u32>,
    cwnds: &mut Vec<u32>,
) -> Result<FerolStreams, ReaderError> {
    let app = xmlutil::find_application(context, xdaq_ns, FEROL_CLASS).ok_or_else(|| {
        PropertyError::ApplicationNotFound {
            class: FEROL_CLASS.to_string(),
            context: url.to_string(),
        }
    })?;

    let mut streams = FerolStreams {
        stream0: cfg_string_to_bool(&xmlutil::read_property_from_app(
            app,
            FEROL_CLASS,
            "enableStream0",
        )?),
        stream1: cfg_string_to_bool(&xmlutil::read_property_from_app(
            app,
            FEROL_CLASS,
            "enableStream1",
        )?),
        ..Default::default()
    };

    for (n, enabled) in [(0usize, streams.stream0), (1usize, streams.stream1)] {
        if !enabled {
            continue;
        }
        let size = read_u32_property(app, FEROL_CLASS, &format!("Event_Length_Max_bytes_FED{n}"))?;
        let cwnd = read_u32_property(app, FEROL_CLASS, &format!("TCP_CWND_FED{n}"))?;
        streams.max_event_size[n] = Some(size);
        streams.tcp_cwnd[n] = Some(cwnd);
        max_sizes.push(size);
        cwnds.push(cwnd);
    }

    Ok(streams)
}

fn read_efed_streams(context: &Element, xdaq_ns: &str) -> Result<Vec<EfedStream>, ReaderError> {
    let mut streams = Vec::new();
    for app in xmlutil::children(context, xdaq_ns, "Application") {
        if app.attributes.get("class").map(String::as_str) != Some(FED_EMULATOR_CLASS) {
            continue;
        }
        let instance = app
            .attributes
            .get("instance")
            .and_then(|i| i.parse().ok())
            .unwrap_or(0);
        streams.push(EfedStream {
            instance,
            fed_id: read_u32_property(app, FED_EMULATOR_CLASS, "FedSourceId")?,
            slot: read_u32_property(app, FED_EMULATOR_CLASS, "slot")?,
        });
    }
    Ok(streams)
}

fn read_fmm_slots(
    context: &Element,
    xdaq_ns: &str,
    url: &str,
) -> Result<Vec<FmmSlot>, ReaderError> {
    let app = xmlutil::find_application(context, xdaq_ns, FMM_CONTROLLER_CLASS).ok_or_else(|| {
        PropertyError::ApplicationNotFound {
            class: FMM_CONTROLLER_CLASS.to_string(),
            context: url.to_string(),
        }
    })?;
    let ns = super::constants::app_namespace(FMM_CONTROLLER_CLASS);
    let properties = xmlutil::find_child(app, &ns, "properties").ok_or_else(|| {
        PropertyError::MissingProperties {
            class: FMM_CONTROLLER_CLASS.to_string(),
            context: url.to_string(),
        }
    })?;
    let config = xmlutil::find_child(properties, &ns, "config").ok_or_else(|| {
        PropertyError::PropertyNotFound {
            property: "config".to_string(),
            class: FMM_CONTROLLER_CLASS.to_string(),
            context: url.to_string(),
        }
    })?;

    let mut slots = Vec::new();
    for item in config.children.iter().filter_map(xmltree::XMLNode::as_element) {
        let field = |name: &str| -> Result<String, PropertyError> {
            xmlutil::find_child_local(item, name)
                .map(xmlutil::text_of)
                .ok_or_else(|| PropertyError::PropertyNotFound {
                    property: name.to_string(),
                    class: FMM_CONTROLLER_CLASS.to_string(),
                    context: url.to_string(),
                })
        };
        let geoslot_text = field("geoslot")?;
        let geoslot = geoslot_text
            .parse()
            .map_err(|_| PropertyError::BadPropertyValue {
                property: "geoslot".to_string(),
                value: geoslot_text,
            })?;
        slots.push(FmmSlot {
            geoslot,
            label: field("label")?,
            input_labels: field("inputLabels")?,
            output_labels: field("outputLabels")?,
        });
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
<xc:Partition xmlns:xc="http://xdaq.web.cern.ch/xdaq/xsd/2004/XMLConfiguration-30">
  <i2o:protocol xmlns:i2o="http://xdaq.web.cern.ch/xdaq/xsd/2004/I2OConfiguration-30">
    <i2o:target class="gevb2g::EVM" instance="0" tid="1"/>
    <i2o:target class="gevb2g::RU" instance="0" tid="10"/>
    <i2o:target class="gevb2g::BU" instance="0" tid="30"/>
  </i2o:protocol>
  <xc:Context url="http://FEROLCONTROLLER0_SOAP_HOST_NAME:FEROLCONTROLLER0_SOAP_PORT">
    <xc:Application class="ferol::FerolController" id="11" instance="0">
      <p:properties xmlns:p="urn:xdaq-application:ferol::FerolController">
        <p:enableStream0>true</p:enableStream0>
        <p:enableStream1>false</p:enableStream1>
        <p:Event_Length_Max_bytes_FED0>16000</p:Event_Length_Max_bytes_FED0>
        <p:Event_Length_Max_bytes_FED1>16000</p:Event_Length_Max_bytes_FED1>
        <p:TCP_CWND_FED0>80000</p:TCP_CWND_FED0>
        <p:TCP_CWND_FED1>80000</p:TCP_CWND_FED1>
      </p:properties>
    </xc:Application>
  </xc:Context>
  <xc:Context url="http://RU0_SOAP_HOST_NAME:RU0_SOAP_PORT">
    <xc:Application class="pt::ibv::Application" id="201" instance="0">
      <p:properties xmlns:p="urn:xdaq-application:pt::ibv::Application"/>
    </xc:Application>
    <xc:Application class="gevb2g::RU" id="31" instance="0">
      <p:properties xmlns:p="urn:xdaq-application:gevb2g::RU"/>
    </xc:Application>
  </xc:Context>
  <xc:Context url="http://EVM0_SOAP_HOST_NAME:EVM0_SOAP_PORT">
    <xc:Application class="gevb2g::EVM" id="21" instance="0">
      <p:properties xmlns:p="urn:xdaq-application:gevb2g::EVM"/>
    </xc:Application>
  </xc:Context>
  <xc:Context url="http://BU0_SOAP_HOST_NAME:BU0_SOAP_PORT">
    <xc:Application class="gevb2g::BU" id="32" instance="0">
      <p:properties xmlns:p="urn:xdaq-application:gevb2g::BU"/>
    </xc:Application>
  </xc:Context>
</xc:Partition>"#;

    fn parse(text: &str) -> Element {
        Element::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_minimal_partition() {
        let (topology, advisories) = ConfigReader::new(false)
            .read_element(&parse(MINIMAL))
            .unwrap();
        assert_eq!(topology.variant, BuilderVariant::Gevb2g);
        assert_eq!(topology.transport, PeerTransport::Ibv);
        assert_eq!(topology.n_ferols(), 1);
        assert_eq!(topology.n_rus(), 1);
        assert_eq!(topology.n_bus(), 1);
        assert!(topology.evm().is_some());
        assert_eq!(topology.n_streams(), 1);
        assert_eq!(topology.config_string(), "1s1fx1x1");
        assert_eq!(topology.event_size, Some(16000));
        // 80000 is in the single-stream window policy, and a merging factor of
        // 1 has no size-limit entry
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_differing_event_sizes_are_advisory() {
        let mutated = MINIMAL.replace(
            "<p:Event_Length_Max_bytes_FED0>16000<",
            "<p:Event_Length_Max_bytes_FED0>21000<",
        );
        // need a second stream to have two differing values
        let mutated = mutated.replace(
            "<p:enableStream1>false<",
            "<p:enableStream1>true<",
        );
        let (topology, advisories) = ConfigReader::new(false)
            .read_element(&parse(&mutated))
            .unwrap();
        assert_eq!(topology.event_size, Some(21000));
        assert!(advisories
            .iter()
            .any(|a| matches!(a, Advisory::DifferingEventSizes { first: 21000, other: 16000 })));
    }

    #[test]
    fn test_off_policy_cwnd() {
        let mutated = MINIMAL.replace(
            "<p:TCP_CWND_FED0>80000<",
            "<p:TCP_CWND_FED0>135000<",
        );
        let (_, advisories) = ConfigReader::new(false)
            .read_element(&parse(&mutated))
            .unwrap();
        assert!(advisories
            .iter()
            .any(|a| matches!(a, Advisory::CwndOffPolicy { actual: 135000, .. })));
    }

    #[test]
    fn test_missing_size_property_is_fatal() {
        let broken = MINIMAL.replace(
            "<p:Event_Length_Max_bytes_FED0>16000</p:Event_Length_Max_bytes_FED0>",
            "",
        );
        assert!(matches!(
            ConfigReader::new(false).read_element(&parse(&broken)),
            Err(ReaderError::Property(PropertyError::PropertyNotFound { .. }))
        ));
    }

    #[test]
    fn test_unknown_host_type() {
        let mutated = MINIMAL.replace("http://BU0_", "http://FRLPC0_");
        assert!(matches!(
            ConfigReader::new(true).read_element(&parse(&mutated)),
            Err(ReaderError::UnknownHostType { .. })
        ));
    }

    #[test]
    fn test_indeterminate_variant() {
        let mutated = MINIMAL
            .replace("gevb2g::EVM", "msio::Client")
            .replace("gevb2g::RU", "msio::Client")
            .replace("gevb2g::BU", "msio::Server");
        assert!(matches!(
            ConfigReader::new(true).read_element(&parse(&mutated)),
            Err(ReaderError::IndeterminateVariant)
        ));
    }
}
