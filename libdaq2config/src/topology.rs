use std::str::FromStr;

use regex::Regex;

use super::error::{SymbolMapError, TopologyStringError};
use super::host::{Host, Role};
use super::symbol_map::SymbolMap;

/// The two mutually exclusive event-builder architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderVariant {
    Evb,
    Gevb2g,
}

impl BuilderVariant {
    /// Namespace prefix of the builder applications, e.g. `evb::BU`.
    pub fn ns(&self) -> &'static str {
        match self {
            Self::Evb => "evb",
            Self::Gevb2g => "gevb2g",
        }
    }

    /// Detect the variant from an i2o target class attribute.
    /// `gevb2g::` is checked first since class strings are matched by prefix.
    pub fn from_protocol_class(class: &str) -> Option<Self> {
        if class.starts_with("gevb2g::") {
            Some(Self::Gevb2g)
        } else if class.starts_with("evb::") {
            Some(Self::Evb)
        } else {
            None
        }
    }

    /// Shared library implementing this event builder.
    pub fn library(&self) -> &'static str {
        match self {
            Self::Evb => "$XDAQ_ROOT/lib/libevb.so",
            Self::Gevb2g => "$XDAQ_ROOT/lib/libgevb2g.so",
        }
    }
}

/// Peer transport protocol of the builder network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerTransport {
    Ibv,
    Udapl,
}

impl PeerTransport {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ibv => "ibv",
            Self::Udapl => "udapl",
        }
    }

    /// Shared library of the peer transport application.
    pub fn library(&self) -> String {
        format!("$XDAQ_ROOT/lib/libpt{}.so", self.name())
    }
}

/// Everything known about a partition: its hosts and the global choices
/// (event-builder variant, peer transport, GTPe triggering).
#[derive(Debug, Clone)]
pub struct Topology {
    pub hosts: Vec<Host>,
    pub variant: BuilderVariant,
    pub transport: PeerTransport,
    pub uses_gtpe: bool,
    /// Representative `Event_Length_Max_bytes` (first one encountered).
    pub event_size: Option<u32>,
    /// Representative `TCP_CWND` (first one encountered).
    pub tcp_cwnd: Option<u32>,
}

impl Topology {
    pub fn new(variant: BuilderVariant, transport: PeerTransport) -> Self {
        Topology {
            hosts: Vec::new(),
            variant,
            transport,
            uses_gtpe: false,
            event_size: None,
            tcp_cwnd: None,
        }
    }

    fn by_role(&self, role: Role) -> impl Iterator<Item = &Host> {
        self.hosts.iter().filter(move |h| h.role == role)
    }

    pub fn ferols(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::FerolController)
    }

    pub fn eferols(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::Ferol)
    }

    pub fn rus(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::Ru)
    }

    pub fn bus(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::Bu)
    }

    pub fn evm(&self) -> Option<&Host> {
        self.by_role(Role::Evm).next()
    }

    pub fn efeds(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::Efed)
    }

    pub fn fmms(&self) -> impl Iterator<Item = &Host> {
        self.by_role(Role::Fmm)
    }

    pub fn n_ferols(&self) -> usize {
        self.ferols().count()
    }

    pub fn n_eferols(&self) -> usize {
        self.eferols().count()
    }

    pub fn n_rus(&self) -> usize {
        self.rus().count()
    }

    pub fn n_bus(&self) -> usize {
        self.bus().count()
    }

    /// Enabled FEROL streams plus one stream per eFEROL.
    pub fn n_streams(&self) -> u32 {
        let ferol_streams: u32 = self
            .ferols()
            .filter_map(Host::ferol_streams)
            .map(|s| s.n_enabled())
            .sum();
        ferol_streams + self.n_eferols() as u32
    }

    /// All hosts in the stable order the control layer expects:
    /// role group first, index within the group second.
    pub fn hosts_ordered(&self) -> Vec<&Host> {
        let mut ordered: Vec<&Host> = self.hosts.iter().collect();
        ordered.sort_by_key(|h| (h.role.group_rank(), h.index));
        ordered
    }

    /// Compact topology string, e.g. `16s8fx1x4` or `8x1x4` for eFEROL setups.
    pub fn config_string(&self) -> String {
        if self.n_ferols() > 0 {
            format!(
                "{}s{}fx{}x{}",
                self.n_streams(),
                self.n_ferols(),
                self.n_rus(),
                self.n_bus()
            )
        } else {
            format!("{}x{}x{}", self.n_eferols(), self.n_rus(), self.n_bus())
        }
    }

    /// Resolve SOAP host names and ports for every host from a symbol map.
    pub fn fill_from_symbol_map(&mut self, map: &SymbolMap) -> Result<(), SymbolMapError> {
        for host in &mut self.hosts {
            let symbol = format!("{}_SOAP_HOST_NAME", host.name);
            let soap_host = map
                .lookup(&symbol)
                .ok_or(SymbolMapError::HostResolution(symbol))?;
            host.host = Some(soap_host);
            host.port = Some(map.lookup_port(&format!("{}_SOAP_PORT", host.name))?);
            host.lport = Some(map.lookup_port(&format!("{}_LAUNCHER_PORT", host.name))?);
        }
        Ok(())
    }

    pub fn log_hosts(&self) {
        log::info!(
            "{} configuration with {}",
            self.config_string(),
            match self.variant {
                BuilderVariant::Evb => "EvB",
                BuilderVariant::Gevb2g => "gevb2g",
            }
        );
        for host in self.hosts_ordered() {
            log::info!("{host}");
        }
    }
}

/// Parameters of a FEROL-based topology, the generator's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyParams {
    pub n_ferols: u32,
    pub streams_per_ferol: u32,
    pub n_rus: u32,
    pub n_bus: u32,
}

impl TopologyParams {
    pub fn n_streams(&self) -> u32 {
        self.n_ferols * self.streams_per_ferol
    }
}

/// A parsed command-line topology string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologySpec {
    /// `<nStreams>s<nFerols>fx<nRUs>x<nBUs>`
    Ferol(TopologyParams),
    /// `<nStreams>x<nRUs>x<nBUs>`, eFEROL based. Parses, but the generator
    /// never synthesized eFEROL partitions.
    Eferol { n_eferols: u32, n_rus: u32, n_bus: u32 },
}

impl FromStr for TopologySpec {
    type Err = TopologyStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ferol_form = Regex::new(r"^(\d+)s(\d+)fx(\d+)x(\d+)$").expect("static regex");
        let eferol_form = Regex::new(r"^(\d+)x(\d+)x(\d+)$").expect("static regex");

        let parse = |m: &str| -> u32 { m.parse().unwrap_or(0) };

        if let Some(caps) = ferol_form.captures(s) {
            let streams = parse(&caps[1]);
            let ferols = parse(&caps[2]);
            let rus = parse(&caps[3]);
            let bus = parse(&caps[4]);
            if streams == 0 || ferols == 0 || rus == 0 || bus == 0 {
                return Err(TopologyStringError::EmptyGroup(s.to_string()));
            }
            if streams % ferols != 0 || !(1..=2).contains(&(streams / ferols)) {
                return Err(TopologyStringError::BadStreamCount { streams, ferols });
            }
            Ok(TopologySpec::Ferol(TopologyParams {
                n_ferols: ferols,
                streams_per_ferol: streams / ferols,
                n_rus: rus,
                n_bus: bus,
            }))
        } else if let Some(caps) = eferol_form.captures(s) {
            let eferols = parse(&caps[1]);
            let rus = parse(&caps[2]);
            let bus = parse(&caps[3]);
            if eferols == 0 || rus == 0 || bus == 0 {
                return Err(TopologyStringError::EmptyGroup(s.to_string()));
            }
            Ok(TopologySpec::Eferol {
                n_eferols: eferols,
                n_rus: rus,
                n_bus: bus,
            })
        } else {
            Err(TopologyStringError::BadFormat(s.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ferol_topology_string() {
        let spec = TopologySpec::from_str("16s8fx1x4").unwrap();
        assert_eq!(
            spec,
            TopologySpec::Ferol(TopologyParams {
                n_ferols: 8,
                streams_per_ferol: 2,
                n_rus: 1,
                n_bus: 4,
            })
        );
        let spec = TopologySpec::from_str("8s8fx2x2").unwrap();
        assert_eq!(
            spec,
            TopologySpec::Ferol(TopologyParams {
                n_ferols: 8,
                streams_per_ferol: 1,
                n_rus: 2,
                n_bus: 2,
            })
        );
    }

    #[test]
    fn test_eferol_topology_string() {
        let spec = TopologySpec::from_str("8x1x4").unwrap();
        assert_eq!(
            spec,
            TopologySpec::Eferol {
                n_eferols: 8,
                n_rus: 1,
                n_bus: 4
            }
        );
    }

    #[test]
    fn test_bad_topology_strings() {
        assert!(matches!(
            TopologySpec::from_str("banana"),
            Err(TopologyStringError::BadFormat(_))
        ));
        // 3 streams on 2 FEROLs is not 1 or 2 per card
        assert!(matches!(
            TopologySpec::from_str("3s2fx1x1"),
            Err(TopologyStringError::BadStreamCount { .. })
        ));
        assert!(matches!(
            TopologySpec::from_str("0s0fx1x1"),
            Err(TopologyStringError::EmptyGroup(_))
        ));
    }

    #[test]
    fn test_variant_detection() {
        assert_eq!(
            BuilderVariant::from_protocol_class("gevb2g::EVM"),
            Some(BuilderVariant::Gevb2g)
        );
        assert_eq!(
            BuilderVariant::from_protocol_class("evb::RU"),
            Some(BuilderVariant::Evb)
        );
        assert_eq!(BuilderVariant::from_protocol_class("pt::ibv::Application"), None);
    }
}
