use std::fmt;

/// Role of a SOAP host, taken from the uppercase tag of its context url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    FerolController,
    /// Emulated FEROL ("eFEROL"); the upstream tag is the misnomer `FEROL`.
    Ferol,
    Ru,
    Bu,
    Evm,
    Efed,
    Gtpe,
    Fmm,
}

impl Role {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "FEROLCONTROLLER" => Some(Self::FerolController),
            "FEROL" => Some(Self::Ferol),
            "RU" => Some(Self::Ru),
            "BU" => Some(Self::Bu),
            "EVM" => Some(Self::Evm),
            "EFED" => Some(Self::Efed),
            "GTPE" => Some(Self::Gtpe),
            "FMM" => Some(Self::Fmm),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::FerolController => "FEROLCONTROLLER",
            Self::Ferol => "FEROL",
            Self::Ru => "RU",
            Self::Bu => "BU",
            Self::Evm => "EVM",
            Self::Efed => "EFED",
            Self::Gtpe => "GTPE",
            Self::Fmm => "FMM",
        }
    }

    /// Position of this role group in the host iteration order consumed by
    /// the remote-control layer.
    pub fn group_rank(&self) -> usize {
        match self {
            Self::FerolController => 0,
            Self::Ferol => 1,
            Self::Ru => 2,
            Self::Evm => 3,
            Self::Bu => 4,
            Self::Efed => 5,
            Self::Gtpe => 6,
            Self::Fmm => 7,
        }
    }
}

/// String-to-bool conversion as found in xdaq config files.
pub fn cfg_string_to_bool(s: &str) -> bool {
    matches!(s, "true" | "True" | "1")
}

/// Stream enables and the per-stream values collected for validation.
#[derive(Debug, Clone, Default)]
pub struct FerolStreams {
    pub stream0: bool,
    pub stream1: bool,
    /// `Event_Length_Max_bytes_FED{0,1}`, present only for enabled streams.
    pub max_event_size: [Option<u32>; 2],
    /// `TCP_CWND_FED{0,1}`, present only for enabled streams.
    pub tcp_cwnd: [Option<u32>; 2],
}

impl FerolStreams {
    pub fn n_enabled(&self) -> u32 {
        self.stream0 as u32 + self.stream1 as u32
    }
}

/// One FEDEmulator stream hosted by an eFED crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfedStream {
    pub instance: u32,
    pub fed_id: u32,
    pub slot: u32,
}

/// One card slot of an FMM controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmmSlot {
    pub geoslot: u32,
    pub label: String,
    pub input_labels: String,
    pub output_labels: String,
}

/// Role-specific payload of a host, decided once at construction.
#[derive(Debug, Clone)]
pub enum HostKind {
    Generic,
    Ferol(FerolStreams),
    Efed(Vec<EfedStream>),
    Fmm(Vec<FmmSlot>),
}

/// A SOAP endpoint of the partition. `host`/`port`/`lport` stay unset until
/// [`crate::topology::Topology::fill_from_symbol_map`] resolves them.
#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    pub index: u32,
    pub role: Role,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Launcher port.
    pub lport: Option<u16>,
    /// Ordered (application class, instance) pairs hosted in this context.
    pub applications: Vec<(String, u32)>,
    pub kind: HostKind,
}

impl Host {
    pub fn new(role: Role, index: u32, kind: HostKind) -> Self {
        Host {
            name: format!("{}{}", role.tag(), index),
            index,
            role,
            host: None,
            port: None,
            lport: None,
            applications: Vec::new(),
            kind,
        }
    }

    pub fn ferol_streams(&self) -> Option<&FerolStreams> {
        match &self.kind {
            HostKind::Ferol(streams) => Some(streams),
            _ => None,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} at {:>25}:{:<5} (SOAP) :{:<5} (LAUNCHER)",
            self.name,
            self.host.as_deref().unwrap_or("undefined"),
            self.port.map_or(-99, i32::from),
            self.lport.map_or(0, i32::from),
        )
    }
}
