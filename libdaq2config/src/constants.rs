//! Fixed identifiers, namespaces and policy tables of the daq2 validation setup.

/// First FED id of the contiguous block reserved for the test setup.
/// The production cabling starts at 901 instead; see [`crate::fed_assignment::FedAssignment::with_base`].
pub const FED_ID_BASE: u32 = 900;
/// Size of the reserved FED id block, two ids per FEROL slot.
pub const NUM_FED_IDS: u32 = 32;

pub const RU_STARTING_TID: u32 = 10;
pub const BU_STARTING_TID: u32 = 30;
/// xdaq application id given to the first FEDEmulator in an eFED crate.
pub const EFED_FIRST_APP_ID: u32 = 50;
/// Number of FED emulator channels physically available.
pub const MAX_EFED_STREAMS: u32 = 16;

pub const I2O_NS: &str = "http://xdaq.web.cern.ch/xdaq/xsd/2004/I2OConfiguration-30";
pub const POLICY_NS: &str = "http://xdaq.web.cern.ch/xdaq/xsd/2013/XDAQPolicy-10";
pub const SOAPENC_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Namespace of the properties element of a given xdaq application class.
pub fn app_namespace(class: &str) -> String {
    format!("urn:xdaq-application:{class}")
}

pub const FEROL_CLASS: &str = "ferol::FerolController";
pub const FED_EMULATOR_CLASS: &str = "d2s::FEDEmulator";
pub const FMM_CONTROLLER_CLASS: &str = "tts::FMMController";
pub const GTPE_CONTROLLER_CLASS: &str = "d2s::GTPeController";
pub const PT_FRL_CLASS: &str = "pt::frl::Application";
pub const PT_IBV_CLASS: &str = "pt::ibv::Application";
pub const PT_UDAPL_CLASS: &str = "pt::udapl::Application";

/// TCP congestion window written by the generator, by number of active streams.
pub const GENERATED_CWND_SINGLE_STREAM: u32 = 135000;
pub const GENERATED_CWND_DUAL_STREAM: u32 = 62500;

/// Congestion windows considered in-policy by the reader. The derivation of
/// these numbers was never documented upstream, so a mismatch is advisory only.
pub const CWND_POLICY_SINGLE_STREAM: [u32; 2] = [80000, 55000];
pub const CWND_POLICY_DUAL_STREAM: [u32; 2] = [40000, 35000];

/// Second-stream TCP destination port used when the first stream is routed by symbol.
pub const FED1_DESTINATION_PORT: &str = "60600";

pub const FMM_GEOSLOTS: [u32; 3] = [5, 7, 9];
pub const FMM_LABELS: [&str; 3] = ["CSC_EFED", "ECAL_EFED", "TRACKER_EFED"];
pub const MAX_FMM_CARDS: usize = 3;

/// (max event size, scan-until size) keyed by merging factor (streams per RU).
pub fn size_limit_for_merging(streams_per_ru: u32) -> Option<(u32, u32)> {
    match streams_per_ru {
        4 => Some((32000, 16000)),
        8 => Some((32000, 16000)),
        12 => Some((21000, 10240)),
        16 => Some((16000, 8192)),
        24 => Some((10500, 5120)),
        _ => None,
    }
}
