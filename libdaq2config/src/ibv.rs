//! Sizing of the Infiniband verbs (pt::ibv) resources of a partition.
//!
//! Two modes exist: taking the sizes verbatim from the pt::ibv application
//! fragments, or deriving them from the event-builder parameters so the queue
//! pairs and memory pools match the topology being generated.

use human_bytes::human_bytes;
use xmltree::Element;

use super::constants::PT_IBV_CLASS;
use super::error::ConfiguratorError;
use super::fragments::FragmentStore;
use super::topology::BuilderVariant;
use super::xmlutil;

/// Fixed receive side of the RU and send side of the BU.
const FIXED_POOL_SIZE: u64 = 0x40000000;
const FIXED_QP_SIZE: u64 = 2048;
/// EVM pools are pinned at 3.9 GiB.
const EVM_POOL_SIZE: u64 = 39 * (1 << 30) / 10;

/// Resource set of one pt::ibv application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IbvParams {
    pub send_pool_size: u64,
    pub recv_pool_size: u64,
    pub compl_qp_size: u64,
    pub send_qp_size: u64,
    pub recv_qp_size: u64,
}

/// Per-role resource sets for a whole partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbvSizing {
    pub ru: IbvParams,
    pub bu: IbvParams,
    pub evm: IbvParams,
}

/// Manual overrides for the computed sizing. Pool overrides are in MB.
#[derive(Debug, Clone, Copy, Default)]
pub struct IbvOverrides {
    pub ru_send_qp_size: Option<u64>,
    pub ru_send_pool_mb: Option<u64>,
    pub ru_compl_qp_size: Option<u64>,
    pub bu_recv_qp_size: Option<u64>,
    pub bu_recv_pool_mb: Option<u64>,
    pub bu_compl_qp_size: Option<u64>,
}

fn read_params(app: &Element) -> Result<IbvParams, ConfiguratorError> {
    let read = |prop: &str| -> Result<u64, ConfiguratorError> {
        let value = xmlutil::read_property_from_app(app, PT_IBV_CLASS, prop)?;
        Ok(xmlutil::parse_maybe_hex(prop, &value)?)
    };
    Ok(IbvParams {
        send_pool_size: read("senderPoolSize")?,
        recv_pool_size: read("receiverPoolSize")?,
        compl_qp_size: read("completionQueueSize")?,
        send_qp_size: read("sendQueuePairSize")?,
        recv_qp_size: read("recvQueuePairSize")?,
    })
}

fn read_max_message_size(app: &Element) -> Result<u64, ConfiguratorError> {
    let value = xmlutil::read_property_from_app(app, PT_IBV_CLASS, "maxMessageSize")?;
    Ok(xmlutil::parse_maybe_hex("maxMessageSize", &value)?)
}

/// The property carrying the number of events a BU builds concurrently.
fn max_events_property(variant: BuilderVariant) -> &'static str {
    match variant {
        BuilderVariant::Evb => "maxEvtsUnderConstruction",
        BuilderVariant::Gevb2g => "maxResources",
    }
}

impl IbvSizing {
    /// Take the resource sets verbatim from the pt::ibv fragments. Under evb
    /// there is no separate EVM context; RU0 plays that role and keeps the RU
    /// sizes.
    pub fn read(store: &FragmentStore, variant: BuilderVariant) -> Result<Self, ConfiguratorError> {
        let ru_app = store.load(&format!("RU/{}/RU_ibv_application.xml", variant.ns()))?;
        let bu_app = store.load("BU/BU_ibv_application.xml")?;
        let ru = read_params(&ru_app)?;
        let bu = read_params(&bu_app)?;
        let evm = match variant {
            BuilderVariant::Gevb2g => read_params(&store.load("EVM/EVM_ibv_application.xml")?)?,
            BuilderVariant::Evb => ru,
        };
        Ok(IbvSizing { ru, bu, evm })
    }

    /// Derive the resource sets from the event-builder parameters.
    ///
    /// RU send resources scale with the number of BUs, BU receive resources
    /// with the RU send pool spread over the RUs. A maxMessageSize mismatch
    /// between the RU and BU fragments is tolerated with the RU value winning.
    pub fn compute(
        store: &FragmentStore,
        variant: BuilderVariant,
        n_rus: u64,
        n_bus: u64,
        overrides: &IbvOverrides,
    ) -> Result<Self, ConfiguratorError> {
        let ru_app = store.load(&format!("RU/{}/RU_ibv_application.xml", variant.ns()))?;
        let bu_app = store.load("BU/BU_ibv_application.xml")?;
        let builder_app = store.load(&format!("BU/{}/BU_application.xml", variant.ns()))?;

        let builder_class = format!("{}::BU", variant.ns());
        let max_events = xmlutil::parse_maybe_hex(
            max_events_property(variant),
            &xmlutil::read_property_from_app(
                &builder_app,
                &builder_class,
                max_events_property(variant),
            )?,
        )?;

        let ru_max_msg = read_max_message_size(&ru_app)?;
        let bu_max_msg = read_max_message_size(&bu_app)?;
        if ru_max_msg != bu_max_msg {
            log::warn!(
                "Differing maxMessageSize on RU ({ru_max_msg}) and BU ({bu_max_msg}); using the RU value"
            );
        }

        let send_qp_size = overrides.ru_send_qp_size.unwrap_or(max_events * n_bus);
        let ru = IbvParams {
            send_qp_size,
            send_pool_size: overrides
                .ru_send_pool_mb
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(send_qp_size * ru_max_msg),
            compl_qp_size: overrides.ru_compl_qp_size.unwrap_or(8192),
            recv_pool_size: FIXED_POOL_SIZE,
            recv_qp_size: FIXED_QP_SIZE,
        };

        let recv_qp_size = overrides
            .bu_recv_qp_size
            .unwrap_or(ru.send_pool_size * 2 / n_rus / bu_max_msg);
        let bu = IbvParams {
            recv_qp_size,
            recv_pool_size: overrides
                .bu_recv_pool_mb
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or((recv_qp_size + max_events) * n_rus * bu_max_msg),
            compl_qp_size: overrides.bu_compl_qp_size.unwrap_or(recv_qp_size * n_rus),
            send_pool_size: FIXED_POOL_SIZE,
            send_qp_size: FIXED_QP_SIZE,
        };

        let evm = IbvParams {
            send_pool_size: EVM_POOL_SIZE,
            recv_pool_size: EVM_POOL_SIZE,
            compl_qp_size: 12800,
            send_qp_size: 128,
            recv_qp_size: 256,
        };

        Ok(IbvSizing { ru, bu, evm })
    }

    pub fn log_summary(&self) {
        for (role, params) in [("RU", &self.ru), ("BU", &self.bu), ("EVM", &self.evm)] {
            log::info!(
                "{} pt::ibv config: sendPool {} ({:#x}), recvPool {} ({:#x}), complQP {}, sendQP {}, recvQP {}",
                role,
                human_bytes(params.send_pool_size as f64),
                params.send_pool_size,
                human_bytes(params.recv_pool_size as f64),
                params.recv_pool_size,
                params.compl_qp_size,
                params.send_qp_size,
                params.recv_qp_size,
            );
        }
    }
}

/// Stamp a resource set into the pt::ibv application of a context. Pool sizes
/// are written in hex, queue sizes in decimal.
pub fn stamp_ibv_application(
    context: &mut Element,
    xdaq_ns: &str,
    params: &IbvParams,
) -> Result<(), ConfiguratorError> {
    let mut set = |prop: &str, value: String| -> Result<(), ConfiguratorError> {
        xmlutil::set_property_in_app(context, xdaq_ns, PT_IBV_CLASS, prop, &value)?;
        Ok(())
    };
    set("senderPoolSize", format!("{:#x}", params.send_pool_size))?;
    set("receiverPoolSize", format!("{:#x}", params.recv_pool_size))?;
    set("completionQueueSize", params.compl_qp_size.to_string())?;
    set("sendQueuePairSize", params.send_qp_size.to_string())?;
    set("recvQueuePairSize", params.recv_qp_size.to_string())?;
    Ok(())
}
