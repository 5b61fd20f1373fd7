//! Synthesis of a complete partition file from a topology.
//!
//! The generator assembles the document from the fragment store: an i2o
//! protocol section, optionally the GTPe/eFED/FMM trigger chain, one context
//! per FEROL controller, RU, BU, and (under gevb2g) the EVM. All instance
//! numbers, FED routings and symbol references are derived from the topology
//! parameters, so the output only needs a symbol map to become runnable.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use xmltree::{Element, EmitterConfig, XMLNode};

use super::constants::{
    app_namespace, BU_STARTING_TID, EFED_FIRST_APP_ID, FED1_DESTINATION_PORT, FED_EMULATOR_CLASS,
    FEROL_CLASS, FMM_CONTROLLER_CLASS, GENERATED_CWND_DUAL_STREAM, GENERATED_CWND_SINGLE_STREAM,
    GTPE_CONTROLLER_CLASS, I2O_NS, MAX_EFED_STREAMS, POLICY_NS, PT_FRL_CLASS, RU_STARTING_TID,
};
use super::error::{ConfiguratorError, PropertyError, UnknownOperationModeError};
use super::fed_assignment::{empty_fmm_card, FedAssignment, FmmCard};
use super::fragments::FragmentStore;
use super::ibv::{stamp_ibv_application, IbvOverrides, IbvSizing};
use super::topology::{BuilderVariant, PeerTransport, TopologyParams};
use super::xmlutil;

/// Operating mode of the FEROL data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    FerolEmulator,
    FrlAutotrigger,
    FrlGtpeTrigger,
    EfedSlinkGtpe,
}

impl OperationMode {
    pub const ALL: [OperationMode; 4] = [
        Self::FerolEmulator,
        Self::FrlAutotrigger,
        Self::FrlGtpeTrigger,
        Self::EfedSlinkGtpe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FerolEmulator => "ferol_emulator",
            Self::FrlAutotrigger => "frl_autotrigger",
            Self::FrlGtpeTrigger => "frl_gtpe_trigger",
            Self::EfedSlinkGtpe => "efed_slink_gtpe",
        }
    }

    /// `OperationMode` property value and, when the FRL triggers at all, the
    /// `FrlTriggerMode` property value.
    pub fn mode_strings(&self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::FerolEmulator => ("FEROL_EMULATOR_MODE", None),
            Self::FrlAutotrigger => ("FRL_EMULATOR_MODE", Some("FRL_AUTO_TRIGGER_MODE")),
            Self::FrlGtpeTrigger => ("FRL_EMULATOR_MODE", Some("FRL_GTPE_TRIGGER_MODE")),
            Self::EfedSlinkGtpe => ("SLINK_MODE", Some("FRL_GTPE_TRIGGER_MODE")),
        }
    }
}

impl FromStr for OperationMode {
    type Err = UnknownOperationModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|m| m.name() == s)
            .copied()
            .ok_or_else(|| UnknownOperationModeError(s.to_string()))
    }
}

/// FEROL source hosts per rack of the test farm.
fn ferol_rack_host(rack: u8, ferol_index: u32) -> Result<String, ConfiguratorError> {
    let row = match rack {
        1 => 19,
        2 => 28,
        3 => 37,
        _ => return Err(ConfiguratorError::UnknownFerolRack(rack)),
    };
    Ok(format!(
        "dvferol-c2f32-{}-{:02}.dvfbs2v0.cms",
        row,
        ferol_index + 1
    ))
}

#[derive(Debug, Clone)]
pub struct Configurator {
    store: FragmentStore,
    pub variant: BuilderVariant,
    pub transport: PeerTransport,
    pub operation_mode: OperationMode,
    pub ferol_rack: u8,
    pub use_gtpe: bool,
    pub use_efeds: bool,
    /// Leave the fragment default when unset.
    pub pause_frame: Option<bool>,
    /// Overrides the per-stream-count congestion window defaults.
    pub tcp_cwnd: Option<u32>,
    /// Compute the pt::ibv resources from the builder parameters and stamp
    /// them into every context, instead of keeping the fragment values.
    pub dynamic_ibv: bool,
    pub ibv_overrides: IbvOverrides,
}

impl Configurator {
    pub fn new(store: FragmentStore, variant: BuilderVariant, transport: PeerTransport) -> Self {
        Configurator {
            store,
            variant,
            transport,
            operation_mode: OperationMode::FerolEmulator,
            ferol_rack: 1,
            use_gtpe: false,
            use_efeds: false,
            pause_frame: None,
            tcp_cwnd: None,
            dynamic_ibv: false,
            ibv_overrides: IbvOverrides::default(),
        }
    }

    /// Build the partition document and write it to `destination`. Nothing is
    /// written when any part of the synthesis fails.
    pub fn make_config(
        &self,
        params: &TopologyParams,
        destination: &Path,
    ) -> Result<(), ConfiguratorError> {
        let document = self.build_partition(params)?;
        let file = File::create(destination)?;
        let emitter = EmitterConfig::new()
            .perform_indent(true)
            .write_document_declaration(false);
        document.write_with_config(BufWriter::new(file), emitter)?;
        log::info!(
            "Wrote {}s{}fx{}x{} partition to {}",
            params.n_streams(),
            params.n_ferols,
            params.n_rus,
            params.n_bus,
            destination.display()
        );
        Ok(())
    }

    /// Build the partition document in memory.
    pub fn build_partition(&self, params: &TopologyParams) -> Result<Element, ConfiguratorError> {
        if self.use_efeds && params.n_streams() > MAX_EFED_STREAMS {
            return Err(ConfiguratorError::TooManyEfedStreams(
                params.n_streams(),
                MAX_EFED_STREAMS,
            ));
        }

        let sizing = match self.transport {
            PeerTransport::Ibv if self.dynamic_ibv => {
                let sizing = IbvSizing::compute(
                    &self.store,
                    self.variant,
                    params.n_rus as u64,
                    params.n_bus as u64,
                    &self.ibv_overrides,
                )?;
                sizing.log_summary();
                Some(sizing)
            }
            PeerTransport::Ibv => {
                IbvSizing::read(&self.store, self.variant)?.log_summary();
                None
            }
            PeerTransport::Udapl => None,
        };

        let doc = self.store.load("skeleton.xml")?;
        let xdaq_ns = doc
            .namespace
            .clone()
            .ok_or(ConfiguratorError::MissingNamespace)?;

        let mut builder = PartitionBuilder {
            cfg: self,
            params: *params,
            assignment: FedAssignment::new(params),
            xdaq_ns,
            doc,
            sizing,
            efed_crate: 0,
            efed_instance: 0,
        };

        builder.add_i2o_protocol();
        if self.use_gtpe {
            if self.use_efeds {
                builder.add_gtpe(0, "0x7")?;
                builder.add_efeds()?;
                let cards = builder.assignment.fmm_cards(3)?;
                builder.add_fmm(&cards)?;
            } else {
                builder.add_gtpe(3, "0x8")?;
                builder.add_fmm(&[empty_fmm_card()])?;
            }
        }
        builder.add_ferol_controllers()?;
        for index in 0..params.n_rus {
            let context = builder.make_ru(index)?;
            builder.doc.children.push(XMLNode::Element(context));
        }
        if self.variant == BuilderVariant::Gevb2g {
            let context = builder.make_evm()?;
            builder.doc.children.push(XMLNode::Element(context));
        }
        for index in 0..params.n_bus {
            let context = builder.make_bu(index)?;
            builder.doc.children.push(XMLNode::Element(context));
        }

        Ok(builder.doc)
    }
}

/// Per-invocation build state: the document under construction and the
/// running eFED counters.
struct PartitionBuilder<'a> {
    cfg: &'a Configurator,
    params: TopologyParams,
    assignment: FedAssignment,
    xdaq_ns: String,
    doc: Element,
    sizing: Option<IbvSizing>,
    efed_crate: u32,
    efed_instance: u32,
}

impl PartitionBuilder<'_> {
    fn xdaq_element(&self, name: &str) -> Element {
        xmlutil::new_element("xc", &self.xdaq_ns, name)
    }

    fn module(&self, library: &str) -> Element {
        let mut module = self.xdaq_element("Module");
        xmlutil::set_text(&mut module, library);
        module
    }

    fn i2o_endpoint(&self, host_tag: &str, index: u32) -> Element {
        let mut endpoint = self.xdaq_element("Endpoint");
        for (key, value) in [
            ("protocol", self.cfg.transport.name().to_string()),
            ("service", "i2o".to_string()),
            ("hostname", format!("{host_tag}{index}_I2O_HOST_NAME")),
            ("port", format!("{host_tag}{index}_I2O_PORT")),
            ("network", "infini".to_string()),
        ] {
            endpoint.attributes.insert(key.to_string(), value);
        }
        endpoint
    }

    fn add_i2o_protocol(&mut self) {
        let ns = self.cfg.variant.ns();
        let mut protocol = xmlutil::new_element("i2o", I2O_NS, "protocol");
        let target = |class: String, instance: u32, tid: u32| {
            let mut t = xmlutil::new_element("i2o", I2O_NS, "target");
            t.attributes.insert("class".to_string(), class);
            t.attributes.insert("instance".to_string(), instance.to_string());
            t.attributes.insert("tid".to_string(), tid.to_string());
            XMLNode::Element(t)
        };

        protocol.children.push(target(format!("{ns}::EVM"), 0, 1));
        for n in 0..self.params.n_rus {
            // under evb, RU0 is the EVM target above
            if self.cfg.variant == BuilderVariant::Evb && n == 0 {
                continue;
            }
            protocol
                .children
                .push(target(format!("{ns}::RU"), n, RU_STARTING_TID + n));
        }
        for n in 0..self.params.n_bus {
            protocol
                .children
                .push(target(format!("{ns}::BU"), n, BU_STARTING_TID + 2 * n));
        }

        self.doc.children.push(XMLNode::Element(protocol));
    }

    fn add_gtpe(&mut self, partition_id: u32, enable_mask: &str) -> Result<(), ConfiguratorError> {
        let mut context = self.cfg.store.load("GTPe.xml")?;
        let set = |context: &mut Element, prop: &str, value: &str| {
            xmlutil::set_property_in_app(context, &self.xdaq_ns, GTPE_CONTROLLER_CLASS, prop, value)
        };
        set(&mut context, "daqPartitionId", &partition_id.to_string())?;
        set(&mut context, "detPartitionEnableMask", enable_mask)?;
        set(&mut context, "triggerRate", "100.0")?;
        self.doc.children.push(XMLNode::Element(context));
        Ok(())
    }

    fn make_ferol_controller(&self, slot: u32) -> Result<Element, ConfiguratorError> {
        let ferol_index = slot - 1;
        let (fed0, fed1) = self.assignment.fed_ids_for_ferol(ferol_index);
        let source_ip = ferol_rack_host(self.cfg.ferol_rack, ferol_index)?;

        let mut context = self.cfg.store.load("FerolController.xml")?;
        let set = |context: &mut Element, prop: &str, value: &str| {
            xmlutil::set_property_in_app(context, &self.xdaq_ns, FEROL_CLASS, prop, value)
        };

        set(&mut context, "slotNumber", &slot.to_string())?;
        set(&mut context, "expectedFedId_0", &fed0.to_string())?;
        set(&mut context, "expectedFedId_1", &fed1.to_string())?;
        set(&mut context, "SourceIP", &source_ip)?;

        let dual = self.params.streams_per_ferol == 2;
        let cwnd = self.cfg.tcp_cwnd.unwrap_or(if dual {
            GENERATED_CWND_DUAL_STREAM
        } else {
            GENERATED_CWND_SINGLE_STREAM
        });
        set(&mut context, "TCP_CWND_FED0", &cwnd.to_string())?;
        set(&mut context, "TCP_CWND_FED1", &cwnd.to_string())?;
        set(&mut context, "enableStream0", "true")?;
        set(&mut context, "enableStream1", if dual { "true" } else { "false" })?;
        if let Some(pause) = self.cfg.pause_frame {
            set(&mut context, "ENA_PAUSE_FRAME", if pause { "true" } else { "false" })?;
        }

        let ru_index = self.assignment.ru_for_ferol(ferol_index);
        log::debug!("ferol {slot:2}, streaming to RU{ru_index}, fedids {fed0}/{fed1}");
        set(
            &mut context,
            "TCP_DESTINATION_PORT_FED0",
            &format!("RU{ru_index}_FRL_PORT"),
        )?;
        set(&mut context, "TCP_DESTINATION_PORT_FED1", FED1_DESTINATION_PORT)?;

        let (operation_mode, trigger_mode) = self.cfg.operation_mode.mode_strings();
        set(&mut context, "OperationMode", operation_mode)?;
        match trigger_mode {
            Some(mode) => set(&mut context, "FrlTriggerMode", mode)?,
            None => xmlutil::remove_property_in_app(
                &mut context,
                &self.xdaq_ns,
                FEROL_CLASS,
                "FrlTriggerMode",
            )?,
        }

        self.fill_context_url(&mut context, ferol_index);
        Ok(context)
    }

    fn add_ferol_controllers(&mut self) -> Result<(), ConfiguratorError> {
        for slot in 1..=self.params.n_ferols {
            let context = self.make_ferol_controller(slot)?;
            self.doc.children.push(XMLNode::Element(context));
        }
        Ok(())
    }

    fn make_efed(&mut self, feds: &[(u32, u32)]) -> Result<Element, ConfiguratorError> {
        let mut context = self.cfg.store.load("eFED_context.xml")?;
        let ctx_label = format!("EFED{}", self.efed_crate);

        for (n, (fed_id, slot)) in feds.iter().enumerate() {
            let mut app = self.cfg.store.load("eFED_application.xml")?;
            app.attributes
                .insert("id".to_string(), (EFED_FIRST_APP_ID + n as u32).to_string());
            app.attributes
                .insert("instance".to_string(), self.efed_instance.to_string());
            xmlutil::set_property_in_app_element(
                &mut app,
                FED_EMULATOR_CLASS,
                "slot",
                &slot.to_string(),
                &ctx_label,
            )?;
            xmlutil::set_property_in_app_element(
                &mut app,
                FED_EMULATOR_CLASS,
                "FedSourceId",
                &fed_id.to_string(),
                &ctx_label,
            )?;
            // keep the library module behind the applications
            let insert_at = context.children.len().saturating_sub(1);
            context.children.insert(insert_at, XMLNode::Element(app));
            self.efed_instance += 1;
        }

        self.fill_context_url(&mut context, self.efed_crate);
        self.efed_crate += 1;
        Ok(context)
    }

    fn add_efeds(&mut self) -> Result<(), ConfiguratorError> {
        let groups = self.assignment.efed_groups()?;
        for group in &groups {
            log::info!("eFED crate (fedid, slot): {group:?}");
            let context = self.make_efed(group)?;
            self.doc.children.push(XMLNode::Element(context));
        }
        Ok(())
    }

    fn add_fmm(&mut self, cards: &[FmmCard]) -> Result<(), ConfiguratorError> {
        let mut context = self.cfg.store.load("FMM_context.xml")?;
        let template = self.cfg.store.load("FMM_card_eFED.xml")?;
        let url = "FMM0".to_string();

        let fmm_ns = app_namespace(FMM_CONTROLLER_CLASS);
        let app = xmlutil::find_application_mut(&mut context, &self.xdaq_ns, FMM_CONTROLLER_CLASS)
            .ok_or_else(|| PropertyError::ApplicationNotFound {
                class: FMM_CONTROLLER_CLASS.to_string(),
                context: url.clone(),
            })?;
        let properties = xmlutil::find_child_mut(app, &fmm_ns, "properties").ok_or_else(|| {
            PropertyError::MissingProperties {
                class: FMM_CONTROLLER_CLASS.to_string(),
                context: url.clone(),
            }
        })?;
        let config = xmlutil::find_child_mut(properties, &fmm_ns, "config").ok_or_else(|| {
            PropertyError::PropertyNotFound {
                property: "config".to_string(),
                class: FMM_CONTROLLER_CLASS.to_string(),
                context: url,
            }
        })?;
        config
            .attributes
            .insert("arrayType".to_string(), format!("xsd:ur-type[{}]", cards.len()));

        for (n, card) in cards.iter().enumerate() {
            let mut item = template.clone();
            item.attributes
                .insert("position".to_string(), format!("[{n}]"));
            for (field, value) in [
                ("geoslot", card.geoslot.to_string()),
                ("inputEnableMask", card.input_mask.clone()),
                ("inputLabels", card.input_labels.clone()),
                ("outputLabels", card.output_labels.clone()),
                ("label", card.label.clone()),
            ] {
                let child = xmlutil::find_child_local_mut(&mut item, field).ok_or_else(|| {
                    PropertyError::PropertyNotFound {
                        property: field.to_string(),
                        class: FMM_CONTROLLER_CLASS.to_string(),
                        context: "FMM card fragment".to_string(),
                    }
                })?;
                xmlutil::set_text(child, &value);
            }
            config.children.push(XMLNode::Element(item));
        }

        self.doc.children.push(XMLNode::Element(context));
        Ok(())
    }

    /// Insert policy, builder-network endpoint, peer transport application and
    /// its module at the head of a context, in that order.
    fn add_context_plumbing(
        &self,
        context: &mut Element,
        policy_rel: &str,
        pt_app_rel: &str,
        pattern_token: &str,
        host_tag: &str,
        index: u32,
    ) -> Result<(), ConfiguratorError> {
        let mut policy = self.cfg.store.load(policy_rel)?;
        let replacement = format!("{host_tag}{index}");
        for element in xmlutil::children_mut(&mut policy, POLICY_NS, "element") {
            if let Some(pattern) = element.attributes.get_mut("pattern") {
                if pattern.contains(pattern_token) {
                    *pattern = pattern.replace(pattern_token, &replacement);
                }
            }
        }
        context.children.insert(0, XMLNode::Element(policy));

        let n_endpoints = xmlutil::children(context, &self.xdaq_ns, "Endpoint").count();
        let insert_at = 1 + n_endpoints; // behind the policy and any data endpoints
        context
            .children
            .insert(insert_at, XMLNode::Element(self.i2o_endpoint(host_tag, index)));

        let pt_app = self.cfg.store.load(pt_app_rel)?;
        context
            .children
            .insert(insert_at + 1, XMLNode::Element(pt_app));
        context.children.insert(
            insert_at + 2,
            XMLNode::Element(self.module(&self.cfg.transport.library())),
        );
        Ok(())
    }

    fn stamp_sizing(
        &self,
        context: &mut Element,
        pick: impl Fn(&IbvSizing) -> &super::ibv::IbvParams,
    ) -> Result<(), ConfiguratorError> {
        if let Some(sizing) = &self.sizing {
            stamp_ibv_application(context, &self.xdaq_ns, pick(sizing))?;
        }
        Ok(())
    }

    fn make_ru(&self, index: u32) -> Result<Element, ConfiguratorError> {
        let variant = self.cfg.variant;
        let mut context = self
            .cfg
            .store
            .load(&format!("RU/{}/RU_context.xml", variant.ns()))?;
        self.add_context_plumbing(
            &mut context,
            &format!("RU/{}/RU_policy_{}.xml", variant.ns(), self.cfg.transport.name()),
            &format!("RU/{}/RU_{}_application.xml", variant.ns(), self.cfg.transport.name()),
            "RU%d",
            "RU",
            index,
        )?;
        let is_evm = variant == BuilderVariant::Evb && index == 0;
        if is_evm {
            self.stamp_sizing(&mut context, |s| &s.evm)?;
        } else {
            self.stamp_sizing(&mut context, |s| &s.ru)?;
        }

        self.fill_frl_routing(&mut context, index)?;

        let app_rel = if is_evm {
            "RU/evb/RU_application_EVM.xml".to_string()
        } else {
            format!("RU/{}/RU_application.xml", variant.ns())
        };
        let mut ru_app = self.cfg.store.load(&app_rel)?;
        ru_app
            .attributes
            .insert("instance".to_string(), index.to_string());
        if variant == BuilderVariant::Evb {
            let class = if is_evm { "evb::EVM" } else { "evb::RU" };
            self.fill_fed_source_ids(&mut ru_app, class, index)?;
        }
        // keep the role application in front of the trailing pt::frl module
        let insert_at = context.children.len().saturating_sub(1);
        context.children.insert(insert_at, XMLNode::Element(ru_app));

        self.fill_endpoints(&mut context, index);
        self.fill_context_url(&mut context, index);
        Ok(context)
    }

    fn fill_frl_routing(&self, context: &mut Element, index: u32) -> Result<(), ConfiguratorError> {
        let frl_ns = app_namespace(PT_FRL_CLASS);
        let url = format!("RU{index}");
        let feds = self.assignment.fed_ids_for_ru(index);

        let mut item_template = self.cfg.store.load("RU/RU_frl_routing.xml")?;
        let class_name = if self.cfg.variant == BuilderVariant::Evb && index == 0 {
            format!("{}::EVM", self.cfg.variant.ns())
        } else {
            format!("{}::RU", self.cfg.variant.ns())
        };
        for (field, value) in [("className", class_name), ("instance", index.to_string())] {
            let child = xmlutil::find_child_mut(&mut item_template, &frl_ns, field).ok_or_else(
                || PropertyError::PropertyNotFound {
                    property: field.to_string(),
                    class: PT_FRL_CLASS.to_string(),
                    context: url.clone(),
                },
            )?;
            xmlutil::set_text(child, &value);
        }

        let app = xmlutil::find_application_mut(context, &self.xdaq_ns, PT_FRL_CLASS).ok_or_else(
            || PropertyError::ApplicationNotFound {
                class: PT_FRL_CLASS.to_string(),
                context: url.clone(),
            },
        )?;
        let properties = xmlutil::find_child_mut(app, &frl_ns, "properties").ok_or_else(|| {
            PropertyError::MissingProperties {
                class: PT_FRL_CLASS.to_string(),
                context: url.clone(),
            }
        })?;
        let routing = xmlutil::find_child_mut(properties, &frl_ns, "frlRouting").ok_or_else(
            || PropertyError::PropertyNotFound {
                property: "frlRouting".to_string(),
                class: PT_FRL_CLASS.to_string(),
                context: url,
            },
        )?;
        routing
            .attributes
            .insert("arrayType".to_string(), format!("xsd:ur-type[{}]", feds.len()));

        for (n, fed) in feds.iter().enumerate() {
            let mut item = item_template.clone();
            item.attributes
                .insert("position".to_string(), format!("[{n}]"));
            let fedid = xmlutil::find_child_mut(&mut item, &frl_ns, "fedid").ok_or_else(|| {
                PropertyError::PropertyNotFound {
                    property: "fedid".to_string(),
                    class: PT_FRL_CLASS.to_string(),
                    context: "FRL routing fragment".to_string(),
                }
            })?;
            xmlutil::set_text(fedid, &fed.to_string());
            routing.children.push(XMLNode::Element(item));
        }
        Ok(())
    }

    /// Replace the single template entry of `fedSourceIds` with the ids owned
    /// by this RU.
    fn fill_fed_source_ids(
        &self,
        ru_app: &mut Element,
        class: &str,
        index: u32,
    ) -> Result<(), ConfiguratorError> {
        let ns = app_namespace(class);
        let url = format!("RU{index}");
        let feds = self.assignment.fed_ids_for_ru(index);

        let properties = xmlutil::find_child_mut(ru_app, &ns, "properties").ok_or_else(|| {
            PropertyError::MissingProperties {
                class: class.to_string(),
                context: url.clone(),
            }
        })?;
        let source_ids = xmlutil::find_child_mut(properties, &ns, "fedSourceIds").ok_or_else(
            || PropertyError::PropertyNotFound {
                property: "fedSourceIds".to_string(),
                class: class.to_string(),
                context: url.clone(),
            },
        )?;
        source_ids
            .attributes
            .insert("arrayType".to_string(), format!("xsd:ur-type[{}]", feds.len()));

        let template_at = source_ids
            .children
            .iter()
            .position(|c| {
                c.as_element()
                    .map(|e| e.name == "item" && e.namespace.as_deref() == Some(ns.as_str()))
                    .unwrap_or(false)
            })
            .ok_or_else(|| PropertyError::PropertyNotFound {
                property: "fedSourceIds/item".to_string(),
                class: class.to_string(),
                context: url,
            })?;
        let template = match source_ids.children.remove(template_at) {
            XMLNode::Element(el) => el,
            _ => unreachable!("position matched an element"),
        };

        for (n, fed) in feds.iter().enumerate() {
            let mut item = template.clone();
            item.attributes
                .insert("position".to_string(), format!("[{n}]"));
            xmlutil::set_text(&mut item, &fed.to_string());
            source_ids.children.push(XMLNode::Element(item));
        }
        Ok(())
    }

    fn make_evm(&self) -> Result<Element, ConfiguratorError> {
        let mut context = self.cfg.store.load("EVM/EVM_context.xml")?;
        self.add_context_plumbing(
            &mut context,
            &format!("EVM/EVM_policy_{}.xml", self.cfg.transport.name()),
            &format!("EVM/EVM_{}_application.xml", self.cfg.transport.name()),
            "EVM%d",
            "EVM",
            0,
        )?;
        self.stamp_sizing(&mut context, |s| &s.evm)?;

        let evm_class = format!("{}::EVM", self.cfg.variant.ns());
        if let Some(app) = xmlutil::find_application_mut(&mut context, &self.xdaq_ns, &evm_class) {
            app.attributes.insert("instance".to_string(), "0".to_string());
        }

        self.fill_endpoints(&mut context, 0);
        self.fill_context_url(&mut context, 0);
        Ok(context)
    }

    fn make_bu(&self, index: u32) -> Result<Element, ConfiguratorError> {
        let variant = self.cfg.variant;
        let mut context = self.cfg.store.load("BU/BU_context.xml")?;
        self.add_context_plumbing(
            &mut context,
            &format!("BU/{}/BU_policy_{}.xml", variant.ns(), self.cfg.transport.name()),
            &format!("BU/BU_{}_application.xml", self.cfg.transport.name()),
            "BU%d",
            "BU",
            index,
        )?;
        self.stamp_sizing(&mut context, |s| &s.bu)?;

        let mut bu_app = self
            .cfg
            .store
            .load(&format!("BU/{}/BU_application.xml", variant.ns()))?;
        bu_app
            .attributes
            .insert("instance".to_string(), index.to_string());
        context.children.push(XMLNode::Element(bu_app));
        context
            .children
            .push(XMLNode::Element(self.module(variant.library())));

        self.fill_endpoints(&mut context, index);
        self.fill_context_url(&mut context, index);
        Ok(context)
    }

    fn fill_endpoints(&self, context: &mut Element, index: u32) {
        for endpoint in xmlutil::children_mut(context, &self.xdaq_ns, "Endpoint") {
            for key in ["hostname", "port"] {
                if let Some(value) = endpoint.attributes.get_mut(key) {
                    if value.contains("%d") {
                        *value = xmlutil::fill_url(value, index);
                    }
                }
            }
        }
    }

    fn fill_context_url(&self, context: &mut Element, index: u32) {
        if let Some(url) = context.attributes.get_mut("url") {
            *url = xmlutil::fill_url(url, index);
        }
    }
}
