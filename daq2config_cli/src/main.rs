use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Arg, ArgAction, Command};

use libdaq2config::configurator::{Configurator, OperationMode};
use libdaq2config::fragments::FragmentStore;
use libdaq2config::ibv::IbvOverrides;
use libdaq2config::reader::ConfigReader;
use libdaq2config::symbol_map::SymbolMap;
use libdaq2config::topology::{BuilderVariant, PeerTransport, TopologySpec};

fn make_cli() -> Command {
    Command::new("daq2config_cli")
        .about("Generate and inspect XDAQ event-builder partition files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("topology")
                .help("Topology string, e.g. 16s8fx1x4 (streams/ferols x RUs x BUs)"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("FILE")
                .help("Read an existing partition file and report its topology"),
        )
        .arg(
            Arg::new("evb")
                .long("use-evb")
                .action(ArgAction::SetTrue)
                .conflicts_with("gevb2g")
                .help("Generate for the evb builder (the default)"),
        )
        .arg(
            Arg::new("gevb2g")
                .long("use-gevb2g")
                .action(ArgAction::SetTrue)
                .help("Generate for the gevb2g builder instead of evb"),
        )
        .arg(
            Arg::new("ibv")
                .long("use-ibv")
                .action(ArgAction::SetTrue)
                .conflicts_with("udapl")
                .help("Use the pt::ibv peer transport (the default)"),
        )
        .arg(
            Arg::new("udapl")
                .long("use-udapl")
                .action(ArgAction::SetTrue)
                .help("Use the pt::udapl peer transport instead of pt::ibv"),
        )
        .arg(
            Arg::new("gtpe")
                .long("use-gtpe")
                .action(ArgAction::SetTrue)
                .help("Add a GTPe trigger context"),
        )
        .arg(
            Arg::new("efeds")
                .long("use-efeds")
                .action(ArgAction::SetTrue)
                .help("Add emulated FED crates and the FMM chain (implies --use-gtpe)"),
        )
        .arg(
            Arg::new("mode")
                .long("ferol-mode")
                .value_name("MODE")
                .default_value("ferol_emulator")
                .help("ferol_emulator, frl_autotrigger, frl_gtpe_trigger or efed_slink_gtpe"),
        )
        .arg(
            Arg::new("rack")
                .long("ferol-rack")
                .value_name("RACK")
                .default_value("1")
                .help("FEROL source rack (1-3)"),
        )
        .arg(
            Arg::new("cwnd")
                .long("set-cwnd")
                .value_name("BYTES")
                .help("Override the TCP congestion window on every stream"),
        )
        .arg(
            Arg::new("enable-pause")
                .long("enable-pause-frame")
                .action(ArgAction::SetTrue)
                .conflicts_with("disable-pause")
                .help("Force ethernet pause frames on"),
        )
        .arg(
            Arg::new("disable-pause")
                .long("disable-pause-frame")
                .action(ArgAction::SetTrue)
                .help("Force ethernet pause frames off"),
        )
        .arg(
            Arg::new("dynamic-ibv")
                .long("dynamic-ibv")
                .action(ArgAction::SetTrue)
                .help("Size the pt::ibv resources from the topology instead of the fragments"),
        )
        .arg(
            Arg::new("ru-send-pool")
                .long("ru-send-pool-mb")
                .value_name("MB")
                .help("Override the computed RU send pool size"),
        )
        .arg(
            Arg::new("bu-recv-pool")
                .long("bu-recv-pool-mb")
                .value_name("MB")
                .help("Override the computed BU receive pool size"),
        )
        .arg(
            Arg::new("fragments")
                .long("fragment-dir")
                .value_name("DIR")
                .help("Load fragments from a directory instead of the bundled set"),
        )
        .arg(
            Arg::new("symbolmap")
                .long("symbol-map")
                .value_name("FILE")
                .help("Symbol map used to resolve host names when checking"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file (defaults to a name derived from the topology)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
}

fn check_config(path: &Path, map_path: Option<&Path>) -> bool {
    let reader = ConfigReader::new(false);
    let (mut topology, advisories) = match reader.read(path) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{e}");
            return false;
        }
    };
    let map = match SymbolMap::new(map_path) {
        Ok(m) => m,
        Err(e) => {
            log::error!("{e}");
            return false;
        }
    };
    if let Err(e) = topology.fill_from_symbol_map(&map) {
        log::error!("{e}");
        return false;
    }

    log::info!(
        "{}: {} over {} with {} ({} advisories)",
        path.display(),
        topology.config_string(),
        topology.transport.name(),
        topology.variant.ns(),
        advisories.len()
    );
    topology.log_hosts();
    advisories.is_empty()
}

fn main() {
    let matches = make_cli().get_matches();

    let level = if matches.get_flag("verbose") {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");

    let map_path = matches.get_one::<String>("symbolmap").map(PathBuf::from);

    if let Some(check) = matches.get_one::<String>("check") {
        if !check_config(Path::new(check), map_path.as_deref()) {
            std::process::exit(1);
        }
        return;
    }

    let Some(topology_str) = matches.get_one::<String>("topology") else {
        log::error!("A topology string is required unless --check is given");
        std::process::exit(2);
    };
    let params = match TopologySpec::from_str(topology_str) {
        Ok(TopologySpec::Ferol(params)) => params,
        Ok(TopologySpec::Eferol { .. }) => {
            log::error!("eFEROL topologies are read-only, cannot generate {topology_str}");
            std::process::exit(2);
        }
        Err(e) => {
            log::error!("{e}");
            std::process::exit(2);
        }
    };

    let variant = if matches.get_flag("gevb2g") {
        BuilderVariant::Gevb2g
    } else {
        BuilderVariant::Evb
    };
    let transport = if matches.get_flag("udapl") {
        PeerTransport::Udapl
    } else {
        PeerTransport::Ibv
    };
    // loose farm conventions, worth a note but not an error
    if variant == BuilderVariant::Evb && params.n_bus < 4 {
        log::warn!("evb is usually run with at least 4 BUs, got {}", params.n_bus);
    }
    if variant == BuilderVariant::Gevb2g && params.n_bus > 3 {
        log::warn!("gevb2g is usually run with at most 3 BUs, got {}", params.n_bus);
    }

    let fragment_dir = matches.get_one::<String>("fragments").map(PathBuf::from);
    let store = match FragmentStore::new(fragment_dir.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut cfg = Configurator::new(store, variant, transport);
    let mode_str = matches.get_one::<String>("mode").expect("defaulted");
    cfg.operation_mode = match OperationMode::from_str(mode_str) {
        Ok(mode) => mode,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(2);
        }
    };
    cfg.ferol_rack = parse_arg(&matches, "rack").unwrap_or(1);
    cfg.use_efeds = matches.get_flag("efeds");
    cfg.use_gtpe = matches.get_flag("gtpe") || cfg.use_efeds;
    cfg.tcp_cwnd = parse_arg(&matches, "cwnd");
    if matches.get_flag("enable-pause") {
        cfg.pause_frame = Some(true);
    } else if matches.get_flag("disable-pause") {
        cfg.pause_frame = Some(false);
    }
    cfg.dynamic_ibv = matches.get_flag("dynamic-ibv");
    cfg.ibv_overrides = IbvOverrides {
        ru_send_pool_mb: parse_arg(&matches, "ru-send-pool"),
        bu_recv_pool_mb: parse_arg(&matches, "bu-recv-pool"),
        ..IbvOverrides::default()
    };

    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}_{}_{}_{}.xml",
                topology_str,
                variant.ns(),
                transport.name(),
                cfg.operation_mode.name()
            ))
        });

    if let Err(e) = cfg.make_config(&params, &output) {
        log::error!("{e}");
        std::process::exit(1);
    }
    log::info!("Done.");
}

fn parse_arg<T: FromStr>(matches: &clap::ArgMatches, name: &str) -> Option<T> {
    let value = matches.get_one::<String>(name)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::error!("Not a number: {value}");
            std::process::exit(2);
        }
    }
}
