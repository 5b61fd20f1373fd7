use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("Could not load fragment because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("No bundled fragment named {0}")]
    NoSuchBundledFragment(String),
    #[error("Failed to parse fragment {path:?}: {source}")]
    ParsingError {
        path: PathBuf,
        source: xmltree::ParseError,
    },
    #[error("Fragment load failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("Application {class} not found in context {context}")]
    ApplicationNotFound { class: String, context: String },
    #[error("Application {class} in context {context} does not have properties")]
    MissingProperties { class: String, context: String },
    #[error("Property {property} of application {class} in context {context} not found")]
    PropertyNotFound {
        property: String,
        class: String,
        context: String,
    },
    #[error("Could not parse value '{value}' of property {property}")]
    BadPropertyValue { property: String, value: String },
}

#[derive(Debug, Clone, Error)]
#[error("Unknown ferol operation mode '{0}'")]
pub struct UnknownOperationModeError(pub String);

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("FED id {0} does not fit in the supported eFED crates; can't handle more than 3 crates")]
    TooManyCrates(u32),
    #[error("Can't handle more than 3 FMM cards; {0} were requested")]
    TooManyCards(usize),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Could not read configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Failed to parse configuration XML: {0}")]
    ParsingError(#[from] xmltree::ParseError),
    #[error("Root element {0} is not a namespaced Partition")]
    BadRoot(String),
    #[error("Couldn't determine EvB/gevb2g case from the i2o protocol element")]
    IndeterminateVariant,
    #[error("Couldn't determine peer transport; no RU context carries an ibv or udapl application")]
    IndeterminateTransport,
    #[error("Context url '{0}' does not match the expected pattern")]
    BadContextUrl(String),
    #[error("Unknown host type '{tag}' in context url '{url}'")]
    UnknownHostType { tag: String, url: String },
    #[error("Incomplete configuration: {0}")]
    IncompleteConfig(String),
    #[error("Reader failed due to property error: {0}")]
    Property(#[from] PropertyError),
}

#[derive(Debug, Error)]
pub enum ConfiguratorError {
    #[error("Configurator failed due to fragment error: {0}")]
    Fragment(#[from] FragmentError),
    #[error("Configurator failed due to property error: {0}")]
    Property(#[from] PropertyError),
    #[error("Configurator failed due to assignment error: {0}")]
    Assignment(#[from] AssignmentError),
    #[error("{0}")]
    UnknownOperationMode(#[from] UnknownOperationModeError),
    #[error("Skeleton root element carries no namespace")]
    MissingNamespace,
    #[error("Unknown ferol rack {0}; expected 1, 2 or 3")]
    UnknownFerolRack(u8),
    #[error("There are more streams ({0}) than eFEDs available ({1})")]
    TooManyEfedStreams(u32, u32),
    #[error("Configurator failed to serialize the document: {0}")]
    WriteError(#[from] xmltree::Error),
    #[error("Configurator failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SymbolMapError {
    #[error("Could not load symbol map as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Symbol map failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Symbol map failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Didn't find host symbol {0} in symbol map")]
    HostResolution(String),
    #[error("Symbol {symbol} has non-numeric port value '{value}'")]
    BadPortValue { symbol: String, value: String },
}

#[derive(Debug, Clone, Error)]
pub enum TopologyStringError {
    #[error("Topology string '{0}' matches neither <n>s<n>fx<n>x<n> nor <n>x<n>x<n>")]
    BadFormat(String),
    #[error("Topology '{0}' has a zero-sized role group")]
    EmptyGroup(String),
    #[error("{streams} streams on {ferols} FEROLs is not 1 or 2 streams per FEROL")]
    BadStreamCount { streams: u32, ferols: u32 },
}
