//! Symbol map between the logical host names of a partition and the machines
//! of the test farm.
//!
//! Partition templates refer to hosts through symbols like `RU3_SOAP_HOST_NAME`
//! or `BU0_I2O_PORT`. The map file is YAML, symbol to value, and a default map
//! for the validation farm is bundled with the crate.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fxhash::FxHashMap;
use serde::Deserialize;

use super::error::SymbolMapError;
use super::topology::Topology;

static DEFAULT_SYMBOL_MAP: &str = include_str!("data/default_symbol_map.yaml");

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SymbolMap {
    symbols: FxHashMap<String, serde_yaml::Value>,
}

impl SymbolMap {
    /// Read a symbol map from a YAML file, or the bundled default map when no
    /// path is given.
    pub fn new(path: Option<&Path>) -> Result<Self, SymbolMapError> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(SymbolMapError::BadFilePath(path.to_path_buf()));
                }
                let file = File::open(path).map_err(SymbolMapError::IOError)?;
                Ok(serde_yaml::from_reader(BufReader::new(file))?)
            }
            None => Ok(serde_yaml::from_str(DEFAULT_SYMBOL_MAP)?),
        }
    }

    pub fn lookup(&self, symbol: &str) -> Option<String> {
        match self.symbols.get(symbol)? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn lookup_port(&self, symbol: &str) -> Result<u16, SymbolMapError> {
        let value = self
            .lookup(symbol)
            .ok_or_else(|| SymbolMapError::HostResolution(symbol.to_string()))?;
        value
            .parse()
            .map_err(|_| SymbolMapError::BadPortValue {
                symbol: symbol.to_string(),
                value,
            })
    }

    /// Resolve SOAP host, SOAP port and launcher port for every host of a
    /// topology. A host missing from the map is fatal.
    pub fn fill_topology(&self, topology: &mut Topology) -> Result<(), SymbolMapError> {
        topology.fill_from_symbol_map(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map_parses() {
        let map = SymbolMap::new(None).unwrap();
        assert!(map.lookup("RU0_SOAP_HOST_NAME").is_some());
        assert!(map.lookup("EVM0_I2O_PORT").is_some());
    }

    #[test]
    fn test_port_lookup() {
        let map = SymbolMap::new(None).unwrap();
        let soap = map.lookup_port("FEROLCONTROLLER0_SOAP_PORT").unwrap();
        let launcher = map.lookup_port("FEROLCONTROLLER0_LAUNCHER_PORT").unwrap();
        assert_ne!(soap, launcher);
    }

    #[test]
    fn test_missing_symbol() {
        let map = SymbolMap::new(None).unwrap();
        assert!(map.lookup("RU99_SOAP_HOST_NAME").is_none());
        assert!(matches!(
            map.lookup_port("RU99_SOAP_PORT"),
            Err(SymbolMapError::HostResolution(_))
        ));
    }

    #[test]
    fn test_bad_port_value() {
        let map: SymbolMap = serde_yaml::from_str("RU0_SOAP_PORT: not-a-port\n").unwrap();
        assert!(matches!(
            map.lookup_port("RU0_SOAP_PORT"),
            Err(SymbolMapError::BadPortValue { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SymbolMap::new(Some(Path::new("/no/such/map.yaml"))),
            Err(SymbolMapError::BadFilePath(_))
        ));
    }
}
