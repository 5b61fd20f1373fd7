//! Store of partition fragment templates.
//!
//! A partition file is assembled from small XML fragments (one per context,
//! policy, or application). The store either reads them from a directory given
//! on the command line or falls back to the set bundled with the crate, so a
//! plain invocation works without any checkout of the fragment collection.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use xmltree::Element;

use super::error::FragmentError;

macro_rules! bundled {
    ($($rel:literal),+ $(,)?) => {
        &[$(($rel, include_str!(concat!("fragments/", $rel)))),+]
    };
}

/// Fragment templates shipped with the crate, keyed by store-relative path.
static BUNDLED_FRAGMENTS: &[(&str, &str)] = bundled![
    "skeleton.xml",
    "FerolController.xml",
    "GTPe.xml",
    "eFED_context.xml",
    "eFED_application.xml",
    "FMM_context.xml",
    "FMM_card_eFED.xml",
    "RU/RU_frl_routing.xml",
    "RU/evb/RU_context.xml",
    "RU/evb/RU_policy_ibv.xml",
    "RU/evb/RU_policy_udapl.xml",
    "RU/evb/RU_ibv_application.xml",
    "RU/evb/RU_udapl_application.xml",
    "RU/evb/RU_application.xml",
    "RU/evb/RU_application_EVM.xml",
    "RU/gevb2g/RU_context.xml",
    "RU/gevb2g/RU_policy_ibv.xml",
    "RU/gevb2g/RU_policy_udapl.xml",
    "RU/gevb2g/RU_ibv_application.xml",
    "RU/gevb2g/RU_udapl_application.xml",
    "RU/gevb2g/RU_application.xml",
    "EVM/EVM_context.xml",
    "EVM/EVM_policy_ibv.xml",
    "EVM/EVM_policy_udapl.xml",
    "EVM/EVM_ibv_application.xml",
    "EVM/EVM_udapl_application.xml",
    "BU/BU_context.xml",
    "BU/BU_ibv_application.xml",
    "BU/BU_udapl_application.xml",
    "BU/evb/BU_policy_ibv.xml",
    "BU/evb/BU_policy_udapl.xml",
    "BU/gevb2g/BU_policy_ibv.xml",
    "BU/gevb2g/BU_policy_udapl.xml",
    "BU/evb/BU_application.xml",
    "BU/gevb2g/BU_application.xml",
];

#[derive(Debug, Clone)]
pub struct FragmentStore {
    directory: Option<PathBuf>,
}

impl FragmentStore {
    /// A store backed by the given directory, or the bundled fragments when
    /// no directory is given.
    pub fn new(directory: Option<&Path>) -> Result<Self, FragmentError> {
        if let Some(dir) = directory {
            if !dir.is_dir() {
                return Err(FragmentError::BadFilePath(dir.to_path_buf()));
            }
        }
        Ok(Self {
            directory: directory.map(Path::to_path_buf),
        })
    }

    pub fn is_bundled(&self) -> bool {
        self.directory.is_none()
    }

    /// Parse the fragment at the store-relative path into a fresh element.
    pub fn load(&self, rel: &str) -> Result<Element, FragmentError> {
        match &self.directory {
            Some(dir) => {
                let path = dir.join(rel);
                let file = File::open(&path).map_err(FragmentError::IOError)?;
                Element::parse(BufReader::new(file))
                    .map_err(|source| FragmentError::ParsingError { path, source })
            }
            None => {
                let text = BUNDLED_FRAGMENTS
                    .iter()
                    .find(|(name, _)| *name == rel)
                    .map(|(_, text)| *text)
                    .ok_or_else(|| FragmentError::NoSuchBundledFragment(rel.to_string()))?;
                Element::parse(text.as_bytes()).map_err(|source| FragmentError::ParsingError {
                    path: PathBuf::from(rel),
                    source,
                })
            }
        }
    }
}
