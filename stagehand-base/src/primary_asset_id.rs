use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Identifies a top-level asset that the asset manager knows how to preload, along with any named
/// bundles of secondary assets it references. Written as `Type:Name`, e.g. `Hero:Knight`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryAssetId {
    pub asset_type: String,
    pub name: String,
}

impl PrimaryAssetId {
    pub fn new(
        asset_type: &str,
        name: &str,
    ) -> Self {
        PrimaryAssetId {
            asset_type: asset_type.to_string(),
            name: name.to_string(),
        }
    }
}

impl Display for PrimaryAssetId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}:{}", self.asset_type, self.name)
    }
}

impl FromStr for PrimaryAssetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((asset_type, name)) if !asset_type.is_empty() && !name.is_empty() => {
                Ok(PrimaryAssetId::new(asset_type, name))
            }
            _ => Err(format!(
                "Primary asset id '{}' is not in the form Type:Name",
                s
            )),
        }
    }
}

/// Name of a group of secondary assets referenced by a primary asset (for example "ui" or "game")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleName(pub String);

impl BundleName {
    pub fn new(name: &str) -> Self {
        BundleName(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BundleName {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
