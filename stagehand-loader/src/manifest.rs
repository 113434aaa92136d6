use crate::error::LoaderResult;
use serde::{Deserialize, Serialize};
use stagehand_base::hashing::HashMap;
use stagehand_base::{AssetPath, BundleName, PrimaryAssetId};
use std::collections::BTreeMap;
use std::path::Path;

/// File name the disk loader looks for in the data root
pub const PRIMARY_ASSET_MANIFEST_FILE_NAME: &str = "primary_assets.json";

#[derive(Serialize, Deserialize, Debug)]
pub struct PrimaryAssetEntryJson {
    // "Type:Name"
    pub id: String,
    pub path: AssetPath,
    #[serde(default)]
    pub bundles: BTreeMap<String, Vec<AssetPath>>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PrimaryAssetManifestJson {
    pub primary_assets: Vec<PrimaryAssetEntryJson>,
}

/// What the asset manager needs to know to preload a primary asset
#[derive(Debug, Clone)]
pub struct PrimaryAssetData {
    pub path: AssetPath,
    pub bundles: HashMap<BundleName, Vec<AssetPath>>,
}

impl PrimaryAssetData {
    // The primary asset itself plus everything in the requested bundles, without duplicates, in a
    // stable order
    pub fn paths_for_bundles(
        &self,
        bundles: &[BundleName],
    ) -> Vec<AssetPath> {
        let mut paths = vec![self.path.clone()];
        for bundle in bundles {
            if let Some(bundle_paths) = self.bundles.get(bundle) {
                for path in bundle_paths {
                    if !paths.contains(path) {
                        paths.push(path.clone());
                    }
                }
            }
        }

        paths
    }
}

#[derive(Debug, Default)]
pub struct PrimaryAssetManifest {
    pub primary_assets: HashMap<PrimaryAssetId, PrimaryAssetData>,
}

impl PrimaryAssetManifest {
    pub fn from_json_str(json: &str) -> LoaderResult<Self> {
        let manifest_json: PrimaryAssetManifestJson = serde_json::from_str(json)?;

        let mut primary_assets = HashMap::default();
        for entry in manifest_json.primary_assets {
            let id: PrimaryAssetId = entry.id.parse()?;

            let mut bundles = HashMap::default();
            for (bundle_name, paths) in entry.bundles {
                bundles.insert(BundleName(bundle_name), paths);
            }

            let old = primary_assets.insert(
                id.clone(),
                PrimaryAssetData {
                    path: entry.path,
                    bundles,
                },
            );
            if old.is_some() {
                return Err(format!("Primary asset {} is listed more than once", id).into());
            }
        }

        Ok(PrimaryAssetManifest { primary_assets })
    }

    pub fn read_from_path(path: &Path) -> LoaderResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MANIFEST: &str = r#"{
        "primary_assets": [
            {
                "id": "Hero:Knight",
                "path": "heroes/knight.json",
                "bundles": {
                    "ui": ["ui/knight_portrait.png", "ui/knight_icon.png"],
                    "game": ["meshes/knight.mesh", "ui/knight_icon.png"]
                }
            },
            {
                "id": "Map:Castle",
                "path": "maps/castle.json"
            }
        ]
    }"#;

    #[test]
    fn parse_manifest() {
        let manifest = PrimaryAssetManifest::from_json_str(MANIFEST).unwrap();
        assert_eq!(manifest.primary_assets.len(), 2);

        let knight = &manifest.primary_assets[&PrimaryAssetId::new("Hero", "Knight")];
        assert_eq!(knight.path, AssetPath::new("heroes/knight.json"));
        assert_eq!(knight.bundles.len(), 2);

        let castle = &manifest.primary_assets[&PrimaryAssetId::new("Map", "Castle")];
        assert!(castle.bundles.is_empty());
    }

    #[test]
    fn bundle_paths_are_deduplicated() {
        let manifest = PrimaryAssetManifest::from_json_str(MANIFEST).unwrap();
        let knight = &manifest.primary_assets[&PrimaryAssetId::new("Hero", "Knight")];

        let paths = knight.paths_for_bundles(&[BundleName::new("ui"), BundleName::new("game")]);
        let paths: Vec<&str> = paths.iter().map(|x| x.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "heroes/knight.json",
                "ui/knight_portrait.png",
                "ui/knight_icon.png",
                "meshes/knight.mesh"
            ]
        );

        // Unknown bundles contribute nothing
        let paths = knight.paths_for_bundles(&[BundleName::new("audio")]);
        assert_eq!(paths, vec![AssetPath::new("heroes/knight.json")]);
    }

    #[test]
    fn duplicate_and_malformed_ids_are_errors() {
        let duplicate = r#"{ "primary_assets": [
            { "id": "Hero:Knight", "path": "a.json" },
            { "id": "Hero:Knight", "path": "b.json" }
        ] }"#;
        assert!(PrimaryAssetManifest::from_json_str(duplicate).is_err());

        let malformed = r#"{ "primary_assets": [ { "id": "Knight", "path": "a.json" } ] }"#;
        assert!(PrimaryAssetManifest::from_json_str(malformed).is_err());

        assert!(PrimaryAssetManifest::from_json_str("not json").is_err());
    }
}
