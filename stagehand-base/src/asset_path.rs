use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// An externally addressable resource that can be requested from the loader. This is only a name,
/// holding one does not keep anything loaded.
///
/// Paths are relative to whatever data root the `LoaderIO` implementation reads from, for example
/// `ui/icons/sword.png`. They are cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AssetPath(Arc<str>);

impl AssetPath {
    pub fn new(path: &str) -> Self {
        AssetPath(Arc::from(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AssetPath {
    fn from(path: &str) -> Self {
        AssetPath::new(path)
    }
}

impl From<String> for AssetPath {
    fn from(path: String) -> Self {
        AssetPath(Arc::from(path))
    }
}

impl From<AssetPath> for String {
    fn from(path: AssetPath) -> Self {
        path.0.to_string()
    }
}

impl Display for AssetPath {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for AssetPath {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "'{}'", &self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paths_compare_by_value() {
        let a = AssetPath::new("ui/icons/sword.png");
        let b: AssetPath = String::from("ui/icons/sword.png").into();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ui/icons/sword.png");
        assert_eq!(format!("{:?}", a), "'ui/icons/sword.png'");
    }

    #[test]
    fn path_serializes_as_plain_string() {
        let path = AssetPath::new("meshes/knight.mesh");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"meshes/knight.mesh\"");
        let parsed: AssetPath = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, path);
    }
}
