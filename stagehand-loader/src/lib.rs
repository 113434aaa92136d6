mod error;
pub use error::LoaderError;
pub use error::LoaderResult;

pub mod loader_io;
pub use loader_io::LoaderEvent;
pub use loader_io::LoaderIO;

mod disk_io;
pub use disk_io::DiskAssetIO;
pub use disk_io::DiskAssetIOConfig;

mod manual_io;
pub use manual_io::ManualLoaderIO;

pub mod manifest;
pub use manifest::PrimaryAssetData;
pub use manifest::PrimaryAssetManifest;

mod streamable;
pub use streamable::CompleteDelegate;
pub use streamable::StreamableHandle;

mod asset_manager;
pub use asset_manager::AssetManager;
pub use asset_manager::LoadState;
pub use asset_manager::LoadedAsset;
