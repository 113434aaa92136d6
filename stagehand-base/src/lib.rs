pub mod hashing;
mod asset_path;
mod primary_asset_id;

pub use asset_path::AssetPath;
pub use primary_asset_id::BundleName;
pub use primary_asset_id::PrimaryAssetId;

pub mod handle;
pub use handle::LoadHandle;
pub use handle::RefOp;

pub mod ticker;
pub use ticker::Ticker;
pub use ticker::TickerHandle;
