use serde::Deserialize;
use stagehand::base::{ticker, AssetPath, BundleName, PrimaryAssetId};
use stagehand::loader::{AssetManager, DiskAssetIOConfig};
use stagehand::mixin::{
    registry, set_async_mixin_config, AsyncCondition, AsyncConditionResult, AsyncMixin,
    AsyncMixinConfig, LoadingHooks,
};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;

const FRAME_TIME: Duration = Duration::from_millis(16);

// Frames until the simulated player presses start
const PRESS_START_FRAME: u32 = 30;

pub fn data_source_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}

#[derive(Deserialize, Debug)]
struct Theme {
    font: String,
    font_size: u32,
    accent_color: [f32; 3],
}

#[derive(Deserialize, Debug)]
struct HeroData {
    display_name: String,
    health: u32,
}

// Stand-in for a UI widget that needs a few assets before it can show itself
struct TitleScreen {
    loading: AsyncMixin,
    theme: RefCell<Option<Theme>>,
    lines: RefCell<Vec<String>>,
    ready: Cell<bool>,
}

impl LoadingHooks for TitleScreen {
    fn on_started_loading(&self) {
        log::info!("TitleScreen: showing loading spinner");
    }

    fn on_finished_loading(&self) {
        log::info!("TitleScreen: hiding loading spinner");
        self.ready.set(true);
    }
}

impl TitleScreen {
    fn new(asset_manager: &AssetManager) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<TitleScreen>| TitleScreen {
            loading: AsyncMixin::with_hooks(asset_manager, weak.clone()),
            theme: Default::default(),
            lines: Default::default(),
            ready: Cell::new(false),
        })
    }

    fn begin_loading(
        self: &Rc<Self>,
        frame_index: Rc<Cell<u32>>,
    ) {
        let weak_self = Rc::downgrade(self);
        self.loading.async_load_then("ui/theme.json", move |asset| {
            let Some(title_screen) = weak_self.upgrade() else {
                return;
            };

            match asset.map(|x| x.deserialize_json::<Theme>()) {
                Some(Ok(theme)) => {
                    log::info!("Loaded theme {:?}", theme);
                    *title_screen.theme.borrow_mut() = Some(theme);
                }
                Some(Err(e)) => log::error!("Theme is malformed: {}", e),
                None => log::warn!("Theme failed to load, using defaults"),
            }
        });

        let weak_self = Rc::downgrade(self);
        let asset_manager = self.loading.asset_manager().clone();
        let text_paths = vec![AssetPath::new("ui/title.txt"), AssetPath::new("ui/subtitle.txt")];
        let requested = text_paths.clone();
        self.loading.async_load_many(&text_paths, move || {
            let Some(title_screen) = weak_self.upgrade() else {
                return;
            };

            for path in &requested {
                let line = asset_manager
                    .get_asset(path)
                    .and_then(|x| x.as_utf8().map(|x| x.trim().to_string()))
                    .unwrap_or_else(|| format!("<missing {}>", path));
                title_screen.lines.borrow_mut().push(line);
            }
        });

        // Gate the rest of the sequence on input
        let press_start = AsyncCondition::new(move || {
            if frame_index.get() >= PRESS_START_FRAME {
                AsyncConditionResult::Complete
            } else {
                AsyncConditionResult::TryAgain
            }
        });
        self.loading.async_condition(press_start, || {
            log::info!("Player pressed start");
        });

        let asset_manager = self.loading.asset_manager().clone();
        self.loading.async_preload_primary_assets_and_bundles(
            &[PrimaryAssetId::new("Hero", "Knight")],
            &[BundleName::new("ui")],
            move || {
                let hero = asset_manager
                    .get_asset(&AssetPath::new("heroes/knight.json"))
                    .map(|x| x.deserialize_json::<HeroData>());
                match hero {
                    Some(Ok(hero)) => log::info!("Hero ready: {} ({} hp)", hero.display_name, hero.health),
                    Some(Err(e)) => log::error!("Hero data is malformed: {}", e),
                    None => log::warn!("Hero failed to load"),
                }
            },
        );

        let weak_self = Rc::downgrade(self);
        self.loading.async_event(move || {
            if let Some(title_screen) = weak_self.upgrade() {
                title_screen.show();
            }
        });

        self.loading.start_async_loading();
    }

    fn show(&self) {
        let theme = self.theme.borrow();
        if let Some(theme) = &*theme {
            println!(
                "[{} {}pt, accent {:?}]",
                theme.font, theme.font_size, theme.accent_color
            );
        }

        for line in &*self.lines.borrow() {
            println!("{}", line);
        }
    }
}

fn main() {
    // Setup logging
    env_logger::Builder::default()
        .write_style(env_logger::WriteStyle::Always)
        .filter_level(log::LevelFilter::Debug)
        .init();

    let config_path = data_source_path().join("async_mixin.json");
    match AsyncMixinConfig::read_from_path(&config_path) {
        Ok(config) => set_async_mixin_config(config),
        Err(e) => log::warn!("Using default async mixin config, could not read {:?}: {}", config_path, e),
    }

    let asset_manager = match AssetManager::new_disk(&DiskAssetIOConfig::new(data_source_path())) {
        Ok(asset_manager) => asset_manager,
        Err(e) => {
            log::error!("Could not create asset manager: {}", e);
            return;
        }
    };

    let frame_index = Rc::new(Cell::new(0));
    let title_screen = TitleScreen::new(&asset_manager);
    title_screen.begin_loading(frame_index.clone());

    while !title_screen.ready.get() {
        profiling::scope!("Frame");
        std::thread::sleep(FRAME_TIME);
        asset_manager.update();
        ticker::tick(FRAME_TIME);
        frame_index.set(frame_index.get() + 1);
        profiling::finish_frame!();
    }

    log::info!(
        "Title screen ready after {} frames, {} assets resident",
        frame_index.get(),
        asset_manager.loaded_asset_count()
    );

    // Leaving the title screen releases the preloaded hero
    title_screen.loading.cancel_async_loading();
    drop(title_screen);
    registry::clear_loading_states();
    asset_manager.update();

    log::info!("{} assets resident after teardown", asset_manager.loaded_asset_count());
}
