//! Warnings the renderer reports through `log`.
//!
//! This binary installs its own logger: records are forwarded to
//! `env_logger` and kept in a shared buffer the tests inspect.

use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use gl_render_engine::backend::HeadlessBackend;
use gl_render_engine::scene::LightUnit;
use gl_render_engine::{EngineConfig, Renderer};
use glam::Vec3;
use log::Log;

struct CapturedLog {
    level: log::Level,
    message: String,
}

struct CaptureLogger {
    inner: env_logger::Logger,
    entries: Mutex<Vec<CapturedLog>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn || self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
        if record.level() <= log::Level::Warn {
            if let Ok(mut entries) = self.entries.lock() {
                entries.push(CapturedLog {
                    level: record.level(),
                    message: format!("{}", record.args()),
                });
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static LOGGER: OnceLock<&'static CaptureLogger> = OnceLock::new();

fn logger() -> &'static CaptureLogger {
    LOGGER.get_or_init(|| {
        let inner = env_logger::Builder::from_env(env_logger::Env::default())
            .is_test(true)
            .build();
        let max_level = inner.filter().max(log::LevelFilter::Warn);
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger {
            inner,
            entries: Mutex::new(Vec::new()),
        }));
        log::set_logger(logger).expect("logger already installed");
        log::set_max_level(max_level);
        logger
    })
}

fn warnings_containing(needle: &str) -> usize {
    logger()
        .entries
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.level == log::Level::Warn && entry.message.contains(needle))
        .count()
}

// ============================================================================
// Light Caps
// ============================================================================

/// Each rejected light logs one warning naming its type and the cap
#[test]
fn test_light_over_cap_warns() {
    logger();
    let config = EngineConfig {
        width: 64,
        height: 64,
        max_shadow_map_slots: 1,
        ..Default::default()
    };
    let renderer = Renderer::new(Rc::new(HeadlessBackend::new(64, 64)), config);
    let mut lights = renderer.new_lights().unwrap();

    let directional = LightUnit::directional(Vec3::NEG_Y, Vec3::ONE);
    let point = LightUnit::point(Vec3::ZERO, Vec3::ONE);
    assert_eq!(lights.add_light(directional).unwrap(), Some(0));
    assert_eq!(lights.add_light(point).unwrap(), Some(1));
    assert_eq!(warnings_containing("exceed the max slots"), 0);

    assert_eq!(lights.add_light(directional).unwrap(), None);
    assert_eq!(warnings_containing("directional lights exceed the max slots (1)"), 1);

    assert_eq!(lights.add_light(point).unwrap(), None);
    assert_eq!(warnings_containing("point lights exceed the max slots (1)"), 1);
    assert_eq!(lights.len(), 2);
}
