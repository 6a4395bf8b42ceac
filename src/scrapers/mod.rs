//! Vendor-specific showtime providers and the registry the engine picks them from

pub mod cgv;
pub mod megabox;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::models::Vendor;
use crate::traits::ShowtimeProvider;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Showtime providers keyed by vendor
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Vendor, Arc<dyn ShowtimeProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Megabox and CGV providers configured from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            Vendor::Megabox,
            Arc::new(megabox::MegaboxProvider::new(
                config.fetch_timeout,
                config.screen_filter.clone(),
            )?),
        );
        registry.register(Vendor::Cgv, Arc::new(cgv::CgvProvider::new(config.fetch_timeout)?));
        Ok(registry)
    }

    pub fn register(&mut self, vendor: Vendor, provider: Arc<dyn ShowtimeProvider>) {
        self.providers.insert(vendor, provider);
    }

    pub fn get(&self, vendor: Vendor) -> Option<Arc<dyn ShowtimeProvider>> {
        self.providers.get(&vendor).cloned()
    }
}
