//! Registry holding one port per upstream data source.

use std::sync::Arc;

use crate::model::Chain;
use crate::ports::{AnnouncementPort, MenuPort, TransitPort, WeatherPort};

/// Every provider the kiosk talks to.
pub struct ProviderRegistry {
    food_and_co: Arc<dyn MenuPort>,
    sodexo: Arc<dyn MenuPort>,
    transit: Arc<dyn TransitPort>,
    weather: Arc<dyn WeatherPort>,
    announcements: Arc<dyn AnnouncementPort>,
}

/// Ports used to assemble a [`ProviderRegistry`].
pub struct ProviderPorts {
    /// Menu port for [`Chain::FoodAndCo`] sites.
    pub food_and_co: Arc<dyn MenuPort>,
    /// Menu port for [`Chain::Sodexo`] sites.
    pub sodexo: Arc<dyn MenuPort>,
    /// Departure lookups.
    pub transit: Arc<dyn TransitPort>,
    /// Current weather.
    pub weather: Arc<dyn WeatherPort>,
    /// Announcement feed.
    pub announcements: Arc<dyn AnnouncementPort>,
}

impl ProviderRegistry {
    /// Build a registry from the provided ports.
    #[must_use]
    pub fn new(ports: ProviderPorts) -> Self {
        let ProviderPorts {
            food_and_co,
            sodexo,
            transit,
            weather,
            announcements,
        } = ports;
        debug_assert_eq!(food_and_co.chain(), Chain::FoodAndCo, "menu port wired to the wrong chain");
        debug_assert_eq!(sodexo.chain(), Chain::Sodexo, "menu port wired to the wrong chain");
        Self {
            food_and_co,
            sodexo,
            transit,
            weather,
            announcements,
        }
    }

    /// Menu port serving `chain`.
    #[must_use]
    pub fn menu(&self, chain: Chain) -> &dyn MenuPort {
        match chain {
            Chain::FoodAndCo => self.food_and_co.as_ref(),
            Chain::Sodexo => self.sodexo.as_ref(),
        }
    }

    /// Departure port.
    #[must_use]
    pub fn transit(&self) -> &dyn TransitPort {
        self.transit.as_ref()
    }

    /// Weather port.
    #[must_use]
    pub fn weather(&self) -> &dyn WeatherPort {
        self.weather.as_ref()
    }

    /// Announcement port.
    #[must_use]
    pub fn announcements(&self) -> &dyn AnnouncementPort {
        self.announcements.as_ref()
    }
}
