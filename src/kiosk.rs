// SPDX-License-Identifier: MPL-2.0

//! Kiosk assembly
//!
//! Wires the local store, cloud services, camera backend, remix client and
//! composite pipeline together for the binary and for tests.

use crate::backends::camera::{CameraBackend, DeviceAcquisitionManager};
use crate::backends::cloud::CloudServices;
use crate::backends::remix::RemixClient;
use crate::config::KioskSettings;
use crate::pipelines::photo::CompositePipeline;
use crate::session::{self, SessionHandle, SessionServices};
use crate::storage::{ConfigSync, LocalStore};
use std::sync::Arc;
use tracing::info;

/// One assembled kiosk
pub struct Kiosk {
    pub settings: KioskSettings,
    pub config: Arc<ConfigSync>,
    pub devices: DeviceAcquisitionManager,
    pub remix: RemixClient,
    pub pipeline: CompositePipeline,
}

impl Kiosk {
    /// Load local configuration and prepare every component
    ///
    /// Cloud reconciliation starts in the background; nothing here waits on
    /// the network.
    pub async fn assemble(
        settings: KioskSettings,
        backend: Box<dyn CameraBackend>,
        cloud: CloudServices,
    ) -> Self {
        let config = ConfigSync::load(LocalStore::new(&settings.data_dir), cloud).await;
        if config.spawn_reconcile().is_some() {
            info!("Cloud reconciliation started");
        }

        let preferred = settings.preferred_device(&config.theme());
        let devices = DeviceAcquisitionManager::new(backend, preferred);
        let remix = RemixClient::from_settings(&settings);
        let pipeline = CompositePipeline::new(settings.canvas);

        Self {
            settings,
            config,
            devices,
            remix,
            pipeline,
        }
    }

    /// Replace the remix client
    pub fn with_remix(mut self, remix: RemixClient) -> Self {
        self.remix = remix;
        self
    }

    pub fn services(&self) -> SessionServices {
        SessionServices {
            devices: self.devices.clone(),
            remix: self.remix.clone(),
            pipeline: self.pipeline.clone(),
            config: Arc::clone(&self.config),
        }
    }

    /// Start the session controller
    pub fn spawn_session(&self) -> SessionHandle {
        session::spawn(self.services(), self.settings.clone())
    }
}
