// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use log::{info, warn};
use mdns_sd::{ServiceDaemon, ServiceInfo};

pub const INSTANCE_NAME: &str = "Mac Screen";
pub const INSTANCE_NAME_BACKGROUND: &str = "Mac Screen (Background)";

/// mDNS advertisement for the listener. When disabled (tests), only the
/// advertising flag is tracked so the lifecycle stays observable.
pub struct Advertiser {
    enabled: bool,
    port: u16,
    daemon: Option<ServiceDaemon>,
    fullname: Option<String>,
    active: bool,
}

impl Advertiser {
    pub fn new(enabled: bool, port: u16) -> Self {
        Self {
            enabled,
            port,
            daemon: None,
            fullname: None,
            active: false,
        }
    }

    /// Publish (or re-publish, e.g. after a listener restart or a
    /// background toggle) the service record.
    pub fn publish(&mut self, background: bool) {
        self.withdraw();
        self.active = true;
        if !self.enabled {
            return;
        }
        if let Err(err) = self.try_publish(background) {
            warn!("mDNS advertisement failed: {err}");
        }
    }

    fn try_publish(&mut self, background: bool) -> Result<()> {
        if self.daemon.is_none() {
            self.daemon = Some(ServiceDaemon::new()?);
        }
        let daemon = self.daemon.as_ref().unwrap();

        let instance = if background {
            INSTANCE_NAME_BACKGROUND
        } else {
            INSTANCE_NAME
        };
        let addrs = common::net::advertised_ip_addresses();
        let props = [("background", if background { "1" } else { "0" })];
        let mut info = ServiceInfo::new(
            common::SERVICE_TYPE,
            instance,
            "macmirror.local.",
            &addrs[..],
            self.port,
            &props[..],
        )?;
        if addrs.is_empty() {
            info = info.enable_addr_auto();
        }

        let fullname = info.get_fullname().to_owned();
        daemon.register(info)?;
        info!("Advertising `{instance}` on port {}", self.port);
        self.fullname = Some(fullname);
        Ok(())
    }

    pub fn withdraw(&mut self) {
        self.active = false;
        if let (Some(daemon), Some(fullname)) = (self.daemon.as_ref(), self.fullname.take()) {
            let _ = daemon.unregister(&fullname);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn shutdown(mut self) {
        self.withdraw();
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_advertiser_tracks_state() {
        let mut advertiser = Advertiser::new(false, 8080);
        assert!(!advertiser.is_active());
        advertiser.publish(false);
        assert!(advertiser.is_active());
        advertiser.withdraw();
        assert!(!advertiser.is_active());
        advertiser.publish(true);
        assert!(advertiser.is_active());
    }
}
