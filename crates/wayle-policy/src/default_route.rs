//! Component E: default arbitration, one instance per IP family (spec §4.E).

use std::sync::Arc;

use tracing::{debug, instrument};
use wayle_common::Property;

use crate::collaborators::{DefaultRouteManagerHandle, DnsManagerHandle, DnsPriorityTag};
use crate::family::IpFamily;
use crate::ids::DeviceId;
use crate::model::{ActiveSessionHandle, DeviceHandle};

/// Default-route / default-DNS arbitration for one address family.
///
/// Two families run as two independent instances (spec §4.E: "symmetric");
/// the engine owns one of each.
pub struct DefaultArbitration {
    family: IpFamily,
    default_device: Property<Option<DeviceId>>,
    activating_device: Property<Option<DeviceId>>,
}

impl DefaultArbitration {
    /// Creates arbitration state for `family` with no default yet chosen.
    #[must_use]
    pub fn new(family: IpFamily) -> Self {
        Self {
            family,
            default_device: Property::new(None),
            activating_device: Property::new(None),
        }
    }

    /// The address family this instance arbitrates.
    #[must_use]
    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// The fully-activated default device for this family, if any.
    #[must_use]
    pub fn default_device(&self) -> Property<Option<DeviceId>> {
        self.default_device.clone()
    }

    /// The best candidate device for this family regardless of activation
    /// progress.
    #[must_use]
    pub fn activating_device(&self) -> Property<Option<DeviceId>> {
        self.activating_device.clone()
    }

    /// Routing update (spec §4.E): late-binds unbound VPN sessions, applies
    /// the two-phase clear-then-set default-flag choreography, and updates
    /// `default_device`. Returns the chosen (device, carrier-is-vpn) pair,
    /// used by [`Self::dns_update`].
    #[instrument(skip(self, devices, sessions, route_manager), fields(family = %self.family))]
    pub fn routing_update(
        &self,
        devices: &[Arc<dyn DeviceHandle>],
        sessions: &[Arc<dyn ActiveSessionHandle>],
        route_manager: &dyn DefaultRouteManagerHandle,
    ) -> Option<(DeviceId, bool)> {
        let Some((best_device, best_session_id)) =
            route_manager.best(devices, sessions, true, self.default_device.get())
        else {
            debug!("no best session, clearing default device");
            self.default_device.set(None);
            return None;
        };

        for session in sessions {
            let is_unbound_vpn = session.as_vpn().is_some() && session.device().is_none();
            if !is_unbound_vpn {
                continue;
            }
            let has_config = match self.family {
                IpFamily::V4 => session.as_vpn().is_some_and(|vpn| vpn.ip4_config().is_some()),
                IpFamily::V6 => session.as_vpn().is_some_and(|vpn| vpn.ip6_config().is_some()),
            };
            if has_config {
                session.bind_device(best_device);
            }
        }

        let chosen = sessions.iter().find(|s| s.id() == best_session_id);
        let is_vpn = chosen.is_some_and(|s| s.as_vpn().is_some());
        let effective_device = match chosen.and_then(|s| s.device()) {
            Some(device) if is_vpn => device,
            _ => best_device,
        };

        for session in sessions {
            if session.id() != best_session_id && session.default(self.family) {
                session.set_default(self.family, false);
            }
        }
        if let Some(session) = chosen {
            session.set_default(self.family, true);
        }

        self.default_device.set(Some(effective_device));

        Some((effective_device, is_vpn))
    }

    /// DNS update (spec §4.E): re-registers the chosen carrier's IP config,
    /// tagged by whether a VPN is carrying it.
    #[instrument(skip(self, devices, sessions, dns_manager), fields(family = %self.family))]
    pub async fn dns_update(
        &self,
        chosen: Option<(DeviceId, bool)>,
        devices: &[Arc<dyn DeviceHandle>],
        sessions: &[Arc<dyn ActiveSessionHandle>],
        dns_manager: &Arc<dyn DnsManagerHandle>,
    ) {
        let Some((device_id, is_vpn)) = chosen else {
            return;
        };
        let Some(device) = devices.iter().find(|d| d.id() == device_id) else {
            return;
        };

        let tag = if is_vpn {
            DnsPriorityTag::Vpn
        } else {
            DnsPriorityTag::BestDevice
        };

        let vpn_session = sessions
            .iter()
            .find(|s| s.device() == Some(device_id) && s.as_vpn().is_some());

        match self.family {
            IpFamily::V4 => {
                let config = if is_vpn {
                    vpn_session.and_then(|s| s.as_vpn()).and_then(|vpn| vpn.ip4_config())
                } else {
                    device.ip4_config(true)
                };
                if let Some(config) = config {
                    dns_manager.add_v4_config(device.interface(), &config, tag).await;
                }
            }
            IpFamily::V6 => {
                let config = if is_vpn {
                    vpn_session.and_then(|s| s.as_vpn()).and_then(|vpn| vpn.ip6_config())
                } else {
                    device.ip6_config(true)
                };
                if let Some(config) = config {
                    dns_manager.add_v6_config(device.interface(), &config, tag).await;
                }
            }
        }
    }

    /// Activating arbitration (spec §4.E): updates `activating_device`
    /// without requiring full activation.
    pub fn activating_update(
        &self,
        devices: &[Arc<dyn DeviceHandle>],
        sessions: &[Arc<dyn ActiveSessionHandle>],
        route_manager: &dyn DefaultRouteManagerHandle,
    ) {
        let best = route_manager
            .best(devices, sessions, false, self.activating_device.get())
            .map(|(device, _session)| device);
        self.activating_device.set(best);
    }
}
