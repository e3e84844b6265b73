//! Network reservations: one requested or resolved IP on one network for
//! one instance.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::host_network;

/// Identity of the instance owning a reservation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    /// Stable id; reservation ownership compares this field only
    pub id: String,
    /// Instance group name
    pub group: String,
    pub index: u32,
    /// AZ the instance is placed in, if any
    pub az: Option<String>,
}

impl InstanceRef {
    pub fn new(id: impl Into<String>, group: impl Into<String>, index: u32) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            index,
            az: None,
        }
    }

    pub fn with_az(mut self, az: impl Into<String>) -> Self {
        self.az = Some(az.into());
        self
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.group, self.index, self.id)
    }
}

/// The task on whose behalf records are written
///
/// Passed explicitly into repos so records carry the originating task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: String,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// Whether an address was chosen by the system or pinned by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationType {
    Dynamic,
    Static,
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationType::Dynamic => f.write_str("dynamic"),
            ReservationType::Static => f.write_str("static"),
        }
    }
}

/// Lifecycle: `Unresolved -> Resolved -> Reserved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    Unresolved,
    Resolved,
    Reserved,
}

/// A claim for one IP on one network for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReservation {
    instance: InstanceRef,
    network_name: String,
    ip: Option<IpNetwork>,
    reservation_type: Option<ReservationType>,
    state: ReservationState,
    existing: bool,
    nic_group: Option<String>,
}

impl NetworkReservation {
    /// A reservation whose address the system picks
    pub fn new_dynamic(instance: InstanceRef, network_name: impl Into<String>) -> Self {
        Self {
            instance,
            network_name: network_name.into(),
            ip: None,
            reservation_type: Some(ReservationType::Dynamic),
            state: ReservationState::Unresolved,
            existing: false,
            nic_group: None,
        }
    }

    /// A reservation for an operator-pinned address
    pub fn new_static(instance: InstanceRef, network_name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            instance,
            network_name: network_name.into(),
            ip: Some(host_network(ip)),
            reservation_type: Some(ReservationType::Static),
            state: ReservationState::Resolved,
            existing: false,
            nic_group: None,
        }
    }

    /// A reservation for an address the instance already held in a previous
    /// deployment run. Its type is inferred when it is reserved.
    pub fn existing(instance: InstanceRef, network_name: impl Into<String>, ip: IpNetwork) -> Self {
        Self {
            instance,
            network_name: network_name.into(),
            ip: Some(ip),
            reservation_type: None,
            state: ReservationState::Resolved,
            existing: true,
            nic_group: None,
        }
    }

    /// Attach a NIC group to distinguish several NICs on one network
    pub fn with_nic_group(mut self, nic_group: impl Into<String>) -> Self {
        self.nic_group = Some(nic_group.into());
        self
    }

    pub fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Resolved address (block for prefix allocations)
    pub fn ip(&self) -> Option<IpNetwork> {
        self.ip
    }

    /// First address of the resolved block
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.ip.map(|network| network.network())
    }

    pub fn reservation_type(&self) -> Option<ReservationType> {
        self.reservation_type
    }

    pub fn state(&self) -> ReservationState {
        self.state
    }

    pub fn nic_group(&self) -> Option<&str> {
        self.nic_group.as_deref()
    }

    pub fn is_existing(&self) -> bool {
        self.existing
    }

    pub fn is_reserved(&self) -> bool {
        self.state == ReservationState::Reserved
    }

    pub fn is_static(&self) -> bool {
        self.reservation_type == Some(ReservationType::Static)
    }

    pub fn is_dynamic(&self) -> bool {
        self.reservation_type == Some(ReservationType::Dynamic)
    }

    /// Pin the address. Fails once the reservation is reserved.
    pub fn resolve_ip(&mut self, ip: IpNetwork) -> Result<()> {
        if self.is_reserved() {
            return Err(Error::invalid_input(format!(
                "Reservation for '{}' on network '{}' is already reserved",
                self.instance, self.network_name
            )));
        }
        self.ip = Some(ip);
        self.state = ReservationState::Resolved;
        Ok(())
    }

    pub(crate) fn resolve_type(&mut self, reservation_type: ReservationType) {
        self.reservation_type = Some(reservation_type);
    }

    pub(crate) fn mark_reserved(&mut self) {
        self.state = ReservationState::Reserved;
    }
}

impl fmt::Display for NetworkReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self
            .ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "<unresolved>".to_string());
        let kind = self
            .reservation_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "existing".to_string());
        write!(
            f,
            "{{type={}, ip={}, network={}, instance={}}}",
            kind, ip, self.network_name, self.instance
        )
    }
}
