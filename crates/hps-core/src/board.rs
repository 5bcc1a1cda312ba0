//! ---
//! hps_section: "01-core-functionality"
//! hps_subsection: "module"
//! hps_type: "source"
//! hps_scope: "code"
//! hps_description: "Primary orchestration and lifecycle management."
//! hps_version: "v0.0.0-prealpha"
//! hps_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::RwLock;

use hps_safety::{DangerLevel, RoutingPriority, SafetyAssessment};

#[derive(Debug, Clone, Default)]
struct DeviceOutlook {
    assessment: Option<SafetyAssessment>,
    routing: Option<RoutingPriority>,
}

/// Latest derived outputs per device, published by the evaluation tasks
/// and read by any presentation layer.
///
/// Purely observational: nothing here feeds back into control decisions.
#[derive(Debug, Default)]
pub struct ObservationBoard {
    inner: RwLock<HashMap<String, DeviceOutlook>>,
}

impl ObservationBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of one evaluation tick. Returns the previous
    /// danger level so the caller can log transitions.
    pub fn publish(
        &self,
        device_id: &str,
        assessment: SafetyAssessment,
        routing: RoutingPriority,
    ) -> Option<DangerLevel> {
        let mut inner = self.inner.write();
        let outlook = inner.entry(device_id.to_owned()).or_default();
        let previous = outlook.assessment.as_ref().map(|a| a.danger_level);
        outlook.assessment = Some(assessment);
        outlook.routing = Some(routing);
        previous
    }

    /// Latest safety assessment for the device, if one has been published.
    pub fn assessment(&self, device_id: &str) -> Option<SafetyAssessment> {
        self.inner.read().get(device_id)?.assessment.clone()
    }

    /// Latest routing classification for the device.
    pub fn routing(&self, device_id: &str) -> Option<RoutingPriority> {
        self.inner.read().get(device_id)?.routing
    }

    /// Forget everything published for a removed device.
    pub fn clear(&self, device_id: &str) {
        self.inner.write().remove(device_id);
    }
}
