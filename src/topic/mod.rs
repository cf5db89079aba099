//! Topic Naming
//!
//! Builders for the two topic families of the cloud platform:
//!
//! - device data: `<ns>/data/{in,out}/devices/<id>/{properties/<p>|methods/<m>|json}`
//! - account/app scoped filters: `<account>/apps/<app>/devices/<value-or-#>`
//!
//! The connection layer does not enforce these shapes; they are the naming
//! convention the platform's brokers expect.

use std::fmt;

#[cfg(test)]
mod tests;

/// Property name selecting the whole-document JSON feed instead of a
/// single property stream.
pub const JSON_FEED_PROPERTY: &str = "_data-feed-format_";

/// Direction of a device data topic relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Platform to device
    In,
    /// Device to platform
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for device data topics under a configurable namespace.
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    namespace: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new("connio")
    }
}

impl TopicBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Topic for one property stream of a device. The JSON feed sentinel
    /// selects the whole-document feed.
    pub fn property(&self, direction: Direction, device_id: &str, property: &str) -> String {
        if property == JSON_FEED_PROPERTY {
            return self.json(direction, device_id);
        }
        format!("{}/properties/{}", self.device_prefix(direction, device_id), property)
    }

    /// Topic for one method of a device.
    pub fn method(&self, direction: Direction, device_id: &str, method: &str) -> String {
        format!("{}/methods/{}", self.device_prefix(direction, device_id), method)
    }

    /// Whole-document JSON feed of a device.
    pub fn json(&self, direction: Direction, device_id: &str) -> String {
        format!("{}/json", self.device_prefix(direction, device_id))
    }

    /// Wildcard filter over every property of a device.
    pub fn all_properties(&self, direction: Direction, device_id: &str) -> String {
        format!("{}/properties/#", self.device_prefix(direction, device_id))
    }

    fn device_prefix(&self, direction: Direction, device_id: &str) -> String {
        format!("{}/data/{}/devices/{}", self.namespace, direction, device_id)
    }
}

/// Account/app scoped device filter, lowercase prefix, `#` when no value
/// is given.
pub fn app_filter(account: &str, app: &str, value: Option<&str>) -> String {
    let prefix = format!("{}/apps/{}/devices/", account, app).to_lowercase();
    format!("{}{}", prefix, value.unwrap_or("#"))
}
