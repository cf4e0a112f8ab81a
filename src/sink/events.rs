use std::sync::Arc;

use serde::Serialize;

use crate::video::frame::PixelFormat;

/// Notifications a host forwards to whatever announces segments to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SinkEvent {
    /// Shared memory became active under `name`.
    #[serde(rename_all = "camelCase")]
    Started { sink_id: String, name: String },

    /// The published frame geometry changed; consumers must re-read the header.
    #[serde(rename_all = "camelCase")]
    GeometryChanged {
        sink_id: String,
        name: String,
        width: u32,
        height: u32,
        format: PixelFormat,
        generation: u32,
    },

    #[serde(rename_all = "camelCase")]
    Stopped { sink_id: String },
}

/// Receives [`SinkEvent`]s on the delivering thread.
pub type EventCallback = Arc<dyn Fn(&SinkEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_serialises_with_type_tag() {
        let event = SinkEvent::Started {
            sink_id: "cam0".to_string(),
            name: "/video-sink_shm_42_0".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["sinkId"], "cam0");
        assert_eq!(json["name"], "/video-sink_shm_42_0");
    }

    #[test]
    fn geometry_changed_serialises_to_camelcase() {
        let event = SinkEvent::GeometryChanged {
            sink_id: "cam0".to_string(),
            name: "/seg".to_string(),
            width: 640,
            height: 480,
            format: PixelFormat::Bgra,
            generation: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "geometryChanged");
        assert_eq!(json["width"], 640);
        assert_eq!(json["format"], "bgra");
        assert_eq!(json["generation"], 3);
    }

    #[test]
    fn stopped_carries_only_sink_id() {
        let json = serde_json::to_value(SinkEvent::Stopped {
            sink_id: "cam1".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "type": "stopped", "sinkId": "cam1" }));
    }
}
