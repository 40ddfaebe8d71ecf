//! Monitored channels and the stream source they are pulled from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the channel id in [`StreamSource::path_template`]
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Connection details for the recorder (DVR/NVR) serving the channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSource {
    /// Host or IP of the recorder
    pub host: String,

    /// RTSP port (default: 554)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for the stream (empty = no credentials)
    #[serde(default)]
    pub username: String,

    /// Password for the stream
    #[serde(default)]
    pub password: String,

    /// Request path; `{channel}` is replaced with the channel id
    #[serde(default = "default_path_template")]
    pub path_template: String,
}

fn default_port() -> u16 {
    554
}

fn default_path_template() -> String {
    "/cam/realmonitor?channel={channel}&subtype=0".to_string()
}

impl Default for StreamSource {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            path_template: default_path_template(),
        }
    }
}

impl StreamSource {
    /// Build the RTSP URL for a channel, percent-encoding the credentials
    pub fn url_for(&self, channel_id: u32) -> String {
        let auth = if self.username.is_empty() {
            String::new()
        } else {
            format!(
                "{}:{}@",
                urlencoding::encode(&self.username),
                urlencoding::encode(&self.password)
            )
        };
        self.format_url(&auth, channel_id)
    }

    /// Same URL with the password masked, for logs
    pub fn redacted_url_for(&self, channel_id: u32) -> String {
        let auth = if self.username.is_empty() {
            String::new()
        } else {
            format!("{}:***@", urlencoding::encode(&self.username))
        };
        self.format_url(&auth, channel_id)
    }

    fn format_url(&self, auth: &str, channel_id: u32) -> String {
        let path = self
            .path_template
            .replace(CHANNEL_PLACEHOLDER, &channel_id.to_string());
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };

        format!("rtsp://{}{}:{}{}", auth, self.host, self.port, path)
    }
}

/// A monitored channel; fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel number on the stream source
    pub id: u32,

    /// Where the stream is pulled from
    pub source: StreamSource,

    /// Ring-buffer directory (`<buffer-root>/cam<id>`)
    pub buffer_dir: PathBuf,

    /// Wall-clock length of one segment
    pub segment_duration: Duration,

    /// Ring size N
    pub retention_count: u32,
}

impl Channel {
    pub fn new(
        id: u32,
        source: StreamSource,
        buffer_root: &Path,
        segment_duration: Duration,
        retention_count: u32,
    ) -> Self {
        Self {
            id,
            source,
            buffer_dir: buffer_dir_for(buffer_root, id),
            segment_duration,
            retention_count,
        }
    }

    pub fn stream_url(&self) -> String {
        self.source.url_for(self.id)
    }

    /// Upper bound on the age of the oldest segment once the ring has wrapped
    pub fn buffer_span(&self) -> Duration {
        self.segment_duration * self.retention_count
    }
}

/// Ring-buffer directory of a channel under the buffer root
pub fn buffer_dir_for(buffer_root: &Path, channel_id: u32) -> PathBuf {
    buffer_root.join(format!("cam{}", channel_id))
}
