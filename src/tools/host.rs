//! Host queries and actions behind the tools
//!
//! [`HostServices`] is the seam between tool dispatch and the machine.
//! [`SystemHost`] is the real implementation; tests substitute fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ToolError;

/// Battery reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level in percent
    pub level: f64,
    /// Whether the battery is charging
    pub charging: bool,
}

/// Geographic position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    #[serde(alias = "latitude")]
    pub lat: f64,
    /// Longitude in degrees
    #[serde(alias = "longitude", alias = "lng")]
    pub lon: f64,
}

/// Machine capabilities the tools rely on
#[async_trait]
pub trait HostServices: Send + Sync {
    /// Open a URL in the default browser
    async fn open_url(&self, url: &str) -> Result<(), ToolError>;

    /// Query the battery
    async fn battery(&self) -> Result<BatteryStatus, ToolError>;

    /// Query the device position; the caller bounds this with a timeout
    async fn location(&self) -> Result<Coordinates, ToolError>;

    /// Current workspace note content (empty if none)
    async fn workspace_note(&self) -> Result<String, ToolError>;
}

/// [`HostServices`] backed by the local machine
#[derive(Debug, Clone)]
pub struct SystemHost {
    http: reqwest::Client,
    geolocation_url: Option<String>,
    notes_path: Option<PathBuf>,
    power_supply_dir: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SystemHost {
    /// Create a host using `geolocation_url` for position lookups and
    /// `notes_path` as the workspace note
    #[must_use]
    pub fn new(geolocation_url: Option<String>, notes_path: Option<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            geolocation_url,
            notes_path,
            power_supply_dir: PathBuf::from("/sys/class/power_supply"),
        }
    }

    /// Read batteries from a different sysfs root
    #[must_use]
    pub fn with_power_supply_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.power_supply_dir = dir.into();
        self
    }

    /// Path of the workspace note, if one is configured
    #[must_use]
    pub fn notes_path(&self) -> Option<&Path> {
        self.notes_path.as_deref()
    }
}

fn opener() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(target_os = "windows") {
        ("cmd", &["/C", "start", ""])
    } else {
        ("xdg-open", &[])
    }
}

/// Read the first `BAT*` entry under a sysfs power-supply directory
async fn read_sysfs_battery(dir: &Path) -> Result<BatteryStatus, ToolError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| ToolError::Unavailable("battery".to_string()))?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with("BAT") {
            continue;
        }
        let path = entry.path();
        let capacity = tokio::fs::read_to_string(path.join("capacity"))
            .await
            .map_err(|e| ToolError::Host(format!("battery capacity: {e}")))?;
        let level: f64 = capacity
            .trim()
            .parse()
            .map_err(|e| ToolError::Host(format!("battery capacity: {e}")))?;
        let status = tokio::fs::read_to_string(path.join("status"))
            .await
            .unwrap_or_default();
        let charging = matches!(status.trim(), "Charging" | "Full");
        return Ok(BatteryStatus { level, charging });
    }

    Err(ToolError::Unavailable("battery".to_string()))
}

#[async_trait]
impl HostServices for SystemHost {
    async fn open_url(&self, url: &str) -> Result<(), ToolError> {
        let (program, args) = opener();
        let status = tokio::process::Command::new(program)
            .args(args)
            .arg(url)
            .status()
            .await
            .map_err(|e| ToolError::Host(format!("failed to run {program}: {e}")))?;

        if status.success() {
            tracing::debug!(url, "opened url");
            Ok(())
        } else {
            Err(ToolError::Host(format!(
                "{program} exited with code {}",
                status.code().unwrap_or(-1)
            )))
        }
    }

    async fn battery(&self) -> Result<BatteryStatus, ToolError> {
        read_sysfs_battery(&self.power_supply_dir).await
    }

    async fn location(&self) -> Result<Coordinates, ToolError> {
        let url = self
            .geolocation_url
            .as_deref()
            .ok_or_else(|| ToolError::Unavailable("location".to_string()))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Host(format!("location lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Host(format!(
                "location lookup failed: {}",
                response.status()
            )));
        }

        response
            .json::<Coordinates>()
            .await
            .map_err(|e| ToolError::Host(format!("location lookup failed: {e}")))
    }

    async fn workspace_note(&self) -> Result<String, ToolError> {
        let Some(path) = &self.notes_path else {
            return Ok(String::new());
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ToolError::Host(format!("failed to read notebook: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_battery_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT0");
        std::fs::create_dir(&bat).unwrap();
        std::fs::write(bat.join("capacity"), "87\n").unwrap();
        std::fs::write(bat.join("status"), "Charging\n").unwrap();

        let host = SystemHost::default().with_power_supply_dir(dir.path());
        let status = host.battery().await.unwrap();
        assert!((status.level - 87.0).abs() < f64::EPSILON);
        assert!(status.charging);
    }

    #[tokio::test]
    async fn no_battery_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("AC")).unwrap();

        let host = SystemHost::default().with_power_supply_dir(dir.path());
        assert_eq!(
            host.battery().await.unwrap_err(),
            ToolError::Unavailable("battery".into())
        );
    }

    #[test]
    fn missing_note_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let host = SystemHost::new(None, Some(dir.path().join("notes.txt")));
        let note = tokio_test::block_on(host.workspace_note()).unwrap();
        assert_eq!(note, "");
    }

    #[test]
    fn existing_note_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "buy milk").unwrap();

        let host = SystemHost::new(None, Some(path));
        let note = tokio_test::block_on(host.workspace_note()).unwrap();
        assert_eq!(note, "buy milk");
    }

    #[tokio::test]
    async fn location_without_endpoint_is_unavailable() {
        let host = SystemHost::default();
        assert!(matches!(
            host.location().await,
            Err(ToolError::Unavailable(_))
        ));
    }

    #[test]
    fn coordinates_accept_long_names() {
        let c: Coordinates =
            serde_json::from_str(r#"{"latitude": 1.5, "longitude": -2.0}"#).unwrap();
        assert_eq!(c, Coordinates { lat: 1.5, lon: -2.0 });
    }
}
